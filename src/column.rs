//! Descriptor-column detection.
//!
//! The first field of a sample row that the encoder accepts is taken as the
//! descriptor column. When nothing parses, either the file holds no
//! descriptors or the delimiter is wrong (the whole line then arrives as one
//! field), so the same error covers both.

use crate::encoder::Encoder;
use csv::StringRecord;
use thiserror::Error;

/// No field of the sample row is a valid descriptor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no valid descriptor column (delimiter {delimiter:?}); example row: {row}")]
pub struct NoValidColumn {
    pub delimiter: char,
    /// The sample row, re-joined with the delimiter.
    pub row: String,
}

/// Return the index of the first field of `row` that `encoder` accepts.
///
/// # Errors
/// Returns [`NoValidColumn`] carrying `delimiter` and the row's content when
/// no field validates.
///
/// ```
/// use csv::StringRecord;
/// use molprint::column::detect_column;
/// use molprint::fingerprint::TokenFingerprinter;
///
/// let row = StringRecord::from(vec!["1", "CCO"]);
/// assert_eq!(detect_column(&row, ',', &TokenFingerprinter::default()), Ok(1));
/// ```
pub fn detect_column(
    row: &StringRecord,
    delimiter: char,
    encoder: &dyn Encoder,
) -> Result<usize, NoValidColumn> {
    row.iter()
        .position(|field| encoder.is_valid(field))
        .ok_or_else(|| NoValidColumn {
            delimiter,
            row: join_fields(row, delimiter),
        })
}

pub(crate) fn join_fields(row: &StringRecord, delimiter: char) -> String {
    let mut buf = [0u8; 4];
    let sep: &str = delimiter.encode_utf8(&mut buf);
    row.iter().collect::<Vec<_>>().join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::TokenFingerprinter;

    #[test]
    fn picks_the_first_valid_field() {
        let fp = TokenFingerprinter::default();
        let row = StringRecord::from(vec!["CCO", "CCN"]);
        assert_eq!(detect_column(&row, ',', &fp), Ok(0));
    }

    #[test]
    fn bad_delimiter_surfaces_the_whole_line() {
        let fp = TokenFingerprinter::default();
        // read with ',' but actually tab-separated: one field holding everything
        let row = StringRecord::from(vec!["7\tc1ccccc1"]);
        let err = detect_column(&row, ',', &fp).unwrap_err();
        assert_eq!(err.delimiter, ',');
        assert_eq!(err.row, "7\tc1ccccc1");
    }

    #[test]
    fn empty_row_has_no_column() {
        let fp = TokenFingerprinter::default();
        assert!(detect_column(&StringRecord::new(), ',', &fp).is_err());
    }
}
