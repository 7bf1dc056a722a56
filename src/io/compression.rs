//! Transparent compression for descriptor files, selected by file extension.
//!
//! Each codec is a [`CompressionCodec`] gated behind its own cargo feature:
//! - **Gzip** (`.gz`, `.gzip`) - `flate2` (feature: `compression-gzip`)
//! - **Zstd** (`.zst`, `.zstd`) - `zstd` (feature: `compression-zstd`)
//! - **Bzip2** (`.bz2`, `.bzip2`) - `bzip2` (feature: `compression-bzip2`)
//! - **Xz** (`.xz`) - `xz2` (feature: `compression-xz`)
//!
//! Detection looks at the path only. Content sniffing is deliberately absent:
//! a file without a recognised extension is read as plain text.
//!
//! ```no_run
//! use molprint::io::compression::open_reader;
//! use std::io::Read;
//! # fn main() -> std::io::Result<()> {
//! let mut text = String::new();
//! open_reader("library.smi.gz")?.read_to_string(&mut text)?;
//! # Ok(())
//! # }
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Boxed reader that can cross into the feeder thread.
pub type DynReader = Box<dyn Read + Send>;

/// Boxed writer, used for compressed fixtures and exports.
pub type DynWriter = Box<dyn Write + Send>;

/// A compression algorithm recognised by file extension.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip", "zstd").
    fn name(&self) -> &'static str;

    /// Lowercase file extensions, including the leading dot.
    fn extensions(&self) -> &'static [&'static str];

    /// Wrap a reader with decompression.
    fn wrap_reader(&self, reader: DynReader) -> std::io::Result<DynReader>;

    /// Wrap a writer with compression.
    fn wrap_writer(&self, writer: DynWriter) -> std::io::Result<DynWriter>;
}

static CODECS: &[&dyn CompressionCodec] = &[
    #[cfg(feature = "compression-gzip")]
    &GzipCodec,
    #[cfg(feature = "compression-zstd")]
    &ZstdCodec,
    #[cfg(feature = "compression-bzip2")]
    &Bzip2Codec,
    #[cfg(feature = "compression-xz")]
    &XzCodec,
];

/// Find the codec whose extension ends `path`, case-insensitively.
#[must_use]
pub fn codec_for_path(path: impl AsRef<Path>) -> Option<&'static dyn CompressionCodec> {
    let path_str = path.as_ref().to_string_lossy().to_lowercase();
    CODECS
        .iter()
        .copied()
        .find(|codec| codec.extensions().iter().any(|ext| path_str.ends_with(ext)))
}

/// Open `path` for reading, decompressing when its extension names a codec.
///
/// # Errors
/// Returns the underlying I/O error if the file cannot be opened or the
/// decoder cannot be initialised.
pub fn open_reader(path: impl AsRef<Path>) -> std::io::Result<DynReader> {
    let path = path.as_ref();
    let file = File::open(path)?;
    match codec_for_path(path) {
        Some(codec) => codec.wrap_reader(Box::new(BufReader::new(file))),
        None => Ok(Box::new(BufReader::new(file))),
    }
}

/// Create `path` for writing, compressing when its extension names a codec.
///
/// Compressing writers finish their stream when dropped.
///
/// # Errors
/// Returns the underlying I/O error if the file cannot be created or the
/// encoder cannot be initialised.
pub fn create_writer(path: impl AsRef<Path>) -> std::io::Result<DynWriter> {
    let path = path.as_ref();
    let file = File::create(path)?;
    match codec_for_path(path) {
        Some(codec) => codec.wrap_writer(Box::new(BufWriter::new(file))),
        None => Ok(Box::new(BufWriter::new(file))),
    }
}

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".gz", ".gzip"]
    }

    fn wrap_reader(&self, reader: DynReader) -> std::io::Result<DynReader> {
        // concatenated members decode as one stream
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: DynWriter) -> std::io::Result<DynWriter> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        Ok(Box::new(GzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".zst", ".zstd"]
    }

    fn wrap_reader(&self, reader: DynReader) -> std::io::Result<DynReader> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as DynReader)
    }

    fn wrap_writer(&self, writer: DynWriter) -> std::io::Result<DynWriter> {
        zstd::stream::write::Encoder::new(writer, 3)
            .map(|e| Box::new(e.auto_finish()) as DynWriter)
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &'static str {
        "bzip2"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".bz2", ".bzip2"]
    }

    fn wrap_reader(&self, reader: DynReader) -> std::io::Result<DynReader> {
        Ok(Box::new(bzip2::read::MultiBzDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: DynWriter) -> std::io::Result<DynWriter> {
        use bzip2::Compression;
        use bzip2::write::BzEncoder;
        Ok(Box::new(BzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &'static str {
        "xz"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".xz"]
    }

    fn wrap_reader(&self, reader: DynReader) -> std::io::Result<DynReader> {
        Ok(Box::new(xz2::read::XzDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: DynWriter) -> std::io::Result<DynWriter> {
        Ok(Box::new(xz2::write::XzEncoder::new(writer, 6)))
    }
}
