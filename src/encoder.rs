//! The encoder capability consumed by the pipeline.
//!
//! An [`Encoder`] turns one descriptor string into a fixed-width vector of
//! small integers. It is shared read-only by every worker, so implementations
//! must be `Send + Sync` and must not rely on interior state between calls.

use thiserror::Error;

/// A fixed-length feature vector as stored in the output dataset.
pub type FixedVector = Vec<i8>;

/// Why an encoder rejected a descriptor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("unparseable descriptor: {0}")]
    Parse(String),

    #[error("encoder failure: {0}")]
    Internal(String),
}

/// Stateless descriptor → vector mapping with a fixed output width.
pub trait Encoder: Send + Sync {
    /// Output width `L`. Constant for the lifetime of the encoder.
    fn len(&self) -> usize;

    /// Encode one descriptor.
    ///
    /// # Errors
    /// Returns an [`EncodeError`] when the descriptor cannot be parsed or
    /// the encoder fails internally.
    fn encode(&self, descriptor: &str) -> Result<FixedVector, EncodeError>;

    /// Cheap validity probe used by column detection.
    ///
    /// Defaults to a full encode. Override when parsing alone is cheaper.
    fn is_valid(&self, descriptor: &str) -> bool {
        self.encode(descriptor).is_ok()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
