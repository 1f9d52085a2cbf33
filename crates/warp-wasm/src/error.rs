//! Decoder error types.

use thiserror::Error;

/// Errors produced while converting a binary module into a [`crate::Module`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The binary failed to parse or validate.
    #[error("invalid module: {0}")]
    Invalid(#[from] wasmparser::BinaryReaderError),

    /// The module uses a feature outside the supported MVP subset.
    #[error("unsupported feature: {0}")]
    Unsupported(String),
}

/// Decoder result type alias.
pub type DecodeResult<T> = Result<T, DecodeError>;

pub(crate) fn unsupported<T>(what: impl Into<String>) -> DecodeResult<T> {
    Err(DecodeError::Unsupported(what.into()))
}
