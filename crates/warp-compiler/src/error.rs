//! Compiler error types.

use thiserror::Error;
use warp_wasm::DecodeError;

/// Errors that can occur while translating a module to Rust.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A segment or instruction refers to a memory other than memory 0.
    #[error("invalid memory index {0}")]
    InvalidMemoryIndex(u32),

    /// A segment or instruction refers to a table other than table 0.
    #[error("invalid table index {0}")]
    InvalidTableIndex(u32),

    /// A constant element segment cannot fit the declared minimum table.
    #[error("element segment {segment} does not fit: offset {offset} + {len} > table size {size}")]
    ElementSegmentDoesNotFit {
        segment: usize,
        offset: u32,
        len: u32,
        size: u32,
    },

    /// A constant data segment cannot fit the declared minimum memory.
    #[error("data segment {segment} does not fit: offset {offset} + {len} > memory size {size}")]
    DataSegmentDoesNotFit {
        segment: usize,
        offset: u32,
        len: u32,
        size: u64,
    },

    /// Command mode needs an exported `_start`.
    #[error("command module has no exported _start function")]
    MissingStart,

    /// `_start` must take and return nothing.
    #[error("_start must have type [] -> [], found {0}")]
    InvalidStartSignature(String),

    /// The module name is not a usable Rust identifier.
    #[error("invalid module name {0:?}")]
    InvalidModuleName(String),

    /// The options could not be read.
    #[error("invalid compile options: {0}")]
    InvalidOptions(String),

    /// The module uses a feature the compiler does not translate.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// An internal consistency check failed.
    #[error("internal compiler error: {0}")]
    Internal(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Compiler result type alias.
pub type CompileResult<T> = Result<T, CompileError>;

pub(crate) fn internal<T>(message: impl Into<String>) -> CompileResult<T> {
    Err(CompileError::Internal(message.into()))
}
