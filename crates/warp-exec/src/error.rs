//! Runtime error types: traps raised during execution and link errors raised
//! during instantiation.

use thiserror::Error;
use warp_wasm::{ExternKind, FuncType, GlobalType, Limits, ValueType};

/// A WebAssembly trap. Returned from calls, never raised as a panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Trap {
    #[error("unreachable executed")]
    Unreachable,

    #[error("undefined element")]
    UndefinedElement,

    #[error("uninitialized element")]
    UninitializedElement,

    #[error("indirect call type mismatch")]
    IndirectCallTypeMismatch,

    #[error("out of bounds memory access")]
    OutOfBoundsMemoryAccess,

    #[error("integer overflow")]
    IntegerOverflow,

    #[error("invalid conversion to integer")]
    InvalidConversionToInteger,

    #[error("integer divide by zero")]
    IntegerDivideByZero,

    #[error("call stack exhausted")]
    CallStackExhausted,

    /// A call reached an instance that has not finished instantiation.
    #[error("uninitialized module")]
    UninitializedModule,

    /// A host function reported a failure.
    #[error("host error: {0}")]
    Host(String),
}

/// Errors raised while linking and instantiating a module.
///
/// A link error aborts only the instantiation that raised it; instances
/// that were already registered in a store are unaffected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    #[error("module {0:?} not found")]
    ModuleNotFound(String),

    #[error("{module}.{field}: export not found")]
    ExportNotFound { module: String, field: String },

    #[error("{module}.{field}: expected {expected}, found {actual}")]
    KindMismatch {
        module: String,
        field: String,
        expected: ExternKind,
        actual: ExternKind,
    },

    #[error("{module}.{field}: function type mismatch: expected {expected}, found {actual}")]
    FunctionTypeMismatch {
        module: String,
        field: String,
        expected: FuncType,
        actual: FuncType,
    },

    #[error("{module}.{field}: table limits mismatch: expected {expected}, found {actual}")]
    TableTypeMismatch {
        module: String,
        field: String,
        expected: Limits,
        actual: Limits,
    },

    #[error("{module}.{field}: memory limits mismatch: expected {expected}, found {actual}")]
    MemoryTypeMismatch {
        module: String,
        field: String,
        expected: Limits,
        actual: Limits,
    },

    #[error("{module}.{field}: global type mismatch: expected {expected}, found {actual}")]
    GlobalTypeMismatch {
        module: String,
        field: String,
        expected: GlobalType,
        actual: GlobalType,
    },

    /// A table, memory, or global was imported from a module that is still
    /// being instantiated.
    #[error("{module}.{field}: cyclic import of a non-function export")]
    CyclicImport { module: String, field: String },

    #[error("element segment {segment} does not fit: offset {offset} + {len} > table size {size}")]
    ElementSegmentDoesNotFit {
        segment: usize,
        offset: u32,
        len: u32,
        size: u32,
    },

    #[error("data segment {segment} does not fit: offset {offset} + {len} > memory size {size}")]
    DataSegmentDoesNotFit {
        segment: usize,
        offset: u32,
        len: u32,
        size: u64,
    },

    #[error("start function trapped: {0}")]
    Start(Trap),

    #[error("allocation failed: {0}")]
    Allocation(String),

    #[error("module {0:?} is already instantiated")]
    AlreadyInstantiated(String),
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Allocation(err.to_string())
    }
}

/// Errors from setting a global through the host API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GlobalError {
    #[error("global is immutable")]
    Immutable,

    #[error("expected {expected} value, found {actual}")]
    TypeMismatch {
        expected: ValueType,
        actual: ValueType,
    },
}

/// Link result type alias.
pub type LinkResult<T> = Result<T, LinkError>;
