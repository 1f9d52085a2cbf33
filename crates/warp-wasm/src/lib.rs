//! WebAssembly module model shared by the warp compiler and runtime.
//!
//! This crate defines the validated, fully decoded module representation the
//! compiler consumes, the closed [`Instruction`] enumeration, and the
//! [`Scope`] contract used to resolve indices while walking a function body.
//!
//! # Index spaces
//!
//! Every index space (functions, tables, memories, globals) is the
//! concatenation of the imported entries followed by the locally declared
//! entries, in declaration order. All `*_index` helpers on [`Module`] follow
//! that rule.
//!
//! # Decoding
//!
//! [`decode::parse`] is a thin adapter over `wasmparser`: it validates a
//! binary module and converts it to a [`Module`]. The compiler does not
//! depend on it; tests and build scripts use it to obtain input modules.

pub mod decode;
mod error;
pub mod instruction;
pub mod module;
pub mod scope;
pub mod types;

pub use error::{DecodeError, DecodeResult};
pub use instruction::{
    BinaryOp, CompareOp, ConvertOp, Instruction, LoadOp, MemArg, StoreOp, TestOp, UnaryOp,
};
pub use module::{
    ConstExpr, DataSegment, ElementSegment, Export, FunctionBody, Global, Import, ImportDesc,
    Module,
};
pub use scope::{FunctionScope, Scope};
pub use types::{
    BlockType, ExternKind, FuncType, GlobalType, Limits, MemoryType, TableType, ValueType,
};

/// Size of a linear-memory page in bytes.
pub const PAGE_SIZE: u32 = 65536;

/// Maximum number of pages a 32-bit linear memory can hold.
pub const MAX_PAGES: u32 = 65536;
