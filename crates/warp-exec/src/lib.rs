//! Runtime contract for Rust code emitted by the warp compiler.
//!
//! Compiled modules depend on this crate for:
//!
//! - [`Trap`] and [`LinkError`], the two error channels;
//! - [`numerics`], the trapping and NaN-sensitive operations;
//! - [`Thread`], the call-depth counter threaded through every call;
//! - [`Memory`], [`Table`] and [`Global`], the shared instance entities;
//! - [`Function`] and [`CompiledFunction`], the raw call ABI;
//! - the [`Module`] lifecycle traits and the [`Store`] linker.
//!
//! Host code adds functions with [`HostFunction::wrap`] and groups them in a
//! [`HostModule`].
//!
//! # Threading
//!
//! All handles use `Rc`, `RefCell` and `Cell`. Nothing here is `Send` or
//! `Sync`; a host that needs to run instances on several threads must keep
//! each store and its instances on one thread.

mod error;
mod function;
mod global;
#[cfg(unix)]
pub mod guard;
mod host;
mod memory;
mod module;
pub mod numerics;
mod store;
mod table;
mod thread;
mod value;

pub use error::{GlobalError, LinkError, LinkResult, Trap};
pub use function::{CompiledFunction, FuncRef, Function, Thunk};
pub use global::Global;
pub use host::{HostFunction, HostModule, HostParams, HostResults, IntoHostFunc, WasmTy};
pub use memory::{BoundsChecked, LinearMemory, Memory};
pub use module::{
    check_function, check_global, check_memory, check_table, AllocatedModule, ExportDesc, Extern,
    ImportResolver, MapResolver, Module, ModuleDefinition, ModuleResolver,
};
pub use store::{Store, StoreEvent};
pub use table::Table;
pub use thread::{FrameInfo, Thread, TraceSink, TracingSink, WriterSink};
pub use value::Value;

/// Re-exported for generated code, which names types through this crate.
pub use warp_wasm::{ExternKind, FuncType, GlobalType, Limits, MemoryType, TableType, ValueType};
