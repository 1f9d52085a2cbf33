//! warp compiler: translates a validated WebAssembly module into Rust source.
//!
//! ```text
//! Module → Builder (values + blocks) → Classifier → Emitter → Assembler → pub mod <name> { ... }
//! ```
//!
//! # Output
//!
//! [`compile`] produces one self-contained `pub mod` item. It depends only on
//! the `warp_exec` runtime crate and exposes:
//!
//! - `Definition`, a `ModuleDefinition` to hand to a `Store` or allocate
//!   directly;
//! - `Instance`, the allocated and, after `instantiate`, ready module;
//! - `NAME` and `EXPORTS`, the module name and its sorted export list.
//!
//! # Function bodies
//!
//! Each function is translated in one pass over its instructions. Values
//! are kept as expression nodes and inlined into their single consumer when
//! no intervening effect can observe the difference; everything else lands
//! in a typed temporary. Blocks become labeled Rust blocks, loops become
//! labeled `loop`s, and every branch is a `break` or `continue` to a label.
//!
//! # Determinism
//!
//! The same module and options always produce the same text. The header
//! records a SHA-256 fingerprint of both.

mod builder;
mod classify;
pub mod error;
mod emit;
mod evaluate;
mod function;
mod ir;
mod module;
mod names;
pub mod options;
mod source;

use serde::Serialize;
use sha2::{Digest, Sha256};
use warp_exec::ExportDesc;
use warp_wasm::Module;

pub use error::{CompileError, CompileResult};
pub use options::CompileOptions;

/// The result of compiling one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledModule {
    /// Name of the emitted `pub mod`.
    pub name: String,
    /// The Rust source text.
    pub source: String,
    /// Hex SHA-256 over the input module and the options.
    pub fingerprint: String,
    /// Exports ordered by index, then name.
    pub exports: Vec<ExportDesc>,
}

/// Compiles `module` to Rust source.
pub fn compile(module: &Module, options: &CompileOptions) -> CompileResult<CompiledModule> {
    module::validate(module, options)?;
    let fingerprint = fingerprint(module, options)?;
    let source = module::assemble(module, options, &fingerprint)?;
    let exports = module
        .sorted_exports()
        .into_iter()
        .map(|e| ExportDesc {
            name: e.name.clone(),
            kind: e.kind,
            index: e.index,
        })
        .collect();

    tracing::debug!(
        module = %options.module_name,
        functions = module.function_count(),
        bytes = source.len(),
        "compiled module"
    );
    Ok(CompiledModule {
        name: options.module_name.clone(),
        source,
        fingerprint,
        exports,
    })
}

/// Decodes and validates a binary module, then compiles it.
pub fn compile_bytes(bytes: &[u8], options: &CompileOptions) -> CompileResult<CompiledModule> {
    let module = warp_wasm::decode::parse(bytes)?;
    compile(&module, options)
}

fn fingerprint(module: &Module, options: &CompileOptions) -> CompileResult<String> {
    let summary = serde_json::to_vec(&(module, options))
        .map_err(|e| CompileError::Internal(format!("module summary: {e}")))?;
    let digest = Sha256::digest(&summary);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}
