//! Module lifecycle traits and import resolution.
//!
//! A module goes through two phases. [`ModuleDefinition::allocate`] builds
//! an instance with its own memories and tables but no imports, and
//! [`AllocatedModule::instantiate`] resolves the imports, runs the
//! initializers and yields a ready [`Module`]. Keeping the phases apart lets
//! two modules import functions from each other.

use std::collections::HashMap;
use std::rc::Rc;

use serde::Serialize;
use warp_wasm::{ExternKind, FuncType, GlobalType, MemoryType, TableType};

use crate::error::LinkError;
use crate::function::FuncRef;
use crate::global::Global;
use crate::memory::Memory;
use crate::table::Table;

/// An exported entity.
#[derive(Clone)]
pub enum Extern {
    Func(FuncRef),
    Table(Table),
    Memory(Memory),
    Global(Global),
}

impl Extern {
    pub fn kind(&self) -> ExternKind {
        match self {
            Extern::Func(_) => ExternKind::Func,
            Extern::Table(_) => ExternKind::Table,
            Extern::Memory(_) => ExternKind::Memory,
            Extern::Global(_) => ExternKind::Global,
        }
    }
}

/// One entry of [`Module::exports`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportDesc {
    pub name: String,
    pub kind: ExternKind,
    pub index: u32,
}

/// A ready module instance.
pub trait Module {
    fn name(&self) -> &str;

    /// Exports ordered by index, then name.
    fn exports(&self) -> Vec<ExportDesc>;

    fn export(&self, name: &str) -> Option<Extern>;

    fn get_function(&self, name: &str) -> Result<FuncRef, LinkError> {
        match self.export(name) {
            Some(Extern::Func(f)) => Ok(f),
            other => Err(lookup_error(self.name(), name, ExternKind::Func, other)),
        }
    }

    fn get_table(&self, name: &str) -> Result<Table, LinkError> {
        match self.export(name) {
            Some(Extern::Table(t)) => Ok(t),
            other => Err(lookup_error(self.name(), name, ExternKind::Table, other)),
        }
    }

    fn get_memory(&self, name: &str) -> Result<Memory, LinkError> {
        match self.export(name) {
            Some(Extern::Memory(m)) => Ok(m),
            other => Err(lookup_error(self.name(), name, ExternKind::Memory, other)),
        }
    }

    fn get_global(&self, name: &str) -> Result<Global, LinkError> {
        match self.export(name) {
            Some(Extern::Global(g)) => Ok(g),
            other => Err(lookup_error(self.name(), name, ExternKind::Global, other)),
        }
    }
}

fn lookup_error(module: &str, field: &str, expected: ExternKind, found: Option<Extern>) -> LinkError {
    match found {
        None => LinkError::ExportNotFound {
            module: module.to_string(),
            field: field.to_string(),
        },
        Some(other) => LinkError::KindMismatch {
            module: module.to_string(),
            field: field.to_string(),
            expected,
            actual: other.kind(),
        },
    }
}

/// An instance whose own entities exist but whose imports are unresolved.
///
/// Its exported functions may already be handed out; calling one before
/// instantiation finishes traps `UninitializedModule`.
pub trait AllocatedModule: Module {
    fn instantiate(
        self: Rc<Self>,
        imports: &mut dyn ImportResolver,
    ) -> Result<Rc<dyn Module>, LinkError>;

    fn into_module(self: Rc<Self>) -> Rc<dyn Module>;
}

/// Something that can be allocated under a name, typically a compiled
/// module's `Definition`.
pub trait ModuleDefinition {
    fn allocate(&self, name: &str) -> Result<Rc<dyn AllocatedModule>, LinkError>;
}

/// Supplies the imports of a module being instantiated.
pub trait ImportResolver {
    fn resolve_function(
        &mut self,
        module: &str,
        name: &str,
        ty: &FuncType,
    ) -> Result<FuncRef, LinkError>;

    fn resolve_table(&mut self, module: &str, name: &str, ty: &TableType)
        -> Result<Table, LinkError>;

    fn resolve_memory(
        &mut self,
        module: &str,
        name: &str,
        ty: &MemoryType,
    ) -> Result<Memory, LinkError>;

    fn resolve_global(
        &mut self,
        module: &str,
        name: &str,
        ty: &GlobalType,
    ) -> Result<Global, LinkError>;
}

/// Maps module names to definitions.
pub trait ModuleResolver {
    fn resolve_module(&self, name: &str) -> Result<Rc<dyn ModuleDefinition>, LinkError>;
}

/// A [`ModuleResolver`] backed by a map.
#[derive(Default)]
pub struct MapResolver {
    definitions: HashMap<String, Rc<dyn ModuleDefinition>>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, definition: impl ModuleDefinition + 'static) -> Self {
        self.insert(name, Rc::new(definition));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, definition: Rc<dyn ModuleDefinition>) {
        self.definitions.insert(name.into(), definition);
    }
}

impl ModuleResolver for MapResolver {
    fn resolve_module(&self, name: &str) -> Result<Rc<dyn ModuleDefinition>, LinkError> {
        self.definitions
            .get(name)
            .cloned()
            .ok_or_else(|| LinkError::ModuleNotFound(name.to_string()))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Import Type Checks
// ══════════════════════════════════════════════════════════════════════════════

/// Checks a resolved function against the declared import type.
pub fn check_function(
    module: &str,
    field: &str,
    expected: &FuncType,
    func: &FuncRef,
) -> Result<(), LinkError> {
    if func.func_type() != expected {
        return Err(LinkError::FunctionTypeMismatch {
            module: module.to_string(),
            field: field.to_string(),
            expected: expected.clone(),
            actual: func.func_type().clone(),
        });
    }
    Ok(())
}

/// Checks a resolved table's current size and maximum against the
/// declared limits.
pub fn check_table(
    module: &str,
    field: &str,
    expected: &TableType,
    table: &Table,
) -> Result<(), LinkError> {
    let actual = table.ty().limits;
    if !actual.satisfies(&expected.limits) {
        return Err(LinkError::TableTypeMismatch {
            module: module.to_string(),
            field: field.to_string(),
            expected: expected.limits,
            actual,
        });
    }
    Ok(())
}

pub fn check_memory(
    module: &str,
    field: &str,
    expected: &MemoryType,
    memory: &Memory,
) -> Result<(), LinkError> {
    let actual = memory.ty().limits;
    if !actual.satisfies(&expected.limits) {
        return Err(LinkError::MemoryTypeMismatch {
            module: module.to_string(),
            field: field.to_string(),
            expected: expected.limits,
            actual,
        });
    }
    Ok(())
}

/// Value type and mutability must both match.
pub fn check_global(
    module: &str,
    field: &str,
    expected: &GlobalType,
    global: &Global,
) -> Result<(), LinkError> {
    if global.ty() != *expected {
        return Err(LinkError::GlobalTypeMismatch {
            module: module.to_string(),
            field: field.to_string(),
            expected: *expected,
            actual: global.ty(),
        });
    }
    Ok(())
}
