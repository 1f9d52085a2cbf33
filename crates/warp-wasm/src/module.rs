//! The decoded module representation.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::instruction::Instruction;
use crate::types::{ExternKind, FuncType, GlobalType, MemoryType, TableType, ValueType};

// ══════════════════════════════════════════════════════════════════════════════
// Entries
// ══════════════════════════════════════════════════════════════════════════════

/// An import entry: `(module, field)` plus what is being imported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Import {
    pub module: String,
    pub field: String,
    pub desc: ImportDesc,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ImportDesc {
    /// A function with the given type index.
    Func(u32),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
}

impl ImportDesc {
    pub fn kind(&self) -> ExternKind {
        match self {
            ImportDesc::Func(_) => ExternKind::Func,
            ImportDesc::Table(_) => ExternKind::Table,
            ImportDesc::Memory(_) => ExternKind::Memory,
            ImportDesc::Global(_) => ExternKind::Global,
        }
    }
}

/// A constant initializer expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConstExpr {
    I32(i32),
    I64(i64),
    /// Raw IEEE-754 bits.
    F32(u32),
    /// Raw IEEE-754 bits.
    F64(u64),
    /// The value of an imported global.
    GlobalGet(u32),
}

impl ConstExpr {
    /// The constant as an `i32`, when it is one.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            ConstExpr::I32(v) => Some(*v),
            _ => None,
        }
    }
}

/// A locally defined global.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Global {
    pub ty: GlobalType,
    pub init: ConstExpr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Export {
    pub name: String,
    pub kind: ExternKind,
    pub index: u32,
}

/// An active element segment of function indices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementSegment {
    pub table: u32,
    pub offset: ConstExpr,
    pub functions: Vec<u32>,
}

/// An active data segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSegment {
    pub memory: u32,
    pub offset: ConstExpr,
    pub bytes: Vec<u8>,
}

/// A local function body. `locals` holds the declared locals only (the
/// parameters come from the signature). `code` ends with the `End` that
/// closes the function block.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FunctionBody {
    pub locals: Vec<ValueType>,
    pub code: Vec<Instruction>,
}

// ══════════════════════════════════════════════════════════════════════════════
// Module
// ══════════════════════════════════════════════════════════════════════════════

/// A validated, fully decoded module.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    /// Type index of each locally defined function.
    pub functions: Vec<u32>,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
    pub elements: Vec<ElementSegment>,
    pub data: Vec<DataSegment>,
    pub bodies: Vec<FunctionBody>,
    /// Function names from the `name` custom section, by function index.
    pub names: BTreeMap<u32, String>,
}

impl Module {
    // ── Imports ──

    fn imports_of(&self, kind: ExternKind) -> impl Iterator<Item = &Import> {
        self.imports.iter().filter(move |i| i.desc.kind() == kind)
    }

    /// Imported functions as `(import, type index)`, in function index order.
    pub fn imported_functions(&self) -> impl Iterator<Item = (&Import, u32)> {
        self.imports.iter().filter_map(|i| match i.desc {
            ImportDesc::Func(ty) => Some((i, ty)),
            _ => None,
        })
    }

    /// Imported globals as `(import, type)`, in global index order.
    pub fn imported_globals(&self) -> impl Iterator<Item = (&Import, GlobalType)> {
        self.imports.iter().filter_map(|i| match i.desc {
            ImportDesc::Global(ty) => Some((i, ty)),
            _ => None,
        })
    }

    pub fn imported_function_count(&self) -> u32 {
        self.imports_of(ExternKind::Func).count() as u32
    }

    pub fn imported_global_count(&self) -> u32 {
        self.imports_of(ExternKind::Global).count() as u32
    }

    /// The table 0 import, if table 0 is imported.
    pub fn imported_table(&self) -> Option<(&Import, TableType)> {
        self.imports.iter().find_map(|i| match i.desc {
            ImportDesc::Table(ty) => Some((i, ty)),
            _ => None,
        })
    }

    /// The memory 0 import, if memory 0 is imported.
    pub fn imported_memory(&self) -> Option<(&Import, MemoryType)> {
        self.imports.iter().find_map(|i| match i.desc {
            ImportDesc::Memory(ty) => Some((i, ty)),
            _ => None,
        })
    }

    // ── Index spaces ──

    pub fn function_count(&self) -> u32 {
        self.imported_function_count() + self.functions.len() as u32
    }

    /// Type index of function `index` in the combined function index space.
    pub fn function_type_index(&self, index: u32) -> Option<u32> {
        let imported = self.imported_function_count();
        if index < imported {
            self.imported_functions()
                .nth(index as usize)
                .map(|(_, ty)| ty)
        } else {
            self.functions.get((index - imported) as usize).copied()
        }
    }

    /// Signature of function `index` in the combined function index space.
    pub fn function_type(&self, index: u32) -> Option<&FuncType> {
        self.function_type_index(index)
            .and_then(|ty| self.types.get(ty as usize))
    }

    /// Body of function `index`, or `None` for imports.
    pub fn function_body(&self, index: u32) -> Option<&FunctionBody> {
        let imported = self.imported_function_count();
        index
            .checked_sub(imported)
            .and_then(|local| self.bodies.get(local as usize))
    }

    pub fn global_count(&self) -> u32 {
        self.imported_global_count() + self.globals.len() as u32
    }

    pub fn global_type(&self, index: u32) -> Option<GlobalType> {
        let imported = self.imported_global_count();
        if index < imported {
            self.imported_globals()
                .nth(index as usize)
                .map(|(_, ty)| ty)
        } else {
            self.globals
                .get((index - imported) as usize)
                .map(|g| g.ty)
        }
    }

    /// Type of table 0, imported or local.
    pub fn table_type(&self) -> Option<TableType> {
        self.imported_table()
            .map(|(_, ty)| ty)
            .or_else(|| self.tables.first().copied())
    }

    /// Type of memory 0, imported or local.
    pub fn memory_type(&self) -> Option<MemoryType> {
        self.imported_memory()
            .map(|(_, ty)| ty)
            .or_else(|| self.memories.first().copied())
    }

    pub fn table_count(&self) -> u32 {
        self.imports_of(ExternKind::Table).count() as u32 + self.tables.len() as u32
    }

    pub fn memory_count(&self) -> u32 {
        self.imports_of(ExternKind::Memory).count() as u32 + self.memories.len() as u32
    }

    // ── Exports ──

    /// Exports ordered by index, then by name. This is the order an
    /// instance reports them in.
    pub fn sorted_exports(&self) -> Vec<&Export> {
        let mut exports: Vec<&Export> = self.exports.iter().collect();
        exports.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.name.cmp(&b.name)));
        exports
    }

    pub fn export(&self, name: &str) -> Option<&Export> {
        self.exports.iter().find(|e| e.name == name)
    }

    pub fn is_exported(&self, kind: ExternKind, index: u32) -> bool {
        self.exports
            .iter()
            .any(|e| e.kind == kind && e.index == index)
    }

    pub fn function_name(&self, index: u32) -> Option<&str> {
        self.names.get(&index).map(String::as_str)
    }
}
