//! Index resolution while walking a function body.

use crate::module::Module;
use crate::types::{BlockType, FuncType, GlobalType, ValueType};

/// Resolves the indices an instruction can mention.
///
/// Implemented by [`Module`] for module-level lookups and by
/// [`FunctionScope`], which adds the locals of one function.
pub trait Scope {
    /// Signature of a function in the combined function index space.
    fn function_type(&self, index: u32) -> Option<&FuncType>;

    /// Signature at a type-section index.
    fn signature(&self, type_index: u32) -> Option<&FuncType>;

    fn global_type(&self, index: u32) -> Option<GlobalType>;

    fn has_table(&self) -> bool;

    fn has_memory(&self) -> bool;

    /// Type of a local slot (parameters first). Module scope has no locals.
    fn local_type(&self, _index: u32) -> Option<ValueType> {
        None
    }

    /// The `(ins, outs)` of a block type.
    fn block_type(&self, ty: BlockType) -> Option<(Vec<ValueType>, Vec<ValueType>)> {
        match ty {
            BlockType::Empty => Some((Vec::new(), Vec::new())),
            BlockType::Value(v) => Some((Vec::new(), vec![v])),
            BlockType::Func(index) => self
                .signature(index)
                .map(|sig| (sig.params().to_vec(), sig.results().to_vec())),
        }
    }
}

impl Scope for Module {
    fn function_type(&self, index: u32) -> Option<&FuncType> {
        Module::function_type(self, index)
    }

    fn signature(&self, type_index: u32) -> Option<&FuncType> {
        self.types.get(type_index as usize)
    }

    fn global_type(&self, index: u32) -> Option<GlobalType> {
        Module::global_type(self, index)
    }

    fn has_table(&self) -> bool {
        self.table_count() > 0
    }

    fn has_memory(&self) -> bool {
        self.memory_count() > 0
    }
}

/// The scope of one function: module lookups plus its local slots.
pub struct FunctionScope<'a> {
    module: &'a Module,
    ty: &'a FuncType,
    locals: Vec<ValueType>,
}

impl<'a> FunctionScope<'a> {
    /// Builds the scope for a function with signature `ty` and declared
    /// locals `declared`.
    pub fn new(module: &'a Module, ty: &'a FuncType, declared: &[ValueType]) -> Self {
        let mut locals = ty.params().to_vec();
        locals.extend_from_slice(declared);
        Self { module, ty, locals }
    }

    pub fn module(&self) -> &'a Module {
        self.module
    }

    pub fn func_type(&self) -> &'a FuncType {
        self.ty
    }

    /// All local slots, parameters first.
    pub fn locals(&self) -> &[ValueType] {
        &self.locals
    }
}

impl Scope for FunctionScope<'_> {
    fn function_type(&self, index: u32) -> Option<&FuncType> {
        Module::function_type(self.module, index)
    }

    fn signature(&self, type_index: u32) -> Option<&FuncType> {
        self.module.types.get(type_index as usize)
    }

    fn global_type(&self, index: u32) -> Option<GlobalType> {
        Module::global_type(self.module, index)
    }

    fn has_table(&self) -> bool {
        self.module.has_table()
    }

    fn has_memory(&self) -> bool {
        self.module.has_memory()
    }

    fn local_type(&self, index: u32) -> Option<ValueType> {
        self.locals.get(index as usize).copied()
    }
}
