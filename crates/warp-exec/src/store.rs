//! The instance registry and two-phase linker.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, trace};
use warp_wasm::{ExternKind, FuncType, GlobalType, MemoryType, TableType};

use crate::error::LinkError;
use crate::function::FuncRef;
use crate::global::Global;
use crate::memory::Memory;
use crate::module::{
    check_function, check_global, check_memory, check_table, AllocatedModule, Extern,
    ImportResolver, Module, ModuleResolver,
};
use crate::table::Table;

/// Lifecycle notifications sent to handlers registered with
/// [`Store::on_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent<'a> {
    ModuleAllocated { name: &'a str },
    ModuleInstantiated { name: &'a str },
}

type EventHandler = Box<dyn FnMut(&StoreEvent<'_>)>;

/// Maps instance names to ready instances.
///
/// [`Store::instantiate_module`] resolves missing instances through the
/// store's [`ModuleResolver`], instantiating their dependencies first.
/// Modules that import each other's functions link through their allocated
/// handles; any other kind of import from a module that is still being
/// instantiated is a [`LinkError::CyclicImport`].
pub struct Store {
    resolver: Box<dyn ModuleResolver>,
    modules: HashMap<String, Rc<dyn Module>>,
    handlers: Vec<EventHandler>,
}

impl Store {
    pub fn new(resolver: impl ModuleResolver + 'static) -> Self {
        Self {
            resolver: Box::new(resolver),
            modules: HashMap::new(),
            handlers: Vec::new(),
        }
    }

    /// Registers a ready module, such as a host module, under `name`.
    pub fn register(&mut self, name: impl Into<String>, module: Rc<dyn Module>) -> Result<(), LinkError> {
        let name = name.into();
        if self.modules.contains_key(&name) {
            return Err(LinkError::AlreadyInstantiated(name));
        }
        debug!(module = %name, "registered module");
        self.modules.insert(name, module);
        Ok(())
    }

    pub fn get_module(&self, name: &str) -> Option<Rc<dyn Module>> {
        self.modules.get(name).cloned()
    }

    pub fn on_event(&mut self, handler: impl FnMut(&StoreEvent<'_>) + 'static) {
        self.handlers.push(Box::new(handler));
    }

    /// Returns the instance named `name`, instantiating it and its
    /// dependencies if needed.
    pub fn instantiate_module(&mut self, name: &str) -> Result<Rc<dyn Module>, LinkError> {
        let mut linker = Linker {
            store: self,
            allocated: HashMap::new(),
        };
        linker.instantiate(name)
    }

    fn emit(&mut self, event: StoreEvent<'_>) {
        for handler in &mut self.handlers {
            handler(&event);
        }
    }
}

/// Resolves imports for one top-level instantiation, tracking the modules
/// that are allocated but not yet ready.
struct Linker<'s> {
    store: &'s mut Store,
    allocated: HashMap<String, Rc<dyn AllocatedModule>>,
}

impl Linker<'_> {
    fn instantiate(&mut self, name: &str) -> Result<Rc<dyn Module>, LinkError> {
        if let Some(module) = self.store.modules.get(name) {
            return Ok(module.clone());
        }

        let definition = self.store.resolver.resolve_module(name)?;
        let allocated = definition.allocate(name)?;
        debug!(module = name, "allocated module");
        self.store.emit(StoreEvent::ModuleAllocated { name });

        self.allocated.insert(name.to_string(), allocated.clone());
        let result = allocated.instantiate(self);
        self.allocated.remove(name);

        let module = match result {
            Ok(module) => module,
            Err(err) => {
                debug!(module = name, %err, "instantiation failed");
                return Err(err);
            }
        };
        debug!(module = name, "instantiated module");
        self.store.modules.insert(name.to_string(), module.clone());
        self.store.emit(StoreEvent::ModuleInstantiated { name });
        Ok(module)
    }

    fn lookup(&mut self, module: &str, field: &str, kind: ExternKind) -> Result<Extern, LinkError> {
        trace!(module, field, %kind, "resolving import");
        let found = match self.allocated.get(module).cloned() {
            Some(_) if kind != ExternKind::Func => {
                return Err(LinkError::CyclicImport {
                    module: module.to_string(),
                    field: field.to_string(),
                });
            }
            Some(allocated) => allocated.export(field),
            None => self.instantiate(module)?.export(field),
        };
        found.ok_or_else(|| LinkError::ExportNotFound {
            module: module.to_string(),
            field: field.to_string(),
        })
    }
}

fn kind_mismatch(module: &str, field: &str, expected: ExternKind, found: &Extern) -> LinkError {
    LinkError::KindMismatch {
        module: module.to_string(),
        field: field.to_string(),
        expected,
        actual: found.kind(),
    }
}

impl ImportResolver for Linker<'_> {
    fn resolve_function(
        &mut self,
        module: &str,
        name: &str,
        ty: &FuncType,
    ) -> Result<FuncRef, LinkError> {
        match self.lookup(module, name, ExternKind::Func)? {
            Extern::Func(func) => {
                check_function(module, name, ty, &func)?;
                Ok(func)
            }
            other => Err(kind_mismatch(module, name, ExternKind::Func, &other)),
        }
    }

    fn resolve_table(&mut self, module: &str, name: &str, ty: &TableType) -> Result<Table, LinkError> {
        match self.lookup(module, name, ExternKind::Table)? {
            Extern::Table(table) => {
                check_table(module, name, ty, &table)?;
                Ok(table)
            }
            other => Err(kind_mismatch(module, name, ExternKind::Table, &other)),
        }
    }

    fn resolve_memory(
        &mut self,
        module: &str,
        name: &str,
        ty: &MemoryType,
    ) -> Result<Memory, LinkError> {
        match self.lookup(module, name, ExternKind::Memory)? {
            Extern::Memory(memory) => {
                check_memory(module, name, ty, &memory)?;
                Ok(memory)
            }
            other => Err(kind_mismatch(module, name, ExternKind::Memory, &other)),
        }
    }

    fn resolve_global(
        &mut self,
        module: &str,
        name: &str,
        ty: &GlobalType,
    ) -> Result<Global, LinkError> {
        match self.lookup(module, name, ExternKind::Global)? {
            Extern::Global(global) => {
                check_global(module, name, ty, &global)?;
                Ok(global)
            }
            other => Err(kind_mismatch(module, name, ExternKind::Global, &other)),
        }
    }
}
