//! Module assembly: validation, the `Instance` type, the two-phase
//! lifecycle and the ordered emission of every function item.

use std::collections::BTreeSet;

use warp_wasm::{ConstExpr, ExternKind, FuncType, Limits, Module, ValueType, PAGE_SIZE};

use crate::builder::Context;
use crate::emit::typed_literal;
use crate::error::{CompileError, CompileResult};
use crate::function::{self, func_type, value_type};
use crate::ir::{GlobalSlot, Literal};
use crate::names;
use crate::options::CompileOptions;
use crate::source::Source;

const LINTS: &str = "unused_imports, unused_mut, unused_variables, unused_assignments, \
unused_labels, unreachable_code, unreachable_patterns, unused_parens, unconditional_recursion, \
non_snake_case, non_camel_case_types, dead_code, clippy::all";

// ══════════════════════════════════════════════════════════════════════════════
// Validation
// ══════════════════════════════════════════════════════════════════════════════

/// Rejects what the generated module cannot express, before anything is
/// emitted.
pub(crate) fn validate(module: &Module, options: &CompileOptions) -> CompileResult<()> {
    if !names::is_identifier(&options.module_name) {
        return Err(CompileError::InvalidModuleName(options.module_name.clone()));
    }

    for export in &module.exports {
        match export.kind {
            ExternKind::Table if export.index != 0 => {
                return Err(CompileError::InvalidTableIndex(export.index))
            }
            ExternKind::Memory if export.index != 0 => {
                return Err(CompileError::InvalidMemoryIndex(export.index))
            }
            _ => {}
        }
    }

    if options.command {
        let start = module
            .export("_start")
            .filter(|e| e.kind == ExternKind::Func)
            .ok_or(CompileError::MissingStart)?;
        let ty = module
            .function_type(start.index)
            .ok_or(CompileError::MissingStart)?;
        if !ty.params().is_empty() || !ty.results().is_empty() {
            return Err(CompileError::InvalidStartSignature(ty.to_string()));
        }
    }

    let local_table = module.imported_table().is_none();
    for (segment, element) in module.elements.iter().enumerate() {
        let table = module
            .table_type()
            .filter(|_| element.table == 0)
            .ok_or(CompileError::InvalidTableIndex(element.table))?;
        if let (true, Some(offset)) = (local_table, element.offset.as_i32()) {
            let offset = offset as u32;
            let len = element.functions.len() as u32;
            if offset as u64 + len as u64 > table.limits.min as u64 {
                return Err(CompileError::ElementSegmentDoesNotFit {
                    segment,
                    offset,
                    len,
                    size: table.limits.min,
                });
            }
        }
    }

    let local_memory = module.imported_memory().is_none();
    for (segment, data) in module.data.iter().enumerate() {
        let memory = module
            .memory_type()
            .filter(|_| data.memory == 0)
            .ok_or(CompileError::InvalidMemoryIndex(data.memory))?;
        if let (true, Some(offset)) = (local_memory, data.offset.as_i32()) {
            let offset = offset as u32;
            let len = data.bytes.len() as u32;
            let size = memory.limits.min as u64 * PAGE_SIZE as u64;
            if offset as u64 + len as u64 > size {
                return Err(CompileError::DataSegmentDoesNotFit {
                    segment,
                    offset,
                    len,
                    size,
                });
            }
        }
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Rendering helpers
// ══════════════════════════════════════════════════════════════════════════════

fn limits(limits: &Limits) -> String {
    match limits.max {
        Some(max) => format!("Limits::new({}, Some({max}))", limits.min),
        None => format!("Limits::new({}, None)", limits.min),
    }
}

fn const_literal(expr: ConstExpr) -> Option<Literal> {
    match expr {
        ConstExpr::I32(v) => Some(Literal::I32(v)),
        ConstExpr::I64(v) => Some(Literal::I64(v)),
        ConstExpr::F32(bits) => Some(Literal::F32(bits)),
        ConstExpr::F64(bits) => Some(Literal::F64(bits)),
        ConstExpr::GlobalGet(_) => None,
    }
}

/// `b"..."` with printable ASCII kept as-is.
fn byte_string(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len() + 3);
    text.push_str("b\"");
    for &byte in bytes {
        match byte {
            b'"' | b'\\' => text.push_str(&format!("\\x{byte:02x}")),
            0x20..=0x7e => text.push(byte as char),
            _ => text.push_str(&format!("\\x{byte:02x}")),
        }
    }
    text.push('"');
    text
}

/// How compiled code reaches each global, by global index.
pub(crate) fn global_slots(module: &Module) -> Vec<(GlobalSlot, ValueType)> {
    let imported = module.imported_global_count();
    (0..module.global_count())
        .filter_map(|index| {
            let ty = module.global_type(index)?;
            let slot = if index < imported {
                GlobalSlot::Imported
            } else if module.is_exported(ExternKind::Global, index) {
                GlobalSlot::Exported
            } else {
                GlobalSlot::Private
            };
            Some((slot, ty.content))
        })
        .collect()
}

// ══════════════════════════════════════════════════════════════════════════════
// Assembler
// ══════════════════════════════════════════════════════════════════════════════

struct Assembler<'a> {
    module: &'a Module,
    options: &'a CompileOptions,
    names: Vec<String>,
    globals: Vec<(GlobalSlot, ValueType)>,
    /// Functions that get a raw-ABI thunk.
    thunks: BTreeSet<u32>,
    out: Source,
}

/// Emits the complete `pub mod` for `module`.
pub(crate) fn assemble(
    module: &Module,
    options: &CompileOptions,
    fingerprint: &str,
) -> CompileResult<String> {
    let imported = module.imported_function_count();
    let mut thunks = BTreeSet::new();
    for export in &module.exports {
        if export.kind == ExternKind::Func && export.index >= imported {
            thunks.insert(export.index);
        }
    }
    for element in &module.elements {
        thunks.extend(element.functions.iter().filter(|&&f| f >= imported));
    }
    thunks.extend(module.start.filter(|&s| s >= imported));

    let mut asm = Assembler {
        module,
        options,
        names: names::function_names(module),
        globals: global_slots(module),
        thunks,
        out: Source::new(),
    };

    asm.out.line(format!(
        "// Code generated by warp-compiler {}. DO NOT EDIT.",
        env!("CARGO_PKG_VERSION")
    ));
    asm.out.line(format!("// fingerprint: sha256:{fingerprint}"));
    asm.out.blank();
    asm.out.line(format!("#[allow({LINTS})]"));
    asm.out.open(format!("pub mod {} {{", options.module_name));
    asm.prelude();
    asm.statics();
    asm.instance();
    asm.lifecycle()?;
    asm.functions()?;
    asm.out.close("}");
    Ok(asm.out.finish())
}

impl Assembler<'_> {
    fn name(&self, index: u32) -> CompileResult<&str> {
        self.names
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| CompileError::Internal(format!("unnamed function {index}")))
    }

    fn signature(&self, index: u32) -> CompileResult<&FuncType> {
        self.module
            .function_type(index)
            .ok_or_else(|| CompileError::Internal(format!("unknown function {index}")))
    }

    fn prelude(&mut self) {
        self.out.line("use std::cell::{Cell, OnceCell};");
        self.out.line("use std::rc::{Rc, Weak};");
        self.out.blank();
        self.out.line(format!(
            "use {}::{{numerics, AllocatedModule, CompiledFunction, ExportDesc, Extern, ExternKind, FrameInfo, FuncRef, FuncType, Function, Global, GlobalType, ImportResolver, Limits, LinkError, Memory, MemoryType, Module, ModuleDefinition, Table, TableType, Thread, Trap, Value, ValueType}};",
            self.options.runtime_path
        ));
        self.out.blank();
    }

    fn statics(&mut self) {
        self.out.line(format!(
            "pub const NAME: &str = {:?};",
            self.options.module_name
        ));
        self.out.blank();

        self.out
            .open("pub static EXPORTS: &[(&str, ExternKind, u32)] = &[");
        for export in self.module.sorted_exports() {
            let kind = match export.kind {
                ExternKind::Func => "Func",
                ExternKind::Table => "Table",
                ExternKind::Memory => "Memory",
                ExternKind::Global => "Global",
            };
            self.out.line(format!(
                "({:?}, ExternKind::{kind}, {}),",
                export.name, export.index
            ));
        }
        self.out.close("];");
        self.out.blank();

        for (i, data) in self.module.data.iter().enumerate() {
            self.out
                .line(format!("static DATA_{i}: &[u8] = {};", byte_string(&data.bytes)));
        }
        if !self.module.data.is_empty() {
            self.out.blank();
        }
    }

    // ── Instance ──

    fn instance(&mut self) {
        let module = self.module;
        let imported = module.imported_function_count();

        self.out.line("pub struct Definition;");
        self.out.blank();
        self.out.open("impl ModuleDefinition for Definition {");
        self.out.open(
            "fn allocate(&self, name: &str) -> Result<Rc<dyn AllocatedModule>, LinkError> {",
        );
        self.out
            .line("let instance: Rc<dyn AllocatedModule> = Instance::allocate(name)?;");
        self.out.line("Ok(instance)");
        self.out.close("}");
        self.out.close("}");
        self.out.blank();

        self.out.open("pub struct Instance {");
        self.out.line("this: Weak<Instance>,");
        self.out.line("name: String,");
        self.out.line("linked: Cell<bool>,");
        self.out.line("ready: Cell<bool>,");
        for index in 0..imported {
            self.out.line(format!("fi{index}: OnceCell<FuncRef>,"));
        }
        match (module.imported_memory(), module.memory_type()) {
            (Some(_), _) => self.out.line("memory: OnceCell<Memory>,"),
            (None, Some(_)) => self.out.line("memory: Memory,"),
            (None, None) => {}
        }
        match (module.imported_table(), module.table_type()) {
            (Some(_), _) => self.out.line("table: OnceCell<Table>,"),
            (None, Some(_)) => self.out.line("table: Table,"),
            (None, None) => {}
        }
        for (index, (slot, ty)) in self.globals.iter().enumerate() {
            match slot {
                GlobalSlot::Imported => self.out.line(format!("g{index}: OnceCell<Global>,")),
                GlobalSlot::Exported => self.out.line(format!("g{index}: Global,")),
                GlobalSlot::Private => {
                    self.out.line(format!("g{index}: Cell<{}>,", ty.name()))
                }
            }
        }
        self.out.close("}");
        self.out.blank();

        self.out.open("impl Instance {");
        self.allocate();
        self.accessors();
        self.out.close("}");
        self.out.blank();
    }

    fn allocate(&mut self) {
        let module = self.module;
        self.out
            .open("pub fn allocate(name: &str) -> Result<Rc<Instance>, LinkError> {");
        let local_memory = module.memories.first().filter(|_| module.imported_memory().is_none());
        if let Some(ty) = local_memory {
            self.out.line(format!(
                "let memory = Memory::new(MemoryType {{ limits: {} }})?;",
                limits(&ty.limits)
            ));
        }
        let local_table = module.tables.first().filter(|_| module.imported_table().is_none());
        if let Some(ty) = local_table {
            self.out.line(format!(
                "let table = Table::new(TableType {{ limits: {} }});",
                limits(&ty.limits)
            ));
        }
        self.out.open("Ok(Rc::new_cyclic(|this| Instance {");
        self.out.line("this: this.clone(),");
        self.out.line("name: name.to_string(),");
        self.out.line("linked: Cell::new(false),");
        self.out.line("ready: Cell::new(false),");
        for index in 0..module.imported_function_count() {
            self.out.line(format!("fi{index}: OnceCell::new(),"));
        }
        match (module.imported_memory(), local_memory) {
            (Some(_), _) => self.out.line("memory: OnceCell::new(),"),
            (None, Some(_)) => self.out.line("memory,"),
            (None, None) => {}
        }
        match (module.imported_table(), local_table) {
            (Some(_), _) => self.out.line("table: OnceCell::new(),"),
            (None, Some(_)) => self.out.line("table,"),
            (None, None) => {}
        }
        for index in 0..self.globals.len() {
            let (slot, ty) = self.globals[index];
            let mutable = module
                .global_type(index as u32)
                .map_or(false, |g| g.mutable);
            match slot {
                GlobalSlot::Imported => self.out.line(format!("g{index}: OnceCell::new(),")),
                GlobalSlot::Exported => self.out.line(format!(
                    "g{index}: Global::new(Value::zero({}), {mutable}),",
                    value_type(ty)
                )),
                GlobalSlot::Private => {
                    let zero = crate::ir::Type::from(ty).zero();
                    self.out.line(format!("g{index}: Cell::new({zero}),"))
                }
            }
        }
        self.out.close("}))");
        self.out.close("}");
        self.out.blank();
    }

    fn accessors(&mut self) {
        let module = self.module;
        self.out.open("fn check_ready(&self) -> Result<(), Trap> {");
        self.out.open("if self.ready.get() {");
        self.out.line("Ok(())");
        self.out.reopen("} else {");
        self.out.line("Err(Trap::UninitializedModule)");
        self.out.close("}");
        self.out.close("}");

        match (module.imported_memory(), module.memory_type()) {
            (Some(_), _) => {
                self.out.blank();
                self.out.open("fn mem0(&self) -> Result<&Memory, Trap> {");
                self.out
                    .line("self.memory.get().ok_or(Trap::UninitializedModule)");
                self.out.close("}");
            }
            (None, Some(_)) => {
                self.out.blank();
                self.out.open("fn mem0(&self) -> Result<&Memory, Trap> {");
                self.out.line("Ok(&self.memory)");
                self.out.close("}");
            }
            (None, None) => {}
        }
        match (module.imported_table(), module.table_type()) {
            (Some(_), _) => {
                self.out.blank();
                self.out.open("fn table0(&self) -> Result<&Table, Trap> {");
                self.out
                    .line("self.table.get().ok_or(Trap::UninitializedModule)");
                self.out.close("}");
            }
            (None, Some(_)) => {
                self.out.blank();
                self.out.open("fn table0(&self) -> Result<&Table, Trap> {");
                self.out.line("Ok(&self.table)");
                self.out.close("}");
            }
            (None, None) => {}
        }
        for index in 0..self.globals.len() {
            if self.globals[index].0 == GlobalSlot::Imported {
                self.out.blank();
                self.out
                    .open(format!("fn g{index}(&self) -> Result<&Global, Trap> {{"));
                self.out.line(format!(
                    "self.g{index}.get().ok_or(Trap::UninitializedModule)"
                ));
                self.out.close("}");
            }
        }
    }

    // ── Lifecycle ──

    fn lifecycle(&mut self) -> CompileResult<()> {
        self.func_ref()?;
        self.module_impl()?;
        self.instantiate()?;
        if self.options.command {
            self.run_start()?;
        }
        Ok(())
    }

    fn func_ref(&mut self) -> CompileResult<()> {
        self.out
            .open("fn func_ref(this: &Rc<Instance>, index: u32) -> Option<FuncRef> {");
        self.out.open("match index {");
        for index in 0..self.module.imported_function_count() {
            self.out
                .line(format!("{index} => this.fi{index}.get().cloned(),"));
        }
        let thunks: Vec<u32> = self.thunks.iter().copied().collect();
        for index in thunks {
            let ty = func_type(self.signature(index)?);
            let name = self.name(index)?.to_string();
            self.out.open(format!("{index} => {{"));
            self.out.line(format!(
                "let f: FuncRef = Rc::new(CompiledFunction::new(this.clone(), {ty}, {name}_thunk));"
            ));
            self.out.line("Some(f)");
            self.out.close("}");
        }
        self.out.line("_ => None,");
        self.out.close("}");
        self.out.close("}");
        self.out.blank();
        Ok(())
    }

    fn module_impl(&mut self) -> CompileResult<()> {
        let module = self.module;
        self.out.open("impl Module for Instance {");
        self.out.open("fn name(&self) -> &str {");
        self.out.line("&self.name");
        self.out.close("}");
        self.out.blank();
        self.out.open("fn exports(&self) -> Vec<ExportDesc> {");
        self.out.line("EXPORTS");
        self.out.line("    .iter()");
        self.out.line("    .map(|(name, kind, index)| ExportDesc { name: name.to_string(), kind: *kind, index: *index })");
        self.out.line("    .collect()");
        self.out.close("}");
        self.out.blank();
        self.out.open("fn export(&self, name: &str) -> Option<Extern> {");
        self.out.open("match name {");
        for export in module.sorted_exports() {
            let index = export.index;
            let value = match export.kind {
                ExternKind::Func => {
                    format!("func_ref(&self.this.upgrade()?, {index}).map(Extern::Func)")
                }
                ExternKind::Memory if module.imported_memory().is_some() => {
                    "self.memory.get().cloned().map(Extern::Memory)".to_string()
                }
                ExternKind::Memory => "Some(Extern::Memory(self.memory.clone()))".to_string(),
                ExternKind::Table if module.imported_table().is_some() => {
                    "self.table.get().cloned().map(Extern::Table)".to_string()
                }
                ExternKind::Table => "Some(Extern::Table(self.table.clone()))".to_string(),
                ExternKind::Global => match self.globals.get(index as usize) {
                    Some((GlobalSlot::Imported, _)) => {
                        format!("self.g{index}.get().cloned().map(Extern::Global)")
                    }
                    Some((GlobalSlot::Exported, _)) => {
                        format!("Some(Extern::Global(self.g{index}.clone()))")
                    }
                    _ => {
                        return Err(CompileError::Internal(format!(
                            "exported global {index} has no shared cell"
                        )))
                    }
                },
            };
            self.out.line(format!("{:?} => {value},", export.name));
        }
        self.out.line("_ => None,");
        self.out.close("}");
        self.out.close("}");
        self.out.close("}");
        self.out.blank();
        Ok(())
    }

    fn instantiate(&mut self) -> CompileResult<()> {
        let module = self.module;
        self.out.open("impl AllocatedModule for Instance {");
        self.out.open("fn instantiate(self: Rc<Self>, imports: &mut dyn ImportResolver) -> Result<Rc<dyn Module>, LinkError> {");
        self.out.open("if self.linked.replace(true) {");
        self.out
            .line("return Err(LinkError::AlreadyInstantiated(self.name.clone()));");
        self.out.close("}");

        // Imports, in kind order.
        for (index, (import, ty)) in module.imported_functions().enumerate() {
            let ty = module
                .types
                .get(ty as usize)
                .ok_or_else(|| CompileError::Internal(format!("unknown type {ty}")))?;
            self.out.line(format!(
                "let f{index} = imports.resolve_function({:?}, {:?}, &{})?;",
                import.module,
                import.field,
                func_type(ty)
            ));
            self.out.line(format!("let _ = self.fi{index}.set(f{index});"));
        }
        match (module.imported_memory(), module.memory_type()) {
            (Some((import, ty)), _) => {
                self.out.line(format!(
                    "let memory = imports.resolve_memory({:?}, {:?}, &MemoryType {{ limits: {} }})?;",
                    import.module,
                    import.field,
                    limits(&ty.limits)
                ));
                self.out.line("let _ = self.memory.set(memory.clone());");
            }
            (None, Some(_)) => self.out.line("let memory = self.memory.clone();"),
            (None, None) => {}
        }
        match (module.imported_table(), module.table_type()) {
            (Some((import, ty)), _) => {
                self.out.line(format!(
                    "let table = imports.resolve_table({:?}, {:?}, &TableType {{ limits: {} }})?;",
                    import.module,
                    import.field,
                    limits(&ty.limits)
                ));
                self.out.line("let _ = self.table.set(table.clone());");
            }
            (None, Some(_)) => self.out.line("let table = self.table.clone();"),
            (None, None) => {}
        }
        for (index, (import, ty)) in module.imported_globals().enumerate() {
            self.out.line(format!(
                "let g{index} = imports.resolve_global({:?}, {:?}, &GlobalType::new({}, {}))?;",
                import.module,
                import.field,
                value_type(ty.content),
                ty.mutable
            ));
            self.out.line(format!("let _ = self.g{index}.set(g{index}.clone());"));
        }

        // Local globals, in declaration order.
        let first = module.imported_global_count();
        for (i, global) in module.globals.iter().enumerate() {
            let index = first as usize + i;
            let value = self.const_value(global.init)?;
            let line = match self.globals.get(index) {
                Some((GlobalSlot::Exported, ty)) => {
                    format!("self.g{index}.set_{}({value});", ty.name())
                }
                _ => format!("self.g{index}.set({value});"),
            };
            self.out.line(line);
        }

        // Segment bounds, checked before anything is written.
        for (i, element) in module.elements.iter().enumerate() {
            let offset = self.const_value(element.offset)?;
            self.out.line(format!("let e{i} = {offset} as u32;"));
        }
        for (i, data) in module.data.iter().enumerate() {
            let offset = self.const_value(data.offset)?;
            self.out.line(format!("let d{i} = {offset} as u32;"));
        }
        for (i, element) in module.elements.iter().enumerate() {
            self.out.line(format!(
                "table.check_segment({i}, e{i}, {})?;",
                element.functions.len()
            ));
        }
        for (i, data) in module.data.iter().enumerate() {
            self.out.line(format!(
                "memory.check_segment({i}, d{i}, {})?;",
                data.bytes.len()
            ));
        }
        for (i, element) in module.elements.iter().enumerate() {
            let refs: Vec<String> = element
                .functions
                .iter()
                .map(|f| format!("func_ref(&self, {f})"))
                .collect();
            self.out.line(format!(
                "table.init_segment({i}, e{i}, vec![{}])?;",
                refs.join(", ")
            ));
        }
        for i in 0..module.data.len() {
            self.out
                .line(format!("memory.init_segment({i}, d{i}, DATA_{i})?;"));
        }

        self.out.line("self.ready.set(true);");
        if let Some(start) = module.start {
            let name = self.name(start)?.to_string();
            self.out.line(format!(
                "{name}(&self, &mut Thread::new(0)).map_err(LinkError::Start)?;"
            ));
        }
        self.out.line("Ok(self)");
        self.out.close("}");
        self.out.blank();
        self.out
            .open("fn into_module(self: Rc<Self>) -> Rc<dyn Module> {");
        self.out.line("self");
        self.out.close("}");
        self.out.close("}");
        self.out.blank();
        Ok(())
    }

    /// A constant expression inside `instantiate`, where each imported
    /// global `gN` is a local binding.
    fn const_value(&self, expr: ConstExpr) -> CompileResult<String> {
        if let Some(lit) = const_literal(expr) {
            return Ok(typed_literal(lit));
        }
        match expr {
            ConstExpr::GlobalGet(index) => {
                let ty = self
                    .module
                    .global_type(index)
                    .filter(|_| index < self.module.imported_global_count())
                    .ok_or_else(|| {
                        CompileError::Unsupported(format!(
                            "constant expression reads local global {index}"
                        ))
                    })?;
                Ok(format!("g{index}.get_{}()", ty.content.name()))
            }
            _ => Err(CompileError::Internal("unrenderable constant".to_string())),
        }
    }

    fn run_start(&mut self) -> CompileResult<()> {
        let start = self
            .module
            .export("_start")
            .ok_or(CompileError::MissingStart)?;
        let name = self.name(start.index)?.to_string();
        self.out.line("/// Runs `_start` on a ready instance.");
        self.out.open(
            "pub fn run_start(instance: &Instance, thread: &mut Thread) -> Result<(), Trap> {",
        );
        self.out.line("instance.check_ready()?;");
        self.out.line("let depth = thread.depth();");
        self.out.line(format!("let result = {name}(instance, thread);"));
        self.out.open("if result.is_err() {");
        self.out.line("thread.unwind(depth);");
        self.out.close("}");
        self.out.line("result");
        self.out.close("}");
        self.out.blank();
        Ok(())
    }

    // ── Functions ──

    fn functions(&mut self) -> CompileResult<()> {
        let module = self.module;
        let ctx = Context {
            names: &self.names,
            globals: &self.globals,
            untyped_literals: self.options.untyped_literals,
        };
        let out = &mut self.out;
        let name = |index: u32| {
            ctx.names
                .get(index as usize)
                .ok_or_else(|| CompileError::Internal(format!("unnamed function {index}")))
        };
        let signature = |index: u32| {
            module
                .function_type(index)
                .ok_or_else(|| CompileError::Internal(format!("unknown function {index}")))
        };

        let imported = module.imported_function_count();
        let mut indirect = BTreeSet::new();
        for index in 0..module.function_count() {
            if index < imported {
                function::import_shim(out, signature(index)?, name(index)?, index);
            } else {
                let used = function::body(out, module, &ctx, &self.options.module_name, index)?;
                indirect.extend(used);
            }
        }
        for &index in &self.thunks {
            function::thunk(out, signature(index)?, name(index)?);
        }
        for type_index in indirect {
            let ty = module
                .types
                .get(type_index as usize)
                .ok_or_else(|| CompileError::Internal(format!("unknown type {type_index}")))?;
            function::indirect_helper(out, ty, type_index);
        }
        Ok(())
    }
}
