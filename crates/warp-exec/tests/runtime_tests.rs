//! Tests for the runtime entities and the store linker.
//!
//! Tests validate:
//! - Thread depth accounting, exhaustion, unwinding and frame tracing
//! - Table and global access errors
//! - Host function signatures, typed calls and result checking
//! - Host module export ordering
//! - Store registration, resolution, events and import type checks

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use warp_exec::{
    check_function, check_global, check_memory, check_table, AllocatedModule, ExportDesc, Extern,
    ExternKind, FrameInfo, FuncType, Function, Global, GlobalError, GlobalType, HostFunction,
    HostModule, ImportResolver, Limits, LinkError, MapResolver, Memory, MemoryType, Module,
    ModuleDefinition, Store, StoreEvent, Table, TableType, Thread, Trap, Value, ValueType,
    WriterSink,
};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

static OUTER: FrameInfo = FrameInfo {
    module: "env",
    name: "outer",
    index: 0,
};

static INNER: FrameInfo = FrameInfo {
    module: "env",
    name: "inner",
    index: 1,
};

/// A `Write` that appends into a shared buffer so the test can read it back
/// after the sink moves into the thread.
#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).expect("trace output is UTF-8")
    }
}

fn func_type(params: &[ValueType], results: &[ValueType]) -> FuncType {
    FuncType::new(params.to_vec(), results.to_vec())
}

fn env_module() -> HostModule {
    HostModule::new("env")
        .func("add", |a: i32, b: i32| a.wrapping_add(b))
        .func("nop", || ())
        .memory(
            "memory",
            Memory::bounds_checked(MemoryType {
                limits: Limits::new(1, Some(2)),
            })
            .expect("allocation"),
        )
        .global("counter", Global::new(Value::I32(666), true))
        .table(
            "table",
            Table::new(TableType {
                limits: Limits::new(4, None),
            }),
        )
}

fn call_i32(func: &dyn Function, args: &[Value]) -> Vec<Value> {
    func.call(&mut Thread::new(0), args)
        .unwrap_or_else(|t| panic!("call trapped: {t}"))
}

// ══════════════════════════════════════════════════════════════════════════════
// Thread
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn thread_counts_depth() {
    let mut thread = Thread::new(2);
    assert_eq!(thread.max_depth(), 2);
    thread.enter(&OUTER).expect("first frame");
    thread.enter(&INNER).expect("second frame");
    assert_eq!(thread.depth(), 2);
    assert_eq!(thread.enter(&INNER), Err(Trap::CallStackExhausted));
    assert_eq!(thread.depth(), 2);
    thread.leave();
    thread.leave();
    assert_eq!(thread.depth(), 0);
}

#[test]
fn zero_max_depth_means_unlimited() {
    let thread = Thread::new(0);
    assert_eq!(thread.max_depth(), u32::MAX);
    assert_eq!(Thread::default().max_depth(), u32::MAX);
}

#[test]
fn unwind_restores_depth_and_frames() {
    let mut thread = Thread::new(0).debug();
    thread.enter(&OUTER).expect("enter");
    thread.enter(&INNER).expect("enter");
    thread.enter(&INNER).expect("enter");
    assert_eq!(thread.frames().len(), 3);
    thread.unwind(1);
    assert_eq!(thread.depth(), 1);
    assert_eq!(thread.frames(), &[&OUTER]);
    thread.unwind(2);
    assert_eq!(thread.depth(), 1);
}

#[test]
fn frames_are_not_recorded_by_default() {
    let mut thread = Thread::new(0);
    thread.enter(&OUTER).expect("enter");
    assert!(thread.frames().is_empty());
}

#[test]
fn writer_sink_traces_calls() {
    let buf = SharedBuf::default();
    let mut thread = Thread::new(0).with_trace(Box::new(WriterSink::new(buf.clone())));
    thread.enter(&OUTER).expect("enter");
    thread.enter(&INNER).expect("enter");
    thread.leave();
    thread.leave();
    thread.close();
    assert_eq!(
        buf.contents(),
        "> 1 env.outer\n> 2 env.inner\n< 2 env.inner\n< 1 env.outer\nend\n"
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Tables and Globals
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn table_reports_undefined_and_uninitialized() {
    let table = Table::new(TableType {
        limits: Limits::new(2, Some(8)),
    });
    assert_eq!(table.size(), 2);
    assert_eq!(table.get(0).err(), Some(Trap::UninitializedElement));
    assert_eq!(table.get(2).err(), Some(Trap::UndefinedElement));
    assert_eq!(table.set(5, None), Err(Trap::UndefinedElement));

    let nop = HostFunction::wrap(|| ()).into_ref();
    table.set(1, Some(nop)).expect("in range");
    let found = table.get(1).expect("initialized");
    assert_eq!(found.func_type(), &func_type(&[], &[]));
    assert!(table.fits(0, 2));
    assert!(!table.fits(1, 2));
    assert_eq!(table.ty().limits, Limits::new(2, Some(8)));
}

#[test]
fn global_set_checks_mutability_and_type() {
    let constant = Global::new(Value::I64(7), false);
    assert_eq!(constant.set(Value::I64(8)), Err(GlobalError::Immutable));
    assert_eq!(constant.get(), Value::I64(7));

    let counter = Global::new(Value::I32(666), true);
    assert_eq!(
        counter.set(Value::F32(1.0)),
        Err(GlobalError::TypeMismatch {
            expected: ValueType::I32,
            actual: ValueType::F32,
        })
    );
    counter.set(Value::I32(-1)).expect("same type");
    assert_eq!(counter.get_i32(), -1);
    assert_eq!(counter.bits(), 0xFFFF_FFFF);

    let alias = counter.clone();
    alias.set_i32(3);
    assert_eq!(counter.get(), Value::I32(3));
    assert!(alias.ptr_eq(&counter));
}

#[test]
fn global_float_bits_survive() {
    let g = Global::new(Value::F64(f64::from_bits(0x7FF8_0000_0000_0001)), true);
    assert_eq!(g.bits(), 0x7FF8_0000_0000_0001);
    g.set_f32(-0.0);
    assert_eq!(g.bits(), 0x8000_0000);
}

// ══════════════════════════════════════════════════════════════════════════════
// Host Functions
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn wrapped_closure_derives_signature() {
    let f = HostFunction::wrap(|a: i64, b: f64| (b, a.wrapping_neg()));
    assert_eq!(
        f.func_type(),
        &func_type(&[ValueType::I64, ValueType::F64], &[ValueType::F64, ValueType::I64])
    );
    assert_eq!(
        call_i32(&f, &[Value::I64(4), Value::F64(0.5)]),
        vec![Value::F64(0.5), Value::I64(-4)]
    );
}

#[test]
fn wrapped_closure_can_trap() {
    let f = HostFunction::wrap(|a: i32| -> Result<i32, Trap> {
        if a < 0 {
            Err(Trap::Host("negative".to_string()))
        } else {
            Ok(a * 2)
        }
    });
    assert_eq!(f.func_type(), &func_type(&[ValueType::I32], &[ValueType::I32]));
    assert_eq!(call_i32(&f, &[Value::I32(21)]), vec![Value::I32(42)]);
    assert_eq!(
        f.call(&mut Thread::new(0), &[Value::I32(-1)]),
        Err(Trap::Host("negative".to_string()))
    );
}

#[test]
fn raw_words_carry_i32_zero_extended() {
    let f = HostFunction::wrap(|a: i32| a);
    let mut out = [0u64; 1];
    f.unchecked_call(&mut Thread::new(0), &[(-1i32) as u32 as u64], &mut out)
        .expect("identity");
    assert_eq!(out[0], 0xFFFF_FFFF);
}

#[test]
fn call_rejects_wrong_arguments() {
    let f = HostFunction::wrap(|a: i32, b: i32| a.wrapping_add(b));
    let mut thread = Thread::new(0);
    assert_eq!(
        f.call(&mut thread, &[Value::I32(1)]),
        Err(Trap::IndirectCallTypeMismatch)
    );
    assert_eq!(
        f.call(&mut thread, &[Value::I32(1), Value::I64(2)]),
        Err(Trap::IndirectCallTypeMismatch)
    );
}

#[test]
fn dynamic_host_function_checks_results() {
    let ty = func_type(&[ValueType::I32], &[ValueType::I64]);
    let good = HostFunction::new(ty.clone(), |args| {
        Ok(vec![Value::I64(args[0].as_i32().unwrap_or(0) as i64 * 3)])
    });
    assert_eq!(call_i32(&good, &[Value::I32(5)]), vec![Value::I64(15)]);

    let bad = HostFunction::new(ty, |_| Ok(vec![Value::I32(0)]));
    let err = bad
        .call(&mut Thread::new(0), &[Value::I32(5)])
        .expect_err("wrong result type");
    assert!(matches!(err, Trap::Host(msg) if msg.contains("[i32] -> [i64]")));
}

// ══════════════════════════════════════════════════════════════════════════════
// Host Modules
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn host_module_exports_by_index_then_name() {
    let env = env_module();
    let exports = env.exports();
    let expected = vec![
        ExportDesc { name: "add".into(), kind: ExternKind::Func, index: 0 },
        ExportDesc { name: "counter".into(), kind: ExternKind::Global, index: 0 },
        ExportDesc { name: "memory".into(), kind: ExternKind::Memory, index: 0 },
        ExportDesc { name: "table".into(), kind: ExternKind::Table, index: 0 },
        ExportDesc { name: "nop".into(), kind: ExternKind::Func, index: 1 },
    ];
    assert_eq!(exports, expected);
}

#[test]
fn host_module_lookup_checks_kind() {
    let env = env_module();
    assert!(env.get_function("add").is_ok());
    assert!(env.get_memory("memory").is_ok());
    assert!(matches!(
        env.get_global("add"),
        Err(LinkError::KindMismatch { expected: ExternKind::Global, actual: ExternKind::Func, .. })
    ));
    assert!(matches!(
        env.get_table("missing"),
        Err(LinkError::ExportNotFound { .. })
    ));
}

#[test]
fn host_module_replaces_duplicate_names() {
    let env = HostModule::new("env")
        .func("f", || 1i32)
        .func("f", || 2i32);
    assert_eq!(env.exports().len(), 1);
    let f = env.get_function("f").expect("function export");
    assert_eq!(call_i32(f.as_ref(), &[]), vec![Value::I32(2)]);
}

// ══════════════════════════════════════════════════════════════════════════════
// Import Checks
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn import_checks_compare_types_and_limits() {
    let add = HostFunction::wrap(|a: i32, b: i32| a.wrapping_add(b)).into_ref();
    let sig = func_type(&[ValueType::I32, ValueType::I32], &[ValueType::I32]);
    assert!(check_function("env", "add", &sig, &add).is_ok());
    assert!(matches!(
        check_function("env", "add", &func_type(&[], &[]), &add),
        Err(LinkError::FunctionTypeMismatch { .. })
    ));

    let memory = Memory::bounds_checked(MemoryType { limits: Limits::new(2, Some(4)) })
        .expect("allocation");
    let fits = MemoryType { limits: Limits::new(1, Some(8)) };
    let too_big = MemoryType { limits: Limits::new(3, None) };
    let too_tight = MemoryType { limits: Limits::new(1, Some(3)) };
    assert!(check_memory("env", "memory", &fits, &memory).is_ok());
    assert!(check_memory("env", "memory", &too_big, &memory).is_err());
    assert!(check_memory("env", "memory", &too_tight, &memory).is_err());

    let table = Table::new(TableType { limits: Limits::new(4, None) });
    assert!(check_table("env", "table", &TableType { limits: Limits::new(4, None) }, &table).is_ok());
    assert!(matches!(
        check_table("env", "table", &TableType { limits: Limits::new(0, Some(10)) }, &table),
        Err(LinkError::TableTypeMismatch { .. })
    ));

    let global = Global::new(Value::I32(0), true);
    let immutable = GlobalType::new(ValueType::I32, false);
    assert!(matches!(
        check_global("env", "g", &immutable, &global),
        Err(LinkError::GlobalTypeMismatch { .. })
    ));
}

// ══════════════════════════════════════════════════════════════════════════════
// Store
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn store_instantiates_through_resolver() {
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut store = Store::new(MapResolver::new().with("env", env_module()));
    let log = events.clone();
    store.on_event(move |event| {
        let line = match event {
            StoreEvent::ModuleAllocated { name } => format!("allocated {name}"),
            StoreEvent::ModuleInstantiated { name } => format!("instantiated {name}"),
        };
        log.borrow_mut().push(line);
    });

    let env = store.instantiate_module("env").expect("host module");
    assert_eq!(env.name(), "env");
    let again = store.instantiate_module("env").expect("cached");
    assert!(Rc::ptr_eq(&env, &again));
    assert_eq!(*events.borrow(), vec!["allocated env", "instantiated env"]);
    assert!(store.get_module("env").is_some());
}

#[test]
fn store_allocates_host_modules_under_requested_name() {
    let mut store = Store::new(MapResolver::new().with("spectest", env_module()));
    let module = store.instantiate_module("spectest").expect("host module");
    assert_eq!(module.name(), "spectest");
}

#[test]
fn store_reports_missing_modules() {
    let mut store = Store::new(MapResolver::new());
    assert_eq!(
        store.instantiate_module("nowhere").err(),
        Some(LinkError::ModuleNotFound("nowhere".to_string()))
    );
}

#[test]
fn register_rejects_duplicates() {
    let mut store = Store::new(MapResolver::new());
    store.register("env", Rc::new(env_module())).expect("first registration");
    assert_eq!(
        store.register("env", Rc::new(env_module())).err(),
        Some(LinkError::AlreadyInstantiated("env".to_string()))
    );
    let env = store.instantiate_module("env").expect("registered module");
    assert!(env.get_function("add").is_ok());
}

/// Drives the store's import resolution the way a compiled module's
/// `instantiate` does.
struct Importer {
    imports: Vec<(&'static str, &'static str, ExternKind)>,
}

impl ModuleDefinition for Importer {
    fn allocate(&self, name: &str) -> Result<Rc<dyn AllocatedModule>, LinkError> {
        Ok(Rc::new(ImporterInstance {
            name: name.to_string(),
            imports: self.imports.clone(),
            resolved: RefCell::new(Vec::new()),
        }))
    }
}

struct ImporterInstance {
    name: String,
    imports: Vec<(&'static str, &'static str, ExternKind)>,
    resolved: RefCell<Vec<Extern>>,
}

impl Module for ImporterInstance {
    fn name(&self) -> &str {
        &self.name
    }

    fn exports(&self) -> Vec<ExportDesc> {
        Vec::new()
    }

    fn export(&self, _name: &str) -> Option<Extern> {
        None
    }
}

impl AllocatedModule for ImporterInstance {
    fn instantiate(
        self: Rc<Self>,
        resolver: &mut dyn ImportResolver,
    ) -> Result<Rc<dyn Module>, LinkError> {
        for (module, field, kind) in &self.imports {
            let item = match kind {
                ExternKind::Func => Extern::Func(resolver.resolve_function(
                    module,
                    field,
                    &func_type(&[ValueType::I32, ValueType::I32], &[ValueType::I32]),
                )?),
                ExternKind::Memory => Extern::Memory(resolver.resolve_memory(
                    module,
                    field,
                    &MemoryType { limits: Limits::new(1, None) },
                )?),
                ExternKind::Global => Extern::Global(resolver.resolve_global(
                    module,
                    field,
                    &GlobalType::new(ValueType::I32, true),
                )?),
                ExternKind::Table => Extern::Table(resolver.resolve_table(
                    module,
                    field,
                    &TableType { limits: Limits::new(1, None) },
                )?),
            };
            self.resolved.borrow_mut().push(item);
        }
        Ok(self)
    }

    fn into_module(self: Rc<Self>) -> Rc<dyn Module> {
        self
    }
}

#[test]
fn imports_resolve_dependencies_first() {
    let importer = Importer {
        imports: vec![
            ("env", "add", ExternKind::Func),
            ("env", "memory", ExternKind::Memory),
            ("env", "counter", ExternKind::Global),
            ("env", "table", ExternKind::Table),
        ],
    };
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut store = Store::new(
        MapResolver::new()
            .with("env", env_module())
            .with("main", importer),
    );
    let log = events.clone();
    store.on_event(move |event| {
        if let StoreEvent::ModuleInstantiated { name } = event {
            log.borrow_mut().push(name.to_string());
        }
    });
    store.instantiate_module("main").expect("all imports resolve");
    assert_eq!(*events.borrow(), vec!["env", "main"]);
}

#[test]
fn import_kind_mismatch_is_reported() {
    let importer = Importer {
        imports: vec![("env", "add", ExternKind::Memory)],
    };
    let mut store = Store::new(
        MapResolver::new()
            .with("env", env_module())
            .with("main", importer),
    );
    assert_eq!(
        store.instantiate_module("main").err(),
        Some(LinkError::KindMismatch {
            module: "env".to_string(),
            field: "add".to_string(),
            expected: ExternKind::Memory,
            actual: ExternKind::Func,
        })
    );
    assert!(store.get_module("main").is_none());
    assert!(store.get_module("env").is_some());
}

#[test]
fn import_of_missing_field_is_reported() {
    let importer = Importer {
        imports: vec![("env", "sub", ExternKind::Func)],
    };
    let mut store = Store::new(
        MapResolver::new()
            .with("env", env_module())
            .with("main", importer),
    );
    assert_eq!(
        store.instantiate_module("main").err(),
        Some(LinkError::ExportNotFound {
            module: "env".to_string(),
            field: "sub".to_string(),
        })
    );
}

#[test]
fn memory_import_below_minimum_is_rejected() {
    let importer = Importer {
        imports: vec![("env", "memory", ExternKind::Memory)],
    };
    let small = HostModule::new("env").memory(
        "memory",
        Memory::bounds_checked(MemoryType { limits: Limits::new(0, None) }).expect("allocation"),
    );
    let mut store = Store::new(
        MapResolver::new()
            .with("env", small)
            .with("main", importer),
    );
    assert!(matches!(
        store.instantiate_module("main"),
        Err(LinkError::MemoryTypeMismatch { .. })
    ));
}

#[test]
fn self_import_of_memory_is_cyclic() {
    let importer = Importer {
        imports: vec![("main", "memory", ExternKind::Memory)],
    };
    let mut store = Store::new(MapResolver::new().with("main", importer));
    assert_eq!(
        store.instantiate_module("main").err(),
        Some(LinkError::CyclicImport {
            module: "main".to_string(),
            field: "memory".to_string(),
        })
    );
}
