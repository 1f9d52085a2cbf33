//! Integration tests for the warp compiler.
//!
//! Tests validate:
//! - Option parsing and defaults
//! - Determinism of the emitted text and its fingerprint
//! - Export ordering and the generated module skeleton
//! - Compile-time rejection of unsupported layouts and command modules
//! - Translation of arithmetic, control flow, memory and calls

use wasm_encoder::{
    CodeSection, ExportKind, ExportSection, Function, FunctionSection, Instruction, TypeSection,
    ValType,
};
use warp_compiler::{compile, compile_bytes, CompileError, CompileOptions, CompiledModule};
use warp_exec::ExternKind;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn wasm(source: &str) -> Vec<u8> {
    wat::parse_str(source).unwrap_or_else(|e| panic!("invalid wat: {e}"))
}

/// Compile a text-format module under `name` (panics on error).
fn compile_wat(source: &str, options: &CompileOptions) -> CompiledModule {
    compile_bytes(&wasm(source), options).unwrap_or_else(|e| panic!("compile failed: {e}"))
}

fn source_of(wat: &str) -> String {
    compile_wat(wat, &CompileOptions::new("test")).source
}

/// Compile and return the error (panics if compilation succeeds).
fn compile_err(source: &str, options: &CompileOptions) -> CompileError {
    match compile_bytes(&wasm(source), options) {
        Ok(_) => panic!("expected compilation to fail"),
        Err(e) => e,
    }
}

fn assert_contains(source: &str, needle: &str) {
    assert!(
        source.contains(needle),
        "expected generated source to contain {needle:?}:\n{source}"
    );
}

const FIB: &str = r#"
(module
  (func $fib (export "fib") (param i32) (result i32)
    local.get 0
    i32.const 2
    i32.lt_s
    if (result i32)
      local.get 0
    else
      local.get 0
      i32.const 1
      i32.sub
      call $fib
      local.get 0
      i32.const 2
      i32.sub
      call $fib
      i32.add
    end))
"#;

// ══════════════════════════════════════════════════════════════════════════════
// Options
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_options_default_from_partial_json() {
    let options = CompileOptions::from_json(r#"{ "module_name": "fib", "command": true }"#)
        .unwrap_or_else(|e| panic!("options: {e}"));
    assert_eq!(options.module_name, "fib");
    assert!(options.command);
    assert!(options.untyped_literals);
    assert_eq!(options.runtime_path, "warp_exec");
}

#[test]
fn test_options_reject_malformed_json() {
    let err = CompileOptions::from_json("{ module_name: ").unwrap_err();
    assert!(matches!(err, CompileError::InvalidOptions(_)));
}

#[test]
fn test_invalid_module_name() {
    for name in ["", "2fib", "match", "a-b"] {
        let err = compile_err(FIB, &CompileOptions::new(name));
        assert!(
            matches!(err, CompileError::InvalidModuleName(ref n) if n == name),
            "name {name:?} gave {err}"
        );
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Determinism
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_same_module_compiles_identically() {
    let options = CompileOptions::new("fib");
    let a = compile_wat(FIB, &options);
    let b = compile_wat(FIB, &options);
    assert_eq!(a.source, b.source);
    assert_eq!(a.fingerprint, b.fingerprint);
    assert_eq!(a.fingerprint.len(), 64);
    assert_contains(&a.source, &format!("// fingerprint: sha256:{}", a.fingerprint));
}

#[test]
fn test_fingerprint_covers_options() {
    let a = compile_wat(FIB, &CompileOptions::new("fib"));
    let b = compile_wat(FIB, &CompileOptions::new("fib").untyped_literals(false));
    let c = compile_wat(FIB, &CompileOptions::new("other"));
    assert_ne!(a.fingerprint, b.fingerprint);
    assert_ne!(a.fingerprint, c.fingerprint);
}

#[test]
fn test_compile_matches_compile_bytes() {
    let module = warp_wasm::decode::parse(&wasm(FIB)).unwrap_or_else(|e| panic!("{e}"));
    let options = CompileOptions::new("fib");
    let direct = compile(&module, &options).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(direct, compile_wat(FIB, &options));
}

// ══════════════════════════════════════════════════════════════════════════════
// Module skeleton
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_exports_sorted_by_index_then_name() {
    let compiled = compile_wat(
        r#"
        (module
          (func $a)
          (func $b)
          (memory 1)
          (export "zeta" (func $b))
          (export "beta" (func $b))
          (export "mem" (memory 0))
          (export "alpha" (func $a)))
        "#,
        &CompileOptions::new("m"),
    );
    let order: Vec<(&str, ExternKind, u32)> = compiled
        .exports
        .iter()
        .map(|e| (e.name.as_str(), e.kind, e.index))
        .collect();
    assert_eq!(
        order,
        [
            ("alpha", ExternKind::Func, 0),
            ("mem", ExternKind::Memory, 0),
            ("beta", ExternKind::Func, 1),
            ("zeta", ExternKind::Func, 1),
        ]
    );
    assert_contains(&compiled.source, "(\"alpha\", ExternKind::Func, 0),");
}

#[test]
fn test_skeleton_items() {
    let source = source_of(FIB);
    assert_contains(&source, "pub mod test {");
    assert_contains(&source, "pub const NAME: &str = \"test\";");
    assert_contains(&source, "pub struct Definition;");
    assert_contains(&source, "pub struct Instance {");
    assert_contains(
        &source,
        "static FRAME_0: FrameInfo = FrameInfo { module: \"test\", name: \"fib\", index: 0 };",
    );
    assert_contains(
        &source,
        "fn fib(m: &Instance, t: &mut Thread, mut v0: i32) -> Result<i32, Trap> {",
    );
    assert_contains(&source, "t.enter(&FRAME_0)?;");
    assert_contains(&source, "fn fib_thunk(");
    assert_contains(&source, "\"fib\" => func_ref(&self.this.upgrade()?, 0).map(Extern::Func),");
}

#[test]
fn test_unnamed_functions_use_index_names() {
    let source = source_of(
        r#"
        (module
          (func (export "run") (result i32)
            call 1)
          (func (result i32)
            i32.const 7))
        "#,
    );
    assert_contains(&source, "fn f0(m: &Instance");
    assert_contains(&source, "t0 = f1(m, t)?;");
}

#[test]
fn test_private_and_exported_globals() {
    let source = source_of(
        r#"
        (module
          (global $counter (mut i32) (i32.const 1))
          (global $shared (export "shared") (mut i64) (i64.const 666))
          (func (export "bump")
            global.get $counter
            i32.const 1
            i32.add
            global.set $counter
            global.get $shared
            i64.const 1
            i64.add
            global.set $shared))
        "#,
    );
    assert_contains(&source, "g0: Cell<i32>,");
    assert_contains(&source, "g1: Global,");
    assert_contains(&source, "self.g0.set(1i32);");
    assert_contains(&source, "self.g1.set_i64(666i64);");
    assert_contains(&source, "m.g0.set(m.g0.get().wrapping_add(1));");
    assert_contains(&source, "m.g1.set_i64(m.g1.get_i64().wrapping_add(1));");
}

#[test]
fn test_imports_resolve_in_order() {
    let source = source_of(
        r#"
        (module
          (import "env" "print" (func $print (param i32)))
          (import "env" "memory" (memory 1))
          (import "env" "base" (global $base i32))
          (global $top i32 (global.get $base))
          (func (export "main")
            global.get $top
            call $print))
        "#,
    );
    let print = source
        .find("imports.resolve_function(\"env\", \"print\"")
        .unwrap_or_else(|| panic!("no function import:\n{source}"));
    let memory = source
        .find("imports.resolve_memory(\"env\", \"memory\"")
        .unwrap_or_else(|| panic!("no memory import:\n{source}"));
    let global = source
        .find("imports.resolve_global(\"env\", \"base\"")
        .unwrap_or_else(|| panic!("no global import:\n{source}"));
    assert!(print < memory && memory < global);
    assert_contains(&source, "self.g1.set(g0.get_i32());");
    assert_contains(&source, "let f = m.fi0.get().ok_or(Trap::UninitializedModule)?;");
}

#[test]
fn test_start_runs_after_ready() {
    let source = source_of(
        r#"
        (module
          (global $g (mut i32) (i32.const 0))
          (func $init
            i32.const 5
            global.set $g)
          (start $init))
        "#,
    );
    let ready = source
        .find("self.ready.set(true);")
        .unwrap_or_else(|| panic!("no ready flag:\n{source}"));
    let start = source
        .find("init(&self, &mut Thread::new(0)).map_err(LinkError::Start)?;")
        .unwrap_or_else(|| panic!("no start call:\n{source}"));
    assert!(ready < start);
}

#[test]
fn test_segments_checked_before_written() {
    let source = source_of(
        r#"
        (module
          (memory 1)
          (table 2 funcref)
          (func $handler)
          (elem (i32.const 1) $handler)
          (data (i32.const 8) "hi\00"))
        "#,
    );
    assert_contains(&source, "static DATA_0: &[u8] = b\"hi\\x00\";");
    let check = source
        .find("memory.check_segment(0, d0, 3)?;")
        .unwrap_or_else(|| panic!("no data check:\n{source}"));
    let init = source
        .find("table.init_segment(0, e0, vec![func_ref(&self, 0)])?;")
        .unwrap_or_else(|| panic!("no element init:\n{source}"));
    assert!(check < init);
    assert_contains(&source, "fn handler_thunk(");
}

// ══════════════════════════════════════════════════════════════════════════════
// Compile-time errors
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_data_segment_does_not_fit() {
    let err = compile_err(
        r#"(module (memory 1) (data (i32.const 65535) "ab"))"#,
        &CompileOptions::new("m"),
    );
    match err {
        CompileError::DataSegmentDoesNotFit {
            segment,
            offset,
            len,
            size,
        } => {
            assert_eq!((segment, offset, len, size), (0, 65535, 2, 65536));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_element_segment_does_not_fit() {
    let err = compile_err(
        r#"(module (table 1 funcref) (func $f) (elem (i32.const 1) $f))"#,
        &CompileOptions::new("m"),
    );
    assert!(matches!(
        err,
        CompileError::ElementSegmentDoesNotFit {
            segment: 0,
            offset: 1,
            len: 1,
            size: 1
        }
    ));
}

#[test]
fn test_imported_memory_defers_segment_checks() {
    let compiled = compile_wat(
        r#"(module (import "env" "memory" (memory 1)) (data (i32.const 65535) "ab"))"#,
        &CompileOptions::new("m"),
    );
    assert_contains(&compiled.source, "memory.check_segment(0, d0, 2)?;");
}

#[test]
fn test_command_requires_start() {
    let options = CompileOptions::new("cmd").command(true);
    let err = compile_err(r#"(module (func (export "main")))"#, &options);
    assert!(matches!(err, CompileError::MissingStart));

    let err = compile_err(
        r#"(module (func (export "_start") (param i32)))"#,
        &options,
    );
    assert!(matches!(err, CompileError::InvalidStartSignature(_)));

    let compiled = compile_wat(r#"(module (func $main (export "_start")))"#, &options);
    assert_contains(
        &compiled.source,
        "pub fn run_start(instance: &Instance, thread: &mut Thread) -> Result<(), Trap> {",
    );
    assert_contains(&compiled.source, "let result = main(instance, thread);");
}

#[test]
fn test_memory_instruction_without_memory() {
    // Validation rejects this in binaries, so build the module directly.
    let mut module = warp_wasm::decode::parse(&wasm(
        r#"(module (memory 1) (func (result i32) i32.const 0 i32.load))"#,
    ))
    .unwrap_or_else(|e| panic!("{e}"));
    module.memories.clear();
    let err = compile(&module, &CompileOptions::new("m")).unwrap_err();
    assert!(matches!(err, CompileError::InvalidMemoryIndex(0)));
}

#[test]
fn test_call_indirect_without_table() {
    let mut module = warp_wasm::decode::parse(&wasm(
        r#"(module (table 1 funcref) (func (param i32) local.get 0 call_indirect))"#,
    ))
    .unwrap_or_else(|e| panic!("{e}"));
    module.tables.clear();
    let err = compile(&module, &CompileOptions::new("m")).unwrap_err();
    assert!(matches!(err, CompileError::InvalidTableIndex(0)));
}

#[test]
fn test_decode_errors_propagate() {
    let err = compile_bytes(b"\0asm\x02\0\0\0", &CompileOptions::new("m")).unwrap_err();
    assert!(matches!(err, CompileError::Decode(_)));
}

// ══════════════════════════════════════════════════════════════════════════════
// Translation
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_fib_body() {
    let source = source_of(FIB);
    assert_contains(&source, "if v0 < 2 {");
    assert_contains(&source, "v0.wrapping_sub(1)");
    assert_contains(&source, "fib(m, t, v0.wrapping_sub(2))?");
    assert_contains(&source, "t.leave();");
}

#[test]
fn test_untyped_literals_toggle() {
    let wat = r#"
        (module
          (func (export "inc") (param i32) (result i32)
            local.get 0
            i32.const 1
            i32.add))
    "#;
    let untyped = compile_wat(wat, &CompileOptions::new("m")).source;
    let typed = compile_wat(wat, &CompileOptions::new("m").untyped_literals(false)).source;
    assert_contains(&untyped, "return Ok(v0.wrapping_add(1));");
    assert_contains(&typed, "return Ok(v0.wrapping_add(1i32));");
}

#[test]
fn test_trapping_arithmetic_goes_through_numerics() {
    let source = source_of(
        r#"
        (module
          (func (export "div") (param i32 i32) (result i32)
            local.get 0
            local.get 1
            i32.div_s)
          (func (export "trunc") (param f32) (result i64)
            local.get 0
            i64.trunc_f32_u))
        "#,
    );
    assert_contains(&source, "numerics::i32_div_s(v0, v1)?");
    assert_contains(&source, "numerics::i64_trunc_u((v0 as f64))?");
}

#[test]
fn test_constant_folding_skips_traps() {
    let source = source_of(
        r#"
        (module
          (func (export "safe") (result i32)
            i32.const 6
            i32.const 7
            i32.mul)
          (func (export "boom") (result i32)
            i32.const 1
            i32.const 0
            i32.div_u))
        "#,
    );
    assert_contains(&source, "return Ok(42);");
    assert_contains(&source, "numerics::i32_div_u(1, 0)?");
}

#[test]
fn test_nan_constants_keep_their_bits() {
    let source = source_of(
        r#"
        (module
          (func (export "nan") (result f32)
            f32.const nan:0x200000))
        "#,
    );
    assert_contains(&source, "f32::from_bits(0x7fa00000)");
}

#[test]
fn test_loop_with_branches() {
    let source = source_of(
        r#"
        (module
          (func (export "sum") (param i32) (result i32) (local i32)
            block
              loop
                local.get 0
                i32.eqz
                br_if 1
                local.get 1
                local.get 0
                i32.add
                local.set 1
                local.get 0
                i32.const 1
                i32.sub
                local.set 0
                br 0
              end
            end
            local.get 1))
        "#,
    );
    assert_contains(&source, "'l1: {");
    assert_contains(&source, "'l2: loop {");
    assert_contains(&source, "if v0 == 0 {");
    assert_contains(&source, "break 'l1;");
    assert_contains(&source, "continue 'l2;");
    assert_contains(&source, "let mut v1: i32 = 0;");
}

#[test]
fn test_br_table_groups_cases() {
    let source = source_of(
        r#"
        (module
          (func (export "pick") (param i32) (result i32)
            block
              block
                block
                  local.get 0
                  br_table 0 1 0 2
                end
                i32.const 10
                return
              end
              i32.const 20
              return
            end
            i32.const 30))
        "#,
    );
    assert_contains(&source, "match v0 {");
    assert_contains(&source, "0 | 2 => {");
    assert_contains(&source, "1 => {");
    assert_contains(&source, "_ => {");
}

#[test]
fn test_memory_access_and_grow() {
    let source = source_of(
        r#"
        (module
          (memory 1 2)
          (func (export "poke") (param i32 i32)
            local.get 0
            local.get 1
            i32.store8 offset=4)
          (func (export "peek") (param i32) (result i32)
            local.get 0
            i32.load16_u)
          (func (export "grow") (param i32) (result i32)
            local.get 0
            memory.grow))
        "#,
    );
    assert_contains(&source, "m.mem0()?.put_u8(v0, 4, (v1 as u8))?;");
    assert_contains(&source, "(m.mem0()?.u16_at(v0)? as i32)");
    assert_contains(&source, "m.mem0()?.grow((v0 as u32)).map_or(-1, |p| p as i32)");
    assert_contains(&source, "memory: Memory,");
    assert_contains(&source, "Memory::new(MemoryType { limits: Limits::new(1, Some(2)) })?");
}

#[test]
fn test_call_indirect_helper() {
    let source = source_of(
        r#"
        (module
          (type $binop (func (param i32 i32) (result i32)))
          (table 1 funcref)
          (func (export "apply") (param i32 i32 i32) (result i32)
            local.get 0
            local.get 1
            local.get 2
            call_indirect (type $binop)))
        "#,
    );
    assert_contains(&source, "call_indirect_0(m, t, v0, v1, v2)?");
    assert_contains(
        &source,
        "fn call_indirect_0(m: &Instance, t: &mut Thread, mut v0: i32, mut v1: i32, idx: i32) -> Result<i32, Trap> {",
    );
    assert_contains(&source, "let f = m.table0()?.get(idx as u32)?;");
    assert_contains(
        &source,
        "if !f.func_type().matches(&[ValueType::I32, ValueType::I32], &[ValueType::I32]) {",
    );
}

#[test]
fn test_multi_value_block() {
    let source = source_of(
        r#"
        (module
          (func (export "swap") (param i32 i32) (result i32 i32)
            local.get 1
            local.get 0))
        "#,
    );
    assert_contains(&source, "-> Result<(i32, i32), Trap>");
    assert_contains(&source, "return Ok((v1, v0));");
}

#[test]
fn test_return_value_computed_before_leave() {
    let mut types = TypeSection::new();
    types
        .ty()
        .function(vec![ValType::I32, ValType::I32], vec![ValType::I32]);
    let mut functions = FunctionSection::new();
    functions.function(0);
    functions.function(0);
    let mut exports = ExportSection::new();
    exports.export("quot", ExportKind::Func, 0);
    exports.export("sum", ExportKind::Func, 1);

    let mut code = CodeSection::new();
    for op in [Instruction::I32DivS, Instruction::I32Add] {
        let mut f = Function::new(vec![]);
        f.instruction(&Instruction::LocalGet(0));
        f.instruction(&Instruction::LocalGet(1));
        f.instruction(&op);
        f.instruction(&Instruction::End);
        code.function(&f);
    }

    let mut module = wasm_encoder::Module::new();
    module.section(&types);
    module.section(&functions);
    module.section(&exports);
    module.section(&code);
    let source = compile_bytes(&module.finish(), &CompileOptions::new("test"))
        .unwrap_or_else(|e| panic!("compile failed: {e}"))
        .source;

    let bound = "let ret = numerics::i32_div_s(v0, v1)?;";
    assert_contains(&source, bound);
    assert_contains(&source, "return Ok(ret);");
    let at = source.find(bound).unwrap_or_default();
    let leave = source[at..].find("t.leave();");
    let ret = source[at..].find("return Ok(ret);");
    assert!(leave.is_some() && leave < ret, "leave must follow the binding:\n{source}");

    // Reading locals cannot observe the depth.
    assert_contains(&source, "return Ok(v0.wrapping_add(v1));");
}
