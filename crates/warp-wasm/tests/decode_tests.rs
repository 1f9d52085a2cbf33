//! Integration tests for the warp module model and decoder.
//!
//! Tests validate:
//! - Section decoding (types, imports, functions, tables, memories, globals)
//! - Combined index spaces (imports first, then local entries)
//! - Export ordering and the `name` section
//! - Instruction lowering, including memory immediates and block types
//! - Scope resolution of locals, globals, and multi-value blocks
//! - Rejection of features outside the supported subset
//! - Limits and signature matching rules

use warp_wasm::decode::parse;
use warp_wasm::{
    BinaryOp, BlockType, CompareOp, ConstExpr, DecodeError, ExternKind, FuncType, FunctionScope,
    GlobalType, ImportDesc, Instruction, Limits, LoadOp, MemArg, Module, Scope, StoreOp,
    ValueType,
};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

/// Decode a module written in the text format (panics on error).
fn decode(source: &str) -> Module {
    let bytes = wat::parse_str(source).unwrap_or_else(|e| panic!("invalid wat: {e}"));
    parse(&bytes).unwrap_or_else(|e| panic!("decode failed: {e}"))
}

/// Decode and return the error (panics if decoding succeeds).
fn decode_err(source: &str) -> DecodeError {
    let bytes = wat::parse_str(source).unwrap_or_else(|e| panic!("invalid wat: {e}"));
    match parse(&bytes) {
        Ok(_) => panic!("expected decode to fail"),
        Err(e) => e,
    }
}

const FIB: &str = r#"
(module
  (type (func (param i32) (result i32)))
  (type (func (result i32)))
  (table 1 1 funcref)
  (memory (export "memory") 16)
  (global $sp (mut i32) (i32.const 1048576))
  (global (export "__data_end") i32 (i32.const 1048576))
  (global (export "__heap_base") i32 (i32.const 1048576))
  (func $fib (export "fib") (type 0) (local i32)
    i32.const 1
    local.set 1
    block
      local.get 0
      i32.const -1
      i32.add
      local.tee 0
      i32.const 2
      i32.lt_u
      br_if 0
      i32.const 0
      local.set 1
      loop
        local.get 0
        call $fib
        local.get 1
        i32.add
        local.set 1
        local.get 0
        i32.const -2
        i32.add
        local.tee 0
        i32.const 1
        i32.gt_u
        br_if 0
      end
      local.get 1
      i32.const 1
      i32.add
      local.set 1
    end
    local.get 1)
  (func $app_main (export "app_main") (type 1)
    i32.const 35
    call $fib))
"#;

// ══════════════════════════════════════════════════════════════════════════════
// Sections
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn fib_module_sections() {
    let module = decode(FIB);

    assert_eq!(module.types.len(), 2);
    assert_eq!(
        module.types[0],
        FuncType::new([ValueType::I32], [ValueType::I32])
    );
    assert_eq!(module.functions, vec![0, 1]);
    assert_eq!(module.tables.len(), 1);
    assert_eq!(module.tables[0].limits, Limits::new(1, Some(1)));
    assert_eq!(module.memories[0].limits, Limits::new(16, None));
    assert_eq!(module.globals.len(), 3);
    assert!(module.globals[0].ty.mutable);
    assert_eq!(module.globals[1].init, ConstExpr::I32(1048576));
    assert_eq!(module.start, None);
}

#[test]
fn fib_body_keeps_locals_and_closing_end() {
    let module = decode(FIB);
    let body = &module.bodies[0];

    assert_eq!(body.locals, vec![ValueType::I32]);
    assert_eq!(body.code.first(), Some(&Instruction::I32Const(1)));
    assert_eq!(body.code.last(), Some(&Instruction::End));
    assert!(body.code.contains(&Instruction::LocalTee(0)));
    assert!(body.code.contains(&Instruction::Loop(BlockType::Empty)));
    assert!(body
        .code
        .contains(&Instruction::Compare(CompareOp::I32LtU)));
    assert!(body.code.contains(&Instruction::Binary(BinaryOp::I32Add)));
}

#[test]
fn name_section_is_decoded() {
    let module = decode(FIB);
    assert_eq!(module.function_name(0), Some("fib"));
    assert_eq!(module.function_name(1), Some("app_main"));
    assert_eq!(module.function_name(2), None);
}

#[test]
fn exports_sort_by_index_then_name() {
    let module = decode(FIB);
    let sorted: Vec<(&str, ExternKind)> = module
        .sorted_exports()
        .iter()
        .map(|e| (e.name.as_str(), e.kind))
        .collect();

    assert_eq!(
        sorted,
        vec![
            ("fib", ExternKind::Func),
            ("memory", ExternKind::Memory),
            ("__data_end", ExternKind::Global),
            ("app_main", ExternKind::Func),
            ("__heap_base", ExternKind::Global),
        ]
    );
}

#[test]
fn segments_are_decoded() {
    let module = decode(
        r#"
        (module
          (memory 1)
          (table 4 funcref)
          (func $a)
          (func $b)
          (elem (i32.const 1) $a $b)
          (data (i32.const 8) "hello"))
        "#,
    );

    assert_eq!(module.elements.len(), 1);
    assert_eq!(module.elements[0].table, 0);
    assert_eq!(module.elements[0].offset, ConstExpr::I32(1));
    assert_eq!(module.elements[0].functions, vec![0, 1]);
    assert_eq!(module.data[0].memory, 0);
    assert_eq!(module.data[0].offset, ConstExpr::I32(8));
    assert_eq!(module.data[0].bytes, b"hello".to_vec());
}

#[test]
fn start_section_is_decoded() {
    let module = decode(
        r#"
        (module
          (func $init)
          (func $main)
          (start $main))
        "#,
    );
    assert_eq!(module.start, Some(1));
}

// ══════════════════════════════════════════════════════════════════════════════
// Index Spaces
// ══════════════════════════════════════════════════════════════════════════════

const IMPORTS: &str = r#"
(module
  (import "env" "log" (func $log (param i32)))
  (import "env" "base" (global $base i32))
  (import "env" "memory" (memory 1 4))
  (import "env" "clock" (func $clock (result i64)))
  (global $count (mut i64) (global.get $base))
  (func $run (result i64)
    call $clock))
"#;

#[test]
fn imported_functions_come_first() {
    let module = decode(IMPORTS);

    assert_eq!(module.imported_function_count(), 2);
    assert_eq!(module.function_count(), 3);
    assert_eq!(module.function_type(0).map(|t| t.params()), Some(&[ValueType::I32][..]));
    assert_eq!(module.function_type(1).map(|t| t.results()), Some(&[ValueType::I64][..]));
    assert_eq!(module.function_type(2).map(|t| t.results()), Some(&[ValueType::I64][..]));
    assert!(module.function_body(1).is_none());
    assert!(module.function_body(2).is_some());
    assert!(module.function_type(3).is_none());
}

#[test]
fn imported_globals_come_first() {
    let module = decode(IMPORTS);

    assert_eq!(module.global_count(), 2);
    assert_eq!(
        module.global_type(0),
        Some(GlobalType::new(ValueType::I32, false))
    );
    assert_eq!(
        module.global_type(1),
        Some(GlobalType::new(ValueType::I64, true))
    );
    assert_eq!(module.globals[0].init, ConstExpr::GlobalGet(0));
}

#[test]
fn imported_memory_is_memory_zero() {
    let module = decode(IMPORTS);

    let (import, ty) = module.imported_memory().expect("memory import");
    assert_eq!((import.module.as_str(), import.field.as_str()), ("env", "memory"));
    assert_eq!(ty.limits, Limits::new(1, Some(4)));
    assert_eq!(module.memory_type().map(|m| m.limits), Some(Limits::new(1, Some(4))));
    assert!(module.table_type().is_none());
    assert!(matches!(module.imports[1].desc, ImportDesc::Global(_)));
}

// ══════════════════════════════════════════════════════════════════════════════
// Instructions and Scope
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn memory_immediates_are_kept() {
    let module = decode(
        r#"
        (module
          (memory 1)
          (func (param i32) (result i64)
            local.get 0
            i32.const 7
            i32.store8 offset=3
            local.get 0
            i64.load32_u offset=16 align=4))
        "#,
    );
    let code = &module.bodies[0].code;

    assert!(code.contains(&Instruction::Store(
        StoreOp::I32Store8,
        MemArg {
            align: 0,
            offset: 3
        }
    )));
    assert!(code.contains(&Instruction::Load(
        LoadOp::I64Load32U,
        MemArg {
            align: 2,
            offset: 16
        }
    )));
}

#[test]
fn br_table_keeps_targets_and_default() {
    let module = decode(
        r#"
        (module
          (func (param i32)
            block
              block
                local.get 0
                br_table 0 1 0 1
              end
            end))
        "#,
    );
    assert!(module.bodies[0].code.contains(&Instruction::BrTable {
        targets: vec![0, 1, 0],
        default: 1
    }));
}

#[test]
fn float_constants_keep_their_bits() {
    let module = decode(
        r#"
        (module
          (func (result f32) f32.const nan:0x200000)
          (func (result f64) f64.const -0.0))
        "#,
    );
    assert_eq!(module.bodies[0].code[0], Instruction::F32Const(0x7fa0_0000));
    assert_eq!(
        module.bodies[1].code[0],
        Instruction::F64Const(0x8000_0000_0000_0000)
    );
}

#[test]
fn function_scope_resolves_params_then_locals() {
    let module = decode(
        r#"
        (module
          (func (param i64 f32) (local f64 i32)
            nop))
        "#,
    );
    let ty = module.function_type(0).expect("function type");
    let scope = FunctionScope::new(&module, ty, &module.bodies[0].locals);

    assert_eq!(scope.local_type(0), Some(ValueType::I64));
    assert_eq!(scope.local_type(1), Some(ValueType::F32));
    assert_eq!(scope.local_type(2), Some(ValueType::F64));
    assert_eq!(scope.local_type(3), Some(ValueType::I32));
    assert_eq!(scope.local_type(4), None);
    assert!(!scope.has_memory());
    assert!(!scope.has_table());
}

#[test]
fn multi_value_block_type_resolves_through_scope() {
    let module = decode(
        r#"
        (module
          (func (param i32) (result i32 i32)
            local.get 0
            block (param i32) (result i32 i32)
              i32.const 1
            end))
        "#,
    );
    let block = module.bodies[0]
        .code
        .iter()
        .find_map(|ins| match ins {
            Instruction::Block(ty) => Some(*ty),
            _ => None,
        })
        .expect("block instruction");

    assert!(matches!(block, BlockType::Func(_)));
    assert_eq!(
        module.block_type(block),
        Some((vec![ValueType::I32], vec![ValueType::I32, ValueType::I32]))
    );
    assert_eq!(
        module.block_type(BlockType::Value(ValueType::F64)),
        Some((vec![], vec![ValueType::F64]))
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Unsupported Features
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn simd_is_unsupported() {
    let err = decode_err(
        r#"
        (module
          (func
            v128.const i32x4 0 0 0 0
            drop))
        "#,
    );
    assert!(matches!(err, DecodeError::Unsupported(_)), "got {err}");
}

#[test]
fn passive_data_is_unsupported() {
    let err = decode_err(
        r#"
        (module
          (memory 1)
          (data "passive"))
        "#,
    );
    assert!(matches!(err, DecodeError::Unsupported(_)), "got {err}");
}

#[test]
fn invalid_binary_is_rejected() {
    let err = parse(b"\0asm\x01\0\0\0\x01").expect_err("truncated module");
    assert!(matches!(err, DecodeError::Invalid(_)));
}

#[test]
fn invalid_module_fails_validation() {
    let bytes = wat::parse_str("(module (func (result i32) i64.const 1))")
        .expect("well-formed text");
    assert!(matches!(parse(&bytes), Err(DecodeError::Invalid(_))));
}

// ══════════════════════════════════════════════════════════════════════════════
// Types
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn limits_satisfy_minimum_and_maximum() {
    let expected = Limits::new(2, Some(10));

    assert!(Limits::new(2, Some(10)).satisfies(&expected));
    assert!(Limits::new(4, Some(8)).satisfies(&expected));
    assert!(!Limits::new(1, Some(10)).satisfies(&expected));
    assert!(!Limits::new(2, Some(11)).satisfies(&expected));
    assert!(!Limits::new(2, None).satisfies(&expected));
    assert!(Limits::new(2, None).satisfies(&Limits::new(1, None)));
}

#[test]
fn func_type_display_and_matching() {
    let ty = FuncType::new([ValueType::I32, ValueType::F64], [ValueType::I64]);

    assert_eq!(ty.to_string(), "[i32 f64] -> [i64]");
    assert_eq!(FuncType::default().to_string(), "[] -> []");
    assert!(ty.matches(&[ValueType::I32, ValueType::F64], &[ValueType::I64]));
    assert!(!ty.matches(&[ValueType::I32], &[ValueType::I64]));
}

#[test]
fn value_types_serialize_lowercase() {
    let json = serde_json::to_string(&[ValueType::I32, ValueType::F64]).expect("serialize");
    assert_eq!(json, r#"["i32","f64"]"#);
}
