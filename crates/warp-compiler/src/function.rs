//! Per-function items: compiled bodies, raw-ABI thunks, import shims and
//! `call_indirect` helpers.
//!
//! Every function in the index space, imported or local, is callable as
//! `name(m, t, args...)`, so call sites never need to know where the
//! callee lives.

use std::collections::BTreeSet;

use warp_wasm::{FuncType, FunctionScope, Module, ValueType};

use crate::builder::{Builder, Context};
use crate::error::{CompileError, CompileResult};
use crate::ir::{Stmt, Type};
use crate::source::Source;

// ══════════════════════════════════════════════════════════════════════════════
// Signatures and the raw ABI
// ══════════════════════════════════════════════════════════════════════════════

fn params(ty: &FuncType) -> String {
    ty.params()
        .iter()
        .enumerate()
        .map(|(i, t)| format!(", mut v{i}: {}", t.name()))
        .collect()
}

fn result_type(ty: &FuncType) -> String {
    match ty.results() {
        [] => "()".to_string(),
        [one] => one.name().to_string(),
        many => {
            let names: Vec<&str> = many.iter().map(|t| t.name()).collect();
            format!("({})", names.join(", "))
        }
    }
}

/// `&[ValueType::I32, ...]`
pub(crate) fn type_list(types: &[ValueType]) -> String {
    let items: Vec<String> = types.iter().map(|t| value_type(*t)).collect();
    format!("&[{}]", items.join(", "))
}

pub(crate) fn value_type(ty: ValueType) -> String {
    let variant = match ty {
        ValueType::I32 => "I32",
        ValueType::I64 => "I64",
        ValueType::F32 => "F32",
        ValueType::F64 => "F64",
    };
    format!("ValueType::{variant}")
}

/// `FuncType::new(vec![..], vec![..])`
pub(crate) fn func_type(ty: &FuncType) -> String {
    let list = |types: &[ValueType]| {
        let items: Vec<String> = types.iter().map(|t| value_type(*t)).collect();
        format!("vec![{}]", items.join(", "))
    };
    format!("FuncType::new({}, {})", list(ty.params()), list(ty.results()))
}

fn to_word(expr: &str, ty: ValueType) -> String {
    match ty {
        ValueType::I32 => format!("({expr} as u32 as u64)"),
        ValueType::I64 => format!("({expr} as u64)"),
        ValueType::F32 => format!("({expr}.to_bits() as u64)"),
        ValueType::F64 => format!("{expr}.to_bits()"),
    }
}

fn from_word(expr: &str, ty: ValueType) -> String {
    match ty {
        ValueType::I32 => format!("({expr} as i32)"),
        ValueType::I64 => format!("({expr} as i64)"),
        ValueType::F32 => format!("f32::from_bits({expr} as u32)"),
        ValueType::F64 => format!("f64::from_bits({expr})"),
    }
}

/// Calls `f` through the raw ABI and returns its decoded results.
fn raw_call(out: &mut Source, ty: &FuncType, args: &[String]) {
    let words: Vec<String> = ty
        .params()
        .iter()
        .zip(args)
        .map(|(t, a)| to_word(a, *t))
        .collect();
    let results = ty.results().len();
    out.line(format!("let mut r = [0u64; {results}];"));
    out.line(format!("f.unchecked_call(t, &[{}], &mut r)?;", words.join(", ")));
    let decoded: Vec<String> = ty
        .results()
        .iter()
        .enumerate()
        .map(|(i, t)| from_word(&format!("r[{i}]"), *t))
        .collect();
    match decoded.as_slice() {
        [] => out.line("Ok(())"),
        [one] => out.line(format!("Ok({one})")),
        many => out.line(format!("Ok(({}))", many.join(", "))),
    }
}

fn arg_names(ty: &FuncType) -> Vec<String> {
    (0..ty.params().len()).map(|i| format!("v{i}")).collect()
}

// ══════════════════════════════════════════════════════════════════════════════
// Bodies
// ══════════════════════════════════════════════════════════════════════════════

fn name_of<'a>(ctx: &'a Context<'_>, index: u32) -> CompileResult<&'a str> {
    ctx.names
        .get(index as usize)
        .map(String::as_str)
        .ok_or_else(|| CompileError::Internal(format!("unnamed function {index}")))
}

/// Emits the frame descriptor and body of local function `index`, returning
/// the signatures it calls indirectly.
pub(crate) fn body(
    out: &mut Source,
    module: &Module,
    ctx: &Context<'_>,
    module_name: &str,
    index: u32,
) -> CompileResult<BTreeSet<u32>> {
    let ty = module
        .function_type(index)
        .ok_or_else(|| CompileError::Internal(format!("unknown function {index}")))?;
    let code = module
        .function_body(index)
        .ok_or_else(|| CompileError::Internal(format!("function {index} has no body")))?;
    let scope = FunctionScope::new(module, ty, &code.locals);
    let built = Builder::new(&scope, ctx).build(&code.code)?;
    let name = name_of(ctx, index)?;

    out.line(format!(
        "static FRAME_{index}: FrameInfo = FrameInfo {{ module: {module_name:?}, name: {name:?}, index: {index} }};"
    ));
    out.blank();
    out.open(format!(
        "fn {name}(m: &Instance, t: &mut Thread{}) -> Result<{}, Trap> {{",
        params(ty),
        result_type(ty)
    ));
    out.line(format!("t.enter(&FRAME_{index})?;"));
    let first = ty.params().len();
    for (i, local) in code.locals.iter().enumerate() {
        let local = Type::from(*local);
        out.line(format!(
            "let mut v{}: {} = {};",
            first + i,
            local.rust(),
            local.zero()
        ));
    }
    for (k, temp) in built.temps.iter().enumerate() {
        out.line(format!("let mut t{k}: {} = {};", temp.rust(), temp.zero()));
    }
    statements(out, &built.stmts);
    out.close("}");
    out.blank();

    tracing::debug!(
        index,
        name,
        temps = built.temps.len(),
        "compiled function"
    );
    Ok(built.indirect_types)
}

fn statements(out: &mut Source, stmts: &[Stmt]) {
    for stmt in stmts {
        match stmt {
            Stmt::Line(text) => out.line(text),
            Stmt::Block { label, body } => {
                out.open(format!("'l{label}: {{"));
                statements(out, body);
                out.close("}");
            }
            Stmt::Loop { label, body } => {
                out.open(format!("'l{label}: loop {{"));
                statements(out, body);
                out.close("}");
            }
            Stmt::If {
                label,
                cond,
                then,
                otherwise,
            } => {
                if let Some(label) = label {
                    out.open(format!("'l{label}: {{"));
                }
                out.open(format!("if {cond} {{"));
                statements(out, then);
                if !otherwise.is_empty() {
                    out.reopen("} else {");
                    statements(out, otherwise);
                }
                out.close("}");
                if label.is_some() {
                    out.close("}");
                }
            }
            Stmt::Match { scrutinee, arms } => {
                out.open(format!("match {scrutinee} {{"));
                for (pattern, body) in arms {
                    out.open(format!("{pattern} => {{"));
                    statements(out, body);
                    out.close("}");
                }
                out.close("}");
            }
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Entry points and shims
// ══════════════════════════════════════════════════════════════════════════════

/// The raw-ABI entry point of local function `index`.
pub(crate) fn thunk(out: &mut Source, ty: &FuncType, name: &str) {
    out.open(format!(
        "fn {name}_thunk(m: &Instance, t: &mut Thread, a: &[u64], r: &mut [u64]) -> Result<(), Trap> {{"
    ));
    out.line("m.check_ready()?;");
    let args: Vec<String> = ty
        .params()
        .iter()
        .enumerate()
        .map(|(i, p)| format!(", {}", from_word(&format!("a[{i}]"), *p)))
        .collect();
    let call = format!("{name}(m, t{})?", args.concat());
    match ty.results() {
        [] => out.line(format!("{call};")),
        [one] => {
            out.line(format!("let out = {call};"));
            out.line(format!("r[0] = {};", to_word("out", *one)));
        }
        many => {
            out.line(format!("let out = {call};"));
            for (i, result) in many.iter().enumerate() {
                out.line(format!("r[{i}] = {};", to_word(&format!("out.{i}"), *result)));
            }
        }
    }
    out.line("Ok(())");
    out.close("}");
    out.blank();
}

/// Makes imported function `index` callable like a local one.
pub(crate) fn import_shim(out: &mut Source, ty: &FuncType, name: &str, index: u32) {
    out.open(format!(
        "fn {name}(m: &Instance, t: &mut Thread{}) -> Result<{}, Trap> {{",
        params(ty),
        result_type(ty)
    ));
    out.line(format!(
        "let f = m.fi{index}.get().ok_or(Trap::UninitializedModule)?;"
    ));
    raw_call(out, ty, &arg_names(ty));
    out.close("}");
    out.blank();
}

/// Calls through table 0 with signature `type_index`. The table index is
/// the last parameter, matching operand order.
pub(crate) fn indirect_helper(out: &mut Source, ty: &FuncType, type_index: u32) {
    out.open(format!(
        "fn call_indirect_{type_index}(m: &Instance, t: &mut Thread{}, idx: i32) -> Result<{}, Trap> {{",
        params(ty),
        result_type(ty)
    ));
    out.line("let f = m.table0()?.get(idx as u32)?;");
    out.open(format!(
        "if !f.func_type().matches({}, {}) {{",
        type_list(ty.params()),
        type_list(ty.results())
    ));
    out.line("return Err(Trap::IndirectCallTypeMismatch);");
    out.close("}");
    raw_call(out, ty, &arg_names(ty));
    out.close("}");
    out.blank();
}
