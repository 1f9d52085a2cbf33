//! Untyped-literal classification.
//!
//! A node is *untyped* when the Rust type of its rendering is decided by
//! the context it is printed in rather than by the node itself. An integer
//! or float constant is the base case: `5` becomes whatever width the
//! surrounding expression demands. Arithmetic keeps that property only when
//! every operand that decides the result type has it too; a shift's type is
//! decided by its left operand alone.
//!
//! When constant folding replaces an expression, the folded constant
//! inherits the classification of the expression it replaced, so folding
//! `i32.div_s` of two constants yields a suffixed literal.

use warp_wasm::{BinaryOp, UnaryOp};

use crate::ir::{Expr, Node, NodeId};

pub(crate) fn untyped(expr: &Expr, nodes: &[Node]) -> bool {
    let is = |id: NodeId| nodes.get(id).is_some_and(|n| n.untyped);
    match expr {
        Expr::Const(_) => true,
        Expr::Binary(op, a, b) => binary(*op, is(*a), is(*b)),
        Expr::Unary(op, x) => unary(*op) && is(*x),
        Expr::Temp(_)
        | Expr::Local(_)
        | Expr::Global(_)
        | Expr::Load { .. }
        | Expr::MemorySize
        | Expr::Test(..)
        | Expr::Not(_)
        | Expr::Compare(..)
        | Expr::Convert(..)
        | Expr::Select { .. }
        | Expr::BoolToInt(_)
        | Expr::IntToBool(_) => false,
    }
}

fn binary(op: BinaryOp, a: bool, b: bool) -> bool {
    use BinaryOp::*;
    match op {
        I32Add | I32Sub | I32Mul | I32RemS | I32And | I32Or | I32Xor | I64Add | I64Sub
        | I64Mul | I64RemS | I64And | I64Or | I64Xor | F32Add | F32Sub | F32Mul | F32Div
        | F64Add | F64Sub | F64Mul | F64Div => a && b,
        I32Shl | I32ShrS | I64Shl | I64ShrS => a,
        I32DivS | I32DivU | I32RemU | I32ShrU | I32Rotl | I32Rotr | I64DivS | I64DivU
        | I64RemU | I64ShrU | I64Rotl | I64Rotr | F32Min | F32Max | F32Copysign | F64Min
        | F64Max | F64Copysign => false,
    }
}

fn unary(op: UnaryOp) -> bool {
    use UnaryOp::*;
    match op {
        F32Neg | F64Neg => true,
        I32Clz | I32Ctz | I32Popcnt | I32Extend8S | I32Extend16S | I64Clz | I64Ctz
        | I64Popcnt | I64Extend8S | I64Extend16S | I64Extend32S | F32Abs | F32Ceil
        | F32Floor | F32Trunc | F32Nearest | F32Sqrt | F64Abs | F64Ceil | F64Floor
        | F64Trunc | F64Nearest | F64Sqrt => false,
    }
}
