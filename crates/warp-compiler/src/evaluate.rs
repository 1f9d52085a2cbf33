//! Constant folding.
//!
//! Every fold uses the same Rust operation the emitter prints for the
//! instruction, so a folded constant is bit-for-bit what the generated code
//! would have computed at run time. Folds that would trap return `None` and
//! the operation is left for run time.

use warp_exec::numerics;
use warp_wasm::{BinaryOp, CompareOp, ConvertOp, TestOp, UnaryOp};

use crate::ir::Literal;

pub(crate) fn test(op: TestOp, x: Literal) -> Option<Literal> {
    let result = match op {
        TestOp::I32Eqz => x.as_i32()? == 0,
        TestOp::I64Eqz => x.as_i64()? == 0,
    };
    Some(Literal::Bool(result))
}

pub(crate) fn compare(op: CompareOp, a: Literal, b: Literal) -> Option<Literal> {
    use CompareOp::*;
    let result = match op {
        I32Eq => a.as_i32()? == b.as_i32()?,
        I32Ne => a.as_i32()? != b.as_i32()?,
        I32LtS => a.as_i32()? < b.as_i32()?,
        I32LtU => (a.as_i32()? as u32) < (b.as_i32()? as u32),
        I32GtS => a.as_i32()? > b.as_i32()?,
        I32GtU => (a.as_i32()? as u32) > (b.as_i32()? as u32),
        I32LeS => a.as_i32()? <= b.as_i32()?,
        I32LeU => (a.as_i32()? as u32) <= (b.as_i32()? as u32),
        I32GeS => a.as_i32()? >= b.as_i32()?,
        I32GeU => (a.as_i32()? as u32) >= (b.as_i32()? as u32),
        I64Eq => a.as_i64()? == b.as_i64()?,
        I64Ne => a.as_i64()? != b.as_i64()?,
        I64LtS => a.as_i64()? < b.as_i64()?,
        I64LtU => (a.as_i64()? as u64) < (b.as_i64()? as u64),
        I64GtS => a.as_i64()? > b.as_i64()?,
        I64GtU => (a.as_i64()? as u64) > (b.as_i64()? as u64),
        I64LeS => a.as_i64()? <= b.as_i64()?,
        I64LeU => (a.as_i64()? as u64) <= (b.as_i64()? as u64),
        I64GeS => a.as_i64()? >= b.as_i64()?,
        I64GeU => (a.as_i64()? as u64) >= (b.as_i64()? as u64),
        F32Eq => a.as_f32()? == b.as_f32()?,
        F32Ne => a.as_f32()? != b.as_f32()?,
        F32Lt => a.as_f32()? < b.as_f32()?,
        F32Gt => a.as_f32()? > b.as_f32()?,
        F32Le => a.as_f32()? <= b.as_f32()?,
        F32Ge => a.as_f32()? >= b.as_f32()?,
        F64Eq => a.as_f64()? == b.as_f64()?,
        F64Ne => a.as_f64()? != b.as_f64()?,
        F64Lt => a.as_f64()? < b.as_f64()?,
        F64Gt => a.as_f64()? > b.as_f64()?,
        F64Le => a.as_f64()? <= b.as_f64()?,
        F64Ge => a.as_f64()? >= b.as_f64()?,
    };
    Some(Literal::Bool(result))
}

pub(crate) fn unary(op: UnaryOp, x: Literal) -> Option<Literal> {
    use UnaryOp::*;
    let result = match op {
        I32Clz => Literal::I32(x.as_i32()?.leading_zeros() as i32),
        I32Ctz => Literal::I32(x.as_i32()?.trailing_zeros() as i32),
        I32Popcnt => Literal::I32(x.as_i32()?.count_ones() as i32),
        I32Extend8S => Literal::I32(x.as_i32()? as i8 as i32),
        I32Extend16S => Literal::I32(x.as_i32()? as i16 as i32),
        I64Clz => Literal::I64(x.as_i64()?.leading_zeros() as i64),
        I64Ctz => Literal::I64(x.as_i64()?.trailing_zeros() as i64),
        I64Popcnt => Literal::I64(x.as_i64()?.count_ones() as i64),
        I64Extend8S => Literal::I64(x.as_i64()? as i8 as i64),
        I64Extend16S => Literal::I64(x.as_i64()? as i16 as i64),
        I64Extend32S => Literal::I64(x.as_i64()? as i32 as i64),
        F32Abs => Literal::f32(x.as_f32()?.abs()),
        F32Neg => Literal::f32(-x.as_f32()?),
        F32Ceil => Literal::f32(x.as_f32()?.ceil()),
        F32Floor => Literal::f32(x.as_f32()?.floor()),
        F32Trunc => Literal::f32(x.as_f32()?.trunc()),
        F32Nearest => Literal::f32(x.as_f32()?.round_ties_even()),
        F32Sqrt => Literal::f32(x.as_f32()?.sqrt()),
        F64Abs => Literal::f64(x.as_f64()?.abs()),
        F64Neg => Literal::f64(-x.as_f64()?),
        F64Ceil => Literal::f64(x.as_f64()?.ceil()),
        F64Floor => Literal::f64(x.as_f64()?.floor()),
        F64Trunc => Literal::f64(x.as_f64()?.trunc()),
        F64Nearest => Literal::f64(x.as_f64()?.round_ties_even()),
        F64Sqrt => Literal::f64(x.as_f64()?.sqrt()),
    };
    Some(result)
}

pub(crate) fn binary(op: BinaryOp, a: Literal, b: Literal) -> Option<Literal> {
    use BinaryOp::*;
    let result = match op {
        I32Add => Literal::I32(a.as_i32()?.wrapping_add(b.as_i32()?)),
        I32Sub => Literal::I32(a.as_i32()?.wrapping_sub(b.as_i32()?)),
        I32Mul => Literal::I32(a.as_i32()?.wrapping_mul(b.as_i32()?)),
        I32DivS => Literal::I32(numerics::i32_div_s(a.as_i32()?, b.as_i32()?).ok()?),
        I32DivU => Literal::I32(numerics::i32_div_u(a.as_i32()?, b.as_i32()?).ok()?),
        I32RemS => Literal::I32(numerics::i32_rem_s(a.as_i32()?, b.as_i32()?).ok()?),
        I32RemU => Literal::I32(numerics::i32_rem_u(a.as_i32()?, b.as_i32()?).ok()?),
        I32And => Literal::I32(a.as_i32()? & b.as_i32()?),
        I32Or => Literal::I32(a.as_i32()? | b.as_i32()?),
        I32Xor => Literal::I32(a.as_i32()? ^ b.as_i32()?),
        I32Shl => Literal::I32(a.as_i32()? << (b.as_i32()? & 31)),
        I32ShrS => Literal::I32(a.as_i32()? >> (b.as_i32()? & 31)),
        I32ShrU => Literal::I32(((a.as_i32()? as u32) >> (b.as_i32()? & 31)) as i32),
        I32Rotl => Literal::I32(a.as_i32()?.rotate_left((b.as_i32()? & 31) as u32)),
        I32Rotr => Literal::I32(a.as_i32()?.rotate_right((b.as_i32()? & 31) as u32)),
        I64Add => Literal::I64(a.as_i64()?.wrapping_add(b.as_i64()?)),
        I64Sub => Literal::I64(a.as_i64()?.wrapping_sub(b.as_i64()?)),
        I64Mul => Literal::I64(a.as_i64()?.wrapping_mul(b.as_i64()?)),
        I64DivS => Literal::I64(numerics::i64_div_s(a.as_i64()?, b.as_i64()?).ok()?),
        I64DivU => Literal::I64(numerics::i64_div_u(a.as_i64()?, b.as_i64()?).ok()?),
        I64RemS => Literal::I64(numerics::i64_rem_s(a.as_i64()?, b.as_i64()?).ok()?),
        I64RemU => Literal::I64(numerics::i64_rem_u(a.as_i64()?, b.as_i64()?).ok()?),
        I64And => Literal::I64(a.as_i64()? & b.as_i64()?),
        I64Or => Literal::I64(a.as_i64()? | b.as_i64()?),
        I64Xor => Literal::I64(a.as_i64()? ^ b.as_i64()?),
        I64Shl => Literal::I64(a.as_i64()? << (b.as_i64()? & 63)),
        I64ShrS => Literal::I64(a.as_i64()? >> (b.as_i64()? & 63)),
        I64ShrU => Literal::I64(((a.as_i64()? as u64) >> (b.as_i64()? & 63)) as i64),
        I64Rotl => Literal::I64(a.as_i64()?.rotate_left((b.as_i64()? & 63) as u32)),
        I64Rotr => Literal::I64(a.as_i64()?.rotate_right((b.as_i64()? & 63) as u32)),
        F32Add => Literal::f32(a.as_f32()? + b.as_f32()?),
        F32Sub => Literal::f32(a.as_f32()? - b.as_f32()?),
        F32Mul => Literal::f32(a.as_f32()? * b.as_f32()?),
        F32Div => Literal::f32(a.as_f32()? / b.as_f32()?),
        F32Min => Literal::f32(numerics::f32_min(a.as_f32()?, b.as_f32()?)),
        F32Max => Literal::f32(numerics::f32_max(a.as_f32()?, b.as_f32()?)),
        F32Copysign => Literal::f32(a.as_f32()?.copysign(b.as_f32()?)),
        F64Add => Literal::f64(a.as_f64()? + b.as_f64()?),
        F64Sub => Literal::f64(a.as_f64()? - b.as_f64()?),
        F64Mul => Literal::f64(a.as_f64()? * b.as_f64()?),
        F64Div => Literal::f64(a.as_f64()? / b.as_f64()?),
        F64Min => Literal::f64(numerics::f64_min(a.as_f64()?, b.as_f64()?)),
        F64Max => Literal::f64(numerics::f64_max(a.as_f64()?, b.as_f64()?)),
        F64Copysign => Literal::f64(a.as_f64()?.copysign(b.as_f64()?)),
    };
    Some(result)
}

pub(crate) fn convert(op: ConvertOp, x: Literal) -> Option<Literal> {
    use ConvertOp::*;
    let result = match op {
        I32WrapI64 => Literal::I32(x.as_i64()? as i32),
        I32TruncF32S => Literal::I32(numerics::i32_trunc_s(x.as_f32()? as f64).ok()?),
        I32TruncF32U => Literal::I32(numerics::i32_trunc_u(x.as_f32()? as f64).ok()?),
        I32TruncF64S => Literal::I32(numerics::i32_trunc_s(x.as_f64()?).ok()?),
        I32TruncF64U => Literal::I32(numerics::i32_trunc_u(x.as_f64()?).ok()?),
        I64ExtendI32S => Literal::I64(x.as_i32()? as i64),
        I64ExtendI32U => Literal::I64(x.as_i32()? as u32 as i64),
        I64TruncF32S => Literal::I64(numerics::i64_trunc_s(x.as_f32()? as f64).ok()?),
        I64TruncF32U => Literal::I64(numerics::i64_trunc_u(x.as_f32()? as f64).ok()?),
        I64TruncF64S => Literal::I64(numerics::i64_trunc_s(x.as_f64()?).ok()?),
        I64TruncF64U => Literal::I64(numerics::i64_trunc_u(x.as_f64()?).ok()?),
        F32ConvertI32S => Literal::f32(x.as_i32()? as f32),
        F32ConvertI32U => Literal::f32(x.as_i32()? as u32 as f32),
        F32ConvertI64S => Literal::f32(x.as_i64()? as f32),
        F32ConvertI64U => Literal::f32(x.as_i64()? as u64 as f32),
        F32DemoteF64 => Literal::f32(x.as_f64()? as f32),
        F64ConvertI32S => Literal::f64(x.as_i32()? as f64),
        F64ConvertI32U => Literal::f64(x.as_i32()? as u32 as f64),
        F64ConvertI64S => Literal::f64(x.as_i64()? as f64),
        F64ConvertI64U => Literal::f64(x.as_i64()? as u64 as f64),
        F64PromoteF32 => Literal::f64(x.as_f32()? as f64),
        I32ReinterpretF32 => Literal::I32(x.as_f32()?.to_bits() as i32),
        I64ReinterpretF64 => Literal::I64(x.as_f64()?.to_bits() as i64),
        F32ReinterpretI32 => Literal::f32(f32::from_bits(x.as_i32()? as u32)),
        F64ReinterpretI64 => Literal::f64(f64::from_bits(x.as_i64()? as u64)),
        I32TruncSatF32S => Literal::I32(x.as_f32()? as i32),
        I32TruncSatF32U => Literal::I32(x.as_f32()? as u32 as i32),
        I32TruncSatF64S => Literal::I32(x.as_f64()? as i32),
        I32TruncSatF64U => Literal::I32(x.as_f64()? as u32 as i32),
        I64TruncSatF32S => Literal::I64(x.as_f32()? as i64),
        I64TruncSatF32U => Literal::I64(x.as_f32()? as u64 as i64),
        I64TruncSatF64S => Literal::I64(x.as_f64()? as i64),
        I64TruncSatF64U => Literal::I64(x.as_f64()? as u64 as i64),
    };
    Some(result)
}
