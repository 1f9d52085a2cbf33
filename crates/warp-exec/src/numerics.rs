//! Trapping and NaN-sensitive numeric operations.
//!
//! Emitted code calls these for every operation whose WebAssembly semantics
//! differ from a plain Rust operator. The compiler also uses them to fold
//! constant expressions, so folded and executed results always agree.

use crate::error::Trap;

// ══════════════════════════════════════════════════════════════════════════════
// Integer Division
// ══════════════════════════════════════════════════════════════════════════════

pub fn i32_div_s(a: i32, b: i32) -> Result<i32, Trap> {
    if b == 0 {
        return Err(Trap::IntegerDivideByZero);
    }
    if a == i32::MIN && b == -1 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(a / b)
}

pub fn i32_div_u(a: i32, b: i32) -> Result<i32, Trap> {
    if b == 0 {
        return Err(Trap::IntegerDivideByZero);
    }
    Ok(((a as u32) / (b as u32)) as i32)
}

/// `MIN % -1` is 0, not a trap.
pub fn i32_rem_s(a: i32, b: i32) -> Result<i32, Trap> {
    if b == 0 {
        return Err(Trap::IntegerDivideByZero);
    }
    Ok(a.wrapping_rem(b))
}

pub fn i32_rem_u(a: i32, b: i32) -> Result<i32, Trap> {
    if b == 0 {
        return Err(Trap::IntegerDivideByZero);
    }
    Ok(((a as u32) % (b as u32)) as i32)
}

pub fn i64_div_s(a: i64, b: i64) -> Result<i64, Trap> {
    if b == 0 {
        return Err(Trap::IntegerDivideByZero);
    }
    if a == i64::MIN && b == -1 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(a / b)
}

pub fn i64_div_u(a: i64, b: i64) -> Result<i64, Trap> {
    if b == 0 {
        return Err(Trap::IntegerDivideByZero);
    }
    Ok(((a as u64) / (b as u64)) as i64)
}

pub fn i64_rem_s(a: i64, b: i64) -> Result<i64, Trap> {
    if b == 0 {
        return Err(Trap::IntegerDivideByZero);
    }
    Ok(a.wrapping_rem(b))
}

pub fn i64_rem_u(a: i64, b: i64) -> Result<i64, Trap> {
    if b == 0 {
        return Err(Trap::IntegerDivideByZero);
    }
    Ok(((a as u64) % (b as u64)) as i64)
}

// ══════════════════════════════════════════════════════════════════════════════
// Truncation
// ══════════════════════════════════════════════════════════════════════════════
//
// All four take an `f64`; `f32` operands widen exactly. The operand is
// truncated toward zero first and the range check applies to the result.

pub fn i32_trunc_s(x: f64) -> Result<i32, Trap> {
    if x.is_nan() {
        return Err(Trap::InvalidConversionToInteger);
    }
    let z = x.trunc();
    if z < -2147483648.0 || z > 2147483647.0 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(z as i32)
}

pub fn i32_trunc_u(x: f64) -> Result<i32, Trap> {
    if x.is_nan() {
        return Err(Trap::InvalidConversionToInteger);
    }
    let z = x.trunc();
    if z <= -1.0 || z > 4294967295.0 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(z as u32 as i32)
}

pub fn i64_trunc_s(x: f64) -> Result<i64, Trap> {
    if x.is_nan() {
        return Err(Trap::InvalidConversionToInteger);
    }
    let z = x.trunc();
    if z < -9223372036854775808.0 || z >= 9223372036854775808.0 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(z as i64)
}

pub fn i64_trunc_u(x: f64) -> Result<i64, Trap> {
    if x.is_nan() {
        return Err(Trap::InvalidConversionToInteger);
    }
    let z = x.trunc();
    if z <= -1.0 || z >= 18446744073709551616.0 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(z as u64 as i64)
}

// ══════════════════════════════════════════════════════════════════════════════
// Min / Max
// ══════════════════════════════════════════════════════════════════════════════
//
// A NaN operand is the result, bits and all, the left one winning when both
// are NaN. Equal operands can only differ in the sign of zero, so OR-ing the
// bits picks -0 and AND-ing picks +0.

pub fn f32_min(a: f32, b: f32) -> f32 {
    if a.is_nan() {
        return a;
    }
    if b.is_nan() {
        return b;
    }
    if a == b {
        return f32::from_bits(a.to_bits() | b.to_bits());
    }
    if a < b {
        a
    } else {
        b
    }
}

pub fn f32_max(a: f32, b: f32) -> f32 {
    if a.is_nan() {
        return a;
    }
    if b.is_nan() {
        return b;
    }
    if a == b {
        return f32::from_bits(a.to_bits() & b.to_bits());
    }
    if a > b {
        a
    } else {
        b
    }
}

pub fn f64_min(a: f64, b: f64) -> f64 {
    if a.is_nan() {
        return a;
    }
    if b.is_nan() {
        return b;
    }
    if a == b {
        return f64::from_bits(a.to_bits() | b.to_bits());
    }
    if a < b {
        a
    } else {
        b
    }
}

pub fn f64_max(a: f64, b: f64) -> f64 {
    if a.is_nan() {
        return a;
    }
    if b.is_nan() {
        return b;
    }
    if a == b {
        return f64::from_bits(a.to_bits() & b.to_bits());
    }
    if a > b {
        a
    } else {
        b
    }
}
