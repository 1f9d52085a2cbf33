//! Global variables shared across instances.

use std::cell::Cell;
use std::rc::Rc;

use warp_wasm::{GlobalType, ValueType};

use crate::error::GlobalError;
use crate::value::Value;

struct GlobalInner {
    ty: GlobalType,
    bits: Cell<u64>,
}

/// A shared global cell stored as raw bits.
///
/// The typed accessors do not check the global's type; compiled code only
/// calls the accessor matching the declared type. [`Global::set`] is the
/// checked entry point for hosts.
#[derive(Clone)]
pub struct Global(Rc<GlobalInner>);

impl Global {
    pub fn new(value: Value, mutable: bool) -> Self {
        Self(Rc::new(GlobalInner {
            ty: GlobalType::new(value.ty(), mutable),
            bits: Cell::new(value.to_bits()),
        }))
    }

    pub fn ty(&self) -> GlobalType {
        self.0.ty
    }

    pub fn get(&self) -> Value {
        Value::from_bits(self.0.ty.content, self.0.bits.get())
    }

    pub fn set(&self, value: Value) -> Result<(), GlobalError> {
        if !self.0.ty.mutable {
            return Err(GlobalError::Immutable);
        }
        if value.ty() != self.0.ty.content {
            return Err(GlobalError::TypeMismatch {
                expected: self.0.ty.content,
                actual: value.ty(),
            });
        }
        self.0.bits.set(value.to_bits());
        Ok(())
    }

    pub fn bits(&self) -> u64 {
        self.0.bits.get()
    }

    pub fn set_bits(&self, bits: u64) {
        self.0.bits.set(bits);
    }

    pub fn value_type(&self) -> ValueType {
        self.0.ty.content
    }

    pub fn get_i32(&self) -> i32 {
        self.0.bits.get() as i32
    }

    pub fn set_i32(&self, v: i32) {
        self.0.bits.set(v as u32 as u64);
    }

    pub fn get_i64(&self) -> i64 {
        self.0.bits.get() as i64
    }

    pub fn set_i64(&self, v: i64) {
        self.0.bits.set(v as u64);
    }

    pub fn get_f32(&self) -> f32 {
        f32::from_bits(self.0.bits.get() as u32)
    }

    pub fn set_f32(&self, v: f32) {
        self.0.bits.set(v.to_bits() as u64);
    }

    pub fn get_f64(&self) -> f64 {
        f64::from_bits(self.0.bits.get())
    }

    pub fn set_f64(&self, v: f64) {
        self.0.bits.set(v.to_bits());
    }

    /// Whether two handles refer to the same global.
    pub fn ptr_eq(&self, other: &Global) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
