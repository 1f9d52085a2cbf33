//! Statically typed host functions and host modules.
//!
//! [`HostFunction::wrap`] turns a Rust closure over `i32`, `i64`, `f32` and
//! `f64` into a [`Function`]. The signature is derived from the closure's
//! type through [`WasmTy`], [`HostParams`] and [`HostResults`]; nothing is
//! inspected at runtime.

use std::rc::Rc;

use warp_wasm::{ExternKind, FuncType, ValueType};

use crate::error::{LinkError, Trap};
use crate::function::{FuncRef, Function};
use crate::global::Global;
use crate::memory::Memory;
use crate::module::{AllocatedModule, ExportDesc, Extern, ImportResolver, Module, ModuleDefinition};
use crate::table::Table;
use crate::thread::Thread;
use crate::value::Value;

// ══════════════════════════════════════════════════════════════════════════════
// Typed Values
// ══════════════════════════════════════════════════════════════════════════════

/// A Rust type with a WebAssembly value type and a raw-word encoding.
pub trait WasmTy: Copy + 'static {
    const TYPE: ValueType;

    fn from_bits(bits: u64) -> Self;

    fn into_bits(self) -> u64;
}

impl WasmTy for i32 {
    const TYPE: ValueType = ValueType::I32;

    fn from_bits(bits: u64) -> Self {
        bits as i32
    }

    fn into_bits(self) -> u64 {
        self as u32 as u64
    }
}

impl WasmTy for i64 {
    const TYPE: ValueType = ValueType::I64;

    fn from_bits(bits: u64) -> Self {
        bits as i64
    }

    fn into_bits(self) -> u64 {
        self as u64
    }
}

impl WasmTy for f32 {
    const TYPE: ValueType = ValueType::F32;

    fn from_bits(bits: u64) -> Self {
        f32::from_bits(bits as u32)
    }

    fn into_bits(self) -> u64 {
        self.to_bits() as u64
    }
}

impl WasmTy for f64 {
    const TYPE: ValueType = ValueType::F64;

    fn from_bits(bits: u64) -> Self {
        f64::from_bits(bits)
    }

    fn into_bits(self) -> u64 {
        self.to_bits()
    }
}

/// A tuple of parameters.
pub trait HostParams: Sized {
    fn value_types() -> Vec<ValueType>;

    /// Reads the parameters from raw words. Missing words read as zero.
    fn load(args: &[u64]) -> Self;
}

/// A return value: `()`, a single value, a tuple, or a `Result` of those.
pub trait HostResults {
    fn value_types() -> Vec<ValueType>;

    /// Writes the results to raw words, or returns the trap.
    fn store(self, results: &mut [u64]) -> Result<(), Trap>;
}

impl<T: WasmTy> HostResults for T {
    fn value_types() -> Vec<ValueType> {
        vec![T::TYPE]
    }

    fn store(self, results: &mut [u64]) -> Result<(), Trap> {
        if let Some(slot) = results.first_mut() {
            *slot = self.into_bits();
        }
        Ok(())
    }
}

impl<T: HostResults> HostResults for Result<T, Trap> {
    fn value_types() -> Vec<ValueType> {
        T::value_types()
    }

    fn store(self, results: &mut [u64]) -> Result<(), Trap> {
        self.and_then(|value| value.store(results))
    }
}

/// Closures that can become a [`HostFunction`].
pub trait IntoHostFunc<Params, Results>: 'static {
    fn into_host_func(self) -> HostFunction;
}

macro_rules! for_each_function_signature {
    ($mac:ident) => {
        $mac!();
        $mac!(A1);
        $mac!(A1 A2);
        $mac!(A1 A2 A3);
        $mac!(A1 A2 A3 A4);
        $mac!(A1 A2 A3 A4 A5);
        $mac!(A1 A2 A3 A4 A5 A6);
        $mac!(A1 A2 A3 A4 A5 A6 A7);
        $mac!(A1 A2 A3 A4 A5 A6 A7 A8);
    };
}

macro_rules! impl_host_params {
    ($($t:ident)*) => {
        #[allow(non_snake_case, unused_variables, unused_mut, unused_assignments, clippy::unused_unit)]
        impl<$($t: WasmTy,)*> HostParams for ($($t,)*) {
            fn value_types() -> Vec<ValueType> {
                vec![$($t::TYPE,)*]
            }

            fn load(args: &[u64]) -> Self {
                let mut words = args.iter().copied();
                ($($t::from_bits(words.next().unwrap_or(0)),)*)
            }
        }
    };
}
for_each_function_signature!(impl_host_params);

macro_rules! impl_host_results {
    ($($t:ident)*) => {
        #[allow(non_snake_case, unused_variables, unused_mut)]
        impl<$($t: WasmTy,)*> HostResults for ($($t,)*) {
            fn value_types() -> Vec<ValueType> {
                vec![$($t::TYPE,)*]
            }

            fn store(self, results: &mut [u64]) -> Result<(), Trap> {
                let ($($t,)*) = self;
                let mut slots = results.iter_mut();
                $(
                    if let Some(slot) = slots.next() {
                        *slot = $t.into_bits();
                    }
                )*
                Ok(())
            }
        }
    };
}
for_each_function_signature!(impl_host_results);

macro_rules! impl_into_host_func {
    ($($t:ident)*) => {
        #[allow(non_snake_case)]
        impl<F, $($t,)* R> IntoHostFunc<($($t,)*), R> for F
        where
            F: Fn($($t),*) -> R + 'static,
            $($t: WasmTy,)*
            R: HostResults,
        {
            fn into_host_func(self) -> HostFunction {
                let ty = FuncType::new(<($($t,)*) as HostParams>::value_types(), R::value_types());
                HostFunction::from_raw(ty, move |_thread, args, results| {
                    let ($($t,)*) = <($($t,)*) as HostParams>::load(args);
                    self($($t),*).store(results)
                })
            }
        }
    };
}
for_each_function_signature!(impl_into_host_func);

// ══════════════════════════════════════════════════════════════════════════════
// Host Functions
// ══════════════════════════════════════════════════════════════════════════════

type RawHostFn = dyn Fn(&mut Thread, &[u64], &mut [u64]) -> Result<(), Trap>;

/// A function implemented by the host.
pub struct HostFunction {
    ty: FuncType,
    func: Box<RawHostFn>,
}

impl HostFunction {
    /// Adapts a typed closure.
    ///
    /// ```
    /// use warp_exec::{Function, HostFunction, Thread, Value};
    ///
    /// let add = HostFunction::wrap(|a: i32, b: i32| a.wrapping_add(b));
    /// let out = add.call(&mut Thread::new(0), &[Value::I32(2), Value::I32(3)]);
    /// assert_eq!(out, Ok(vec![Value::I32(5)]));
    /// ```
    pub fn wrap<Params, Results>(func: impl IntoHostFunc<Params, Results>) -> Self {
        func.into_host_func()
    }

    /// Adapts a closure over dynamically typed values. Results of the wrong
    /// count or type are reported as a host trap.
    pub fn new(
        ty: FuncType,
        func: impl Fn(&[Value]) -> Result<Vec<Value>, Trap> + 'static,
    ) -> Self {
        let sig = ty.clone();
        Self::from_raw(ty, move |_thread, args, results| {
            let args: Vec<Value> = args
                .iter()
                .zip(sig.params())
                .map(|(bits, t)| Value::from_bits(*t, *bits))
                .collect();
            let values = func(&args)?;
            let types_match = values.len() == sig.results().len()
                && values.iter().zip(sig.results()).all(|(v, t)| v.ty() == *t);
            if !types_match {
                return Err(Trap::Host(format!("host function results do not match {sig}")));
            }
            for (slot, value) in results.iter_mut().zip(values) {
                *slot = value.to_bits();
            }
            Ok(())
        })
    }

    /// Wraps a raw-ABI closure.
    pub fn from_raw(
        ty: FuncType,
        func: impl Fn(&mut Thread, &[u64], &mut [u64]) -> Result<(), Trap> + 'static,
    ) -> Self {
        Self {
            ty,
            func: Box::new(func),
        }
    }

    pub fn into_ref(self) -> FuncRef {
        Rc::new(self)
    }
}

impl Function for HostFunction {
    fn func_type(&self) -> &FuncType {
        &self.ty
    }

    fn unchecked_call(
        &self,
        thread: &mut Thread,
        args: &[u64],
        results: &mut [u64],
    ) -> Result<(), Trap> {
        (self.func)(thread, args, results)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Host Modules
// ══════════════════════════════════════════════════════════════════════════════

/// A named collection of host entities.
///
/// A `HostModule` is ready on construction: it is a [`Module`] that can be
/// registered with a store directly, and a [`ModuleDefinition`] whose
/// allocations share the same entities under a new name.
#[derive(Clone)]
pub struct HostModule {
    name: String,
    items: Vec<(String, Extern)>,
}

impl HostModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }

    /// Adds a typed closure as a function export.
    pub fn func<Params, Results>(
        self,
        name: impl Into<String>,
        func: impl IntoHostFunc<Params, Results>,
    ) -> Self {
        self.function(name, HostFunction::wrap(func).into_ref())
    }

    pub fn function(self, name: impl Into<String>, func: FuncRef) -> Self {
        self.item(name, Extern::Func(func))
    }

    pub fn table(self, name: impl Into<String>, table: Table) -> Self {
        self.item(name, Extern::Table(table))
    }

    pub fn memory(self, name: impl Into<String>, memory: Memory) -> Self {
        self.item(name, Extern::Memory(memory))
    }

    pub fn global(self, name: impl Into<String>, global: Global) -> Self {
        self.item(name, Extern::Global(global))
    }

    /// Adds or replaces an export.
    fn item(mut self, name: impl Into<String>, item: Extern) -> Self {
        let name = name.into();
        match self.items.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = item,
            None => self.items.push((name, item)),
        }
        self
    }
}

impl Module for HostModule {
    fn name(&self) -> &str {
        &self.name
    }

    /// Indices count per kind in insertion order.
    fn exports(&self) -> Vec<ExportDesc> {
        let mut counts = [0u32; 4];
        let mut exports: Vec<ExportDesc> = self
            .items
            .iter()
            .map(|(name, item)| {
                let kind = item.kind();
                let slot = match kind {
                    ExternKind::Func => 0,
                    ExternKind::Table => 1,
                    ExternKind::Memory => 2,
                    ExternKind::Global => 3,
                };
                let index = counts[slot];
                counts[slot] += 1;
                ExportDesc {
                    name: name.clone(),
                    kind,
                    index,
                }
            })
            .collect();
        exports.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.name.cmp(&b.name)));
        exports
    }

    fn export(&self, name: &str) -> Option<Extern> {
        self.items
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, item)| item.clone())
    }
}

impl AllocatedModule for HostModule {
    fn instantiate(
        self: Rc<Self>,
        _imports: &mut dyn ImportResolver,
    ) -> Result<Rc<dyn Module>, LinkError> {
        Ok(self)
    }

    fn into_module(self: Rc<Self>) -> Rc<dyn Module> {
        self
    }
}

impl ModuleDefinition for HostModule {
    fn allocate(&self, name: &str) -> Result<Rc<dyn AllocatedModule>, LinkError> {
        Ok(Rc::new(HostModule {
            name: name.to_string(),
            items: self.items.clone(),
        }))
    }
}
