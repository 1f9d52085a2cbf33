//! Callable functions and the raw call ABI.

use std::rc::Rc;

use warp_wasm::FuncType;

use crate::error::Trap;
use crate::thread::Thread;
use crate::value::Value;

/// A function callable from compiled code or from the host.
///
/// The raw ABI passes every argument and result as one `u64` word (see
/// [`Value::to_bits`]). Callers of [`Function::unchecked_call`] guarantee
/// that `args` and `results` match [`Function::func_type`].
pub trait Function {
    fn func_type(&self) -> &FuncType;

    fn unchecked_call(
        &self,
        thread: &mut Thread,
        args: &[u64],
        results: &mut [u64],
    ) -> Result<(), Trap>;

    /// Type-checked call. An argument list that does not match the
    /// signature is `IndirectCallTypeMismatch`.
    fn call(&self, thread: &mut Thread, args: &[Value]) -> Result<Vec<Value>, Trap> {
        let ty = self.func_type();
        let params_match = args.len() == ty.params().len()
            && args.iter().zip(ty.params()).all(|(a, t)| a.ty() == *t);
        if !params_match {
            return Err(Trap::IndirectCallTypeMismatch);
        }
        let raw: Vec<u64> = args.iter().map(|a| a.to_bits()).collect();
        let mut out = vec![0u64; ty.results().len()];
        self.unchecked_call(thread, &raw, &mut out)?;
        Ok(out
            .iter()
            .zip(ty.results())
            .map(|(bits, t)| Value::from_bits(*t, *bits))
            .collect())
    }
}

/// A shared function reference, as stored in tables and import slots.
pub type FuncRef = Rc<dyn Function>;

/// The raw-ABI entry point generated for an exported or table-referenced
/// function of a compiled module.
pub type Thunk<M> = fn(&M, &mut Thread, &[u64], &mut [u64]) -> Result<(), Trap>;

/// Binds a generated thunk to the instance it belongs to.
///
/// Holding the instance strongly means a table that stores functions of its
/// own instance forms a reference cycle; such instances live until the
/// process ends.
pub struct CompiledFunction<M> {
    module: Rc<M>,
    ty: FuncType,
    thunk: Thunk<M>,
}

impl<M> CompiledFunction<M> {
    pub fn new(module: Rc<M>, ty: FuncType, thunk: Thunk<M>) -> Self {
        Self { module, ty, thunk }
    }
}

impl<M> Function for CompiledFunction<M> {
    fn func_type(&self) -> &FuncType {
        &self.ty
    }

    fn unchecked_call(
        &self,
        thread: &mut Thread,
        args: &[u64],
        results: &mut [u64],
    ) -> Result<(), Trap> {
        let depth = thread.depth();
        let result = (self.thunk)(&self.module, thread, args, results);
        if result.is_err() {
            thread.unwind(depth);
        }
        result
    }
}
