//! Function tables.

use std::cell::RefCell;
use std::rc::Rc;

use warp_wasm::{Limits, TableType};

use crate::error::{LinkError, Trap};
use crate::function::FuncRef;

struct TableInner {
    max: Option<u32>,
    entries: RefCell<Vec<Option<FuncRef>>>,
}

/// A shared, fixed-size array of optional function references.
#[derive(Clone)]
pub struct Table(Rc<TableInner>);

impl Table {
    /// Creates a table of `ty.limits.min` empty slots.
    pub fn new(ty: TableType) -> Self {
        let mut entries = Vec::new();
        entries.resize_with(ty.limits.min as usize, || None);
        Self(Rc::new(TableInner {
            max: ty.limits.max,
            entries: RefCell::new(entries),
        }))
    }

    /// Current type: the current size as minimum, the declared maximum.
    pub fn ty(&self) -> TableType {
        TableType {
            limits: Limits::new(self.size(), self.0.max),
        }
    }

    pub fn size(&self) -> u32 {
        self.0.entries.borrow().len() as u32
    }

    /// The function at `index`. Out of range is `UndefinedElement`; an empty
    /// slot is `UninitializedElement`.
    pub fn get(&self, index: u32) -> Result<FuncRef, Trap> {
        match self.0.entries.borrow().get(index as usize) {
            None => Err(Trap::UndefinedElement),
            Some(None) => Err(Trap::UninitializedElement),
            Some(Some(f)) => Ok(f.clone()),
        }
    }

    pub fn set(&self, index: u32, func: Option<FuncRef>) -> Result<(), Trap> {
        match self.0.entries.borrow_mut().get_mut(index as usize) {
            Some(slot) => {
                *slot = func;
                Ok(())
            }
            None => Err(Trap::UndefinedElement),
        }
    }

    /// Whether `len` entries starting at `offset` lie inside the table.
    pub fn fits(&self, offset: u32, len: u32) -> bool {
        offset as u64 + len as u64 <= self.size() as u64
    }

    /// Whether two handles refer to the same table.
    pub fn ptr_eq(&self, other: &Table) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Checks that element segment `segment` fits at `offset`.
    pub fn check_segment(&self, segment: usize, offset: u32, len: u32) -> Result<(), LinkError> {
        if self.fits(offset, len) {
            return Ok(());
        }
        Err(LinkError::ElementSegmentDoesNotFit {
            segment,
            offset,
            len,
            size: self.size(),
        })
    }

    /// Writes an element segment into consecutive slots.
    pub fn init_segment(
        &self,
        segment: usize,
        offset: u32,
        funcs: Vec<Option<FuncRef>>,
    ) -> Result<(), LinkError> {
        let len = u32::try_from(funcs.len()).unwrap_or(u32::MAX);
        self.check_segment(segment, offset, len)?;
        let mut entries = self.0.entries.borrow_mut();
        for (slot, func) in entries[offset as usize..].iter_mut().zip(funcs) {
            *slot = func;
        }
        Ok(())
    }
}
