//! Linear memory.
//!
//! [`Memory`] is a shared, page-granular handle over a [`LinearMemory`]
//! backing. Two backings exist: [`BoundsChecked`], a growable `Vec<u8>`, and
//! (on unix) [`GuardPaged`](crate::guard::GuardPaged), an address-space
//! reservation that commits pages on growth and never moves. The
//! `guard-pages` feature makes the latter the default for [`Memory::new`].
//!
//! Both backings go through the same explicit bounds check, so their
//! observable behavior is identical.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use warp_wasm::{Limits, MemoryType, MAX_PAGES, PAGE_SIZE};

use crate::error::{LinkError, Trap};

/// Storage behind a [`Memory`].
pub trait LinearMemory {
    fn as_slice(&self) -> &[u8];

    fn as_mut_slice(&mut self) -> &mut [u8];

    /// Grows the accessible region to `new_len` bytes, zero-filled.
    fn grow_to(&mut self, new_len: usize) -> io::Result<()>;
}

/// A `Vec<u8>` backing. Growing may move the bytes.
#[derive(Debug, Default)]
pub struct BoundsChecked {
    data: Vec<u8>,
}

impl BoundsChecked {
    pub fn new(len: usize) -> io::Result<Self> {
        let mut memory = Self::default();
        memory.grow_to(len)?;
        Ok(memory)
    }
}

impl LinearMemory for BoundsChecked {
    fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn grow_to(&mut self, new_len: usize) -> io::Result<()> {
        if new_len > self.data.len() {
            self.data
                .try_reserve_exact(new_len - self.data.len())
                .map_err(io::Error::other)?;
            self.data.resize(new_len, 0);
        }
        Ok(())
    }
}

#[cfg(all(unix, feature = "guard-pages"))]
fn default_backing(initial: usize, maximum: usize) -> io::Result<Box<dyn LinearMemory>> {
    Ok(Box::new(crate::guard::GuardPaged::new(initial, maximum)?))
}

#[cfg(not(all(unix, feature = "guard-pages")))]
fn default_backing(initial: usize, _maximum: usize) -> io::Result<Box<dyn LinearMemory>> {
    Ok(Box::new(BoundsChecked::new(initial)?))
}

struct MemoryInner {
    max_pages: u32,
    declared_max: Option<u32>,
    backing: RefCell<Box<dyn LinearMemory>>,
}

/// A shared linear-memory handle. Clones refer to the same memory.
///
/// All accessors take `&self` and borrow the backing only for the duration
/// of one access.
#[derive(Clone)]
pub struct Memory(Rc<MemoryInner>);

impl Memory {
    /// Creates a memory of `ty.limits.min` pages with the default backing.
    pub fn new(ty: MemoryType) -> io::Result<Self> {
        let (initial, maximum) = byte_limits(&ty.limits);
        Ok(Self::with_backing(ty, default_backing(initial, maximum)?))
    }

    pub fn bounds_checked(ty: MemoryType) -> io::Result<Self> {
        let (initial, _) = byte_limits(&ty.limits);
        Ok(Self::with_backing(ty, Box::new(BoundsChecked::new(initial)?)))
    }

    #[cfg(unix)]
    pub fn guard_paged(ty: MemoryType) -> io::Result<Self> {
        let (initial, maximum) = byte_limits(&ty.limits);
        Ok(Self::with_backing(
            ty,
            Box::new(crate::guard::GuardPaged::new(initial, maximum)?),
        ))
    }

    /// Wraps an existing backing, which must already hold the minimum size.
    pub fn with_backing(ty: MemoryType, backing: Box<dyn LinearMemory>) -> Self {
        Self(Rc::new(MemoryInner {
            max_pages: ty.limits.max.unwrap_or(MAX_PAGES).min(MAX_PAGES),
            declared_max: ty.limits.max,
            backing: RefCell::new(backing),
        }))
    }

    /// Current type: the current size as minimum, the declared maximum.
    pub fn ty(&self) -> MemoryType {
        MemoryType {
            limits: Limits::new(self.size(), self.0.declared_max),
        }
    }

    /// Current size in pages.
    pub fn size(&self) -> u32 {
        (self.byte_len() / PAGE_SIZE as u64) as u32
    }

    pub fn byte_len(&self) -> u64 {
        self.0.backing.borrow().as_slice().len() as u64
    }

    /// Grows by `delta` pages and returns the previous size, or `None` when
    /// the new size would exceed the maximum or cannot be committed.
    pub fn grow(&self, delta: u32) -> Option<u32> {
        let old = self.size();
        let new = old as u64 + delta as u64;
        if new > self.0.max_pages as u64 {
            return None;
        }
        if delta == 0 {
            return Some(old);
        }
        let new_len = usize::try_from(new * PAGE_SIZE as u64).ok()?;
        match self.0.backing.borrow_mut().grow_to(new_len) {
            Ok(()) => Some(old),
            Err(err) => {
                tracing::debug!(%err, pages = new, "memory grow failed");
                None
            }
        }
    }

    /// Whether `len` bytes at `offset` lie inside the memory.
    pub fn fits(&self, offset: u32, len: u32) -> bool {
        offset as u64 + len as u64 <= self.byte_len()
    }

    pub fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), Trap> {
        let backing = self.0.backing.borrow();
        let range = checked_range(addr as u64, buf.len(), backing.as_slice().len())?;
        buf.copy_from_slice(&backing.as_slice()[range]);
        Ok(())
    }

    pub fn write(&self, addr: u32, data: &[u8]) -> Result<(), Trap> {
        let mut backing = self.0.backing.borrow_mut();
        let len = backing.as_slice().len();
        let range = checked_range(addr as u64, data.len(), len)?;
        backing.as_mut_slice()[range].copy_from_slice(data);
        Ok(())
    }

    /// Whether two handles refer to the same memory.
    pub fn ptr_eq(&self, other: &Memory) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Checks that data segment `segment` fits at `offset`. Instantiation
    /// checks every segment before it writes any of them.
    pub fn check_segment(&self, segment: usize, offset: u32, len: u32) -> Result<(), LinkError> {
        if self.fits(offset, len) {
            return Ok(());
        }
        Err(LinkError::DataSegmentDoesNotFit {
            segment,
            offset,
            len,
            size: self.byte_len(),
        })
    }

    /// Copies a data segment into memory.
    pub fn init_segment(&self, segment: usize, offset: u32, data: &[u8]) -> Result<(), LinkError> {
        let len = u32::try_from(data.len()).unwrap_or(u32::MAX);
        self.check_segment(segment, offset, len)?;
        self.write(offset, data).map_err(|_| LinkError::DataSegmentDoesNotFit {
            segment,
            offset,
            len,
            size: self.byte_len(),
        })
    }

    fn load<const N: usize>(&self, addr: u64) -> Result<[u8; N], Trap> {
        let backing = self.0.backing.borrow();
        let range = checked_range(addr, N, backing.as_slice().len())?;
        let mut buf = [0u8; N];
        buf.copy_from_slice(&backing.as_slice()[range]);
        Ok(buf)
    }

    fn store<const N: usize>(&self, addr: u64, bytes: [u8; N]) -> Result<(), Trap> {
        let mut backing = self.0.backing.borrow_mut();
        let len = backing.as_slice().len();
        let range = checked_range(addr, N, len)?;
        backing.as_mut_slice()[range].copy_from_slice(&bytes);
        Ok(())
    }
}

fn byte_limits(limits: &Limits) -> (usize, usize) {
    let max_pages = limits.max.unwrap_or(MAX_PAGES).min(MAX_PAGES) as usize;
    let page = PAGE_SIZE as usize;
    (limits.min as usize * page, max_pages * page)
}

/// The effective address is `base + offset` without wrapping; the access is
/// in bounds when `addr + width <= len`.
fn checked_range(addr: u64, width: usize, len: usize) -> Result<std::ops::Range<usize>, Trap> {
    let end = addr + width as u64;
    if end > len as u64 {
        return Err(Trap::OutOfBoundsMemoryAccess);
    }
    Ok(addr as usize..end as usize)
}

#[inline]
fn effective(base: i32, offset: u32) -> u64 {
    base as u32 as u64 + offset as u64
}

/// Little-endian typed accessors in two forms: `x_at(addr)` for an absolute
/// address and `x(base, offset)` for a base plus static offset.
macro_rules! accessors {
    ($($ty:ident: $get:ident, $get_at:ident, $put:ident, $put_at:ident;)*) => {
        impl Memory {
            $(
                #[inline]
                pub fn $get(&self, base: i32, offset: u32) -> Result<$ty, Trap> {
                    self.load(effective(base, offset)).map(<$ty>::from_le_bytes)
                }

                #[inline]
                pub fn $get_at(&self, addr: i32) -> Result<$ty, Trap> {
                    self.load(addr as u32 as u64).map(<$ty>::from_le_bytes)
                }

                #[inline]
                pub fn $put(&self, base: i32, offset: u32, value: $ty) -> Result<(), Trap> {
                    self.store(effective(base, offset), value.to_le_bytes())
                }

                #[inline]
                pub fn $put_at(&self, addr: i32, value: $ty) -> Result<(), Trap> {
                    self.store(addr as u32 as u64, value.to_le_bytes())
                }
            )*
        }
    };
}

accessors! {
    i8: i8, i8_at, put_i8, put_i8_at;
    u8: u8, u8_at, put_u8, put_u8_at;
    i16: i16, i16_at, put_i16, put_i16_at;
    u16: u16, u16_at, put_u16, put_u16_at;
    i32: i32, i32_at, put_i32, put_i32_at;
    u32: u32, u32_at, put_u32, put_u32_at;
    i64: i64, i64_at, put_i64, put_i64_at;
    f32: f32, f32_at, put_f32, put_f32_at;
    f64: f64, f64_at, put_f64, put_f64_at;
}
