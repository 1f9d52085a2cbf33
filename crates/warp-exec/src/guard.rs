//! mmap-reserved linear memory (unix only).

use std::io;
use std::ptr::{self, NonNull};

use crate::memory::LinearMemory;

/// Reserves the maximum size plus one guard page up front as `PROT_NONE`
/// and commits pages read/write as the memory grows. The base address never
/// changes.
pub struct GuardPaged {
    base: NonNull<u8>,
    reserved: usize,
    committed: usize,
    len: usize,
}

impl GuardPaged {
    /// Reserves room for `maximum` bytes and commits the first `initial`.
    pub fn new(initial: usize, maximum: usize) -> io::Result<Self> {
        let page_size = page_size();
        let reserved = round_up(maximum, page_size)
            .and_then(|len| len.checked_add(page_size))
            .ok_or_else(|| io::Error::other("memory reservation overflows"))?;

        // SAFETY: an anonymous private mapping with no address hint.
        let mmap = unsafe {
            libc::mmap(
                ptr::null_mut(),
                reserved,
                libc::PROT_NONE,
                libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };
        if mmap == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let base = NonNull::new(mmap.cast::<u8>())
            .ok_or_else(|| io::Error::other("mmap returned null"))?;

        // From here on `Drop` unmaps the reservation if commit fails.
        let mut memory = Self {
            base,
            reserved,
            committed: 0,
            len: 0,
        };
        memory.grow_to(initial)?;
        Ok(memory)
    }

    /// Bytes of address space held, including the guard page.
    pub fn reserved(&self) -> usize {
        self.reserved
    }
}

impl LinearMemory for GuardPaged {
    fn as_slice(&self) -> &[u8] {
        // SAFETY: the first `len` bytes are committed read/write.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
    }

    fn grow_to(&mut self, new_len: usize) -> io::Result<()> {
        if new_len <= self.len {
            return Ok(());
        }
        let page_size = page_size();
        let commit = round_up(new_len, page_size)
            .filter(|&len| len + page_size <= self.reserved)
            .ok_or_else(|| io::Error::other("memory grows beyond its reservation"))?;
        if commit > self.committed {
            // SAFETY: `[base, base + commit)` lies inside the reservation.
            let ret = unsafe {
                libc::mprotect(
                    self.base.as_ptr().cast(),
                    commit,
                    libc::PROT_READ | libc::PROT_WRITE,
                )
            };
            if ret != 0 {
                return Err(io::Error::last_os_error());
            }
            self.committed = commit;
        }
        self.len = new_len;
        Ok(())
    }
}

impl Drop for GuardPaged {
    fn drop(&mut self) {
        // SAFETY: `base` and `reserved` describe the mapping made in `new`.
        let ret = unsafe { libc::munmap(self.base.as_ptr().cast(), self.reserved) };
        debug_assert_eq!(ret, 0);
    }
}

fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}

fn round_up(len: usize, page_size: usize) -> Option<usize> {
    len.checked_add(page_size - 1).map(|n| n & !(page_size - 1))
}
