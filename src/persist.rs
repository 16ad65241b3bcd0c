//! Collaborator traits named in the external interfaces: durability,
//! out-of-memory notification, and the scratch side-allocator for free-list
//! link nodes that don't fit in-page.
//!
//! These are boundary contracts named but left unimplemented at the core;
//! default implementations are provided so the crate is usable out of the
//! box on both volatile test memory and real x86_64 NVM.

use core::ptr::NonNull;

/// Orders a range of writes to the mapped region so they survive a crash.
/// The core calls this after every metadata mutation that must be durable.
pub trait Persist {
    fn persist(&self, ptr: *const u8, len: usize);
}

/// No-op durability for volatile-memory targets (tests, the `BoxedRegion`
/// provider, anything that isn't real NVM).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPersist;

impl Persist for NoopPersist {
    #[inline]
    fn persist(&self, _ptr: *const u8, _len: usize) {}
}

/// Cache-line writeback + store fences, x86_64 only. Flushes every 64-byte
/// line covering `[ptr, ptr+len)` with `clflush`, bracketed by `sfence` so
/// the writeback is ordered both before and after.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheLineFlush;

#[cfg(target_arch = "x86_64")]
impl Persist for CacheLineFlush {
    fn persist(&self, ptr: *const u8, len: usize) {
        use core::arch::x86_64::{_mm_clflush, _mm_sfence};

        if len == 0 {
            return;
        }
        const LINE: usize = 64;
        // SAFETY: `ptr` is caller-guaranteed valid for `len` bytes; clflush
        // on any byte within a line is sufficient to flush that line.
        unsafe {
            _mm_sfence();
            let start = (ptr as usize) & !(LINE - 1);
            let end = ptr as usize + len;
            let mut addr = start;
            while addr < end {
                _mm_clflush(addr as *const u8);
                addr += LINE;
            }
            _mm_sfence();
        }
    }
}

/// Invoked once, before the abort hook runs, so a host can record telemetry
/// about the failed request.
pub trait OomHandler {
    fn on_oom(&self, requested: usize);
}

/// Default handler: logs at `warn` and does nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOom;

impl OomHandler for LogOom {
    fn on_oom(&self, requested: usize) {
        log::warn!("allocator out of memory, requested {requested} bytes");
    }
}

/// Supplies fixed-size (16- or 24-byte) nodes for free-list links that
/// can't be embedded in-page. In this crate's layout every free run's
/// header fits inside the first page of the run it describes, so this
/// collaborator is only exercised defensively; the shipped allocator never
/// calls it in practice.
pub trait ScratchAllocator {
    fn alloc_node(&self, size: usize) -> Option<NonNull<u8>>;
    fn free_node(&self, ptr: NonNull<u8>, size: usize);
}

/// Default scratch allocator: always refuses. Documents that the shipped
/// allocator's region layout never needs out-of-band scratch nodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullScratch;

impl ScratchAllocator for NullScratch {
    fn alloc_node(&self, _size: usize) -> Option<NonNull<u8>> {
        None
    }

    fn free_node(&self, _ptr: NonNull<u8>, _size: usize) {
        unreachable!("NullScratch never hands out nodes to free");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_persist_does_nothing_observable() {
        let p = NoopPersist;
        let buf = [0u8; 8];
        p.persist(buf.as_ptr(), buf.len());
    }

    #[test]
    fn null_scratch_always_refuses() {
        let s = NullScratch;
        assert!(s.alloc_node(16).is_none());
    }
}
