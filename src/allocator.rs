//! Top-level `allocate`/`callocate`/`reallocate`/`deallocate`/`size_of`
//! dispatch, and the `Allocator` facade that owns the superblock and ties
//! every lower module together.
//!
//! Grounded on `original_source/zmalloc.c`'s `NVMmalloc`/`NVMcalloc`/
//! `NVMrealloc`/`NVMfree`/`NVMmalloc_size`, generalized from the original's
//! free functions over a single global `super` pointer into methods on an
//! owned handle that encapsulates the superblock instead of keeping it as
//! hidden global state.

use core::fmt;
use core::ptr::NonNull;

use crate::bitmap;
use crate::block;
use crate::config::{Config, PAGE_SIZE, SLOT_SIZE};
use crate::endurance;
use crate::error::{AbortHook, AbortReason, Error, PanicAbort};
use crate::free_pool;
use crate::list::PageSource;
use crate::region::Region;
use crate::reform;
use crate::reserved;
use crate::slab_dir;
use crate::superblock::Superblock;

/// Maximum slots a slab request can occupy; anything larger goes to the
/// block path.
const MAX_SLAB_SLOTS: usize = 63;

/// A snapshot of allocator occupancy, modeled on the debug-dump style page
/// accounting (`print_page_allocations`) this crate is based on, but
/// returned as data instead of printed.
#[derive(Debug, Clone)]
pub struct Stats {
    pub region_len: usize,
    pub data_pages: usize,
    pub reserved_pages: usize,
    pub band_pointer: usize,
    pub band_population: alloc::vec::Vec<u64>,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "region: {} bytes, {} data pages, {} reserved pages",
            self.region_len, self.data_pages, self.reserved_pages)?;
        writeln!(f, "band pointer: {}", self.band_pointer)?;
        for (b, pop) in self.band_population.iter().enumerate() {
            writeln!(f, "  band {b}: {pop} slab pages")?;
        }
        Ok(())
    }
}

/// Owns the mapped region and every piece of superblock state; the single
/// entry point a host embeds.
pub struct Allocator<R: Region, H: AbortHook = PanicAbort> {
    sb: Superblock<R>,
    config: Config,
    abort_hook: H,
}

impl<R: Region> Allocator<R, PanicAbort> {
    /// Map and initialize a fresh region with the default `panic!`-based
    /// abort hook.
    pub fn new(region: R, config: Config) -> Self {
        Allocator { sb: Superblock::init(region, config), config, abort_hook: PanicAbort }
    }
}

impl<R: Region, H: AbortHook> Allocator<R, H> {
    /// Map and initialize a fresh region with a custom abort hook (e.g. to
    /// observe aborts in tests instead of unwinding the process).
    pub fn with_abort_hook(region: R, config: Config, abort_hook: H) -> Self {
        Allocator { sb: Superblock::init(region, config), config, abort_hook }
    }

    pub fn stats(&self) -> Stats {
        Stats {
            region_len: self.sb.region().len(),
            data_pages: self.sb.num_pages(),
            reserved_pages: self.sb.reserved_pages(),
            band_pointer: self.sb.band_pointer(),
            band_population: (0..self.sb.list_num()).map(|b| self.sb.band_population(b)).collect(),
        }
    }

    fn base(&self) -> usize {
        self.sb.region().base().as_ptr() as usize
    }

    fn ptr_to_offset(&self, ptr: NonNull<u8>) -> u64 {
        (ptr.as_ptr() as usize - self.base()) as u64
    }

    fn offset_to_ptr(&self, offset: u64) -> NonNull<u8> {
        // SAFETY: `offset` always addresses a byte inside the mapped region.
        unsafe { NonNull::new_unchecked((self.base() + offset as usize) as *mut u8) }
    }

    /// `allocate(n)`. Returns `None` only for `n == 0` (silently ignored);
    /// any other failure goes through the abort hook and never returns.
    pub fn allocate(&mut self, n: usize) -> Option<NonNull<u8>> {
        if n == 0 {
            return None;
        }
        let offset = if n <= MAX_SLAB_SLOTS * SLOT_SIZE {
            let slots = n.div_ceil(SLOT_SIZE);
            self.slab_malloc(slots)
        } else {
            let pages = block::pages_for(n);
            block::block_malloc(&mut self.sb, pages)
        };

        match offset {
            Some(off) => Some(self.offset_to_ptr(off)),
            None => self.abort_hook.on_abort(AbortReason::OutOfMemory { requested: n }),
        }
    }

    /// `callocate(count, size)`: `allocate(count * size)` with the payload
    /// zeroed, refusing on overflow instead of aborting (the one other
    /// recoverable condition besides `InvalidPointer`).
    pub fn callocate(&mut self, count: usize, size: usize) -> Result<Option<NonNull<u8>>, Error> {
        let n = count.checked_mul(size).ok_or(Error::SizeOverflow)?;
        let ptr = self.allocate(n);
        if let Some(p) = ptr {
            // SAFETY: `allocate` just returned a live range of at least `n` bytes.
            unsafe { core::ptr::write_bytes(p.as_ptr(), 0, n) };
        }
        Ok(ptr)
    }

    /// Slab allocation over `slots` consecutive 64-byte slots. Returns the
    /// absolute region offset of the payload, or `None` if every band
    /// (including reform and a fresh page) is exhausted.
    fn slab_malloc(&mut self, slots: usize) -> Option<u64> {
        let list_num = self.sb.list_num();
        let band_pointer = self.sb.band_pointer();

        for k in 0..list_num {
            let band = (band_pointer + k) % list_num;

            let page_offset = if let Some((p, _)) = slab_dir::find_and_detach(&mut self.sb, band, slots) {
                Some(p)
            } else if let Some(p) = free_pool::page_malloc(&mut self.sb, band) {
                let index = self.sb.page_index_of(p as usize - self.sb.data_base());
                let endurance = self.sb.page_endurance(index);
                self.sb.page_view_mut(p).init(endurance);
                Some(p)
            } else if let Some((p, _)) = reform::reform_scan(&mut self.sb, slots) {
                Some(p)
            } else {
                None
            };

            let Some(page_offset) = page_offset else { continue };

            let index = self.sb.page_index_of(page_offset as usize - self.sb.data_base());
            let o = self.sb.page_view_mut(page_offset).offset();
            {
                let mut view = self.sb.page_view_mut(page_offset);
                bitmap::set_bits(view.bitmap_mut(), o as usize, slots);
                view.record_slab_alloc_size(o, slots as u8);
                view.set_offset(o + slots as u8);
                view.set_maxrun(view.maxrun() - slots as u8);
                view.set_freenum(view.freenum() - slots as u8);
            }

            endurance::debit_slab(&mut self.sb, index, page_offset, slots as u8);
            self.rebucket(page_offset, index);
            endurance::maybe_rotate_band(&mut self.sb, self.config.immigration_limit);

            return Some(page_offset + o as u64 * SLOT_SIZE as u64);
        }

        None
    }

    /// Place a page into the Zero bucket if it's out of free space, else
    /// into its `(band, maxrun)` slab-directory bucket.
    fn rebucket(&mut self, page_offset: u64, index: usize) {
        let view = self.sb.page_view_mut(page_offset);
        let (freenum, maxrun) = (view.freenum(), view.maxrun());
        if freenum == 0 || maxrun == 0 {
            self.sb.set_block_size(index, reform::ZERO_MARK);
        } else {
            let band = self.sb.band_for(self.sb.page_endurance(index));
            slab_dir::push_tail(&mut self.sb, band, maxrun as usize, page_offset);
        }
    }

    /// `free(p)` dispatch.
    pub fn deallocate(&mut self, ptr: Option<NonNull<u8>>) -> Result<(), Error> {
        let Some(ptr) = ptr else { return Ok(()) };
        let offset = self.ptr_to_offset(ptr);

        if reserved::is_rsvdblock(&self.sb, offset) {
            reserved::reserved_free(&mut self.sb, offset);
            return Ok(());
        }

        let data_base = self.sb.data_base() as u64;
        let data_len = self.sb.num_pages() as u64 * PAGE_SIZE as u64;
        if offset < data_base || offset >= data_base + data_len {
            return Err(Error::InvalidPointer);
        }

        let page_index = ((offset - data_base) / PAGE_SIZE as u64) as usize;
        if self.sb.block_size(page_index) > 0 {
            if offset % PAGE_SIZE as u64 != 0 {
                self.abort_hook.on_abort(AbortReason::UnalignedBlockPointer);
            }
            let page_offset = data_base + page_index as u64 * PAGE_SIZE as u64;
            if block::block_free(&mut self.sb, page_index, page_offset).is_err() {
                self.abort_hook.on_abort(AbortReason::CorruptBlockSize { page_index });
            }
            return Ok(());
        }

        self.slab_free(offset);
        Ok(())
    }

    /// Slab half of free dispatch: derive page/slot from `offset`, recover
    /// the run length via `size_bitmap`, and clear it. Not re-bucketed here;
    /// re-bucketing is deferred to the next reform-scan touch.
    fn slab_free(&mut self, offset: u64) {
        let data_base = self.sb.data_base() as u64;
        let page_offset = data_base + ((offset - data_base) / PAGE_SIZE as u64) * PAGE_SIZE as u64;
        let o = ((offset - page_offset) / SLOT_SIZE as u64) as u8;

        let mut view = self.sb.page_view_mut(page_offset);
        let len = view.slab_free_size(o);
        if len == 0 || len as usize > MAX_SLAB_SLOTS {
            let page_index = self.sb.page_index_of(page_offset as usize - self.sb.data_base());
            self.abort_hook.on_abort(AbortReason::SizeRecoveryOutOfRange { page_index, offset: o });
        }
        bitmap::reset_bits(view.bitmap_mut(), o as usize, len as usize);
        view.set_freenum(view.freenum() + len);
    }

    /// `size_of(p)`: recoverable usable byte size of a live allocation.
    pub fn size_of(&mut self, ptr: NonNull<u8>) -> Result<usize, Error> {
        let offset = self.ptr_to_offset(ptr);

        if reserved::is_rsvdblock(&self.sb, offset) {
            let header_offset = offset - 64;
            let (pages, _) = self.sb.read_free_run_header(header_offset);
            return Ok(pages as usize * PAGE_SIZE - 64);
        }

        let data_base = self.sb.data_base() as u64;
        let data_len = self.sb.num_pages() as u64 * PAGE_SIZE as u64;
        if offset < data_base || offset >= data_base + data_len {
            return Err(Error::InvalidPointer);
        }

        let page_index = ((offset - data_base) / PAGE_SIZE as u64) as usize;
        if self.sb.block_size(page_index) > 0 {
            return Ok(self.sb.block_size(page_index) as usize * PAGE_SIZE);
        }

        let page_offset = data_base + page_index as u64 * PAGE_SIZE as u64;
        let o = ((offset - page_offset) / SLOT_SIZE as u64) as u8;
        let len = self.sb.page_view_mut(page_offset).slab_free_size(o);
        Ok(len as usize * SLOT_SIZE)
    }

    /// `realloc(p, n)`.
    pub fn reallocate(&mut self, ptr: Option<NonNull<u8>>, n: usize) -> Result<Option<NonNull<u8>>, Error> {
        let Some(p) = ptr else { return Ok(self.allocate(n)) };
        if n == 0 {
            self.deallocate(Some(p))?;
            return Ok(None);
        }

        let old = self.size_of(p)?;
        if n <= old {
            return Ok(Some(p));
        }

        let new_ptr = self.allocate(n);
        if let Some(new_p) = new_ptr {
            // SAFETY: `old` bytes at `p` are live and disjoint from the
            // freshly allocated `new_p` range.
            unsafe { core::ptr::copy_nonoverlapping(p.as_ptr(), new_p.as_ptr(), old) };
            self.deallocate(Some(p))?;
        }
        Ok(new_ptr)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::region::BoxedRegion;

    fn small_alloc() -> Allocator<BoxedRegion> {
        let config = Config { nvm_size: 1024 * 1024, ..Config::small() };
        Allocator::new(BoxedRegion::new(config.nvm_size), config)
    }

    #[test]
    fn small_alloc_then_free_roundtrips() {
        let mut a = small_alloc();
        let p = a.allocate(40).unwrap();
        assert_eq!((p.as_ptr() as usize - a.base()) % SLOT_SIZE, a.sb.data_base() % SLOT_SIZE);
        a.deallocate(Some(p)).unwrap();
    }

    #[test]
    fn allocate_zero_returns_none() {
        let mut a = small_alloc();
        assert!(a.allocate(0).is_none());
    }

    #[test]
    fn block_alloc_then_free_roundtrips() {
        let mut a = small_alloc();
        let p = a.allocate(8192).unwrap();
        assert_eq!(a.size_of(p).unwrap(), 2 * PAGE_SIZE);
        a.deallocate(Some(p)).unwrap();
    }

    #[test]
    fn realloc_in_place_when_it_fits() {
        let mut a = small_alloc();
        let p = a.allocate(40).unwrap();
        let q = a.reallocate(Some(p), 50).unwrap().unwrap();
        assert_eq!(p, q);
    }

    #[test]
    fn realloc_grow_copies_and_frees_old() {
        let mut a = small_alloc();
        let p = a.allocate(40).unwrap();
        unsafe { core::ptr::write_bytes(p.as_ptr(), 0xab, 40) };
        let q = a.reallocate(Some(p), 200).unwrap().unwrap();
        assert_ne!(p, q);
        let copied = unsafe { core::slice::from_raw_parts(q.as_ptr(), 40) };
        assert!(copied.iter().all(|&b| b == 0xab));
    }

    #[test]
    fn deallocate_null_is_noop() {
        let mut a = small_alloc();
        assert!(a.deallocate(None).is_ok());
    }

    #[test]
    fn many_slab_allocations_all_free_cleanly() {
        let mut a = small_alloc();
        let mut ptrs = alloc::vec::Vec::new();
        for _ in 0..100 {
            ptrs.push(a.allocate(40).unwrap());
        }
        for p in ptrs {
            a.deallocate(Some(p)).unwrap();
        }
    }
}
