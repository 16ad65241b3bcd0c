//! Reserved pool: an unbanded fallback page region at the tail of `R`.
//!
//! Grounded on `original_source/zmalloc.c`'s `get_reservedblocks`/
//! `rsvdblockFree` and `zmalloc.h`'s `rsvdblock_head{int nPages}`.
//! `is_rsvdblock`'s original bitwise predicate is replaced here with an
//! address-range-plus-alignment check, since the original's predicate was
//! questionable and could misclassify addresses (see DESIGN.md).
//!
//! Deliberately unbanded and unaccounted against `page_endurance`: its use
//! is a last resort and signals pressure on the banded pools.

use crate::bitmap;
use crate::config::PAGE_SIZE;
use crate::region::Region;
use crate::superblock::Superblock;

/// Size of the header written at the first page of a reservation. 64 bytes
/// so the returned payload pointer stays 64-byte aligned like every other
/// allocation (the header's `nPages` lives in its first 8 bytes).
const HEADER_SIZE: u64 = 64;

/// Reserve `k` contiguous pages from the tail pool. Returns the absolute
/// region offset of the *payload* (past the header), or `None` if no run
/// of `k` free pages exists anywhere in the pool.
pub fn reserved_alloc<R: Region>(sb: &mut Superblock<R>, k: usize) -> Option<u64> {
    let total_pages = sb.reserved_pages();
    let start = sb.rsvd_start().min(total_pages);

    let found = {
        let bits = sb.reserved_bits();
        bitmap::find_first_n(bits, start, total_pages, k)
            .or_else(|| bitmap::find_first_n(bits, 0, start, k))
    };
    let page_index = found?;

    {
        let bits = sb.reserved_bits();
        bitmap::set_bits(bits, page_index, k);
    }
    sb.set_rsvd_start((page_index + k) % total_pages.max(1));

    let header_offset = sb.reserved_base() as u64 + page_index as u64 * PAGE_SIZE as u64;
    sb.write_free_run_header(header_offset, k as u64, crate::config::NULL_LINK);
    log::warn!("reserved pool fallback: {k} pages at index {page_index}");
    Some(header_offset + HEADER_SIZE)
}

/// Whether `ptr_off` (an absolute region offset) is a live reserved-block
/// payload pointer: inside the reserved pool's address range and aligned
/// to a page-plus-header boundary.
pub fn is_rsvdblock<R: Region>(sb: &Superblock<R>, ptr_off: u64) -> bool {
    let base = sb.reserved_base() as u64;
    let end = base + sb.reserved_pages() as u64 * PAGE_SIZE as u64;
    if ptr_off < base + HEADER_SIZE || ptr_off >= end {
        return false;
    }
    (ptr_off - base - HEADER_SIZE) % PAGE_SIZE as u64 == 0
}

/// Free a reserved-block payload pointer, recovering its page count from
/// the header and clearing the corresponding bits.
pub fn reserved_free<R: Region>(sb: &mut Superblock<R>, ptr_off: u64) {
    let header_offset = ptr_off - HEADER_SIZE;
    let (pages, _) = sb.read_free_run_header(header_offset);
    let page_index = ((header_offset - sb.reserved_base() as u64) / PAGE_SIZE as u64) as usize;

    let bits = sb.reserved_bits();
    bitmap::reset_bits(bits, page_index, pages as usize);
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::config::Config;
    use crate::region::BoxedRegion;

    fn small_sb() -> Superblock<BoxedRegion> {
        let config = Config { nvm_size: 1024 * 1024, ..Config::small() };
        let region = BoxedRegion::new(config.nvm_size);
        Superblock::init(region, config)
    }

    #[test]
    fn alloc_then_free_roundtrips() {
        let mut sb = small_sb();
        let p = reserved_alloc(&mut sb, 3).unwrap();
        assert!(is_rsvdblock(&sb, p));
        reserved_free(&mut sb, p);

        // pool should now be fully free again
        let q = reserved_alloc(&mut sb, sb.reserved_pages()).unwrap();
        assert!(is_rsvdblock(&sb, q));
    }

    #[test]
    fn non_reserved_pointer_is_rejected() {
        let sb = small_sb();
        let data_ptr = sb.page_offset(0);
        assert!(!is_rsvdblock(&sb, data_ptr));
    }

    #[test]
    fn exhausted_pool_returns_none() {
        let mut sb = small_sb();
        let total = sb.reserved_pages();
        assert!(reserved_alloc(&mut sb, total + 1).is_none());
    }
}
