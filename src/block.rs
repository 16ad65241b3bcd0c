//! Whole-page block allocations (`BlockMalloc`/`BlockFree`).
//!
//! Grounded directly on `original_source/zmalloc.c`'s `BlockMalloc`
//! (first-fit over the free-page pool, falling back to the reserved pool)
//! and `BlockFree` (recover page count from `block_size`, reinsert a free
//! run). Generalized to walk bands in rotation order instead of a single
//! flat free list.

use crate::config::PAGE_SIZE;
use crate::endurance;
use crate::free_pool;
use crate::region::Region;
use crate::reserved;
use crate::superblock::Superblock;

/// Allocate `k` contiguous pages. Tries each band in rotation order
/// (`band_pointer`, `band_pointer+1`, ...) with first-fit, then falls back
/// to the reserved pool. Returns the absolute region offset of the first
/// page, or `None` if every band and the reserved pool are exhausted.
pub fn block_malloc<R: Region>(sb: &mut Superblock<R>, k: usize) -> Option<u64> {
    let list_num = sb.list_num();
    let band_pointer = sb.band_pointer();

    for step in 0..list_num {
        let band = (band_pointer + step) % list_num;
        if let Some(page_offset) = free_pool::alloc_run(sb, band, k as u64) {
            let first_index = sb.page_index_of(page_offset as usize - sb.data_base());
            sb.set_block_size(first_index, k as i64);
            for i in first_index + 1..first_index + k {
                sb.set_block_size(i, 0);
            }
            endurance::debit_block(sb, first_index, k);
            return Some(page_offset);
        }
    }

    reserved::reserved_alloc(sb, k)
}

/// Free a block allocation whose head page is at region offset `page_offset`
/// with index `index`. Returns `Err` if `block_size[index]` is not a
/// positive block-head marker; the caller treats that as a fatal corrupted-
/// size condition.
pub fn block_free<R: Region>(sb: &mut Superblock<R>, index: usize, page_offset: u64) -> Result<(), ()> {
    let k = sb.block_size(index);
    if k <= 0 {
        return Err(());
    }
    let k = k as usize;
    sb.set_block_size(index, 0);

    let endurance = sb.page_endurance(index);
    let band = sb.band_for(endurance);
    free_pool::free_run(sb, band, page_offset, k as u64);
    Ok(())
}

/// Number of whole pages needed to hold `bytes` bytes.
pub fn pages_for(bytes: usize) -> usize {
    bytes.div_ceil(PAGE_SIZE)
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
    fn malloc_then_free_restores_pool() {
        let mut sb = small_sb();
        let total = sb.num_pages();

        let p = block_malloc(&mut sb, 2).unwrap();
        let idx = sb.page_index_of(p as usize - sb.data_base());
        assert_eq!(sb.block_size(idx), 2);

        block_free(&mut sb, idx, p).unwrap();
        assert_eq!(sb.block_size(idx), 0);

        let band = sb.band_for(sb.page_endurance(idx));
        let head = sb.free_pool_head(band);
        let (pages, _) = sb.read_free_run_header(head);
        assert_eq!(pages, total as u64);
    }

    #[test]
    fn free_with_zero_block_size_errs() {
        let mut sb = small_sb();
        assert!(block_free(&mut sb, 0, sb.page_offset(0)).is_err());
    }

    #[test]
    fn pages_for_rounds_up() {
        assert_eq!(pages_for(1), 1);
        assert_eq!(pages_for(PAGE_SIZE), 1);
        assert_eq!(pages_for(PAGE_SIZE + 1), 2);
    }
}
