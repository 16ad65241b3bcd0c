//! Endurance accounting and band rotation.
//!
//! The original drafts track only a flat `slot_endurance` counter
//! (`calc_counter2`/`block_endurence_add`) with no banding at all; the
//! wear-band ladder and `rotate_band()` here are a redesign over that,
//! adapted from a kernel page allocator's per-order free-area indexing
//! style (an array of buckets walked outward from a preferred index)
//! applied to wear bands instead of buddy orders.

use crate::list::PageSource;
use crate::region::Region;
use crate::slab_dir;
use crate::superblock::Superblock;

/// Debit `slots` endurance units from a slab page at `page_offset`,
/// updating both its page view and the superblock's `page_endurance`
/// mirror for the page at `index`.
pub fn debit_slab<R: Region>(sb: &mut Superblock<R>, index: usize, page_offset: u64, slots: u8) {
    let new_endurance = {
        let mut view = sb.page_view_mut(page_offset);
        let e = view.endurance().saturating_sub(slots as u64);
        view.set_endurance(e);
        e
    };
    sb.set_page_endurance(index, new_endurance);
}

/// Debit a block allocation's pages, `64` units per page (matches the
/// original's `block_endurence_add`/`calc_counter2`, which debits
/// `size * 64` across the block's page range).
pub fn debit_block<R: Region>(sb: &mut Superblock<R>, first_index: usize, pages: usize) {
    for i in first_index..first_index + pages {
        let e = sb.page_endurance(i).saturating_sub(64);
        sb.set_page_endurance(i, e);
    }
}

/// `maybe_rotate_band()`: rotate the band pointer forward if the current
/// band has drained below `immigration_limit` and has no pages left in its
/// free-page pool head run.
pub fn maybe_rotate_band<R: Region>(sb: &mut Superblock<R>, immigration_limit: usize) {
    let band_pointer = sb.band_pointer();
    let slab_population = sb.band_population(band_pointer);

    let free_head = sb.free_pool_head(band_pointer);
    let free_head_pages = if free_head == crate::config::NULL_LINK {
        0
    } else {
        sb.read_free_run_header(free_head).0
    };

    let leave = slab_population + free_head_pages;
    if leave < immigration_limit as u64 && free_head_pages == 0 {
        rotate_band(sb);
    }
}

/// Splice the current band's slab buckets onto the next band, advance
/// `band_pointer` by exactly 1 mod `list_num`, and shift every threshold
/// down one slot so the ladder stays aligned with the new pointer.
pub fn rotate_band<R: Region>(sb: &mut Superblock<R>) {
    let list_num = sb.list_num();
    let band_pointer = sb.band_pointer();
    let next_band = (band_pointer + 1) % list_num;

    slab_dir::splice_band(sb, band_pointer, next_band);

    let thresholds: alloc::vec::Vec<u64> = (0..list_num).map(|b| sb.band_threshold(b)).collect();
    for b in 0..list_num {
        let shifted = thresholds[(b + 1) % list_num];
        sb.set_band_threshold(b, shifted);
    }

    sb.set_band_pointer(next_band);
    log::debug!("rotated band pointer to {next_band}");
}
