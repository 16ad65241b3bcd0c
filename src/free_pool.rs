//! Per-band free-page pool: an address-sorted singly-linked list of
//! contiguous free-page runs, each run's `(pages, next)` header embedded at
//! the first page of the run.
//!
//! Grounded on `original_source/zmalloc.c`'s `page_malloc` (split-on-alloc)
//! and `insert_to_free_list`/`BlockFree` (address-ordered insert with
//! adjacent-run coalescing commented out in the original `can_merge`
//! helper; this crate enables that check within a band, per spec's
//! "implementers MAY coalesce" allowance).

use crate::config::{NULL_LINK, PAGE_SIZE};
use crate::region::Region;
use crate::superblock::Superblock;

/// Pull one page out of band `band`'s free pool, splitting the head run if
/// it covers more than one page. Returns the page's region offset, or
/// `None` if the band's pool is empty.
pub fn page_malloc<R: Region>(sb: &mut Superblock<R>, band: usize) -> Option<u64> {
    let head = sb.free_pool_head(band);
    if head == NULL_LINK {
        return None;
    }
    let (pages, next) = sb.read_free_run_header(head);
    if pages <= 1 {
        sb.set_free_pool_head(band, next);
    } else {
        let remainder_offset = head + PAGE_SIZE as u64;
        sb.write_free_run_header(remainder_offset, pages - 1, next);
        sb.set_free_pool_head(band, remainder_offset);
    }
    Some(head)
}

/// Find and remove the first run with at least `k` pages, splitting off the
/// leading `k` pages and returning their offset. The tail of a split run
/// (if any) stays in the same position in the list.
pub fn alloc_run<R: Region>(sb: &mut Superblock<R>, band: usize, k: u64) -> Option<u64> {
    let mut prev: Option<u64> = None;
    let mut cur = sb.free_pool_head(band);
    while cur != NULL_LINK {
        let (pages, next) = sb.read_free_run_header(cur);
        if pages >= k {
            if pages == k {
                match prev {
                    Some(p) => {
                        let (p_pages, _) = sb.read_free_run_header(p);
                        sb.write_free_run_header(p, p_pages, next);
                    }
                    None => sb.set_free_pool_head(band, next),
                }
            } else {
                let remainder_offset = cur + k * PAGE_SIZE as u64;
                sb.write_free_run_header(remainder_offset, pages - k, next);
                match prev {
                    Some(p) => {
                        let (p_pages, _) = sb.read_free_run_header(p);
                        sb.write_free_run_header(p, p_pages, remainder_offset);
                    }
                    None => sb.set_free_pool_head(band, remainder_offset),
                }
            }
            return Some(cur);
        }
        prev = Some(cur);
        cur = next;
    }
    None
}

/// Insert a `pages`-page run starting at `page_offset` into band `band`'s
/// pool, keeping the list address-ordered. Coalesces with an
/// address-adjacent neighbor on either side, but never across the band
/// boundary (the caller always passes the band matching the run's current
/// endurance, so a neighbor found here is implicitly same-band already).
pub fn free_run<R: Region>(sb: &mut Superblock<R>, band: usize, page_offset: u64, pages: u64) {
    let head = sb.free_pool_head(band);

    if head == NULL_LINK || page_offset < head {
        let (mut merged_pages, mut merged_next) = (pages, head);
        if head != NULL_LINK && page_offset + pages * PAGE_SIZE as u64 == head {
            let (head_pages, head_next) = sb.read_free_run_header(head);
            merged_pages += head_pages;
            merged_next = head_next;
        }
        sb.write_free_run_header(page_offset, merged_pages, merged_next);
        sb.set_free_pool_head(band, page_offset);
        return;
    }

    let mut prev = head;
    loop {
        let (prev_pages, prev_next) = sb.read_free_run_header(prev);
        if prev_next == NULL_LINK || page_offset < prev_next {
            let merges_with_prev = prev + prev_pages * PAGE_SIZE as u64 == page_offset;
            let merges_with_next =
                prev_next != NULL_LINK && page_offset + pages * PAGE_SIZE as u64 == prev_next;

            if merges_with_prev && merges_with_next {
                let (next_pages, next_next) = sb.read_free_run_header(prev_next);
                sb.write_free_run_header(prev, prev_pages + pages + next_pages, next_next);
            } else if merges_with_prev {
                sb.write_free_run_header(prev, prev_pages + pages, prev_next);
            } else if merges_with_next {
                let (next_pages, next_next) = sb.read_free_run_header(prev_next);
                sb.write_free_run_header(page_offset, pages + next_pages, next_next);
                sb.write_free_run_header(prev, prev_pages, page_offset);
            } else {
                sb.write_free_run_header(page_offset, pages, prev_next);
                sb.write_free_run_header(prev, prev_pages, page_offset);
            }
            return;
        }
        prev = prev_next;
    }
}
