//! `band x maxrun` matrix of slab-page lists.
//!
//! Grounded on `original_source/zmalloc.c`'s `slab_array[64]` of
//! `(head, tail)` page lists (`find_array_suit` walks `slots..63` looking
//! for a nonempty bucket), generalized from the original's single flat
//! array to a `band x maxrun` matrix. Pages within a bucket are
//! FIFO: insert at the tail, detach from the head, matching the original's
//! intent of draining older pages first.

use crate::config::NULL_LINK;
use crate::list::PageSource;
use crate::region::Region;
use crate::superblock::Superblock;

/// Push a page onto the tail of bucket `(band, maxrun)`.
pub fn push_tail<R: Region>(sb: &mut Superblock<R>, band: usize, maxrun: usize, page_offset: u64) {
    let tail = sb.slab_dir_tail(band, maxrun);
    {
        let mut view = sb.page_view_mut(page_offset);
        view.set_next(NULL_LINK);
        view.set_prev(tail);
    }
    if tail == NULL_LINK {
        sb.set_slab_dir_head(band, maxrun, page_offset);
    } else {
        sb.page_view_mut(tail).set_next(page_offset);
    }
    sb.set_slab_dir_tail(band, maxrun, page_offset);
    sb.set_band_population(band, sb.band_population(band) + 1);
}

/// Detach and return the head page of bucket `(band, maxrun)`, or `None` if
/// the bucket is empty.
pub fn pop_head<R: Region>(sb: &mut Superblock<R>, band: usize, maxrun: usize) -> Option<u64> {
    let head = sb.slab_dir_head(band, maxrun);
    if head == NULL_LINK {
        return None;
    }
    let next = sb.page_view_mut(head).next();
    sb.set_slab_dir_head(band, maxrun, next);
    if next == NULL_LINK {
        sb.set_slab_dir_tail(band, maxrun, NULL_LINK);
    } else {
        sb.page_view_mut(next).set_prev(NULL_LINK);
    }
    sb.set_band_population(band, sb.band_population(band) - 1);
    Some(head)
}

/// `find_array_suit`: scan buckets `slots..63` of band `band` for the first
/// nonempty one and detach its head page. Returns `(page_offset, maxrun)`.
pub fn find_and_detach<R: Region>(
    sb: &mut Superblock<R>,
    band: usize,
    min_slots: usize,
) -> Option<(u64, usize)> {
    for maxrun in min_slots..64 {
        if let Some(page) = pop_head(sb, band, maxrun) {
            return Some((page, maxrun));
        }
    }
    None
}

/// Splice every bucket of `from_band` onto the tail of the matching
/// same-`maxrun` bucket of `to_band`, emptying `from_band`'s directory row.
/// Used by `rotate_band()`.
pub fn splice_band<R: Region>(sb: &mut Superblock<R>, from_band: usize, to_band: usize) {
    let moved = sb.band_population(from_band);
    sb.set_band_population(to_band, sb.band_population(to_band) + moved);
    sb.set_band_population(from_band, 0);

    for maxrun in 0..64 {
        let from_head = sb.slab_dir_head(from_band, maxrun);
        if from_head == NULL_LINK {
            continue;
        }
        let from_tail = sb.slab_dir_tail(from_band, maxrun);

        let to_tail = sb.slab_dir_tail(to_band, maxrun);
        if to_tail == NULL_LINK {
            sb.set_slab_dir_head(to_band, maxrun, from_head);
        } else {
            sb.page_view_mut(to_tail).set_next(from_head);
        }
        sb.page_view_mut(from_head).set_prev(to_tail);
        sb.set_slab_dir_tail(to_band, maxrun, from_tail);

        sb.set_slab_dir_head(from_band, maxrun, NULL_LINK);
        sb.set_slab_dir_tail(from_band, maxrun, NULL_LINK);
    }
}
