//! Reform/reclaim scan: reclaims Zero-marked slab pages (`block_size[i] ==
//! -1`) back into service.
//!
//! Grounded on `original_source/zmalloc.c`'s `reform_thread`: a linear
//! sweep over the page-index array starting at a rolling `reform_pointer`,
//! looking for the `-1` sentinel, recomputing `maxrun` via
//! `find_longgest_zero` (our [`crate::page_view::PageView::recompute_maxrun`]),
//! and reinserting pages that don't satisfy the current request.

use crate::list::PageSource;
use crate::region::Region;
use crate::slab_dir;
use crate::superblock::Superblock;

/// Zero-bucket sentinel stored in `block_size` for a slab page with no
/// usable free space (`freenum == 0` or `maxrun == 0`).
pub const ZERO_MARK: i64 = -1;

/// Sweep the whole page-index array starting at the rolling
/// `reform_pointer`, looking for a Zero-marked page with enough free space
/// for `min_slots`. This mirrors the original's global sweep: it is not
/// restricted to any one band. On success, advances `reform_pointer` past
/// the returned page and leaves it *unbucketed* (the caller places it
/// immediately). Pages that are reclaimed but still too small are
/// reinserted into their own band's directory and the scan continues.
/// Returns `(page_offset, maxrun)`.
pub fn reform_scan<R: Region>(sb: &mut Superblock<R>, min_slots: usize) -> Option<(u64, usize)> {
    let num_pages = sb.num_pages();
    if num_pages == 0 {
        return None;
    }
    let start = sb.reform_pointer() % num_pages;

    for step in 0..num_pages {
        let i = (start + step) % num_pages;
        if sb.block_size(i) != ZERO_MARK {
            continue;
        }

        let page_offset = sb.page_offset(i);
        let freenum = sb.page_view_mut(page_offset).freenum();
        if freenum == 0 {
            continue;
        }

        sb.set_block_size(i, 0);
        sb.page_view_mut(page_offset).recompute_maxrun();
        let maxrun = sb.page_view_mut(page_offset).maxrun() as usize;

        if maxrun >= min_slots {
            sb.set_reform_pointer(i + 1);
            return Some((page_offset, maxrun));
        }

        if maxrun > 0 {
            let page_band = sb.band_for(sb.page_endurance(i));
            slab_dir::push_tail(sb, page_band, maxrun, page_offset);
        } else {
            sb.set_block_size(i, ZERO_MARK);
        }
    }

    sb.set_reform_pointer(start);
    None
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
    fn reclaims_zero_marked_page_with_enough_room() {
        let mut sb = small_sb();
        let page = sb.page_offset(0);
        {
            let mut view = sb.page_view_mut(page);
            view.init(1000);
        }
        sb.set_block_size(0, ZERO_MARK);

        let (found, maxrun) = reform_scan(&mut sb, 10).unwrap();
        assert_eq!(found, page);
        assert_eq!(maxrun, 63);
        assert_eq!(sb.block_size(0), 0);
    }

    #[test]
    fn skips_page_still_too_small_and_rebuckets_it() {
        let mut sb = small_sb();
        let page = sb.page_offset(0);
        {
            let mut view = sb.page_view_mut(page);
            view.init(1000);
            crate::bitmap::set_bits(view.bitmap_mut(), 0, 60);
            view.recompute_maxrun();
        }
        sb.set_block_size(0, ZERO_MARK);

        assert!(reform_scan(&mut sb, 10).is_none());
        assert_eq!(sb.block_size(0), 0);

        let band = sb.band_for(sb.page_endurance(0));
        assert_eq!(sb.slab_dir_head(band, 3), page);
    }

    #[test]
    fn returns_none_when_no_zero_marked_pages_exist() {
        let mut sb = small_sb();
        assert!(reform_scan(&mut sb, 1).is_none());
    }
}
