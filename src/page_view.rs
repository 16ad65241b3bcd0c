//! Decoded in-page metadata occupying the last 64 bytes of a slab page.
//!
//! Field order follows the original C `page_info` struct this is distilled
//! from (`bitmap, freenum, maxnum, offset, next, pre, leave_endurance,
//! bitmap_size`) byte-for-byte, just widened where this layout needs it
//! (`next`/`prev` become 8-byte link offsets rather than raw pointers, and
//! `size_bitmap` is a full 8-byte run-toggle bitmap rather than a single
//! byte, since a 63-slot page needs 63 toggle bits).

use crate::bitmap;
use crate::config::{NULL_LINK, PAGE_VIEW_SIZE, SLOTS_PER_PAGE};

const BITMAP_OFF: usize = 0; // 8 bytes
const FREENUM_OFF: usize = 8; // 1 byte
const MAXRUN_OFF: usize = 9; // 1 byte
const OFFSET_OFF: usize = 10; // 1 byte
const NEXT_OFF: usize = 11; // 8 bytes
const PREV_OFF: usize = 19; // 8 bytes
const ENDURANCE_OFF: usize = 27; // 8 bytes
const SIZE_BITMAP_OFF: usize = 35; // 8 bytes
const USED_LEN: usize = SIZE_BITMAP_OFF + 8;

static_assertions::const_assert!(USED_LEN <= PAGE_VIEW_SIZE);

/// A read-write view over the trailing 64 bytes of one slab page.
///
/// Borrows the bytes rather than owning them: the page itself is the
/// storage, this is just a typed accessor over it.
pub struct PageView<'a> {
    bytes: &'a mut [u8],
}

impl<'a> PageView<'a> {
    /// Wrap the last `PAGE_VIEW_SIZE` bytes of a page.
    ///
    /// # Panics
    /// If `bytes` is shorter than `PAGE_VIEW_SIZE`.
    pub fn new(bytes: &'a mut [u8]) -> Self {
        assert!(bytes.len() >= PAGE_VIEW_SIZE);
        PageView { bytes: &mut bytes[..PAGE_VIEW_SIZE] }
    }

    #[inline]
    pub fn bitmap(&self) -> &[u8] {
        &self.bytes[BITMAP_OFF..BITMAP_OFF + 8]
    }

    #[inline]
    pub fn bitmap_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[BITMAP_OFF..BITMAP_OFF + 8]
    }

    #[inline]
    pub fn size_bitmap(&self) -> &[u8] {
        &self.bytes[SIZE_BITMAP_OFF..SIZE_BITMAP_OFF + 8]
    }

    #[inline]
    pub fn size_bitmap_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[SIZE_BITMAP_OFF..SIZE_BITMAP_OFF + 8]
    }

    #[inline]
    pub fn freenum(&self) -> u8 {
        self.bytes[FREENUM_OFF]
    }

    #[inline]
    pub fn set_freenum(&mut self, v: u8) {
        self.bytes[FREENUM_OFF] = v;
    }

    #[inline]
    pub fn maxrun(&self) -> u8 {
        self.bytes[MAXRUN_OFF]
    }

    #[inline]
    pub fn set_maxrun(&mut self, v: u8) {
        self.bytes[MAXRUN_OFF] = v;
    }

    #[inline]
    pub fn offset(&self) -> u8 {
        self.bytes[OFFSET_OFF]
    }

    #[inline]
    pub fn set_offset(&mut self, v: u8) {
        self.bytes[OFFSET_OFF] = v;
    }

    #[inline]
    pub fn next(&self) -> u64 {
        u64::from_le_bytes(self.bytes[NEXT_OFF..NEXT_OFF + 8].try_into().unwrap())
    }

    #[inline]
    pub fn set_next(&mut self, v: u64) {
        self.bytes[NEXT_OFF..NEXT_OFF + 8].copy_from_slice(&v.to_le_bytes());
    }

    #[inline]
    pub fn prev(&self) -> u64 {
        u64::from_le_bytes(self.bytes[PREV_OFF..PREV_OFF + 8].try_into().unwrap())
    }

    #[inline]
    pub fn set_prev(&mut self, v: u64) {
        self.bytes[PREV_OFF..PREV_OFF + 8].copy_from_slice(&v.to_le_bytes());
    }

    #[inline]
    pub fn endurance(&self) -> u64 {
        u64::from_le_bytes(self.bytes[ENDURANCE_OFF..ENDURANCE_OFF + 8].try_into().unwrap())
    }

    #[inline]
    pub fn set_endurance(&mut self, v: u64) {
        self.bytes[ENDURANCE_OFF..ENDURANCE_OFF + 8].copy_from_slice(&v.to_le_bytes());
    }

    /// Reset a freshly pulled page to an all-free slab page with the given
    /// starting endurance. Bit 63 of `bitmap` is a sentinel so scans
    /// terminate cleanly at slot 62.
    pub fn init(&mut self, endurance: u64) {
        self.bitmap_mut().fill(0);
        bitmap::set_bits(self.bitmap_mut(), 63, 1);
        self.set_freenum(SLOTS_PER_PAGE as u8);
        self.set_maxrun(SLOTS_PER_PAGE as u8);
        self.set_offset(0);
        self.set_next(NULL_LINK);
        self.set_prev(NULL_LINK);
        self.set_endurance(endurance);
        self.size_bitmap_mut().fill(0);
    }

    /// Recompute `(maxrun, offset)` as the longest run of zero bits in
    /// `bitmap[0..62]`, ties broken by lowest offset. Bit 63 (the sentinel)
    /// is never part of a run.
    pub fn recompute_maxrun(&mut self) {
        let bits = self.bitmap();
        let mut best_len = 0u8;
        let mut best_off = 0u8;
        let mut run_len = 0u8;
        let mut run_off = 0u8;
        for i in 0..SLOTS_PER_PAGE {
            if !bitmap::get_bit(bits, i) {
                if run_len == 0 {
                    run_off = i as u8;
                }
                run_len += 1;
                if run_len > best_len {
                    best_len = run_len;
                    best_off = run_off;
                }
            } else {
                run_len = 0;
            }
        }
        self.set_maxrun(best_len);
        self.set_offset(best_off);
    }

    /// Record that an allocation of `len` slots starting at `off` just
    /// occurred, by toggling `size_bitmap` so [`Self::slab_free_size`] can
    /// later recover `len` from `off` alone.
    pub fn record_slab_alloc_size(&mut self, off: u8, len: u8) {
        let (off, len) = (off as usize, len as usize);
        {
            let bits = self.size_bitmap_mut();
            if off == 0 {
                bitmap::set_bits(bits, 0, len);
            } else if bitmap::get_bit(bits, off - 1) {
                bitmap::reset_bits(bits, off, len);
            } else {
                bitmap::set_bits(bits, off, len);
            }
        }
        let bits = self.size_bitmap_mut();
        let boundary = (off + len).min(SLOTS_PER_PAGE);
        if bitmap::get_bit(bits, off) == bitmap::get_bit(bits, boundary) {
            for i in boundary..SLOTS_PER_PAGE {
                let v = !bitmap::get_bit(bits, i);
                bitmap::write_bit(bits, i, v);
            }
        }
    }

    /// Recover the slot length of the live allocation starting at slot
    /// `off`. Undefined (but not unsafe) if `off` is not the start slot of
    /// a live allocation; the crate never calls this with anything else.
    pub fn slab_free_size(&self, off: u8) -> u8 {
        let bits = self.size_bitmap();
        let off = off as usize;
        let is_zero = bitmap::get_bit(bits, off);
        let mut i = 0usize;
        loop {
            if bitmap::get_bit(bits, off + i) != is_zero {
                break;
            }
            if off + i == SLOTS_PER_PAGE {
                break;
            }
            i += 1;
        }
        i as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> [u8; PAGE_VIEW_SIZE] {
        [0u8; PAGE_VIEW_SIZE]
    }

    #[test]
    fn init_sets_sentinel_and_counts() {
        let mut buf = fresh();
        let mut view = PageView::new(&mut buf);
        view.init(1000);
        assert_eq!(view.freenum(), 63);
        assert_eq!(view.maxrun(), 63);
        assert_eq!(view.offset(), 0);
        assert!(bitmap::get_bit(view.bitmap(), 63));
        assert_eq!(view.next(), NULL_LINK);
        assert_eq!(view.endurance(), 1000);
    }

    #[test]
    fn alloc_then_recover_size() {
        let mut buf = fresh();
        let mut view = PageView::new(&mut buf);
        view.init(1000);
        bitmap::set_bits(view.bitmap_mut(), 0, 5);
        view.record_slab_alloc_size(0, 5);
        assert_eq!(view.slab_free_size(0), 5);
    }

    #[test]
    fn two_allocations_recover_independently() {
        let mut buf = fresh();
        let mut view = PageView::new(&mut buf);
        view.init(1000);

        bitmap::set_bits(view.bitmap_mut(), 0, 3);
        view.record_slab_alloc_size(0, 3);
        bitmap::set_bits(view.bitmap_mut(), 3, 7);
        view.record_slab_alloc_size(3, 7);

        assert_eq!(view.slab_free_size(0), 3);
        assert_eq!(view.slab_free_size(3), 7);
    }

    #[test]
    fn recompute_maxrun_finds_longest_leftmost_run() {
        let mut buf = fresh();
        let mut view = PageView::new(&mut buf);
        view.init(1000);
        bitmap::set_bits(view.bitmap_mut(), 0, 10);
        bitmap::set_bits(view.bitmap_mut(), 20, 5);
        view.recompute_maxrun();
        // free runs: [10,20) len 10, [25,63) len 38 -> longest is 38 at offset 25
        assert_eq!(view.maxrun(), 38);
        assert_eq!(view.offset(), 25);
    }
}
