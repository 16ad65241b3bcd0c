//! Region layout and the superblock header.
//!
//! Generalizes the original `NVMinit` cursor arithmetic (`super->slab_array
//! = (uint *)(super + 1); super->list_head = ...; super->data = align_up(...)`)
//! into a `Config`-driven layout computed once at construction, instead of
//! the original's hardcoded `DEVICE_SIZE`/`SUM_PAGES` constants. Everything
//! past the fixed-size header is an array whose length depends on
//! `Config`, so offsets are computed and cached in [`Layout`] rather than
//! known at compile time.
//!
//! All metadata below lives *inside* `R` itself (not in the host process's
//! own heap) so that, per the data model, every structure the allocator
//! needs is reachable from the region's base address alone.

use core::ptr::NonNull;

use crate::config::{Config, NULL_LINK, PAGE_SIZE, PAGE_VIEW_SIZE};
use crate::list::PageSource;
use crate::page_view::PageView;
use crate::region::Region;

const HEADER_LEN: usize = 56;
const BAND_POINTER_OFF: usize = 0;
const REFORM_POINTER_OFF: usize = 8;
const NUM_PAGES_OFF: usize = 16;
const RESERVED_PAGES_OFF: usize = 24;
const DATA_BASE_OFF: usize = 32;
const RESERVED_BASE_OFF: usize = 40;
const RSVD_START_OFF: usize = 48;

/// Computed byte offsets of every superblock section, derived once from
/// `Config` and the region length.
#[derive(Debug, Clone, Copy)]
struct Layout {
    band_thresholds_off: usize,
    band_population_off: usize,
    slab_dir_off: usize,
    free_pool_off: usize,
    page_endurance_off: usize,
    block_size_off: usize,
    reserved_bits_off: usize,
    data_base: usize,
    reserved_base: usize,
    num_pages: usize,
    list_num: usize,
    reserved_pages: usize,
}

impl Layout {
    fn compute(config: &Config, region_len: usize) -> Layout {
        let list_num = config.list_num;
        let mut cursor = HEADER_LEN;

        let band_thresholds_off = cursor;
        cursor += list_num * 8;

        let band_population_off = cursor;
        cursor += list_num * 8;

        let slab_dir_off = cursor;
        cursor += list_num * 64 * 16; // (head, tail) u64 pair per (band, maxrun)

        let free_pool_off = cursor;
        cursor += list_num * 8;

        // num_pages depends on how much of the region remains after fixed
        // overhead and the reserved pool; solve for it directly rather than
        // iterating, same as the original computing `data` then deriving
        // `rsvdblock_number` from what's left.
        let reserved_pages = config.reserved_pages;
        let per_page_meta = 8 /* page_endurance */ + 8 /* block_size */;
        let fixed_tail = reserved_pages * PAGE_SIZE;
        let remaining = region_len.saturating_sub(cursor + fixed_tail + reserved_pages.div_ceil(8));
        let num_pages = remaining / (PAGE_SIZE + per_page_meta);

        let page_endurance_off = cursor;
        cursor += num_pages * 8;

        let block_size_off = cursor;
        cursor += num_pages * 8;

        let reserved_bits_off = cursor;
        cursor += reserved_pages.div_ceil(8);

        let data_base = crate::util::align::align_up(cursor, 12); // page-align, order 12 = 4096
        let reserved_base = data_base + num_pages * PAGE_SIZE;

        assert!(
            reserved_base + reserved_pages * PAGE_SIZE <= region_len,
            "region too small for computed layout"
        );

        Layout {
            band_thresholds_off,
            band_population_off,
            slab_dir_off,
            free_pool_off,
            page_endurance_off,
            block_size_off,
            reserved_bits_off,
            data_base,
            reserved_base,
            num_pages,
            list_num,
            reserved_pages,
        }
    }
}

/// Owns the mapped region and knows how to find every superblock structure
/// inside it. Every other module reaches the region only through this type.
pub struct Superblock<R: Region> {
    region: R,
    layout: Layout,
}

impl<R: Region> Superblock<R> {
    /// Lay out and zero-initialize a freshly mapped region, then seed the
    /// initial band thresholds and the single free-page run covering all of
    /// `D` (mirrors `NVMinit`'s single `list_head->head` run, redirected
    /// into the band matching the initial max endurance instead of an
    /// unbanded list).
    pub fn init(region: R, config: Config) -> Self {
        let layout = Layout::compute(&config, region.len());
        let mut sb = Superblock { region, layout };

        sb.zero_all();
        sb.set_band_pointer(0);
        sb.set_reform_pointer(0);
        sb.write_u64(NUM_PAGES_OFF, layout.num_pages as u64);
        sb.write_u64(RESERVED_PAGES_OFF, layout.reserved_pages as u64);
        sb.write_u64(DATA_BASE_OFF, layout.data_base as u64);
        sb.write_u64(RESERVED_BASE_OFF, layout.reserved_base as u64);

        for b in 0..layout.list_num {
            let threshold = config.endurance_max
                - ((config.endurance_max - config.endurance_min) * (b as u64 + 1))
                    / layout.list_num as u64;
            sb.set_band_threshold(b, threshold);
            sb.set_band_population(b, 0);
            sb.set_free_pool_head(b, NULL_LINK);
            for m in 0..64 {
                sb.set_slab_dir_head(b, m, NULL_LINK);
                sb.set_slab_dir_tail(b, m, NULL_LINK);
            }
        }

        for i in 0..layout.num_pages {
            sb.set_page_endurance(i, config.endurance_max);
            sb.set_block_size(i, 0);
        }

        if layout.num_pages > 0 {
            let home_band = sb.band_for(config.endurance_max);
            let base_offset = sb.page_offset(0);
            sb.write_free_run_header(base_offset, layout.num_pages as u64, NULL_LINK);
            sb.set_free_pool_head(home_band, base_offset);
        }

        sb
    }

    /// Re-attach to an already-initialized region (e.g. re-opening a
    /// persisted mapping). Trusts the header fields already stored there.
    pub fn attach(region: R, config: Config) -> Self {
        let layout = Layout::compute(&config, region.len());
        Superblock { region, layout }
    }

    pub fn region(&self) -> &R {
        &self.region
    }

    pub fn region_mut(&mut self) -> &mut R {
        &mut self.region
    }

    pub fn num_pages(&self) -> usize {
        self.layout.num_pages
    }

    pub fn list_num(&self) -> usize {
        self.layout.list_num
    }

    pub fn reserved_pages(&self) -> usize {
        self.layout.reserved_pages
    }

    pub fn data_base(&self) -> usize {
        self.layout.data_base
    }

    pub fn reserved_base(&self) -> usize {
        self.layout.reserved_base
    }

    // -- raw byte access -----------------------------------------------

    fn base_ptr(&self) -> NonNull<u8> {
        self.region.base()
    }

    fn byte_slice_mut(&mut self, off: usize, len: usize) -> &mut [u8] {
        assert!(off + len <= self.region.len(), "superblock access out of region bounds");
        // SAFETY: `off + len` was just checked against the region length,
        // and `Region` guarantees `base()` stays valid for `len()` bytes.
        unsafe { core::slice::from_raw_parts_mut(self.base_ptr().as_ptr().add(off), len) }
    }

    fn read_u64(&self, off: usize) -> u64 {
        assert!(off + 8 <= self.region.len());
        // SAFETY: bounds checked above.
        let bytes = unsafe { core::slice::from_raw_parts(self.base_ptr().as_ptr().add(off), 8) };
        u64::from_le_bytes(bytes.try_into().unwrap())
    }

    fn write_u64(&mut self, off: usize, v: u64) {
        self.byte_slice_mut(off, 8).copy_from_slice(&v.to_le_bytes());
    }

    fn read_i64(&self, off: usize) -> i64 {
        self.read_u64(off) as i64
    }

    fn write_i64(&mut self, off: usize, v: i64) {
        self.write_u64(off, v as u64);
    }

    fn zero_all(&mut self) {
        let len = self.region.len();
        self.byte_slice_mut(0, len).fill(0);
    }

    fn data_offset_abs(&self, index: usize) -> usize {
        self.layout.data_base + index * PAGE_SIZE
    }

    // -- header fields ---------------------------------------------------

    pub fn band_pointer(&self) -> usize {
        self.read_u64(BAND_POINTER_OFF) as usize
    }

    pub fn set_band_pointer(&mut self, v: usize) {
        self.write_u64(BAND_POINTER_OFF, v as u64);
    }

    pub fn reform_pointer(&self) -> usize {
        self.read_u64(REFORM_POINTER_OFF) as usize
    }

    pub fn set_reform_pointer(&mut self, v: usize) {
        self.write_u64(REFORM_POINTER_OFF, v as u64);
    }

    /// Rolling search cursor (in pages) into the reserved pool, so
    /// consecutive reservations don't all restart scanning from page 0.
    pub fn rsvd_start(&self) -> usize {
        self.read_u64(RSVD_START_OFF) as usize
    }

    pub fn set_rsvd_start(&mut self, v: usize) {
        self.write_u64(RSVD_START_OFF, v as u64);
    }

    // -- band thresholds ---------------------------------------------------

    pub fn band_threshold(&self, band: usize) -> u64 {
        self.read_u64(self.layout.band_thresholds_off + band * 8)
    }

    pub fn set_band_threshold(&mut self, band: usize, v: u64) {
        let off = self.layout.band_thresholds_off + band * 8;
        self.write_u64(off, v);
    }

    /// Number of slab pages currently resident in band `band`'s directory
    /// (summed across all 64 `maxrun` buckets). Maintained incrementally by
    /// [`crate::slab_dir`] as pages are bucketed/unbucketed.
    pub fn band_population(&self, band: usize) -> u64 {
        self.read_u64(self.layout.band_population_off + band * 8)
    }

    pub fn set_band_population(&mut self, band: usize, v: u64) {
        let off = self.layout.band_population_off + band * 8;
        self.write_u64(off, v);
    }

    /// Find the band whose threshold bracket contains `endurance`:
    /// `band_thresholds[b+1] < endurance <= band_thresholds[b]`.
    pub fn band_for(&self, endurance: u64) -> usize {
        let list_num = self.layout.list_num;
        for b in 0..list_num {
            if endurance > self.band_threshold(b) || b == list_num - 1 {
                return b;
            }
        }
        list_num - 1
    }

    // -- slab directory ---------------------------------------------------

    fn slab_dir_entry_off(&self, band: usize, maxrun: usize) -> usize {
        self.layout.slab_dir_off + (band * 64 + maxrun) * 16
    }

    pub fn slab_dir_head(&self, band: usize, maxrun: usize) -> u64 {
        self.read_u64(self.slab_dir_entry_off(band, maxrun))
    }

    pub fn set_slab_dir_head(&mut self, band: usize, maxrun: usize, v: u64) {
        let off = self.slab_dir_entry_off(band, maxrun);
        self.write_u64(off, v);
    }

    pub fn slab_dir_tail(&self, band: usize, maxrun: usize) -> u64 {
        self.read_u64(self.slab_dir_entry_off(band, maxrun) + 8)
    }

    pub fn set_slab_dir_tail(&mut self, band: usize, maxrun: usize, v: u64) {
        let off = self.slab_dir_entry_off(band, maxrun) + 8;
        self.write_u64(off, v);
    }

    // -- free-page pool heads ---------------------------------------------

    pub fn free_pool_head(&self, band: usize) -> u64 {
        self.read_u64(self.layout.free_pool_off + band * 8)
    }

    pub fn set_free_pool_head(&mut self, band: usize, v: u64) {
        let off = self.layout.free_pool_off + band * 8;
        self.write_u64(off, v);
    }

    // -- per-page endurance / block-size arrays ---------------------------

    pub fn page_endurance(&self, index: usize) -> u64 {
        self.read_u64(self.layout.page_endurance_off + index * 8)
    }

    pub fn set_page_endurance(&mut self, index: usize, v: u64) {
        let off = self.layout.page_endurance_off + index * 8;
        self.write_u64(off, v);
    }

    pub fn block_size(&self, index: usize) -> i64 {
        self.read_i64(self.layout.block_size_off + index * 8)
    }

    pub fn set_block_size(&mut self, index: usize, v: i64) {
        let off = self.layout.block_size_off + index * 8;
        self.write_i64(off, v);
    }

    // -- reserved pool bitmap ----------------------------------------------

    pub fn reserved_bits(&mut self) -> &mut [u8] {
        let off = self.layout.reserved_bits_off;
        let len = self.layout.reserved_pages.div_ceil(8);
        self.byte_slice_mut(off, len)
    }

    // -- data arena addressing ---------------------------------------------

    /// Index of the page containing data-arena byte offset `data_off`
    /// (relative to `data_base()`).
    pub fn page_index_of(&self, data_off: usize) -> usize {
        data_off / PAGE_SIZE
    }

    /// Absolute region byte offset of the start of page `index`.
    pub fn page_offset(&self, index: usize) -> u64 {
        self.data_offset_abs(index) as u64
    }

    /// The whole page's bytes (payload + trailing page view), as an
    /// absolute region offset.
    pub fn page_bytes_mut(&mut self, page_offset: u64) -> &mut [u8] {
        self.byte_slice_mut(page_offset as usize, PAGE_SIZE)
    }

    /// Just the 63-slot payload area of a slab page.
    pub fn page_payload_mut(&mut self, page_offset: u64) -> &mut [u8] {
        self.byte_slice_mut(page_offset as usize, PAGE_SIZE - PAGE_VIEW_SIZE)
    }

    /// Read the `(pages, next)` free-run header embedded at the start of a
    /// free page, mirroring the original `free_list{ulong pages; free_list
    /// *list_next;}` written at `start_addr`.
    pub fn read_free_run_header(&self, page_offset: u64) -> (u64, u64) {
        let pages = self.read_u64(page_offset as usize);
        let next = self.read_u64(page_offset as usize + 8);
        (pages, next)
    }

    /// Write a `(pages, next)` free-run header at the start of a free page.
    pub fn write_free_run_header(&mut self, page_offset: u64, pages: u64, next: u64) {
        self.write_u64(page_offset as usize, pages);
        self.write_u64(page_offset as usize + 8, next);
    }
}

impl<R: Region> PageSource for Superblock<R> {
    fn page_view_mut(&mut self, page_offset: u64) -> PageView<'_> {
        let trailer_off = page_offset as usize + PAGE_SIZE - PAGE_VIEW_SIZE;
        PageView::new(self.byte_slice_mut(trailer_off, PAGE_VIEW_SIZE))
    }
}
