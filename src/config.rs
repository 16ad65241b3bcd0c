//! Tunable parameters for the region layout and the wear-band ladder.
//!
//! Defaults mirror the constants the allocator this crate is based on
//! hard-codes (`PAGE_SIZE`, slot size, slot count per page); everything else
//! is exposed so a host can size the region to its own NVM device.

/// Size of a data-arena page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Size of a slab slot in bytes.
pub const SLOT_SIZE: usize = 64;

/// Usable slab slots per page (bit 63 of the in-page bitmap is a sentinel).
pub const SLOTS_PER_PAGE: usize = 63;

/// Byte length of the in-page metadata trailer (the last `PAGE_VIEW_SIZE`
/// bytes of every slab page).
pub const PAGE_VIEW_SIZE: usize = 64;

/// Sentinel stored in `next`/`prev`/link fields meaning "no link".
pub const NULL_LINK: u64 = u64::MAX;

/// Runtime configuration for a [`crate::allocator::Allocator`].
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Total size in bytes of the region the allocator manages. Must be
    /// large enough to hold the superblock, all per-page metadata arrays,
    /// at least one data page, and the reserved pool.
    pub nvm_size: usize,
    /// Number of wear bands (`LIST_NUM` in the source material).
    pub list_num: usize,
    /// Highest per-page endurance value assigned at init.
    pub endurance_max: u64,
    /// Lowest per-page endurance value a page may still be allocated from.
    pub endurance_min: u64,
    /// A band is rotated out once its slab population plus free-pool head
    /// population drops below this count.
    pub immigration_limit: usize,
    /// Number of pages set aside for the unbanded reserved pool fallback.
    pub reserved_pages: usize,
}

impl Config {
    /// A config sized for a modest in-process region, useful for tests and
    /// for hosts that don't care about exact NVM geometry.
    pub const fn small() -> Self {
        Config {
            nvm_size: 16 * 1024 * 1024,
            list_num: 10,
            endurance_max: 100_000,
            endurance_min: 1_000,
            immigration_limit: 4,
            reserved_pages: 64,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::small()
    }
}
