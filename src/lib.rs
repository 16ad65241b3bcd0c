//! `nvmalloc` — an endurance-aware dynamic memory allocator for
//! byte-addressable non-volatile memory.
//!
//! The allocator partitions a single fixed-size mapped [`Region`] into
//! fine-grained slab allocations and coarser whole-page block allocations,
//! steering placement across a ladder of write-endurance "bands" so wear
//! is spread evenly across the underlying NVM cells. See [`Allocator`] for
//! the entry point.
//!
//! `#![no_std]`: this crate only needs `alloc` for the superblock's
//! dynamically-sized bookkeeping vectors (band populations in [`Stats`]);
//! the region itself, and everything the allocator places in it, lives in
//! caller-mapped bytes, not the host's heap. Enable the `std` feature for
//! an `mmap`-backed [`region::MmapRegion`] provider.

#![no_std]

extern crate alloc;

pub mod allocator;
pub mod bitmap;
pub mod block;
pub mod config;
pub mod endurance;
pub mod error;
pub mod free_pool;
pub mod list;
pub mod page_view;
pub mod persist;
pub mod reform;
pub mod region;
pub mod reserved;
pub mod slab_dir;
pub mod superblock;
pub mod util;

pub use allocator::{Allocator, Stats};
pub use config::Config;
pub use error::{AbortHook, AbortReason, Error, PanicAbort};
pub use region::{BoxedRegion, Region};
