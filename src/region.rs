//! The mapped region `R` the allocator partitions.
//!
//! A [`Region`] owns a single contiguous byte range for its whole lifetime;
//! nothing inside it has independent ownership, all interior structures
//! (page views, free-run headers, reserved-block headers) are aliases into
//! it. This mirrors a kernel page-allocator/SLUB design, which likewise
//! hands out raw pointers into a heap area fixed at boot and never moves it.

use core::ptr::NonNull;

/// A contiguous, fixed-size byte range mapped once at construction and
/// released once at drop. Implementors must guarantee the returned pointer
/// stays valid and stays put for the lifetime of the value.
pub trait Region {
    /// Start of the mapped range.
    fn base(&self) -> NonNull<u8>;

    /// Length in bytes of the mapped range.
    fn len(&self) -> usize;

    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Heap-backed region using the global allocator. Works anywhere `alloc` is
/// available, including `no_std` hosts that have installed a `#[global_allocator]`.
/// Useful for tests and for hosts without a real NVM device to map.
pub struct BoxedRegion {
    ptr: NonNull<u8>,
    len: usize,
    layout: core::alloc::Layout,
}

impl BoxedRegion {
    pub fn new(len: usize) -> Self {
        assert!(len > 0, "region length must be non-zero");
        let layout = core::alloc::Layout::from_size_align(len, PAGE_ALIGN)
            .expect("region length overflows isize");
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).unwrap_or_else(|| alloc::alloc::handle_alloc_error(layout));
        BoxedRegion { ptr, len, layout }
    }
}

/// Alignment used for boxed regions; matches the data arena's page size so
/// the data arena carve-out inside the region can itself be page-aligned.
const PAGE_ALIGN: usize = 4096;

impl Region for BoxedRegion {
    fn base(&self) -> NonNull<u8> {
        self.ptr
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl Drop for BoxedRegion {
    fn drop(&mut self) {
        // SAFETY: `ptr` was allocated from the global allocator with `layout`
        // and is not aliased past this point.
        unsafe {
            alloc::alloc::dealloc(self.ptr.as_ptr(), self.layout);
        }
    }
}

#[cfg(feature = "std")]
pub use mmap::MmapRegion;

#[cfg(feature = "std")]
mod mmap {
    use super::Region;
    use core::ptr::NonNull;

    /// Anonymous `mmap`-backed region at an OS-chosen base address.
    ///
    /// Real NVM deployments map a `DAX`/`pmem` file at a fixed virtual base;
    /// this stand-in uses an anonymous private mapping so the allocator's
    /// placement logic can be exercised without a pmem-capable filesystem.
    /// A stable base address only needs to hold for the mapping's
    /// lifetime, which `mmap` already gives us.
    pub struct MmapRegion {
        ptr: NonNull<u8>,
        len: usize,
    }

    impl MmapRegion {
        pub fn new(len: usize) -> Self {
            assert!(len > 0, "region length must be non-zero");
            // SAFETY: fixed-size anonymous mapping, checked for MAP_FAILED below.
            let raw = unsafe {
                libc::mmap(
                    core::ptr::null_mut(),
                    len,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };
            if raw == libc::MAP_FAILED {
                panic!("mmap failed for region of {len} bytes");
            }
            MmapRegion {
                ptr: NonNull::new(raw as *mut u8).expect("mmap returned null on success"),
                len,
            }
        }
    }

    impl Region for MmapRegion {
        fn base(&self) -> NonNull<u8> {
            self.ptr
        }

        fn len(&self) -> usize {
            self.len
        }
    }

    impl Drop for MmapRegion {
        fn drop(&mut self) {
            // SAFETY: `ptr`/`len` describe exactly the mapping created in `new`.
            unsafe {
                libc::munmap(self.ptr.as_ptr() as *mut core::ffi::c_void, self.len);
            }
        }
    }
}
