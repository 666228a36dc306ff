//! Heap-backed "physical" memory for running the allocator on a std host.
//!
//! Pair a [`HostArena`] with [`IdentityMapper`](crate::IdentityMapper): the
//! arena's addresses are exposed as physical addresses, and the identity
//! mapper turns them back into pointers.

use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::PhysicalAddress;
use std::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error};
use std::ptr::NonNull;

pub use kernel_sync::host::HostCpus;

/// A page-aligned heap block standing in for a physical memory range.
#[derive(Debug)]
pub struct HostArena {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl HostArena {
    /// Reserve `pages` zeroed pages.
    ///
    /// # Panics
    /// Panics if `pages` is zero or the size overflows.
    #[must_use]
    pub fn new(pages: usize) -> Self {
        assert!(pages > 0, "empty arena");
        #[allow(clippy::cast_possible_truncation)]
        let page = PAGE_SIZE as usize;
        let layout = Layout::from_size_align(pages * page, page).expect("arena layout");
        // Safety: non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            handle_alloc_error(layout)
        };
        Self { ptr, layout }
    }

    #[must_use]
    pub fn start(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.ptr.as_ptr().expose_provenance() as u64)
    }

    #[must_use]
    pub fn end(&self) -> PhysicalAddress {
        self.start() + self.layout.size() as u64
    }

    #[must_use]
    pub fn pages(&self) -> u64 {
        self.layout.size() as u64 / PAGE_SIZE
    }
}

impl Drop for HostArena {
    fn drop(&mut self) {
        // Safety: allocated in `new` with the same layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}
