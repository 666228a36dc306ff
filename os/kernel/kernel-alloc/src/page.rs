use core::fmt;
use kernel_memory_addresses::PhysicalAddress;

/// Exclusive ownership of one physical page.
///
/// A `Page` is neither `Clone` nor `Copy`: the only way to give it back is to
/// move it into [`PageAllocator::free_page`](crate::PageAllocator::free_page),
/// so a double free cannot be written with safe code. Page-table code that
/// stores frame addresses in entries converts with [`Page::into_raw`] and
/// [`Page::from_raw`].
#[must_use = "a dropped Page is leaked; return it with free_page"]
#[derive(PartialEq, Eq)]
pub struct Page(PhysicalAddress);

impl Page {
    /// # Safety
    /// The caller must guarantee `pa` is the page-aligned address of the
    /// caller-owned page handed out by the allocator, and that no other `Page`
    /// for it exists.
    #[inline]
    pub const unsafe fn from_raw(pa: PhysicalAddress) -> Self {
        Self(pa)
    }

    /// Give up ownership and return the page's physical address.
    #[inline]
    #[must_use]
    pub const fn into_raw(self) -> PhysicalAddress {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn addr(&self) -> PhysicalAddress {
        self.0
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page({:?})", self.0)
    }
}
