use crate::PteFlags;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// A resident leaf mapping.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Pte {
    pub pa: PhysicalAddress,
    pub flags: PteFlags,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageTableError {
    #[error("out of memory for page or page-table page")]
    OutOfMemory,
    #[error("{0:?} is already mapped")]
    AlreadyMapped(VirtualAddress),
}

/// A process's user page table, at 4 KiB granularity.
pub trait PageTable {
    /// The resident leaf entry for the page containing `va`, if any.
    fn walk(&self, va: VirtualAddress) -> Option<Pte>;

    /// Map the page at `va` to frame `pa`. On success the table owns the
    /// frame.
    ///
    /// # Errors
    /// [`PageTableError::AlreadyMapped`] if `va` is resident, or
    /// [`PageTableError::OutOfMemory`] if an intermediate table cannot be
    /// allocated.
    fn map_page(&mut self, va: VirtualAddress, pa: PhysicalAddress, flags: PteFlags) -> Result<(), PageTableError>;

    /// Remove `npages` pages starting at `va`, skipping pages that were
    /// never populated. With `free`, the frames go back to the allocator.
    fn unmap(&mut self, va: VirtualAddress, npages: u64, free: bool);

    /// Duplicate the resident pages of `[va, va + len)` into `child`, each
    /// into a fresh frame with the same flags.
    ///
    /// # Errors
    /// [`PageTableError::OutOfMemory`]; pages copied before the failure stay
    /// mapped in `child`.
    fn copy_range(&self, child: &mut Self, va: VirtualAddress, len: u64) -> Result<(), PageTableError>;
}
