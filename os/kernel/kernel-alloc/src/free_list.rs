use crate::PhysMapper;
use kernel_memory_addresses::PhysicalAddress;

/// Terminates the chain; never page aligned, so never a real page.
const END: u64 = u64::MAX;

/// Singly linked stack of free pages.
///
/// The link to the next page lives in the first 8 bytes of each free page,
/// so the list needs no storage of its own.
pub(crate) struct FreeList {
    head: u64,
    len: usize,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self { head: END, len: 0 }
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// # Safety
    /// `pa` must be a free, page-aligned page reachable through `mapper` and
    /// not on any list.
    pub(crate) unsafe fn push<M: PhysMapper + ?Sized>(&mut self, mapper: &M, pa: PhysicalAddress) {
        unsafe { mapper.phys_to_ptr(pa).cast::<u64>().write(self.head) };
        self.head = pa.as_u64();
        self.len += 1;
    }

    pub(crate) fn pop<M: PhysMapper + ?Sized>(&mut self, mapper: &M) -> Option<PhysicalAddress> {
        if self.head == END {
            return None;
        }
        let pa = PhysicalAddress::new(self.head);
        // Safety: only pages pushed by `push` are reachable from `head`.
        self.head = unsafe { mapper.phys_to_ptr(pa).cast::<u64>().read() };
        self.len -= 1;
        Some(pa)
    }
}
