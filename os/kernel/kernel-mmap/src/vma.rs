use crate::{MapFlags, Prot, VmaSlot};
use alloc::vec::Vec;
use core::fmt;
use kernel_file::{FileHandle, Filesystem};
use kernel_info::param;
use kernel_memory_addresses::{VirtualAddress, pages_spanning};

/// One mapped file range of a process.
///
/// Owns a pool record and a reference to the file; dropping the `Vma`
/// releases both.
pub struct Vma<'a, F: Filesystem, const N: usize = { param::NFILE }> {
    pub(crate) start: VirtualAddress,
    pub(crate) end: VirtualAddress,
    pub(crate) prot: Prot,
    pub(crate) flags: MapFlags,
    /// File offset corresponding to `start`.
    pub(crate) offset: u64,
    pub(crate) file: FileHandle<'a, F, N>,
    pub(crate) slot: VmaSlot<'a>,
}

impl<'a, F: Filesystem, const N: usize> Vma<'a, F, N> {
    /// First mapped address; always page aligned.
    #[must_use]
    pub const fn start(&self) -> VirtualAddress {
        self.start
    }

    /// One past the last mapped byte; not necessarily page aligned.
    #[must_use]
    pub const fn end(&self) -> VirtualAddress {
        self.end
    }

    #[must_use]
    pub const fn prot(&self) -> Prot {
        self.prot
    }

    #[must_use]
    pub const fn flags(&self) -> MapFlags {
        self.flags
    }

    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    #[must_use]
    pub const fn file(&self) -> &FileHandle<'a, F, N> {
        &self.file
    }

    /// Pool record index.
    #[must_use]
    pub const fn slot(&self) -> usize {
        self.slot.index()
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Pages covered, counting a partial last page.
    #[must_use]
    pub fn pages(&self) -> u64 {
        pages_spanning(self.len())
    }

    #[must_use]
    pub fn contains(&self, va: VirtualAddress) -> bool {
        self.start <= va && va < self.end
    }
}

impl<F: Filesystem, const N: usize> fmt::Debug for Vma<'_, F, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vma")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("prot", &self.prot)
            .field("flags", &self.flags)
            .field("offset", &self.offset)
            .field("file", &self.file)
            .field("slot", &self.slot)
            .finish()
    }
}

/// A process's mappings, newest first.
pub struct Mappings<'a, F: Filesystem, const N: usize = { param::NFILE }> {
    pub(crate) list: Vec<Vma<'a, F, N>>,
}

impl<'a, F: Filesystem, const N: usize> Mappings<'a, F, N> {
    #[must_use]
    pub const fn new() -> Self {
        Self { list: Vec::new() }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Vma<'a, F, N>> {
        self.list.iter()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Vma<'a, F, N>> {
        self.list.get(index)
    }

    /// The mapping containing `va`.
    #[must_use]
    pub fn containing(&self, va: VirtualAddress) -> Option<&Vma<'a, F, N>> {
        self.list.iter().find(|v| v.contains(va))
    }

    pub(crate) fn position(&self, va: VirtualAddress) -> Option<usize> {
        self.list.iter().position(|v| v.contains(va))
    }

    /// Highest end address of any mapping.
    pub(crate) fn highest_end(&self) -> Option<VirtualAddress> {
        self.list.iter().map(|v| v.end).max()
    }

    pub(crate) fn push_newest(&mut self, vma: Vma<'a, F, N>) {
        self.list.insert(0, vma);
    }
}

impl<F: Filesystem, const N: usize> Default for Mappings<'_, F, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Filesystem, const N: usize> fmt::Debug for Mappings<'_, F, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.list).finish()
    }
}

/// What a page fault at some address needs to populate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FaultTarget {
    /// The faulting page.
    pub va: VirtualAddress,
    /// File offset of the page's first byte.
    pub offset: u64,
    /// Bytes of the page backed by the mapping; the rest reads as zero.
    pub len: usize,
    pub prot: Prot,
    pub(crate) index: usize,
}
