use crate::{Access, FaultTarget, MapFlags, Mappings, PageTable, Prot, PteFlags, Vma, VmaError, VmaPool};
use alloc::vec::Vec;
use kernel_alloc::{Page, PageSource, PhysMapper};
use kernel_file::{Dst, FileHandle, Filesystem, Src};
use kernel_info::memory::{MMAP_BASE, PAGE_SIZE};
use kernel_memory_addresses::{VirtualAddress, page_round_up, pages_spanning};
use log::{debug, error, trace, warn};

/// `mmap`, `munmap`, fork and fault handling over per-process [`Mappings`].
pub struct VmaManager<'a, M: PhysMapper> {
    pool: &'a VmaPool<'a>,
    mapper: &'a M,
    base: VirtualAddress,
}

impl<'a, M: PhysMapper> VmaManager<'a, M> {
    /// Regions are placed at or above [`MMAP_BASE`].
    #[must_use]
    pub const fn new(pool: &'a VmaPool<'a>, mapper: &'a M) -> Self {
        Self::with_base(pool, mapper, VirtualAddress::new(MMAP_BASE))
    }

    #[must_use]
    pub const fn with_base(pool: &'a VmaPool<'a>, mapper: &'a M, base: VirtualAddress) -> Self {
        Self { pool, mapper, base }
    }

    /// Reserve `length` bytes of address space backed by `file` from byte
    /// `offset` on.
    ///
    /// The region starts at the first page boundary above every existing
    /// mapping (and not below the base). Nothing is mapped until the first
    /// fault.
    ///
    /// # Errors
    /// * [`VmaError::EmptyRange`] if `length` is zero.
    /// * [`VmaError::AccessDenied`] if `prot` asks for reading an unreadable
    ///   file, or for shared writing of an unwritable one.
    /// * [`VmaError::NoSpace`] if the region would run past the top of the
    ///   address space.
    /// * [`VmaError::PoolExhausted`] if no mapping record is free.
    pub fn map<F: Filesystem, const N: usize>(
        &self,
        mappings: &mut Mappings<'a, F, N>,
        length: u64,
        prot: Prot,
        flags: MapFlags,
        file: &FileHandle<'a, F, N>,
        offset: u64,
    ) -> Result<VirtualAddress, VmaError> {
        if length == 0 {
            return Err(VmaError::EmptyRange);
        }
        if prot.contains(Prot::READ) && !file.readable() {
            return Err(VmaError::AccessDenied);
        }
        if prot.contains(Prot::WRITE) && flags.contains(MapFlags::SHARED) && !file.writable() {
            return Err(VmaError::AccessDenied);
        }

        let floor = mappings.highest_end().map_or(self.base, |end| end.max(self.base));
        let start = floor
            .as_u64()
            .checked_next_multiple_of(PAGE_SIZE)
            .ok_or(VmaError::NoSpace)?;
        let end = start.checked_add(length).ok_or(VmaError::NoSpace)?;
        let (start, end) = (VirtualAddress::new(start), VirtualAddress::new(end));

        let slot = self.pool.claim().ok_or(VmaError::PoolExhausted)?;
        debug!(
            "mmap: {start}..{end} {prot:?} {flags:?} file {} offset {offset} (record {})",
            file.index(),
            slot.index()
        );
        mappings.push_newest(Vma {
            start,
            end,
            prot,
            flags,
            offset,
            file: file.clone(),
            slot,
        });
        Ok(start)
    }

    /// Unmap `length` bytes at `addr`.
    ///
    /// `addr` must be the start of a mapping. Dirty resident pages of a
    /// shared mapping are written back to the file first. Unmapping up to
    /// (or past) the end, after rounding `length` up to whole pages, removes
    /// the mapping; a shorter prefix moves its start up by whole pages.
    ///
    /// # Errors
    /// * [`VmaError::NotMapped`] if no mapping contains `addr`.
    /// * [`VmaError::Unsupported`] if `addr` is not the mapping's start;
    ///   nothing is changed.
    /// * [`VmaError::EmptyRange`] if `length` is zero.
    pub fn unmap<F: Filesystem, const N: usize, P: PageTable>(
        &self,
        mappings: &mut Mappings<'a, F, N>,
        page_table: &mut P,
        addr: VirtualAddress,
        length: u64,
    ) -> Result<(), VmaError> {
        let Some(index) = mappings.position(addr) else {
            warn!("munmap: {addr} is not mapped");
            return Err(VmaError::NotMapped);
        };
        if length == 0 {
            return Err(VmaError::EmptyRange);
        }
        let vma = &mut mappings.list[index];
        if addr != vma.start {
            warn!("munmap: {addr}+{length:#x} would split {}..{}", vma.start, vma.end);
            return Err(VmaError::Unsupported);
        }

        // the shrink moves by whole pages, so compare the rounded length
        let whole = length >= vma.len() || page_round_up(length) >= vma.len();
        let released = if whole { vma.pages() } else { pages_spanning(length) };
        if vma.flags.contains(MapFlags::SHARED) {
            self.write_back(vma, page_table, addr, released);
        }
        page_table.unmap(addr, released, true);

        if whole {
            let vma = mappings.list.remove(index);
            debug!("munmap: removed {}..{} (record {})", vma.start, vma.end, vma.slot());
        } else {
            let advance = page_round_up(length);
            vma.start += advance;
            vma.offset += advance;
            debug!("munmap: shrunk to {}..{}", vma.start, vma.end);
        }
        Ok(())
    }

    /// Give `child` a copy of every mapping in `parent`, in the same order,
    /// and copy the resident pages between the page tables.
    ///
    /// On failure every record created for the child is released again and
    /// its copied pages are unmapped; `child` is left as it was.
    ///
    /// # Errors
    /// * [`VmaError::PoolExhausted`] if the pool runs out of records.
    /// * [`VmaError::PageTable`] if copying pages fails.
    pub fn fork_copy<F: Filesystem, const N: usize, P: PageTable>(
        &self,
        parent: &Mappings<'a, F, N>,
        parent_pt: &P,
        child: &mut Mappings<'a, F, N>,
        child_pt: &mut P,
    ) -> Result<(), VmaError> {
        let mut copied: Vec<Vma<'a, F, N>> = Vec::with_capacity(parent.len());
        for vma in parent.iter() {
            let Some(slot) = self.pool.claim() else {
                Self::roll_back(child_pt, copied);
                return Err(VmaError::PoolExhausted);
            };
            if let Err(e) = parent_pt.copy_range(child_pt, vma.start, vma.len()) {
                child_pt.unmap(vma.start, vma.pages(), true);
                drop(slot);
                Self::roll_back(child_pt, copied);
                return Err(e.into());
            }
            copied.push(Vma {
                start: vma.start,
                end: vma.end,
                prot: vma.prot,
                flags: vma.flags,
                offset: vma.offset,
                file: vma.file.clone(),
                slot,
            });
        }
        debug!("fork: copied {} mappings", copied.len());
        child.list.extend(copied);
        Ok(())
    }

    /// Resolve a faulting address to the file page that backs it.
    #[must_use]
    pub fn find<F: Filesystem, const N: usize>(&self, mappings: &Mappings<'a, F, N>, va: VirtualAddress) -> Option<FaultTarget> {
        let index = mappings.position(va)?;
        let vma = &mappings.list[index];
        let page = va.page_round_down();
        let into = page - vma.start;
        #[allow(clippy::cast_possible_truncation)]
        let len = (vma.end - page).min(PAGE_SIZE) as usize;
        Some(FaultTarget {
            va: page,
            offset: vma.offset + into,
            len,
            prot: vma.prot,
            index,
        })
    }

    /// Populate the page containing `va` from the file.
    ///
    /// A page that is already resident is left alone.
    ///
    /// # Errors
    /// * [`VmaError::NotMapped`] if no mapping contains `va`.
    /// * [`VmaError::AccessDenied`] if the mapping does not permit `access`.
    /// * [`VmaError::OutOfMemory`] if no page is free.
    /// * [`VmaError::File`] or [`VmaError::PageTable`] if reading or mapping
    ///   fails; the page is freed again.
    pub fn handle_fault<F: Filesystem, const N: usize, P: PageTable, S: PageSource + ?Sized>(
        &self,
        mappings: &Mappings<'a, F, N>,
        page_table: &mut P,
        pages: &S,
        va: VirtualAddress,
        access: Access,
    ) -> Result<(), VmaError> {
        let target = self.find(mappings, va).ok_or(VmaError::NotMapped)?;
        if !target.prot.contains(access.required()) {
            return Err(VmaError::AccessDenied);
        }
        if page_table.walk(target.va).is_some() {
            return Ok(());
        }

        let mut page = pages.allocate_page().ok_or(VmaError::OutOfMemory)?;
        let file = &mappings.list[target.index].file;
        let bytes = pages.page_bytes_mut(&mut page);
        bytes.fill(0);
        if let Err(e) = file.read_at(Dst::Kernel(&mut bytes[..target.len]), target.offset, target.len) {
            pages.free_page(page);
            return Err(e.into());
        }

        let pa = page.into_raw();
        if let Err(e) = page_table.map_page(target.va, pa, PteFlags::user(target.prot)) {
            // Safety: the table did not take the frame; it is still ours.
            pages.free_page(unsafe { Page::from_raw(pa) });
            return Err(e.into());
        }
        trace!("fault: {va} -> {pa:?} ({access:?})");
        Ok(())
    }

    /// Tear down every mapping, writing back shared dirty pages
    /// (process exit).
    pub fn unmap_all<F: Filesystem, const N: usize, P: PageTable>(&self, mappings: &mut Mappings<'a, F, N>, page_table: &mut P) {
        for vma in mappings.list.drain(..) {
            if vma.flags.contains(MapFlags::SHARED) {
                self.write_back(&vma, page_table, vma.start, vma.pages());
            }
            page_table.unmap(vma.start, vma.pages(), true);
            debug!("exit: removed {}..{} (record {})", vma.start, vma.end, vma.slot());
        }
    }

    /// Write the dirty resident pages of `npages` pages from `from` back to
    /// the file. Failures are logged; the pages are torn down regardless.
    fn write_back<F: Filesystem, const N: usize, P: PageTable>(
        &self,
        vma: &Vma<'a, F, N>,
        page_table: &P,
        from: VirtualAddress,
        npages: u64,
    ) {
        let mut va = from;
        for _ in 0..npages {
            if va >= vma.end {
                break;
            }
            if let Some(pte) = page_table.walk(va)
                && pte.flags.contains(PteFlags::DIRTY)
            {
                #[allow(clippy::cast_possible_truncation)]
                let n = (vma.end - va).min(PAGE_SIZE) as usize;
                // Safety: the frame is mapped in this process and stays so
                // until the unmap that follows.
                let bytes = unsafe { core::slice::from_raw_parts(self.mapper.phys_to_ptr(pte.pa), n) };
                let off = vma.offset + (va - vma.start);
                if let Err(e) = vma.file.write_at(Src::Kernel(bytes), off, n) {
                    error!("munmap: write-back of {va} to offset {off} failed: {e}");
                }
            }
            va += PAGE_SIZE;
        }
    }

    fn roll_back<F: Filesystem, const N: usize, P: PageTable>(child_pt: &mut P, copied: Vec<Vma<'a, F, N>>) {
        for vma in copied {
            child_pt.unmap(vma.start, vma.pages(), true);
        }
    }
}
