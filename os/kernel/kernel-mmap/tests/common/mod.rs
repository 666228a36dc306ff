use kernel_alloc::{IdentityMapper, Page, PageSource, PhysMapper};
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress, pages_spanning};
use kernel_mmap::{PageTable, PageTableError, Pte, PteFlags};
use std::cell::Cell;
use std::collections::BTreeMap;

const PAGE: usize = PAGE_SIZE as usize;

/// A flat VA → frame map standing in for a hardware page table.
pub struct MockPageTable<'p, S: PageSource> {
    pages: &'p S,
    entries: BTreeMap<u64, Pte>,
    copy_budget: Cell<Option<usize>>,
}

impl<'p, S: PageSource> MockPageTable<'p, S> {
    pub fn new(pages: &'p S) -> Self {
        Self {
            pages,
            entries: BTreeMap::new(),
            copy_budget: Cell::new(None),
        }
    }

    pub fn resident(&self) -> usize {
        self.entries.len()
    }

    /// Let `copy_range` copy `pages` more pages, then run out of memory.
    pub fn fail_copy_after(&self, pages: usize) {
        self.copy_budget.set(Some(pages));
    }

    /// A user-mode store: writes through the mapping and sets the dirty bit.
    pub fn store(&mut self, va: VirtualAddress, data: &[u8]) {
        let key = va.page_round_down().as_u64();
        let pte = self.entries.get_mut(&key).expect("store to a resident page");
        assert!(pte.flags.contains(PteFlags::WRITE), "store to a read-only page");
        pte.flags |= PteFlags::DIRTY | PteFlags::ACCESSED;
        let at = usize::try_from(va.page_offset()).expect("page offset");
        frame_mut(pte.pa)[at..at + data.len()].copy_from_slice(data);
    }

    /// A user-mode load of `len` bytes within one page.
    pub fn load(&self, va: VirtualAddress, len: usize) -> Vec<u8> {
        let pte = self.walk(va).expect("load from a resident page");
        let at = usize::try_from(va.page_offset()).expect("page offset");
        frame(pte.pa)[at..at + len].to_vec()
    }
}

fn frame<'f>(pa: PhysicalAddress) -> &'f [u8] {
    unsafe { std::slice::from_raw_parts(IdentityMapper.phys_to_ptr(pa), PAGE) }
}

fn frame_mut<'f>(pa: PhysicalAddress) -> &'f mut [u8] {
    unsafe { std::slice::from_raw_parts_mut(IdentityMapper.phys_to_ptr(pa), PAGE) }
}

impl<S: PageSource> PageTable for MockPageTable<'_, S> {
    fn walk(&self, va: VirtualAddress) -> Option<Pte> {
        self.entries.get(&va.page_round_down().as_u64()).copied()
    }

    fn map_page(&mut self, va: VirtualAddress, pa: PhysicalAddress, flags: PteFlags) -> Result<(), PageTableError> {
        let key = va.page_round_down().as_u64();
        if self.entries.contains_key(&key) {
            return Err(PageTableError::AlreadyMapped(va));
        }
        self.entries.insert(key, Pte { pa, flags });
        Ok(())
    }

    fn unmap(&mut self, va: VirtualAddress, npages: u64, free: bool) {
        for i in 0..npages {
            let key = va.as_u64() + i * PAGE_SIZE;
            if let Some(pte) = self.entries.remove(&key)
                && free
            {
                self.pages.free_page(unsafe { Page::from_raw(pte.pa) });
            }
        }
    }

    fn copy_range(&self, child: &mut Self, va: VirtualAddress, len: u64) -> Result<(), PageTableError> {
        for i in 0..pages_spanning(len) {
            let page_va = va + i * PAGE_SIZE;
            let Some(pte) = self.walk(page_va) else {
                continue;
            };
            if let Some(budget) = self.copy_budget.get() {
                if budget == 0 {
                    return Err(PageTableError::OutOfMemory);
                }
                self.copy_budget.set(Some(budget - 1));
            }
            let mut page = self.pages.allocate_page().ok_or(PageTableError::OutOfMemory)?;
            self.pages.page_bytes_mut(&mut page).copy_from_slice(frame(pte.pa));
            child.map_page(page_va, page.into_raw(), pte.flags)?;
        }
        Ok(())
    }
}

impl<S: PageSource> Drop for MockPageTable<'_, S> {
    fn drop(&mut self) {
        for pte in std::mem::take(&mut self.entries).into_values() {
            self.pages.free_page(unsafe { Page::from_raw(pte.pa) });
        }
    }
}
