use crate::free_list::FreeList;
use crate::{Page, PhysMapper};
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use kernel_info::memory::{ALLOC_FILL, FREE_FILL, PAGE_SIZE};
use kernel_info::param;
use kernel_memory_addresses::PhysicalAddress;
use kernel_sync::{Cpu, IrqGuard, SpinLock};
use log::{info, trace};

#[allow(clippy::cast_possible_truncation)]
const PAGE_BYTES: usize = PAGE_SIZE as usize;

/// Something that hands out and takes back whole pages.
///
/// Implemented by [`PageAllocator`]; page-table and fault-handling code take
/// this instead of the concrete allocator so they stay independent of its
/// type parameters.
pub trait PageSource: Sync {
    fn allocate_page(&self) -> Option<Page>;

    fn free_page(&self, page: Page);

    /// The contents of an owned page.
    fn page_bytes_mut<'p>(&self, page: &'p mut Page) -> &'p mut [u8];
}

/// Per-core physical page allocator.
///
/// `NCPU` is the number of cores; the per-core lists are indexed by
/// [`Cpu::id`].
pub struct PageAllocator<'a, C: Cpu, M: PhysMapper, const NCPU: usize = { param::NCPU }> {
    cpu: &'a C,
    mapper: &'a M,
    lists: [SpinLock<FreeList>; NCPU],
    /// One bit per managed page, set while the page is on a free list.
    free_map: &'a [AtomicU64],
    /// First managed page (after the free map).
    start: PhysicalAddress,
    /// One past the last managed page.
    end: PhysicalAddress,
    initialized: AtomicBool,
}

impl<'a, C: Cpu, M: PhysMapper, const NCPU: usize> PageAllocator<'a, C, M, NCPU> {
    /// Take over the physical range `[start, end)`.
    ///
    /// The range is shrunk to whole pages. Its first pages hold the free map;
    /// the rest are managed. All lists start empty until
    /// [`initialize`](Self::initialize).
    ///
    /// # Safety
    /// The range must be ordinary RAM, reachable through `mapper`, and not
    /// used by anything else for `'a`.
    ///
    /// # Panics
    /// Panics if `end < start`.
    pub unsafe fn new(cpu: &'a C, mapper: &'a M, start: PhysicalAddress, end: PhysicalAddress) -> Self {
        let base = start.page_round_up();
        let limit = end.page_round_down();
        assert!(base <= limit, "kinit: empty range {start:?}..{end:?}");

        let total = (limit - base) / PAGE_SIZE;
        let words = total.div_ceil(u64::BITS.into());
        let map_pages = (words * 8).div_ceil(PAGE_SIZE).min(total);
        let first = base + map_pages * PAGE_SIZE;

        #[allow(clippy::cast_possible_truncation)]
        let free_map = unsafe {
            let ptr = mapper.phys_to_ptr(base).cast::<AtomicU64>();
            ptr.write_bytes(0, words as usize);
            core::slice::from_raw_parts(ptr.cast_const(), words as usize)
        };

        Self {
            cpu,
            mapper,
            lists: core::array::from_fn(|_| SpinLock::named("kmem", FreeList::new())),
            free_map,
            start: first,
            end: limit,
            initialized: AtomicBool::new(false),
        }
    }

    /// Hand every managed page to the calling core's list.
    ///
    /// Called once, by the boot core; every other core starts with an empty
    /// list and fills it by freeing or stealing.
    ///
    /// # Panics
    /// Panics when called a second time.
    pub fn initialize(&self) {
        assert!(
            !self.initialized.swap(true, Ordering::AcqRel),
            "kinit: page allocator initialized twice"
        );

        let core = IrqGuard::new(self.cpu).cpu_id();
        let mut pa = self.start;
        while pa < self.end {
            self.mark_free(pa);
            // Safety: in range, page aligned, not on any list yet. The fill
            // runs with the list unlocked; only the push holds `kmem`.
            unsafe {
                self.fill(pa, FREE_FILL);
                self.lists[core].lock_irq(self.cpu).push(self.mapper, pa);
            }
            pa += PAGE_SIZE;
        }
        let count = self.free_pages_on(core);

        info!(
            "kinit: {count} pages ({} KiB) in {:?}..{:?} on core {core}",
            count as u64 * PAGE_SIZE / 1024,
            self.start,
            self.end
        );
    }

    /// Take one page, preferring the calling core's list.
    ///
    /// The page is filled with [`ALLOC_FILL`]. Returns `None` only when every
    /// list is empty.
    pub fn allocate_page(&self) -> Option<Page> {
        let irq = IrqGuard::new(self.cpu);
        let me = irq.cpu_id();

        let mut pa = self.lists[me].lock_irq(self.cpu).pop(self.mapper);
        if pa.is_none() {
            // Own list included: an interrupt may have refilled it meanwhile.
            for core in 0..NCPU {
                pa = self.lists[core].lock_irq(self.cpu).pop(self.mapper);
                if pa.is_some() {
                    trace!("kalloc: core {me} stole {:?} from core {core}", pa);
                    break;
                }
            }
        }
        drop(irq);

        let pa = pa?;
        let (word, mask) = self.bit(pa);
        let was = self.free_map[word].fetch_and(!mask, Ordering::AcqRel);
        debug_assert!(was & mask != 0, "kalloc: {pa:?} on a free list but not marked free");

        // Safety: just taken off a list; exclusively ours.
        unsafe {
            self.fill(pa, ALLOC_FILL);
            Some(Page::from_raw(pa))
        }
    }

    /// Return a page to the calling core's list.
    ///
    /// # Panics
    /// Panics if the page is misaligned, outside the managed range, or
    /// already free.
    pub fn free_page(&self, page: Page) {
        let pa = page.into_raw();
        self.check(pa);
        self.mark_free(pa);

        // Safety: the free map proves nobody else freed it; ownership came in
        // by value.
        unsafe { self.fill(pa, FREE_FILL) };

        let irq = IrqGuard::new(self.cpu);
        let core = irq.cpu_id();
        // Safety: as above.
        unsafe { self.lists[core].lock_irq(self.cpu).push(self.mapper, pa) };
    }

    /// The bytes of a page the caller owns.
    pub fn page_bytes<'p>(&self, page: &'p Page) -> &'p [u8] {
        // Safety: `Page` is exclusive ownership of a managed page.
        unsafe { core::slice::from_raw_parts(self.mapper.phys_to_ptr(page.addr()), PAGE_BYTES) }
    }

    /// The bytes of a page the caller owns, mutably.
    pub fn page_bytes_mut<'p>(&self, page: &'p mut Page) -> &'p mut [u8] {
        // Safety: as for `page_bytes`; `&mut Page` rules out other borrows.
        unsafe { core::slice::from_raw_parts_mut(self.mapper.phys_to_ptr(page.addr()), PAGE_BYTES) }
    }

    /// Total number of free pages across all cores.
    pub fn free_pages(&self) -> usize {
        (0..NCPU).map(|core| self.free_pages_on(core)).sum()
    }

    /// Number of free pages on `core`'s list.
    pub fn free_pages_on(&self, core: usize) -> usize {
        self.lists[core].lock_irq(self.cpu).len()
    }

    /// Number of pages under management (free or allocated).
    #[allow(clippy::cast_possible_truncation)]
    pub fn managed_pages(&self) -> usize {
        ((self.end - self.start) / PAGE_SIZE) as usize
    }

    /// Whether `pa` is the address of a managed page.
    pub fn contains(&self, pa: PhysicalAddress) -> bool {
        pa.is_page_aligned() && pa >= self.start && pa < self.end
    }

    fn check(&self, pa: PhysicalAddress) {
        assert!(pa.is_page_aligned(), "kfree: misaligned page {pa:?}");
        assert!(
            pa >= self.start && pa < self.end,
            "kfree: {pa:?} outside {:?}..{:?}",
            self.start,
            self.end
        );
    }

    fn mark_free(&self, pa: PhysicalAddress) {
        let (word, mask) = self.bit(pa);
        let was = self.free_map[word].fetch_or(mask, Ordering::AcqRel);
        assert!(was & mask == 0, "kfree: double free of {pa:?}");
    }

    #[allow(clippy::cast_possible_truncation)]
    fn bit(&self, pa: PhysicalAddress) -> (usize, u64) {
        let index = (pa - self.start) / PAGE_SIZE;
        ((index / 64) as usize, 1 << (index % 64))
    }

    /// # Safety
    /// The caller must own `pa`.
    unsafe fn fill(&self, pa: PhysicalAddress, byte: u8) {
        unsafe { self.mapper.phys_to_ptr(pa).write_bytes(byte, PAGE_BYTES) };
    }
}

impl<C: Cpu, M: PhysMapper, const NCPU: usize> PageSource for PageAllocator<'_, C, M, NCPU> {
    fn allocate_page(&self) -> Option<Page> {
        Self::allocate_page(self)
    }

    fn free_page(&self, page: Page) {
        Self::free_page(self, page);
    }

    fn page_bytes_mut<'p>(&self, page: &'p mut Page) -> &'p mut [u8] {
        Self::page_bytes_mut(self, page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IdentityMapper;
    use crate::host::{HostArena, HostCpus};
    use std::collections::HashSet;
    use std::sync::Barrier;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    const CORES: usize = 4;

    type Alloc<'a> = PageAllocator<'a, HostCpus<CORES>, IdentityMapper, CORES>;

    fn allocator<'a>(cpus: &'a HostCpus<CORES>, arena: &HostArena) -> Alloc<'a> {
        let a = unsafe { PageAllocator::new(cpus, &IdentityMapper, arena.start(), arena.end()) };
        a.initialize();
        a
    }

    #[test]
    fn boot_core_receives_every_page() {
        let cpus = HostCpus::<CORES>::new();
        let arena = HostArena::new(64);
        let a = allocator(&cpus, &arena);

        // one page holds the free map
        assert_eq!(a.managed_pages(), 63);
        assert_eq!(a.free_pages_on(0), 63);
        for core in 1..CORES {
            assert_eq!(a.free_pages_on(core), 0);
        }
    }

    #[test]
    fn allocated_page_is_filled_and_freed_page_reused() {
        let cpus = HostCpus::<CORES>::new();
        let arena = HostArena::new(8);
        let a = allocator(&cpus, &arena);

        let mut p = a.allocate_page().expect("page");
        assert!(a.page_bytes(&p).iter().all(|&b| b == ALLOC_FILL));
        a.page_bytes_mut(&mut p)[..4].copy_from_slice(b"junk");
        let addr = p.addr();
        a.free_page(p);

        let q = a.allocate_page().expect("page");
        assert_eq!(q.addr(), addr, "LIFO reuse on the same core");
        assert!(a.page_bytes(&q).iter().all(|&b| b == ALLOC_FILL));
        a.free_page(q);
    }

    #[test]
    fn freed_page_carries_free_fill() {
        let cpus = HostCpus::<CORES>::new();
        let arena = HostArena::new(4);
        let a = allocator(&cpus, &arena);

        let p = a.allocate_page().expect("page");
        let pa = p.addr();
        a.free_page(p);
        let bytes = unsafe { core::slice::from_raw_parts(IdentityMapper.phys_to_ptr(pa), PAGE_BYTES) };
        // the first word is the list link
        assert!(bytes[8..].iter().all(|&b| b == FREE_FILL));
    }

    #[test]
    fn idle_core_steals_from_boot_core() {
        let cpus = HostCpus::<CORES>::new();
        let arena = HostArena::new(16);
        let a = allocator(&cpus, &arena);
        let before = a.free_pages_on(0);

        thread::scope(|s| {
            s.spawn(|| {
                cpus.bind(2);
                let p = a.allocate_page().expect("steal");
                assert_eq!(a.free_pages_on(0), before - 1);
                // freeing lands on the freeing core
                a.free_page(p);
                assert_eq!(a.free_pages_on(2), 1);
            });
        });
        assert_eq!(a.free_pages(), before);
    }

    #[test]
    fn exhaustion_returns_none() {
        let cpus = HostCpus::<CORES>::new();
        let arena = HostArena::new(5);
        let a = allocator(&cpus, &arena);

        let pages: Vec<_> = std::iter::from_fn(|| a.allocate_page()).collect();
        assert_eq!(pages.len(), a.managed_pages());
        assert!(a.allocate_page().is_none());
        assert_eq!(a.free_pages(), 0);
        for p in pages {
            a.free_page(p);
        }
        assert_eq!(a.free_pages(), a.managed_pages());
    }

    #[test]
    fn concurrent_cores_partition_the_range() {
        let cpus = HostCpus::<CORES>::new();
        let arena = HostArena::new(257);
        let a = allocator(&cpus, &arena);
        let total = a.managed_pages();
        let start = Barrier::new(CORES);

        let per_core: Vec<Vec<Page>> = thread::scope(|s| {
            let handles: Vec<_> = (0..CORES)
                .map(|core| {
                    let (a, cpus, start) = (&a, &cpus, &start);
                    s.spawn(move || {
                        cpus.bind(core);
                        start.wait();
                        std::iter::from_fn(|| a.allocate_page()).collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("core thread")).collect()
        });

        let addrs: HashSet<u64> = per_core.iter().flatten().map(|p| p.addr().as_u64()).collect();
        let count: usize = per_core.iter().map(Vec::len).sum();
        assert_eq!(count, total, "every page handed out once");
        assert_eq!(addrs.len(), total, "no page handed out twice");
        assert!(addrs.iter().all(|&pa| a.contains(PhysicalAddress::new(pa))));

        thread::scope(|s| {
            for (core, pages) in per_core.into_iter().enumerate() {
                let (a, cpus) = (&a, &cpus);
                s.spawn(move || {
                    cpus.bind(core);
                    for p in pages {
                        a.free_page(p);
                    }
                });
            }
        });
        assert_eq!(a.free_pages(), total);
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_is_fatal() {
        let cpus = HostCpus::<CORES>::new();
        let arena = HostArena::new(4);
        let a = allocator(&cpus, &arena);

        let pa = a.allocate_page().expect("page").into_raw();
        a.free_page(unsafe { Page::from_raw(pa) });
        a.free_page(unsafe { Page::from_raw(pa) });
    }

    #[test]
    #[should_panic(expected = "misaligned")]
    fn misaligned_free_is_fatal() {
        let cpus = HostCpus::<CORES>::new();
        let arena = HostArena::new(4);
        let a = allocator(&cpus, &arena);

        let pa = a.allocate_page().expect("page").into_raw();
        a.free_page(unsafe { Page::from_raw(pa + 8) });
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn foreign_free_is_fatal() {
        let cpus = HostCpus::<CORES>::new();
        let arena = HostArena::new(4);
        let a = allocator(&cpus, &arena);

        a.free_page(unsafe { Page::from_raw(arena.end()) });
    }

    #[test]
    #[should_panic(expected = "initialized twice")]
    fn second_initialize_is_fatal() {
        let cpus = HostCpus::<CORES>::new();
        let arena = HostArena::new(4);
        let a = allocator(&cpus, &arena);
        a.initialize();
    }

    #[test]
    fn interrupts_restored_after_every_operation() {
        let cpus = HostCpus::<CORES>::new();
        let arena = HostArena::new(4);
        let a = allocator(&cpus, &arena);

        let p = a.allocate_page().expect("page");
        assert!(cpus.interrupts_enabled_on(0));
        a.free_page(p);
        assert!(cpus.interrupts_enabled_on(0));
        assert_eq!(cpus.nesting_on(0), 0);
    }

    /// Identity mapping that counts how often it is used with interrupts
    /// enabled on the boot core.
    struct WatchingMapper<'c> {
        cpus: &'c HostCpus<CORES>,
        unmasked: AtomicUsize,
    }

    impl PhysMapper for WatchingMapper<'_> {
        unsafe fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
            if self.cpus.interrupts_enabled_on(0) {
                self.unmasked.fetch_add(1, Ordering::Relaxed);
            }
            unsafe { IdentityMapper.phys_to_ptr(pa) }
        }
    }

    #[test]
    fn initialize_fills_pages_outside_the_lock() {
        let cpus = HostCpus::<CORES>::new();
        let arena = HostArena::new(16);
        let mapper = WatchingMapper {
            cpus: &cpus,
            unmasked: AtomicUsize::new(0),
        };
        let a = unsafe { PageAllocator::<_, _, CORES>::new(&cpus, &mapper, arena.start(), arena.end()) };
        let before = mapper.unmasked.load(Ordering::Relaxed);
        a.initialize();

        // every page is filled with interrupts on; only the pushes mask them
        let fills = mapper.unmasked.load(Ordering::Relaxed) - before;
        assert_eq!(fills, a.managed_pages());
        assert_eq!(a.free_pages_on(0), a.managed_pages());
        assert!(cpus.interrupts_enabled_on(0));
    }
}
