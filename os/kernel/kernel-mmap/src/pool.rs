use alloc::boxed::Box;
use alloc::vec;
use core::fmt;
use kernel_info::param;
use kernel_sync::{Cpu, SpinLock};

/// Fixed number of mapping records shared by all processes.
pub struct VmaPool<'c> {
    cpu: &'c dyn Cpu,
    used: SpinLock<Box<[bool]>>,
}

impl<'c> VmaPool<'c> {
    /// A pool of [`NVMA`](param::NVMA) records.
    #[must_use]
    pub fn new(cpu: &'c dyn Cpu) -> Self {
        Self::with_capacity(cpu, param::NVMA)
    }

    #[must_use]
    pub fn with_capacity(cpu: &'c dyn Cpu, capacity: usize) -> Self {
        Self {
            cpu,
            used: SpinLock::named("kvma", vec![false; capacity].into_boxed_slice()),
        }
    }

    /// Take a free record, or `None` if all are in use.
    pub fn claim(&self) -> Option<VmaSlot<'_>> {
        let mut used = self.used.lock_irq(self.cpu);
        let index = used.iter().position(|u| !u)?;
        used[index] = true;
        Some(VmaSlot { pool: self, index })
    }

    pub fn in_use(&self) -> usize {
        self.used.lock_irq(self.cpu).iter().filter(|u| **u).count()
    }

    pub fn capacity(&self) -> usize {
        self.used.lock_irq(self.cpu).len()
    }

    fn release(&self, index: usize) {
        let mut used = self.used.lock_irq(self.cpu);
        assert!(used[index], "kvma: record {index} released twice");
        used[index] = false;
    }
}

/// Ownership of one record in a [`VmaPool`]; returned on drop.
pub struct VmaSlot<'p> {
    pool: &'p VmaPool<'p>,
    index: usize,
}

impl VmaSlot<'_> {
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }
}

impl Drop for VmaSlot<'_> {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}

impl fmt::Debug for VmaSlot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VmaSlot({})", self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_sync::host::HostCpus;
    use std::collections::HashSet;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn slots_return_on_drop() {
        let cpus = HostCpus::<1>::new();
        let pool = VmaPool::with_capacity(&cpus, 2);
        let a = pool.claim().expect("first");
        let b = pool.claim().expect("second");
        assert_ne!(a.index(), b.index());
        assert!(pool.claim().is_none());
        drop(a);
        assert_eq!(pool.in_use(), 1);
        assert_eq!(pool.claim().map(|s| s.index()), Some(0));
    }

    #[test]
    fn concurrent_claims_are_distinct() {
        const CORES: usize = 8;
        let cpus = HostCpus::<CORES>::new();
        let pool = VmaPool::with_capacity(&cpus, CORES / 2);
        let start = Barrier::new(CORES);

        let slots: Vec<_> = thread::scope(|s| {
            let joins: Vec<_> = (0..CORES)
                .map(|core| {
                    let (cpus, pool, start) = (&cpus, &pool, &start);
                    s.spawn(move || {
                        cpus.bind(core);
                        start.wait();
                        pool.claim()
                    })
                })
                .collect();
            joins.into_iter().filter_map(|j| j.join().expect("claimer")).collect()
        });

        assert_eq!(slots.len(), CORES / 2);
        let distinct: HashSet<_> = slots.iter().map(VmaSlot::index).collect();
        assert_eq!(distinct.len(), CORES / 2);
    }
}
