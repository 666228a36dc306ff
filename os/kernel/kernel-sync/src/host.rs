//! Simulated cores for running kernel code on std threads.
//!
//! Each OS thread is bound to one simulated core with [`HostCpus::bind`].
//! A thread that never binds runs as core 0. Two threads bound to the same
//! core at the same time would share its interrupt state, which real
//! hardware never does, so tests give every thread its own core.

use crate::{Cpu, IrqNesting};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};

thread_local! {
    static CURRENT_CORE: Cell<usize> = const { Cell::new(0) };
}

#[derive(Debug)]
struct HostCore {
    interrupts: AtomicBool,
    nesting: IrqNesting,
}

/// `N` simulated cores, all starting with interrupts enabled.
#[derive(Debug)]
pub struct HostCpus<const N: usize> {
    cores: [HostCore; N],
}

impl<const N: usize> HostCpus<N> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cores: core::array::from_fn(|_| HostCore {
                interrupts: AtomicBool::new(true),
                nesting: IrqNesting::new(),
            }),
        }
    }

    /// Run the calling thread as core `core` from now on.
    ///
    /// # Panics
    ///
    /// Panics if `core >= N` or if the calling thread is inside a masked
    /// section (a core cannot migrate with interrupts off).
    pub fn bind(&self, core: usize) {
        assert!(core < N, "core {core} out of range 0..{N}");
        assert_eq!(
            self.current().nesting.depth(),
            0,
            "cannot migrate while interrupts are masked"
        );
        CURRENT_CORE.with(|c| c.set(core));
    }

    #[must_use]
    pub fn interrupts_enabled_on(&self, core: usize) -> bool {
        self.cores[core].interrupts.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn nesting_on(&self, core: usize) -> u32 {
        self.cores[core].nesting.depth()
    }

    fn current(&self) -> &HostCore {
        &self.cores[self.id()]
    }
}

impl<const N: usize> Default for HostCpus<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Cpu for HostCpus<N> {
    fn id(&self) -> usize {
        let core = CURRENT_CORE.with(Cell::get);
        assert!(core < N, "thread bound to core {core}, only {N} simulated");
        core
    }

    fn interrupts_enabled(&self) -> bool {
        self.current().interrupts.load(Ordering::Relaxed)
    }

    fn disable_interrupts(&self) {
        self.current().interrupts.store(false, Ordering::Relaxed);
    }

    fn enable_interrupts(&self) {
        self.current().interrupts.store(true, Ordering::Relaxed);
    }

    fn irq_nesting(&self) -> &IrqNesting {
        &self.current().nesting
    }
}
