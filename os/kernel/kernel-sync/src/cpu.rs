use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// The executing processor core, as seen by the kernel.
///
/// The platform layer implements this once per architecture. The core id is
/// only stable while interrupts are disabled (otherwise the thread of control
/// could be migrated between reading it and using it), which is why callers
/// read it under an [`IrqGuard`](crate::IrqGuard).
pub trait Cpu: Sync {
    /// Index of the executing core, `0..NCPU`.
    fn id(&self) -> usize;

    /// Whether the executing core currently accepts interrupts.
    fn interrupts_enabled(&self) -> bool;

    /// Mask interrupts on the executing core.
    fn disable_interrupts(&self);

    /// Unmask interrupts on the executing core.
    fn enable_interrupts(&self);

    /// Interrupt nesting bookkeeping of the executing core.
    fn irq_nesting(&self) -> &IrqNesting;
}

/// Per-core depth of nested [`IrqGuard`](crate::IrqGuard)s.
///
/// Only ever touched by its own core with interrupts disabled, so relaxed
/// atomics are sufficient.
#[derive(Debug, Default)]
pub struct IrqNesting {
    depth: AtomicU32,
    were_enabled: AtomicBool,
}

impl IrqNesting {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            depth: AtomicU32::new(0),
            were_enabled: AtomicBool::new(false),
        }
    }

    /// Current nesting depth.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth.load(Ordering::Relaxed)
    }

    /// Record one more level. `enabled` is the interrupt state observed
    /// before it was masked; only the outermost level remembers it.
    #[inline]
    pub(crate) fn push(&self, enabled: bool) {
        if self.depth.load(Ordering::Relaxed) == 0 {
            self.were_enabled.store(enabled, Ordering::Relaxed);
        }
        self.depth.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop one level. Returns `true` if interrupts should be re-enabled.
    #[inline]
    pub(crate) fn pop(&self) -> bool {
        let depth = self.depth.load(Ordering::Relaxed);
        assert!(depth >= 1, "pop_off: unbalanced interrupt nesting");
        self.depth.store(depth - 1, Ordering::Relaxed);
        depth == 1 && self.were_enabled.load(Ordering::Relaxed)
    }
}
