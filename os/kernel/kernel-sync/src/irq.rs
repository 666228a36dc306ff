use crate::{Cpu, SpinLock, SpinLockGuard};
use core::marker::PhantomData;

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// Guards nest: the executing core's [`IrqNesting`](crate::IrqNesting) counts
/// the live guards and remembers whether interrupts were enabled when the
/// outermost one was created. Interrupts are turned back on **only** when the
/// outermost guard is dropped and they were enabled before it.
///
/// The guard is tied to the core it was created on and is therefore neither
/// `Send` nor `Sync`.
///
/// # Panics
///
/// Dropping a guard while interrupts are enabled, or with no matching
/// creation, means the nesting was corrupted; both are fatal.
///
/// # Examples
///
/// ```ignore
/// use kernel_sync::IrqGuard;
/// use kernel_sync::host::HostCpus;
///
/// let cpus = HostCpus::<1>::new();
/// {
///     let _outer = IrqGuard::new(&cpus);
///     {
///         let _inner = IrqGuard::new(&cpus);
///     }
///     assert!(!cpus.interrupts_enabled_on(0)); // still masked by `_outer`
/// }
/// assert!(cpus.interrupts_enabled_on(0));
/// ```
pub struct IrqGuard<'c, C: Cpu + ?Sized> {
    cpu: &'c C,
    _not_send: PhantomData<*const ()>,
}

impl<'c, C: Cpu + ?Sized> IrqGuard<'c, C> {
    /// Disables interrupts on the executing core (`push_off`).
    #[inline]
    #[must_use]
    pub fn new(cpu: &'c C) -> Self {
        let enabled = cpu.interrupts_enabled();
        cpu.disable_interrupts();
        cpu.irq_nesting().push(enabled);
        Self {
            cpu,
            _not_send: PhantomData,
        }
    }

    /// The executing core; stable for the lifetime of the guard.
    #[inline]
    #[must_use]
    pub fn cpu_id(&self) -> usize {
        self.cpu.id()
    }
}

impl<C: Cpu + ?Sized> Drop for IrqGuard<'_, C> {
    /// `pop_off`.
    fn drop(&mut self) {
        assert!(
            !self.cpu.interrupts_enabled(),
            "pop_off: interrupts enabled inside a masked section"
        );
        if self.cpu.irq_nesting().pop() {
            self.cpu.enable_interrupts();
        }
    }
}

/// A spin lock guard that also keeps interrupts disabled while held.
///
/// Created via [`SpinLock::lock_irq`], it:
///
/// 1. disables interrupts (nestable, see [`IrqGuard`]),
/// 2. acquires the lock and records the owning core,
///
/// and undoes both in reverse order on drop. This prevents an interrupt
/// handler on the same core from spinning forever on a lock the interrupted
/// code already holds.
pub struct IrqSpinLockGuard<'a, 'c, T, C: Cpu + ?Sized> {
    lock: &'a SpinLock<T>,
    guard: SpinLockGuard<'a, T>,
    // declared last: dropped after the lock is released
    _irq: IrqGuard<'c, C>,
}

impl<T> SpinLock<T> {
    /// Acquires the lock with interrupts disabled for the guard’s lifetime.
    ///
    /// # Panics
    ///
    /// Panics if the executing core already holds this lock; spin locks are
    /// not reentrant and spinning here would never terminate.
    #[inline]
    pub fn lock_irq<'a, 'c, C: Cpu + ?Sized>(&'a self, cpu: &'c C) -> IrqSpinLockGuard<'a, 'c, T, C> {
        let irq = IrqGuard::new(cpu);
        let core = irq.cpu_id();
        assert!(!self.holding(core), "acquire {}: already held by core {core}", self.name());
        let guard = self.lock();
        self.set_owner(Some(core));
        IrqSpinLockGuard {
            lock: self,
            guard,
            _irq: irq,
        }
    }
}

impl<T, C: Cpu + ?Sized> core::ops::Deref for IrqSpinLockGuard<'_, '_, T, C> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T, C: Cpu + ?Sized> core::ops::DerefMut for IrqSpinLockGuard<'_, '_, T, C> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T, C: Cpu + ?Sized> Drop for IrqSpinLockGuard<'_, '_, T, C> {
    fn drop(&mut self) {
        self.lock.set_owner(None);
        // fields drop next: the lock is released, then interrupts restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostCpus;

    #[test]
    fn guards_nest_and_restore_outer_state() {
        let cpus = HostCpus::<2>::new();
        cpus.bind(1);
        assert!(cpus.interrupts_enabled_on(1));
        {
            let g1 = IrqGuard::new(&cpus);
            assert_eq!(g1.cpu_id(), 1);
            assert!(!cpus.interrupts_enabled_on(1));
            {
                let _g2 = IrqGuard::new(&cpus);
                assert_eq!(cpus.irq_nesting().depth(), 2);
            }
            // inner drop must not re-enable
            assert!(!cpus.interrupts_enabled_on(1));
            assert_eq!(cpus.irq_nesting().depth(), 1);
        }
        assert!(cpus.interrupts_enabled_on(1));
        assert_eq!(cpus.irq_nesting().depth(), 0);
        // the other core was never touched
        assert!(cpus.interrupts_enabled_on(0));
    }

    #[test]
    fn guard_keeps_interrupts_off_if_they_were_off() {
        let cpus = HostCpus::<1>::new();
        cpus.bind(0);
        cpus.disable_interrupts();
        {
            let _g = IrqGuard::new(&cpus);
        }
        assert!(!cpus.interrupts_enabled_on(0));
        cpus.enable_interrupts();
    }

    #[test]
    #[should_panic(expected = "pop_off")]
    fn enabling_inside_masked_section_is_fatal() {
        let cpus = HostCpus::<1>::new();
        cpus.bind(0);
        let _g = IrqGuard::new(&cpus);
        cpus.enable_interrupts();
    }

    #[test]
    fn lock_irq_masks_interrupts_and_tracks_owner() {
        let cpus = HostCpus::<4>::new();
        cpus.bind(3);
        let lock = SpinLock::named("kmem3", 7_u32);
        {
            let mut g = lock.lock_irq(&cpus);
            *g += 1;
            assert!(lock.holding(3));
            assert!(!lock.holding(0));
            assert!(!cpus.interrupts_enabled_on(3));
        }
        assert!(!lock.holding(3));
        assert!(cpus.interrupts_enabled_on(3));
        assert_eq!(*lock.lock(), 8);
    }

    #[test]
    #[should_panic(expected = "acquire ftable: already held")]
    fn reacquire_on_same_core_is_fatal() {
        let cpus = HostCpus::<1>::new();
        cpus.bind(0);
        let lock = SpinLock::named("ftable", ());
        let _a = lock.lock_irq(&cpus);
        let _b = lock.lock_irq(&cpus);
    }

    #[test]
    fn nested_locks_restore_interrupts_once() {
        let cpus = HostCpus::<1>::new();
        cpus.bind(0);
        let a = SpinLock::named("a", 1);
        let b = SpinLock::named("b", 2);
        {
            let ga = a.lock_irq(&cpus);
            {
                let gb = b.lock_irq(&cpus);
                assert_eq!(*ga + *gb, 3);
            }
            assert!(!cpus.interrupts_enabled_on(0));
        }
        assert!(cpus.interrupts_enabled_on(0));
    }
}
