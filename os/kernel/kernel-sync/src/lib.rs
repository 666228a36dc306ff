//! # Kernel synchronization primitives
//!
//! * [`SpinLock`]: a busy-waiting, non-reentrant lock. Every kernel pool
//!   (per-core free lists, the file table, the mapping pool) sits behind one.
//! * [`IrqGuard`]: nestable "interrupts off" section for the current core,
//!   with the usual `push_off`/`pop_off` semantics.
//! * [`Cpu`]: the seam to the platform that knows which core is executing and
//!   how to mask its interrupts.
//!
//! With the `host` feature, [`host::HostCpus`] simulates a fixed number of
//! cores on std threads so the allocators can be exercised from tests.

#![cfg_attr(not(any(test, doctest, feature = "host")), no_std)]
#![allow(unsafe_code)]

mod cpu;
#[cfg(any(test, feature = "host"))]
pub mod host;
pub mod irq;
mod spin_lock;

pub use cpu::{Cpu, IrqNesting};
pub use irq::{IrqGuard, IrqSpinLockGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};
