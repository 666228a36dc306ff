//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw memory addresses used by the page
//! allocator and the memory-mapping layer.
//!
//! ## Overview
//!
//! The types prevent mixing virtual and physical addresses at compile time
//! while remaining zero-cost wrappers around `u64` values.
//!
//! | Type | Meaning |
//! |----------|----------|
//! | [`MemoryAddress`] | A raw 64-bit address, either physical or virtual. |
//! | [`PhysicalAddress`] | Refers to physical memory (a page frame or a byte in one). |
//! | [`VirtualAddress`] | Refers to page-table translated memory. |
//!
//! ## Page Granularity
//!
//! The kernel works with a single page size,
//! [`PAGE_SIZE`](kernel_info::memory::PAGE_SIZE) (4 KiB). All rounding
//! helpers (`page_round_up`, `page_round_down`, `is_page_aligned`) use it.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x0000_0020_0000_1234);
//! assert_eq!(va.page_round_down().as_u64(), 0x0000_0020_0000_1000);
//! assert_eq!(va.page_round_up().as_u64(), 0x0000_0020_0000_2000);
//! assert_eq!(va.page_offset(), 0x234);
//!
//! let pa = PhysicalAddress::new(0x8000_0000);
//! assert!(pa.is_page_aligned());
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]
#![allow(clippy::inline_always)]

mod memory_address;
mod physical_address;
mod virtual_address;

pub use kernel_info::memory::PAGE_SIZE;
pub use memory_address::MemoryAddress;
pub use physical_address::PhysicalAddress;
pub use virtual_address::VirtualAddress;

/// Round `x` up to the next multiple of [`PAGE_SIZE`].
///
/// ```rust
/// # use kernel_memory_addresses::page_round_up;
/// assert_eq!(page_round_up(0), 0);
/// assert_eq!(page_round_up(1), 4096);
/// assert_eq!(page_round_up(4096), 4096);
/// assert_eq!(page_round_up(4097), 8192);
/// ```
#[inline(always)]
#[must_use]
pub const fn page_round_up(x: u64) -> u64 {
    (x + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// Round `x` down to a multiple of [`PAGE_SIZE`].
#[inline(always)]
#[must_use]
pub const fn page_round_down(x: u64) -> u64 {
    x & !(PAGE_SIZE - 1)
}

/// Number of pages needed to cover `len` bytes.
#[inline(always)]
#[must_use]
pub const fn pages_spanning(len: u64) -> u64 {
    page_round_up(len) / PAGE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_helpers() {
        assert_eq!(page_round_down(0x12345), 0x12000);
        assert_eq!(page_round_up(0x12345), 0x13000);
        assert_eq!(page_round_up(0x12000), 0x12000);
        assert_eq!(pages_spanning(0), 0);
        assert_eq!(pages_spanning(1), 1);
        assert_eq!(pages_spanning(PAGE_SIZE * 3), 3);
        assert_eq!(pages_spanning(PAGE_SIZE * 3 + 1), 4);
    }

    #[test]
    fn virtual_vs_physical_wrappers() {
        let va = VirtualAddress::new(0x0000_0020_0000_1234);
        assert_eq!(va.page_offset(), 0x234);
        assert!(!va.is_page_aligned());
        assert!(va.page_round_down().is_page_aligned());
        assert_eq!((va.page_round_down() + 0x234).as_u64(), va.as_u64());

        let pa = PhysicalAddress::new(0x8000_0042);
        assert_eq!(pa.page_round_down().as_u64(), 0x8000_0000);
        assert_eq!(pa.page_round_up().as_u64(), 0x8000_1000);
        assert_eq!(MemoryAddress::from(pa).as_u64(), 0x8000_0042);
    }

    #[test]
    fn distance_between_addresses() {
        let a = VirtualAddress::new(0x4000);
        let b = VirtualAddress::new(0x7000);
        assert_eq!(b - a, 0x3000);
        assert_eq!(a.checked_sub(b), None);
        assert_eq!(b.checked_sub(a), Some(0x3000));
    }
}
