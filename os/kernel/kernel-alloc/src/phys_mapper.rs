//! # Physical memory access
//!
//! Rust code can only dereference virtual addresses. Whenever the kernel
//! needs to touch a physical page (free-list links, page fill, file data read
//! into a fresh page) it asks a [`PhysMapper`] where that page is visible in
//! the current address space.
//!
//! * [`HhdmPhysMapper`]: every physical address is mapped at `offset + pa`
//!   (higher-half direct map).
//! * [`IdentityMapper`]: physical equals virtual. Used during early boot and
//!   on the host, where "physical" pages are heap allocations.

use kernel_memory_addresses::PhysicalAddress;

/// Translate a physical address into a pointer the CPU can dereference.
pub trait PhysMapper: Sync {
    /// Pointer to the first byte of `pa` in the current address space.
    ///
    /// # Safety
    /// `pa` must lie in memory covered by this mapping; the caller is
    /// responsible for not creating aliasing mutable references.
    unsafe fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8;

    /// Reinterpret the memory at `pa` as a `T`.
    ///
    /// # Safety
    /// As for [`phys_to_ptr`](Self::phys_to_ptr); additionally `pa` must be
    /// suitably aligned for `T` and the bytes must be a valid `T`.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        unsafe { &mut *self.phys_to_ptr(pa).cast::<T>() }
    }
}

/// [`PhysMapper`] for kernels with a higher-half direct map.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HhdmPhysMapper {
    offset: u64,
}

impl HhdmPhysMapper {
    #[must_use]
    pub const fn new(offset: u64) -> Self {
        Self { offset }
    }
}

impl PhysMapper for HhdmPhysMapper {
    unsafe fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        #[allow(clippy::cast_possible_truncation)]
        let va = (self.offset + pa.as_u64()) as usize;
        core::ptr::with_exposed_provenance_mut(va)
    }
}

/// [`PhysMapper`] for identity-mapped memory.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct IdentityMapper;

impl PhysMapper for IdentityMapper {
    unsafe fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        #[allow(clippy::cast_possible_truncation)]
        core::ptr::with_exposed_provenance_mut(pa.as_u64() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hhdm_adds_offset() {
        let m = HhdmPhysMapper::new(0xFFFF_8880_0000_0000);
        let p = unsafe { m.phys_to_ptr(PhysicalAddress::new(0x1234_5000)) };
        assert_eq!(p.addr(), 0xFFFF_8880_1234_5000);
    }

    #[test]
    fn identity_round_trips_real_memory() {
        let mut word = 0_u64;
        let pa = PhysicalAddress::new((&raw mut word).expose_provenance() as u64);
        unsafe {
            *IdentityMapper.phys_to_mut::<u64>(pa) = 0xDEAD_BEEF;
        }
        assert_eq!(word, 0xDEAD_BEEF);
    }
}
