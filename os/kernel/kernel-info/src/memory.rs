//! # Memory Layout

/// Size of one physical page (and of one virtual page) in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// log2 of [`PAGE_SIZE`].
pub const PAGE_SHIFT: u32 = 12;

/// Byte pattern written into a page when it is handed out.
///
/// Code that forgets to initialize an allocation reads this instead of
/// zeroes, which makes the bug observable.
pub const ALLOC_FILL: u8 = 0x05;

/// Byte pattern written into a page when it is returned to the allocator,
/// to catch dangling references.
pub const FREE_FILL: u8 = 0x01;

/// Lowest user virtual address handed out by `mmap`.
///
/// Regions are placed above the highest existing mapping of the process,
/// never below this address.
pub const MMAP_BASE: u64 = 0x0000_0020_0000_0000;

const _: () = {
    assert!(PAGE_SIZE == 1 << PAGE_SHIFT);
    assert!(ALLOC_FILL != FREE_FILL);
    assert!(ALLOC_FILL != 0);
    assert!(MMAP_BASE.is_multiple_of(PAGE_SIZE));
};
