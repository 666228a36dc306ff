//! # Kernel Parameters

/// Maximum number of processor cores, and thus per-core free lists.
pub const NCPU: usize = 8;

/// Open files per system.
pub const NFILE: usize = 100;

/// Number of entries in the device switch (maximum major device number + 1).
pub const NDEV: usize = 10;

/// Mapping records shared by all processes.
pub const NVMA: usize = 64;

/// Maximum number of blocks any filesystem operation writes.
pub const MAX_OP_BLOCKS: usize = 10;

/// Filesystem block size in bytes.
pub const BLOCK_SIZE: usize = 1024;

/// Major device number of the console.
pub const CONSOLE: usize = 1;

const _: () = {
    assert!(NCPU > 0);
    assert!(NFILE > 0);
    assert!(NVMA > 0);
    assert!(CONSOLE < NDEV);
    // inode, indirect block, two slop blocks, and at least one data block pair
    assert!(MAX_OP_BLOCKS > 1 + 1 + 2 + 1);
};
