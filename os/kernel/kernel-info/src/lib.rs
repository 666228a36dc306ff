//! # Kernel Configuration
//!
//! Compile-time parameters shared by the allocator, the file table and the
//! memory-mapping layer. Every pool in the kernel is fixed-size; the sizes
//! live here so the subsystems agree on them.
//!
//! ## Modules
//!
//! ### Parameters ([`param`])
//! Pool capacities and filesystem transaction limits:
//! * **`NCPU`**: number of per-core free lists in the page allocator
//! * **`NFILE`**: slots in the open-file table
//! * **`NDEV`**: entries in the device switch
//! * **`NVMA`**: mapping records shared by all processes
//! * **`MAX_OP_BLOCKS`** / **`BLOCK_SIZE`**: log budget of one transaction
//!
//! ### Memory Layout ([`memory`])
//! Page geometry, allocator fill patterns, and where `mmap` starts placing
//! regions in a user address space:
//!
//! ```text
//! User Address Space:
//! 0x0000_0000_0000_0000 ┌─────────────────────────────────┐
//!                       │   Text, Data, Heap, Stack       │
//! MMAP_BASE             ├─────────────────────────────────┤ 0x0000_0020_0000_0000
//!                       │   File mappings (bump upwards)  │
//!                       │              ...                │
//!                       └─────────────────────────────────┘
//! ```
//!
//! All values are `const` and checked against each other at compile time.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
pub mod param;
