//! # Memory-mapped files
//!
//! Lazily populated mappings of file ranges into a process's address space
//! (`mmap`/`munmap`).
//!
//! * A [`VmaPool`] bounds the number of mapping records in the whole system.
//!   Every [`Vma`] owns one pool slot and one counted [`FileHandle`]
//!   reference; both are released when the record is dropped.
//! * Each process keeps its records in a [`Mappings`] list, newest first.
//! * [`VmaManager`] implements the operations: `map` reserves address space
//!   only, [`handle_fault`](VmaManager::handle_fault) reads one page from the
//!   file on first touch, `unmap` writes dirty pages of shared mappings back
//!   and releases the pages.
//!
//! Page tables are reached through the [`PageTable`] trait; physical pages
//! come from a [`PageSource`](kernel_alloc::PageSource).
//!
//! ```text
//!   MMAP_BASE            start ──────────── end
//!      │                   │  Vma (file, off) │
//!      ▼                   ▼                  ▼
//!  ────┬───────────────────┬──────────────────┬──────── user VA
//!      │ older mappings    │ newest mapping   │
//! ```
//!
//! [`FileHandle`]: kernel_file::FileHandle

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod error;
mod flags;
mod manager;
mod page_table;
mod pool;
mod vma;

pub use error::VmaError;
pub use kernel_alloc::PageSource;
pub use flags::{Access, MapFlags, Prot, PteFlags};
pub use manager::VmaManager;
pub use page_table::{PageTable, PageTableError, Pte};
pub use pool::{VmaPool, VmaSlot};
pub use vma::{FaultTarget, Mappings, Vma};
