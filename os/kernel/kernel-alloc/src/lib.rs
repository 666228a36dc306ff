//! # Physical Page Allocation
//!
//! This crate owns the physical memory above the kernel image and hands it
//! out one 4 KiB page at a time.
//!
//! ```text
//!            ┌──────────┐ ┌──────────┐       ┌──────────┐
//!  per core  │ kmem[0]  │ │ kmem[1]  │  ...  │ kmem[N-1]│   SpinLock each
//!            └────┬─────┘ └────┬─────┘       └────┬─────┘
//!                 ▼            ▼                  ▼
//!               page ──► page ──► ...   (next link in the first 8 bytes)
//!
//!  free map   [bit per page: 1 = on some free list]       lock-free
//! ```
//!
//! * Each core allocates from and frees to its own list, so the common path
//!   never contends. A core whose list ran dry steals a single page from the
//!   first non-empty list, scanning cores in a fixed order.
//! * Pages are filled with [`ALLOC_FILL`](kernel_info::memory::ALLOC_FILL)
//!   when handed out and with [`FREE_FILL`](kernel_info::memory::FREE_FILL)
//!   when returned, so uninitialized reads and dangling writes stand out.
//! * A bitmap carved from the start of the managed range records which pages
//!   are free. Freeing a page whose bit is already set is a double free and
//!   halts the kernel.
//!
//! Physical memory is reached through a [`PhysMapper`]; the kernel uses the
//! higher-half direct map ([`HhdmPhysMapper`]), tests use [`IdentityMapper`]
//! over heap memory (see the `host` feature).
//!
//! ## Usage
//!
//! ```ignore
//! use kernel_alloc::{PageAllocator, HhdmPhysMapper};
//!
//! let alloc = unsafe { PageAllocator::new(&cpu, &HHDM, kernel_end, PHYS_TOP) };
//! alloc.initialize(); // on the boot core, exactly once
//!
//! let page = alloc.allocate_page().expect("out of memory");
//! alloc.free_page(page);
//! ```

#![cfg_attr(not(any(test, doctest, feature = "host")), no_std)]
#![allow(unsafe_code)]

mod free_list;
#[cfg(any(test, feature = "host"))]
pub mod host;
mod page;
mod page_allocator;
pub mod phys_mapper;

pub use page::Page;
pub use page_allocator::{PageAllocator, PageSource};
pub use phys_mapper::{HhdmPhysMapper, IdentityMapper, PhysMapper};
