//! # Open files
//!
//! The system-wide file table: a fixed pool of reference-counted open-file
//! objects, each backed by a pipe, an inode, or a device.
//!
//! Ownership of a table entry is a [`FileHandle`]. Cloning a handle adds a
//! reference (`filedup`), dropping it removes one (`fileclose`); the last
//! drop resets the slot under the table lock and only then, with no lock
//! held, closes the pipe or releases the inode inside a filesystem
//! transaction.
//!
//! Everything below the file layer is reached through traits so the kernel
//! can plug in its own implementations:
//!
//! | trait            | provides                                          |
//! |------------------|---------------------------------------------------|
//! | [`Filesystem`]   | log transactions, inode lock, `readi`/`writei`    |
//! | [`Pipe`]         | pipe read, write and close                        |
//! | [`UserMemory`]   | copies into the current process's address space   |
//!
//! Character devices are dispatched through a [`DeviceTable`] indexed by
//! major number.

#![cfg_attr(not(any(test, doctest, feature = "host")), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod device;
mod error;
mod file_table;
mod fs;
#[cfg(any(test, feature = "host"))]
pub mod host;
mod io;
mod pipe;

pub use device::{DeviceRead, DeviceSwitch, DeviceTable, DeviceWrite};
pub use error::{FileError, IoError};
pub use file_table::{FileHandle, FileKind, FileTable, RawFile, max_write_chunk};
pub use fs::{Filesystem, InodeLock, InodeType, Stat, Transaction};
pub use io::{Dst, Src, UserMemory};
pub use pipe::Pipe;
