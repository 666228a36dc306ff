use crate::{DeviceTable, Dst, FileError, Filesystem, InodeLock, Pipe, Src, Transaction, UserMemory};
use alloc::sync::Arc;
use core::fmt;
use core::mem::{self, ManuallyDrop};
use core::sync::atomic::{AtomicU64, Ordering};
use kernel_info::param;
use kernel_memory_addresses::VirtualAddress;
use kernel_sync::{Cpu, SpinLock};
use log::debug;

/// Largest inode write done in one log transaction.
///
/// A transaction may touch the inode, an indirect block, allocation bitmap
/// blocks, and two blocks of slop for unaligned writes; the rest is split
/// between data and bitmap blocks.
#[must_use]
pub const fn max_write_chunk(max_op_blocks: usize, block_size: usize) -> usize {
    ((max_op_blocks - 1 - 1 - 2) / 2) * block_size
}

/// What an open file refers to.
pub enum FileKind<I> {
    /// Slot allocated but not yet set up, or freed.
    None,
    Pipe(Arc<dyn Pipe>),
    Inode(I),
    Device { inode: I, major: usize },
}

impl<I: Clone> Clone for FileKind<I> {
    fn clone(&self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Pipe(p) => Self::Pipe(Arc::clone(p)),
            Self::Inode(ip) => Self::Inode(ip.clone()),
            Self::Device { inode, major } => Self::Device {
                inode: inode.clone(),
                major: *major,
            },
        }
    }
}

impl<I> fmt::Debug for FileKind<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Pipe(_) => f.write_str("Pipe"),
            Self::Inode(_) => f.write_str("Inode"),
            Self::Device { major, .. } => write!(f, "Device({major})"),
        }
    }
}

struct Slot<I> {
    refs: u32,
    /// Bumped every time the slot is freed; stale handles stop matching.
    generation: u32,
    readable: bool,
    writable: bool,
    kind: FileKind<I>,
}

impl<I> Slot<I> {
    const fn empty() -> Self {
        Self {
            refs: 0,
            generation: 0,
            readable: false,
            writable: false,
            kind: FileKind::None,
        }
    }
}

/// Copy of a slot's immutable-while-open state, taken under the table lock.
struct Snapshot<I> {
    readable: bool,
    writable: bool,
    kind: FileKind<I>,
}

/// Where an inode write lands.
#[derive(Copy, Clone)]
enum Position {
    /// At the file offset, advancing it.
    Cursor,
    /// At a fixed byte offset; the file offset is untouched.
    At(u64),
}

/// The system-wide table of open files.
///
/// `N` is the number of slots.
pub struct FileTable<'k, F: Filesystem, const N: usize = { param::NFILE }> {
    cpu: &'k dyn Cpu,
    fs: &'k F,
    devices: &'k DeviceTable<'k>,
    slots: SpinLock<[Slot<F::Inode>; N]>,
    /// Per-slot file offset, only touched with the inode lock held.
    offsets: [AtomicU64; N],
}

impl<'k, F: Filesystem, const N: usize> FileTable<'k, F, N> {
    pub fn new(cpu: &'k dyn Cpu, fs: &'k F, devices: &'k DeviceTable<'k>) -> Self {
        Self {
            cpu,
            fs,
            devices,
            slots: SpinLock::named("ftable", core::array::from_fn(|_| Slot::empty())),
            offsets: core::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Claim a free slot with one reference (`filealloc`).
    ///
    /// The slot has no backing object until [`FileHandle::install`].
    /// Returns `None` when every slot is in use.
    pub fn allocate(&self) -> Option<FileHandle<'_, F, N>> {
        let mut slots = self.slots.lock_irq(self.cpu);
        let (index, slot) = slots.iter_mut().enumerate().find(|(_, s)| s.refs == 0)?;
        slot.refs = 1;
        Some(FileHandle {
            table: self,
            index,
            generation: slot.generation,
        })
    }

    /// Allocate a slot and install `kind` in it.
    ///
    /// When the table is full the backing object is released the way a close
    /// would release it, and `None` is returned.
    pub fn open(&self, kind: FileKind<F::Inode>, readable: bool, writable: bool) -> Option<FileHandle<'_, F, N>> {
        if let Some(handle) = self.allocate() {
            handle.install(kind, readable, writable);
            Some(handle)
        } else {
            self.teardown(kind, writable);
            None
        }
    }

    /// Another reference to the same open file (`filedup`).
    ///
    /// # Panics
    /// Panics if the handle's slot is no longer open.
    pub fn duplicate(&self, handle: &FileHandle<'_, F, N>) -> FileHandle<'_, F, N> {
        let mut slots = self.slots.lock_irq(self.cpu);
        let slot = &mut slots[handle.index];
        handle.check("filedup", slot);
        slot.refs += 1;
        FileHandle {
            table: self,
            index: handle.index,
            generation: handle.generation,
        }
    }

    /// Drop one reference (`fileclose`). Equivalent to dropping the handle.
    ///
    /// # Panics
    /// Panics if the handle's slot is no longer open.
    pub fn close(&self, handle: FileHandle<'_, F, N>) {
        drop(handle);
    }

    /// Rebuild a handle from [`FileHandle::into_raw`].
    ///
    /// The raw value must come from a handle of this table that was not
    /// rebuilt before; otherwise reference counts go wrong. A handle whose
    /// slot has since been freed is caught on first use.
    ///
    /// # Panics
    /// Panics if `raw.index` is out of range.
    #[must_use]
    pub fn from_raw(&self, raw: RawFile) -> FileHandle<'_, F, N> {
        assert!(raw.index < N, "file index {} out of range", raw.index);
        FileHandle {
            table: self,
            index: raw.index,
            generation: raw.generation,
        }
    }

    /// Number of slots currently open.
    pub fn in_use(&self) -> usize {
        self.slots.lock_irq(self.cpu).iter().filter(|s| s.refs > 0).count()
    }

    /// Reference count of slot `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of range.
    pub fn ref_count(&self, index: usize) -> u32 {
        self.slots.lock_irq(self.cpu)[index].refs
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    fn release(&self, index: usize, generation: u32) {
        let (kind, writable) = {
            let mut slots = self.slots.lock_irq(self.cpu);
            let slot = &mut slots[index];
            assert!(
                slot.refs > 0 && slot.generation == generation,
                "fileclose: file {index} is not open"
            );
            slot.refs -= 1;
            if slot.refs > 0 {
                return;
            }
            slot.generation = slot.generation.wrapping_add(1);
            slot.readable = false;
            (mem::replace(&mut slot.kind, FileKind::None), mem::take(&mut slot.writable))
        };
        debug!("file {index}: last reference closed ({kind:?})");
        self.teardown(kind, writable);
    }

    /// Release the backing object. No table lock may be held.
    fn teardown(&self, kind: FileKind<F::Inode>, writable: bool) {
        match kind {
            FileKind::None => {}
            FileKind::Pipe(pipe) => pipe.close(writable),
            FileKind::Inode(ip) | FileKind::Device { inode: ip, .. } => {
                let _tx = Transaction::begin(self.fs);
                self.fs.iput(ip);
            }
        }
    }

    fn snapshot(&self, handle: &FileHandle<'_, F, N>, op: &str) -> Snapshot<F::Inode> {
        let slots = self.slots.lock_irq(self.cpu);
        let slot = &slots[handle.index];
        handle.check(op, slot);
        Snapshot {
            readable: slot.readable,
            writable: slot.writable,
            kind: slot.kind.clone(),
        }
    }

    fn inode_read(&self, index: usize, ip: &F::Inode, dst: Dst<'_>, n: usize, pos: Position) -> Result<usize, FileError> {
        let _lock = InodeLock::new(self.fs, ip);
        let off = match pos {
            Position::Cursor => self.offsets[index].load(Ordering::Relaxed),
            Position::At(off) => off,
        };
        let r = self.fs.readi(ip, dst, off, n)?;
        if let Position::Cursor = pos {
            self.offsets[index].store(off + r as u64, Ordering::Relaxed);
        }
        Ok(r)
    }

    /// Write in transaction-sized chunks. Stops at the first short chunk.
    fn inode_write(&self, index: usize, ip: &F::Inode, src: Src<'_>, n: usize, pos: Position) -> Result<usize, FileError> {
        let max = max_write_chunk(F::MAX_OP_BLOCKS, F::BLOCK_SIZE);
        let mut written = 0;
        while written < n {
            let want = (n - written).min(max);
            let result = {
                let _tx = Transaction::begin(self.fs);
                let _lock = InodeLock::new(self.fs, ip);
                let off = match pos {
                    Position::Cursor => self.offsets[index].load(Ordering::Relaxed),
                    Position::At(off) => off + written as u64,
                };
                let result = self.fs.writei(ip, src.skip(written), off, want);
                if let (Position::Cursor, Ok(r)) = (pos, &result) {
                    self.offsets[index].store(off + *r as u64, Ordering::Relaxed);
                }
                result
            };
            match result {
                Ok(r) if r == want => written += r,
                Ok(r) => return Err(FileError::PartialWrite { written: written + r }),
                Err(e) if written == 0 => return Err(e.into()),
                Err(_) => return Err(FileError::PartialWrite { written }),
            }
        }
        Ok(n)
    }
}

/// A counted reference to an open file.
///
/// `Clone` takes another reference, `Drop` gives one back. The handle stays
/// valid for as long as it exists; operations on a handle whose slot was
/// freed behind its back (through [`FileTable::from_raw`]) panic.
pub struct FileHandle<'t, F: Filesystem, const N: usize = { param::NFILE }> {
    table: &'t FileTable<'t, F, N>,
    index: usize,
    generation: u32,
}

/// A [`FileHandle`] flattened for storage outside the borrow checker's view.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RawFile {
    pub index: usize,
    pub generation: u32,
}

impl<'t, F: Filesystem, const N: usize> FileHandle<'t, F, N> {
    /// Slot index in the file table.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub const fn table(&self) -> &'t FileTable<'t, F, N> {
        self.table
    }

    /// Give up the handle without dropping its reference.
    #[must_use]
    pub fn into_raw(self) -> RawFile {
        let this = ManuallyDrop::new(self);
        RawFile {
            index: this.index,
            generation: this.generation,
        }
    }

    /// Set up a freshly allocated file and reset its offset.
    ///
    /// # Panics
    /// Panics if the file already has a backing object.
    pub fn install(&self, kind: FileKind<F::Inode>, readable: bool, writable: bool) {
        let mut slots = self.table.slots.lock_irq(self.table.cpu);
        let slot = &mut slots[self.index];
        self.check("install", slot);
        assert!(
            matches!(slot.kind, FileKind::None),
            "install: file {} already set up",
            self.index
        );
        slot.kind = kind;
        slot.readable = readable;
        slot.writable = writable;
        self.table.offsets[self.index].store(0, Ordering::Relaxed);
    }

    #[must_use]
    pub fn readable(&self) -> bool {
        self.table.snapshot(self, "readable").readable
    }

    #[must_use]
    pub fn writable(&self) -> bool {
        self.table.snapshot(self, "writable").writable
    }

    /// Current byte offset of an inode file.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.table.offsets[self.index].load(Ordering::Relaxed)
    }

    /// Copy the inode metadata to user address `addr` (`filestat`).
    ///
    /// # Errors
    /// * [`FileError::NotInode`] for pipes.
    /// * [`FileError::BadAddress`] if the copy to user memory fails.
    pub fn stat(&self, user: &(impl UserMemory + ?Sized), addr: VirtualAddress) -> Result<(), FileError> {
        let fs = self.table.fs;
        let st = match self.table.snapshot(self, "filestat").kind {
            FileKind::Inode(ip) | FileKind::Device { inode: ip, .. } => {
                let _lock = InodeLock::new(fs, &ip);
                fs.stati(&ip)
            }
            _ => return Err(FileError::NotInode),
        };
        user.copy_out(addr, &st.to_bytes()).map_err(|_| FileError::BadAddress)
    }

    /// Read up to `n` bytes into `dst` (`fileread`).
    ///
    /// Inode reads start at the file offset and advance it.
    ///
    /// # Errors
    /// * [`FileError::NotReadable`] if not opened for reading.
    /// * [`FileError::NoDevice`] if the device has no read entry point.
    /// * [`FileError::Io`] for failures below.
    ///
    /// # Panics
    /// Panics if the file was never set up.
    pub fn read(&self, dst: Dst<'_>, n: usize) -> Result<usize, FileError> {
        let snap = self.table.snapshot(self, "fileread");
        if !snap.readable {
            return Err(FileError::NotReadable);
        }
        match snap.kind {
            FileKind::Pipe(pipe) => Ok(pipe.read(dst, n)?),
            FileKind::Device { major, .. } => {
                let read = self.table.devices.reader(major).ok_or(FileError::NoDevice)?;
                Ok(read(dst, n)?)
            }
            FileKind::Inode(ip) => self.table.inode_read(self.index, &ip, dst, n, Position::Cursor),
            FileKind::None => panic!("fileread: file {} has no backing object", self.index),
        }
    }

    /// Write `n` bytes from `src` (`filewrite`).
    ///
    /// Inode writes start at the file offset and are split into chunks of
    /// [`max_write_chunk`] bytes, each in its own transaction.
    ///
    /// # Errors
    /// * [`FileError::NotWritable`] if not opened for writing.
    /// * [`FileError::NoDevice`] if the device has no write entry point.
    /// * [`FileError::PartialWrite`] if a chunk came up short; the offset
    ///   reflects what was written.
    /// * [`FileError::Io`] for failures below.
    ///
    /// # Panics
    /// Panics if the file was never set up.
    pub fn write(&self, src: Src<'_>, n: usize) -> Result<usize, FileError> {
        let snap = self.table.snapshot(self, "filewrite");
        if !snap.writable {
            return Err(FileError::NotWritable);
        }
        match snap.kind {
            FileKind::Pipe(pipe) => Ok(pipe.write(src, n)?),
            FileKind::Device { major, .. } => {
                let write = self.table.devices.writer(major).ok_or(FileError::NoDevice)?;
                Ok(write(src, n)?)
            }
            FileKind::Inode(ip) => self.table.inode_write(self.index, &ip, src, n, Position::Cursor),
            FileKind::None => panic!("filewrite: file {} has no backing object", self.index),
        }
    }

    /// Read `n` bytes at byte `off` of the inode, leaving the offset alone.
    ///
    /// # Errors
    /// * [`FileError::NotReadable`] if not opened for reading.
    /// * [`FileError::NotInode`] for pipes and devices.
    /// * [`FileError::Io`] for failures below.
    pub fn read_at(&self, dst: Dst<'_>, off: u64, n: usize) -> Result<usize, FileError> {
        let snap = self.table.snapshot(self, "read_at");
        if !snap.readable {
            return Err(FileError::NotReadable);
        }
        let FileKind::Inode(ip) = snap.kind else {
            return Err(FileError::NotInode);
        };
        self.table.inode_read(self.index, &ip, dst, n, Position::At(off))
    }

    /// Write `n` bytes at byte `off` of the inode, leaving the offset alone.
    /// Chunked like [`write`](Self::write).
    ///
    /// # Errors
    /// As for [`write`](Self::write), plus [`FileError::NotInode`] for pipes
    /// and devices.
    pub fn write_at(&self, src: Src<'_>, off: u64, n: usize) -> Result<usize, FileError> {
        let snap = self.table.snapshot(self, "write_at");
        if !snap.writable {
            return Err(FileError::NotWritable);
        }
        let FileKind::Inode(ip) = snap.kind else {
            return Err(FileError::NotInode);
        };
        self.table.inode_write(self.index, &ip, src, n, Position::At(off))
    }

    fn check(&self, op: &str, slot: &Slot<F::Inode>) {
        assert!(
            slot.refs > 0 && slot.generation == self.generation,
            "{op}: file {} is not open",
            self.index
        );
    }
}

impl<F: Filesystem, const N: usize> Clone for FileHandle<'_, F, N> {
    fn clone(&self) -> Self {
        self.table.duplicate(self)
    }
}

impl<F: Filesystem, const N: usize> Drop for FileHandle<'_, F, N> {
    fn drop(&mut self) {
        self.table.release(self.index, self.generation);
    }
}

impl<F: Filesystem, const N: usize> fmt::Debug for FileHandle<'_, F, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("index", &self.index)
            .field("generation", &self.generation)
            .finish()
    }
}
