//! In-memory stand-ins for the filesystem, pipes and user memory.
//!
//! They record how the file layer drives them (transactions, inode locks,
//! `iput`, pipe closes) so tests can check the protocol, not just the bytes.

use crate::{Dst, Filesystem, InodeType, IoError, Pipe, Src, Stat, UserMemory};
use kernel_memory_addresses::VirtualAddress;
use kernel_sync::SpinLock;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A flat byte range of "user" memory starting at `base`.
#[derive(Debug)]
pub struct HostUserMemory {
    base: VirtualAddress,
    bytes: SpinLock<Vec<u8>>,
}

impl HostUserMemory {
    #[must_use]
    pub fn new(base: VirtualAddress, len: usize) -> Self {
        Self {
            base,
            bytes: SpinLock::named("user", vec![0; len]),
        }
    }

    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.base
    }

    /// Copy of `len` bytes at `va`.
    ///
    /// # Panics
    /// Panics if the range is outside the memory.
    #[must_use]
    pub fn read(&self, va: VirtualAddress, len: usize) -> Vec<u8> {
        let mut out = vec![0; len];
        self.copy_in(&mut out, va).expect("range inside user memory");
        out
    }

    fn range(&self, va: VirtualAddress, len: usize) -> Result<core::ops::Range<usize>, IoError> {
        let start = va.checked_sub(self.base).ok_or(IoError::BadAddress)?;
        let start = usize::try_from(start).map_err(|_| IoError::BadAddress)?;
        let end = start.checked_add(len).ok_or(IoError::BadAddress)?;
        Ok(start..end)
    }
}

impl UserMemory for HostUserMemory {
    fn copy_out(&self, dst: VirtualAddress, src: &[u8]) -> Result<(), IoError> {
        let range = self.range(dst, src.len())?;
        let mut bytes = self.bytes.lock();
        bytes.get_mut(range).ok_or(IoError::BadAddress)?.copy_from_slice(src);
        Ok(())
    }

    fn copy_in(&self, dst: &mut [u8], src: VirtualAddress) -> Result<(), IoError> {
        let range = self.range(src, dst.len())?;
        let bytes = self.bytes.lock();
        dst.copy_from_slice(bytes.get(range).ok_or(IoError::BadAddress)?);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemInode {
    data: Vec<u8>,
    refs: usize,
    nlink: i16,
}

/// An in-memory filesystem whose inodes are plain numbers.
#[derive(Debug)]
pub struct MemFs {
    user: HostUserMemory,
    inodes: SpinLock<BTreeMap<u32, MemInode>>,
    locked: SpinLock<BTreeSet<u32>>,
    next_ino: AtomicUsize,
    begun: AtomicUsize,
    ended: AtomicUsize,
    open_ops: AtomicUsize,
    iputs: SpinLock<Vec<u32>>,
    writes: SpinLock<Vec<(u64, usize)>>,
    /// Total bytes `writei` accepts before coming up short ("disk full").
    capacity: AtomicUsize,
}

impl MemFs {
    /// A filesystem whose user memory starts at `user_base`.
    #[must_use]
    pub fn new(user_base: VirtualAddress, user_len: usize) -> Self {
        Self {
            user: HostUserMemory::new(user_base, user_len),
            inodes: SpinLock::new(BTreeMap::new()),
            locked: SpinLock::new(BTreeSet::new()),
            next_ino: AtomicUsize::new(1),
            begun: AtomicUsize::new(0),
            ended: AtomicUsize::new(0),
            open_ops: AtomicUsize::new(0),
            iputs: SpinLock::new(Vec::new()),
            writes: SpinLock::new(Vec::new()),
            capacity: AtomicUsize::new(usize::MAX),
        }
    }

    /// Create a file holding `data` and return a referenced inode.
    #[allow(clippy::missing_panics_doc)]
    pub fn create(&self, data: &[u8]) -> u32 {
        let ino = u32::try_from(self.next_ino.fetch_add(1, Ordering::Relaxed)).expect("inode numbers");
        self.inodes.lock().insert(
            ino,
            MemInode {
                data: data.to_vec(),
                refs: 1,
                nlink: 1,
            },
        );
        ino
    }

    /// Let the disk accept only `bytes` more bytes.
    pub fn set_capacity(&self, bytes: usize) {
        self.capacity.store(bytes, Ordering::Relaxed);
    }

    #[must_use]
    pub const fn user(&self) -> &HostUserMemory {
        &self.user
    }

    /// Contents of `ino`.
    ///
    /// # Panics
    /// Panics if the inode does not exist.
    #[must_use]
    pub fn contents(&self, ino: u32) -> Vec<u8> {
        self.inodes.lock()[&ino].data.clone()
    }

    /// In-memory references to `ino`; `0` once released.
    #[must_use]
    pub fn refs(&self, ino: u32) -> usize {
        self.inodes.lock().get(&ino).map_or(0, |i| i.refs)
    }

    /// Number of transactions begun and ended.
    #[must_use]
    pub fn transactions(&self) -> (usize, usize) {
        (self.begun.load(Ordering::SeqCst), self.ended.load(Ordering::SeqCst))
    }

    /// Inodes passed to `iput`, in order.
    #[must_use]
    pub fn iputs(&self) -> Vec<u32> {
        self.iputs.lock().clone()
    }

    /// `(offset, length)` of every `writei` call, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<(u64, usize)> {
        self.writes.lock().clone()
    }

    fn assert_locked(&self, ip: u32, op: &str) {
        assert!(self.locked.lock().contains(&ip), "{op}: inode {ip} not locked");
    }
}

impl Filesystem for MemFs {
    type Inode = u32;

    fn begin_op(&self) {
        self.begun.fetch_add(1, Ordering::SeqCst);
        self.open_ops.fetch_add(1, Ordering::SeqCst);
    }

    fn end_op(&self) {
        let before = self.open_ops.fetch_sub(1, Ordering::SeqCst);
        assert!(before > 0, "end_op without begin_op");
        self.ended.fetch_add(1, Ordering::SeqCst);
    }

    fn ilock(&self, ip: &u32) {
        while !self.locked.lock().insert(*ip) {
            std::thread::yield_now();
        }
    }

    fn iunlock(&self, ip: &u32) {
        assert!(self.locked.lock().remove(ip), "iunlock: inode {ip} not locked");
    }

    fn readi(&self, ip: &u32, mut dst: Dst<'_>, off: u64, n: usize) -> Result<usize, IoError> {
        self.assert_locked(*ip, "readi");
        let chunk = {
            let inodes = self.inodes.lock();
            let data = &inodes.get(ip).ok_or(IoError::Failed)?.data;
            let start = usize::try_from(off).map_or(data.len(), |o| o.min(data.len()));
            let end = start.saturating_add(n).min(data.len());
            data[start..end].to_vec()
        };
        dst.put(&self.user, 0, &chunk)?;
        Ok(chunk.len())
    }

    fn writei(&self, ip: &u32, src: Src<'_>, off: u64, n: usize) -> Result<usize, IoError> {
        self.assert_locked(*ip, "writei");
        assert!(self.open_ops.load(Ordering::SeqCst) > 0, "writei outside a transaction");
        let n = n.min(self.capacity.load(Ordering::Relaxed));
        let mut buf = vec![0; n];
        src.get(&self.user, 0, &mut buf)?;
        self.capacity
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| Some(c.saturating_sub(n)))
            .ok();
        self.writes.lock().push((off, n));

        let mut inodes = self.inodes.lock();
        let data = &mut inodes.get_mut(ip).ok_or(IoError::Failed)?.data;
        let off = usize::try_from(off).map_err(|_| IoError::Failed)?;
        if data.len() < off + n {
            data.resize(off + n, 0);
        }
        data[off..off + n].copy_from_slice(&buf);
        Ok(n)
    }

    fn stati(&self, ip: &u32) -> Stat {
        self.assert_locked(*ip, "stati");
        let inodes = self.inodes.lock();
        let inode = &inodes[ip];
        Stat {
            dev: 1,
            ino: *ip,
            kind: InodeType::File,
            nlink: inode.nlink,
            size: inode.data.len() as u64,
        }
    }

    fn iput(&self, ip: u32) {
        assert!(self.open_ops.load(Ordering::SeqCst) > 0, "iput outside a transaction");
        self.iputs.lock().push(ip);
        if let Some(inode) = self.inodes.lock().get_mut(&ip) {
            inode.refs -= 1;
        }
    }
}

/// A pipe over kernel buffers that records its closes.
#[derive(Debug, Default)]
pub struct MemPipe {
    buf: SpinLock<VecDeque<u8>>,
    closes: SpinLock<Vec<bool>>,
}

impl MemPipe {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The `writable` flag of every close, in order.
    #[must_use]
    pub fn closes(&self) -> Vec<bool> {
        self.closes.lock().clone()
    }
}

impl Pipe for MemPipe {
    fn read(&self, mut dst: Dst<'_>, n: usize) -> Result<usize, IoError> {
        let bytes: Vec<u8> = {
            let mut buf = self.buf.lock();
            let n = n.min(buf.len());
            buf.drain(..n).collect()
        };
        dst.put(&NoUser, 0, &bytes)?;
        Ok(bytes.len())
    }

    fn write(&self, src: Src<'_>, n: usize) -> Result<usize, IoError> {
        let mut bytes = vec![0; n];
        src.get(&NoUser, 0, &mut bytes)?;
        self.buf.lock().extend(bytes);
        Ok(n)
    }

    fn close(&self, writable: bool) {
        self.closes.lock().push(writable);
    }
}

/// User memory that has nothing mapped.
struct NoUser;

impl UserMemory for NoUser {
    fn copy_out(&self, _dst: VirtualAddress, _src: &[u8]) -> Result<(), IoError> {
        Err(IoError::BadAddress)
    }

    fn copy_in(&self, _dst: &mut [u8], _src: VirtualAddress) -> Result<(), IoError> {
        Err(IoError::BadAddress)
    }
}
