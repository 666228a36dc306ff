use crate::{Dst, IoError, Src};
use kernel_info::param;

/// The on-disk filesystem and its log, as far as open files need them.
pub trait Filesystem: Sync {
    /// Reference to an in-memory inode, as returned by the path lookup.
    ///
    /// Cloning does not take another filesystem reference; the file table
    /// holds exactly one per open file and gives it back with
    /// [`iput`](Self::iput).
    type Inode: Clone + Send + Sync;

    /// Upper bound of blocks a single transaction may dirty.
    const MAX_OP_BLOCKS: usize = param::MAX_OP_BLOCKS;

    /// Block size in bytes.
    const BLOCK_SIZE: usize = param::BLOCK_SIZE;

    /// Start a log transaction (may wait for log space).
    fn begin_op(&self);

    /// Finish the transaction started by the matching `begin_op`.
    fn end_op(&self);

    fn ilock(&self, ip: &Self::Inode);

    fn iunlock(&self, ip: &Self::Inode);

    /// Read up to `n` bytes at `off`. Caller holds the inode lock.
    ///
    /// # Errors
    /// Copy failures to `dst` or device errors.
    fn readi(&self, ip: &Self::Inode, dst: Dst<'_>, off: u64, n: usize) -> Result<usize, IoError>;

    /// Write up to `n` bytes at `off`. Caller holds the inode lock inside a
    /// transaction. A count below `n` means the disk filled up.
    ///
    /// # Errors
    /// Copy failures from `src` or device errors.
    fn writei(&self, ip: &Self::Inode, src: Src<'_>, off: u64, n: usize) -> Result<usize, IoError>;

    /// Metadata snapshot. Caller holds the inode lock.
    fn stati(&self, ip: &Self::Inode) -> Stat;

    /// Drop the reference; must run inside a transaction because it may free
    /// the inode on disk.
    fn iput(&self, ip: Self::Inode);
}

/// A running log transaction; ends on drop.
#[must_use = "the transaction ends as soon as the guard is dropped"]
pub struct Transaction<'f, F: Filesystem + ?Sized> {
    fs: &'f F,
}

impl<'f, F: Filesystem + ?Sized> Transaction<'f, F> {
    pub fn begin(fs: &'f F) -> Self {
        fs.begin_op();
        Self { fs }
    }
}

impl<F: Filesystem + ?Sized> Drop for Transaction<'_, F> {
    fn drop(&mut self) {
        self.fs.end_op();
    }
}

/// Holds an inode's sleep lock; unlocks on drop.
#[must_use = "the inode is unlocked as soon as the guard is dropped"]
pub struct InodeLock<'f, F: Filesystem + ?Sized> {
    fs: &'f F,
    ip: &'f F::Inode,
}

impl<'f, F: Filesystem + ?Sized> InodeLock<'f, F> {
    pub fn new(fs: &'f F, ip: &'f F::Inode) -> Self {
        fs.ilock(ip);
        Self { fs, ip }
    }
}

impl<F: Filesystem + ?Sized> Drop for InodeLock<'_, F> {
    fn drop(&mut self) {
        self.fs.iunlock(self.ip);
    }
}

#[repr(i16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InodeType {
    Directory = 1,
    File = 2,
    Device = 3,
}

/// Inode metadata as returned by `fstat`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Stat {
    /// File system's disk device.
    pub dev: i32,
    pub ino: u32,
    pub kind: InodeType,
    pub nlink: i16,
    /// Size in bytes.
    pub size: u64,
}

impl Stat {
    /// Size of the user-visible record.
    pub const SIZE: usize = 24;

    /// The record as user space sees it: C layout, little endian.
    ///
    /// ```text
    /// 0      4      8    10     12     16             24
    /// | dev  | ino  |type|nlink | pad  |     size     |
    /// ```
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0; Self::SIZE];
        out[0..4].copy_from_slice(&self.dev.to_le_bytes());
        out[4..8].copy_from_slice(&self.ino.to_le_bytes());
        out[8..10].copy_from_slice(&(self.kind as i16).to_le_bytes());
        out[10..12].copy_from_slice(&self.nlink.to_le_bytes());
        out[16..24].copy_from_slice(&self.size.to_le_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_layout() {
        let st = Stat {
            dev: 1,
            ino: 0x0102_0304,
            kind: InodeType::File,
            nlink: 2,
            size: 0x1_0000_0001,
        };
        let b = st.to_bytes();
        assert_eq!(&b[0..4], &[1, 0, 0, 0]);
        assert_eq!(&b[4..8], &[4, 3, 2, 1]);
        assert_eq!(&b[8..12], &[2, 0, 2, 0]);
        assert_eq!(&b[12..16], &[0; 4]);
        assert_eq!(&b[16..24], &[1, 0, 0, 0, 1, 0, 0, 0]);
    }
}
