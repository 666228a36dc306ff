/// Failure reported by a collaborator (filesystem, pipe, device, user copy).
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IoError {
    #[error("bad address")]
    BadAddress,
    #[error("other end of the pipe is closed")]
    Closed,
    #[error("i/o failed")]
    Failed,
}

/// Errors of file-table operations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FileError {
    #[error("file not open for reading")]
    NotReadable,
    #[error("file not open for writing")]
    NotWritable,
    #[error("file is not backed by an inode")]
    NotInode,
    #[error("no driver for device")]
    NoDevice,
    #[error("bad destination address")]
    BadAddress,
    #[error(transparent)]
    Io(#[from] IoError),
    /// An inode write stopped early. The first `written` bytes are on disk.
    #[error("short write: only {written} bytes written")]
    PartialWrite { written: usize },
}
