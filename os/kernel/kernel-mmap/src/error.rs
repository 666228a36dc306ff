use crate::PageTableError;
use kernel_file::FileError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmaError {
    #[error("address is not inside any mapping")]
    NotMapped,
    /// Only unmapping a prefix (or all) of a mapping is supported.
    #[error("unmap would split the mapping")]
    Unsupported,
    #[error("no room for the region in the address space")]
    NoSpace,
    #[error("no free mapping records")]
    PoolExhausted,
    #[error("zero-length range")]
    EmptyRange,
    #[error("protection not permitted by the file or mapping")]
    AccessDenied,
    #[error("out of physical pages")]
    OutOfMemory,
    #[error(transparent)]
    PageTable(#[from] PageTableError),
    #[error(transparent)]
    File(#[from] FileError),
}
