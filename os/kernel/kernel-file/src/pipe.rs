use crate::{Dst, IoError, Src};

/// One end-agnostic view of a pipe.
///
/// The same pipe object backs both the read and the write file; `close`
/// tells it which end went away.
pub trait Pipe: Send + Sync {
    /// # Errors
    /// Propagates copy failures to the destination.
    fn read(&self, dst: Dst<'_>, n: usize) -> Result<usize, IoError>;

    /// # Errors
    /// [`IoError::Closed`] when no reader is left.
    fn write(&self, src: Src<'_>, n: usize) -> Result<usize, IoError>;

    fn close(&self, writable: bool);
}
