use crate::IoError;
use kernel_memory_addresses::VirtualAddress;

/// Where read data goes: user memory of the current process, or a kernel
/// buffer.
#[derive(Debug)]
pub enum Dst<'a> {
    User(VirtualAddress),
    Kernel(&'a mut [u8]),
}

/// Where written data comes from.
#[derive(Debug, Copy, Clone)]
pub enum Src<'a> {
    User(VirtualAddress),
    Kernel(&'a [u8]),
}

/// Copies between the kernel and the current process's address space.
pub trait UserMemory {
    /// Copy `src` to user address `dst`.
    ///
    /// # Errors
    /// [`IoError::BadAddress`] if any byte of the destination is not mapped
    /// writable for the user.
    fn copy_out(&self, dst: VirtualAddress, src: &[u8]) -> Result<(), IoError>;

    /// Fill `dst` from user address `src`.
    ///
    /// # Errors
    /// [`IoError::BadAddress`] if any byte of the source is not mapped
    /// readable for the user.
    fn copy_in(&self, dst: &mut [u8], src: VirtualAddress) -> Result<(), IoError>;
}

impl Dst<'_> {
    /// Store `data` at byte `at` of the destination.
    ///
    /// # Errors
    /// [`IoError::BadAddress`] if the destination is too small or unmapped.
    pub fn put(&mut self, user: &(impl UserMemory + ?Sized), at: usize, data: &[u8]) -> Result<(), IoError> {
        match self {
            Self::User(va) => user.copy_out(*va + at as u64, data),
            Self::Kernel(buf) => {
                let dst = buf.get_mut(at..at + data.len()).ok_or(IoError::BadAddress)?;
                dst.copy_from_slice(data);
                Ok(())
            }
        }
    }
}

impl<'a> Src<'a> {
    /// The source starting `n` bytes further in.
    ///
    /// # Panics
    /// Panics if a kernel buffer is shorter than `n`.
    #[must_use]
    pub fn skip(self, n: usize) -> Self {
        match self {
            Self::User(va) => Self::User(va + n as u64),
            Self::Kernel(buf) => Self::Kernel(&buf[n..]),
        }
    }

    /// Load `dst.len()` bytes starting at byte `at` of the source.
    ///
    /// # Errors
    /// [`IoError::BadAddress`] if the source is too small or unmapped.
    pub fn get(&self, user: &(impl UserMemory + ?Sized), at: usize, dst: &mut [u8]) -> Result<(), IoError> {
        match self {
            Self::User(va) => user.copy_in(dst, *va + at as u64),
            Self::Kernel(buf) => {
                let src = buf.get(at..at + dst.len()).ok_or(IoError::BadAddress)?;
                dst.copy_from_slice(src);
                Ok(())
            }
        }
    }
}
