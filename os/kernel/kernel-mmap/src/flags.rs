bitflags::bitflags! {
    /// Requested access to a mapping (`PROT_*`).
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct Prot: u32 {
        const READ  = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC  = 1 << 2;
    }
}

bitflags::bitflags! {
    /// Sharing mode of a mapping (`MAP_*`).
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct MapFlags: u32 {
        /// Stores reach the file when the pages are unmapped.
        const SHARED  = 0x01;
        /// Stores stay in the process's private copy.
        const PRIVATE = 0x02;
    }
}

bitflags::bitflags! {
    /// Leaf page-table entry bits.
    ///
    /// `ACCESSED` and `DIRTY` are set by the MMU; the rest by the kernel.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct PteFlags: u64 {
        const VALID    = 1 << 0;
        const READ     = 1 << 1;
        const WRITE    = 1 << 2;
        const EXEC     = 1 << 3;
        /// Accessible from user mode.
        const USER     = 1 << 4;
        const ACCESSED = 1 << 6;
        /// Written since it was mapped.
        const DIRTY    = 1 << 7;
    }
}

impl PteFlags {
    /// User-accessible leaf bits granting exactly `prot`.
    #[must_use]
    pub fn user(prot: Prot) -> Self {
        let mut flags = Self::VALID | Self::USER;
        flags.set(Self::READ, prot.contains(Prot::READ));
        flags.set(Self::WRITE, prot.contains(Prot::WRITE));
        flags.set(Self::EXEC, prot.contains(Prot::EXEC));
        flags
    }
}

/// The kind of access that faulted.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Execute,
}

impl Access {
    /// Protection a mapping needs to allow this access.
    #[must_use]
    pub const fn required(self) -> Prot {
        match self {
            Self::Read => Prot::READ,
            Self::Write => Prot::WRITE,
            Self::Execute => Prot::EXEC,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_pte_mirrors_prot() {
        let f = PteFlags::user(Prot::READ | Prot::EXEC);
        assert_eq!(f, PteFlags::VALID | PteFlags::USER | PteFlags::READ | PteFlags::EXEC);
        assert!(!f.contains(PteFlags::DIRTY));
    }

    #[test]
    fn access_maps_to_prot_bit() {
        assert!((Prot::READ | Prot::WRITE).contains(Access::Write.required()));
        assert!(!Prot::READ.contains(Access::Execute.required()));
    }
}
