use crate::{Dst, FileError, IoError, Src};
use kernel_info::param::NDEV;
use kernel_sync::{Cpu, SpinLock};

/// Driver read entry point.
pub type DeviceRead = fn(Dst<'_>, usize) -> Result<usize, IoError>;

/// Driver write entry point.
pub type DeviceWrite = fn(Src<'_>, usize) -> Result<usize, IoError>;

/// Entry points of one character device.
#[derive(Debug, Copy, Clone, Default)]
pub struct DeviceSwitch {
    pub read: Option<DeviceRead>,
    pub write: Option<DeviceWrite>,
}

/// Maps major device numbers to drivers.
pub struct DeviceTable<'c> {
    cpu: &'c dyn Cpu,
    entries: SpinLock<[DeviceSwitch; NDEV]>,
}

impl<'c> DeviceTable<'c> {
    #[must_use]
    pub fn new(cpu: &'c dyn Cpu) -> Self {
        Self {
            cpu,
            entries: SpinLock::named("devsw", [DeviceSwitch::default(); NDEV]),
        }
    }

    /// Install the driver for `major`, replacing any previous one.
    ///
    /// # Errors
    /// [`FileError::NoDevice`] if `major` is not below `NDEV`.
    pub fn register(&self, major: usize, switch: DeviceSwitch) -> Result<(), FileError> {
        let mut entries = self.entries.lock_irq(self.cpu);
        *entries.get_mut(major).ok_or(FileError::NoDevice)? = switch;
        Ok(())
    }

    pub fn unregister(&self, major: usize) {
        if let Some(e) = self.entries.lock_irq(self.cpu).get_mut(major) {
            *e = DeviceSwitch::default();
        }
    }

    pub(crate) fn reader(&self, major: usize) -> Option<DeviceRead> {
        self.entries.lock_irq(self.cpu).get(major)?.read
    }

    pub(crate) fn writer(&self, major: usize) -> Option<DeviceWrite> {
        self.entries.lock_irq(self.cpu).get(major)?.write
    }
}
