use crate::config::Parameters;
use crate::device::Storage;
use crate::kernel::Emulator;
use crate::Result;

/// A builder that can be used to configure an [`Emulator`].
///
/// Every kernel parameter has a setter; parameters can also be set by their
/// dotted name with [`Builder::parameter`].
///
/// ## Examples
///
/// ```
/// let emulator = vkernel::Builder::new().build();
/// ```
///
/// Attach storage and adjust the boot parameters:
///
/// ```
/// use vkernel::{FilesystemBuilder, Storage};
///
/// # fn main() -> vkernel::Result {
/// let image = FilesystemBuilder::new().directory("/dev", 0o755)?.build();
///
/// let emulator = vkernel::Builder::new()
///     .hostname("box")
///     .init("/bin/sh")
///     .parameter("fs.specialdir.tmp", "/var/tmp")?
///     .storage(Storage::new(vec![image]))
///     .build();
/// # let _ = emulator;
/// # Ok(())
/// # }
/// ```
///
/// A builder can be reused. Emulators built from it share the attached
/// partitions, so changes made by one are visible to the others.
pub struct Builder {
    params: Parameters,
    storage: Vec<Storage>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self {
            params: Parameters::default(),
            storage: Vec::new(),
        }
    }

    pub fn hostname(&mut self, value: impl Into<String>) -> &mut Self {
        self.params.hostname = value.into();
        self
    }

    pub fn os_type(&mut self, value: impl Into<String>) -> &mut Self {
        self.params.os_type = value.into();
        self
    }

    pub fn os_release(&mut self, value: impl Into<String>) -> &mut Self {
        self.params.os_release = value.into();
        self
    }

    /// Program run by [`Emulator::boot`].
    pub fn init(&mut self, value: impl Into<String>) -> &mut Self {
        self.params.init = value.into();
        self
    }

    /// Terminal inherited by every process. Processes spawned with an empty
    /// terminal start without standard descriptors.
    pub fn tty(&mut self, value: impl Into<String>) -> &mut Self {
        self.params.tty = value.into();
        self
    }

    /// Path whose presence marks a partition as bootable.
    pub fn boot_flag(&mut self, value: impl Into<String>) -> &mut Self {
        self.params.boot_flag = value.into();
        self
    }

    pub fn proc_dir(&mut self, value: impl Into<String>) -> &mut Self {
        self.params.proc_dir = value.into();
        self
    }

    pub fn dev_dir(&mut self, value: impl Into<String>) -> &mut Self {
        self.params.dev_dir = value.into();
        self
    }

    pub fn tmp_dir(&mut self, value: impl Into<String>) -> &mut Self {
        self.params.tmp_dir = value.into();
        self
    }

    pub fn sys_dir(&mut self, value: impl Into<String>) -> &mut Self {
        self.params.sys_dir = value.into();
        self
    }

    /// Sets a parameter by dotted name, e.g. `kernel.hostname`.
    pub fn parameter(&mut self, key: &str, value: impl Into<String>) -> Result<&mut Self> {
        self.params.set(key, value)?;
        Ok(self)
    }

    /// Attaches a storage device. Devices are searched for a bootable
    /// partition in the order they were attached.
    pub fn storage(&mut self, storage: Storage) -> &mut Self {
        self.storage.push(storage);
        self
    }

    pub fn build(&self) -> Emulator {
        Emulator::new(self.params.clone(), self.storage.clone())
    }
}
