use super::{Filesystem, FilesystemSession};
use crate::device::Device;
use crate::entry::Entry;
use crate::{Lib, Process, Result};

use std::future::Future;

/// Seeds a [`Filesystem`] image before boot.
///
/// Entries are created through a privileged session, so images destined for
/// read-only mounts can be populated too.
///
/// ```
/// # fn main() -> vkernel::Result {
/// let image = vkernel::FilesystemBuilder::new()
///     .directory("/etc", 0o755)?
///     .file("/etc/hostname", 0o644, "localhost\n")?
///     .symlink("/etc/name", "hostname")?
///     .build();
/// # let _ = image;
/// # Ok(())
/// # }
/// ```
pub struct FilesystemBuilder {
    filesystem: Filesystem,
    session: FilesystemSession,
}

impl FilesystemBuilder {
    pub fn new() -> FilesystemBuilder {
        FilesystemBuilder::from(Filesystem::new())
    }

    /// Permission bits of the root directory.
    pub fn root_mode(&mut self, mode: u32) -> &mut Self {
        if let Some(mut root) = self.filesystem.get_mut("/") {
            root.mode = mode & crate::flags::mode::PERMISSIONS;
        }
        self
    }

    pub fn create(&mut self, pathname: &str, entry: Entry) -> Result<&mut Self> {
        self.session.create(pathname, entry)?;
        Ok(self)
    }

    pub fn directory(&mut self, pathname: &str, mode: u32) -> Result<&mut Self> {
        self.create(pathname, Entry::directory(mode))
    }

    pub fn file(
        &mut self,
        pathname: &str,
        mode: u32,
        data: impl Into<Vec<u8>>,
    ) -> Result<&mut Self> {
        self.create(pathname, Entry::file(mode, data))
    }

    pub fn symlink(&mut self, pathname: &str, target: &str) -> Result<&mut Self> {
        self.create(pathname, Entry::symlink(target))
    }

    pub fn executable<F, Fut>(&mut self, pathname: &str, mode: u32, f: F) -> Result<&mut Self>
    where
        F: Fn(Process, Lib) -> Fut + 'static,
        Fut: Future<Output = Result> + 'static,
    {
        self.create(pathname, Entry::executable(mode, f))
    }

    pub fn device<D: Device + 'static>(
        &mut self,
        pathname: &str,
        mode: u32,
        device: D,
    ) -> Result<&mut Self> {
        self.create(pathname, Entry::device(mode, device))
    }

    pub fn mount(&mut self, pathname: &str, target: Filesystem, mode: u32) -> Result<&mut Self> {
        self.create(pathname, Entry::mount(target, mode))
    }

    /// Handle to the filesystem being built.
    pub fn build(&self) -> Filesystem {
        self.filesystem.clone()
    }
}

impl Default for FilesystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Filesystem> for FilesystemBuilder {
    fn from(filesystem: Filesystem) -> Self {
        let session = filesystem.session().privileged();
        FilesystemBuilder {
            filesystem,
            session,
        }
    }
}
