use crate::device::Device;
use crate::flags::mode;
use crate::fs::Filesystem;
use crate::{Lib, Process, Result};

use futures::future::LocalBoxFuture;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::fmt;
use std::future::Future;
use std::rc::Rc;

pub type Uid = u32;
pub type Gid = u32;

/// Program code started by `exec`.
///
/// Executables are native closures rather than interpreted images. The
/// returned future is boxed so that entries for different programs share
/// one type.
pub type EntryPoint = Rc<dyn Fn(Process, Lib) -> LocalBoxFuture<'static, Result>>;

/// One addressable object in a [`Filesystem`].
#[derive(Clone)]
pub struct Entry {
    pub owner: Uid,
    pub group: Gid,
    /// Permission bits, `rwxrwxrwx`.
    pub mode: u32,
    /// Tombstone marker, see [`Process::unlink`](crate::Process::unlink).
    pub(crate) deleted: bool,
    pub kind: EntryKind,
}

#[derive(Clone)]
pub enum EntryKind {
    Directory,
    RegularFile {
        data: Vec<u8>,
    },
    ExecutableFile {
        /// Bytes shown to `read`; filled with a placeholder image on first
        /// read when absent.
        data: Option<Vec<u8>>,
        /// Protected executables can be run but not opened for reading.
        protected: bool,
        entry_point: EntryPoint,
    },
    DeviceFile {
        device: Rc<dyn Device>,
    },
    SymbolicLink {
        target: String,
    },
    MountedFilesystem {
        target: Filesystem,
    },
}

impl Entry {
    pub fn new(kind: EntryKind, mode: u32) -> Entry {
        Entry {
            owner: 0,
            group: 0,
            mode: mode & mode::PERMISSIONS,
            deleted: false,
            kind,
        }
    }

    pub fn directory(mode: u32) -> Entry {
        Entry::new(EntryKind::Directory, mode)
    }

    pub fn file(mode: u32, data: impl Into<Vec<u8>>) -> Entry {
        Entry::new(EntryKind::RegularFile { data: data.into() }, mode)
    }

    /// An executable whose program is `f`.
    pub fn executable<F, Fut>(mode: u32, f: F) -> Entry
    where
        F: Fn(Process, Lib) -> Fut + 'static,
        Fut: Future<Output = Result> + 'static,
    {
        let entry_point: EntryPoint =
            Rc::new(move |process, lib| -> LocalBoxFuture<'static, Result> {
                Box::pin(f(process, lib))
            });

        Entry::new(
            EntryKind::ExecutableFile {
                data: None,
                protected: false,
                entry_point,
            },
            mode,
        )
    }

    pub fn device<D: Device + 'static>(mode: u32, device: D) -> Entry {
        Entry::new(
            EntryKind::DeviceFile {
                device: Rc::new(device),
            },
            mode,
        )
    }

    pub fn symlink(target: impl Into<String>) -> Entry {
        Entry::new(
            EntryKind::SymbolicLink {
                target: target.into(),
            },
            0o777,
        )
    }

    pub fn mount(target: Filesystem, mode: u32) -> Entry {
        Entry::new(EntryKind::MountedFilesystem { target }, mode)
    }

    pub fn owned_by(mut self, owner: Uid, group: Gid) -> Entry {
        self.owner = owner;
        self.group = group;
        self
    }

    /// Marks an executable as protected. Other kinds are returned as is.
    pub fn protected(mut self) -> Entry {
        if let EntryKind::ExecutableFile { protected, .. } = &mut self.kind {
            *protected = true;
        }
        self
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Type bits for `stat`.
    pub(crate) fn type_bits(&self) -> u32 {
        match self.kind {
            EntryKind::Directory | EntryKind::MountedFilesystem { .. } => mode::S_IFDIR,
            EntryKind::RegularFile { .. } | EntryKind::ExecutableFile { .. } => mode::S_IFREG,
            EntryKind::DeviceFile { .. } => mode::S_IFCHR,
            EntryKind::SymbolicLink { .. } => mode::S_IFLNK,
        }
    }

    pub(crate) fn size(&self) -> u64 {
        match &self.kind {
            EntryKind::RegularFile { data } => data.len() as u64,
            EntryKind::ExecutableFile { data, .. } => data.as_ref().map_or(0, |d| d.len() as u64),
            EntryKind::SymbolicLink { target } => target.len() as u64,
            EntryKind::Directory
            | EntryKind::DeviceFile { .. }
            | EntryKind::MountedFilesystem { .. } => 0,
        }
    }

    /// Whether any of `bits` (an `rwx` triple) is granted to any class.
    ///
    /// Owner, group and other are folded together; the caller's identity is
    /// not compared with the entry's owner yet.
    pub(crate) fn permits(&self, bits: u32) -> bool {
        let combined = (self.mode >> 6) | (self.mode >> 3) | self.mode;
        combined & bits & 0o7 != 0
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("owner", &self.owner)
            .field("group", &self.group)
            .field("mode", &format_args!("{:o}", self.mode))
            .field("deleted", &self.deleted)
            .field("kind", &self.kind)
            .finish()
    }
}

impl fmt::Debug for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Directory => f.write_str("Directory"),
            EntryKind::RegularFile { data } => f
                .debug_struct("RegularFile")
                .field("len", &data.len())
                .finish(),
            EntryKind::ExecutableFile {
                data, protected, ..
            } => f
                .debug_struct("ExecutableFile")
                .field("len", &data.as_ref().map(Vec::len))
                .field("protected", protected)
                .finish_non_exhaustive(),
            EntryKind::DeviceFile { .. } => f.write_str("DeviceFile"),
            EntryKind::SymbolicLink { target } => f
                .debug_struct("SymbolicLink")
                .field("target", target)
                .finish(),
            EntryKind::MountedFilesystem { target } => f
                .debug_struct("MountedFilesystem")
                .field("target", target)
                .finish(),
        }
    }
}

/// Bytes that look like an ELF executable, standing in for the content of
/// executables that have none.
///
/// Seeded from `seed` (the path) so the same executable always reads the
/// same.
pub(crate) fn placeholder_image(seed: &str) -> Vec<u8> {
    const IDENT: [u8; 16] = [
        0x7f, b'E', b'L', b'F', 0x02, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x01,
    ];

    let seed = seed.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    });
    let mut rng = SmallRng::seed_from_u64(seed);

    let rows = rng.random_range(0..100usize);
    let mut image = Vec::with_capacity(IDENT.len() + rows * 16);
    image.extend_from_slice(&IDENT);

    for _ in 0..rows * 2 {
        image.extend_from_slice(&[
            rng.random(),
            rng.random(),
            rng.random_range(0..=2),
            rng.random_range(0..=1),
            0,
            0,
            0,
            0,
        ]);
    }

    image
}
