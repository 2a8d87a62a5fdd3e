//! Processes and the system calls they issue.
//!
//! A [`Process`] owns a descriptor table, a filesystem session and an
//! environment. System calls resolve paths through the session on every
//! call; descriptors remember a path, not an entry, so a rename or delete
//! between two reads changes what the second one sees.

mod userland;
pub use userland::{Io, Lib, Paths};

use crate::config::Utsname;
use crate::device::Device;
use crate::entry::{self, Entry, EntryKind, Gid, Uid};
use crate::flags::{mode, OpenFlags, UnlinkFlags};
use crate::fs::{FilesystemSession, Lookup, Resolved};
use crate::kernel::Kernel;
use crate::{path, Error, Result, TRACING_TARGET};

use bytes::Bytes;
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use tracing::Instrument;

pub type Pid = u32;
pub type Fd = u32;

pub const STDIN: Fd = 0;
pub const STDOUT: Fd = 1;
pub const STDERR: Fd = 2;

/// Environment shared between a process and the children it spawns, until
/// one of them calls `exec`.
type Env = Rc<RefCell<IndexMap<String, String>>>;

/// An open file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Never reused within a process, even after close.
    pub id: Fd,
    /// Absolute path given at open time, resolved again on every access.
    pub pathname: String,
    pub flags: OpenFlags,
    pub offset: usize,
}

/// File status, derived from an entry on demand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stat {
    /// Permission bits OR'd with one of the `S_IF*` type bits.
    pub mode: u32,
    pub owner: Uid,
    pub group: Gid,
    pub size: u64,
}

impl Stat {
    pub fn is_dir(&self) -> bool {
        self.mode & mode::S_IFMT == mode::S_IFDIR
    }

    pub fn is_file(&self) -> bool {
        self.mode & mode::S_IFMT == mode::S_IFREG
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & mode::S_IFMT == mode::S_IFLNK
    }

    pub fn is_char_device(&self) -> bool {
        self.mode & mode::S_IFMT == mode::S_IFCHR
    }

    pub fn permissions(&self) -> u32 {
        self.mode & mode::PERMISSIONS
    }
}

impl From<&Entry> for Stat {
    fn from(entry: &Entry) -> Stat {
        Stat {
            mode: entry.mode | entry.type_bits(),
            owner: entry.owner,
            group: entry.group,
            size: entry.size(),
        }
    }
}

/// A process in the kernel's process tree.
///
/// Handles are cheap to clone and refer to the same process.
#[derive(Clone)]
pub struct Process {
    inner: Rc<Inner>,
}

struct Inner {
    kernel: Rc<Kernel>,
    id: Pid,
    /// The program currently running, replaced by `exec`.
    name: RefCell<String>,
    tty: String,
    uid: Uid,
    gid: Gid,
    session: RefCell<FilesystemSession>,
    fd: RefCell<Vec<FileDescriptor>>,
    next_fd: Cell<Fd>,
    args: RefCell<Vec<String>>,
    env: RefCell<Env>,
    children: RefCell<Vec<Process>>,
}

/// Where a read gets its bytes, decided under the entry borrow.
enum Source {
    Chunk(Bytes),
    Device(Rc<dyn Device>),
}

/// Where a write went, decided under the entry borrow.
enum Sink {
    File(usize),
    Device(Rc<dyn Device>),
}

impl Process {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        kernel: Rc<Kernel>,
        id: Pid,
        name: String,
        tty: String,
        uid: Uid,
        gid: Gid,
        session: FilesystemSession,
        env: IndexMap<String, String>,
    ) -> Process {
        Process::with_env(kernel, id, name, tty, uid, gid, session, Rc::new(RefCell::new(env)))
    }

    #[allow(clippy::too_many_arguments)]
    fn with_env(
        kernel: Rc<Kernel>,
        id: Pid,
        name: String,
        tty: String,
        uid: Uid,
        gid: Gid,
        session: FilesystemSession,
        env: Env,
    ) -> Process {
        Process {
            inner: Rc::new(Inner {
                kernel,
                id,
                name: RefCell::new(name),
                tty,
                uid,
                gid,
                session: RefCell::new(session),
                fd: RefCell::new(Vec::new()),
                next_fd: Cell::new(0),
                args: RefCell::new(Vec::new()),
                env: RefCell::new(env),
                children: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> Pid {
        self.inner.id
    }

    pub fn name(&self) -> String {
        self.inner.name.borrow().clone()
    }

    pub fn tty(&self) -> &str {
        &self.inner.tty
    }

    pub fn uid(&self) -> Uid {
        self.inner.uid
    }

    pub fn gid(&self) -> Gid {
        self.inner.gid
    }

    pub fn args(&self) -> Vec<String> {
        self.inner.args.borrow().clone()
    }

    /// Children currently running.
    pub fn children(&self) -> Vec<Process> {
        self.inner.children.borrow().clone()
    }

    /// Snapshot of the descriptor table.
    pub fn descriptors(&self) -> Vec<FileDescriptor> {
        self.inner.fd.borrow().clone()
    }

    pub fn session(&self) -> FilesystemSession {
        self.inner.session.borrow().clone()
    }

    pub(crate) fn set_session(&self, session: FilesystemSession) {
        *self.inner.session.borrow_mut() = session;
    }

    /// Makes a relative path absolute against `PWD`.
    ///
    /// Absolute paths are passed through untouched so that the session can
    /// enforce the path contract on them.
    fn qualify(&self, pathname: &str) -> String {
        if pathname.is_empty() || pathname.starts_with(path::SEPARATOR) {
            pathname.to_owned()
        } else {
            path::absolute(pathname, &self.getcwd())
        }
    }

    fn lookup(&self, pathname: &str, lookup: Lookup) -> Result<Resolved> {
        self.session().lookup(&self.qualify(pathname), lookup)
    }

    fn descriptor(&self, fd: Fd) -> Result<FileDescriptor> {
        self.inner
            .fd
            .borrow()
            .iter()
            .find(|d| d.id == fd)
            .cloned()
            .ok_or(Error::BadDescriptor)
    }

    /// Resolves the path behind a descriptor. Tombstoned entries stay
    /// reachable so that unlinked files can still be read.
    fn resolve_descriptor(&self, descriptor: &FileDescriptor, lookup: Lookup) -> Result<Resolved> {
        self.session()
            .lookup(&descriptor.pathname, lookup.with_tombstones())
    }

    fn proc_dir(&self) -> String {
        path::normalize(&format!("{}/{}", self.inner.kernel.params.proc_dir, self.id()))
    }

    fn fd_link(&self, fd: Fd) -> String {
        format!("{}/fd/{fd}", self.proc_dir())
    }

    /// Mirrors the descriptor table under the process directory. Failures
    /// never fail the system call that triggered them.
    fn bookkeeping(&self, action: &str, f: impl FnOnce(&FilesystemSession) -> Result) {
        let session = self.session().privileged();
        if let Err(error) = f(&session) {
            tracing::debug!(
                target: TRACING_TARGET,
                pid = self.id(),
                action,
                %error,
                "bookkeeping skipped"
            );
        }
    }

    pub fn open(&self, pathname: &str, flags: OpenFlags) -> Result<Fd> {
        let pathname = self.qualify(pathname);
        let session = self.session();

        let resolved = match session.resolve(&pathname, true) {
            Ok(resolved) => resolved,
            Err(Error::NotFound(_)) if flags.contains(OpenFlags::WRITE) => {
                let parent = session.resolve(&path::parent(&pathname), true)?;
                let writable = parent.entry()?.permits(0o2);
                if !writable {
                    return Err(Error::PermissionDenied);
                }

                let file = Entry::file(0o666, Vec::new()).owned_by(self.uid(), self.gid());
                session.create(&pathname, file)?;
                session.resolve(&pathname, true)?
            }
            Err(error) => return Err(error),
        };

        {
            let entry = resolved.entry()?;
            if entry.is_directory() {
                return Err(Error::IsADirectory(pathname));
            }
            if flags.contains(OpenFlags::READ) {
                if !entry.permits(0o4) {
                    return Err(Error::PermissionDenied);
                }
                if let EntryKind::ExecutableFile { protected: true, .. } = entry.kind {
                    return Err(Error::PermissionDenied);
                }
            }
            if flags.contains(OpenFlags::WRITE) && !entry.permits(0o2) {
                return Err(Error::PermissionDenied);
            }
        }

        let id = self.inner.next_fd.get();
        self.inner.next_fd.set(id + 1);

        let link = Entry::new(
            EntryKind::SymbolicLink {
                target: pathname.clone(),
            },
            0o700,
        )
        .owned_by(self.uid(), self.gid());
        self.bookkeeping("open", |session| session.create(&self.fd_link(id), link));

        tracing::trace!(
            target: TRACING_TARGET,
            pid = self.id(),
            fd = id,
            %pathname,
            ?flags,
            "open"
        );
        self.inner.fd.borrow_mut().push(FileDescriptor {
            id,
            pathname,
            flags,
            offset: 0,
        });

        Ok(id)
    }

    pub fn close(&self, fd: Fd) -> Result {
        self.descriptor(fd)?;

        self.bookkeeping("close", |session| session.delete(&self.fd_link(fd), false));
        self.inner.fd.borrow_mut().retain(|d| d.id != fd);

        Ok(())
    }

    /// Moves the cursor of `fd`. The offset is not checked against the
    /// size of the file.
    pub fn seek(&self, fd: Fd, offset: usize) -> Result {
        let mut table = self.inner.fd.borrow_mut();
        let descriptor = table
            .iter_mut()
            .find(|d| d.id == fd)
            .ok_or(Error::BadDescriptor)?;
        descriptor.offset = offset;
        Ok(())
    }

    /// Reads up to `count` bytes from `fd`.
    ///
    /// Files are read at the descriptor's offset, which advances by the
    /// number of bytes returned. Devices are read as a stream; the call
    /// suspends until the device produces input.
    pub async fn read(&self, fd: Fd, count: usize) -> Result<Bytes> {
        let descriptor = self.descriptor(fd)?;
        if !descriptor.flags.contains(OpenFlags::READ) {
            return Err(Error::BadDescriptor);
        }

        let resolved = self.resolve_descriptor(&descriptor, Lookup::FOLLOW)?;
        let source = {
            let mut entry = resolved.entry_mut_unchecked()?;
            match &mut entry.kind {
                EntryKind::Directory => return Err(Error::IsADirectory(descriptor.pathname)),
                EntryKind::RegularFile { data } => {
                    Source::Chunk(window(data, descriptor.offset, count))
                }
                EntryKind::ExecutableFile { data, .. } => {
                    let data =
                        data.get_or_insert_with(|| entry::placeholder_image(&descriptor.pathname));
                    Source::Chunk(window(data, descriptor.offset, count))
                }
                EntryKind::DeviceFile { device } => Source::Device(device.clone()),
                _ => return Err(Error::Io),
            }
        };

        match source {
            Source::Chunk(chunk) => {
                self.seek(fd, descriptor.offset.saturating_add(chunk.len()))?;
                Ok(chunk)
            }
            Source::Device(device) => device.read().await,
        }
    }

    /// Writes the first `count` bytes of `buf` to `fd`.
    ///
    /// Regular files receive the bytes by insertion at the descriptor's
    /// offset: the bytes from the offset onward move right rather than being
    /// overwritten.
    pub fn write(&self, fd: Fd, buf: &[u8], count: usize) -> Result<usize> {
        let descriptor = self.descriptor(fd)?;
        if !descriptor.flags.contains(OpenFlags::WRITE) {
            return Err(Error::BadDescriptor);
        }

        let chunk = &buf[..count.min(buf.len())];
        let resolved = self.resolve_descriptor(&descriptor, Lookup::FOLLOW)?;
        let writable = resolved.session().check_writable();
        let sink = {
            let mut entry = resolved.entry_mut_unchecked()?;
            match &mut entry.kind {
                EntryKind::Directory => return Err(Error::IsADirectory(descriptor.pathname)),
                EntryKind::RegularFile { data } => {
                    writable?;
                    let at = descriptor.offset.min(data.len());
                    data.splice(at..at, chunk.iter().copied());
                    Sink::File(chunk.len())
                }
                EntryKind::DeviceFile { device } => Sink::Device(device.clone()),
                _ => return Err(Error::Io),
            }
        };

        match sink {
            Sink::File(n) => {
                self.seek(fd, descriptor.offset.saturating_add(n))?;
                Ok(n)
            }
            Sink::Device(device) => {
                device.write(chunk)?;
                Ok(chunk.len())
            }
        }
    }

    fn stat_at(resolved: &Resolved) -> Result<Stat> {
        let entry = resolved.entry()?;
        Ok(Stat::from(&*entry))
    }

    pub fn stat(&self, pathname: &str) -> Result<Stat> {
        Process::stat_at(&self.lookup(pathname, Lookup::FOLLOW)?)
    }

    pub fn lstat(&self, pathname: &str) -> Result<Stat> {
        Process::stat_at(&self.lookup(pathname, Lookup::NOFOLLOW)?)
    }

    /// Status of the entry behind `fd`. A symbolic link at the descriptor's
    /// path is reported as the link itself.
    pub fn fstat(&self, fd: Fd) -> Result<Stat> {
        let descriptor = self.descriptor(fd)?;
        Process::stat_at(&self.resolve_descriptor(&descriptor, Lookup::NOFOLLOW)?)
    }

    /// Tombstones the entry at `pathname`.
    ///
    /// With [`UnlinkFlags::REMOVE_DIR`] the target must be a directory and
    /// its immediate children are tombstoned as well. Tombstoned entries stay
    /// readable through descriptors opened before the call.
    pub fn unlink(&self, pathname: &str, flags: UnlinkFlags) -> Result {
        let resolved = self.lookup(pathname, Lookup::ENTRY)?;
        if resolved.path() == "/" {
            return Err(Error::PermissionDenied);
        }

        let is_directory = resolved.entry()?.is_directory();
        if flags.contains(UnlinkFlags::REMOVE_DIR) {
            if !is_directory {
                return Err(Error::NotADirectory(pathname.to_owned()));
            }
            resolved.session().check_writable()?;

            let fs = resolved.session().filesystem();
            for key in fs.children(resolved.path(), false) {
                if let Some(mut child) = fs.get_mut(&key) {
                    child.deleted = true;
                }
            }
        } else if is_directory {
            return Err(Error::IsADirectory(pathname.to_owned()));
        }

        resolved.entry_mut()?.deleted = true;
        Ok(())
    }

    pub fn mkdir(&self, pathname: &str, mode: u32, recursive: bool) -> Result {
        self.mkdir_in(&self.session(), &self.qualify(pathname), mode, recursive)
    }

    fn mkdir_in(
        &self,
        session: &FilesystemSession,
        pathname: &str,
        mode: u32,
        recursive: bool,
    ) -> Result {
        let dir = Entry::directory(mode).owned_by(self.uid(), self.gid());
        match session.create(pathname, dir.clone()) {
            Err(Error::NotFound(_)) if recursive => {
                match self.mkdir_in(session, &path::parent(pathname), mode, true) {
                    Ok(()) | Err(Error::AlreadyExists(_)) => {}
                    Err(error) => return Err(error),
                }
                session.create(pathname, dir)
            }
            result => result,
        }
    }

    /// Names of the live entries in a directory.
    pub fn readdir(&self, pathname: &str) -> Result<Vec<String>> {
        self.session().list(&self.qualify(pathname))
    }

    pub fn rmdir(&self, pathname: &str) -> Result {
        let resolved = self.lookup(pathname, Lookup::ENTRY)?;
        if resolved.path() == "/" {
            return Err(Error::PermissionDenied);
        }

        let is_directory = resolved.entry()?.is_directory();
        if !is_directory {
            return Err(Error::NotADirectory(pathname.to_owned()));
        }

        let fs = resolved.session().filesystem();
        if !fs.children(resolved.path(), false).is_empty() {
            return Err(Error::NotEmpty(pathname.to_owned()));
        }

        resolved.entry_mut()?.deleted = true;
        Ok(())
    }

    /// Creates a symbolic link at `linkpath` pointing at `target`. The
    /// target is stored as given; relative targets resolve against the
    /// link's directory.
    pub fn symlink(&self, target: &str, linkpath: &str) -> Result {
        let link = Entry::symlink(target).owned_by(self.uid(), self.gid());
        self.session().create(&self.qualify(linkpath), link)
    }

    pub fn readlink(&self, pathname: &str) -> Result<String> {
        let resolved = self.lookup(pathname, Lookup::ENTRY)?;
        let entry = resolved.entry()?;
        match &entry.kind {
            EntryKind::SymbolicLink { target } => Ok(target.clone()),
            _ => Err(Error::InvalidArgument),
        }
    }

    pub fn uname(&self) -> Utsname {
        Utsname::from(&self.inner.kernel.params)
    }

    fn chown_at(resolved: &Resolved, owner: Uid, group: Gid) -> Result {
        let mut entry = resolved.entry_mut()?;
        entry.owner = owner;
        entry.group = group;
        Ok(())
    }

    /// Changes the owner of the entry at `pathname`, following symbolic
    /// links. No privilege is required.
    pub fn chown(&self, pathname: &str, owner: Uid, group: Gid) -> Result {
        Process::chown_at(&self.lookup(pathname, Lookup::FOLLOW)?, owner, group)
    }

    pub fn lchown(&self, pathname: &str, owner: Uid, group: Gid) -> Result {
        Process::chown_at(&self.lookup(pathname, Lookup::NOFOLLOW)?, owner, group)
    }

    pub fn fchown(&self, fd: Fd, owner: Uid, group: Gid) -> Result {
        let descriptor = self.descriptor(fd)?;
        Process::chown_at(&self.resolve_descriptor(&descriptor, Lookup::NOFOLLOW)?, owner, group)
    }

    pub fn chdir(&self, pathname: &str) -> Result {
        let pathname = self.qualify(pathname);
        let resolved = self.session().resolve(&pathname, true)?;
        let is_directory = resolved.entry()?.is_directory();
        if !is_directory {
            return Err(Error::NotADirectory(pathname));
        }

        self.setenv("PWD", path::normalize(&pathname));
        Ok(())
    }

    pub fn getcwd(&self) -> String {
        self.getenv("PWD").unwrap_or_else(|| path::SEPARATOR.to_string())
    }

    pub fn getenv(&self, key: &str) -> Option<String> {
        self.env_map().borrow().get(key).cloned()
    }

    /// Sets a variable in the environment, which is visible to the parent
    /// until this process calls `exec`.
    pub fn setenv(&self, key: impl Into<String>, value: impl Into<String>) {
        self.env_map().borrow_mut().insert(key.into(), value.into());
    }

    /// Snapshot of the environment.
    pub fn env(&self) -> IndexMap<String, String> {
        self.env_map().borrow().clone()
    }

    fn env_map(&self) -> Env {
        self.inner.env.borrow().clone()
    }

    /// Runs `body` as a new child process and waits for it to finish.
    ///
    /// The child shares this process's environment by reference, inherits
    /// its terminal, credentials and session, and starts with descriptors
    /// 0, 1 and 2 open on the terminal. Once `body` returns, the child is
    /// removed from the process tree together with its process directory.
    pub async fn spawn<F, Fut>(&self, body: F) -> Result
    where
        F: FnOnce(Process) -> Fut,
        Fut: Future<Output = Result>,
    {
        let kernel = &self.inner.kernel;
        let pid = kernel.allocate_pid();
        let session = self.session();

        let child = Process::with_env(
            kernel.clone(),
            pid,
            self.name(),
            self.inner.tty.clone(),
            self.uid(),
            self.gid(),
            session.session(Some(pid), session.root()),
            self.env_map(),
        );
        self.inner.children.borrow_mut().push(child.clone());

        let span =
            tracing::info_span!(target: TRACING_TARGET, "process", pid, name = %child.name());
        let result = async {
            child.setup()?;
            body(child.clone()).await
        }
        .instrument(span)
        .await;

        self.inner.children.borrow_mut().retain(|c| c.id() != pid);
        child.teardown();

        match &result {
            Ok(()) => tracing::debug!(target: TRACING_TARGET, pid, parent = self.id(), "exit"),
            Err(error) => {
                let parent = self.id();
                tracing::warn!(target: TRACING_TARGET, pid, parent, %error, "process failed");
            }
        }
        result
    }

    fn setup(&self) -> Result {
        let fd_dir = format!("{}/fd", self.proc_dir());
        match self.mkdir_in(&self.session().privileged(), &fd_dir, 0o555, true) {
            Ok(()) | Err(Error::AlreadyExists(_)) => {}
            Err(error) => return Err(error),
        }

        if !self.inner.tty.is_empty() {
            let tty = self.inner.tty.clone();
            self.open(&tty, OpenFlags::READ)?;
            self.open(&tty, OpenFlags::WRITE)?;
            self.open(&tty, OpenFlags::WRITE)?;
        }
        Ok(())
    }

    fn teardown(&self) {
        let dir = self.proc_dir();
        self.bookkeeping("exit", |session| session.delete(&dir, true));
    }

    /// Replaces the program running in this process.
    ///
    /// The pid and descriptor table are kept. `args` replace the current
    /// arguments and `env` is merged over a fresh copy of the current
    /// environment, which ends any sharing with the parent.
    pub async fn exec(
        &self,
        pathname: &str,
        args: Vec<String>,
        env: IndexMap<String, String>,
    ) -> Result {
        let pathname = self.qualify(pathname);
        let resolved = self.session().resolve(&pathname, true)?;

        *self.inner.name.borrow_mut() = pathname.clone();
        *self.inner.args.borrow_mut() = args;
        let mut merged = self.env();
        merged.extend(env);
        *self.inner.env.borrow_mut() = Rc::new(RefCell::new(merged));

        let entry_point = {
            let entry = resolved.entry()?;
            let entry_point = match &entry.kind {
                EntryKind::ExecutableFile { entry_point, .. } if entry.permits(0o1) => {
                    entry_point.clone()
                }
                EntryKind::ExecutableFile { .. } => return Err(Error::PermissionDenied),
                // Interpreter scripts are not supported.
                _ => return Err(Error::InvalidExecutable(pathname)),
            };
            entry_point
        };

        tracing::debug!(target: TRACING_TARGET, pid = self.id(), %pathname, "exec");
        entry_point(self.clone(), Lib::new(self.clone())).await
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.inner.id)
            .field("name", &*self.inner.name.borrow())
            .field("tty", &self.inner.tty)
            .field("fd", &*self.inner.fd.borrow())
            .finish_non_exhaustive()
    }
}

/// `data[offset..offset + count]`, clamped to the buffer.
fn window(data: &[u8], offset: usize, count: usize) -> Bytes {
    let start = offset.min(data.len());
    let end = offset.saturating_add(count).min(data.len());
    Bytes::copy_from_slice(&data[start..end])
}
