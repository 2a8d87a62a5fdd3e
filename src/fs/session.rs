use super::{Access, Filesystem};
use crate::entry::{Entry, EntryKind};
use crate::path;
use crate::process::Pid;
use crate::{Error, Result, TRACING_TARGET};

use std::cell::{Ref, RefMut};
use std::fmt;

/// Upper bound on symbolic links followed during one lookup.
const MAX_SYMLINK_HOPS: usize = 40;

/// How the final component of a lookup is treated.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Lookup {
    /// Follow a symbolic link in the final component.
    follow: bool,
    /// Enter a filesystem mounted at the final component.
    mounts: bool,
    /// Treat tombstoned entries as present.
    tombstones: bool,
}

impl Lookup {
    pub(crate) const FOLLOW: Lookup = Lookup {
        follow: true,
        mounts: true,
        tombstones: false,
    };

    pub(crate) const NOFOLLOW: Lookup = Lookup {
        follow: false,
        mounts: true,
        tombstones: false,
    };

    /// The entry occupying the key itself: neither a final symlink nor a
    /// final mount point is entered.
    pub(crate) const ENTRY: Lookup = Lookup {
        follow: false,
        mounts: false,
        tombstones: false,
    };

    pub(crate) fn of(follow: bool) -> Lookup {
        if follow {
            Lookup::FOLLOW
        } else {
            Lookup::NOFOLLOW
        }
    }

    pub(crate) fn with_tombstones(mut self) -> Lookup {
        self.tombstones = true;
        self
    }
}

enum Step {
    Descend,
    Found,
    NotADirectory,
    Link(String),
    Mount(Filesystem),
}

/// A rooted, mount-aware resolver bound to one [`Filesystem`].
///
/// Every lookup is anchored at the session's root prefix, so a session
/// rooted at `/home` resolves `/user` to the key `/home/user`.
#[derive(Clone)]
pub struct FilesystemSession {
    fs: Filesystem,
    process: Option<Pid>,
    root: String,
    privileged: bool,
}

impl FilesystemSession {
    pub(crate) fn new(fs: Filesystem, process: Option<Pid>, root: &str) -> FilesystemSession {
        FilesystemSession {
            fs,
            process,
            root: path::normalize(root),
            privileged: false,
        }
    }

    pub fn filesystem(&self) -> &Filesystem {
        &self.fs
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn process(&self) -> Option<Pid> {
        self.process
    }

    /// A new session over the same filesystem.
    pub fn session(&self, process: Option<Pid>, root: &str) -> FilesystemSession {
        FilesystemSession::new(self.fs.clone(), process, root)
    }

    /// A copy of this session that may mutate read-only filesystems.
    pub(crate) fn privileged(&self) -> FilesystemSession {
        FilesystemSession {
            privileged: true,
            ..self.clone()
        }
    }

    pub(crate) fn check_writable(&self) -> Result {
        if self.fs.access() == Access::ReadOnly && !self.privileged {
            return Err(Error::PermissionDenied);
        }
        Ok(())
    }

    /// Resolves `pathname` to the session owning its entry.
    ///
    /// Symbolic links in intermediate components are always followed; one in
    /// the final component only when `follow_symlink` is set. Mount points
    /// are always entered.
    pub fn resolve(&self, pathname: &str, follow_symlink: bool) -> Result<Resolved> {
        self.lookup(pathname, Lookup::of(follow_symlink))
    }

    pub(crate) fn lookup(&self, pathname: &str, lookup: Lookup) -> Result<Resolved> {
        path::validate(pathname)?;
        self.walk(path::components(pathname), lookup, pathname, 0)
    }

    fn walk(
        &self,
        view: Vec<String>,
        lookup: Lookup,
        requested: &str,
        hops: usize,
    ) -> Result<Resolved> {
        let mut full = path::components(&self.root);
        let base = full.len();
        full.extend(view);

        for i in 0..full.len() {
            let key = path::join(&full[..=i]);
            let last = i + 1 == full.len();

            let step = {
                let entry = self
                    .fs
                    .get(&key)
                    .filter(|entry| lookup.tombstones || !entry.deleted)
                    .ok_or_else(|| Error::NotFound(requested.to_owned()))?;

                match &entry.kind {
                    EntryKind::SymbolicLink { target } if !last || lookup.follow => {
                        Step::Link(target.clone())
                    }
                    EntryKind::MountedFilesystem { target } if !last || lookup.mounts => {
                        Step::Mount(target.clone())
                    }
                    _ if last => Step::Found,
                    EntryKind::Directory => Step::Descend,
                    _ => Step::NotADirectory,
                }
            };

            match step {
                Step::Descend => {}
                Step::Found => return Ok(Resolved::new(self.clone(), key)),
                Step::NotADirectory => return Err(Error::NotADirectory(requested.to_owned())),
                Step::Link(target) => {
                    if hops >= MAX_SYMLINK_HOPS {
                        return Err(Error::TooManyLinks(requested.to_owned()));
                    }

                    let mut next = if target.starts_with(path::SEPARATOR) {
                        path::components(&target)
                    } else {
                        // Relative targets are taken from the link's directory,
                        // expressed in this session's view.
                        let dir = full.get(base..i).map(path::join).unwrap_or_default();
                        path::components(&format!("{dir}/{target}"))
                    };
                    next.extend_from_slice(&full[i + 1..]);

                    return self.walk(next, lookup, requested, hops + 1);
                }
                Step::Mount(target) => {
                    let mounted = FilesystemSession {
                        fs: target,
                        process: self.process,
                        root: "/".to_owned(),
                        privileged: self.privileged,
                    };
                    return mounted.walk(full[i + 1..].to_vec(), lookup, requested, hops);
                }
            }
        }

        // Nothing left to walk: the session root of a filesystem anchored at
        // `/` is the filesystem's own root entry.
        Ok(Resolved::new(self.clone(), path::join(&full)))
    }

    /// A copy of the entry at `pathname`.
    pub fn get(&self, pathname: &str, follow_symlink: bool) -> Result<Entry> {
        let resolved = self.resolve(pathname, follow_symlink)?;
        let entry = resolved.entry()?.clone();
        Ok(entry)
    }

    /// Inserts `entry` at `pathname`.
    ///
    /// The parent directory is resolved first, following symbolic links and
    /// mounts, and the entry lands in whichever filesystem owns it.
    pub fn create(&self, pathname: &str, entry: Entry) -> Result {
        path::validate(pathname)?;

        let mut components = path::components(pathname);
        let Some(name) = components.pop() else {
            return Err(Error::AlreadyExists(pathname.to_owned()));
        };
        let parent_path = path::join(&components);

        let parent = self.resolve(&parent_path, true)?;
        let is_directory = parent.entry()?.is_directory();
        if !is_directory {
            return Err(Error::NotADirectory(parent_path));
        }
        parent.session.check_writable()?;

        let key = path::child(&parent.path, &name);
        let tombstoned = parent.session.fs.get(&key).map(|e| e.deleted);
        match tombstoned {
            Some(false) => return Err(Error::AlreadyExists(pathname.to_owned())),
            // Whatever survived below the old entry goes with it.
            Some(true) => parent.session.fs.remove_descendants(&key),
            None => {}
        }

        tracing::trace!(target: TRACING_TARGET, pathname, key = %key, "create");
        parent.session.fs.insert(key, entry);
        Ok(())
    }

    /// Names of the live entries directly inside the directory at
    /// `pathname`.
    pub fn list(&self, pathname: &str) -> Result<Vec<String>> {
        let dir = self.resolve(pathname, true)?;
        let is_directory = dir.entry()?.is_directory();
        if !is_directory {
            return Err(Error::NotADirectory(pathname.to_owned()));
        }

        Ok(dir
            .session
            .fs
            .children(&dir.path, false)
            .iter()
            .map(|key| path::file_name(key))
            .collect())
    }

    /// Removes the entry at `pathname` from its filesystem.
    ///
    /// A final symbolic link or mount point is removed itself rather than
    /// what it points at. Directories with live children need `recursive`.
    pub fn delete(&self, pathname: &str, recursive: bool) -> Result {
        let target = self.lookup(pathname, Lookup::ENTRY.with_tombstones())?;
        if target.path == "/" {
            return Err(Error::PermissionDenied);
        }
        target.session.check_writable()?;

        tracing::trace!(target: TRACING_TARGET, pathname, key = %target.path, recursive, "delete");
        target.session.remove_tree(&target.path, recursive, pathname)
    }

    fn remove_tree(&self, key: &str, recursive: bool, requested: &str) -> Result {
        let is_directory = self
            .fs
            .get(key)
            .map(|entry| entry.is_directory())
            .ok_or_else(|| Error::NotFound(requested.to_owned()))?;

        if is_directory {
            if !recursive && !self.fs.children(key, false).is_empty() {
                return Err(Error::NotEmpty(requested.to_owned()));
            }
            // Without `recursive` only tombstones are left here.
            for child in self.fs.children(key, true) {
                self.remove_tree(&child, true, requested)?;
            }
        }

        self.fs.remove(key);
        Ok(())
    }
}

impl fmt::Debug for FilesystemSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilesystemSession")
            .field("fs", &self.fs)
            .field("process", &self.process)
            .field("root", &self.root)
            .field("privileged", &self.privileged)
            .finish()
    }
}

/// Outcome of a lookup: the session owning the entry and its key there.
#[derive(Clone, Debug)]
pub struct Resolved {
    session: FilesystemSession,
    path: String,
}

impl Resolved {
    fn new(session: FilesystemSession, path: String) -> Resolved {
        Resolved { session, path }
    }

    pub fn session(&self) -> &FilesystemSession {
        &self.session
    }

    /// Key of the entry inside [`session`](Self::session)'s filesystem.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Borrows the entry. Must not be held across other filesystem calls.
    pub fn entry(&self) -> Result<Ref<'_, Entry>> {
        self.session
            .fs
            .get(&self.path)
            .ok_or_else(|| Error::NotFound(self.path.clone()))
    }

    /// Mutably borrows the entry, failing on a read-only filesystem.
    pub fn entry_mut(&self) -> Result<RefMut<'_, Entry>> {
        self.session.check_writable()?;
        self.entry_mut_unchecked()
    }

    pub(crate) fn entry_mut_unchecked(&self) -> Result<RefMut<'_, Entry>> {
        self.session
            .fs
            .get_mut(&self.path)
            .ok_or_else(|| Error::NotFound(self.path.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Filesystem {
        let fs = Filesystem::new();
        let session = fs.session();
        session.create("/a", Entry::directory(0o755)).unwrap();
        session.create("/a/b", Entry::file(0o644, b"b".to_vec())).unwrap();
        fs
    }

    #[test]
    fn empty_path_is_the_root() {
        let fs = Filesystem::new();
        let resolved = fs.session().resolve("/", true).unwrap();
        assert_eq!(resolved.path(), "/");
        assert!(resolved.entry().unwrap().is_directory());
    }

    #[test]
    fn session_root_prefixes_lookups() {
        let fs = seeded();
        let session = fs.session_for(None, "/a");

        let resolved = session.resolve("/b", true).unwrap();
        assert_eq!(resolved.path(), "/a/b");
    }

    #[test]
    fn not_found_names_the_requested_path() {
        let fs = seeded();
        let err = fs.session().resolve("/a/x/y", true).unwrap_err();
        assert_eq!(err, Error::NotFound("/a/x/y".into()));
    }

    #[test]
    fn file_in_the_middle_is_not_a_directory() {
        let fs = seeded();
        let err = fs.session().resolve("/a/b/c", true).unwrap_err();
        assert!(matches!(err, Error::NotADirectory(_)));
    }

    #[test]
    fn relative_link_resolves_from_its_directory() {
        let fs = seeded();
        let session = fs.session();
        session.create("/a/link", Entry::symlink("b")).unwrap();

        let resolved = session.resolve("/a/link", true).unwrap();
        assert_eq!(resolved.path(), "/a/b");

        let unfollowed = session.resolve("/a/link", false).unwrap();
        assert_eq!(unfollowed.path(), "/a/link");
    }

    #[test]
    fn link_loop_is_detected() {
        let fs = Filesystem::new();
        let session = fs.session();
        session.create("/x", Entry::symlink("/y")).unwrap();
        session.create("/y", Entry::symlink("/x")).unwrap();

        let err = session.resolve("/x", true).unwrap_err();
        assert_eq!(err, Error::TooManyLinks("/x".into()));
    }

    #[test]
    fn tombstones_are_invisible_by_default() {
        let fs = seeded();
        fs.get_mut("/a/b").unwrap().deleted = true;

        let session = fs.session();
        assert!(session.resolve("/a/b", true).is_err());
        assert!(session
            .lookup("/a/b", Lookup::FOLLOW.with_tombstones())
            .is_ok());
        assert!(session.list("/a").unwrap().is_empty());

        // A tombstone does not block a new entry at the same key.
        session.create("/a/b", Entry::directory(0o755)).unwrap();
        assert!(session.resolve("/a/b", true).unwrap().entry().unwrap().is_directory());
    }

    #[test]
    fn read_only_rejects_unprivileged_writes() {
        let fs = Filesystem::read_only();
        let session = fs.session();

        assert_eq!(
            session.create("/x", Entry::directory(0o555)),
            Err(Error::PermissionDenied)
        );
        session.privileged().create("/x", Entry::directory(0o555)).unwrap();
        assert_eq!(session.delete("/x", false), Err(Error::PermissionDenied));
        session.privileged().delete("/x", false).unwrap();
    }

    #[test]
    fn root_cannot_be_deleted() {
        let fs = Filesystem::new();
        assert_eq!(fs.session().delete("/", true), Err(Error::PermissionDenied));
    }
}
