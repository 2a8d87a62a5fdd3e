//! Mountable in-memory filesystems.
//!
//! A [`Filesystem`] is a flat map from normalized absolute path to
//! [`Entry`]. The existence of a key is the only truth of existence; there
//! are no child pointers. Lookups go through a [`FilesystemSession`], which
//! anchors paths at a root prefix, follows symbolic links and delegates into
//! filesystems mounted inside the one it walks.
//!
//! Handles are reference counted: every session and every mount entry
//! pointing at a filesystem shares the same map. Execution is
//! single-threaded, so the map lives in a `RefCell` and is never borrowed
//! across a suspension point.

mod builder;
pub use builder::FilesystemBuilder;

mod session;
pub(crate) use session::Lookup;
pub use session::{FilesystemSession, Resolved};

use crate::entry::Entry;
use crate::path;
use crate::process::Pid;

use indexmap::IndexMap;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

/// Who may mutate a filesystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    ReadWrite,
    /// Only the kernel's own bookkeeping may create or remove entries.
    ReadOnly,
}

/// A mapping from absolute path to entry.
#[derive(Clone)]
pub struct Filesystem {
    inner: Rc<RefCell<Inner>>,
}

struct Inner {
    entries: IndexMap<String, Entry>,
    access: Access,
}

impl Filesystem {
    /// A writable filesystem holding only its root directory.
    pub fn new() -> Filesystem {
        Filesystem::with_root_mode(0o555, Access::ReadWrite)
    }

    /// A filesystem that programs can read but not modify.
    pub fn read_only() -> Filesystem {
        Filesystem::with_root_mode(0o555, Access::ReadOnly)
    }

    pub fn with_root_mode(mode: u32, access: Access) -> Filesystem {
        let mut entries = IndexMap::new();
        entries.insert(path::SEPARATOR.to_string(), Entry::directory(mode));

        Filesystem {
            inner: Rc::new(RefCell::new(Inner { entries, access })),
        }
    }

    pub fn access(&self) -> Access {
        self.inner.borrow().access
    }

    /// A session rooted at `/` with no owning process.
    pub fn session(&self) -> FilesystemSession {
        FilesystemSession::new(self.clone(), None, "/")
    }

    /// A session anchored at `root` on behalf of `process`.
    pub fn session_for(&self, process: Option<Pid>, root: &str) -> FilesystemSession {
        FilesystemSession::new(self.clone(), process, root)
    }

    /// Whether both handles refer to the same entry map.
    pub fn ptr_eq(&self, other: &Filesystem) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// All keys, tombstoned ones included, in insertion order.
    pub fn paths(&self) -> Vec<String> {
        self.inner.borrow().entries.keys().cloned().collect()
    }

    pub(crate) fn get(&self, key: &str) -> Option<Ref<'_, Entry>> {
        Ref::filter_map(self.inner.borrow(), |inner| inner.entries.get(key)).ok()
    }

    pub(crate) fn get_mut(&self, key: &str) -> Option<RefMut<'_, Entry>> {
        RefMut::filter_map(self.inner.borrow_mut(), |inner| inner.entries.get_mut(key)).ok()
    }

    pub(crate) fn insert(&self, key: String, entry: Entry) {
        self.inner.borrow_mut().entries.insert(key, entry);
    }

    pub(crate) fn remove(&self, key: &str) -> Option<Entry> {
        // The root directory is never removed.
        if key == "/" {
            return None;
        }
        self.inner.borrow_mut().entries.shift_remove(key)
    }

    /// Drops every key below `dir`, at any depth.
    pub(crate) fn remove_descendants(&self, dir: &str) {
        let prefix = match dir {
            "/" => String::from("/"),
            _ => format!("{dir}/"),
        };
        self.inner
            .borrow_mut()
            .entries
            .retain(|key, _| key == dir || !key.starts_with(&prefix));
    }

    /// Keys one level below `dir`, optionally including tombstones.
    pub(crate) fn children(&self, dir: &str, tombstones: bool) -> Vec<String> {
        self.inner
            .borrow()
            .entries
            .iter()
            .filter(|(key, entry)| {
                path::is_immediate_child(key, dir) && (tombstones || !entry.deleted)
            })
            .map(|(key, _)| key.clone())
            .collect()
    }
}

impl Default for Filesystem {
    fn default() -> Filesystem {
        Filesystem::new()
    }
}

impl fmt::Debug for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Filesystem")
            .field("entries", &inner.entries.len())
            .field("access", &inner.access)
            .finish()
    }
}
