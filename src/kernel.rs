use crate::config::Parameters;
use crate::device::Storage;
use crate::entry::Entry;
use crate::fs::{Access, Filesystem};
use crate::process::{Pid, Process};
use crate::{rt, Error, Result, TRACING_TARGET};

use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

/// State shared by every process of one emulator.
pub(crate) struct Kernel {
    pub(crate) params: Parameters,
    devices: RefCell<Vec<Storage>>,
    next_pid: Cell<Pid>,
}

impl Kernel {
    /// Pids are assigned monotonically and never reused.
    pub(crate) fn allocate_pid(&self) -> Pid {
        let pid = self.next_pid.get();
        self.next_pid.set(pid + 1);
        pid
    }
}

/// An emulated machine: attached storage, the process tree and the kernel
/// parameters it boots with.
///
/// Create one with a [`Builder`](crate::Builder).
pub struct Emulator {
    kernel: Rc<Kernel>,
    root: Process,
}

impl Emulator {
    pub(crate) fn new(params: Parameters, devices: Vec<Storage>) -> Emulator {
        let tty = params.tty.clone();
        let kernel = Rc::new(Kernel {
            params,
            devices: RefCell::new(devices),
            next_pid: Cell::new(1),
        });

        // Until boot mounts a partition, the root process sees an empty
        // filesystem.
        let env = IndexMap::from([("PWD".to_owned(), "/".to_owned())]);
        let root = Process::new(
            kernel.clone(),
            0,
            "kernel".to_owned(),
            tty,
            0,
            0,
            Filesystem::new().session_for(Some(0), "/"),
            env,
        );

        Emulator { kernel, root }
    }

    pub fn parameters(&self) -> &Parameters {
        &self.kernel.params
    }

    /// The process every other process descends from, pid 0.
    pub fn root(&self) -> &Process {
        &self.root
    }

    pub fn attach(&self, storage: Storage) {
        self.kernel.devices.borrow_mut().push(storage);
    }

    /// The first partition, in attachment order, whose root holds the boot
    /// flag entry.
    pub fn find_bootable_partition(&self) -> Option<Filesystem> {
        let flag = &self.kernel.params.boot_flag;
        self.kernel
            .devices
            .borrow()
            .iter()
            .flat_map(|storage| storage.partitions())
            .find(|partition| partition.session().resolve(flag, true).is_ok())
            .cloned()
    }

    /// Mounts the bootable partition as the root filesystem and sets up the
    /// special directories.
    ///
    /// Whatever exists at the process directory is replaced by an empty
    /// read-only filesystem. A writable filesystem is mounted at the
    /// temporary directory unless the partition already has one.
    pub(crate) fn mount(&self) -> Result {
        let params = &self.kernel.params;
        let partition = self
            .find_bootable_partition()
            .ok_or(Error::NoBootableMedium)?;

        let session = partition.session_for(Some(self.root.id()), "/");
        self.root.set_session(session.clone());
        let session = session.privileged();

        match session.delete(&params.proc_dir, true) {
            Ok(()) | Err(Error::NotFound(_)) => {}
            Err(error) => return Err(error),
        }
        session.create(&params.proc_dir, Entry::mount(Filesystem::read_only(), 0o555))?;
        tracing::debug!(target: TRACING_TARGET, path = %params.proc_dir, "mounted procfs");

        match session.resolve(&params.tmp_dir, false) {
            Err(Error::NotFound(_)) => {
                let tmpfs = Filesystem::with_root_mode(0o777, Access::ReadWrite);
                session.create(&params.tmp_dir, Entry::mount(tmpfs, 0o777))?;
                tracing::debug!(target: TRACING_TARGET, path = %params.tmp_dir, "mounted tmpfs");
            }
            Ok(_) => {}
            Err(error) => return Err(error),
        }

        Ok(())
    }

    /// Mounts the root filesystem and runs the init program until it exits.
    ///
    /// An error from init halts the machine and is returned.
    pub async fn boot(&self) -> Result {
        if let Err(error) = self.mount() {
            tracing::error!(target: TRACING_TARGET, %error, "boot failed");
            return Err(error);
        }

        let init = self.kernel.params.init.clone();
        tracing::info!(target: TRACING_TARGET, %init, "starting init");

        let result = self
            .root
            .spawn(|process| async move { process.exec(&init, Vec::new(), IndexMap::new()).await })
            .await;

        if let Err(error) = &result {
            tracing::error!(target: TRACING_TARGET, %error, "init failed, halting");
        }
        result
    }

    /// Mounts the root filesystem and runs `body` as a process in place of
    /// init.
    pub async fn launch<F, Fut>(&self, body: F) -> Result
    where
        F: FnOnce(Process) -> Fut,
        Fut: Future<Output = Result>,
    {
        self.mount()?;
        self.root.spawn(body).await
    }

    /// Blocking form of [`boot`](Self::boot) on a fresh current-thread
    /// runtime.
    pub fn run(&self) -> Result {
        rt::block_on(self.boot())
    }

    /// Blocking form of [`launch`](Self::launch).
    pub fn client<F, Fut>(&self, body: F) -> Result
    where
        F: FnOnce(Process) -> Fut,
        Fut: Future<Output = Result>,
    {
        rt::block_on(self.launch(body))
    }
}
