//! vkernel emulates a Unix-like kernel inside a single host process. It
//! provides a mountable virtual filesystem, processes with file descriptors
//! and POSIX-like system calls, and a terminal line discipline.
//!
//! # Filesystems and Storage
//!
//! A [`Filesystem`] maps absolute paths to [`Entry`] values: directories,
//! regular files, executables, devices, symbolic links and mount points.
//! Images are seeded with a [`FilesystemBuilder`] and attached to the
//! machine as partitions of a [`Storage`] device. At boot the kernel mounts
//! the first partition carrying the boot flag entry as the root filesystem.
//!
//! # Processes and Programs
//!
//! Programs are native closures installed as executable entries. `exec`
//! hands each one its [`Process`], for system calls, and a [`Lib`] with
//! terminal-style I/O:
//!
//! ```
//! use vkernel::{Entry, FilesystemBuilder, ReadFlags, Storage, Tty, STDIN};
//!
//! # fn main() -> vkernel::Result {
//! let (tty, handle) = Tty::new();
//! let image = FilesystemBuilder::new()
//!     .directory("/dev", 0o755)?
//!     .device("/dev/tty1", 0o666, tty)?
//!     .directory("/sbin", 0o755)?
//!     .executable("/sbin/init", 0o755, |_process, lib| async move {
//!         lib.io.write("login: ", vkernel::STDOUT)?;
//!         let name = lib.io.read(STDIN, ReadFlags::default()).await?;
//!         lib.io.write(format!("hello, {name}\n"), vkernel::STDOUT)
//!     })?
//!     .build();
//!
//! handle.send("root\r")?;
//!
//! let emulator = vkernel::Builder::new()
//!     .storage(Storage::new(vec![image]))
//!     .build();
//! emulator.run()?;
//!
//! assert_eq!(handle.output(), "login: root\nhello, root\n");
//! # Ok(())
//! # }
//! ```
//!
//! Processes run cooperatively on one thread. [`Process::spawn`] runs a
//! child to completion before returning, and a read from a device suspends
//! until the device produces input.
//!
//! # Tracing
//!
//! The `tracing` crate is used to emit events during the lifetime of the
//! machine. Every process body runs inside a `process` span carrying its
//! pid. To see events, install a
//! [`tracing-subscriber`](https://docs.rs/tracing-subscriber/latest/tracing_subscriber/)
//! and set the level with `RUST_LOG=vkernel=debug`.

mod builder;
pub use builder::Builder;

mod config;
pub use config::{Parameters, Utsname};

mod device;
pub use device::{Device, Storage, Tty, TtyHandle};

mod discipline;
pub use discipline::LineDiscipline;

mod entry;
pub use entry::{Entry, EntryKind, EntryPoint, Gid, Uid};

mod error;
pub use error::{Error, Result};

mod flags;
pub use flags::{mode, OpenFlags, ReadFlags, UnlinkFlags};

mod fs;
pub use fs::{Access, Filesystem, FilesystemBuilder, FilesystemSession, Resolved};

mod kernel;
pub use kernel::Emulator;

pub mod path;

mod process;
pub use process::{FileDescriptor, Fd, Io, Lib, Paths, Pid, Process, Stat, STDERR, STDIN, STDOUT};

mod rt;

const TRACING_TARGET: &str = "vkernel";
