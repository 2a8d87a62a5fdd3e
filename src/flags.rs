use bitflags::bitflags;

bitflags! {
    /// Access requested when opening a descriptor.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const READ = 1 << 1;
        const WRITE = 1 << 2;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct UnlinkFlags: u32 {
        /// Remove a directory, tombstoning its immediate children.
        const REMOVE_DIR = 1 << 1;
    }
}

bitflags! {
    /// Behaviour of an interactive read issued through [`Io::read`].
    ///
    /// [`Io::read`]: crate::Io::read
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ReadFlags: u32 {
        /// Echo the input back to standard output.
        const ECHO = 1 << 1;
        /// Run the input through the line discipline until Enter.
        const READ_LINE = 1 << 2;
    }
}

impl Default for ReadFlags {
    fn default() -> Self {
        ReadFlags::ECHO | ReadFlags::READ_LINE
    }
}

/// File type bits OR'd into [`Stat::mode`](crate::Stat::mode).
pub mod mode {
    /// Mask selecting the type bits.
    pub const S_IFMT: u32 = 0o170000;
    pub const S_IFDIR: u32 = 0o040000;
    pub const S_IFCHR: u32 = 0o020000;
    pub const S_IFREG: u32 = 0o100000;
    pub const S_IFLNK: u32 = 0o120000;

    /// Mask selecting the nine `rwxrwxrwx` permission bits.
    pub const PERMISSIONS: u32 = 0o777;
}
