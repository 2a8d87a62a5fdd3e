use std::io;

/// Errors raised by the kernel.
///
/// The set is closed: every syscall fails with one of these conditions,
/// each carrying the offending path where one is known. Programs are
/// expected to match on the variant to print a diagnostic and carry on.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No entry exists at the path.
    #[error("No such file or directory: {0}")]
    NotFound(String),

    /// A path component, or the target of a directory operation, is not a
    /// directory.
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// The target is a directory where a file was expected.
    #[error("Is a directory: {0}")]
    IsADirectory(String),

    /// The directory still has live children.
    #[error("Directory not empty: {0}")]
    NotEmpty(String),

    /// An entry already occupies the path.
    #[error("File exists: {0}")]
    AlreadyExists(String),

    /// The descriptor is not open, or not open for the requested access.
    #[error("File descriptor in bad state")]
    BadDescriptor,

    #[error("Invalid argument")]
    InvalidArgument,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Input/output error")]
    Io,

    /// The entry cannot be executed.
    #[error("Accessing a corrupted shared library: {0}")]
    InvalidExecutable(String),

    /// Symlink resolution did not terminate.
    #[error("Too many levels of symbolic links: {0}")]
    TooManyLinks(String),

    /// No attached storage carries the boot flag entry.
    #[error("No bootable medium found")]
    NoBootableMedium,
}

impl Error {
    /// The Linux errno value matching this condition.
    pub fn errno(&self) -> i32 {
        match self {
            Error::NotFound(_) => 2,
            Error::Io => 5,
            Error::PermissionDenied => 13,
            Error::AlreadyExists(_) => 17,
            Error::NotADirectory(_) => 20,
            Error::IsADirectory(_) => 21,
            Error::InvalidArgument => 22,
            Error::NotEmpty(_) => 39,
            Error::TooManyLinks(_) => 40,
            Error::BadDescriptor => 77,
            Error::InvalidExecutable(_) => 80,
            Error::NoBootableMedium => 6,
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        let kind = match &err {
            Error::NotFound(_) | Error::NoBootableMedium => io::ErrorKind::NotFound,
            Error::PermissionDenied => io::ErrorKind::PermissionDenied,
            Error::AlreadyExists(_) => io::ErrorKind::AlreadyExists,
            Error::InvalidArgument | Error::BadDescriptor => io::ErrorKind::InvalidInput,
            Error::InvalidExecutable(_) => io::ErrorKind::InvalidData,
            Error::NotADirectory(_)
            | Error::IsADirectory(_)
            | Error::NotEmpty(_)
            | Error::TooManyLinks(_)
            | Error::Io => io::ErrorKind::Other,
        };

        io::Error::new(kind, err)
    }
}

/// A specialized [`Result`] type for kernel operations.
///
/// Defaults to `()` so that syscalls which only signal success read as
/// `Result` and test bodies can use `?` throughout.
///
/// [`Result`]: std::result::Result
pub type Result<T = ()> = std::result::Result<T, Error>;
