use super::{Fd, Process, STDOUT};
use crate::discipline::LineDiscipline;
use crate::flags::ReadFlags;
use crate::{path, Result};

/// The capabilities handed to a program's entry point.
///
/// Programs get terminal-style I/O and path helpers rather than the whole
/// process; they receive the [`Process`] separately for system calls.
#[derive(Clone, Debug)]
pub struct Lib {
    pub io: Io,
    pub path: Paths,
}

impl Lib {
    pub(crate) fn new(process: Process) -> Lib {
        Lib {
            io: Io {
                process: process.clone(),
            },
            path: Paths { process },
        }
    }
}

#[derive(Clone, Debug)]
pub struct Io {
    process: Process,
}

impl Io {
    /// Reads from `fd` the way a terminal program does.
    ///
    /// With [`ReadFlags::READ_LINE`] input is run through a fresh
    /// [`LineDiscipline`] until Enter, and the edited line is returned
    /// without its newline. End of input returns whatever was typed so far.
    /// Without it, one chunk is returned as read.
    ///
    /// [`ReadFlags::ECHO`] echoes to standard output.
    pub async fn read(&self, fd: Fd, flags: ReadFlags) -> Result<String> {
        let echo = flags.contains(ReadFlags::ECHO);
        let mut discipline = LineDiscipline::new();

        loop {
            let raw = self.process.read(fd, usize::MAX).await?;

            if !flags.contains(ReadFlags::READ_LINE) {
                let text = String::from_utf8_lossy(&raw).into_owned();
                if echo {
                    self.write(&text, STDOUT)?;
                }
                return Ok(text);
            }

            if raw.is_empty() {
                return Ok(discipline.line());
            }

            let response = discipline.process(&raw);
            if echo && !response.is_empty() {
                self.write(response, STDOUT)?;
            }

            if discipline.is_done() {
                if !echo {
                    self.write("\n", STDOUT)?;
                }
                return Ok(discipline.line());
            }
        }
    }

    pub fn write(&self, value: impl AsRef<[u8]>, fd: Fd) -> Result {
        let value = value.as_ref();
        self.process.write(fd, value, value.len())?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Paths {
    process: Process,
}

impl Paths {
    /// `pathname` made absolute against the working directory and
    /// normalized.
    pub fn absolute(&self, pathname: &str) -> String {
        path::absolute(pathname, &self.process.getcwd())
    }
}
