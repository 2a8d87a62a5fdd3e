use crate::fs::Filesystem;
use crate::{Error, Result};

use bytes::Bytes;
use futures::future::LocalBoxFuture;
use std::cell::RefCell;
use std::mem;
use std::rc::Rc;
use tokio::sync::{mpsc, Mutex};

/// Byte-stream capability behind a device file.
///
/// Any object exposing this pair can be installed as a
/// [`DeviceFile`](crate::EntryKind::DeviceFile).
pub trait Device {
    /// Reads the next chunk of input.
    ///
    /// May suspend until input is available. An empty chunk signals end of
    /// input.
    fn read(&self) -> LocalBoxFuture<'_, Result<Bytes>>;

    fn write(&self, data: &[u8]) -> Result;
}

/// A storage device holding one or more partitions.
#[derive(Clone, Debug, Default)]
pub struct Storage {
    partitions: Vec<Filesystem>,
}

impl Storage {
    pub fn new(partitions: Vec<Filesystem>) -> Storage {
        Storage { partitions }
    }

    pub fn partitions(&self) -> &[Filesystem] {
        &self.partitions
    }
}

/// A terminal fed from the host.
///
/// Each chunk sent through the [`TtyHandle`] is returned by exactly one
/// `read`; everything written to the device accumulates on the handle's
/// side until drained.
pub struct Tty {
    input: Mutex<mpsc::UnboundedReceiver<Bytes>>,
    output: Rc<RefCell<Vec<u8>>>,
}

/// Host side of a [`Tty`].
pub struct TtyHandle {
    input: RefCell<Option<mpsc::UnboundedSender<Bytes>>>,
    output: Rc<RefCell<Vec<u8>>>,
}

impl Tty {
    pub fn new() -> (Tty, TtyHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let output = Rc::new(RefCell::new(Vec::new()));

        let tty = Tty {
            input: Mutex::new(rx),
            output: output.clone(),
        };
        let handle = TtyHandle {
            input: RefCell::new(Some(tx)),
            output,
        };

        (tty, handle)
    }
}

impl Device for Tty {
    fn read(&self) -> LocalBoxFuture<'_, Result<Bytes>> {
        Box::pin(async move {
            let mut input = self.input.lock().await;
            Ok(input.recv().await.unwrap_or_default())
        })
    }

    fn write(&self, data: &[u8]) -> Result {
        self.output.borrow_mut().extend_from_slice(data);
        Ok(())
    }
}

impl TtyHandle {
    /// Queues one chunk of keyboard input.
    pub fn send(&self, input: impl Into<Bytes>) -> Result {
        match &*self.input.borrow() {
            Some(tx) => tx.send(input.into()).map_err(|_| Error::Io),
            None => Err(Error::Io),
        }
    }

    /// Closes the input side; once queued chunks are consumed, reads
    /// return end of input.
    pub fn hang_up(&self) {
        self.input.borrow_mut().take();
    }

    /// Everything written to the terminal so far.
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.output.borrow()).into_owned()
    }

    /// Drains the output written so far.
    pub fn take_output(&self) -> String {
        let output = mem::take(&mut *self.output.borrow_mut());
        String::from_utf8_lossy(&output).into_owned()
    }
}
