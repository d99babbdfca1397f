//! In-memory Zemote used by the session tests.

use crate::protocol::NUM_BUTTONS;
use crate::transport::{Connector, LineSink, LineSource, TransportError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

enum Incoming {
    Line(String),
    Fail,
}

#[derive(Default)]
struct Device {
    replies: Mutex<HashMap<String, Vec<String>>>,
    written: Mutex<Vec<String>>,
    feed: Mutex<Option<Sender<Incoming>>>,
    refuse_open: AtomicBool,
    fail_writes: AtomicBool,
    opens: AtomicUsize,
}

/// Answers commands from a reply table. Handles are cheap clones of the same
/// device.
#[derive(Clone, Default)]
pub(crate) struct SimDevice {
    device: Arc<Device>,
}

impl SimDevice {
    /// A device that answers nothing.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A factory-fresh device in advanced mode.
    pub(crate) fn zemote() -> Self {
        Self::new()
            .reply("L", &["0"; NUM_BUTTONS])
            .reply("M", &["Mode: Advanced"])
    }

    /// Answer `command` with `lines` from now on.
    pub(crate) fn reply(&self, command: &str, lines: &[&str]) -> Self {
        self.device.replies.lock().insert(
            command.to_string(),
            lines.iter().map(ToString::to_string).collect(),
        );
        self.clone()
    }

    /// Emit an unsolicited line on the open link.
    pub(crate) fn push_line(&self, line: &str) {
        self.feed(Incoming::Line(line.to_string()));
    }

    /// Make the next read on the open link fail.
    pub(crate) fn break_link(&self) {
        self.feed(Incoming::Fail);
    }

    pub(crate) fn refuse_open(&self) {
        self.device.refuse_open.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_writes(&self) {
        self.device.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Every command line received so far.
    pub(crate) fn written(&self) -> Vec<String> {
        self.device.written.lock().clone()
    }

    pub(crate) fn opens(&self) -> usize {
        self.device.opens.load(Ordering::SeqCst)
    }

    fn feed(&self, incoming: Incoming) {
        if let Some(feed) = self.device.feed.lock().as_ref() {
            let _ = feed.send(incoming);
        }
    }
}

impl Connector for SimDevice {
    fn open(
        &self,
        port: &str,
        _baud_rate: u32,
    ) -> Result<(Box<dyn LineSource>, Box<dyn LineSink>), TransportError> {
        if self.device.refuse_open.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::NotFound, format!("no device at {port}")).into());
        }
        self.device.opens.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel();
        *self.device.feed.lock() = Some(tx.clone());
        Ok((
            Box::new(SimSource { incoming: rx }),
            Box::new(SimSink {
                device: Arc::clone(&self.device),
                outgoing: tx,
            }),
        ))
    }
}

struct SimSource {
    incoming: Receiver<Incoming>,
}

impl LineSource for SimSource {
    fn read_line(&mut self) -> Result<Option<String>, TransportError> {
        match self.incoming.recv_timeout(Duration::from_millis(10)) {
            Ok(Incoming::Line(line)) => Ok(Some(line)),
            Ok(Incoming::Fail) => {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged").into())
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }
}

struct SimSink {
    device: Arc<Device>,
    outgoing: Sender<Incoming>,
}

impl LineSink for SimSink {
    fn write_line(&mut self, text: &str) -> Result<(), TransportError> {
        if self.device.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed").into());
        }
        self.device.written.lock().push(text.to_string());

        let replies = self.device.replies.lock().get(text).cloned().unwrap_or_default();
        for line in replies {
            let _ = self.outgoing.send(Incoming::Line(line));
        }
        Ok(())
    }
}
