//! Test and helper mocks for feeder_core

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};

use feeder_traits::{ButtonId, ButtonPad, LineReader, LineWriter};

/// Writer half of an in-memory transport: every line sent over the link is
/// pushed onto a channel for assertion.
pub struct MockWriter {
    sent: Sender<String>,
}

impl LineWriter for MockWriter {
    fn write_line(&mut self, line: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.sent
            .send(line.to_string())
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
    }
}

/// Reader half: bytes fed by the test arrive as chunks, with a short
/// timeout standing in for the serial read timeout.
pub struct MockReader {
    feed: Receiver<Vec<u8>>,
}

impl LineReader for MockReader {
    fn read_chunk(
        &mut self,
        buf: &mut [u8],
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        match self.feed.recv_timeout(Duration::from_millis(20)) {
            Ok(bytes) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Err(_) => Ok(0),
        }
    }
}

/// Test-side handle for a mock transport pair.
pub struct MockTransportHandle {
    pub sent: Receiver<String>,
    feed: Sender<Vec<u8>>,
}

impl MockTransportHandle {
    /// Deliver one firmware response line, newline-terminated.
    pub fn respond(&self, line: &str) {
        let mut bytes = line.as_bytes().to_vec();
        bytes.extend_from_slice(b"\r\n");
        let _ = self.feed.send(bytes);
    }

    /// Deliver raw bytes with no terminator, for split-line cases.
    pub fn respond_bytes(&self, bytes: &[u8]) {
        let _ = self.feed.send(bytes.to_vec());
    }

    /// Next command the link wrote, or None after `timeout`.
    pub fn next_sent(&self, timeout: Duration) -> Option<String> {
        self.sent.recv_timeout(timeout).ok()
    }

    /// Drain whatever commands have been written so far.
    pub fn drain_sent(&self) -> Vec<String> {
        self.sent.try_iter().collect()
    }
}

/// Build a connected writer/reader pair plus its test handle.
pub fn mock_transport() -> (MockWriter, MockReader, MockTransportHandle) {
    let (sent_tx, sent_rx) = unbounded();
    let (feed_tx, feed_rx) = unbounded();
    (
        MockWriter { sent: sent_tx },
        MockReader { feed: feed_rx },
        MockTransportHandle {
            sent: sent_rx,
            feed: feed_tx,
        },
    )
}

/// Scriptable pad with shared levels, so a test can keep a clone and flip
/// buttons between polls while the source owns the other clone.
#[derive(Clone)]
pub struct ScriptPad {
    levels: std::sync::Arc<std::sync::Mutex<[Option<bool>; ButtonId::ALL.len()]>>,
}

impl ScriptPad {
    pub fn new() -> Self {
        Self {
            levels: std::sync::Arc::new(std::sync::Mutex::new(
                [Some(false); ButtonId::ALL.len()],
            )),
        }
    }

    pub fn set(&self, id: ButtonId, pressed: bool) {
        if let Ok(mut levels) = self.levels.lock() {
            levels[id.index()] = Some(pressed);
        }
    }

    pub fn set_unreadable(&self, id: ButtonId) {
        if let Ok(mut levels) = self.levels.lock() {
            levels[id.index()] = None;
        }
    }
}

impl Default for ScriptPad {
    fn default() -> Self {
        Self::new()
    }
}

impl ButtonPad for ScriptPad {
    fn read(&mut self, id: ButtonId) -> Option<bool> {
        self.levels.lock().ok().and_then(|levels| levels[id.index()])
    }
}
