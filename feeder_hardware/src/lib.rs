#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Hardware backends: the real serial port and GPIO button pad, plus
//! simulated stand-ins for running on a desk.

pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;
pub mod serial;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use feeder_traits::{ButtonId, ButtonPad, LineReader, LineWriter};

pub use error::HwError;

/// Pad with no buttons attached; every line reads released.
pub struct SimulatedPad;

impl ButtonPad for SimulatedPad {
    fn read(&mut self, _id: ButtonId) -> Option<bool> {
        Some(false)
    }
}

/// In-process stand-in for the controller firmware. Commands written to
/// the writer half produce canned responses on the reader half: moves and
/// fan/mode commands are acked, homes and position requests emit a report
/// before the ack.
pub struct SimulatedFirmware {
    inbox: Arc<Mutex<VecDeque<u8>>>,
}

pub struct SimulatedWriter {
    inbox: Arc<Mutex<VecDeque<u8>>>,
}

pub struct SimulatedReader {
    inbox: Arc<Mutex<VecDeque<u8>>>,
}

impl SimulatedFirmware {
    pub fn transport() -> (SimulatedWriter, SimulatedReader) {
        let inbox = Arc::new(Mutex::new(VecDeque::new()));
        (
            SimulatedWriter {
                inbox: Arc::clone(&inbox),
            },
            SimulatedReader { inbox },
        )
    }
}

impl SimulatedWriter {
    fn respond(&self, line: &str) {
        let Ok(mut q) = self.inbox.lock() else {
            return;
        };
        q.extend(line.as_bytes());
        q.extend(b"\r\n");
    }
}

impl LineWriter for SimulatedWriter {
    fn write_line(&mut self, line: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if line.starts_with("G28") || line.starts_with("M114") {
            self.respond("X:0.00 Y:0.00 Z:0.00 E:0.00 Count X:0 Y:0 Z:0");
        }
        self.respond("ok");
        Ok(())
    }
}

impl LineReader for SimulatedReader {
    fn read_chunk(
        &mut self,
        buf: &mut [u8],
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        {
            let Ok(mut q) = self.inbox.lock() else {
                return Ok(0);
            };
            if !q.is_empty() {
                let n = q.len().min(buf.len());
                for slot in buf.iter_mut().take(n) {
                    // Guarded by the is_empty check above.
                    *slot = q.pop_front().unwrap_or(0);
                }
                return Ok(n);
            }
        }
        std::thread::sleep(Duration::from_millis(20));
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn simulated_firmware_acks_moves() {
        let (mut w, mut r) = SimulatedFirmware::transport();
        w.write_line("G0 X10.00 F600").expect("write");
        let mut buf = [0u8; 64];
        let n = r.read_chunk(&mut buf).expect("read");
        assert_eq!(&buf[..n], b"ok\r\n");
    }

    #[rstest]
    fn simulated_firmware_reports_position_on_home() {
        let (mut w, mut r) = SimulatedFirmware::transport();
        w.write_line("G28 X").expect("write");
        let mut buf = [0u8; 128];
        let n = r.read_chunk(&mut buf).expect("read");
        let text = String::from_utf8_lossy(&buf[..n]).to_string();
        let mut lines = text.lines();
        assert!(lines.next().expect("report").starts_with("X:"));
        assert_eq!(lines.next(), Some("ok"));
    }
}
