//! Background reader loop: chunked serial input to classified line events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::Sender;
use tracing::{error, trace, warn};

use crate::protocol::{LinkEvent, LinkShared, apply_line};
use feeder_traits::{LineReader, LineWriter};

/// Accumulate bytes from the transport, split on newlines, and run each
/// complete line through the protocol state machine. Holds the shared lock
/// only across `apply_line`; follow-up commands go out after it is
/// released so the command side never sees both locks held at once.
pub fn read_loop(
    mut reader: Box<dyn LineReader>,
    writer: Arc<Mutex<Box<dyn LineWriter>>>,
    shared: Arc<Mutex<LinkShared>>,
    events: Sender<LinkEvent>,
    stop: Arc<AtomicBool>,
) {
    let mut buf = [0u8; 256];
    let mut pending: Vec<u8> = Vec::with_capacity(256);

    while !stop.load(Ordering::Relaxed) {
        let n = match reader.read_chunk(&mut buf) {
            Ok(0) => continue, // timeout tick, lets the stop flag be checked
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "serial read failed");
                std::thread::sleep(Duration::from_millis(10));
                continue;
            }
        };
        pending.extend_from_slice(&buf[..n]);

        while let Some(nl) = pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = pending.drain(..=nl).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                continue;
            }
            trace!(line, "recv");

            let outcome = {
                let Ok(mut s) = shared.lock() else {
                    error!("shared lock poisoned, reader exiting");
                    return;
                };
                apply_line(&mut s, line)
            };

            if let Some(cmd) = outcome.follow_up {
                match writer.lock() {
                    Ok(mut w) => {
                        if let Err(e) = w.write_line(cmd) {
                            error!(error = %e, command = cmd, "follow-up write failed");
                        }
                    }
                    Err(_) => error!("writer lock poisoned"),
                }
            }

            // Receiver gone means the link was dropped; loop exits on stop.
            let _ = events.send(outcome.event);
        }
    }
}
