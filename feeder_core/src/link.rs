//! Serial session with the motion controller.
//!
//! `MotionLink::connect` takes the two halves of a line transport, puts the
//! firmware into absolute positioning, and spawns a background reader that
//! feeds every response line through [`crate::protocol::apply_line`]. The
//! link is the only command writer; the reader thread is the only state
//! writer while a command is in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, unbounded};
use tracing::{debug, error, info, warn};

use crate::protocol::{
    Axis, CMD_ABSOLUTE, CMD_EMERGENCY_STOP, CMD_GET_POSITION, ControllerState, LinkEvent,
    LinkShared, Position,
};
use crate::reader::read_loop;
use feeder_traits::{LineReader, LineWriter};

pub struct MotionLink {
    writer: Arc<Mutex<Box<dyn LineWriter>>>,
    shared: Arc<Mutex<LinkShared>>,
    events: Receiver<LinkEvent>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl MotionLink {
    /// Open the session: mark the link idle, switch the firmware to
    /// absolute positioning, start the reader thread.
    pub fn connect<W, R>(writer: W, reader: R) -> Self
    where
        W: LineWriter + 'static,
        R: LineReader + 'static,
    {
        let writer: Arc<Mutex<Box<dyn LineWriter>>> = Arc::new(Mutex::new(Box::new(writer)));
        let shared = Arc::new(Mutex::new(LinkShared::new()));
        if let Ok(mut s) = shared.lock() {
            s.state = ControllerState::Idle;
        }
        let (tx, rx) = unbounded();

        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let writer = Arc::clone(&writer);
            let shared = Arc::clone(&shared);
            let stop = Arc::clone(&stop);
            let reader: Box<dyn LineReader> = Box::new(reader);
            std::thread::Builder::new()
                .name("motion-reader".into())
                .spawn(move || read_loop(reader, writer, shared, tx, stop))
        };
        let reader = match handle {
            Ok(h) => Some(h),
            Err(e) => {
                error!(error = %e, "failed to spawn reader thread");
                None
            }
        };

        let link = Self {
            writer,
            shared,
            events: rx,
            stop,
            reader,
        };
        info!("motion link connected");
        link.send(CMD_ABSOLUTE);
        link
    }

    /// Queue a single command line. Logged and dropped when the link is
    /// down; a serial write failure marks the link disconnected.
    pub fn send(&self, line: &str) {
        if self.state() == ControllerState::Disconnected {
            warn!(command = line, "link disconnected, command dropped");
            return;
        }
        debug!(command = line, "send");
        let Ok(mut w) = self.writer.lock() else {
            error!("writer lock poisoned");
            return;
        };
        if let Err(e) = w.write_line(line) {
            error!(error = %e, command = line, "serial write failed");
            drop(w);
            self.set_state(ControllerState::Disconnected);
        }
    }

    /// `G28 <axis>`. Completion is `XHomed` for X and `Idle` for Z.
    pub fn home_axis(&self, axis: Axis) {
        if !self.is_connected() {
            warn!(%axis, "link disconnected, home dropped");
            return;
        }
        self.set_state(match axis {
            Axis::X => ControllerState::HomingX,
            Axis::Z => ControllerState::HomingZ,
        });
        self.send(&format!("G28 {axis}"));
    }

    /// `G0` to an absolute target. The stored position is updated
    /// optimistically; the reader confirms completion via the M400 ack arc.
    pub fn move_linear(&self, axis: Axis, target: f64, feed: f64) {
        if !self.is_connected() {
            warn!(%axis, target, "link disconnected, move dropped");
            return;
        }
        {
            let Ok(mut s) = self.shared.lock() else {
                error!("shared lock poisoned");
                return;
            };
            match axis {
                Axis::X => s.position.x = target,
                Axis::Z => s.position.z = target,
            }
            s.state = match axis {
                Axis::X => ControllerState::MoveStarted,
                Axis::Z => ControllerState::ZMoveStarted,
            };
        }
        self.send(&format!("G0 {axis}{target:.2} F{feed:.0}"));
    }

    /// `M106`: fan duty from a 0-100 percentage, clamped.
    pub fn set_fan_speed(&self, channel: u8, percent: u8) {
        let duty = u32::from(percent.min(100)) * 255 / 100;
        self.send(&format!("M106 P{channel} S{duty}"));
    }

    /// `M112`. Sent unconditionally; the firmware halts without acking, so
    /// the caller is responsible for resetting the link state afterwards.
    pub fn emergency_stop(&self) {
        warn!("emergency stop issued");
        self.send(CMD_EMERGENCY_STOP);
    }

    /// `M114`; the reader parses the report and the trailing ack returns
    /// the state to idle.
    pub fn request_position(&self) {
        if !self.is_connected() {
            warn!("link disconnected, position request dropped");
            return;
        }
        self.set_state(ControllerState::GetPosition);
        self.send(CMD_GET_POSITION);
    }

    pub fn state(&self) -> ControllerState {
        self.shared
            .lock()
            .map(|s| s.state)
            .unwrap_or(ControllerState::Disconnected)
    }

    pub fn set_state(&self, state: ControllerState) {
        if let Ok(mut s) = self.shared.lock() {
            s.state = state;
        }
    }

    pub fn position(&self) -> Position {
        self.shared
            .lock()
            .map(|s| s.position)
            .unwrap_or_default()
    }

    pub fn set_position(&self, pos: Position) {
        if let Ok(mut s) = self.shared.lock() {
            s.position = pos;
        }
    }

    /// Arm one-shot absorption of the firmware's extra Z-move ack.
    pub fn set_burn_extra_ack(&self, burn: bool) {
        if let Ok(mut s) = self.shared.lock() {
            s.burn_extra_ack = burn;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() != ControllerState::Disconnected
    }

    /// Classified response stream, in arrival order.
    pub fn events(&self) -> &Receiver<LinkEvent> {
        &self.events
    }

    /// Stop the reader thread and mark the link down. Idempotent.
    pub fn disconnect(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.reader.take() {
            if h.join().is_err() {
                error!("reader thread panicked");
            }
        }
        self.set_state(ControllerState::Disconnected);
    }
}

impl Drop for MotionLink {
    fn drop(&mut self) {
        self.disconnect();
    }
}
