//! Line classification for the motion-controller protocol.
//!
//! The firmware speaks newline-delimited ASCII: G-code-style commands out,
//! position reports and short acknowledgments back. This module holds the
//! shared link state and the pure transition function applied to every
//! received line; the background reader (`reader` module) owns the I/O.
//!
//! Firmware response shapes, as observed on the wire:
//! - `G0`: acks the request immediately, then moves. We follow up with
//!   `M400` (block until the queue drains) and treat *its* ack as
//!   motion-complete.
//! - `G28`: no ack for the request itself; emits a position report line
//!   followed by the ack once homed.
//! - `M114`: position report line, then ack.

use std::fmt;
use std::str::FromStr;

/// Acknowledgment token sent by the firmware after processing a line.
pub const ACK: &str = "ok";
/// Position reports start with the X-axis field.
pub const POSITION_MARKER: &str = "X:";

/// Absolute positioning mode, sent once on connect.
pub const CMD_ABSOLUTE: &str = "G90";
/// Block until all queued moves have finished.
pub const CMD_WAIT_MOVES: &str = "M400";
/// Immediate halt; the firmware may not acknowledge it.
pub const CMD_EMERGENCY_STOP: &str = "M112";
/// Request a position report.
pub const CMD_GET_POSITION: &str = "M114";

/// The two axes this machine drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Z,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => f.write_str("X"),
            Axis::Z => f.write_str("Z"),
        }
    }
}

/// Firmware-side command-in-flight state, advanced only by classified
/// response lines (plus the explicit Idle override used on abort/reset).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Disconnected,
    Idle,
    HomingZ,
    ZMoveStarted,
    ZMoveWaitAck1,
    ZMoveWaitAck2,
    HomingX,
    XHomed,
    MoveStarted,
    MoveWaitComplete,
    MoveCompleted,
    GetPosition,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControllerState::Disconnected => "disconnected",
            ControllerState::Idle => "idle",
            ControllerState::HomingZ => "homing_z",
            ControllerState::ZMoveStarted => "z_move_started",
            ControllerState::ZMoveWaitAck1 => "z_move_wait_ack_1",
            ControllerState::ZMoveWaitAck2 => "z_move_wait_ack_2",
            ControllerState::HomingX => "homing_x",
            ControllerState::XHomed => "x_homed",
            ControllerState::MoveStarted => "move_started",
            ControllerState::MoveWaitComplete => "move_wait_complete",
            ControllerState::MoveCompleted => "move_completed",
            ControllerState::GetPosition => "get_position",
        };
        f.write_str(s)
    }
}

impl FromStr for ControllerState {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let st = match s {
            "disconnected" => ControllerState::Disconnected,
            "idle" => ControllerState::Idle,
            "homing_z" => ControllerState::HomingZ,
            "z_move_started" => ControllerState::ZMoveStarted,
            "z_move_wait_ack_1" => ControllerState::ZMoveWaitAck1,
            "z_move_wait_ack_2" => ControllerState::ZMoveWaitAck2,
            "homing_x" => ControllerState::HomingX,
            "x_homed" => ControllerState::XHomed,
            "move_started" => ControllerState::MoveStarted,
            "move_wait_complete" => ControllerState::MoveWaitComplete,
            "move_completed" => ControllerState::MoveCompleted,
            "get_position" => ControllerState::GetPosition,
            _ => return Err(UnknownName),
        };
        Ok(st)
    }
}

/// Parse failure for a persisted state name (snapshot from a newer or
/// corrupted file); callers fall back to a safe default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown state name")]
pub struct UnknownName;

/// Best-known machine coordinates. Advisory only: updated optimistically on
/// command issue and opportunistically from position reports; the firmware
/// planner remains the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub z: f64,
}

/// State cell shared between the command side and the background reader.
/// The reader is the only writer once a command is in flight.
#[derive(Debug)]
pub struct LinkShared {
    pub state: ControllerState,
    pub position: Position,
    /// One-shot absorption of the known firmware double-ack on Z moves.
    /// Consumed in `ZMoveWaitAck1`; deliberately not generalized beyond
    /// that single arc (unverified whether the quirk applies elsewhere).
    pub burn_extra_ack: bool,
}

impl LinkShared {
    pub fn new() -> Self {
        Self {
            state: ControllerState::Disconnected,
            position: Position::default(),
            burn_extra_ack: false,
        }
    }
}

impl Default for LinkShared {
    fn default() -> Self {
        Self::new()
    }
}

/// Classified result of one received line, surfaced on the link's event
/// channel for observability and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinkEvent {
    Ack {
        from: ControllerState,
        to: ControllerState,
    },
    PositionReport(Position),
    /// Unparseable line or an acknowledgment no in-flight command expects.
    Ignored,
}

/// What the reader must do after classifying a line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    /// Command to send immediately (the `M400` follow-up after a move ack).
    pub follow_up: Option<&'static str>,
    pub event: LinkEvent,
}

impl Outcome {
    fn ignored() -> Self {
        Self {
            follow_up: None,
            event: LinkEvent::Ignored,
        }
    }
}

/// Apply one response line to the shared state.
///
/// Position reports update coordinates without a state transition; homing
/// completion still requires the acknowledgment that follows the report.
/// Acknowledgments advance the state machine per the command in flight;
/// an ack in any other state is ignored (protocol desync stalls, never
/// crashes).
pub fn apply_line(shared: &mut LinkShared, line: &str) -> Outcome {
    if line.starts_with(POSITION_MARKER) {
        return match parse_position(line) {
            Some(pos) => {
                shared.position = pos;
                Outcome {
                    follow_up: None,
                    event: LinkEvent::PositionReport(pos),
                }
            }
            None => Outcome::ignored(),
        };
    }

    if line != ACK {
        return Outcome::ignored();
    }

    use ControllerState::*;
    let from = shared.state;
    let (to, follow_up) = match from {
        HomingX => (XHomed, None),
        HomingZ => (Idle, None),
        MoveStarted => (MoveWaitComplete, Some(CMD_WAIT_MOVES)),
        MoveWaitComplete => (MoveCompleted, None),
        ZMoveStarted => (ZMoveWaitAck1, Some(CMD_WAIT_MOVES)),
        ZMoveWaitAck1 => {
            if shared.burn_extra_ack {
                shared.burn_extra_ack = false;
                (ZMoveWaitAck2, None)
            } else {
                (Idle, None)
            }
        }
        ZMoveWaitAck2 => (Idle, None),
        GetPosition => (Idle, None),
        Disconnected | Idle | XHomed | MoveCompleted => return Outcome::ignored(),
    };
    shared.state = to;
    Outcome {
        follow_up,
        event: LinkEvent::Ack { from, to },
    }
}

/// Parse a report like `X:0.00 Y:370.00 Z:0.00 E:0.00 Count X:0 Y:29600 Z:0`.
/// Only the first X and Z fields count; the trailing `Count` block repeats
/// the axis prefixes with step counts.
fn parse_position(line: &str) -> Option<Position> {
    let mut x: Option<f64> = None;
    let mut z: Option<f64> = None;
    for token in line.split_whitespace() {
        if let Some(v) = token.strip_prefix("X:") {
            if x.is_none() {
                x = v.parse().ok();
            }
        } else if let Some(v) = token.strip_prefix("Z:") {
            if z.is_none() {
                z = v.parse().ok();
            }
        }
    }
    Some(Position { x: x?, z: z? })
}
