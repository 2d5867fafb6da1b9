#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and the persisted snapshot schema for the can feeder.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - `Snapshot` is the versioned machine-state record persisted at every
//!   phase transition and schedule change. Enum-valued fields travel as
//!   strings so the schema stays readable and diffable on disk.

use serde::{Deserialize, Serialize};

/// Current snapshot schema version. Bump when the record shape changes.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// GPIO button pin assignments (BCM numbering, active-low with pull-up).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Pins {
    pub button_up: u8,
    pub button_down: u8,
    pub button_left: u8,
    pub button_right: u8,
    pub button_ok: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            button_up: 5,
            button_down: 19,
            button_left: 6,
            button_right: 26,
            button_ok: 13,
        }
    }
}

/// Serial link to the motion controller. Framing is fixed 8N1.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Serial {
    pub port: String,
    pub baud: u32,
    /// Per-read timeout for the background reader (ms).
    pub read_timeout_ms: u64,
}

impl Default for Serial {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud: 115_200,
            read_timeout_ms: 100,
        }
    }
}

/// Machine geometry in millimetres / mm-per-minute. The defaults are the
/// measured values for the reference mechanism.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Geometry {
    /// Z height at which the last (bottom) can is ejected.
    pub eject_last: f64,
    /// Z lift from the open position to the eject position.
    pub can_to_eject: f64,
    /// Z lift after eject to bring the next can level for opening.
    pub next_can: f64,
    /// Per-can Z pitch in the magazine.
    pub cartridge_height: f64,
    pub x_start: f64,
    pub x_tab_lift: f64,
    pub x_lid_peel: f64,
    pub x_eject: f64,
    pub feed_fast: f64,
    pub feed_slow: f64,
    pub feed_z: f64,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            eject_last: 318.0,
            can_to_eject: 21.0,
            next_can: 37.0,
            cartridge_height: 58.0,
            x_start: 165.0,
            x_tab_lift: 248.0,
            x_lid_peel: 25.0,
            x_eject: 248.0,
            feed_fast: 600.0,
            feed_slow: 150.0,
            feed_z: 300.0,
        }
    }
}

/// Feed schedule defaults applied when no snapshot exists yet.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Schedule {
    /// "interval" or "daily".
    pub mode: String,
    pub interval_hours: f64,
    pub daily_hour: u32,
    pub daily_minute: u32,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            mode: "interval".to_string(),
            interval_hours: 8.0,
            daily_hour: 6,
            daily_minute: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Magazine capacity.
    pub max_cans: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self { max_cans: 6 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// Path to a JSON-lines log file; stderr only when absent.
    pub file: Option<String>,
    /// "info", "debug", ...
    pub level: Option<String>,
}

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: Serial,
    pub pins: Pins,
    pub geometry: Geometry,
    pub schedule: Schedule,
    pub limits: Limits,
    pub logging: Logging,
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> eyre::Result<Self> {
        let cfg: Config = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Range checks that TOML typing cannot express.
    pub fn validate(&self) -> eyre::Result<()> {
        if self.serial.baud == 0 {
            eyre::bail!("serial.baud must be > 0");
        }
        if self.serial.read_timeout_ms == 0 {
            eyre::bail!("serial.read_timeout_ms must be >= 1");
        }
        match self.schedule.mode.as_str() {
            "interval" | "daily" => {}
            other => eyre::bail!("schedule.mode must be \"interval\" or \"daily\", got {other:?}"),
        }
        if !(1.0..=48.0).contains(&self.schedule.interval_hours) {
            eyre::bail!("schedule.interval_hours must be within 1..=48");
        }
        if self.schedule.daily_hour > 23 {
            eyre::bail!("schedule.daily_hour must be within 0..=23");
        }
        if self.schedule.daily_minute > 59 {
            eyre::bail!("schedule.daily_minute must be within 0..=59");
        }
        if self.geometry.cartridge_height <= 0.0 {
            eyre::bail!("geometry.cartridge_height must be > 0");
        }
        if self.geometry.can_to_eject < 0.0 || self.geometry.next_can < 0.0 {
            eyre::bail!("geometry lift offsets must be >= 0");
        }
        if self.limits.max_cans == 0 {
            eyre::bail!("limits.max_cans must be >= 1");
        }
        Ok(())
    }
}

/// Versioned machine-state record.
///
/// Written by the state sink at every phase transition and schedule change;
/// read back on startup to restore can count, calibration and the armed
/// feed time. Unknown future fields are ignored on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: u32,
    pub phase: String,
    pub controller_state: String,
    pub x_position: f64,
    pub z_position: f64,
    pub cans_loaded: u32,
    pub eject_last: f64,
    pub schedule_mode: String,
    pub interval_hours: f64,
    pub daily_hour: u32,
    pub daily_minute: u32,
    /// Unix seconds of the next scheduled feed; 0 when not armed.
    pub next_feed_at: i64,
    /// Unix seconds at which this record was written.
    pub saved_at: i64,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            phase: "idle".to_string(),
            controller_state: "idle".to_string(),
            x_position: 0.0,
            z_position: 0.0,
            cans_loaded: 0,
            eject_last: 318.0,
            schedule_mode: "interval".to_string(),
            interval_hours: 8.0,
            daily_hour: 6,
            daily_minute: 30,
            next_feed_at: 0,
            saved_at: 0,
        }
    }
}
