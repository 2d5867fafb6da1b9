//! Top-level orchestration: one `tick` per main-loop cycle wires the link
//! events, the sequencer, the scheduler, and the cooldown fans together.

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::error::FeederError;
use crate::geometry::Geometry;
use crate::link::MotionLink;
use crate::protocol::{Axis, ControllerState, LinkEvent};
use crate::schedule::FeedScheduler;
use crate::sequencer::{DispensePhase, DispenseSequencer, TickOutcome};
use crate::snapshot::{SNAPSHOT_SCHEMA_VERSION, Snapshot, StateSink};

/// Cooling fan channels run during and after an operation.
pub const FAN_CHANNELS: [u8; 2] = [0, 1];
/// Fans stay on this long after the last operation finishes.
pub const FAN_COOLDOWN_SECS: i64 = 300;

pub struct Engine<S: StateSink> {
    link: MotionLink,
    seq: DispenseSequencer,
    sched: FeedScheduler,
    sink: S,
    /// Set across a whole dispense or eject, including the fan spin-up.
    operation_running: bool,
    /// Latched once the startup arc has returned everything to rest.
    startup_complete: bool,
    fan_off_at: Option<i64>,
    shutting_down: bool,
}

impl<S: StateSink> Engine<S> {
    pub fn new(link: MotionLink, geometry: Geometry, max_cans: u32, sched: FeedScheduler, sink: S) -> Self {
        Self {
            link,
            seq: DispenseSequencer::new(geometry, max_cans),
            sched,
            sink,
            operation_running: false,
            startup_complete: false,
            fan_off_at: None,
            shutting_down: false,
        }
    }

    pub fn link(&self) -> &MotionLink {
        &self.link
    }

    pub fn phase(&self) -> DispensePhase {
        self.seq.phase()
    }

    pub fn cans_loaded(&self) -> u32 {
        self.seq.cans_loaded()
    }

    pub fn scheduler(&self) -> &FeedScheduler {
        &self.sched
    }

    pub fn is_busy(&self) -> bool {
        self.operation_running || !self.seq.is_idle()
    }

    pub fn startup_complete(&self) -> bool {
        self.startup_complete
    }

    /// Rehydrate counts, positions and the armed trigger from a snapshot
    /// written by a previous run. Unknown state names fall back to idle.
    pub fn restore(&mut self, snap: &Snapshot) {
        self.seq.set_cans_loaded(snap.cans_loaded);
        self.seq.set_eject_last(snap.eject_last);
        self.link.set_position(crate::protocol::Position {
            x: snap.x_position,
            z: snap.z_position,
        });
        let state = snap
            .controller_state
            .parse()
            .unwrap_or(ControllerState::Idle);
        self.link.set_state(state);
        // The schedule can change at runtime, so the snapshot wins over
        // whatever the config seeded.
        if let Ok(mode) = snap.schedule_mode.parse() {
            self.sched.set_mode(mode);
        }
        self.sched.set_interval_hours(snap.interval_hours);
        self.sched.set_daily_time(snap.daily_hour, snap.daily_minute);
        self.sched
            .set_next_feed_at((snap.next_feed_at != 0).then_some(snap.next_feed_at));
        info!(cans = snap.cans_loaded, "state restored");
    }

    /// Repair any lapsed trigger, arm the schedule, kick the startup arc.
    pub fn begin_startup(&mut self, now: DateTime<Local>) {
        if self.sched.startup_recovery(now) {
            self.persist(now.timestamp());
        }
        self.sched.auto_activate(now);
        self.persist(now.timestamp());
        self.seq.begin_startup();
    }

    /// One main-loop cycle.
    pub fn tick(&mut self, now: DateTime<Local>) {
        for ev in self.link.events().try_iter() {
            match ev {
                LinkEvent::Ack { from, to } => debug!(%from, %to, "controller ack"),
                LinkEvent::PositionReport(p) => debug!(x = p.x, z = p.z, "position report"),
                LinkEvent::Ignored => {}
            }
        }

        let ts = now.timestamp();

        if !self.startup_complete
            && self.seq.is_idle()
            && self.link.state() == ControllerState::Idle
        {
            self.startup_complete = true;
            info!("startup sequence complete");
            self.persist(ts);
        }

        if self.startup_complete
            && !self.operation_running
            && !self.shutting_down
            && self.seq.phase() == DispensePhase::Idle
            && self.sched.is_due(now)
        {
            info!("scheduled feed due");
            self.sched.advance_after_trigger(now);
            if let Err(e) = self.start_dispense(ts) {
                warn!(error = %e, "scheduled feed skipped");
                self.persist(ts);
            }
        }

        match self.seq.tick(&self.link) {
            TickOutcome::Unchanged => {}
            TickOutcome::Started(phase) => {
                debug!(%phase, "phase started");
                self.persist(ts);
            }
            TickOutcome::Advanced { from, to } => {
                info!(%from, %to, "phase advanced");
                self.persist(ts);
            }
        }

        if self.operation_running
            && self.seq.phase() == DispensePhase::Idle
            && self.link.state() == ControllerState::Idle
        {
            self.operation_running = false;
            self.fan_off_at = Some(ts + FAN_COOLDOWN_SECS);
            info!("operation complete, fan cooldown armed");
            self.persist(ts);
        }

        if let Some(off_at) = self.fan_off_at {
            if ts >= off_at {
                self.fans(0);
                self.fan_off_at = None;
                debug!("cooldown fans off");
            }
        }
    }

    fn fans(&self, percent: u8) {
        for ch in FAN_CHANNELS {
            self.link.set_fan_speed(ch, percent);
        }
    }

    fn ready_for_operation(&self) -> Result<(), FeederError> {
        if self.shutting_down {
            return Err(FeederError::Busy("shutting down"));
        }
        if self.is_busy() {
            return Err(FeederError::Busy("operation in progress"));
        }
        if !self.startup_complete {
            return Err(FeederError::Busy("startup not complete"));
        }
        if self.link.state() != ControllerState::Idle {
            return Err(FeederError::Busy("controller not idle"));
        }
        Ok(())
    }

    /// Open and eject the topmost can.
    pub fn start_dispense(&mut self, ts: i64) -> Result<(), FeederError> {
        self.ready_for_operation()?;
        if self.seq.cans_loaded() == 0 {
            return Err(FeederError::NoCans);
        }
        self.operation_running = true;
        self.fan_off_at = None;
        self.fans(100);
        self.seq.begin_dispense();
        self.persist(ts);
        Ok(())
    }

    /// Eject without opening.
    pub fn start_eject(&mut self, ts: i64) -> Result<(), FeederError> {
        self.ready_for_operation()?;
        if self.seq.cans_loaded() == 0 {
            return Err(FeederError::NoCans);
        }
        self.operation_running = true;
        self.fan_off_at = None;
        self.fans(100);
        self.seq.begin_eject();
        self.persist(ts);
        Ok(())
    }

    /// Operator-initiated feed. Rejections are logged and swallowed so a
    /// button mash during an operation is a no-op.
    pub fn manual_feed(&mut self, ts: i64) {
        if let Err(e) = self.start_dispense(ts) {
            warn!(error = %e, "manual feed rejected");
        }
    }

    /// Halt motion, kill the fans, drop any in-flight operation.
    pub fn abort(&mut self, ts: i64) {
        self.seq.abort(&self.link);
        self.fans(0);
        self.fan_off_at = None;
        self.operation_running = false;
        self.persist(ts);
    }

    pub fn can_load_begin(&mut self) -> Result<(), FeederError> {
        self.seq.can_load_begin(&self.link)
    }

    pub fn can_load_confirm(&mut self) -> Result<(), FeederError> {
        self.seq.can_load_confirm(&self.link)
    }

    /// Edit the can count by hand and re-seat the stack.
    pub fn set_cans_loaded(&mut self, cans: u32, ts: i64) {
        self.seq.set_cans_loaded(cans);
        self.seq.apply_offset(&self.link);
        self.persist(ts);
    }

    /// Recalibrate the eject-last constant and re-seat the stack.
    pub fn set_eject_last(&mut self, eject_last: f64, ts: i64) {
        self.seq.set_eject_last(eject_last);
        self.seq.apply_offset(&self.link);
        self.persist(ts);
    }

    pub fn home_x(&mut self) -> Result<(), FeederError> {
        self.ready_for_operation()?;
        self.link.home_axis(Axis::X);
        Ok(())
    }

    pub fn home_z(&mut self) -> Result<(), FeederError> {
        self.ready_for_operation()?;
        self.link.home_axis(Axis::Z);
        Ok(())
    }

    pub fn request_position(&mut self) -> Result<(), FeederError> {
        self.ready_for_operation()?;
        self.link.request_position();
        Ok(())
    }

    /// Drop the armed trigger and re-arm from now.
    pub fn reset_schedule(&mut self, now: DateTime<Local>) {
        self.sched.reset(now);
        self.persist(now.timestamp());
    }

    /// Final persist and teardown. The engine refuses new operations once
    /// this has been called.
    pub fn shutdown(&mut self, ts: i64) {
        self.shutting_down = true;
        self.fans(0);
        self.persist(ts);
        self.link.disconnect();
        info!("engine shut down");
    }

    fn persist(&self, ts: i64) {
        let pos = self.link.position();
        let (daily_hour, daily_minute) = self.sched.daily_time();
        let snap = Snapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            phase: self.seq.phase().to_string(),
            controller_state: self.link.state().to_string(),
            x_position: pos.x,
            z_position: pos.z,
            cans_loaded: self.seq.cans_loaded(),
            eject_last: self.seq.geometry().eject_last,
            schedule_mode: self.sched.mode().to_string(),
            interval_hours: self.sched.interval_hours(),
            daily_hour,
            daily_minute,
            next_feed_at: self.sched.next_feed_at().unwrap_or(0),
            saved_at: ts,
        };
        self.sink.persist(&snap);
    }

    pub fn geometry(&self) -> &Geometry {
        self.seq.geometry()
    }
}
