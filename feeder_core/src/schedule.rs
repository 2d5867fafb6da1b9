//! Feed scheduling: fixed intervals or a daily wall-clock time.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, Timelike};
use tracing::{info, warn};

const SECS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleMode {
    Interval,
    Daily,
}

impl fmt::Display for ScheduleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleMode::Interval => f.write_str("interval"),
            ScheduleMode::Daily => f.write_str("daily"),
        }
    }
}

impl FromStr for ScheduleMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interval" => Ok(ScheduleMode::Interval),
            "daily" => Ok(ScheduleMode::Daily),
            _ => Err(UnknownMode),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown schedule mode")]
pub struct UnknownMode;

/// Next-feed bookkeeping. All decisions are made against a caller-supplied
/// `now` so tests never touch the wall clock.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedScheduler {
    mode: ScheduleMode,
    interval_hours: f64,
    daily_hour: u32,
    daily_minute: u32,
    /// Unix timestamp of the next feed; `None` while unarmed.
    next_feed_at: Option<i64>,
}

impl FeedScheduler {
    pub fn new(mode: ScheduleMode, interval_hours: f64, daily_hour: u32, daily_minute: u32) -> Self {
        Self {
            mode,
            interval_hours: interval_hours.clamp(1.0, 48.0),
            daily_hour: daily_hour.min(23),
            daily_minute: daily_minute.min(59),
            next_feed_at: None,
        }
    }

    pub fn mode(&self) -> ScheduleMode {
        self.mode
    }

    pub fn interval_hours(&self) -> f64 {
        self.interval_hours
    }

    pub fn daily_time(&self) -> (u32, u32) {
        (self.daily_hour, self.daily_minute)
    }

    pub fn next_feed_at(&self) -> Option<i64> {
        self.next_feed_at
    }

    pub fn set_next_feed_at(&mut self, ts: Option<i64>) {
        self.next_feed_at = ts;
    }

    pub fn set_mode(&mut self, mode: ScheduleMode) {
        self.mode = mode;
    }

    pub fn set_interval_hours(&mut self, hours: f64) {
        self.interval_hours = hours.clamp(1.0, 48.0);
    }

    pub fn set_daily_time(&mut self, hour: u32, minute: u32) {
        self.daily_hour = hour.min(23);
        self.daily_minute = minute.min(59);
    }

    fn at_time(&self, day: DateTime<Local>) -> Option<DateTime<Local>> {
        day.with_hour(self.daily_hour)
            .and_then(|d| d.with_minute(self.daily_minute))
            .and_then(|d| d.with_second(0))
            .and_then(|d| d.with_nanosecond(0))
    }

    /// Arm the daily trigger: today at the configured time, or tomorrow if
    /// that instant is already strictly in the past.
    pub fn activate_daily(&mut self, now: DateTime<Local>) {
        let Some(mut target) = self.at_time(now) else {
            warn!("daily feed time does not exist today, skipping arm");
            return;
        };
        if target < now {
            target += chrono::Duration::seconds(SECS_PER_DAY);
        }
        info!(at = %target, "daily feed armed");
        self.next_feed_at = Some(target.timestamp());
    }

    /// Arm the interval trigger relative to now.
    pub fn arm_interval(&mut self, now: DateTime<Local>) {
        let ts = now.timestamp() + (self.interval_hours * 3600.0) as i64;
        info!(in_hours = self.interval_hours, "interval feed armed");
        self.next_feed_at = Some(ts);
    }

    /// Arm whichever trigger the mode calls for, if unarmed.
    pub fn auto_activate(&mut self, now: DateTime<Local>) {
        if self.next_feed_at.is_some() {
            return;
        }
        match self.mode {
            ScheduleMode::Daily => self.activate_daily(now),
            ScheduleMode::Interval => self.arm_interval(now),
        }
    }

    /// Repair a trigger restored from disk that already lapsed while the
    /// machine was off. Strictly-past only; a trigger equal to now is left
    /// for `is_due` to fire. Returns true when a correction was made.
    pub fn startup_recovery(&mut self, now: DateTime<Local>) -> bool {
        let Some(t) = self.next_feed_at else {
            return false;
        };
        if t >= now.timestamp() {
            return false;
        }
        warn!(missed = t, "feed trigger lapsed while powered down");
        match self.mode {
            // Missed daily feeds are not caught up; the next feed lands
            // tomorrow at the configured time, even when today's instant
            // has not yet passed.
            ScheduleMode::Daily => match self.at_time(now) {
                Some(today) => {
                    let target = today + chrono::Duration::seconds(SECS_PER_DAY);
                    info!(at = %target, "daily feed rescheduled");
                    self.next_feed_at = Some(target.timestamp());
                }
                None => {
                    warn!("daily feed time does not exist today, disarming");
                    self.next_feed_at = None;
                }
            },
            ScheduleMode::Interval => self.arm_interval(now),
        }
        true
    }

    pub fn is_due(&self, now: DateTime<Local>) -> bool {
        self.next_feed_at.is_some_and(|t| now.timestamp() >= t)
    }

    /// Re-arm after a trigger fires. Daily advances a fixed day from the
    /// scheduled instant so the wall-clock time never drifts; interval
    /// counts from now.
    pub fn advance_after_trigger(&mut self, now: DateTime<Local>) {
        match (self.mode, self.next_feed_at) {
            (ScheduleMode::Daily, Some(t)) => self.next_feed_at = Some(t + SECS_PER_DAY),
            (ScheduleMode::Daily, None) => self.activate_daily(now),
            (ScheduleMode::Interval, _) => self.arm_interval(now),
        }
    }

    /// "Reset interval" operator command: drop any armed trigger, switch
    /// to interval mode, and re-arm from now.
    pub fn reset(&mut self, now: DateTime<Local>) {
        self.mode = ScheduleMode::Interval;
        self.arm_interval(now);
    }
}

