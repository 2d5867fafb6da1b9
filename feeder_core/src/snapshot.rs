//! Persistence seam. The engine builds [`Snapshot`]s; where they go is the
//! caller's business (a JSON state file in the CLI, nothing in tests).

pub use feeder_config::{SNAPSHOT_SCHEMA_VERSION, Snapshot};

pub trait StateSink {
    /// Persist a snapshot. Failures must be handled internally; feeding
    /// never stops because the state file could not be written.
    fn persist(&self, snap: &Snapshot);
}

/// Sink that drops every snapshot.
pub struct NullSink;

impl StateSink for NullSink {
    fn persist(&self, _snap: &Snapshot) {}
}
