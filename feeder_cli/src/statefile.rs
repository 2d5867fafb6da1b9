//! JSON state file: the snapshot sink plus startup restore.
//!
//! Writes go to a temp file in the same directory and are renamed into
//! place so a power cut mid-write leaves the previous snapshot intact.
//! Persist failures are logged and swallowed; feeding never stops because
//! the SD card is unhappy.

use std::fs;
use std::path::PathBuf;

use tracing::{error, warn};

use feeder_core::snapshot::{SNAPSHOT_SCHEMA_VERSION, Snapshot, StateSink};

pub struct JsonStateFile {
    path: PathBuf,
}

impl JsonStateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read and validate the previous run's snapshot. Missing file is a
    /// normal first boot; a corrupt or wrong-version file is logged and
    /// discarded.
    pub fn load(&self) -> Option<Snapshot> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file unreadable");
                return None;
            }
        };
        let snap: Snapshot = match serde_json::from_str(&text) {
            Ok(s) => s,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file corrupt, ignoring");
                return None;
            }
        };
        if snap.schema_version != SNAPSHOT_SCHEMA_VERSION {
            warn!(
                found = snap.schema_version,
                expected = SNAPSHOT_SCHEMA_VERSION,
                "state file schema mismatch, ignoring"
            );
            return None;
        }
        Some(snap)
    }

    fn write(&self, snap: &Snapshot) -> std::io::Result<()> {
        let text = serde_json::to_string_pretty(snap)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)
    }
}

impl StateSink for JsonStateFile {
    fn persist(&self, snap: &Snapshot) {
        if let Err(e) = self.write(snap) {
            error!(path = %self.path.display(), error = %e, "state persist failed");
        }
    }
}
