//! File-drop command inbox.
//!
//! Other processes (a web UI, cron, a shell one-liner) request actions by
//! writing small JSON files into the inbox directory. The main loop polls
//! it at a low rate, applies each command, and deletes the file whether or
//! not it was valid so a bad file cannot wedge the queue.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{info, warn};

/// Minimum spacing between directory scans.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InboxCommand {
    ManualFeed,
    Eject,
    Abort,
    ResetSchedule,
    SetCans { cans: u32 },
}

pub struct CommandInbox {
    dir: PathBuf,
    last_poll: Option<Instant>,
}

impl CommandInbox {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last_poll: None,
        }
    }

    /// Scan for command files if the poll interval has elapsed. Files are
    /// consumed in directory order; each is removed after parsing.
    pub fn poll(&mut self, now: Instant) -> Vec<InboxCommand> {
        if let Some(prev) = self.last_poll {
            if now.duration_since(prev) < POLL_INTERVAL {
                return Vec::new();
            }
        }
        self.last_poll = Some(now);

        let entries = match std::fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "inbox unreadable");
                return Vec::new();
            }
        };

        let mut commands = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_none_or(|e| e != "json") {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(text) => match serde_json::from_str::<InboxCommand>(&text) {
                    Ok(cmd) => {
                        info!(file = %path.display(), ?cmd, "inbox command");
                        commands.push(cmd);
                    }
                    Err(e) => warn!(file = %path.display(), error = %e, "bad inbox command"),
                },
                Err(e) => warn!(file = %path.display(), error = %e, "inbox file unreadable"),
            }
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(file = %path.display(), error = %e, "inbox file not removed");
            }
        }
        commands
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn parses_tagged_commands() {
        let cmd: InboxCommand = serde_json::from_str(r#"{"action":"manual_feed"}"#).unwrap();
        assert_eq!(cmd, InboxCommand::ManualFeed);
        let cmd: InboxCommand =
            serde_json::from_str(r#"{"action":"set_cans","cans":4}"#).unwrap();
        assert_eq!(cmd, InboxCommand::SetCans { cans: 4 });
        assert!(serde_json::from_str::<InboxCommand>(r#"{"action":"nope"}"#).is_err());
    }

    #[rstest]
    fn poll_consumes_files_and_respects_the_interval() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("feed.json"), r#"{"action":"manual_feed"}"#)
            .expect("write");
        std::fs::write(dir.path().join("notes.txt"), "ignore me").expect("write");

        let mut inbox = CommandInbox::new(dir.path());
        let t0 = Instant::now();
        assert_eq!(inbox.poll(t0), [InboxCommand::ManualFeed]);
        assert!(
            !dir.path().join("feed.json").exists(),
            "command file consumed"
        );
        assert!(dir.path().join("notes.txt").exists(), "non-json untouched");

        // A new command inside the poll interval waits for the next scan.
        std::fs::write(dir.path().join("abort.json"), r#"{"action":"abort"}"#)
            .expect("write");
        assert!(inbox.poll(t0 + Duration::from_millis(500)).is_empty());
        assert_eq!(
            inbox.poll(t0 + POLL_INTERVAL),
            [InboxCommand::Abort]
        );
    }

    #[rstest]
    fn bad_command_files_are_removed_without_wedging() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("bad.json"), "{").expect("write");
        let mut inbox = CommandInbox::new(dir.path());
        assert!(inbox.poll(Instant::now()).is_empty());
        assert!(!dir.path().join("bad.json").exists());
    }
}
