//! Listeners shipped with the node

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;
use votifier_core::{ListenerError, Vote, VoteListener};

use crate::error::NodeError;

/// Logs every vote
pub struct LogListener;

impl VoteListener for LogListener {
    fn name(&self) -> &str {
        "log"
    }

    fn on_vote(&self, vote: &Vote) -> Result<(), ListenerError> {
        info!("Vote: {} voted on {}", vote.username(), vote.service_name());
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoteLogEntry<'a> {
    #[serde(flatten)]
    vote: &'a Vote,
    received_at: DateTime<Utc>,
}

/// Appends each vote as one JSON line
pub struct VoteLogListener {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl VoteLogListener {
    pub fn open(path: &Path) -> Result<Self, NodeError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| NodeError::Write {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VoteListener for VoteLogListener {
    fn name(&self) -> &str {
        "vote-log"
    }

    fn on_vote(&self, vote: &Vote) -> Result<(), ListenerError> {
        let entry = VoteLogEntry {
            vote,
            received_at: Utc::now(),
        };
        let line = serde_json::to_string(&entry)?;

        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}
