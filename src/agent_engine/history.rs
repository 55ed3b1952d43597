use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::agent_engine::state::ProgressEvent;
use crate::errors::GatherResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub ts: i64,
    pub session_id: String,
    #[serde(flatten)]
    pub event: ProgressEvent,
}

/// Append-only JSONL log of one session's progress events.
pub struct SessionHistory {
    pub session_id: String,
    file_path: PathBuf,
}

impl SessionHistory {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self::in_dir(session_id, &data_dir_or_cwd())
    }

    pub fn in_dir(session_id: impl Into<String>, dir: &Path) -> Self {
        let session_id = session_id.into();
        let file_path = dir.join(format!("session_{session_id}.jsonl"));
        Self {
            session_id,
            file_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn append(&self, event: ProgressEvent) -> GatherResult<()> {
        let entry = HistoryEntry {
            ts: chrono::Utc::now().timestamp_millis(),
            session_id: self.session_id.clone(),
            event,
        };
        let line = serde_json::to_string(&entry)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Record every event from `rx` until the bus closes or the session
    /// finishes. State-change chatter is skipped.
    pub fn spawn_recorder(self, mut rx: broadcast::Receiver<ProgressEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::debug!(path = %self.file_path.display(), "recording session history");
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "history recorder lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if matches!(event, ProgressEvent::StateChanged { .. }) {
                    continue;
                }
                let finished = matches!(event, ProgressEvent::SessionFinished { .. });
                if let Err(e) = self.append(event) {
                    tracing::warn!(error = %e, "history write failed");
                }
                if finished {
                    break;
                }
            }
        })
    }
}

/// `<local data dir>/gatherbot/sessions`, falling back to the working
/// directory when no data dir is known.
fn data_dir_or_cwd() -> PathBuf {
    if let Some(base) = dirs::data_local_dir() {
        let d = base.join("gatherbot").join("sessions");
        match std::fs::create_dir_all(&d) {
            Ok(()) => return d,
            Err(e) => tracing::warn!(path = %d.display(), error = %e, "cannot create history dir"),
        }
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
