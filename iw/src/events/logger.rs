//! Event Logger - persists events to JSONL files
//!
//! Subscribes to the EventBus and appends every event of a run to
//! `{runs_dir}/{run_id}/events.jsonl`.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::Context;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::bus::EventBus;
use super::types::{EventLogEntry, ImageEvent};

/// Event logger that writes one run's events to a JSONL file
pub struct EventLogger {
    run_id: Uuid,
    log_path: PathBuf,
    writer: BufWriter<File>,
}

impl EventLogger {
    /// Create a logger for a new run under `runs_dir`
    pub fn create(runs_dir: impl AsRef<Path>) -> eyre::Result<Self> {
        let run_id = Uuid::now_v7();
        let run_dir = runs_dir.as_ref().join(run_id.to_string());
        fs::create_dir_all(&run_dir).context("Failed to create run directory")?;

        let log_path = run_dir.join("events.jsonl");
        debug!(?log_path, "EventLogger::create: creating log file");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .context("Failed to open event log")?;

        Ok(Self {
            run_id,
            log_path,
            writer: BufWriter::new(file),
        })
    }

    /// Default runs directory (`<data_local_dir>/imagewarm/runs`)
    pub fn default_runs_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("imagewarm")
            .join("runs")
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Append one event
    pub fn write_event(&mut self, event: &ImageEvent) -> eyre::Result<()> {
        let entry = EventLogEntry::new(self.run_id, event.clone());
        let json = serde_json::to_string(&entry)?;
        writeln!(self.writer, "{}", json)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Consume events from `rx` until every sender is gone
    ///
    /// Subscribe before spawning this, so events emitted before the task is
    /// first polled are not lost.
    pub async fn run(mut self, mut rx: broadcast::Receiver<ImageEvent>) {
        debug!(run_id = %self.run_id, "EventLogger::run: starting event logger");
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.write_event(&event) {
                        error!(error = %e, "EventLogger: failed to write event");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "EventLogger: lagged behind, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("EventLogger: channel closed, shutting down");
                    break;
                }
            }
        }
        let _ = self.writer.flush();
    }
}

/// Read all events of a run
pub fn read_run_events(runs_dir: impl AsRef<Path>, run_id: Uuid) -> eyre::Result<Vec<EventLogEntry>> {
    let log_path = runs_dir.as_ref().join(run_id.to_string()).join("events.jsonl");
    debug!(?log_path, "read_run_events: reading log file");

    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&log_path)?;
    let mut entries = Vec::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<EventLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(line, error = %e, "read_run_events: failed to parse line");
            }
        }
    }

    debug!(count = entries.len(), "read_run_events: loaded entries");
    Ok(entries)
}

/// Spawn the event logger as a background task
pub fn spawn_event_logger(
    event_bus: Arc<EventBus>,
    runs_dir: impl AsRef<Path>,
) -> eyre::Result<(Uuid, tokio::task::JoinHandle<()>)> {
    let logger = EventLogger::create(runs_dir)?;
    let run_id = logger.run_id();
    let rx = event_bus.subscribe();
    Ok((run_id, tokio::spawn(logger.run(rx))))
}
