//! Run orchestration: bounded fan-out over the inventory, the append-only
//! run log, and the order-normalized run summary.
//!
//! Devices are independent units of work. A bounded pool of workers runs
//! each dispatch to completion; results flow through a single collector that
//! appends run-log entries as they arrive and slots each result by its
//! inventory index, so the summary always matches inventory order no matter
//! the completion order. The collector is the only shared aggregation point
//! and no lock is held across network I/O.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use log::{info, warn};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;

use crate::dispatch::{BackupResult, BackupStatus, Dispatcher};
use crate::error::StorageError;
use crate::inventory::DeviceRecord;
use crate::transport::Connect;

/// Tunables for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Maximum devices in flight at once.
    pub max_concurrency: usize,

    /// Optional bound on the whole run's wall-clock time. On expiry,
    /// in-flight dispatches are dropped (their transports close on drop) and
    /// recorded as timeouts; completed results are preserved unchanged.
    pub deadline: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            deadline: None,
        }
    }
}

/// Final, order-normalized outcome of a run.
#[derive(Debug)]
pub struct RunSummary {
    /// One result per inventory device, in inventory order.
    pub results: Vec<BackupResult>,

    /// Devices backed up.
    pub succeeded: usize,

    /// Devices that failed.
    pub failed: usize,

    /// Devices that timed out.
    pub timed_out: usize,

    /// Run start time.
    pub started_at: DateTime<Utc>,

    /// Run end time.
    pub finished_at: DateTime<Utc>,

    /// Total wall-clock time.
    pub elapsed: Duration,
}

impl RunSummary {
    /// Number of devices in the run.
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Whether every device was backed up.
    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total()
    }
}

/// Append-only structured run log. One JSON line per completed dispatch,
/// flushed per entry, so a crash mid-run leaves a readable partial record.
pub struct RunLog {
    file: tokio::fs::File,
}

#[derive(Serialize)]
struct RunLogEntry<'a> {
    device: &'a str,
    status: String,
    message: Option<&'a str>,
    duration_ms: u128,
    finished_at: String,
}

impl RunLog {
    /// Create (or truncate) the log file at `path`.
    pub async fn create(path: &Path) -> Result<Self, StorageError> {
        let file = tokio::fs::File::create(path)
            .await
            .map_err(|source| StorageError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self { file })
    }

    /// Append one entry and flush it to disk.
    pub async fn append(&mut self, result: &BackupResult) -> std::io::Result<()> {
        let entry = RunLogEntry {
            device: &result.device,
            status: result.status.to_string(),
            message: result.message.as_deref(),
            duration_ms: result.elapsed.as_millis(),
            finished_at: result.finished_at.to_rfc3339(),
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await
    }
}

/// Dispatch every device and aggregate the outcomes.
///
/// Exactly one [`BackupResult`] is produced per device; a worker panic or a
/// run-deadline expiry still yields a terminal entry for its device.
pub async fn run_backup<C>(
    dispatcher: Arc<Dispatcher<C>>,
    devices: &[DeviceRecord],
    options: &RunOptions,
    mut run_log: Option<&mut RunLog>,
) -> RunSummary
where
    C: Connect + Send + Sync + 'static,
{
    let started_at = Utc::now();
    let started = std::time::Instant::now();
    let run_deadline = options
        .deadline
        .map(|d| tokio::time::Instant::now() + d);
    info!(
        "Starting run: {} devices, {} workers",
        devices.len(),
        options.max_concurrency
    );

    let semaphore = Arc::new(Semaphore::new(options.max_concurrency.max(1)));
    let mut tasks = FuturesUnordered::new();

    for (idx, device) in devices.iter().cloned().enumerate() {
        let dispatcher = Arc::clone(&dispatcher);
        let semaphore = Arc::clone(&semaphore);

        tasks.push(tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return (idx, terminal(&device, BackupStatus::Failure, "worker pool closed")),
            };

            let result = match run_deadline {
                None => dispatcher.dispatch(&device).await,
                Some(at) => match tokio::time::timeout_at(at, dispatcher.dispatch(&device)).await {
                    Ok(result) => result,
                    // The dropped dispatch future closes its transport.
                    Err(_) => terminal(&device, BackupStatus::Timeout, "run deadline exceeded"),
                },
            };
            (idx, result)
        }));
    }

    let mut slots: Vec<Option<BackupResult>> = devices.iter().map(|_| None).collect();
    while let Some(joined) = tasks.next().await {
        match joined {
            Ok((idx, result)) => {
                if let Some(log) = run_log.as_deref_mut() {
                    if let Err(e) = log.append(&result).await {
                        warn!("Failed to append run log entry: {e}");
                    }
                }
                slots[idx] = Some(result);
            }
            Err(join_error) => {
                warn!("Dispatch task panicked: {join_error}");
            }
        }
    }

    // Order-normalize: inventory order, one result per device, even if a
    // worker died without reporting.
    let results: Vec<BackupResult> = slots
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| {
            slot.unwrap_or_else(|| {
                terminal(&devices[idx], BackupStatus::Failure, "dispatch worker panicked")
            })
        })
        .collect();

    let succeeded = results.iter().filter(|r| r.is_success()).count();
    let timed_out = results
        .iter()
        .filter(|r| r.status == BackupStatus::Timeout)
        .count();
    let failed = results.len() - succeeded - timed_out;

    let finished_at = Utc::now();
    let elapsed = started.elapsed();
    info!(
        "Run finished: {succeeded} ok, {failed} failed, {timed_out} timed out in {elapsed:?}"
    );

    RunSummary {
        results,
        succeeded,
        failed,
        timed_out,
        started_at,
        finished_at,
        elapsed,
    }
}

/// A terminal result produced outside a dispatch (deadline expiry, worker
/// loss).
fn terminal(device: &DeviceRecord, status: BackupStatus, message: &str) -> BackupResult {
    let now = Utc::now();
    BackupResult {
        device: device.name.clone(),
        status,
        message: Some(message.to_string()),
        artifact: None,
        payload_bytes: 0,
        started_at: now,
        finished_at: now,
        elapsed: Duration::ZERO,
    }
}
