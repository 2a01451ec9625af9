//! Backup artifact persistence.
//!
//! Each run writes into `<root>/<YYYYMMDD>/`, one artifact per successful
//! device, named `<device>-<HHMMSS>.cfg` from the run's start timestamp.
//! Artifacts are write-once: the time component keeps consecutive runs on
//! the same day from ever colliding.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use log::info;

use crate::error::StorageError;

/// Persists backup payloads for one run.
#[derive(Debug, Clone)]
pub struct BackupWriter {
    root: PathBuf,
    started_at: DateTime<Utc>,
}

impl BackupWriter {
    /// Writer rooted at `root`, stamping artifacts with the run start time.
    pub fn new(root: impl Into<PathBuf>, started_at: DateTime<Utc>) -> Self {
        Self {
            root: root.into(),
            started_at,
        }
    }

    /// The artifact path a device's payload will land at.
    pub fn artifact_path(&self, device: &str) -> PathBuf {
        let day = self.started_at.format("%Y%m%d");
        let time = self.started_at.format("%H%M%S");
        self.root
            .join(day.to_string())
            .join(format!("{}-{time}.cfg", sanitize(device)))
    }

    /// Persist one device's payload, creating directories as needed.
    pub async fn write(&self, device: &str, payload: &[u8]) -> Result<PathBuf, StorageError> {
        let path = self.artifact_path(device);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&path, payload)
            .await
            .map_err(|source| StorageError::Write {
                path: path.clone(),
                source,
            })?;
        info!(
            "Wrote {} bytes for '{device}' to {}",
            payload.len(),
            path.display()
        );
        Ok(path)
    }
}

/// Keep artifact names filesystem-safe.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
