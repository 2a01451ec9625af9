//! Per-device dispatch: strategy selection and failure isolation.
//!
//! The dispatcher resolves a device's vendor profile, runs the matching
//! strategy (session or HTTP), persists the payload, and measures the whole
//! dispatch. It is the isolation boundary of the system: every failure
//! inside a strategy is converted into a [`BackupResult`] here and never
//! propagates to sibling devices.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::credentials::{CredentialStore, Credentials};
use crate::error::{Error, HttpError, Result, SessionError, TransportError};
use crate::http::HttpFetcher;
use crate::inventory::DeviceRecord;
use crate::session::SessionRunner;
use crate::storage::BackupWriter;
use crate::transport::{AuthMethod, Connect, SshConfig};
use crate::vendor::{HttpProfile, Recipe, SessionProfile, VendorRegistry};

/// Terminal status of one device's backup attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStatus {
    /// Configuration retrieved and persisted.
    Success,
    /// The attempt failed (connect, auth, protocol, write, unknown vendor).
    Failure,
    /// Completion was not detected within the configured bound.
    Timeout,
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "OK"),
            Self::Failure => write!(f, "FAILED"),
            Self::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

/// Outcome of one device dispatch. Created exactly once per device and never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct BackupResult {
    /// Device name from the inventory.
    pub device: String,

    /// Terminal status.
    pub status: BackupStatus,

    /// Error detail for failures and timeouts.
    pub message: Option<String>,

    /// Where the artifact was written (success only).
    pub artifact: Option<PathBuf>,

    /// Payload size in bytes (success only).
    pub payload_bytes: usize,

    /// Dispatch start time.
    pub started_at: DateTime<Utc>,

    /// Dispatch end time.
    pub finished_at: DateTime<Utc>,

    /// Wall-clock time for the whole dispatch.
    pub elapsed: Duration,
}

impl BackupResult {
    /// Whether the device was backed up.
    pub fn is_success(&self) -> bool {
        self.status == BackupStatus::Success
    }
}

/// SSH parameters shared by all session dispatches in a run.
#[derive(Debug, Clone)]
pub struct SshSettings {
    /// SSH port.
    pub port: u16,

    /// Connection/handshake timeout.
    pub connect_timeout: Duration,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            port: 22,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Per-device backup dispatcher.
pub struct Dispatcher<C: Connect> {
    registry: Arc<VendorRegistry>,
    connector: C,
    fetcher: HttpFetcher,
    writer: BackupWriter,
    credentials: Credentials,
    store: Arc<CredentialStore>,
    ssh: SshSettings,
}

impl<C: Connect> Dispatcher<C> {
    /// Build a dispatcher around a connector and the run's collaborators.
    pub fn new(
        registry: Arc<VendorRegistry>,
        connector: C,
        fetcher: HttpFetcher,
        writer: BackupWriter,
        credentials: Credentials,
        store: Arc<CredentialStore>,
        ssh: SshSettings,
    ) -> Self {
        Self {
            registry,
            connector,
            fetcher,
            writer,
            credentials,
            store,
            ssh,
        }
    }

    /// Run one device to a terminal state. Never returns an error: whatever
    /// happens inside the strategy becomes part of the result.
    pub async fn dispatch(&self, device: &DeviceRecord) -> BackupResult {
        let started_at = Utc::now();
        let started = std::time::Instant::now();
        info!("Dispatching '{}' ({} via {})", device.name, device.vendor, device.channel);

        let outcome = match self.registry.get(&device.vendor) {
            None => {
                // Rejected before any network contact.
                warn!("Unknown vendor '{}' for '{}'", device.vendor, device.name);
                DispatchOutcome::Rejected("unknown vendor".to_string())
            }
            Some(profile) if profile.channel() != device.channel => {
                DispatchOutcome::Rejected(format!(
                    "channel mismatch: device says {}, vendor profile is {}",
                    device.channel,
                    profile.channel()
                ))
            }
            Some(profile) => {
                let strategy = match &profile.recipe {
                    Recipe::Session(session) => self.run_session(device, session).await,
                    Recipe::Http(http) => self.run_http(device, http).await,
                };
                match strategy {
                    Ok(payload) if payload.is_empty() => {
                        DispatchOutcome::Rejected("device returned no configuration data".into())
                    }
                    Ok(payload) => match self.writer.write(&device.name, &payload).await {
                        Ok(path) => DispatchOutcome::Stored(path, payload.len()),
                        Err(e) => DispatchOutcome::Errored(e.into()),
                    },
                    Err(e) => DispatchOutcome::Errored(e),
                }
            }
        };

        let finished_at = Utc::now();
        let elapsed = started.elapsed();
        let result = match outcome {
            DispatchOutcome::Stored(path, bytes) => BackupResult {
                device: device.name.clone(),
                status: BackupStatus::Success,
                message: None,
                artifact: Some(path),
                payload_bytes: bytes,
                started_at,
                finished_at,
                elapsed,
            },
            DispatchOutcome::Rejected(message) => BackupResult {
                device: device.name.clone(),
                status: BackupStatus::Failure,
                message: Some(message),
                artifact: None,
                payload_bytes: 0,
                started_at,
                finished_at,
                elapsed,
            },
            DispatchOutcome::Errored(error) => {
                let (status, message) = classify(&error);
                BackupResult {
                    device: device.name.clone(),
                    status,
                    message: Some(message),
                    artifact: None,
                    payload_bytes: 0,
                    started_at,
                    finished_at,
                    elapsed,
                }
            }
        };

        match result.status {
            BackupStatus::Success => info!(
                "'{}' backed up: {} bytes in {:?}",
                result.device, result.payload_bytes, result.elapsed
            ),
            _ => warn!(
                "'{}' {}: {}",
                result.device,
                result.status,
                result.message.as_deref().unwrap_or("-")
            ),
        }
        result
    }

    async fn run_session(
        &self,
        device: &DeviceRecord,
        profile: &SessionProfile,
    ) -> Result<Vec<u8>> {
        let mut config = SshConfig::new(
            device.host.clone(),
            self.credentials.username.clone(),
            AuthMethod::Password(self.credentials.secret.clone()),
        );
        config.port = self.ssh.port;
        config.timeout = self.ssh.connect_timeout;

        let transport = self.connector.connect(config).await?;
        SessionRunner::new(transport, profile.clone())
            .run(device.elevate, &self.credentials.secret)
            .await
    }

    async fn run_http(
        &self,
        device: &DeviceRecord,
        profile: &HttpProfile,
    ) -> Result<Vec<u8>> {
        let key = device.secret_ref.as_deref().ok_or(HttpError::NoTokenRef)?;
        let token = self
            .store
            .secret(key)
            .ok_or_else(|| HttpError::MissingToken {
                key: key.to_string(),
            })?;
        Ok(self.fetcher.fetch(profile, &device.host, &token).await?)
    }
}

enum DispatchOutcome {
    Stored(PathBuf, usize),
    Rejected(String),
    Errored(Error),
}

/// Map a strategy error onto a terminal status and operator-readable detail.
fn classify(error: &Error) -> (BackupStatus, String) {
    match error {
        Error::Session(SessionError::CompletionTimeout(_)) => {
            (BackupStatus::Timeout, error.to_string())
        }
        Error::Transport(TransportError::AuthenticationFailed { .. }) => {
            (BackupStatus::Failure, format!("auth: {error}"))
        }
        Error::Transport(
            TransportError::ConnectionFailed { .. } | TransportError::Timeout(_),
        ) => (BackupStatus::Failure, format!("connect: {error}")),
        Error::Session(SessionError::ElevationFailed { .. }) => {
            (BackupStatus::Failure, format!("elevate: {error}"))
        }
        other => (BackupStatus::Failure, other.to_string()),
    }
}
