//! Error types for netsnap.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for netsnap operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (inventory, credentials, vendor registry).
    /// These are the only errors fatal to a whole run.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// SSH transport-level errors.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Interactive session errors (elevation, completion detection).
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// API-channel errors.
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    /// Backup artifact persistence errors.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Report rendering errors (collaborator-owned, post-backup).
    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    /// Mail delivery errors (collaborator-owned, post-backup).
    #[error("Mail error: {0}")]
    Mail(#[from] MailError),
}

/// Fatal configuration errors. A run aborts before any device is contacted.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Inventory file could not be read at all.
    #[error("Failed to read inventory {path}: {source}")]
    InventoryRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Inventory produced no usable device records.
    #[error("Inventory {path} contains no valid device records")]
    EmptyInventory { path: PathBuf },

    /// Credential file could not be read.
    #[error("Failed to read credential file {path}: {message}")]
    CredentialRead { path: PathBuf, message: String },

    /// A required setting is absent from the credential store.
    #[error("Missing required setting '{key}'")]
    MissingSetting { key: String },

    /// A setting is present but unusable.
    #[error("Invalid setting '{key}': {message}")]
    InvalidSetting { key: String, message: String },

    /// Vendor profile file could not be read or parsed.
    #[error("Failed to load vendor profiles from {path}: {message}")]
    RegistryLoad { path: PathBuf, message: String },

    /// A vendor profile definition is internally inconsistent.
    #[error("Invalid profile for vendor '{vendor}': {message}")]
    InvalidProfile { vendor: String, message: String },
}

/// Transport layer errors (SSH connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host.
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error.
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed.
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error.
    #[error("SSH key error: {0}")]
    Key(String),

    /// Connection was closed unexpectedly.
    #[error("Connection disconnected")]
    Disconnected,

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Interactive session errors (export command execution).
#[derive(Error, Debug)]
pub enum SessionError {
    /// The device prompt never appeared after connecting.
    #[error("No prompt from device within {0:?}")]
    NoPrompt(Duration),

    /// Privilege elevation did not produce the expected prompt.
    #[error("Privilege elevation failed: {message}")]
    ElevationFailed { message: String },

    /// Export completion was not detected within the absolute session bound.
    /// Classified as `Timeout`, not `Failure`; the partial buffer is discarded.
    #[error("Export not complete within {0:?}")]
    CompletionTimeout(Duration),

    /// The device closed the connection mid-export.
    #[error("Connection closed before export completed")]
    ClosedMidExport,
}

/// API-channel errors.
#[derive(Error, Debug)]
pub enum HttpError {
    /// Request-level failure (DNS, TCP, TLS, timeout).
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The device answered outside the profile's success-code set.
    #[error("Unexpected status {status}")]
    Status { status: u16 },

    /// The device record references a token absent from the credential store.
    #[error("Missing API token '{key}'")]
    MissingToken { key: String },

    /// The device record carries no token reference at all.
    #[error("Device has no API token reference")]
    NoTokenRef,
}

/// Backup artifact persistence errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Artifact or directory write failed.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Report rendering errors. Owned by the reporting collaborator; they occur
/// strictly after backup work and never alter recorded backup outcomes.
#[derive(Error, Debug)]
pub enum ReportError {
    /// Rendering failed.
    #[error("Failed to render report: {0}")]
    Render(String),

    /// Report output could not be written.
    #[error("Failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Mail delivery errors. Owned by the mail collaborator.
#[derive(Error, Debug)]
pub enum MailError {
    /// SMTP settings incomplete or transport-level delivery failure.
    #[error("Mail delivery failed: {0}")]
    Delivery(String),
}

/// Result type alias using netsnap's Error.
pub type Result<T> = std::result::Result<T, Error>;
