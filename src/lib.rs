//! # Netsnap
//!
//! Multi-vendor network device configuration backup over SSH sessions and
//! device management APIs.
//!
//! Netsnap loads a device inventory, dispatches each device to its vendor's
//! backup strategy (an interactive CLI export with prompt/idle completion
//! detection, or a GET against the device API), persists the retrieved
//! configuration, and aggregates per-device outcomes into a run summary for
//! reporting. Devices are isolated from each other: one device failing,
//! timing out, or misbehaving never affects its siblings.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use netsnap::credentials::CredentialStore;
//! use netsnap::dispatch::{Dispatcher, SshSettings};
//! use netsnap::http::HttpFetcher;
//! use netsnap::run::{run_backup, RunOptions};
//! use netsnap::storage::BackupWriter;
//! use netsnap::transport::SshConnector;
//! use netsnap::vendor::VendorRegistry;
//!
//! # async fn example() -> Result<(), netsnap::Error> {
//! let store = Arc::new(CredentialStore::load("site.env".as_ref())?);
//! let inventory = netsnap::inventory::load("devices.csv".as_ref()).await?;
//!
//! let started_at = chrono::Utc::now();
//! let dispatcher = Arc::new(Dispatcher::new(
//!     Arc::new(VendorRegistry::builtin()),
//!     SshConnector,
//!     HttpFetcher::new(Duration::from_secs(60))?,
//!     BackupWriter::new("/var/backups/netsnap", started_at),
//!     store.shared_account()?,
//!     store.clone(),
//!     SshSettings::default(),
//! ));
//!
//! let summary = run_backup(dispatcher, &inventory.devices, &RunOptions::default(), None).await;
//! println!("{}/{} devices backed up", summary.succeeded, summary.total());
//! # Ok(())
//! # }
//! ```

pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod inventory;
pub mod report;
pub mod run;
pub mod session;
pub mod storage;
pub mod transport;
pub mod vendor;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use dispatch::{BackupResult, BackupStatus, Dispatcher};
pub use error::Error;
pub use inventory::{Channel, DeviceRecord};
pub use run::{RunLog, RunOptions, RunSummary, run_backup};
pub use vendor::{VendorProfile, VendorRegistry};
