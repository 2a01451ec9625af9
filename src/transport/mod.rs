//! Session transport layer.
//!
//! [`SessionTransport`] is the readable/writable byte-stream capability the
//! session state machine runs over. Keeping it abstract means the completion
//! detection logic (prompt match, idle window, absolute bound) can be
//! exercised deterministically against scripted fakes, no device needed.
//! [`Connect`] is the factory half: it opens a transport for one device, so
//! tests can also count or fail connection attempts.

mod config;
mod ssh;

pub use config::{AuthMethod, SshConfig};
pub use ssh::{SshConnector, SshTransport};

use std::future::Future;
use std::time::Duration;

use crate::error::TransportError;

/// A single device's interactive byte stream.
///
/// One transport belongs to exactly one session; command bytes and responses
/// are never interleaved with another device's.
pub trait SessionTransport: Send {
    /// Send one command line (the transport appends the line terminator).
    fn send_line(&mut self, line: &str)
    -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Read the next chunk of output.
    ///
    /// Resolves to `Ok(Some(bytes))` when data arrives, `Ok(None)` when
    /// `max_wait` elapses with no data (an idle tick, not an error), and
    /// `Err(TransportError::Disconnected)` when the peer closes the stream.
    fn read_chunk(
        &mut self,
        max_wait: Duration,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Release the transport. Safe to call on every exit path.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Factory capability that opens a [`SessionTransport`] for a device.
pub trait Connect: Send + Sync {
    /// Transport type produced by this connector.
    type Transport: SessionTransport + 'static;

    /// Establish a transport, authenticating with the config's credentials.
    fn connect(
        &self,
        config: SshConfig,
    ) -> impl Future<Output = Result<Self::Transport, TransportError>> + Send;
}

impl<T: Connect> Connect for std::sync::Arc<T> {
    type Transport = T::Transport;

    fn connect(
        &self,
        config: SshConfig,
    ) -> impl Future<Output = Result<Self::Transport, TransportError>> + Send {
        (**self).connect(config)
    }
}
