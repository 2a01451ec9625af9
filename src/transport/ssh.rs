//! SSH transport implementation using russh.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh::{Channel, ChannelMsg};
use secrecy::ExposeSecret;

use super::config::{AuthMethod, SshConfig};
use super::{Connect, SessionTransport};
use crate::error::TransportError;

/// Connector that opens [`SshTransport`]s over russh.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

impl Connect for SshConnector {
    type Transport = SshTransport;

    async fn connect(&self, config: SshConfig) -> Result<SshTransport, TransportError> {
        SshTransport::connect(config).await
    }
}

/// One device's SSH session with an open PTY shell channel.
pub struct SshTransport {
    session: Handle<SshHandler>,
    channel: Channel<Msg>,
}

impl SshTransport {
    /// Connect to the device, authenticate, and open a PTY shell channel.
    pub async fn connect(config: SshConfig) -> Result<Self, TransportError> {
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: None,
            ..Default::default()
        });

        let handler = SshHandler {
            host: config.host.clone(),
        };

        let mut session = tokio::time::timeout(
            config.timeout,
            client::connect(ssh_config, (config.host.as_str(), config.port), handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.timeout))?
        .map_err(TransportError::Ssh)?;

        Self::authenticate(&mut session, &config).await?;

        let channel = session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_pty(
                true,
                "xterm",
                config.terminal_width,
                config.terminal_height,
                0,
                0,
                &[],
            )
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_shell(true)
            .await
            .map_err(TransportError::Ssh)?;

        Ok(Self { session, channel })
    }

    /// Authenticate with the server.
    async fn authenticate(
        session: &mut Handle<SshHandler>,
        config: &SshConfig,
    ) -> Result<(), TransportError> {
        let success = match &config.auth {
            AuthMethod::None => session
                .authenticate_none(&config.username)
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::Password(password) => session
                .authenticate_password(&config.username, password.expose_secret())
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::PrivateKey { path, passphrase } => {
                let key = load_secret_key(path, passphrase.as_deref())
                    .map_err(|e| TransportError::Key(e.to_string()))?;

                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .map_err(TransportError::Ssh)?
                    .flatten();

                session
                    .authenticate_publickey(
                        &config.username,
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                    )
                    .await
                    .map_err(TransportError::Ssh)?
                    .success()
            }
        };

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: config.username.clone(),
            });
        }

        Ok(())
    }
}

impl SessionTransport for SshTransport {
    async fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        let payload = format!("{line}\n");
        self.channel
            .data(payload.as_bytes())
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }

    async fn read_chunk(&mut self, max_wait: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            let msg = match tokio::time::timeout_at(deadline, self.channel.wait()).await {
                Err(_) => return Ok(None),
                Ok(None) => return Err(TransportError::Disconnected),
                Ok(Some(msg)) => msg,
            };

            match msg {
                ChannelMsg::Data { ref data } => return Ok(Some(data.to_vec())),
                ChannelMsg::ExtendedData { ref data, .. } => return Ok(Some(data.to_vec())),
                ChannelMsg::Eof | ChannelMsg::Close => return Err(TransportError::Disconnected),
                other => {
                    // Window adjusts, exit statuses and the like.
                    debug!("Ignoring channel message: {other:?}");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Err(e) = self.channel.eof().await {
            warn!("Channel EOF failed during close: {e}");
        }
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }
}

/// SSH client handler for russh.
///
/// Network devices in the field overwhelmingly present self-signed or
/// factory keys, so the host key is accepted and logged rather than checked
/// against known_hosts.
struct SshHandler {
    host: String,
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(
            "Accepting host key for {}: {}",
            self.host,
            server_public_key.fingerprint(Default::default())
        );
        Ok(true)
    }
}
