//! API-channel backup fetcher.
//!
//! One GET against the vendor profile's URL template, with the device's API
//! token substituted as a query parameter or header. Certificate checks are
//! off: fleet devices present self-signed management certificates. No retry.

use std::time::Duration;

use log::debug;
use secrecy::{ExposeSecret, SecretString};

use crate::error::HttpError;
use crate::vendor::{HttpProfile, TokenPlacement};

/// HTTP-based backup strategy.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Fetch one device's configuration.
    pub async fn fetch(
        &self,
        profile: &HttpProfile,
        host: &str,
        token: &SecretString,
    ) -> Result<Vec<u8>, HttpError> {
        let url = profile.url_template.replace("{host}", host);
        debug!("GET {url}");

        let request = match &profile.token {
            TokenPlacement::Query { param } => self
                .client
                .get(&url)
                .query(&[(param.as_str(), token.expose_secret())]),
            TokenPlacement::Header { name } => self
                .client
                .get(&url)
                .header(name.as_str(), token.expose_secret()),
        };

        let response = request.send().await?;
        let status = response.status().as_u16();
        if !profile.success_codes.contains(&status) {
            return Err(HttpError::Status { status });
        }

        Ok(response.bytes().await?.to_vec())
    }
}
