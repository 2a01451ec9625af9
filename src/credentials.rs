//! Credential and settings store.
//!
//! Settings come from an env-format file (`KEY=VALUE` lines). The store keeps
//! the values explicit rather than exporting them into the process
//! environment, so every dispatch receives credentials as a plain value and
//! per-device overrides can be added later without touching global state.
//!
//! Well-known keys: `ORG`, `MAIN_USER`, `MAIN_PASS`, and the `SMTP_*` block
//! gated by `USE_SMTP=yes`. Any other key can be referenced from a device
//! record as an API token (`secret_ref`).

use std::collections::HashMap;
use std::path::Path;

use secrecy::SecretString;

use crate::error::ConfigError;

/// The shared account used to authenticate against all session devices in a
/// run. Cloned by reference into each dispatch; never mutated.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Login user name.
    pub username: String,

    /// Login secret. Also submitted for privilege elevation prompts.
    pub secret: SecretString,
}

/// SMTP settings for the report mail collaborator.
#[derive(Debug, Clone)]
pub struct MailSettings {
    /// SMTP relay host.
    pub host: String,

    /// SMTP relay port.
    pub port: u16,

    /// SMTP account user.
    pub username: String,

    /// SMTP account secret.
    pub password: SecretString,

    /// Sender address.
    pub from: String,

    /// Recipient address.
    pub to: String,
}

/// Key-value settings loaded once per run.
#[derive(Default)]
pub struct CredentialStore {
    values: HashMap<String, String>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("keys", &self.values.len())
            .finish()
    }
}

impl CredentialStore {
    /// Load settings from an env-format file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let iter = dotenvy::from_path_iter(path).map_err(|e| ConfigError::CredentialRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut values = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| ConfigError::CredentialRead {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            values.insert(key, value);
        }

        Ok(Self { values })
    }

    /// Build a store from in-memory pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Raw value lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Secret lookup, wrapped so it never lands in debug output.
    pub fn secret(&self, key: &str) -> Option<SecretString> {
        self.values
            .get(key)
            .map(|v| SecretString::from(v.clone()))
    }

    /// Organization label used in the report.
    pub fn org(&self) -> &str {
        self.get("ORG").unwrap_or("unknown")
    }

    /// The shared device account (`MAIN_USER` / `MAIN_PASS`).
    pub fn shared_account(&self) -> Result<Credentials, ConfigError> {
        let username = self
            .get("MAIN_USER")
            .ok_or_else(|| ConfigError::MissingSetting {
                key: "MAIN_USER".into(),
            })?
            .to_string();
        let secret = self
            .secret("MAIN_PASS")
            .ok_or_else(|| ConfigError::MissingSetting {
                key: "MAIN_PASS".into(),
            })?;
        Ok(Credentials { username, secret })
    }

    /// Mail settings, or `None` when mailing is not enabled (`USE_SMTP` is
    /// absent or not `yes`). Enabled-but-incomplete settings are an error.
    pub fn mail(&self) -> Result<Option<MailSettings>, ConfigError> {
        if self.get("USE_SMTP") != Some("yes") {
            return Ok(None);
        }

        let required = |key: &str| {
            self.get(key)
                .map(ToString::to_string)
                .ok_or_else(|| ConfigError::MissingSetting { key: key.into() })
        };

        let port_raw = required("SMTP_PORT")?;
        let port = port_raw
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidSetting {
                key: "SMTP_PORT".into(),
                message: format!("'{port_raw}' is not a port number"),
            })?;

        Ok(Some(MailSettings {
            host: required("SMTP_HOST")?,
            port,
            username: required("SMTP_USER")?,
            password: self
                .secret("SMTP_PASS")
                .ok_or_else(|| ConfigError::MissingSetting {
                    key: "SMTP_PASS".into(),
                })?,
            from: required("SMTP_FROM")?,
            to: required("SMTP_TO")?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn store() -> CredentialStore {
        CredentialStore::from_pairs([
            ("ORG", "acme"),
            ("MAIN_USER", "backup"),
            ("MAIN_PASS", "hunter2"),
            ("FORTI_HQ_TOKEN", "tok-123"),
        ])
    }

    #[test]
    fn shared_account_from_main_keys() {
        let creds = store().shared_account().unwrap();
        assert_eq!(creds.username, "backup");
        assert_eq!(creds.secret.expose_secret(), "hunter2");
    }

    #[test]
    fn missing_account_is_config_error() {
        let err = CredentialStore::from_pairs([("ORG", "acme")])
            .shared_account()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting { key } if key == "MAIN_USER"));
    }

    #[test]
    fn token_lookup() {
        let token = store().secret("FORTI_HQ_TOKEN").unwrap();
        assert_eq!(token.expose_secret(), "tok-123");
        assert!(store().secret("NO_SUCH_KEY").is_none());
    }

    #[test]
    fn mail_disabled_by_default() {
        assert!(store().mail().unwrap().is_none());
    }

    #[test]
    fn mail_enabled_requires_full_block() {
        let partial = CredentialStore::from_pairs([("USE_SMTP", "yes"), ("SMTP_HOST", "mx")]);
        assert!(partial.mail().is_err());

        let full = CredentialStore::from_pairs([
            ("USE_SMTP", "yes"),
            ("SMTP_HOST", "mx.example.net"),
            ("SMTP_PORT", "587"),
            ("SMTP_USER", "reports"),
            ("SMTP_PASS", "s3cret"),
            ("SMTP_FROM", "reports@example.net"),
            ("SMTP_TO", "noc@example.net"),
        ]);
        let mail = full.mail().unwrap().unwrap();
        assert_eq!(mail.port, 587);
        assert_eq!(mail.to, "noc@example.net");
    }

    #[test]
    fn load_from_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.env");
        std::fs::write(&path, "ORG=acme\nMAIN_USER=backup\nMAIN_PASS=pw\n").unwrap();
        let store = CredentialStore::load(&path).unwrap();
        assert_eq!(store.org(), "acme");
        assert!(store.shared_account().is_ok());
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let err = CredentialStore::load(Path::new("/nonexistent/site.env")).unwrap_err();
        assert!(matches!(err, ConfigError::CredentialRead { .. }));
    }
}
