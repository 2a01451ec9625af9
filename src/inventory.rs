//! Device inventory loading.
//!
//! The inventory is a semicolon-delimited table, one device per row:
//!
//! ```text
//! name;host;vendor;channel[;secret_ref[;flags]]
//! edge-sw-01;10.0.0.2;ubiquiti_edgeswitch;session
//! fw-hq;fw.example.net;fortinet;http;FORTI_HQ_TOKEN
//! core-sw;10.0.0.4;cisco_s300;session;;elevate
//! ```
//!
//! The first row is a header (first field `name`, case-insensitive) and is
//! skipped, as are blank lines and `#` comments. A malformed row never aborts
//! the load: it is recorded as a [`ParseError`] and excluded from the result
//! set. The caller decides whether parse errors are fatal (default: logged
//! and continued).

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use log::warn;

use crate::error::ConfigError;

/// Communication channel used to reach a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Interactive remote command session (SSH).
    Session,
    /// HTTP GET against the device management API.
    Http,
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "session" | "ssh" => Ok(Self::Session),
            "http" | "api" => Ok(Self::Http),
            other => Err(format!("unknown channel '{other}'")),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session => write!(f, "session"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// One validated device row. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    /// Device name, used for artifact filenames and reporting.
    pub name: String,

    /// Hostname or address. May carry a port for API devices (`host:port`).
    pub host: String,

    /// Vendor type tag, resolved case-insensitively against the registry.
    pub vendor: String,

    /// Channel used to reach the device.
    pub channel: Channel,

    /// Credential-store key holding this device's API token, if any.
    pub secret_ref: Option<String>,

    /// Whether the device CLI requires elevated privilege mode before the
    /// export command is accepted.
    pub elevate: bool,
}

/// A rejected inventory row.
#[derive(Debug, Clone)]
pub struct ParseError {
    /// 1-based line number in the input.
    pub line: usize,

    /// The raw row content.
    pub raw: String,

    /// Why the row was rejected.
    pub reason: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {} ({:?})", self.line, self.reason, self.raw)
    }
}

/// Result of an inventory load: valid records plus rejected rows.
#[derive(Debug, Default)]
pub struct Inventory {
    /// Validated device records, in input order.
    pub devices: Vec<DeviceRecord>,

    /// Rows that failed validation.
    pub errors: Vec<ParseError>,
}

/// Load and parse an inventory file.
///
/// An unreadable file is a [`ConfigError`] (fatal); malformed rows are not.
pub async fn load(path: &Path) -> Result<Inventory, ConfigError> {
    let content =
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::InventoryRead {
                path: path.to_path_buf(),
                source,
            })?;

    let inventory = parse(&content);
    for err in &inventory.errors {
        warn!("Skipping inventory row: {err}");
    }
    if inventory.devices.is_empty() {
        return Err(ConfigError::EmptyInventory {
            path: path.to_path_buf(),
        });
    }
    Ok(inventory)
}

/// Parse inventory text into device records and row errors.
pub fn parse(input: &str) -> Inventory {
    let mut inventory = Inventory::default();

    for (idx, raw) in input.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split(';').map(str::trim).collect();
        if fields[0].eq_ignore_ascii_case("name") {
            // Header row.
            continue;
        }

        match parse_row(&fields) {
            Ok(device) => inventory.devices.push(device),
            Err(reason) => inventory.errors.push(ParseError {
                line,
                raw: raw.to_string(),
                reason,
            }),
        }
    }

    inventory
}

fn parse_row(fields: &[&str]) -> Result<DeviceRecord, String> {
    if fields.len() < 4 {
        return Err(format!("expected at least 4 fields, got {}", fields.len()));
    }

    let name = fields[0];
    let host = fields[1];
    let vendor = fields[2];
    if name.is_empty() {
        return Err("empty device name".into());
    }
    if host.is_empty() {
        return Err("empty host".into());
    }
    if vendor.is_empty() {
        return Err("empty vendor type".into());
    }

    let channel = fields[3].parse::<Channel>()?;

    let secret_ref = fields
        .get(4)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string);

    let mut elevate = false;
    if let Some(flags) = fields.get(5) {
        for flag in flags.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            match flag.to_ascii_lowercase().as_str() {
                "elevate" => elevate = true,
                other => return Err(format!("unknown flag '{other}'")),
            }
        }
    }

    Ok(DeviceRecord {
        name: name.to_string(),
        host: host.to_string(),
        vendor: vendor.to_string(),
        channel,
        secret_ref,
        elevate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
name;host;vendor;channel;secret_ref;flags
edge-sw-01;10.0.0.2;ubiquiti_edgeswitch;session
fw-hq;fw.example.net;fortinet;http;FORTI_HQ_TOKEN
core-sw;10.0.0.4;cisco_s300;session;;elevate
";

    #[test]
    fn parses_valid_rows() {
        let inv = parse(SAMPLE);
        assert!(inv.errors.is_empty());
        assert_eq!(inv.devices.len(), 3);

        assert_eq!(inv.devices[0].name, "edge-sw-01");
        assert_eq!(inv.devices[0].channel, Channel::Session);
        assert!(inv.devices[0].secret_ref.is_none());
        assert!(!inv.devices[0].elevate);

        assert_eq!(inv.devices[1].channel, Channel::Http);
        assert_eq!(inv.devices[1].secret_ref.as_deref(), Some("FORTI_HQ_TOKEN"));

        assert!(inv.devices[2].elevate);
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let inv = parse("# fleet A\n\nr1;10.0.0.1;mikrotik_routeros;session\n");
        assert_eq!(inv.devices.len(), 1);
        assert!(inv.errors.is_empty());
    }

    #[test]
    fn malformed_row_is_recorded_not_fatal() {
        let input = "r1;10.0.0.1;mikrotik_routeros;session\nbad-row;;\nr2;10.0.0.2;fortinet;http\n";
        let inv = parse(input);
        assert_eq!(inv.devices.len(), 2);
        assert_eq!(inv.errors.len(), 1);
        assert_eq!(inv.errors[0].line, 2);
    }

    #[test]
    fn unknown_channel_is_rejected() {
        let inv = parse("r1;10.0.0.1;mikrotik_routeros;telnet\n");
        assert!(inv.devices.is_empty());
        assert!(inv.errors[0].reason.contains("unknown channel"));
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let inv = parse("r1;10.0.0.1;cisco_s300;session;;retry\n");
        assert!(inv.devices.is_empty());
        assert!(inv.errors[0].reason.contains("unknown flag"));
    }

    #[tokio::test]
    async fn load_rejects_missing_file() {
        let err = load(Path::new("/nonexistent/devices.csv")).await.unwrap_err();
        assert!(matches!(err, ConfigError::InventoryRead { .. }));
    }

    #[tokio::test]
    async fn load_rejects_empty_inventory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.csv");
        tokio::fs::write(&path, "name;host;vendor;channel\n")
            .await
            .unwrap();
        let err = load(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::EmptyInventory { .. }));
    }
}
