//! Minimal runtime configuration helpers.
//! Everything comes from environment variables with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
/// Scan interval bounds; values outside are clamped, not rejected.
pub const MIN_POLL_INTERVAL_SECS: u64 = 5;
pub const MAX_POLL_INTERVAL_SECS: u64 = 600;
pub const DEFAULT_TOKEN_FILE: &str = "quatt-tokens.json";
pub const DEFAULT_FIRST_NAME: &str = "Quatt";
pub const DEFAULT_LAST_NAME: &str = "Telemetry";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Unauthenticated feed on the device's LAN address.
    Local,
    /// Mobile API with the pairing/token machinery.
    Cloud,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: ConnectionMode,
    /// IP or hostname of the CIC on the LAN (local mode).
    pub device_address: Option<String>,
    /// CIC identifier as printed on the device (cloud mode).
    pub cic_id: Option<String>,
    /// Names written to the cloud profile during pairing.
    pub first_name: String,
    pub last_name: String,
    pub poll_interval: Duration,
    /// Where the credential blob is persisted (cloud mode).
    pub token_file: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let mode = match std::env::var("QUATT_MODE") {
            Ok(s) if s.eq_ignore_ascii_case("cloud") => ConnectionMode::Cloud,
            Ok(s) if s.eq_ignore_ascii_case("local") => ConnectionMode::Local,
            Ok(other) => return Err(format!("QUATT_MODE must be `local` or `cloud`, got `{}`", other)),
            Err(_) => ConnectionMode::Local,
        };

        let device_address = std::env::var("QUATT_DEVICE_ADDRESS")
            .ok()
            .filter(|s| !s.trim().is_empty());
        let cic_id = std::env::var("QUATT_CIC_ID").ok().filter(|s| !s.trim().is_empty());

        match mode {
            ConnectionMode::Local if device_address.is_none() => {
                return Err("QUATT_DEVICE_ADDRESS is required in local mode".to_string());
            }
            ConnectionMode::Cloud if cic_id.is_none() => {
                return Err("QUATT_CIC_ID is required in cloud mode".to_string());
            }
            _ => {}
        }

        let poll_secs = std::env::var("QUATT_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);

        let first_name =
            std::env::var("QUATT_FIRST_NAME").unwrap_or_else(|_| DEFAULT_FIRST_NAME.to_string());
        let last_name = std::env::var("QUATT_LAST_NAME").unwrap_or_else(|_| DEFAULT_LAST_NAME.to_string());

        let token_file = std::env::var("QUATT_TOKEN_FILE")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_FILE));

        Ok(Config {
            mode,
            device_address,
            cic_id,
            first_name,
            last_name,
            poll_interval: Duration::from_secs(clamp_poll_interval(poll_secs)),
            token_file,
        })
    }
}

fn clamp_poll_interval(seconds: u64) -> u64 {
    seconds.clamp(MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS)
}
