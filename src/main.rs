pub mod models {
    pub mod quatt;
}

pub mod auth;
pub mod client;
pub mod config;
pub mod metrics;
pub mod store;

use crate::auth::{AuthEndpoints, AuthSession};
use crate::client::{CloudClient, LocalClient, TelemetrySource};
use crate::config::{Config, ConnectionMode};
use crate::metrics::{MetricsResolver, SnapshotShape};
use crate::store::{FileTokenStore, TokenStore};
use log::{error, info, warn};
use serde_json::Value;
use std::path::Path;
use std::thread;
use std::time::Instant;

pub fn run() -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (mode={:?}, poll_interval={}s)",
        cfg.mode,
        cfg.poll_interval.as_secs()
    );

    // 2) Build the telemetry source
    let (source, shape): (Box<dyn TelemetrySource>, SnapshotShape) = match cfg.mode {
        ConnectionMode::Local => {
            let address = cfg
                .device_address
                .as_deref()
                .ok_or_else(|| "device address missing".to_string())?;
            info!("Using local CIC feed at {}", address);
            (Box::new(LocalClient::new(address)), SnapshotShape::Local)
        }
        ConnectionMode::Cloud => {
            let cic = cfg.cic_id.clone().ok_or_else(|| "CIC id missing".to_string())?;
            let store = FileTokenStore::new(cfg.token_file.clone());
            let stored = store
                .load()
                .map_err(|e| format!("Loading stored tokens failed: {}", e))?
                .unwrap_or_default();

            let session = AuthSession::new(cic, AuthEndpoints::default(), Some(Box::new(store)));
            session.load_tokens(stored.id_token, stored.refresh_token, stored.installation_id);

            // The pairing button press, if needed, happens inside this call.
            if !session.authenticate(&cfg.first_name, &cfg.last_name) {
                return Err("Quatt cloud authentication failed; see the log for the cause".to_string());
            }
            if let Some(installation) = session.installation_id() {
                info!("Using installation {}", installation);
            }
            (Box::new(CloudClient::new(session)), SnapshotShape::Cloud)
        }
    };

    // 3) Poll loop (steady cadence)
    info!("Starting poll loop: interval={}s", cfg.poll_interval.as_secs());
    loop {
        let started = Instant::now();

        match source.fetch() {
            Ok(snapshot) => {
                let resolver = MetricsResolver::new(&snapshot, shape);
                let heat_power = resolve_f64(&resolver, "computedHeatPower");
                let quatt_cop = resolve_f64(&resolver, "computedQuattCop");
                let mode_text = resolver
                    .resolve("computedSupervisoryControlMode", None)
                    .and_then(|v| v.as_str().map(str::to_string));
                let defrost = resolver
                    .resolve(&defrost_path(shape), None)
                    .and_then(|v| v.as_bool());
                info!(
                    "heat_power={} quatt_cop={} mode={} defrost={}",
                    fmt_f64(heat_power),
                    fmt_f64(quatt_cop),
                    mode_text.as_deref().unwrap_or("-"),
                    defrost.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
                );
            }
            // Fetch failures are expected during device boot; keep polling.
            Err(e) => warn!("Telemetry fetch failed: {}", e),
        }

        let elapsed = started.elapsed();
        if elapsed < cfg.poll_interval {
            thread::sleep(cfg.poll_interval - elapsed);
        }
    }
}

fn resolve_f64(resolver: &MetricsResolver<'_>, path: &str) -> Option<f64> {
    resolver.resolve(path, None).and_then(|v: Value| v.as_f64())
}

fn defrost_path(shape: SnapshotShape) -> String {
    match shape {
        SnapshotShape::Local => "hp1.computedDefrost".to_string(),
        SnapshotShape::Cloud => "heatPumps.0.computedDefrost".to_string(),
    }
}

fn fmt_f64(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string())
}

/// Load KEY=VALUE pairs from a .env file next to the binary. Values
/// already present in the process environment win.
fn load_env_file(path: &Path) -> Result<(), String> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;

    for (index, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let assignment = trimmed.strip_prefix("export ").map(str::trim_start).unwrap_or(trimmed);
        let Some((key, value)) = assignment.split_once('=') else {
            return Err(format!("{}:{}: missing '=' in assignment", path.display(), index + 1));
        };
        let key = key.trim();
        if key.is_empty() || key.chars().any(|c| c.is_whitespace()) {
            return Err(format!("{}:{}: invalid variable name", path.display(), index + 1));
        }
        let value = value
            .trim()
            .trim_matches('"')
            .trim_matches('\'')
            .to_string();
        if std::env::var_os(key).is_none() {
            // Updating process-level environment variables is unsafe on some targets.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }

    Ok(())
}

fn main() {
    let env_path = Path::new(".env");
    if env_path.is_file() {
        if let Err(e) = load_env_file(env_path) {
            eprintln!("fatal: {}", e);
            std::process::exit(1);
        }
    }

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    info!(
        "quatt-telemetry {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run() {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
