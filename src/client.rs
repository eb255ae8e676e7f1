//! Telemetry sources for the Quatt CIC.
//!
//! Two implementations share one contract:
//! - `LocalClient` polls the CIC's unauthenticated HTTP feed on the LAN and
//!   retries transient disconnects, with a long backoff for the busy
//!   period after device boot/DHCP churn.
//! - `CloudClient` goes through the mobile API and delegates the
//!   authenticated GET (including the single-refresh-on-401 discipline) to
//!   `crate::auth::AuthSession`, then unwraps the `result` envelope.

use crate::auth::AuthSession;
use core::fmt;
use log::{debug, error};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::thread;
use std::time::Duration;

pub const LOCAL_FEED_PORT: u16 = 8080;
pub const LOCAL_FEED_PATH: &str = "/beta/feed/data.json";
/// Per-call deadline; on expiry the call fails as a communication error.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

const RETRY_ATTEMPTS: u32 = 3;
const DISCONNECT_RETRY_PAUSE: Duration = Duration::from_millis(100);
/// The CIC can be unresponsive for a long stretch right after boot,
/// especially when it re-requests a DHCP lease.
const BOOT_BUSY_RETRY_PAUSE: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub enum ClientError {
    /// Timeout, DNS/socket failure, transient HTTP failure.
    Communication(String),
    /// 401/403 that survived the refresh discipline; caller needs re-auth.
    Authentication(String),
    /// Malformed or undecodable payload; never retried.
    Protocol(String),
}

impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Communication(s) => write!(f, "communication error: {}", s),
            ClientError::Authentication(s) => write!(f, "authentication error: {}", s),
            ClientError::Protocol(s) => write!(f, "protocol error: {}", s),
        }
    }
}

impl Error for ClientError {}

impl From<serde_json::Error> for ClientError {
    fn from(value: serde_json::Error) -> Self {
        ClientError::Protocol(value.to_string())
    }
}

/// One raw telemetry tree, produced whole by one fetch.
///
/// A snapshot is never mutated after construction; a new fetch produces a
/// new snapshot, so references held by consumers stay stable.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    root: Value,
}

impl TelemetrySnapshot {
    pub fn new(root: Value) -> Self {
        TelemetrySnapshot { root }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }
}

/// Shared contract of the local and cloud variants.
pub trait TelemetrySource {
    fn fetch(&self) -> Result<TelemetrySnapshot, ClientError>;
}

/// Decode a JSON body into a typed model, reporting the path that failed.
pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, ClientError> {
    let mut de = serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(&mut de)
        .map_err(|e| ClientError::Protocol(format!("decode failed at `{}`: {}", e.path(), e.inner())))
}

// =====================
// Local variant
// =====================

pub struct LocalClient {
    base_url: String,
    agent: ureq::Agent,
    retry_attempts: u32,
    disconnect_pause: Duration,
    busy_pause: Duration,
}

impl LocalClient {
    pub fn new(ip_address: &str) -> Self {
        Self::for_base_url(&format!("http://{}:{}", ip_address, LOCAL_FEED_PORT))
    }

    fn for_base_url(base_url: &str) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        LocalClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
            retry_attempts: RETRY_ATTEMPTS,
            disconnect_pause: DISCONNECT_RETRY_PAUSE,
            busy_pause: BOOT_BUSY_RETRY_PAUSE,
        }
    }

    /// Override the retry policy (tests use this to avoid real backoff).
    pub fn with_retry_config(mut self, attempts: u32, disconnect_pause: Duration, busy_pause: Duration) -> Self {
        self.retry_attempts = attempts.max(1);
        self.disconnect_pause = disconnect_pause;
        self.busy_pause = busy_pause;
        self
    }

    fn fetch_once(&self, url: &str) -> Result<Value, FetchFailure> {
        match self.agent.get(url).set("Accept", "application/json").call() {
            Ok(resp) => {
                let body = resp
                    .into_string()
                    .map_err(|e| FetchFailure::Fatal(ClientError::Communication(e.to_string())))?;
                serde_json::from_str(&body)
                    .map_err(|e| FetchFailure::Fatal(ClientError::Protocol(e.to_string())))
            }
            Err(ureq::Error::Status(status, resp)) if status == 401 || status == 403 => {
                let body = resp.into_string().unwrap_or_else(|_| String::from("<no body>"));
                Err(FetchFailure::Fatal(ClientError::Authentication(format!(
                    "http {}: {}",
                    status, body
                ))))
            }
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_else(|_| String::from("<no body>"));
                Err(FetchFailure::Busy(format!("http {}: {}", status, body)))
            }
            Err(ureq::Error::Transport(t)) => match t.kind() {
                ureq::ErrorKind::Dns => {
                    Err(FetchFailure::Fatal(ClientError::Communication(format!("dns error: {}", t))))
                }
                _ => Err(FetchFailure::Disconnected(t.to_string())),
            },
        }
    }
}

enum FetchFailure {
    /// Connection dropped mid-request; retry after a short pause.
    Disconnected(String),
    /// HTTP-level failure typical of the post-boot busy window.
    Busy(String),
    /// Not retryable at this level.
    Fatal(ClientError),
}

impl TelemetrySource for LocalClient {
    fn fetch(&self) -> Result<TelemetrySnapshot, ClientError> {
        let url = format!("{}{}", self.base_url, LOCAL_FEED_PATH);

        let mut last_failure = String::new();
        for attempt in 1..=self.retry_attempts {
            debug!("Fetching data from url: {} (attempt {})", url, attempt);
            match self.fetch_once(&url) {
                Ok(root) => return Ok(TelemetrySnapshot::new(root)),
                Err(FetchFailure::Fatal(e)) => {
                    error!("Fetch from {} failed: {}", url, e);
                    return Err(e);
                }
                Err(FetchFailure::Disconnected(msg)) => {
                    debug!("Server disconnected ({}); retrying (attempt {})", msg, attempt);
                    last_failure = msg;
                    if attempt < self.retry_attempts {
                        thread::sleep(self.disconnect_pause);
                    }
                }
                Err(FetchFailure::Busy(msg)) => {
                    debug!("Client error ({}); device may be booting, retrying (attempt {})", msg, attempt);
                    last_failure = msg;
                    if attempt < self.retry_attempts {
                        thread::sleep(self.busy_pause);
                    }
                }
            }
        }

        error!("Fetch from {} failed after {} attempts: {}", url, self.retry_attempts, last_failure);
        Err(ClientError::Communication(format!(
            "giving up after {} attempts: {}",
            self.retry_attempts, last_failure
        )))
    }
}

// =====================
// Cloud variant
// =====================

pub struct CloudClient {
    session: AuthSession,
}

impl CloudClient {
    pub fn new(session: AuthSession) -> Self {
        CloudClient { session }
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }
}

impl TelemetrySource for CloudClient {
    fn fetch(&self) -> Result<TelemetrySnapshot, ClientError> {
        let body = self.session.get_device_data()?;
        match body.get("result") {
            Some(result) if !result.is_null() => Ok(TelemetrySnapshot::new(result.clone())),
            _ => Err(ClientError::Protocol("response is missing the `result` envelope".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthEndpoints;
    use serde_json::json;
    use std::time::Duration;

    fn fast_client(base_url: &str) -> LocalClient {
        LocalClient::for_base_url(base_url).with_retry_config(
            3,
            Duration::from_millis(1),
            Duration::from_millis(1),
        )
    }

    #[test]
    fn local_fetch_parses_snapshot() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", LOCAL_FEED_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"hp1": {"power": 1200.0}}).to_string())
            .create();

        let snapshot = fast_client(&server.url()).fetch().expect("fetch succeeds");
        assert_eq!(snapshot.root()["hp1"]["power"], json!(1200.0));
        mock.assert();
    }

    #[test]
    fn local_fetch_gives_up_after_bounded_busy_retries() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", LOCAL_FEED_PATH)
            .with_status(500)
            .with_body("busy")
            .expect(3)
            .create();

        let err = fast_client(&server.url()).fetch().expect_err("fetch fails");
        assert!(matches!(err, ClientError::Communication(_)), "got {:?}", err);
        mock.assert();
    }

    #[test]
    fn local_fetch_does_not_retry_auth_failures() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", LOCAL_FEED_PATH)
            .with_status(401)
            .with_body("denied")
            .expect(1)
            .create();

        let err = fast_client(&server.url()).fetch().expect_err("fetch fails");
        assert!(matches!(err, ClientError::Authentication(_)), "got {:?}", err);
        mock.assert();
    }

    #[test]
    fn local_fetch_rejects_malformed_payloads_without_retry() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", LOCAL_FEED_PATH)
            .with_status(200)
            .with_body("{not json")
            .expect(1)
            .create();

        let err = fast_client(&server.url()).fetch().expect_err("fetch fails");
        assert!(matches!(err, ClientError::Protocol(_)), "got {:?}", err);
        mock.assert();
    }

    #[test]
    fn cloud_fetch_unwraps_result_envelope() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/api/v1/me/cic/CIC-1")
            .match_header("authorization", "Bearer id-token")
            .with_status(200)
            .with_body(json!({"meta": {}, "result": {"heatPumps": [{"power": 900.0}]}}).to_string())
            .create();

        let session = AuthSession::new("CIC-1", AuthEndpoints::for_base(&server.url()), None);
        session.load_tokens(Some("id-token".into()), Some("refresh".into()), None);
        let client = CloudClient::new(session);

        let snapshot = client.fetch().expect("fetch succeeds");
        assert_eq!(snapshot.root()["heatPumps"][0]["power"], json!(900.0));
        mock.assert();
    }

    #[test]
    fn cloud_fetch_without_envelope_is_a_protocol_error() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/api/v1/me/cic/CIC-1")
            .with_status(200)
            .with_body(json!({"meta": {}}).to_string())
            .create();

        let session = AuthSession::new("CIC-1", AuthEndpoints::for_base(&server.url()), None);
        session.load_tokens(Some("id-token".into()), Some("refresh".into()), None);
        let client = CloudClient::new(session);

        let err = client.fetch().expect_err("fetch fails");
        assert!(matches!(err, ClientError::Protocol(_)), "got {:?}", err);
    }
}
