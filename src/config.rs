#![forbid(unsafe_code)]

// Command-line configuration for both binaries

use crate::control_plane::AccessToken;
use crate::error::{LinkError, LinkResult};
use crate::reporter::DEFAULT_REPORT_INTERVAL;
use crate::session::{SessionConfig, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_KEEPALIVE_INTERVAL};
use crate::signaling::protocol::HandshakeKind;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5111";
pub const DEFAULT_WS_URL: &str = "ws://localhost:5111";
pub const DEFAULT_STAGGER: Duration = Duration::from_millis(100);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
/// Upper bound on `--clients`; each one is a registered station and a socket.
pub const MAX_CLIENTS: usize = 10_000;

/// Parses humantime durations (`500ms`, `30s`, `1m 30s`, `1h`) or a bare
/// number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("duration cannot be empty".to_string());
    }
    if let Ok(secs) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(trimmed).map_err(|e| format!("invalid duration '{}': {}", input, e))
}

fn require_scheme(name: &str, raw: &str, schemes: &[&str]) -> LinkResult<String> {
    let parsed = Url::parse(raw).map_err(|e| LinkError::Configuration(format!("invalid {} '{}': {}", name, raw, e)))?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(LinkError::Configuration(format!(
            "invalid {} '{}': scheme must be one of {}",
            name,
            raw,
            schemes.join(", ")
        )));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn require_nonzero(name: &str, value: Duration) -> LinkResult<Duration> {
    if value.is_zero() {
        return Err(LinkError::Configuration(format!("{} must be greater than zero", name)));
    }
    Ok(value)
}

/// Ground-station link load test
#[derive(Parser, Debug, Clone)]
#[command(name = "load_test")]
#[command(about = "Simulates many ground stations holding links to the SatOps control plane")]
#[command(version)]
pub struct LoadTestArgs {
    /// Control-plane HTTP base URL
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// WebSocket base URL
    #[arg(long, default_value = DEFAULT_WS_URL)]
    pub ws_url: String,

    /// Number of concurrent ground stations
    #[arg(long, default_value_t = 10)]
    pub clients: usize,

    /// Test duration, e.g. 30s, 5m, 1m30s
    #[arg(long, default_value = "5m", value_parser = parse_duration)]
    pub duration: Duration,

    /// Operator bearer token used to create and delete ground stations
    #[arg(long, env = "SATOPS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Delete the created ground stations afterwards (--cleanup=false to keep them)
    #[arg(long, default_value_t = true, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    pub cleanup: bool,

    /// Interval between live metric reports
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub report_interval: Duration,

    /// Identification message type
    #[arg(long, value_enum, default_value_t = HandshakeKind::Connect)]
    pub handshake: HandshakeKind,

    /// Interval between keepalive pings
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub keepalive_interval: Duration,

    /// Delay between consecutive session launches
    #[arg(long, default_value = "100ms", value_parser = parse_duration)]
    pub stagger: Duration,

    /// How long to wait for sessions after stopping before aborting them
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub shutdown_grace: Duration,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl LoadTestArgs {
    pub fn into_config(self) -> LinkResult<FleetConfig> {
        let token = self
            .token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| LinkError::Configuration("--token or SATOPS_TOKEN is required".to_string()))?;
        if self.clients > MAX_CLIENTS {
            return Err(LinkError::Configuration(format!(
                "--clients must be at most {}, got {}",
                MAX_CLIENTS, self.clients
            )));
        }

        Ok(FleetConfig {
            base_url: require_scheme("--base-url", &self.base_url, &["http", "https"])?,
            ws_url: require_scheme("--ws-url", &self.ws_url, &["ws", "wss"])?,
            operator_token: AccessToken::new(token),
            clients: self.clients,
            duration: self.duration,
            cleanup: self.cleanup,
            report_interval: require_nonzero("--report-interval", self.report_interval)?,
            handshake: self.handshake,
            keepalive_interval: require_nonzero("--keepalive-interval", self.keepalive_interval)?,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            stagger: self.stagger,
            shutdown_grace: self.shutdown_grace,
        })
    }
}

/// Validated settings for one fleet run.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub base_url: String,
    pub ws_url: String,
    pub operator_token: AccessToken,
    pub clients: usize,
    pub duration: Duration,
    pub cleanup: bool,
    pub report_interval: Duration,
    pub handshake: HandshakeKind,
    pub keepalive_interval: Duration,
    pub handshake_timeout: Duration,
    pub stagger: Duration,
    pub shutdown_grace: Duration,
}

impl FleetConfig {
    /// Defaults for everything but the endpoints and operator token.
    pub fn new(base_url: &str, ws_url: &str, operator_token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            ws_url: ws_url.trim_end_matches('/').to_string(),
            operator_token: AccessToken::new(operator_token),
            clients: 10,
            duration: Duration::from_secs(300),
            cleanup: true,
            report_interval: DEFAULT_REPORT_INTERVAL,
            handshake: HandshakeKind::Connect,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            stagger: DEFAULT_STAGGER,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            handshake: self.handshake,
            keepalive_interval: self.keepalive_interval,
            handshake_timeout: self.handshake_timeout,
            ..SessionConfig::new(&self.ws_url)
        }
    }
}

/// Mock ground station
#[derive(Parser, Debug, Clone)]
#[command(name = "mock_ground_station")]
#[command(about = "Single ground station that answers scheduled transmissions with an image upload")]
#[command(version)]
pub struct GroundStationArgs {
    /// Control-plane HTTP base URL
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// WebSocket base URL
    #[arg(long, default_value = DEFAULT_WS_URL)]
    pub ws_url: String,

    /// Ground station application id
    #[arg(long, env = "GS_APP_ID")]
    pub app_id: Option<String>,

    /// Ground station API key
    #[arg(long, env = "GS_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Image uploaded for every scheduled transmission
    #[arg(long, default_value = "memesat-1.png")]
    pub image: PathBuf,

    /// Identification message type
    #[arg(long, value_enum, default_value_t = HandshakeKind::Hello)]
    pub handshake: HandshakeKind,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl GroundStationArgs {
    pub fn into_config(self) -> LinkResult<GroundStationConfig> {
        let application_id = self
            .app_id
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| LinkError::Configuration("GS_APP_ID environment variable is required".to_string()))?;
        let api_key = self
            .api_key
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| LinkError::Configuration("GS_API_KEY environment variable is required".to_string()))?;

        Ok(GroundStationConfig {
            base_url: require_scheme("--base-url", &self.base_url, &["http", "https"])?,
            ws_url: require_scheme("--ws-url", &self.ws_url, &["ws", "wss"])?,
            application_id,
            api_key: AccessToken::new(api_key),
            image: self.image,
            handshake: self.handshake,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GroundStationConfig {
    pub base_url: String,
    pub ws_url: String,
    pub application_id: String,
    /// Kept in an `AccessToken` only for its redacted `Debug`
    pub api_key: AccessToken,
    pub image: PathBuf,
    pub handshake: HandshakeKind,
}
