use config::{Config, File};
pub use config::ConfigError;
use serde::Deserialize;

/// Main configuration struct
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Backend configuration (base URL, request timeout)
    pub backend: BackendConfig,
    /// Poll intervals per view
    #[serde(default)]
    pub poll: PollConfig,
    /// Freshness bands for staleness classification
    #[serde(default)]
    pub staleness: StalenessConfig,
    /// Drift scan parameters
    #[serde(default)]
    pub drift: DriftConfig,
    /// Run stream (SSE) configuration
    #[serde(default)]
    pub stream: StreamConfig,
    /// Gauges extracted from the Prometheus exposition
    #[serde(default)]
    pub ingestion: IngestionConfig,
    /// Preference persistence
    #[serde(default)]
    pub prefs: PrefsConfig,
    /// Status server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the ops backend, e.g. "http://127.0.0.1:8080"
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct PollConfig {
    /// Drift scan poll interval
    #[serde(default = "default_drift_secs")]
    pub drift_secs: u64,
    /// Backfill runs poll interval
    #[serde(default = "default_runs_secs")]
    pub runs_secs: u64,
    /// Model metrics poll interval (overridable via a preference)
    #[serde(default = "default_metrics_secs")]
    pub metrics_secs: u64,
    /// Model registry poll interval
    #[serde(default = "default_registry_secs")]
    pub registry_secs: u64,
    /// Promotion audit poll interval
    #[serde(default = "default_audit_secs")]
    pub audit_secs: u64,
    /// Ingestion/candle monitor poll interval
    #[serde(default = "default_ingestion_secs")]
    pub ingestion_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            drift_secs: default_drift_secs(),
            runs_secs: default_runs_secs(),
            metrics_secs: default_metrics_secs(),
            registry_secs: default_registry_secs(),
            audit_secs: default_audit_secs(),
            ingestion_secs: default_ingestion_secs(),
        }
    }
}

fn default_drift_secs() -> u64 {
    60
}

fn default_runs_secs() -> u64 {
    30
}

fn default_metrics_secs() -> u64 {
    30
}

fn default_registry_secs() -> u64 {
    60
}

fn default_audit_secs() -> u64 {
    60
}

fn default_ingestion_secs() -> u64 {
    20
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StalenessConfig {
    /// Age at or below which a source counts as fresh
    #[serde(default = "default_fresh_secs")]
    pub fresh_secs: u64,
    /// Age above which a source counts as stale
    #[serde(default = "default_stale_secs")]
    pub stale_secs: u64,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            fresh_secs: default_fresh_secs(),
            stale_secs: default_stale_secs(),
        }
    }
}

fn default_fresh_secs() -> u64 {
    90
}

fn default_stale_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriftConfig {
    /// Scan window size (observations per feature)
    #[serde(default = "default_drift_window")]
    pub window: u32,
    /// Requested z-score threshold (the server may clamp it)
    #[serde(default = "default_drift_threshold")]
    pub threshold: f64,
    /// Features to scan
    #[serde(default = "default_drift_features")]
    pub features: Vec<String>,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            window: default_drift_window(),
            threshold: default_drift_threshold(),
            features: default_drift_features(),
        }
    }
}

fn default_drift_window() -> u32 {
    200
}

fn default_drift_threshold() -> f64 {
    3.0
}

fn default_drift_features() -> Vec<String> {
    ["returns", "volatility", "spread", "volume", "funding"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Enable the `/stream/runs` subscription
    #[serde(default = "default_stream_enabled")]
    pub enabled: bool,
    /// Heartbeat timeout: silence past this counts as connection loss.
    /// Also the minimum backoff between reconnect attempts.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Optional symbol filter forwarded to the backend
    #[serde(default)]
    pub symbol: Option<String>,
    /// Optional interval filter forwarded to the backend
    #[serde(default)]
    pub interval: Option<String>,
    /// Optional status filter forwarded to the backend
    #[serde(default)]
    pub status: Option<String>,
    /// Optional row limit forwarded to the backend
    #[serde(default)]
    pub limit: Option<u32>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            enabled: default_stream_enabled(),
            heartbeat_secs: default_heartbeat_secs(),
            symbol: None,
            interval: None,
            status: None,
            limit: None,
        }
    }
}

fn default_stream_enabled() -> bool {
    true
}

fn default_heartbeat_secs() -> u64 {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestionConfig {
    /// Gauge names pulled out of `/metrics` for display
    #[serde(default = "default_gauges")]
    pub gauges: Vec<String>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            gauges: default_gauges(),
        }
    }
}

fn default_gauges() -> Vec<String> {
    ["ingestion_lag_seconds", "candles_ingested_total"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrefsConfig {
    /// Path of the JSON preference file
    #[serde(default = "default_prefs_path")]
    pub path: String,
}

impl Default for PrefsConfig {
    fn default() -> Self {
        Self {
            path: default_prefs_path(),
        }
    }
}

fn default_prefs_path() -> String {
    ".botwatch_prefs.json".to_string()
}

#[derive(Debug, Deserialize, Default)]
pub struct LogConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Enable the local status server
    #[serde(default = "default_server_enabled")]
    pub enabled: bool,
    /// Server port (default 3000)
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Server host (default 127.0.0.1)
    #[serde(default = "default_server_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_server_enabled(),
            port: default_server_port(),
            host: default_server_host(),
        }
    }
}

fn default_server_enabled() -> bool {
    false
}

fn default_server_port() -> u16 {
    3000
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

impl Settings {
    /// Load settings from a configuration file
    pub fn new(config_path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            // Add configuration file
            .add_source(File::with_name(config_path))
            // Add environment variables (overrides file)
            // e.g. BOTWATCH_BACKEND__BASE_URL=...
            .add_source(config::Environment::with_prefix("BOTWATCH").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let poll = PollConfig::default();
        assert_eq!(poll.drift_secs, 60);
        assert_eq!(poll.ingestion_secs, 20);

        let bands = StalenessConfig::default();
        assert!(bands.fresh_secs < bands.stale_secs);

        let drift = DriftConfig::default();
        assert_eq!(drift.window, 200);
        assert!(!drift.features.is_empty());

        let stream = StreamConfig::default();
        assert!(stream.enabled);
        assert_eq!(stream.heartbeat_secs, 20);
    }
}
