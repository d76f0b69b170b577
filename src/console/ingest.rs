//! OHLCV ingestion / candle feed monitor

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;

use super::FreshnessBands;
use crate::api::metrics::extract_gauges;
use crate::api::{ts_to_datetime, ApiClient, IngestionStatus};
use crate::poll::{classify, Freshness};

/// Serializable snapshot for the status server
#[derive(Debug, Clone, Serialize)]
pub struct IngestStatus {
    /// Raw payload from `/api/ingestion/status`
    pub ingestion: Option<IngestionStatus>,
    /// Reconciled lag in seconds (see [`IngestMonitor::effective_lag`])
    pub lag_secs: Option<f64>,
    /// Whether the feed counts as stale, server verdict first
    pub stale: Option<bool>,
    /// Gauges extracted from `/metrics`; absent samples stay `None`
    pub gauges: BTreeMap<String, Option<f64>>,
    pub last_message: Option<DateTime<Utc>>,
    pub last_update: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub freshness: Freshness,
}

/// Watches the candle ingestion pipeline through the status endpoint and a
/// few named gauges of the Prometheus exposition.
pub struct IngestMonitor {
    client: Arc<ApiClient>,
    gauge_names: Vec<String>,
    ingestion: Option<IngestionStatus>,
    gauges: BTreeMap<String, Option<f64>>,
    last_update: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl IngestMonitor {
    pub fn new(client: Arc<ApiClient>, gauge_names: Vec<String>) -> Self {
        Self {
            client,
            gauge_names,
            ingestion: None,
            gauges: BTreeMap::new(),
            last_update: None,
            last_error: None,
        }
    }

    /// Refresh status endpoint and gauges; the two fetches are independent.
    pub async fn refresh(&mut self, now: DateTime<Utc>) {
        let mut errors: Vec<String> = Vec::new();

        match self.client.ingestion_status().await {
            Ok(status) => {
                self.ingestion = Some(status);
                self.last_update = Some(now);
            }
            Err(e) => {
                warn!("ingestion status fetch failed: {}", e);
                errors.push(e.to_string());
            }
        }

        if !self.gauge_names.is_empty() {
            match self.client.metrics_text().await {
                Ok(text) => self.apply_exposition(&text),
                Err(e) => {
                    warn!("metrics fetch failed: {}", e);
                    errors.push(e.to_string());
                }
            }
        }

        self.last_error = if errors.is_empty() {
            None
        } else {
            Some(errors.join("; "))
        };
    }

    pub fn apply_exposition(&mut self, text: &str) {
        self.gauges = extract_gauges(text, &self.gauge_names);
    }

    /// Lag reconciliation: prefer the server's `lag_sec`, fall back to the
    /// legacy `lag_seconds` spelling, else derive from `last_message_ts`.
    pub fn effective_lag(&self, now: DateTime<Utc>) -> Option<f64> {
        let status = self.ingestion.as_ref()?;
        if let Some(lag) = status.lag_sec.or(status.lag_seconds) {
            return Some(lag);
        }
        let last = status.last_message_ts.and_then(ts_to_datetime)?;
        let age = now.signed_duration_since(last).num_milliseconds() as f64 / 1000.0;
        Some(age.max(0.0))
    }

    /// Staleness verdict: an explicit server flag wins; otherwise the
    /// reconciled lag is held against the server's own threshold.
    pub fn is_stale(&self, now: DateTime<Utc>) -> Option<bool> {
        let status = self.ingestion.as_ref()?;
        if let Some(stale) = status.stale {
            return Some(stale);
        }
        let threshold = status.thresholds.ingestion_lag_sec?;
        let lag = self.effective_lag(now)?;
        Some(lag > threshold)
    }

    pub fn status(&self, now: DateTime<Utc>, bands: FreshnessBands) -> IngestStatus {
        let last_message = self
            .ingestion
            .as_ref()
            .and_then(|s| s.last_message_ts)
            .and_then(ts_to_datetime);

        IngestStatus {
            ingestion: self.ingestion.clone(),
            lag_secs: self.effective_lag(now),
            stale: self.is_stale(now),
            gauges: self.gauges.clone(),
            last_message,
            last_update: self.last_update,
            last_error: self.last_error.clone(),
            freshness: classify(self.last_update, now, bands.fresh, bands.stale),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::IngestionThresholds;
    use chrono::TimeZone;
    use std::time::Duration;

    fn monitor() -> IngestMonitor {
        let client = Arc::new(
            ApiClient::new("http://localhost:9", Duration::from_secs(1)).unwrap(),
        );
        IngestMonitor::new(
            client,
            vec!["ingestion_lag_seconds".to_string(), "missing_gauge".to_string()],
        )
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn ingestion(
        stale: Option<bool>,
        lag_sec: Option<f64>,
        lag_seconds: Option<f64>,
        last_message_ts: Option<f64>,
        threshold: Option<f64>,
    ) -> IngestionStatus {
        IngestionStatus {
            stale,
            lag_sec,
            lag_seconds,
            last_message_ts,
            thresholds: IngestionThresholds {
                ingestion_lag_sec: threshold,
            },
        }
    }

    #[test]
    fn test_lag_prefers_new_spelling() {
        let mut m = monitor();
        m.ingestion = Some(ingestion(None, Some(5.0), Some(99.0), None, None));
        assert_eq!(m.effective_lag(at(0)), Some(5.0));
    }

    #[test]
    fn test_lag_falls_back_to_legacy_spelling() {
        let mut m = monitor();
        m.ingestion = Some(ingestion(None, None, Some(12.5), None, None));
        assert_eq!(m.effective_lag(at(0)), Some(12.5));
    }

    #[test]
    fn test_lag_derived_from_last_message() {
        let mut m = monitor();
        m.ingestion = Some(ingestion(None, None, None, Some(1_700_000_000.0), None));
        let lag = m.effective_lag(at(45)).unwrap();
        assert!((lag - 45.0).abs() < 0.01);
    }

    #[test]
    fn test_server_stale_flag_wins() {
        let mut m = monitor();
        // Lag is tiny but the server says stale
        m.ingestion = Some(ingestion(Some(true), Some(1.0), None, None, Some(60.0)));
        assert_eq!(m.is_stale(at(0)), Some(true));
    }

    #[test]
    fn test_stale_from_threshold() {
        let mut m = monitor();
        m.ingestion = Some(ingestion(None, Some(120.0), None, None, Some(60.0)));
        assert_eq!(m.is_stale(at(0)), Some(true));

        m.ingestion = Some(ingestion(None, Some(10.0), None, None, Some(60.0)));
        assert_eq!(m.is_stale(at(0)), Some(false));
    }

    #[test]
    fn test_stale_unknown_without_threshold_or_flag() {
        let mut m = monitor();
        m.ingestion = Some(ingestion(None, Some(120.0), None, None, None));
        assert_eq!(m.is_stale(at(0)), None);
    }

    #[test]
    fn test_gauges_extracted_with_placeholders() {
        let mut m = monitor();
        m.apply_exposition("ingestion_lag_seconds 4.5\nother 1\n");
        assert_eq!(m.gauges["ingestion_lag_seconds"], Some(4.5));
        assert_eq!(m.gauges["missing_gauge"], None, "absent sample stays None");
    }
}
