//! Feature drift monitor

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use super::FreshnessBands;
use crate::api::{
    ts_to_datetime, ApiClient, DriftHistoryItem, DriftScanResponse, DriftSummary,
};
use crate::config::DriftConfig;
use crate::poll::{classify, Freshness};
use crate::prefs::PrefStore;

/// Bounded length of the retained scan history
pub const SCAN_HISTORY_LIMIT: usize = 200;

const PREF_KEY: &str = "feature_drift_prefs_v2";

/// Persisted drift view preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftPrefs {
    pub window: u32,
    pub threshold: f64,
    pub features: Vec<String>,
    pub auto_refresh: bool,
}

/// One display row of the latest scan
#[derive(Debug, Clone, Serialize)]
pub struct DriftRow {
    pub feature: String,
    pub z_score: Option<f64>,
    pub baseline_mean: Option<f64>,
    pub recent_mean: Option<f64>,
    pub n_baseline: u64,
    pub n_recent: u64,
    pub drift: bool,
}

/// One point of the scan-summary sparkline history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanPoint {
    pub ts: Option<DateTime<Utc>>,
    pub drift_count: u64,
    pub total: u64,
    pub max_abs_z: Option<f64>,
    pub top_feature: Option<String>,
    pub applied_threshold: Option<f64>,
}

/// Serializable snapshot for the status server
#[derive(Debug, Clone, Serialize)]
pub struct DriftStatus {
    pub rows: Vec<DriftRow>,
    pub summary: Option<DriftSummary>,
    pub requested_threshold: f64,
    pub applied_threshold: Option<f64>,
    /// Human-readable note when the server clamped the requested threshold
    pub threshold_note: Option<String>,
    pub history: Vec<ScanPoint>,
    pub last_update: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub freshness: Freshness,
}

/// Aggregates `/api/features/drift/scan` results for display.
///
/// Rows are flagged against the threshold the server *applied* (which may
/// differ from the requested one) and kept in a deterministic order: |z|
/// descending, feature name ascending on ties, rows without a finite z-score
/// last. A bounded history of scan summaries feeds the trend sparkline.
pub struct DriftMonitor {
    client: Arc<ApiClient>,
    prefs: Arc<PrefStore>,
    window: u32,
    requested_threshold: f64,
    features: Vec<String>,
    auto_refresh: bool,
    rows: Vec<DriftRow>,
    summary: Option<DriftSummary>,
    applied_threshold: Option<f64>,
    threshold_note: Option<String>,
    history: VecDeque<ScanPoint>,
    last_update: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl DriftMonitor {
    pub fn new(client: Arc<ApiClient>, prefs: Arc<PrefStore>, cfg: &DriftConfig) -> Self {
        let stored = prefs.get(
            PREF_KEY,
            DriftPrefs {
                window: cfg.window,
                threshold: cfg.threshold,
                features: cfg.features.clone(),
                auto_refresh: true,
            },
        );

        Self {
            client,
            prefs,
            window: stored.window,
            requested_threshold: stored.threshold,
            features: stored.features,
            auto_refresh: stored.auto_refresh,
            rows: Vec::new(),
            summary: None,
            applied_threshold: None,
            threshold_note: None,
            history: VecDeque::new(),
            last_update: None,
            last_error: None,
        }
    }

    /// Scheduler entry point: refresh unless auto-refresh is switched off.
    pub async fn tick(&mut self, now: DateTime<Utc>) {
        if self.auto_refresh {
            self.refresh(now).await;
        }
    }

    /// Run one scan and fold the result in. A failed fetch leaves the
    /// previous rows untouched and records the error for display.
    pub async fn refresh(&mut self, now: DateTime<Utc>) {
        let result = self
            .client
            .drift_scan(self.window, &self.features, self.requested_threshold)
            .await;
        match result {
            Ok(scan) => self.apply_scan(scan, now),
            Err(e) => {
                warn!("drift scan failed: {}", e);
                self.last_error = Some(e.to_string());
            }
        }
    }

    /// Fold a scan response into the view state.
    pub fn apply_scan(&mut self, scan: DriftScanResponse, now: DateTime<Utc>) {
        self.last_error = None;

        let applied = scan.results.values().find_map(|f| f.threshold);
        let effective = applied.unwrap_or(self.requested_threshold);
        self.applied_threshold = Some(effective);
        self.threshold_note = match applied {
            Some(a) if (a - self.requested_threshold).abs() > 1e-9 => Some(format!(
                "requested threshold {} but server applied {}",
                self.requested_threshold, a
            )),
            _ => None,
        };

        let mut rows: Vec<DriftRow> = scan
            .results
            .into_iter()
            .map(|(feature, f)| DriftRow {
                drift: f
                    .z_score
                    .map(|z| z.is_finite() && z.abs() >= effective)
                    .unwrap_or(false),
                feature,
                z_score: f.z_score,
                baseline_mean: f.baseline_mean,
                recent_mean: f.recent_mean,
                n_baseline: f.n_baseline,
                n_recent: f.n_recent,
            })
            .collect();
        sort_rows(&mut rows);

        let summary = scan.summary.unwrap_or_else(|| derive_summary(&rows));
        self.push_history(ScanPoint {
            ts: Some(now),
            drift_count: summary.drift_count,
            total: summary.total,
            max_abs_z: summary.max_abs_z,
            top_feature: summary.top_feature.clone(),
            applied_threshold: Some(effective),
        });

        self.summary = Some(summary);
        self.rows = rows;
        self.last_update = Some(now);
    }

    /// Seed the sparkline from the server's scan history (startup only).
    pub fn load_history(&mut self, items: Vec<DriftHistoryItem>) {
        let mut points: Vec<ScanPoint> = items
            .into_iter()
            .map(|item| ScanPoint {
                ts: item.ts.and_then(ts_to_datetime),
                drift_count: item.drift_count,
                total: item.total,
                max_abs_z: item.max_abs_z,
                top_feature: item.top_feature,
                applied_threshold: item.applied_threshold,
            })
            .collect();
        points.sort_by_key(|p| p.ts);

        self.history.clear();
        for point in points {
            self.push_history(point);
        }
    }

    fn push_history(&mut self, point: ScanPoint) {
        self.history.push_back(point);
        while self.history.len() > SCAN_HISTORY_LIMIT {
            self.history.pop_front();
        }
    }

    pub fn auto_refresh(&self) -> bool {
        self.auto_refresh
    }

    pub fn set_auto_refresh(&mut self, enabled: bool) {
        self.auto_refresh = enabled;
        self.save_prefs();
    }

    pub fn set_window(&mut self, window: u32) {
        self.window = window;
        self.save_prefs();
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.requested_threshold = threshold;
        self.save_prefs();
    }

    pub fn set_features(&mut self, features: Vec<String>) {
        self.features = features;
        self.save_prefs();
    }

    fn save_prefs(&self) {
        self.prefs.set(
            PREF_KEY,
            &DriftPrefs {
                window: self.window,
                threshold: self.requested_threshold,
                features: self.features.clone(),
                auto_refresh: self.auto_refresh,
            },
        );
    }

    pub fn status(&self, now: DateTime<Utc>, bands: FreshnessBands) -> DriftStatus {
        DriftStatus {
            rows: self.rows.clone(),
            summary: self.summary.clone(),
            requested_threshold: self.requested_threshold,
            applied_threshold: self.applied_threshold,
            threshold_note: self.threshold_note.clone(),
            history: self.history.iter().cloned().collect(),
            last_update: self.last_update,
            last_error: self.last_error.clone(),
            freshness: classify(self.last_update, now, bands.fresh, bands.stale),
        }
    }
}

fn sort_key(row: &DriftRow) -> Option<f64> {
    row.z_score.filter(|z| z.is_finite()).map(f64::abs)
}

fn sort_rows(rows: &mut [DriftRow]) {
    rows.sort_by(|a, b| match (sort_key(a), sort_key(b)) {
        (Some(x), Some(y)) => y
            .partial_cmp(&x)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.feature.cmp(&b.feature)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.feature.cmp(&b.feature),
    });
}

fn derive_summary(rows: &[DriftRow]) -> DriftSummary {
    DriftSummary {
        drift_count: rows.iter().filter(|r| r.drift).count() as u64,
        total: rows.len() as u64,
        max_abs_z: rows.first().and_then(sort_key),
        top_feature: rows.first().map(|r| r.feature.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::DriftFeature;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::time::Duration;

    fn monitor() -> DriftMonitor {
        let client = Arc::new(
            ApiClient::new("http://localhost:9", Duration::from_secs(1)).unwrap(),
        );
        DriftMonitor::new(client, Arc::new(PrefStore::in_memory()), &DriftConfig::default())
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn feature(z: Option<f64>, threshold: f64) -> DriftFeature {
        DriftFeature {
            z_score: z,
            baseline_mean: Some(0.0),
            recent_mean: z.map(|z| z / 10.0),
            n_baseline: 100,
            n_recent: 100,
            drift: false,
            status: None,
            threshold: Some(threshold),
        }
    }

    fn scan(features: Vec<(&str, Option<f64>)>, threshold: f64) -> DriftScanResponse {
        let results: HashMap<String, DriftFeature> = features
            .into_iter()
            .map(|(name, z)| (name.to_string(), feature(z, threshold)))
            .collect();
        DriftScanResponse {
            status: Some("ok".to_string()),
            results,
            summary: None,
        }
    }

    #[test]
    fn test_rows_sorted_by_abs_z_with_name_tiebreak() {
        let mut m = monitor();
        m.apply_scan(
            scan(
                vec![
                    ("spread", Some(-2.0)),
                    ("returns", Some(3.5)),
                    ("volume", Some(2.0)),
                    ("volatility", Some(0.1)),
                ],
                3.0,
            ),
            now(),
        );

        let order: Vec<&str> = m.rows.iter().map(|r| r.feature.as_str()).collect();
        // |z| descending; spread/volume tie at 2.0 broken by name ascending
        assert_eq!(order, vec!["returns", "spread", "volume", "volatility"]);
    }

    #[test]
    fn test_sort_is_deterministic_on_rerun() {
        let mut m = monitor();
        let build = || {
            scan(
                vec![("a", Some(1.0)), ("b", Some(-1.0)), ("c", Some(1.0))],
                3.0,
            )
        };
        m.apply_scan(build(), now());
        let first: Vec<String> = m.rows.iter().map(|r| r.feature.clone()).collect();
        m.apply_scan(build(), now() + chrono::Duration::seconds(60));
        let second: Vec<String> = m.rows.iter().map(|r| r.feature.clone()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_nan_rows_sort_last_and_never_flag() {
        let mut m = monitor();
        m.apply_scan(
            scan(
                vec![("bad", Some(f64::NAN)), ("good", Some(5.0)), ("none", None)],
                3.0,
            ),
            now(),
        );

        assert_eq!(m.rows[0].feature, "good");
        assert!(m.rows[0].drift);
        for row in &m.rows[1..] {
            assert!(!row.drift);
        }
    }

    #[test]
    fn test_flagging_uses_applied_threshold() {
        let mut m = monitor();
        m.set_threshold(3.0);
        // Server clamps to 2.5: a 2.7 z-score must flag
        m.apply_scan(scan(vec![("returns", Some(2.7))], 2.5), now());

        assert!(m.rows[0].drift);
        assert_eq!(m.applied_threshold, Some(2.5));
        let note = m.threshold_note.as_deref().unwrap();
        assert!(note.contains("3"), "note mentions requested: {}", note);
        assert!(note.contains("2.5"), "note mentions applied: {}", note);
    }

    #[test]
    fn test_matching_threshold_has_no_note() {
        let mut m = monitor();
        m.set_threshold(3.0);
        m.apply_scan(scan(vec![("returns", Some(1.0))], 3.0), now());
        assert!(m.threshold_note.is_none());
    }

    #[test]
    fn test_history_bounded() {
        let mut m = monitor();
        for i in 0..(SCAN_HISTORY_LIMIT + 50) {
            m.apply_scan(
                scan(vec![("returns", Some(i as f64 / 100.0))], 3.0),
                now() + chrono::Duration::seconds(i as i64),
            );
        }
        assert_eq!(m.history.len(), SCAN_HISTORY_LIMIT);
        // Oldest evicted: first retained point is scan #50
        let first_ts = m.history.front().and_then(|p| p.ts).unwrap();
        assert_eq!(first_ts, now() + chrono::Duration::seconds(50));
    }

    #[test]
    fn test_derived_summary_when_server_omits_it() {
        let mut m = monitor();
        m.apply_scan(
            scan(vec![("returns", Some(4.0)), ("spread", Some(0.5))], 3.0),
            now(),
        );
        let summary = m.summary.as_ref().unwrap();
        assert_eq!(summary.drift_count, 1);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.top_feature.as_deref(), Some("returns"));
        assert_eq!(summary.max_abs_z, Some(4.0));
    }

    #[test]
    fn test_prefs_round_trip_through_store() {
        let prefs = Arc::new(PrefStore::in_memory());
        let client = Arc::new(
            ApiClient::new("http://localhost:9", Duration::from_secs(1)).unwrap(),
        );

        let mut m = DriftMonitor::new(client.clone(), prefs.clone(), &DriftConfig::default());
        m.set_threshold(2.0);
        m.set_window(100);
        m.set_auto_refresh(false);

        let reloaded = DriftMonitor::new(client, prefs, &DriftConfig::default());
        assert_eq!(reloaded.window, 100);
        assert!((reloaded.requested_threshold - 2.0).abs() < 1e-12);
        assert!(!reloaded.auto_refresh());
    }

    #[test]
    fn test_status_freshness() {
        let mut m = monitor();
        let bands = FreshnessBands {
            fresh: chrono::Duration::seconds(90),
            stale: chrono::Duration::seconds(300),
        };

        let status = m.status(now(), bands);
        assert_eq!(status.freshness, Freshness::Unknown);

        m.apply_scan(scan(vec![("returns", Some(0.0))], 3.0), now());
        let status = m.status(now() + chrono::Duration::seconds(400), bands);
        assert_eq!(status.freshness, Freshness::Stale);
    }
}
