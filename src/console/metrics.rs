//! Model-metrics trend view

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::FreshnessBands;
use crate::api::{ApiClient, ModelsQuery, ModelsSummary};
use crate::poll::{classify, Freshness};
use crate::prefs::PrefStore;

/// Bounded length of the retained snapshot history
pub const SNAPSHOT_HISTORY_LIMIT: usize = 200;

const HISTORY_KEY: &str = "model_metrics_history_v1";
const AUTO_KEY: &str = "model_metrics_auto";
const INTERVAL_KEY: &str = "model_metrics_interval";

/// One sampled set of production-model metrics.
///
/// `None` field values are metrics the server reported as null; they render
/// as placeholders, never as zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub ts: DateTime<Utc>,
    pub fields: BTreeMap<String, Option<f64>>,
    pub version: Option<String>,
}

/// Serializable snapshot for the status server
#[derive(Debug, Clone, Serialize)]
pub struct MetricsStatus {
    pub latest: Option<MetricSnapshot>,
    pub history: Vec<MetricSnapshot>,
    pub auto_refresh: bool,
    pub interval_secs: u64,
    pub last_update: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub freshness: Freshness,
}

/// Samples the production model's metrics on every poll and keeps a bounded
/// trend history with strictly increasing timestamps.
///
/// The history survives restarts through the preference store
/// (`model_metrics_history_v1`); a corrupt stored blob silently yields an
/// empty trend.
pub struct MetricsTrend {
    client: Arc<ApiClient>,
    prefs: Arc<PrefStore>,
    history: VecDeque<MetricSnapshot>,
    auto_refresh: bool,
    interval_secs: u64,
    last_update: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl MetricsTrend {
    pub fn new(client: Arc<ApiClient>, prefs: Arc<PrefStore>, default_interval_secs: u64) -> Self {
        let stored: Vec<MetricSnapshot> = prefs.get(HISTORY_KEY, Vec::new());
        let auto_refresh = prefs.get(AUTO_KEY, true);
        let interval_secs = prefs.get(INTERVAL_KEY, default_interval_secs);

        let mut trend = Self {
            client,
            prefs,
            history: VecDeque::new(),
            auto_refresh,
            interval_secs,
            last_update: None,
            last_error: None,
        };
        // Re-apply the invariant on load; a hand-edited or corrupt file may
        // violate it
        for snap in stored {
            trend.push_snapshot(snap);
        }
        trend
    }

    /// Scheduler entry point: refresh unless auto-refresh is switched off.
    pub async fn tick(&mut self, now: DateTime<Utc>) {
        if self.auto_refresh {
            self.refresh(now).await;
        }
    }

    pub async fn refresh(&mut self, now: DateTime<Utc>) {
        let query = ModelsQuery {
            limit: Some(1),
            ..ModelsQuery::default()
        };
        match self.client.models_summary(&query).await {
            Ok(summary) => self.apply_summary(&summary, now),
            Err(e) => {
                warn!("model metrics fetch failed: {}", e);
                self.last_error = Some(e.to_string());
            }
        }
    }

    /// Fold a summary response in, appending one snapshot when a production
    /// model exists.
    pub fn apply_summary(&mut self, summary: &ModelsSummary, now: DateTime<Utc>) {
        self.last_error = None;
        self.last_update = Some(now);

        let Some(production) = &summary.production else {
            return;
        };

        let snapshot = MetricSnapshot {
            ts: now,
            fields: production.numeric_fields(),
            version: production.version.clone(),
        };
        if self.push_snapshot(snapshot) {
            self.persist_history();
        }
    }

    /// Append a snapshot, enforcing strictly increasing timestamps and the
    /// bounded length. Returns whether the snapshot was accepted.
    pub fn push_snapshot(&mut self, snapshot: MetricSnapshot) -> bool {
        if let Some(last) = self.history.back() {
            if snapshot.ts <= last.ts {
                debug!(
                    "rejecting metric snapshot with non-increasing ts {} (last {})",
                    snapshot.ts, last.ts
                );
                return false;
            }
        }

        self.history.push_back(snapshot);
        while self.history.len() > SNAPSHOT_HISTORY_LIMIT {
            self.history.pop_front();
        }
        true
    }

    fn persist_history(&self) {
        let history: Vec<&MetricSnapshot> = self.history.iter().collect();
        self.prefs.set(HISTORY_KEY, &history);
    }

    pub fn auto_refresh(&self) -> bool {
        self.auto_refresh
    }

    pub fn set_auto_refresh(&mut self, enabled: bool) {
        self.auto_refresh = enabled;
        self.prefs.set(AUTO_KEY, &enabled);
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    pub fn set_interval_secs(&mut self, secs: u64) {
        self.interval_secs = secs;
        self.prefs.set(INTERVAL_KEY, &secs);
    }

    pub fn status(&self, now: DateTime<Utc>, bands: FreshnessBands) -> MetricsStatus {
        MetricsStatus {
            latest: self.history.back().cloned(),
            history: self.history.iter().cloned().collect(),
            auto_refresh: self.auto_refresh,
            interval_secs: self.interval_secs,
            last_update: self.last_update,
            last_error: self.last_error.clone(),
            freshness: classify(self.last_update, now, bands.fresh, bands.stale),
        }
    }
}
