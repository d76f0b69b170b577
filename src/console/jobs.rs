//! Backfill job center: polled runs, live stream updates, ETAs

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;

use super::FreshnessBands;
use crate::api::{ApiClient, RunRow, RunStatus, RunsQuery, RunsStreamMessage};
use crate::poll::{classify, EtaEstimate, Freshness, ThroughputEstimator};
use crate::prefs::PrefStore;
use crate::stream::SseEvent;

const PREF_KEY: &str = "jobcenter.backfill";

/// One run with its display-ready completion estimate
#[derive(Debug, Clone, Serialize)]
pub struct RunView {
    #[serde(flatten)]
    pub row: RunRow,
    pub eta: Option<EtaEstimate>,
}

/// Stream-side health for the panel header
#[derive(Debug, Clone, Serialize)]
pub struct StreamHealth {
    pub connected: bool,
    pub last_message: Option<DateTime<Utc>>,
    pub freshness: Freshness,
    pub disconnects: u64,
    pub note: Option<String>,
}

/// Serializable snapshot for the status server
#[derive(Debug, Clone, Serialize)]
pub struct JobsStatus {
    pub runs: Vec<RunView>,
    pub total: Option<u64>,
    pub filter: RunsQuery,
    pub stream: StreamHealth,
    pub last_update: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub freshness: Freshness,
}

/// Tracks backfill runs from polling and from the `/stream/runs` channel.
///
/// A poll result replaces the tracked page (run ids are unique within one
/// fetch; for a duplicated id the later row wins). Stream messages merge on
/// top, so whatever the server reported last is what the panel shows. ETAs
/// come from the two-point estimator and are recomputed on every sample.
pub struct JobCenter {
    client: Arc<ApiClient>,
    prefs: Arc<PrefStore>,
    filter: RunsQuery,
    estimator: ThroughputEstimator,
    runs: HashMap<String, RunRow>,
    etas: HashMap<String, EtaEstimate>,
    total: Option<u64>,
    stream_connected: bool,
    last_stream_message: Option<DateTime<Utc>>,
    disconnects: u64,
    stream_note: Option<String>,
    last_update: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl JobCenter {
    pub fn new(client: Arc<ApiClient>, prefs: Arc<PrefStore>) -> Self {
        let filter = prefs.get(PREF_KEY, RunsQuery::default());
        Self {
            client,
            prefs,
            filter,
            estimator: ThroughputEstimator::new(),
            runs: HashMap::new(),
            etas: HashMap::new(),
            total: None,
            stream_connected: false,
            last_stream_message: None,
            disconnects: 0,
            stream_note: None,
            last_update: None,
            last_error: None,
        }
    }

    pub async fn refresh(&mut self, now: DateTime<Utc>) {
        match self.client.backfill_runs(&self.filter).await {
            Ok(payload) => {
                let (rows, total) = payload.into_rows();
                self.apply_runs(rows, total, now);
            }
            Err(e) => {
                warn!("backfill runs fetch failed: {}", e);
                self.last_error = Some(e.to_string());
            }
        }
    }

    /// Replace the tracked page with a poll result.
    pub fn apply_runs(&mut self, rows: Vec<RunRow>, total: Option<u64>, now: DateTime<Utc>) {
        self.last_error = None;
        self.total = total;
        self.runs.clear();
        for row in rows {
            self.track(row, now);
        }

        // A run that left the page starts cold if it ever comes back
        let runs = &self.runs;
        self.estimator.retain(|id| runs.contains_key(id));
        self.etas.retain(|id, _| runs.contains_key(id));

        self.last_update = Some(now);
    }

    /// Merge one `/stream/runs` message on top of the tracked page.
    pub fn apply_stream_event(&mut self, event: &SseEvent, now: DateTime<Utc>) {
        match serde_json::from_str::<RunsStreamMessage>(&event.data) {
            Ok(message) => {
                for row in message.items {
                    self.track(row, now);
                }
                self.stream_connected = true;
                self.last_stream_message = Some(now);
                self.stream_note = None;
            }
            Err(e) => {
                // Malformed payload: ignore the message, keep the connection
                debug!("ignoring malformed stream message: {}", e);
            }
        }
    }

    /// Record a lost stream connection.
    pub fn on_stream_disconnected(&mut self, reason: &str) {
        self.stream_connected = false;
        self.disconnects += 1;
        self.stream_note = Some(reason.to_string());
    }

    pub fn stream_connected(&self) -> bool {
        self.stream_connected
    }

    /// True once a disconnect has been observed and no event has arrived
    /// since; the poll tick uses this to re-arm the stream.
    pub fn stream_wants_reconnect(&self) -> bool {
        !self.stream_connected && self.stream_note.is_some()
    }

    fn track(&mut self, row: RunRow, now: DateTime<Utc>) {
        if row.status == RunStatus::Running {
            if let Some(inserted) = row.inserted {
                match self.estimator.observe(&row.id, inserted, row.target, now) {
                    Some(eta) => {
                        self.etas.insert(row.id.clone(), eta);
                    }
                    None => {
                        self.etas.remove(&row.id);
                    }
                }
            }
        } else {
            // Finished runs keep no estimate
            self.etas.remove(&row.id);
            self.estimator.forget(&row.id);
        }
        self.runs.insert(row.id.clone(), row);
    }

    pub fn filter(&self) -> &RunsQuery {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: RunsQuery) {
        self.filter = filter;
        self.prefs.set(PREF_KEY, &self.filter);
    }

    pub fn status(&self, now: DateTime<Utc>, bands: FreshnessBands) -> JobsStatus {
        let mut runs: Vec<RunView> = self
            .runs
            .values()
            .map(|row| RunView {
                row: row.clone(),
                eta: self.etas.get(&row.id).copied(),
            })
            .collect();
        runs.sort_by(|a, b| {
            let ka = a.row.started_ts.unwrap_or(f64::NEG_INFINITY);
            let kb = b.row.started_ts.unwrap_or(f64::NEG_INFINITY);
            kb.partial_cmp(&ka)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.row.id.cmp(&b.row.id))
        });

        JobsStatus {
            runs,
            total: self.total,
            filter: self.filter.clone(),
            stream: StreamHealth {
                connected: self.stream_connected,
                last_message: self.last_stream_message,
                freshness: classify(self.last_stream_message, now, bands.fresh, bands.stale),
                disconnects: self.disconnects,
                note: self.stream_note.clone(),
            },
            last_update: self.last_update,
            last_error: self.last_error.clone(),
            freshness: classify(self.last_update, now, bands.fresh, bands.stale),
        }
    }
}
