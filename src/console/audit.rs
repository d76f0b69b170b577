//! Promotion audit log viewer

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use super::FreshnessBands;
use crate::api::{ApiClient, AuditDecision, AuditRow, ModelsQuery};
use crate::poll::{classify, Freshness};

/// Client-side projection filter. The underlying log is append-only and
/// server-owned; the view only narrows what is displayed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    pub decision: Option<AuditDecision>,
    pub reason_category: Option<String>,
}

impl AuditFilter {
    fn matches(&self, row: &AuditRow) -> bool {
        if let Some(decision) = self.decision {
            if row.decision != decision {
                return false;
            }
        }
        if let Some(category) = &self.reason_category {
            if row.reason_category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Serializable snapshot for the status server
#[derive(Debug, Clone, Serialize)]
pub struct AuditStatus {
    pub events: Vec<AuditRow>,
    pub filter: AuditFilter,
    pub total_fetched: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub freshness: Freshness,
}

/// Holds the last-fetched slice of the promotion decision log, newest first.
pub struct AuditLog {
    client: Arc<ApiClient>,
    limit: u32,
    filter: AuditFilter,
    events: Vec<AuditRow>,
    last_update: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl AuditLog {
    pub fn new(client: Arc<ApiClient>, limit: u32) -> Self {
        Self {
            client,
            limit,
            filter: AuditFilter::default(),
            events: Vec::new(),
            last_update: None,
            last_error: None,
        }
    }

    pub async fn refresh(&mut self, now: DateTime<Utc>) {
        let query = ModelsQuery {
            limit: Some(self.limit),
            ..ModelsQuery::default()
        };
        match self.client.production_history(&query).await {
            Ok(history) => self.apply_rows(history.rows, now),
            Err(e) => {
                warn!("promotion history fetch failed: {}", e);
                self.last_error = Some(e.to_string());
            }
        }
    }

    /// Replace the held slice. Rows are sorted newest first, id descending
    /// on equal timestamps; the rows themselves are never modified.
    pub fn apply_rows(&mut self, mut rows: Vec<AuditRow>, now: DateTime<Utc>) {
        rows.sort_by(|a, b| {
            let ka = a.ts.unwrap_or(f64::NEG_INFINITY);
            let kb = b.ts.unwrap_or(f64::NEG_INFINITY);
            kb.partial_cmp(&ka)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.id.cmp(&a.id))
        });

        self.events = rows;
        self.last_error = None;
        self.last_update = Some(now);
    }

    pub fn set_filter(&mut self, filter: AuditFilter) {
        self.filter = filter;
    }

    pub fn filter(&self) -> &AuditFilter {
        &self.filter
    }

    pub fn status(&self, now: DateTime<Utc>, bands: FreshnessBands) -> AuditStatus {
        let events: Vec<AuditRow> = self
            .events
            .iter()
            .filter(|row| self.filter.matches(row))
            .cloned()
            .collect();

        AuditStatus {
            events,
            filter: self.filter.clone(),
            total_fetched: self.events.len(),
            last_update: self.last_update,
            last_error: self.last_error.clone(),
            freshness: classify(self.last_update, now, bands.fresh, bands.stale),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn log() -> AuditLog {
        let client = Arc::new(
            ApiClient::new("http://localhost:9", Duration::from_secs(1)).unwrap(),
        );
        AuditLog::new(client, 100)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn bands() -> FreshnessBands {
        FreshnessBands {
            fresh: chrono::Duration::seconds(90),
            stale: chrono::Duration::seconds(300),
        }
    }

    fn row(id: &str, ts: f64, decision: AuditDecision, category: &str) -> AuditRow {
        AuditRow {
            id: id.to_string(),
            ts: Some(ts),
            decision,
            reason: Some("because".to_string()),
            reason_category: Some(category.to_string()),
            model_id: Some("m1".to_string()),
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_rows_sorted_newest_first() {
        let mut l = log();
        l.apply_rows(
            vec![
                row("a", 100.0, AuditDecision::Promoted, "metrics"),
                row("b", 300.0, AuditDecision::Skipped, "cooldown"),
                row("c", 200.0, AuditDecision::Error, "training"),
            ],
            at(0),
        );

        let ids: Vec<&str> = l.events.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_decision_filter() {
        let mut l = log();
        l.apply_rows(
            vec![
                row("a", 100.0, AuditDecision::Promoted, "metrics"),
                row("b", 300.0, AuditDecision::Skipped, "cooldown"),
            ],
            at(0),
        );
        l.set_filter(AuditFilter {
            decision: Some(AuditDecision::Skipped),
            reason_category: None,
        });

        let status = l.status(at(1), bands());
        assert_eq!(status.events.len(), 1);
        assert_eq!(status.events[0].id, "b");
        assert_eq!(status.total_fetched, 2, "filter narrows display only");
    }

    #[test]
    fn test_category_filter() {
        let mut l = log();
        l.apply_rows(
            vec![
                row("a", 100.0, AuditDecision::Skipped, "metrics"),
                row("b", 300.0, AuditDecision::Skipped, "cooldown"),
            ],
            at(0),
        );
        l.set_filter(AuditFilter {
            decision: None,
            reason_category: Some("metrics".to_string()),
        });

        let status = l.status(at(1), bands());
        assert_eq!(status.events.len(), 1);
        assert_eq!(status.events[0].id, "a");
    }

    #[test]
    fn test_projection_does_not_mutate_events() {
        let mut l = log();
        l.apply_rows(vec![row("a", 100.0, AuditDecision::Promoted, "metrics")], at(0));
        l.set_filter(AuditFilter {
            decision: Some(AuditDecision::Error),
            reason_category: None,
        });

        let status = l.status(at(1), bands());
        assert!(status.events.is_empty());
        // Underlying slice untouched by the filtered projection
        assert_eq!(l.events.len(), 1);
    }
}
