//! Wire models for the backend's JSON responses

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Convert an epoch-seconds timestamp (possibly fractional) to a `DateTime`.
pub fn ts_to_datetime(ts: f64) -> Option<DateTime<Utc>> {
    if !ts.is_finite() {
        return None;
    }
    let secs = ts.trunc() as i64;
    let nanos = (ts.fract().abs() * 1e9) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// Backends are inconsistent about numeric vs. string ids; accept both.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Feature drift
// ---------------------------------------------------------------------------

/// `/api/features/drift/scan` response
#[derive(Debug, Clone, Deserialize)]
pub struct DriftScanResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub results: HashMap<String, DriftFeature>,
    #[serde(default)]
    pub summary: Option<DriftSummary>,
}

/// Per-feature scan result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftFeature {
    #[serde(default)]
    pub z_score: Option<f64>,
    #[serde(default)]
    pub baseline_mean: Option<f64>,
    #[serde(default)]
    pub recent_mean: Option<f64>,
    #[serde(default)]
    pub n_baseline: u64,
    #[serde(default)]
    pub n_recent: u64,
    #[serde(default)]
    pub drift: bool,
    #[serde(default)]
    pub status: Option<String>,
    /// The threshold the server actually applied (it may clamp the request)
    #[serde(default)]
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftSummary {
    #[serde(default)]
    pub drift_count: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub max_abs_z: Option<f64>,
    #[serde(default)]
    pub top_feature: Option<String>,
}

/// `/api/features/drift/history` response
#[derive(Debug, Clone, Deserialize)]
pub struct DriftHistoryResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub items: Vec<DriftHistoryItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftHistoryItem {
    #[serde(default)]
    pub ts: Option<f64>,
    #[serde(default)]
    pub drift_count: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub max_abs_z: Option<f64>,
    #[serde(default)]
    pub top_feature: Option<String>,
    #[serde(default)]
    pub applied_threshold: Option<f64>,
}

// ---------------------------------------------------------------------------
// Backfill runs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Error,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One backfill run as the server last reported it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRow {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub status: RunStatus,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub started_ts: Option<f64>,
    #[serde(default)]
    pub updated_ts: Option<f64>,
    #[serde(default)]
    pub finished_ts: Option<f64>,
    /// Progress counter, monotonically increasing server-side
    #[serde(default)]
    pub inserted: Option<u64>,
    /// Fixed row target, when the server knows it
    #[serde(default)]
    pub target: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `/api/features/backfill/runs` returns either a bare array or a page
/// object; both are accepted.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RunsPayload {
    Page {
        #[serde(default)]
        items: Vec<RunRow>,
        #[serde(default)]
        total: Option<u64>,
    },
    List(Vec<RunRow>),
}

impl RunsPayload {
    pub fn into_rows(self) -> (Vec<RunRow>, Option<u64>) {
        match self {
            RunsPayload::Page { items, total } => (items, total),
            RunsPayload::List(rows) => {
                let total = Some(rows.len() as u64);
                (rows, total)
            }
        }
    }
}

/// Query parameters for the runs endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunsQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub interval: Option<String>,
}

impl RunsQuery {
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(page) = self.page {
            query.push(("page".to_string(), page.to_string()));
        }
        if let Some(page_size) = self.page_size {
            query.push(("page_size".to_string(), page_size.to_string()));
        }
        if let Some(sort_by) = &self.sort_by {
            query.push(("sort_by".to_string(), sort_by.clone()));
        }
        if let Some(order) = &self.order {
            query.push(("order".to_string(), order.clone()));
        }
        if let Some(status) = &self.status {
            query.push(("status".to_string(), status.clone()));
        }
        if let Some(symbol) = &self.symbol {
            query.push(("symbol".to_string(), symbol.clone()));
        }
        if let Some(interval) = &self.interval {
            query.push(("interval".to_string(), interval.clone()));
        }
        query
    }
}

/// One `/stream/runs` SSE message
#[derive(Debug, Clone, Deserialize)]
pub struct RunsStreamMessage {
    #[serde(default)]
    pub items: Vec<RunRow>,
}

// ---------------------------------------------------------------------------
// Model registry
// ---------------------------------------------------------------------------

/// One registry row. Metric columns vary by model type, so anything beyond
/// the fixed fields is kept as raw JSON and mined with `numeric_fields`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRow {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub version: Option<String>,
    #[serde(default)]
    pub created_ts: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ModelRow {
    /// Numeric fields of the row, with JSON `null` kept as `None` so missing
    /// metrics render as placeholders instead of zeros.
    pub fn numeric_fields(&self) -> BTreeMap<String, Option<f64>> {
        self.extra
            .iter()
            .filter_map(|(key, value)| match value {
                Value::Number(n) => Some((key.clone(), n.as_f64())),
                Value::Null => Some((key.clone(), None)),
                _ => None,
            })
            .collect()
    }
}

/// `/api/models/summary` response
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsSummary {
    #[serde(default)]
    pub has_model: bool,
    #[serde(default)]
    pub production: Option<ModelRow>,
    #[serde(default)]
    pub recent: Vec<ModelRow>,
}

/// Query parameters shared by the summary and history endpoints
#[derive(Debug, Clone, Default)]
pub struct ModelsQuery {
    pub limit: Option<u32>,
    pub name: Option<String>,
    pub model_type: Option<String>,
}

impl ModelsQuery {
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(limit) = self.limit {
            query.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(name) = &self.name {
            query.push(("name".to_string(), name.clone()));
        }
        if let Some(model_type) = &self.model_type {
            query.push(("model_type".to_string(), model_type.clone()));
        }
        query
    }
}

/// Response of promote / rollback / delete. The backend is inconsistent
/// (`{promoted: bool}` vs `{status: "..."}`), so both spellings are read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    #[serde(default)]
    pub promoted: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ActionResponse {
    pub fn succeeded(&self) -> bool {
        if let Some(promoted) = self.promoted {
            return promoted;
        }
        matches!(
            self.status.as_deref(),
            Some("ok" | "promoted" | "rolled_back" | "deleted")
        )
    }
}

// ---------------------------------------------------------------------------
// Promotion audit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditDecision {
    Promoted,
    Skipped,
    Error,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One append-only promotion audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRow {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub ts: Option<f64>,
    #[serde(default)]
    pub decision: AuditDecision,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub reason_category: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub model_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl AuditRow {
    /// The numeric deltas attached to the decision (`auc_delta`, …)
    pub fn numeric_deltas(&self) -> BTreeMap<String, f64> {
        self.extra
            .iter()
            .filter(|(key, _)| key.contains("delta"))
            .filter_map(|(key, value)| value.as_f64().map(|v| (key.clone(), v)))
            .collect()
    }
}

/// `/api/models/production/history` response
#[derive(Debug, Clone, Deserialize)]
pub struct ProductionHistoryResponse {
    #[serde(default)]
    pub rows: Vec<AuditRow>,
}

/// `/api/models/promotion/alert/status` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertStatus {
    #[serde(default)]
    pub in_cooldown: bool,
    #[serde(default)]
    pub next_allowed_ts: Option<f64>,
}

/// `/api/inference/seed/status` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedStatus {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub last_exit_ts: Option<f64>,
    #[serde(default)]
    pub started_at: Option<f64>,
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

/// `/api/ingestion/status` response. Older backends report `lag_seconds`,
/// newer ones `lag_sec`; both are kept and reconciled by the view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestionStatus {
    #[serde(default)]
    pub stale: Option<bool>,
    #[serde(default)]
    pub lag_sec: Option<f64>,
    #[serde(default)]
    pub lag_seconds: Option<f64>,
    #[serde(default)]
    pub last_message_ts: Option<f64>,
    #[serde(default)]
    pub thresholds: IngestionThresholds,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestionThresholds {
    #[serde(default)]
    pub ingestion_lag_sec: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_payload_accepts_both_shapes() {
        let list: RunsPayload =
            serde_json::from_str(r#"[{"id": 7, "status": "running"}]"#).unwrap();
        let (rows, total) = list.into_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "7");
        assert_eq!(rows[0].status, RunStatus::Running);
        assert_eq!(total, Some(1));

        let page: RunsPayload = serde_json::from_str(
            r#"{"items": [{"id": "a", "status": "success"}], "total": 40}"#,
        )
        .unwrap();
        let (rows, total) = page.into_rows();
        assert_eq!(rows[0].id, "a");
        assert_eq!(rows[0].status, RunStatus::Success);
        assert_eq!(total, Some(40));
    }

    #[test]
    fn test_unknown_run_status_does_not_fail() {
        let row: RunRow =
            serde_json::from_str(r#"{"id": 1, "status": "paused"}"#).unwrap();
        assert_eq!(row.status, RunStatus::Unknown);
    }

    #[test]
    fn test_missing_fields_default() {
        let row: RunRow = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        assert_eq!(row.status, RunStatus::Unknown);
        assert!(row.inserted.is_none());
        assert!(row.target.is_none());
    }

    #[test]
    fn test_model_row_numeric_fields_keep_nulls() {
        let row: ModelRow = serde_json::from_str(
            r#"{"id": 3, "name": "lgbm", "auc": 0.71, "sharpe": null, "tag": "x"}"#,
        )
        .unwrap();
        let fields = row.numeric_fields();
        assert_eq!(fields.get("auc"), Some(&Some(0.71)));
        assert_eq!(fields.get("sharpe"), Some(&None));
        assert!(!fields.contains_key("tag"));
    }

    #[test]
    fn test_action_response_spellings() {
        let a: ActionResponse = serde_json::from_str(r#"{"promoted": true}"#).unwrap();
        assert!(a.succeeded());

        let b: ActionResponse = serde_json::from_str(r#"{"status": "deleted"}"#).unwrap();
        assert!(b.succeeded());

        let c: ActionResponse =
            serde_json::from_str(r#"{"promoted": false, "reason": "cooldown"}"#).unwrap();
        assert!(!c.succeeded());
        assert_eq!(c.reason.as_deref(), Some("cooldown"));
    }

    #[test]
    fn test_audit_row_deltas() {
        let row: AuditRow = serde_json::from_str(
            r#"{"id": 1, "decision": "skipped", "reason_category": "metrics",
                "auc_delta": -0.01, "sharpe_delta": 0.2, "note": "x"}"#,
        )
        .unwrap();
        assert_eq!(row.decision, AuditDecision::Skipped);
        let deltas = row.numeric_deltas();
        assert_eq!(deltas.len(), 2);
        assert!((deltas["sharpe_delta"] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_ingestion_lag_spellings() {
        let status: IngestionStatus = serde_json::from_str(
            r#"{"lag_seconds": 12.5, "thresholds": {"ingestion_lag_sec": 60}}"#,
        )
        .unwrap();
        assert_eq!(status.lag_seconds, Some(12.5));
        assert!(status.lag_sec.is_none());
        assert_eq!(status.thresholds.ingestion_lag_sec, Some(60.0));
    }

    #[test]
    fn test_ts_to_datetime() {
        let dt = ts_to_datetime(1_700_000_000.5).unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);
        assert!(ts_to_datetime(f64::NAN).is_none());
    }
}
