//! HTTP client for the ops backend

use std::time::Duration;

use log::debug;
use serde::de::DeserializeOwned;

use super::types::{
    ActionResponse, AlertStatus, DriftHistoryResponse, DriftScanResponse, IngestionStatus,
    ModelsQuery, ModelsSummary, ProductionHistoryResponse, RunsPayload, RunsQuery, SeedStatus,
};
use crate::config::StreamConfig;
use crate::errors::{Error, Result};
use crate::stream::HttpEventSource;

/// How much of an error body is kept for the error message
const ERROR_BODY_LIMIT: usize = 200;

/// Typed client over the backend's REST endpoints.
///
/// Each call returns `Result` rather than logging internally; the console
/// views decide how a failure is surfaced.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T> {
        let response = self.http.get(self.url(path)).query(query).send().await?;
        Self::decode(response).await
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.http.post(self.url(path)).send().await?;
        Self::decode(response).await
    }

    async fn delete_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.http.delete(self.url(path)).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(ERROR_BODY_LIMIT);
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        debug!("response body: {} bytes", text.len());
        Ok(serde_json::from_str(&text)?)
    }

    // -- feature drift ------------------------------------------------------

    pub async fn drift_scan(
        &self,
        window: u32,
        features: &[String],
        threshold: f64,
    ) -> Result<DriftScanResponse> {
        let query = vec![
            ("window".to_string(), window.to_string()),
            ("features".to_string(), features.join(",")),
            ("threshold".to_string(), threshold.to_string()),
        ];
        self.get_json("/api/features/drift/scan", &query).await
    }

    pub async fn drift_history(&self, limit: u32) -> Result<DriftHistoryResponse> {
        let query = vec![("limit".to_string(), limit.to_string())];
        self.get_json("/api/features/drift/history", &query).await
    }

    // -- backfill runs ------------------------------------------------------

    pub async fn backfill_runs(&self, query: &RunsQuery) -> Result<RunsPayload> {
        self.get_json("/api/features/backfill/runs", &query.to_query())
            .await
    }

    /// Event source for the `/stream/runs` SSE channel
    pub fn run_stream_source(&self, stream: &StreamConfig) -> HttpEventSource {
        let mut query = Vec::new();
        if let Some(symbol) = &stream.symbol {
            query.push(("symbol".to_string(), symbol.clone()));
        }
        if let Some(interval) = &stream.interval {
            query.push(("interval".to_string(), interval.clone()));
        }
        if let Some(status) = &stream.status {
            query.push(("status".to_string(), status.clone()));
        }
        if let Some(limit) = stream.limit {
            query.push(("limit".to_string(), limit.to_string()));
        }
        HttpEventSource::new(self.http.clone(), self.url("/stream/runs"), query)
    }

    // -- model registry -----------------------------------------------------

    pub async fn models_summary(&self, query: &ModelsQuery) -> Result<ModelsSummary> {
        self.get_json("/api/models/summary", &query.to_query()).await
    }

    pub async fn promote_model(&self, id: &str) -> Result<ActionResponse> {
        self.post_json(&format!("/api/models/{}/promote", id)).await
    }

    pub async fn rollback_model(&self, id: &str) -> Result<ActionResponse> {
        self.post_json(&format!("/api/models/{}/rollback", id)).await
    }

    pub async fn delete_model(&self, id: &str) -> Result<ActionResponse> {
        self.delete_json(&format!("/api/models/{}", id)).await
    }

    pub async fn production_history(
        &self,
        query: &ModelsQuery,
    ) -> Result<ProductionHistoryResponse> {
        self.get_json("/api/models/production/history", &query.to_query())
            .await
    }

    pub async fn promotion_alert_status(&self) -> Result<AlertStatus> {
        self.get_json("/api/models/promotion/alert/status", &[]).await
    }

    // -- inference / ingestion ----------------------------------------------

    pub async fn seed_status(&self) -> Result<SeedStatus> {
        self.get_json("/api/inference/seed/status", &[]).await
    }

    pub async fn ingestion_status(&self) -> Result<IngestionStatus> {
        self.get_json("/api/ingestion/status", &[]).await
    }

    /// Raw Prometheus text exposition
    pub async fn metrics_text(&self) -> Result<String> {
        let response = self.http.get(self.url("/metrics")).send().await?;
        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(ERROR_BODY_LIMIT);
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalized() {
        let client = ApiClient::new("http://localhost:8080/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(
            client.url("/api/models/summary"),
            "http://localhost:8080/api/models/summary"
        );
    }

    #[test]
    fn test_runs_query_serialization() {
        let query = RunsQuery {
            page: Some(2),
            page_size: Some(50),
            status: Some("running".to_string()),
            symbol: Some("BTCUSDT".to_string()),
            ..RunsQuery::default()
        };
        let pairs = query.to_query();
        assert!(pairs.contains(&("page".to_string(), "2".to_string())));
        assert!(pairs.contains(&("symbol".to_string(), "BTCUSDT".to_string())));
        assert_eq!(pairs.len(), 4);
    }
}
