use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, response::Json, routing::get, Router};
use log::info;

use crate::console::{
    AuditStatus, ConsoleStatus, Dashboard, DriftStatus, IngestStatus, JobsStatus, MetricsStatus,
    RegistryStatus,
};
use crate::errors::{Error, Result};

/// Start the status server.
///
/// Serves the aggregated view-model state as JSON only; rendering is the
/// consumer's problem.
pub(crate) async fn start_server(dashboard: Arc<Dashboard>, host: String, port: u16) -> Result<()> {
    let app = Router::new()
        .route("/healthz", get(health_handler))
        .route("/api/console", get(console_handler))
        .route("/api/console/drift", get(drift_handler))
        .route("/api/console/jobs", get(jobs_handler))
        .route("/api/console/metrics", get(metrics_handler))
        .route("/api/console/registry", get(registry_handler))
        .route("/api/console/audit", get(audit_handler))
        .route("/api/console/ingestion", get(ingestion_handler))
        .with_state(dashboard);

    let addr_str = format!("{}:{}", host, port);
    let addr: SocketAddr = addr_str
        .parse()
        .map_err(|e| Error::Server(format!("invalid address {}: {}", addr_str, e)))?;

    info!("Status server running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn console_handler(State(dashboard): State<Arc<Dashboard>>) -> Json<ConsoleStatus> {
    Json(dashboard.snapshot().await)
}

async fn drift_handler(State(dashboard): State<Arc<Dashboard>>) -> Json<DriftStatus> {
    Json(dashboard.drift_status().await)
}

async fn jobs_handler(State(dashboard): State<Arc<Dashboard>>) -> Json<JobsStatus> {
    Json(dashboard.jobs_status().await)
}

async fn metrics_handler(State(dashboard): State<Arc<Dashboard>>) -> Json<MetricsStatus> {
    Json(dashboard.metrics_status().await)
}

async fn registry_handler(State(dashboard): State<Arc<Dashboard>>) -> Json<RegistryStatus> {
    Json(dashboard.registry_status().await)
}

async fn audit_handler(State(dashboard): State<Arc<Dashboard>>) -> Json<AuditStatus> {
    Json(dashboard.audit_status().await)
}

async fn ingestion_handler(State(dashboard): State<Arc<Dashboard>>) -> Json<IngestStatus> {
    Json(dashboard.ingest_status().await)
}
