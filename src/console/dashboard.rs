//! Shared state container for the whole console

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use super::{
    AuditLog, AuditStatus, DriftMonitor, DriftStatus, FreshnessBands, IngestMonitor, IngestStatus,
    JobCenter, JobsStatus, MetricsStatus, MetricsTrend, RegistryPanel, RegistryStatus,
};

/// One JSON document describing every panel at a point in time
#[derive(Debug, Clone, Serialize)]
pub struct ConsoleStatus {
    pub generated_at: DateTime<Utc>,
    pub drift: DriftStatus,
    pub jobs: JobsStatus,
    pub metrics: MetricsStatus,
    pub registry: RegistryStatus,
    pub audit: AuditStatus,
    pub ingestion: IngestStatus,
}

/// Owns every view behind a lock.
///
/// Each view is written only by its own poll callback (or the stream
/// consumer, for the job center); the dashboard hands out read access for
/// snapshots, so no cross-view coupling exists beyond this container.
pub struct Dashboard {
    pub drift: Arc<RwLock<DriftMonitor>>,
    pub jobs: Arc<RwLock<JobCenter>>,
    pub metrics: Arc<RwLock<MetricsTrend>>,
    pub registry: Arc<RwLock<RegistryPanel>>,
    pub audit: Arc<RwLock<AuditLog>>,
    pub ingest: Arc<RwLock<IngestMonitor>>,
    bands: FreshnessBands,
}

impl Dashboard {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        drift: Arc<RwLock<DriftMonitor>>,
        jobs: Arc<RwLock<JobCenter>>,
        metrics: Arc<RwLock<MetricsTrend>>,
        registry: Arc<RwLock<RegistryPanel>>,
        audit: Arc<RwLock<AuditLog>>,
        ingest: Arc<RwLock<IngestMonitor>>,
        bands: FreshnessBands,
    ) -> Self {
        Self {
            drift,
            jobs,
            metrics,
            registry,
            audit,
            ingest,
            bands,
        }
    }

    pub fn bands(&self) -> FreshnessBands {
        self.bands
    }

    pub async fn drift_status(&self) -> DriftStatus {
        self.drift.read().await.status(Utc::now(), self.bands)
    }

    pub async fn jobs_status(&self) -> JobsStatus {
        self.jobs.read().await.status(Utc::now(), self.bands)
    }

    pub async fn metrics_status(&self) -> MetricsStatus {
        self.metrics.read().await.status(Utc::now(), self.bands)
    }

    pub async fn registry_status(&self) -> RegistryStatus {
        self.registry.read().await.status(Utc::now(), self.bands)
    }

    pub async fn audit_status(&self) -> AuditStatus {
        self.audit.read().await.status(Utc::now(), self.bands)
    }

    pub async fn ingest_status(&self) -> IngestStatus {
        self.ingest.read().await.status(Utc::now(), self.bands)
    }

    /// Snapshot the whole console in one pass.
    pub async fn snapshot(&self) -> ConsoleStatus {
        let now = Utc::now();
        ConsoleStatus {
            generated_at: now,
            drift: self.drift.read().await.status(now, self.bands),
            jobs: self.jobs.read().await.status(now, self.bands),
            metrics: self.metrics.read().await.status(now, self.bands),
            registry: self.registry.read().await.status(now, self.bands),
            audit: self.audit.read().await.status(now, self.bands),
            ingestion: self.ingest.read().await.status(now, self.bands),
        }
    }
}
