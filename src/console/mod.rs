//! Console views: one aggregator per admin panel
//!
//! Every view follows the same pattern: it owns its state, a poll callback
//! is the only writer, and the status server reads serializable snapshots
//! through the [`Dashboard`] container. A failed poll leaves the previous
//! state in place and records a user-facing error string.

mod audit;
mod dashboard;
mod drift;
mod ingest;
mod jobs;
mod metrics;
mod registry;

pub use audit::{AuditFilter, AuditLog, AuditStatus};
pub use dashboard::{ConsoleStatus, Dashboard};
pub use drift::{DriftMonitor, DriftPrefs, DriftRow, DriftStatus, ScanPoint, SCAN_HISTORY_LIMIT};
pub use ingest::{IngestMonitor, IngestStatus};
pub use jobs::{JobCenter, JobsStatus, RunView, StreamHealth};
pub use metrics::{MetricSnapshot, MetricsStatus, MetricsTrend, SNAPSHOT_HISTORY_LIMIT};
pub use registry::{ActionOutcome, RegistryPanel, RegistryStatus};

use chrono::Duration;

use crate::config::StalenessConfig;

/// Freshness bands shared by every view's classifier
#[derive(Debug, Clone, Copy)]
pub struct FreshnessBands {
    pub fresh: Duration,
    pub stale: Duration,
}

impl From<StalenessConfig> for FreshnessBands {
    fn from(cfg: StalenessConfig) -> Self {
        Self {
            fresh: Duration::seconds(cfg.fresh_secs as i64),
            stale: Duration::seconds(cfg.stale_secs as i64),
        }
    }
}
