//! Polling primitives shared by every console view
//!
//! Each view owns one [`PollScheduler`] driving its refresh, classifies its
//! own last-update age with [`classify`], and (where it tracks long-running
//! jobs) feeds counters into a [`ThroughputEstimator`].

mod eta;
mod scheduler;
mod staleness;

pub use eta::{EtaEstimate, ThroughputEstimator};
pub use scheduler::PollScheduler;
pub use staleness::{classify, Freshness};
