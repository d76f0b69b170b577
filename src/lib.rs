#![deny(unreachable_pub)]
pub mod api;
pub mod config;
pub mod console;
pub mod poll;
pub mod prefs;
pub mod runner;
pub mod stream;
mod errors;
mod server;

pub use config::Settings;
pub use errors::{Error, Result};
pub use poll::{classify, EtaEstimate, Freshness, PollScheduler, ThroughputEstimator};
pub use prefs::PrefStore;
pub use runner::ConsoleRunner;
