//! Typed client for the ops backend
//!
//! Every endpoint the console depends on is wrapped here with a defensive
//! wire model: nullable numerics stay `Option`, unknown enum strings map to
//! an `Unknown` variant, and shape variations the backend is known to emit
//! (bare array vs. `{items, total}`) are absorbed at this layer.

mod client;
pub mod metrics;
mod types;

pub use client::ApiClient;
pub use types::*;
