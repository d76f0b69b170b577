//! Server-sent-event subscription with heartbeat supervision
//!
//! The backend pushes backfill run updates on `/stream/runs` as a
//! `text/event-stream`. [`SseDecoder`] turns raw bytes into frames,
//! [`StreamSupervisor`] watches a connection for heartbeat silence and hands
//! the owning view a single `Disconnected` signal per lost connection.

mod reconnect;
mod sse;

pub use reconnect::{EventSource, HttpEventSource, StreamSignal, StreamSupervisor};
pub use sse::{SseDecoder, SseEvent, SseFrame};
