//! Heartbeat-supervised event-stream subscription

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use log::{debug, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use super::sse::{SseDecoder, SseEvent, SseFrame};
use crate::errors::{Error, Result};

/// What the owning view receives from the supervised stream
#[derive(Debug)]
pub enum StreamSignal {
    /// A dispatched server-sent event
    Event(SseEvent),
    /// The connection was lost (heartbeat silence, transport error, or end
    /// of stream). Sent exactly once per connection.
    Disconnected { reason: String },
}

/// Transport seam: anything that can open a stream of SSE frames.
///
/// The HTTP implementation is [`HttpEventSource`]; tests drive the
/// supervisor with channel-backed fakes instead of sockets.
#[async_trait]
pub trait EventSource: Send + Sync + 'static {
    async fn connect(&self) -> Result<BoxStream<'static, Result<SseFrame>>>;
}

/// `EventSource` over a reqwest byte stream
pub struct HttpEventSource {
    client: reqwest::Client,
    url: String,
    query: Vec<(String, String)>,
}

impl HttpEventSource {
    pub fn new(client: reqwest::Client, url: String, query: Vec<(String, String)>) -> Self {
        Self { client, url, query }
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn connect(&self) -> Result<BoxStream<'static, Result<SseFrame>>> {
        let response = self
            .client
            .get(&self.url)
            .query(&self.query)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(200);
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut decoder = SseDecoder::new();
        let frames = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => decoder
                    .feed(&bytes)
                    .into_iter()
                    .map(Ok)
                    .collect::<Vec<Result<SseFrame>>>(),
                Err(e) => vec![Err(Error::Transport(e))],
            })
            .flat_map(futures_util::stream::iter)
            .boxed();

        Ok(frames)
    }
}

/// Supervises one subscription at a time over an [`EventSource`].
///
/// A connection is considered lost when no frame at all (events and comment
/// heartbeats both count) arrives within the heartbeat timeout; the
/// supervisor then emits a single [`StreamSignal::Disconnected`] and the
/// connection task ends. Reconnection is the owner's call, debounced here
/// with a minimum backoff equal to the heartbeat timeout so a flapping
/// backend cannot induce a tight reconnect loop.
pub struct StreamSupervisor<S: EventSource> {
    source: Arc<S>,
    heartbeat: Duration,
    tx: mpsc::UnboundedSender<StreamSignal>,
    task: Option<JoinHandle<()>>,
    last_attempt: Option<Instant>,
    closed: bool,
}

impl<S: EventSource> StreamSupervisor<S> {
    /// Create the supervisor and the signal channel the owner consumes.
    pub fn new(source: S, heartbeat: Duration) -> (Self, mpsc::UnboundedReceiver<StreamSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                source: Arc::new(source),
                heartbeat,
                tx,
                task: None,
                last_attempt: None,
                closed: false,
            },
            rx,
        )
    }

    /// Open a new connection, replacing any existing one.
    ///
    /// Attempts inside the minimum backoff window since the previous attempt
    /// are suppressed. Returns whether a connection attempt was started.
    /// The first call is never suppressed, so this doubles as `connect`.
    pub fn reconnect(&mut self) -> bool {
        if self.closed {
            return false;
        }

        if let Some(last) = self.last_attempt {
            let elapsed = Instant::now().saturating_duration_since(last);
            if elapsed < self.heartbeat {
                debug!(
                    "reconnect suppressed, {:?} since last attempt (minimum {:?})",
                    elapsed, self.heartbeat
                );
                return false;
            }
        }

        self.spawn_connection();
        true
    }

    /// Tear down the subscription. Idempotent; cancels the connection task
    /// and its timers regardless of connection state, and permanently
    /// disables reconnection.
    pub fn close(&mut self) {
        self.closed = true;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn spawn_connection(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }

        self.last_attempt = Some(Instant::now());
        let conn_id = Uuid::new_v4();
        let source = self.source.clone();
        let tx = self.tx.clone();
        let heartbeat = self.heartbeat;

        self.task = Some(tokio::spawn(async move {
            debug!("stream connection {} opening", conn_id);
            let reason = run_connection(source, &tx, heartbeat).await;
            info!("stream connection {} lost: {}", conn_id, reason);
            let _ = tx.send(StreamSignal::Disconnected { reason });
        }));
    }
}

impl<S: EventSource> Drop for StreamSupervisor<S> {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_connection<S: EventSource>(
    source: Arc<S>,
    tx: &mpsc::UnboundedSender<StreamSignal>,
    heartbeat: Duration,
) -> String {
    let mut frames = match source.connect().await {
        Ok(frames) => frames,
        Err(e) => return format!("connect failed: {}", e),
    };

    loop {
        match tokio::time::timeout(heartbeat, frames.next()).await {
            Err(_) => return format!("no message within {:?}", heartbeat),
            Ok(None) => return "stream ended".to_string(),
            Ok(Some(Err(e))) => return format!("transport error: {}", e),
            Ok(Some(Ok(SseFrame::Comment))) => {
                // Heartbeat: resets the liveness window, nothing to surface
            }
            Ok(Some(Ok(SseFrame::Event(event)))) => {
                if tx.send(StreamSignal::Event(event)).is_err() {
                    return "receiver dropped".to_string();
                }
            }
        }
    }
}
