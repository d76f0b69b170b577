//! Fixed-interval poll scheduler

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Runs a unit of async work on a fixed interval.
///
/// The work is invoked immediately on [`start`](PollScheduler::start), then
/// once per interval. Ticks are strictly sequential: the work future is
/// awaited before the next timer is armed, so at most one invocation is in
/// flight and at most one timer is pending at any instant.
/// [`set_interval`](PollScheduler::set_interval) cancels the pending timer
/// and arms a fresh full interval without touching the running/stopped state.
///
/// The scheduler never treats a failing poll as a stop condition; the unit of
/// work is expected to swallow its own errors and leave prior state intact.
pub struct PollScheduler {
    name: String,
    interval_tx: watch::Sender<Duration>,
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl PollScheduler {
    /// Spawn the polling task and invoke `work` immediately.
    pub fn start<F, Fut>(name: &str, interval: Duration, mut work: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (interval_tx, mut interval_rx) = watch::channel(interval);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task_name = name.to_string();

        let handle = tokio::spawn(async move {
            debug!("poller '{}' started (every {:?})", task_name, interval);
            loop {
                work().await;

                let period = *interval_rx.borrow_and_update();
                let sleep = tokio::time::sleep(period);
                tokio::pin!(sleep);

                loop {
                    tokio::select! {
                        _ = &mut sleep => break,
                        changed = interval_rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            // Re-arm: cancel the pending timer, full fresh interval
                            let period = *interval_rx.borrow_and_update();
                            debug!("poller '{}' re-armed (every {:?})", task_name, period);
                            sleep.as_mut().reset(tokio::time::Instant::now() + period);
                        }
                        _ = shutdown_rx.changed() => {
                            debug!("poller '{}' stopped", task_name);
                            return;
                        }
                    }
                }
            }
        });

        Self {
            name: name.to_string(),
            interval_tx,
            shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Change the polling interval. The pending timer is cancelled and a
    /// fresh full interval is armed.
    pub fn set_interval(&self, interval: Duration) {
        let _ = self.interval_tx.send(interval);
    }

    /// Stop polling. Idempotent; once this returns, no further invocation of
    /// the unit of work can occur.
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("poller '{}' task failed: {}", self.name, e);
                }
            }
        }
    }

    /// Name the scheduler was started with (for logs)
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_scheduler(interval: Duration) -> (PollScheduler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let scheduler = PollScheduler::start("test", interval, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        (scheduler, count)
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_first_tick() {
        let (mut scheduler, count) = counting_scheduler(Duration::from_secs(30));

        // No time has to pass for the first invocation
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_invocation_per_interval() {
        let (mut scheduler, count) = counting_scheduler(Duration::from_secs(30));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Advancing by exactly one interval yields exactly one more tick
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_interval_rearms_without_double_fire() {
        let (mut scheduler, count) = counting_scheduler(Duration::from_secs(30));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Widen the interval; the pending 30s timer must be cancelled
        scheduler.set_interval(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_millis(1)).await;

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1, "old timer must not fire");

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2, "new timer fires once");

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shrinking_interval_takes_effect() {
        let (mut scheduler, count) = counting_scheduler(Duration::from_secs(300));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        scheduler.set_interval(Duration::from_secs(5));
        tokio::time::sleep(Duration::from_millis(1)).await;

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_callbacks_after_stop() {
        let (mut scheduler, count) = counting_scheduler(Duration::from_secs(10));

        tokio::time::sleep(Duration::from_millis(1)).await;
        scheduler.stop().await;
        let seen = count.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let (mut scheduler, _count) = counting_scheduler(Duration::from_secs(10));

        scheduler.stop().await;
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_poll_does_not_stop_the_lineage() {
        // The unit of work swallows its own failure; the scheduler keeps ticking
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let mut scheduler = PollScheduler::start("flaky", Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    // Simulated fetch failure: record nothing, keep prior state
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(1)).await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        scheduler.stop().await;
    }
}
