use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::api::{ApiClient, ModelsQuery};
use crate::config::Settings;
use crate::console::{
    AuditLog, Dashboard, DriftMonitor, FreshnessBands, IngestMonitor, JobCenter, MetricsTrend,
    RegistryPanel, SCAN_HISTORY_LIMIT,
};
use crate::errors::Result;
use crate::poll::PollScheduler;
use crate::prefs::PrefStore;
use crate::stream::{HttpEventSource, StreamSignal, StreamSupervisor};

/// Number of audit rows fetched per poll
const AUDIT_FETCH_LIMIT: u32 = 100;

/// Runner for the status console
pub struct ConsoleRunner {
    settings: Settings,
}

impl ConsoleRunner {
    /// Create a new runner from a configuration file
    pub fn new(config_path: impl AsRef<Path>) -> Result<Self> {
        let settings = Settings::new(&config_path.as_ref().to_string_lossy())?;
        Ok(Self { settings })
    }

    pub fn from_settings(settings: Settings) -> Self {
        Self { settings }
    }

    /// Run the console until ctrl-c
    pub async fn run(self) -> Result<()> {
        // 1. Setup logging
        if std::env::var("RUST_LOG").is_err() {
            std::env::set_var("RUST_LOG", &self.settings.log.level);
        }
        env_logger::try_init().ok();

        let settings = self.settings;
        info!("Starting botwatch console for {}", settings.backend.base_url);

        // 2. Shared context: client, preference store, freshness bands
        let client = Arc::new(ApiClient::new(
            &settings.backend.base_url,
            Duration::from_secs(settings.backend.request_timeout_secs),
        )?);
        let prefs = Arc::new(PrefStore::open(&settings.prefs.path));
        let bands = FreshnessBands::from(settings.staleness);

        // 3. Views
        let drift = Arc::new(RwLock::new(DriftMonitor::new(
            client.clone(),
            prefs.clone(),
            &settings.drift,
        )));
        let jobs = Arc::new(RwLock::new(JobCenter::new(client.clone(), prefs.clone())));
        let metrics = Arc::new(RwLock::new(MetricsTrend::new(
            client.clone(),
            prefs.clone(),
            settings.poll.metrics_secs,
        )));
        let registry = Arc::new(RwLock::new(RegistryPanel::new(
            client.clone(),
            ModelsQuery::default(),
        )));
        let audit = Arc::new(RwLock::new(AuditLog::new(client.clone(), AUDIT_FETCH_LIMIT)));
        let ingest = Arc::new(RwLock::new(IngestMonitor::new(
            client.clone(),
            settings.ingestion.gauges.clone(),
        )));

        // 4. Seed the drift sparkline from the server's scan history
        match client.drift_history(SCAN_HISTORY_LIMIT as u32).await {
            Ok(history) => drift.write().await.load_history(history.items),
            Err(e) => warn!("Drift history seed failed: {}", e),
        }

        // 5. Run stream: supervisor + one consumer task feeding the job center
        let mut supervisor_holder: Option<Arc<Mutex<StreamSupervisor<HttpEventSource>>>> = None;
        let mut stream_consumer: Option<JoinHandle<()>> = None;
        if settings.stream.enabled {
            let source = client.run_stream_source(&settings.stream);
            let (mut supervisor, mut signals) = StreamSupervisor::new(
                source,
                Duration::from_secs(settings.stream.heartbeat_secs),
            );
            supervisor.reconnect();
            supervisor_holder = Some(Arc::new(Mutex::new(supervisor)));

            let jobs_for_stream = jobs.clone();
            stream_consumer = Some(tokio::spawn(async move {
                while let Some(signal) = signals.recv().await {
                    match signal {
                        StreamSignal::Event(event) => {
                            jobs_for_stream
                                .write()
                                .await
                                .apply_stream_event(&event, Utc::now());
                        }
                        StreamSignal::Disconnected { reason } => {
                            jobs_for_stream.write().await.on_stream_disconnected(&reason);
                        }
                    }
                }
            }));
        }

        // 6. One poller per view
        let metrics_interval = metrics.read().await.interval_secs();
        let mut pollers = Vec::new();

        {
            let view = drift.clone();
            pollers.push(PollScheduler::start(
                "drift",
                Duration::from_secs(settings.poll.drift_secs),
                move || {
                    let view = view.clone();
                    async move {
                        view.write().await.tick(Utc::now()).await;
                    }
                },
            ));
        }

        {
            let view = jobs.clone();
            let supervisor = supervisor_holder.clone();
            pollers.push(PollScheduler::start(
                "jobs",
                Duration::from_secs(settings.poll.runs_secs),
                move || {
                    let view = view.clone();
                    let supervisor = supervisor.clone();
                    async move {
                        view.write().await.refresh(Utc::now()).await;
                        if let Some(supervisor) = supervisor {
                            // Re-arm the stream after an observed disconnect;
                            // the supervisor debounces tight loops itself
                            if view.read().await.stream_wants_reconnect() {
                                let mut guard =
                                    supervisor.lock().unwrap_or_else(|e| e.into_inner());
                                guard.reconnect();
                            }
                        }
                    }
                },
            ));
        }

        {
            let view = metrics.clone();
            pollers.push(PollScheduler::start(
                "metrics",
                Duration::from_secs(metrics_interval),
                move || {
                    let view = view.clone();
                    async move {
                        view.write().await.tick(Utc::now()).await;
                    }
                },
            ));
        }

        {
            let view = registry.clone();
            pollers.push(PollScheduler::start(
                "registry",
                Duration::from_secs(settings.poll.registry_secs),
                move || {
                    let view = view.clone();
                    async move {
                        view.write().await.refresh(Utc::now()).await;
                    }
                },
            ));
        }

        {
            let view = audit.clone();
            pollers.push(PollScheduler::start(
                "audit",
                Duration::from_secs(settings.poll.audit_secs),
                move || {
                    let view = view.clone();
                    async move {
                        view.write().await.refresh(Utc::now()).await;
                    }
                },
            ));
        }

        {
            let view = ingest.clone();
            pollers.push(PollScheduler::start(
                "ingestion",
                Duration::from_secs(settings.poll.ingestion_secs),
                move || {
                    let view = view.clone();
                    async move {
                        view.write().await.refresh(Utc::now()).await;
                    }
                },
            ));
        }

        // 7. Status server over the dashboard
        let dashboard = Arc::new(Dashboard::new(
            drift, jobs, metrics, registry, audit, ingest, bands,
        ));
        let mut server_task: Option<JoinHandle<()>> = None;
        if settings.server.enabled {
            let dash = dashboard.clone();
            let host = settings.server.host.clone();
            let port = settings.server.port;
            server_task = Some(tokio::spawn(async move {
                if let Err(e) = crate::server::start_server(dash, host, port).await {
                    warn!("Status server exited: {}", e);
                }
            }));
        }

        info!("Console running; ctrl-c to stop");
        tokio::signal::ctrl_c().await?;
        info!("Shutting down...");

        // 8. Teardown: stop every poller, close the stream, kill the server
        for mut poller in pollers {
            poller.stop().await;
        }
        if let Some(supervisor) = supervisor_holder {
            supervisor
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .close();
        }
        if let Some(task) = stream_consumer {
            task.abort();
        }
        if let Some(task) = server_task {
            task.abort();
        }

        info!("Console stopped");
        Ok(())
    }
}
