//! Background reconciliation service.
//!
//! [`ReconciliationService`] owns the store handle, the client factory, the
//! clock and the timing settings. `start` spawns one worker thread running a
//! current-thread tokio runtime; `stop` cancels it and waits for a bounded
//! grace period.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use serde_json::Value;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::db::{Database, JobRow};
use crate::error::{ConfigError, Result};
use crate::remote::JobClient;

pub mod clock;
pub mod reconciler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use reconciler::{CycleReport, Reconciler};

/// Builds the remote client when the worker starts.
pub type ClientFactory =
    Box<dyn FnOnce() -> std::result::Result<Arc<dyn JobClient>, ConfigError> + Send>;

struct Worker {
    handle: JoinHandle<()>,
    done: Receiver<()>,
}

pub struct ReconciliationService {
    reconciler: Arc<Reconciler>,
    interval: Duration,
    grace: Duration,
    factory: Mutex<Option<ClientFactory>>,
    started: AtomicBool,
    cancel: CancellationToken,
    worker: Mutex<Option<Worker>>,
}

impl ReconciliationService {
    pub fn new(
        db: Database,
        settings: &Settings,
        clock: Arc<dyn Clock>,
        factory: ClientFactory,
    ) -> Self {
        Self {
            reconciler: Arc::new(Reconciler::new(db, settings, clock)),
            interval: settings.poll_interval(),
            grace: settings.shutdown_grace(),
            factory: Mutex::new(Some(factory)),
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Whether the worker thread has exited, e.g. because the client could
    /// not be built.
    pub fn is_finished(&self) -> bool {
        self.worker
            .lock()
            .map(|w| w.as_ref().map_or(true, |w| w.handle.is_finished()))
            .unwrap_or(true)
    }

    /// Spawns the worker. Returns `false` if it was already started.
    pub fn start(&self) -> bool {
        if self.started.swap(true, Ordering::AcqRel) {
            log::debug!("Reconciliation service already started");
            return false;
        }

        let factory = self.factory.lock().ok().and_then(|mut f| f.take());
        let Some(factory) = factory else {
            log::error!("Reconciliation service has no client factory");
            return false;
        };

        let reconciler = Arc::clone(&self.reconciler);
        let cancel = self.cancel.clone();
        let interval = self.interval;
        let (done_tx, done_rx) = bounded::<()>(1);

        let handle = std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("Failed to build reconciliation runtime: {}", e);
                    return;
                }
            };

            rt.block_on(run_worker(reconciler, factory, interval, cancel));
            let _ = done_tx.send(());
        });

        if let Ok(mut worker) = self.worker.lock() {
            *worker = Some(Worker {
                handle,
                done: done_rx,
            });
        }
        true
    }

    /// Cancels the worker and waits up to the grace period for it to
    /// finish. Returns `false` if it was still busy when the grace period
    /// ran out; the thread is then left to finish on its own.
    pub fn stop(&self) -> bool {
        self.cancel.cancel();

        let worker = self.worker.lock().ok().and_then(|mut w| w.take());
        let Some(worker) = worker else {
            return true;
        };

        match worker.done.recv_timeout(self.grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    log::error!("Reconciliation worker panicked");
                }
                log::info!("Reconciliation service stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Reconciliation worker still busy after {:?}, not waiting further",
                    self.grace
                );
                false
            }
        }
    }

    /// Dispatches a pending job through `client`.
    pub async fn dispatch_job(
        &self,
        job_id: &str,
        payload: &Value,
        client: &dyn JobClient,
    ) -> Result<JobRow> {
        self.reconciler.dispatch_job(job_id, payload, client).await
    }
}

impl Drop for ReconciliationService {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_worker(
    reconciler: Arc<Reconciler>,
    factory: ClientFactory,
    interval: Duration,
    cancel: CancellationToken,
) {
    let client = match factory() {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Remote client unavailable, reconciliation disabled");
            return;
        }
    };

    tracing::info!(
        interval_secs = interval.as_secs(),
        "Reconciliation worker started"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Reconciliation worker stopping");
                break;
            }
            _ = ticker.tick() => {
                match reconciler.run_cycle(client.as_ref()).await {
                    Ok(report) => tracing::debug!(
                        polled = report.polled,
                        swept = report.sweep.purged,
                        "Reconciliation cycle finished"
                    ),
                    Err(e) => tracing::error!(error = %e, "Reconciliation cycle failed, retrying next tick"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::remote::StatusResponse;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    struct CountingClient {
        polls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl JobClient for CountingClient {
        async fn submit(
            &self,
            _endpoint_id: &str,
            _payload: &Value,
        ) -> std::result::Result<String, RemoteError> {
            Ok("rp".to_string())
        }

        async fn status(
            &self,
            _endpoint_id: &str,
            _external_job_id: &str,
        ) -> std::result::Result<StatusResponse, RemoteError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(StatusResponse {
                status: "RUNNING".to_string(),
                ..Default::default()
            })
        }
    }

    fn service(temp_dir: &TempDir, factory: ClientFactory) -> ReconciliationService {
        let mut settings = Settings::with_storage_root(temp_dir.path().to_string_lossy());
        settings.poll_interval_seconds = 1;
        settings.shutdown_grace_seconds = 2;
        ReconciliationService::new(
            Database::open_in_memory().unwrap(),
            &settings,
            Arc::new(SystemClock),
            factory,
        )
    }

    #[test]
    fn test_start_is_idempotent_and_stop_joins() {
        let temp_dir = TempDir::new().unwrap();
        let polls = Arc::new(AtomicUsize::new(0));
        let client_polls = Arc::clone(&polls);
        let service = service(
            &temp_dir,
            Box::new(move || {
                Ok(Arc::new(CountingClient {
                    polls: client_polls,
                }) as Arc<dyn JobClient>)
            }),
        );

        let job = crate::db::NewJob {
            user_id: 1,
            title: "fold".to_string(),
            pipeline: "alphafold".to_string(),
            endpoint_id: Some("ep".to_string()),
            external_job_id: Some("rp-1".to_string()),
            ..Default::default()
        }
        .into_row(chrono::Utc::now(), chrono::Duration::days(7));
        crate::db::job_repo::insert(service.reconciler().db(), &job).unwrap();

        assert!(service.start());
        assert!(!service.start());
        assert!(service.is_started());

        // The first cycle runs right away.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while polls.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(polls.load(Ordering::SeqCst) >= 1);
        assert!(service.stop());
        assert!(service.is_finished());
    }

    #[test]
    fn test_missing_credentials_disable_worker() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(
            &temp_dir,
            Box::new(|| {
                Err(ConfigError::MissingCredentials(
                    crate::secrets::SecretError::NoSourceProvided,
                ))
            }),
        );

        assert!(service.start());
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !service.is_finished() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(service.is_finished());
        // A second start does not retry.
        assert!(!service.start());
        assert!(service.stop());
    }

    #[test]
    fn test_stop_without_start() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(
            &temp_dir,
            Box::new(|| Err(ConfigError::HttpClient("unused".to_string()))),
        );
        assert!(service.stop());
    }
}
