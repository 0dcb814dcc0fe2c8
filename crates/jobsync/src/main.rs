use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use jobsync::storage::layout::ensure_directory;
use jobsync::telemetry::{self, LogFormat, DEFAULT_FILTER};
use jobsync::{
    load_settings, ClientFactory, Database, JobClient, ReconciliationService, RunpodClient,
    SystemClock,
};

const DEFAULT_SETTINGS_FILE: &str = "jobsync.json";

fn settings_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("JOBSYNC_SETTINGS").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE))
}

fn run() -> jobsync::Result<()> {
    let path = settings_path();
    let settings = load_settings(&path)?;
    log::info!("Loaded settings from {}", path.display());

    let layout = settings.layout();
    ensure_directory(layout.root())?;
    let db = Database::open(&settings.database_path())?;

    let remote = settings.remote.clone();
    let factory: ClientFactory = Box::new(move || {
        RunpodClient::new(&remote).map(|client| Arc::new(client) as Arc<dyn JobClient>)
    });
    let service = ReconciliationService::new(db, &settings, Arc::new(SystemClock), factory);

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })?;

    service.start();
    log::info!(
        "jobsync running: storage root {}, polling every {}s",
        layout.root().display(),
        settings.poll_interval_seconds
    );

    let _ = shutdown_rx.recv();
    log::info!("Shutdown requested");
    service.stop();
    Ok(())
}

fn main() -> ExitCode {
    let format = LogFormat::from_env_value(std::env::var("JOBSYNC_LOG_FORMAT").ok().as_deref());
    if let Err(e) = telemetry::init_logging(DEFAULT_FILTER, format) {
        eprintln!("jobsync: {}", e);
    }

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
