//! `physio-worker`: batch movement-analysis runner.
//!
//! Reads job files from `PHYSIO_JOBS_DIR`, analyzes them, and writes one
//! record per job into `PHYSIO_OUTPUT_DIR`. See [`WorkerConfig::from_env`]
//! for every variable. Ctrl-C or SIGTERM cancels in-flight runs, which are
//! recorded as failed.

use std::sync::Arc;

use physio_events::EventBus;
use physio_pipeline::{AnalysisOrchestrator, InMemoryAnalysisStore};
use physio_worker::{job, run_jobs, WorkerConfig};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "physio_worker=debug,physio_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        std::process::exit(1);
    });
    tracing::info!(
        jobs_dir = %config.jobs_dir.display(),
        output_dir = %config.output_dir.display(),
        max_concurrent_runs = config.max_concurrent_runs,
        "Starting physio-worker",
    );

    let profiles = config.load_profiles().await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to load exercise profiles");
        std::process::exit(1);
    });

    let jobs = job::load_jobs(&config.jobs_dir).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to read job directory");
        std::process::exit(1);
    });
    if jobs.is_empty() {
        tracing::info!("No jobs found, nothing to do");
        return;
    }

    let event_bus = Arc::new(EventBus::default());
    let event_log = tokio::spawn(log_events(event_bus.subscribe()));

    let orchestrator = AnalysisOrchestrator::new(
        Arc::new(InMemoryAnalysisStore::new()),
        Arc::new(profiles),
        Arc::clone(&event_bus),
        config.progress,
    );

    let batch = run_jobs(
        Arc::clone(&orchestrator),
        jobs,
        &config.output_dir,
        config.max_concurrent_runs,
    );
    tokio::pin!(batch);

    let summary = tokio::select! {
        summary = &mut batch => summary,
        () = shutdown_signal() => {
            orchestrator.cancel_all();
            batch.await
        }
    };

    // Dropping the last sender closes the channel and ends the logger.
    drop(orchestrator);
    drop(event_bus);
    let _ = event_log.await;

    if summary.failed > 0 || summary.write_errors > 0 {
        std::process::exit(2);
    }
}

/// Log every lifecycle event until the bus closes.
async fn log_events(mut rx: tokio::sync::broadcast::Receiver<physio_events::AnalysisEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => tracing::info!(
                event = %event.kind,
                analysis_id = %event.analysis_id,
                video_id = %event.video_id,
                user_id = %event.user_id,
                payload = %event.payload,
                "Analysis event",
            ),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event logger lagged behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Wait for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), cancelling in-flight analyses");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, cancelling in-flight analyses");
        }
    }
}
