mod config;

use clap::{Parser, Subcommand};
use config::Config;
use metrics_exporter_statsd::StatsdBuilder;
use reporting::config::ReportingConfig;
use reporting::scheduler::{DeliveryScheduler, JobConfig, SchedulerError, TokioDeliveryScheduler};
use reporting::store::{InMemoryBeaconStore, PendingBeaconStore};
use reporting::transport::{BeaconTransport, HttpBeaconTransport, TransportError};
use reporting::worker::{BeaconSenderWorker, WorkerError};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "beacond", about = "Auction debug-beacon delivery service")]
struct Cli {
    /// Path to the YAML config file.
    #[arg(long, default_value = "beacond.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the periodic delivery job until interrupted.
    Run,
    /// Perform a single delivery pass over the pending queue, then exit.
    Drain,
}

#[derive(thiserror::Error, Debug)]
enum ServiceError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing();
    let _sentry_guard = init_sentry(&config);
    init_metrics(&config);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(error = %err, "failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli.command, config.reporting)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "beacond exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: ReportingConfig) -> Result<(), ServiceError> {
    let transport: Arc<dyn BeaconTransport> = Arc::new(HttpBeaconTransport::new(&config.http)?);
    // Production deployments wire a relational store here; the embedded
    // queue covers single-process use.
    let store: Arc<dyn PendingBeaconStore> = Arc::new(InMemoryBeaconStore::new());
    let worker = Arc::new(BeaconSenderWorker::new(store, transport, &config.batch));

    match command {
        Command::Drain => {
            let report = worker.run_once().await?;
            tracing::info!(
                attempted = report.attempted,
                delivered = report.delivered,
                failed = report.failed,
                "drain finished"
            );
            Ok(())
        }
        Command::Run => {
            let scheduler = TokioDeliveryScheduler::new(
                worker,
                JobConfig {
                    period: config.batch.job_period(),
                },
            );
            scheduler.schedule_if_needed(false).await?;
            tracing::info!(period_secs = config.batch.job_period_secs, "delivery job scheduled");

            tokio::signal::ctrl_c().await?;
            tracing::info!("shutting down");
            scheduler.cancel_all().await?;
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn init_sentry(config: &Config) -> Option<sentry::ClientInitGuard> {
    let logging = config.logging.as_ref()?;
    Some(sentry::init((
        logging.sentry_dsn.clone(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

/// Metrics are optional; a missing or unreachable statsd sink downgrades to
/// no export rather than failing startup.
fn init_metrics(config: &Config) {
    let Some(metrics_config) = &config.metrics else {
        return;
    };
    let recorder = match StatsdBuilder::from(metrics_config.statsd_host.as_str(), metrics_config.statsd_port)
        .build(Some(metrics_config.prefix.as_str()))
    {
        Ok(recorder) => recorder,
        Err(err) => {
            tracing::warn!(error = %err, "failed to build statsd exporter, metrics disabled");
            return;
        }
    };
    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("metrics recorder was already installed");
    }
}
