//! Trigger contract for the periodic delivery job.
//!
//! The host platform's job facility owns when the worker actually runs;
//! this crate only asks for a job to exist (idempotently) or to go away.
//! `TokioDeliveryScheduler` is the in-process adapter used by the service
//! binary and by tests.

use crate::worker::BeaconSenderWorker;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(thiserror::Error, Debug)]
pub enum SchedulerError {
    #[error("scheduler unavailable: {0}")]
    Unavailable(String),
}

/// Parameters for one periodic delivery job.
#[derive(Debug, Clone, Copy)]
pub struct JobConfig {
    pub period: Duration,
}

#[async_trait]
pub trait DeliveryScheduler: Send + Sync {
    /// Ensure a delivery job is pending. Does not duplicate an existing job
    /// unless `force` is set, in which case the job is replaced.
    async fn schedule_if_needed(&self, force: bool) -> Result<(), SchedulerError>;

    /// Unconditionally (re)schedule the job with the given parameters.
    async fn schedule(&self, config: JobConfig) -> Result<(), SchedulerError>;

    /// Tear down any pending job and stop an in-flight run.
    async fn cancel_all(&self) -> Result<(), SchedulerError>;
}

/// Scheduler that discards every trigger. Wired in when delivery is
/// disabled or immediate and no background job must ever exist.
pub struct NoopScheduler;

#[async_trait]
impl DeliveryScheduler for NoopScheduler {
    async fn schedule_if_needed(&self, _force: bool) -> Result<(), SchedulerError> {
        Ok(())
    }

    async fn schedule(&self, _config: JobConfig) -> Result<(), SchedulerError> {
        Ok(())
    }

    async fn cancel_all(&self) -> Result<(), SchedulerError> {
        Ok(())
    }
}

/// In-process stand-in for the platform job scheduler: a spawned interval
/// task that invokes the worker every period. Run failures are logged, not
/// propagated; the job keeps its cadence either way.
pub struct TokioDeliveryScheduler {
    worker: Arc<BeaconSenderWorker>,
    default_config: JobConfig,
    job: Mutex<Option<JoinHandle<()>>>,
}

impl TokioDeliveryScheduler {
    pub fn new(worker: Arc<BeaconSenderWorker>, default_config: JobConfig) -> Self {
        TokioDeliveryScheduler {
            worker,
            default_config,
            job: Mutex::new(None),
        }
    }

    fn spawn_job(&self, config: JobConfig) -> JoinHandle<()> {
        let worker = Arc::clone(&self.worker);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match worker.run_once().await {
                    Ok(report) if report.attempted > 0 => {
                        tracing::info!(
                            attempted = report.attempted,
                            delivered = report.delivered,
                            failed = report.failed,
                            "debug report delivery run finished"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(error = %err, "debug report delivery run failed");
                    }
                }
            }
        })
    }
}

#[async_trait]
impl DeliveryScheduler for TokioDeliveryScheduler {
    async fn schedule_if_needed(&self, force: bool) -> Result<(), SchedulerError> {
        let mut job = self.job.lock().await;
        if let Some(handle) = job.as_ref() {
            if !handle.is_finished() && !force {
                return Ok(());
            }
            handle.abort();
        }
        *job = Some(self.spawn_job(self.default_config));
        Ok(())
    }

    async fn schedule(&self, config: JobConfig) -> Result<(), SchedulerError> {
        let mut job = self.job.lock().await;
        if let Some(handle) = job.take() {
            handle.abort();
        }
        *job = Some(self.spawn_job(config));
        Ok(())
    }

    async fn cancel_all(&self) -> Result<(), SchedulerError> {
        if let Some(handle) = self.job.lock().await.take() {
            handle.abort();
        }
        self.worker.stop_work();
        Ok(())
    }
}
