use std::future::Future;

use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AppError;
use crate::job::{ExportJob, JobOutcome, WorkerConfig};
use crate::job_queue::JobQueue;

/// Executes one claimed job and reports how the queue should settle it.
pub trait JobHandler: Send + Sync {
    fn execute(
        &self,
        job: &ExportJob,
    ) -> impl Future<Output = Result<JobOutcome, AppError>> + Send;
}

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: &'a str,
    },
    Polling,
    JobClaimed {
        job: &'a ExportJob,
    },
    JobCompleted {
        job_id: Uuid,
    },
    JobRescheduled {
        job_id: Uuid,
        run_at: DateTime<Utc>,
    },
    JobFailed {
        job_id: Uuid,
        error: &'a str,
        will_retry: bool,
    },
    ShuttingDown {
        worker_id: &'a str,
        jobs_released: u64,
    },
    Stopped {
        worker_id: &'a str,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::info!(%worker_id, "Worker started");
            }
            WorkerEvent::Polling => {
                tracing::debug!("Polling for jobs");
            }
            WorkerEvent::JobClaimed { job } => {
                tracing::info!(
                    job_id = %job.id,
                    hook = %job.hook,
                    args = ?job.args,
                    "Job claimed"
                );
            }
            WorkerEvent::JobCompleted { job_id } => {
                tracing::info!(%job_id, "Job completed");
            }
            WorkerEvent::JobRescheduled { job_id, run_at } => {
                tracing::info!(%job_id, %run_at, "Job rescheduled");
            }
            WorkerEvent::JobFailed {
                job_id,
                error,
                will_retry,
            } => {
                tracing::warn!(%job_id, %error, %will_retry, "Job failed");
            }
            WorkerEvent::ShuttingDown {
                worker_id,
                jobs_released,
            } => {
                tracing::info!(%worker_id, %jobs_released, "Worker shutting down");
            }
            WorkerEvent::Stopped { worker_id } => {
                tracing::info!(%worker_id, "Worker stopped");
            }
        }
    }
}

/// Worker that polls the job queue and runs sync and export jobs.
pub struct WorkerService<Q, H>
where
    Q: JobQueue,
    H: JobHandler,
{
    queue: Q,
    handler: H,
    config: WorkerConfig,
}

impl<Q, H> WorkerService<Q, H>
where
    Q: JobQueue,
    H: JobHandler,
{
    pub fn new(queue: Q, handler: H, config: WorkerConfig) -> Self {
        Self {
            queue,
            handler,
            config,
        }
    }

    /// Run the worker loop until cancellation.
    pub async fn run<WR: WorkerReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &WR,
    ) -> Result<(), AppError> {
        reporter.report(WorkerEvent::Started {
            worker_id: &self.config.worker_id,
        });

        loop {
            if cancel_token.is_cancelled() {
                break;
            }

            reporter.report(WorkerEvent::Polling);

            match self.queue.claim_job(&self.config.worker_id).await {
                Ok(Some(job)) => {
                    reporter.report(WorkerEvent::JobClaimed { job: &job });
                    self.process_job(&job, reporter).await;
                }
                Ok(None) => {
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim job");
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval * 2) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
            }
        }

        // Graceful shutdown: release all claimed jobs
        let released = self
            .queue
            .release_worker_jobs(&self.config.worker_id)
            .await
            .unwrap_or(0);

        reporter.report(WorkerEvent::ShuttingDown {
            worker_id: &self.config.worker_id,
            jobs_released: released,
        });
        reporter.report(WorkerEvent::Stopped {
            worker_id: &self.config.worker_id,
        });

        Ok(())
    }

    async fn process_job<WR: WorkerReporter>(&self, job: &ExportJob, reporter: &WR) {
        match self.handler.execute(job).await {
            Ok(JobOutcome::Continue) => {
                reporter.report(WorkerEvent::JobCompleted { job_id: job.id });
                if let Err(e) = self.queue.complete_job(job.id).await {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to mark job completed");
                }
            }
            Ok(JobOutcome::RetryAfter(delay)) => {
                let run_at = Utc::now() + TimeDelta::from_std(delay).unwrap_or(TimeDelta::zero());
                reporter.report(WorkerEvent::JobRescheduled {
                    job_id: job.id,
                    run_at,
                });
                if let Err(e) = self.queue.reschedule_job(job.id, run_at).await {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to reschedule job");
                }
            }
            Ok(JobOutcome::Fatal(reason)) => {
                reporter.report(WorkerEvent::JobFailed {
                    job_id: job.id,
                    error: &reason,
                    will_retry: false,
                });
                if let Err(e) = self.queue.fail_job(job.id, &reason, None).await {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to mark job as failed");
                }
            }
            Err(e) => {
                let error_msg = e.to_string();
                let can_retry = job.can_retry() && e.is_retryable();
                reporter.report(WorkerEvent::JobFailed {
                    job_id: job.id,
                    error: &error_msg,
                    will_retry: can_retry,
                });

                let next_retry = if can_retry {
                    Some(job.calculate_next_retry(&self.config.retry_config))
                } else {
                    None
                };

                if let Err(e) = self.queue.fail_job(job.id, &error_msg, next_retry).await {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to mark job as failed");
                }
            }
        }
    }
}
