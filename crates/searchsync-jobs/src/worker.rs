//! Queue worker: resumes persisted jobs one step per poll.
//!
//! Each step restores the job from its [`JobState`], runs `setup` and one
//! `process`, then writes the new state back. A failing step leaves the
//! stored state untouched, so the retry replays the same step. Steps are
//! retried up to `max_attempts` times unless the error is final.

use std::sync::Arc;
use std::time::{Duration, Instant};

use searchsync_indexing::SyncContext;
use searchsync_types::Settings;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::JobError;
use crate::job::{restore_job, Job};
use crate::queue::{JobQueue, QueueStatus};
use crate::registry::{JobRegistry, JobResult};
use crate::state::{JobState, StepReport};

/// Worker polling and retry settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between polls when the queue is idle
    pub poll_interval: Duration,
    /// Attempts per step before the job is marked failed
    pub max_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            max_attempts: 3,
        }
    }
}

impl WorkerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            poll_interval: Duration::from_millis(settings.worker_poll_interval_ms),
            max_attempts: settings.job_max_attempts.max(1),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }
}

/// What one worker step did.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerStep {
    Progressed { job_id: String, report: StepReport },
    Completed { job_id: String, report: StepReport },
    Retrying { job_id: String, attempts: u32, error: String },
    Failed { job_id: String, error: String },
}

impl WorkerStep {
    pub fn job_id(&self) -> &str {
        match self {
            WorkerStep::Progressed { job_id, .. }
            | WorkerStep::Completed { job_id, .. }
            | WorkerStep::Retrying { job_id, .. }
            | WorkerStep::Failed { job_id, .. } => job_id,
        }
    }
}

pub struct QueueWorker {
    ctx: Arc<SyncContext>,
    queue: Arc<dyn JobQueue>,
    registry: Arc<JobRegistry>,
    config: WorkerConfig,
}

impl QueueWorker {
    pub fn new(ctx: Arc<SyncContext>, queue: Arc<dyn JobQueue>) -> Self {
        let config = WorkerConfig::from_settings(ctx.settings());
        Self {
            ctx,
            queue,
            registry: Arc::new(JobRegistry::new()),
            config,
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_registry(mut self, registry: Arc<JobRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    fn step(&self, state: &JobState) -> Result<(Box<dyn Job>, StepReport), JobError> {
        let mut job = restore_job(self.ctx.clone(), state)?;
        self.registry
            .register(job.id(), &job.title(), state.payload.kind());
        self.registry.record_start(job.id());
        job.setup()?;
        let report = job.process()?;
        Ok((job, report))
    }

    /// Run one step of the oldest queued job. `None` when the queue is idle.
    pub fn run_once(&self) -> Result<Option<WorkerStep>, JobError> {
        let Some(mut queued) = self.queue.next_ready()? else {
            return Ok(None);
        };
        let job_id = queued.id().to_string();
        let started = Instant::now();
        let outcome = self.step(&queued.state);
        let duration_ms = started.elapsed().as_millis() as u64;

        let step = match outcome {
            Ok((job, report)) => {
                queued.state = job.state();
                queued.attempts = 0;
                queued.last_error = None;
                self.registry.record_step(
                    &job_id,
                    job.current_step(),
                    job.total_steps(),
                    JobResult::Success,
                    duration_ms,
                );
                info!(job = %job_id, "{}", report);
                if job.is_complete() {
                    queued.status = QueueStatus::Completed;
                    self.registry.record_complete(&job_id);
                    info!(job = %job_id, steps = job.current_step(), "Job complete");
                    WorkerStep::Completed { job_id, report }
                } else {
                    WorkerStep::Progressed { job_id, report }
                }
            }
            Err(e) => {
                let kind = queued.state.payload.kind();
                self.registry.register(&job_id, kind, kind);
                queued.attempts += 1;
                queued.last_error = Some(e.to_string());
                let header = &queued.state.header;
                let (current, total) = (header.current_step, header.total_steps);

                if e.is_retryable() && queued.attempts < self.config.max_attempts {
                    warn!(
                        job = %job_id,
                        attempt = queued.attempts,
                        max_attempts = self.config.max_attempts,
                        error = %e,
                        "Job step failed, will retry"
                    );
                    self.registry.record_step(
                        &job_id,
                        current,
                        total,
                        JobResult::Retrying(e.to_string()),
                        duration_ms,
                    );
                    WorkerStep::Retrying {
                        job_id,
                        attempts: queued.attempts,
                        error: e.to_string(),
                    }
                } else {
                    error!(job = %job_id, attempts = queued.attempts, error = %e, "Job failed");
                    queued.status = QueueStatus::Failed;
                    self.registry.record_step(
                        &job_id,
                        current,
                        total,
                        JobResult::Failed(e.to_string()),
                        duration_ms,
                    );
                    WorkerStep::Failed {
                        job_id,
                        error: e.to_string(),
                    }
                }
            }
        };

        self.queue.update(queued)?;
        Ok(Some(step))
    }

    /// Step until no job is queued.
    pub fn run_until_idle(&self) -> Result<Vec<WorkerStep>, JobError> {
        let mut steps = Vec::new();
        while let Some(step) = self.run_once()? {
            steps.push(step);
        }
        Ok(steps)
    }

    /// Poll the queue until `shutdown` is cancelled.
    ///
    /// Steps run on the blocking pool; a step in progress always finishes
    /// before the loop observes the cancellation.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<(), JobError> {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            max_attempts = self.config.max_attempts,
            "Queue worker started"
        );
        while !shutdown.is_cancelled() {
            let worker = self.clone();
            let step = tokio::task::spawn_blocking(move || worker.run_once())
                .await
                .map_err(|e| JobError::Queue(format!("worker task failed: {}", e)))??;

            if step.is_none() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }
        info!("Queue worker stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{ClearIndexJob, IndexJob, ReindexJob};
    use crate::queue::MemoryJobQueue;
    use crate::testing::fixture;
    use searchsync_types::IndexMethod;

    fn worker(f: &crate::testing::Fixture, queue: Arc<MemoryJobQueue>) -> QueueWorker {
        QueueWorker::new(f.ctx.clone(), queue)
            .with_config(WorkerConfig::default().with_poll_interval(Duration::from_millis(10)))
    }

    #[test]
    fn test_config_from_settings() {
        let settings = Settings {
            worker_poll_interval_ms: 250,
            job_max_attempts: 5,
            ..Settings::default()
        };
        let config = WorkerConfig::from_settings(&settings);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.max_attempts, 5);
    }

    #[test]
    fn test_runs_queued_job_step_by_step() {
        let f = fixture();
        let queue = Arc::new(MemoryJobQueue::new());
        let job = IndexJob::new(f.ctx.clone(), f.pages(20), IndexMethod::Add).unwrap();
        let id = queue.enqueue(job.state()).unwrap();

        let worker = worker(&f, queue.clone());
        let first = worker.run_once().unwrap().unwrap();
        assert!(matches!(first, WorkerStep::Progressed { .. }));
        let stored = queue.get(&id).unwrap().unwrap();
        assert_eq!(stored.state.header.current_step, 1);

        let steps = worker.run_until_idle().unwrap();
        assert_eq!(steps.len(), 3);
        assert!(matches!(steps.last(), Some(WorkerStep::Completed { .. })));
        assert_eq!(queue.get(&id).unwrap().unwrap().status, QueueStatus::Completed);
        assert_eq!(f.indexed(), 20);

        let status = worker.registry().get_status(&id).unwrap();
        assert!(status.is_complete);
        assert_eq!(status.current_step, 4);
    }

    #[test]
    fn test_retries_failed_step() {
        let f = fixture();
        let queue = Arc::new(MemoryJobQueue::new());
        let job = IndexJob::new(f.ctx.clone(), f.pages(4), IndexMethod::Add).unwrap();
        let id = queue.enqueue(job.state()).unwrap();
        f.backend.fail_next(1);

        let worker = worker(&f, queue.clone());
        let steps = worker.run_until_idle().unwrap();
        assert!(matches!(steps[0], WorkerStep::Retrying { attempts: 1, .. }));
        assert!(matches!(steps[1], WorkerStep::Completed { .. }));

        let stored = queue.get(&id).unwrap().unwrap();
        assert_eq!(stored.attempts, 0);
        assert!(stored.last_error.is_none());
        assert_eq!(f.indexed(), 4);
    }

    #[test]
    fn test_fails_after_max_attempts() {
        let f = fixture();
        let queue = Arc::new(MemoryJobQueue::new());
        let job = IndexJob::new(f.ctx.clone(), f.pages(4), IndexMethod::Add).unwrap();
        let id = queue.enqueue(job.state()).unwrap();
        f.backend.fail_next(10);

        let worker = worker(&f, queue.clone());
        let steps = worker.run_until_idle().unwrap();
        assert_eq!(steps.len(), 3);
        assert!(matches!(steps[2], WorkerStep::Failed { .. }));

        let stored = queue.get(&id).unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::Failed);
        assert_eq!(stored.attempts, 3);
        assert_eq!(stored.state.header.current_step, 0);
        assert!(worker.registry().get_status(&id).unwrap().is_failed());
    }

    #[test]
    fn test_final_errors_are_not_retried() {
        let f = fixture();
        let queue = Arc::new(MemoryJobQueue::new());
        let job = ReindexJob::new(f.ctx.clone()).with_classes(vec!["Nope".into()]);
        let id = queue.enqueue(job.state()).unwrap();

        let steps = worker(&f, queue.clone()).run_until_idle().unwrap();
        assert_eq!(steps.len(), 1);
        assert!(matches!(&steps[0], WorkerStep::Failed { error, .. } if error.contains("Nope")));
        assert_eq!(queue.get(&id).unwrap().unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn test_run_until_cancelled() {
        let f = fixture();
        let queue = Arc::new(MemoryJobQueue::new());
        let mut add = IndexJob::new(f.ctx.clone(), f.pages(12), IndexMethod::Add).unwrap();
        crate::runner::SyncRunner::new().run(&mut add).unwrap();
        let id = queue
            .enqueue(ClearIndexJob::new(f.ctx.clone(), "main").state())
            .unwrap();

        let worker = Arc::new(worker(&f, queue.clone()));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker.clone().run(shutdown.clone()));

        for _ in 0..200 {
            if queue.get(&id).unwrap().unwrap().status == QueueStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(queue.get(&id).unwrap().unwrap().status, QueueStatus::Completed);
        assert_eq!(f.indexed(), 0);
    }
}
