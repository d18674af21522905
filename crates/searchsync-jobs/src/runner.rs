//! Synchronous, in-process job runner.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use searchsync_indexing::ChunkResult;
use tracing::{error, info};

use crate::error::JobError;
use crate::job::Job;
use crate::registry::{JobRegistry, JobResult};
use crate::state::StepReport;

/// Result of running a job to completion.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub job_id: String,
    pub title: String,
    /// Every step, in order
    pub steps: Vec<StepReport>,
    /// Indexer counts summed over all steps
    pub totals: ChunkResult,
    pub elapsed_ms: u64,
}

impl RunSummary {
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} steps, {} added, {} removed, {} skipped in {}ms",
            self.title,
            self.steps.len(),
            self.totals.added,
            self.totals.removed,
            self.totals.skipped,
            self.elapsed_ms
        )
    }
}

/// Runs a job inline: `setup` once, then `process` until complete.
///
/// The first failing step aborts the run; nothing is retried.
#[derive(Default, Clone)]
pub struct SyncRunner {
    registry: Option<Arc<JobRegistry>>,
}

impl SyncRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(mut self, registry: Arc<JobRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn run(&self, job: &mut dyn Job) -> Result<RunSummary, JobError> {
        let started = Instant::now();
        let mut summary = RunSummary {
            job_id: job.id().to_string(),
            title: job.title(),
            ..RunSummary::default()
        };
        let kind = job.state().payload.kind();
        if let Some(registry) = &self.registry {
            registry.register(job.id(), &summary.title, kind);
        }

        job.setup()?;
        info!(job = %summary.job_id, title = %summary.title, steps = job.total_steps(), "Running job");

        while !job.is_complete() {
            let step_started = Instant::now();
            if let Some(registry) = &self.registry {
                registry.record_start(job.id());
            }

            let outcome = job.process();
            let duration_ms = step_started.elapsed().as_millis() as u64;
            match outcome {
                Ok(report) => {
                    info!(job = %summary.job_id, "{}", report);
                    if let Some(registry) = &self.registry {
                        registry.record_step(
                            job.id(),
                            job.current_step(),
                            job.total_steps(),
                            JobResult::Success,
                            duration_ms,
                        );
                    }
                    summary.totals.merge(&report.counts);
                    summary.steps.push(report);
                }
                Err(e) => {
                    error!(job = %summary.job_id, error = %e, "Job step failed");
                    if let Some(registry) = &self.registry {
                        registry.record_step(
                            job.id(),
                            job.current_step(),
                            job.total_steps(),
                            JobResult::Failed(e.to_string()),
                            duration_ms,
                        );
                    }
                    return Err(e);
                }
            }
        }

        if let Some(registry) = &self.registry {
            registry.record_complete(job.id());
        }
        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(job = %summary.job_id, "{}", summary);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{ClearIndexJob, IndexJob};
    use crate::testing::fixture;
    use searchsync_types::IndexMethod;

    #[test]
    fn test_runs_to_completion() {
        let f = fixture();
        let registry = Arc::new(JobRegistry::new());
        let runner = SyncRunner::new().with_registry(registry.clone());

        let mut job = IndexJob::new(f.ctx.clone(), f.pages(20), IndexMethod::Add).unwrap();
        let summary = runner.run(&mut job).unwrap();
        assert_eq!(summary.step_count(), 4);
        assert_eq!(summary.totals.added, 20);
        assert!(summary.to_string().contains("4 steps, 20 added"));

        let status = registry.get_status(job.id()).unwrap();
        assert!(status.is_complete);
        assert_eq!(status.current_step, 4);
        assert_eq!(status.kind, "index");
    }

    #[test]
    fn test_clear_reports_convergence() {
        let f = fixture();
        let runner = SyncRunner::new();
        let mut add = IndexJob::new(f.ctx.clone(), f.pages(20), IndexMethod::Add).unwrap();
        runner.run(&mut add).unwrap();

        let mut clear = ClearIndexJob::new(f.ctx.clone(), "main");
        let summary = runner.run(&mut clear).unwrap();
        let remaining: Vec<u64> = summary
            .steps
            .iter()
            .filter_map(|s| s.clear.map(|c| c.after))
            .collect();
        assert_eq!(remaining, vec![14, 8, 2, 0]);
    }

    #[test]
    fn test_failure_aborts_run() {
        let f = fixture();
        let registry = Arc::new(JobRegistry::new());
        let runner = SyncRunner::new().with_registry(registry.clone());

        let mut job = IndexJob::new(f.ctx.clone(), f.pages(8), IndexMethod::Add).unwrap();
        f.backend.fail_next(1);
        assert!(runner.run(&mut job).is_err());
        assert!(registry.get_status(job.id()).unwrap().is_failed());
        assert_eq!(job.current_step(), 0);
    }
}
