use std::path::PathBuf;
use std::sync::Arc;

use crate::detect::{DetectionResult, Detector};
use crate::error::Result;
use crate::source::{BatchOutcome, Orchestrator, StreamOutcome};

/// One unit of work for the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Image(PathBuf),
    Folder(PathBuf),
    Stream { url: String, max_frames: u32 },
}

#[derive(Debug)]
pub enum JobOutcome {
    Image(DetectionResult),
    Folder(BatchOutcome),
    Stream(StreamOutcome),
}

pub fn run_job<D: Detector>(orchestrator: &Orchestrator<D>, job: Job) -> Result<JobOutcome> {
    match job {
        Job::Image(path) => orchestrator.process_image(&path).map(JobOutcome::Image),
        Job::Folder(path) => orchestrator.process_folder(&path).map(JobOutcome::Folder),
        Job::Stream { url, max_frames } => orchestrator
            .process_stream(&url, max_frames)
            .map(JobOutcome::Stream),
    }
}

/// Runs `job` on the blocking pool so async callers never stall on inference.
pub fn spawn_job<D: Detector + 'static>(
    orchestrator: Arc<Orchestrator<D>>,
    job: Job,
) -> tokio::task::JoinHandle<Result<JobOutcome>> {
    tokio::task::spawn_blocking(move || {
        tracing::debug!(job = ?job, "job started");
        run_job(&orchestrator, job)
    })
}
