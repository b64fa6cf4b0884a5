//! Merge events and job reports
//!
//! Jobs report progress over an unbounded channel so the renderer never
//! blocks a merge.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::Serialize;
use uuid::Uuid;

use crate::core::{JobState, MergeJob};

/// Final outcome of one merge job
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: Uuid,
    pub group: String,
    pub state: JobState,
    /// Set when a merged file exists at the final path
    pub output_path: Option<PathBuf>,
    pub tracks: usize,
    pub chapters: usize,
    /// Measured output length minus the chapter table length, when measured
    pub drift_ms: Option<i64>,
    pub completed_at: DateTime<Local>,
}

impl JobReport {
    pub fn from_job(job: &MergeJob, chapters: usize, drift_ms: Option<i64>) -> Self {
        let output_path = job
            .state()
            .produced_output()
            .then(|| job.output_path());
        Self {
            job_id: job.id,
            group: job.group_label.clone(),
            state: job.state().clone(),
            output_path,
            tracks: job.tracks().len(),
            chapters,
            drift_ms,
            completed_at: Local::now(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state.produced_output()
    }
}

/// Events emitted while a batch runs
#[derive(Debug, Clone)]
pub enum MergeEvent {
    /// A job left the queue and began merging
    JobStarted {
        job_id: Uuid,
        group: String,
        tracks: usize,
    },
    /// Encoder progress, 0-100
    Progress { job_id: Uuid, percent: f32 },
    /// A job moved to a new lifecycle state
    StateChanged { job_id: Uuid, state: JobState },
    JobFinished(JobReport),
}
