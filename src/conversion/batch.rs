//! Running several merge jobs with a bounded pool
//!
//! Jobs are driven concurrently on the calling task with `FuturesUnordered`;
//! a semaphore caps how many merge at once. A failed job never stops the
//! others. Once the cancel token trips, jobs that have not started are
//! reported cancelled and the running ones stop their encoders.

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::events::{JobReport, MergeEvent};
use super::ffmpeg::Encoder;
use super::runner::{cancel_job, run_job, MergeOptions};
use crate::core::MergeJob;

/// Upper bound on concurrent merges for this machine
///
/// 75% of the cores, clamped between 2 and 8.
pub fn max_worker_count() -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);

    ((available as f32 * 0.75).ceil() as usize).clamp(2, 8)
}

/// Run `jobs` with at most `max_parallel` merging at a time
///
/// Returns one report per job, in the order the jobs were given.
pub async fn run_batch<E: Encoder>(
    jobs: Vec<MergeJob>,
    encoder: &E,
    options: &MergeOptions,
    max_parallel: usize,
    events: UnboundedSender<MergeEvent>,
    cancel: &CancellationToken,
) -> Vec<JobReport> {
    let workers = max_parallel.clamp(1, max_worker_count());
    let semaphore = Semaphore::new(workers);

    log::info!(
        "Starting batch: {} jobs with {} worker(s)",
        jobs.len(),
        workers
    );

    let mut futures = FuturesUnordered::new();
    for (index, mut job) in jobs.into_iter().enumerate() {
        let semaphore = &semaphore;
        let events = events.clone();
        futures.push(async move {
            let permit = semaphore.acquire().await;
            let report = if permit.is_err() || cancel.is_cancelled() {
                log::info!("Skipping '{}': batch cancelled", job.group_label);
                cancel_job(&mut job, &events)
            } else {
                run_job(&mut job, encoder, options, &events, cancel).await
            };
            (index, report)
        });
    }

    let mut reports = Vec::with_capacity(futures.len());
    while let Some(result) = futures.next().await {
        reports.push(result);
    }
    reports.sort_by_key(|(index, _)| *index);

    let reports: Vec<JobReport> = reports.into_iter().map(|(_, report)| report).collect();
    let succeeded = reports.iter().filter(|r| r.succeeded()).count();
    log::info!(
        "Batch finished: {} of {} jobs produced output",
        succeeded,
        reports.len()
    );
    reports
}
