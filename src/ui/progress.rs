//! Terminal rendering of merge progress

use std::collections::HashMap;
use std::io::{self, Write};

use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use crate::conversion::{JobReport, MergeEvent};
use crate::core::JobState;

/// Progress is printed each time a job crosses one of these steps
const PROGRESS_STEP: u32 = 10;

/// Turns merge events into terminal lines
#[derive(Debug, Default)]
pub struct ProgressRenderer {
    names: HashMap<Uuid, String>,
    last_step: HashMap<Uuid, u32>,
}

impl ProgressRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn name(&self, job_id: &Uuid) -> &str {
        self.names.get(job_id).map(String::as_str).unwrap_or("?")
    }

    /// Write the line(s) for one event, if it warrants any
    pub fn handle<W: Write>(&mut self, event: &MergeEvent, out: &mut W) -> io::Result<()> {
        match event {
            MergeEvent::JobStarted {
                job_id,
                group,
                tracks,
            } => {
                self.names.insert(*job_id, group.clone());
                writeln!(out, "[{}] merging {} tracks", group, tracks)?;
            }
            MergeEvent::Progress { job_id, percent } => {
                let step = (percent.clamp(0.0, 100.0) as u32 / PROGRESS_STEP) * PROGRESS_STEP;
                let last = self.last_step.entry(*job_id).or_insert(0);
                if step > *last {
                    *last = step;
                    writeln!(out, "[{}] {}%", self.name(job_id), step)?;
                }
            }
            MergeEvent::StateChanged { job_id, state } => {
                if *state == JobState::ChapterWriting {
                    writeln!(out, "[{}] writing tags and chapters", self.name(job_id))?;
                }
            }
            MergeEvent::JobFinished(report) => {
                writeln!(out, "[{}] {}", report.group, report.state)?;
                self.names.remove(&report.job_id);
                self.last_step.remove(&report.job_id);
            }
        }
        out.flush()
    }
}

/// Render events until every sender is dropped
pub async fn render_events<W: Write>(mut rx: UnboundedReceiver<MergeEvent>, mut out: W) {
    let mut renderer = ProgressRenderer::new();
    while let Some(event) = rx.recv().await {
        if let Err(e) = renderer.handle(&event, &mut out) {
            log::debug!("Failed to render progress: {}", e);
        }
    }
}

/// Write the end-of-batch summary
pub fn render_summary<W: Write>(reports: &[JobReport], out: &mut W) -> io::Result<()> {
    writeln!(out, "\nSummary:")?;
    for report in reports {
        match &report.output_path {
            Some(path) => writeln!(
                out,
                "  {}: {} ({} chapters) -> {}",
                report.group,
                report.state,
                report.chapters,
                path.display()
            )?,
            None => writeln!(out, "  {}: {}", report.group, report.state)?,
        }
    }
    let succeeded = reports.iter().filter(|r| r.succeeded()).count();
    writeln!(out, "{} of {} merges completed.", succeeded, reports.len())
}
