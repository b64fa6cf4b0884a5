//! Drives one merge job from tag review to its final state
//!
//! Merging: sources are checked, the destination is prepared and the encoder
//! writes a temporary file. Chapter writing: tags and chapters go into the
//! temporary file, which is then moved into place. Failures before the move
//! leave no file behind; tag or chapter failures keep the merged audio.

use std::io;
use std::path::PathBuf;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use super::events::{JobReport, MergeEvent};
use super::ffmpeg::{verify_sources, EncodeMode, EncodeRequest, Encoder};
use super::output_manager::{estimate_output_size, OutputManager};
use crate::audio::{
    build_chapters, measure_duration, read_cover_art, reconcile_with_measured,
    write_album_metadata, write_chapters, AudioFormat, WriteAlbumMetadata,
};
use crate::core::{AlbumTags, CoverSource, JobState, MergeJob, Settings, Track};
use crate::error::{ChapterWriteError, EncodeError, MergeError};

/// Encoding and chapter settings shared by every job in a batch
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOptions {
    pub bitrate_kbps: Option<u32>,
    pub default_bitrate_kbps: u32,
    pub opus_bitrate_kbps: u32,
    pub flac_compression_level: u8,
    pub chapter_tolerance_ms: u64,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for MergeOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            bitrate_kbps: settings.bitrate_kbps,
            default_bitrate_kbps: settings.default_bitrate_kbps,
            opus_bitrate_kbps: settings.opus_bitrate_kbps,
            flac_compression_level: settings.flac_compression_level,
            chapter_tolerance_ms: settings.chapter_tolerance_ms,
        }
    }
}

#[derive(Debug, Default)]
struct ChapterStats {
    chapters: usize,
    drift_ms: Option<i64>,
}

fn set_state(
    job: &mut MergeJob,
    state: JobState,
    events: &UnboundedSender<MergeEvent>,
) -> Result<(), MergeError> {
    job.transition(state.clone())?;
    let _ = events.send(MergeEvent::StateChanged {
        job_id: job.id,
        state,
    });
    Ok(())
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn resolve_cover(tags: &AlbumTags) -> Result<Option<Vec<u8>>, ChapterWriteError> {
    match &tags.cover {
        None => Ok(None),
        Some(CoverSource::Embedded(path)) => Ok(read_cover_art(path)),
        Some(CoverSource::File(path)) => std::fs::read(path)
            .map(Some)
            .map_err(|e| ChapterWriteError::Cover {
                path: path.clone(),
                message: e.to_string(),
            }),
    }
}

/// Everything the tag and chapter step needs, detached from the job
struct FinishRequest {
    path: PathBuf,
    tracks: Vec<Track>,
    tags: AlbumTags,
    format: AudioFormat,
    chapter_tolerance_ms: u64,
}

/// Write tags and chapters into the temporary output, collecting non-fatal failures
fn write_tags_and_chapters(request: &FinishRequest) -> (Vec<String>, ChapterStats) {
    let path = request.path.as_path();
    let mut warnings = Vec::new();
    let mut stats = ChapterStats::default();

    let mut chapters = build_chapters(&request.tracks);
    match measure_duration(path) {
        Ok(seconds) => {
            let measured_ms = (seconds * 1000.0).round() as u64;
            stats.drift_ms = Some(reconcile_with_measured(
                &mut chapters,
                measured_ms,
                request.chapter_tolerance_ms,
            ));
        }
        Err(e) => log::debug!("Could not measure {}: {}", path.display(), e),
    }
    stats.chapters = chapters.len();

    let tags = &request.tags;
    let cover = resolve_cover(tags).unwrap_or_else(|e| {
        log::warn!("{}", e);
        warnings.push(e.to_string());
        None
    });
    let metadata = WriteAlbumMetadata {
        artist: non_empty(&tags.artist),
        album: non_empty(&tags.album),
        year: non_empty(&tags.year),
        genre: non_empty(&tags.genre),
        cover,
        compilation: tags.compilation,
    };
    if let Err(e) = write_album_metadata(path, &metadata) {
        log::warn!("{}", e);
        warnings.push(e.to_string());
    }

    if let Err(e) = write_chapters(path, &chapters, request.format) {
        log::warn!("{}", e);
        warnings.push(e.to_string());
    }

    (warnings, stats)
}

async fn merge<E: Encoder>(
    job: &mut MergeJob,
    encoder: &E,
    options: &MergeOptions,
    events: &UnboundedSender<MergeEvent>,
    cancel: &CancellationToken,
    stats: &mut ChapterStats,
) -> Result<JobState, MergeError> {
    if *job.state() == JobState::Pending {
        set_state(job, JobState::TagReview, events)?;
    }
    if cancel.is_cancelled() {
        return Ok(JobState::Cancelled);
    }

    set_state(job, JobState::Merging, events)?;
    let _ = events.send(MergeEvent::JobStarted {
        job_id: job.id,
        group: job.group_label.clone(),
        tracks: job.tracks().len(),
    });

    let group = job.group_label.clone();
    let inputs: Vec<PathBuf> = job.tracks().iter().map(|t| t.path.clone()).collect();
    let sources = inputs.clone();
    tokio::task::spawn_blocking(move || verify_sources(&sources))
        .await
        .unwrap_or_else(|e| Err(EncodeError::Io(io::Error::other(e))))
        .map_err(|source| MergeError::Encode {
            group: group.clone(),
            source,
        })?;

    let mode = EncodeMode::choose(job.tracks(), job.format, options);
    let expected_duration = job.expected_duration();
    let estimate = estimate_output_size(mode, job.total_size(), expected_duration);
    let output =
        OutputManager::prepare(&job.output_path(), estimate).map_err(|source| {
            MergeError::OutputPath {
                group: group.clone(),
                source,
            }
        })?;

    log::info!(
        "Merging {} tracks of '{}' into {} ({:?})",
        inputs.len(),
        group,
        output.final_path().display(),
        mode
    );

    let request = EncodeRequest {
        inputs,
        output: output.temp_path().to_path_buf(),
        mode,
        expected_duration,
    };
    let job_id = job.id;
    let mut on_progress = |percent: f32| {
        let _ = events.send(MergeEvent::Progress { job_id, percent });
    };

    if let Err(source) = encoder.encode(&request, &mut on_progress, cancel).await {
        output.discard();
        return Err(MergeError::Encode { group, source });
    }

    set_state(job, JobState::ChapterWriting, events)?;
    let request = FinishRequest {
        path: output.temp_path().to_path_buf(),
        tracks: job.tracks().to_vec(),
        tags: job.tags.clone(),
        format: job.format,
        chapter_tolerance_ms: options.chapter_tolerance_ms,
    };
    let warnings = match tokio::task::spawn_blocking(move || write_tags_and_chapters(&request)).await {
        Ok((warnings, finished)) => {
            *stats = finished;
            warnings
        }
        Err(e) => {
            log::error!("Tag and chapter writing for '{}' aborted: {}", group, e);
            vec![format!("Tag and chapter writing aborted: {}", e)]
        }
    };

    if let Err(source) = output.finalize() {
        output.discard();
        return Err(MergeError::OutputPath { group, source });
    }

    Ok(if warnings.is_empty() {
        JobState::Done
    } else {
        JobState::DonePartialFailure(warnings.join("; "))
    })
}

/// Run one job to a terminal state and report the outcome
///
/// The job may be `Pending` (tags accepted as proposed) or `TagReview`.
/// Errors never escape: they end the job `Failed` and are carried in the report.
pub async fn run_job<E: Encoder>(
    job: &mut MergeJob,
    encoder: &E,
    options: &MergeOptions,
    events: &UnboundedSender<MergeEvent>,
    cancel: &CancellationToken,
) -> JobReport {
    let mut stats = ChapterStats::default();
    let final_state = match merge(job, encoder, options, events, cancel, &mut stats).await {
        Ok(state) => state,
        Err(MergeError::Encode {
            source: EncodeError::Cancelled,
            ..
        }) => JobState::Cancelled,
        Err(e) => {
            log::error!("{}", e);
            JobState::Failed(e.to_string())
        }
    };

    match &final_state {
        JobState::Done => log::info!("Merged '{}' -> {}", job.group_label, job.output_path().display()),
        JobState::DonePartialFailure(reason) => {
            log::warn!("Merged '{}' with warnings: {}", job.group_label, reason)
        }
        JobState::Cancelled => log::info!("Merge of '{}' cancelled", job.group_label),
        _ => {}
    }

    if let Err(e) = set_state(job, final_state, events) {
        log::error!("{}", e);
    }

    finish(job, stats, events)
}

/// End a job that was never started
pub fn cancel_job(job: &mut MergeJob, events: &UnboundedSender<MergeEvent>) -> JobReport {
    if let Err(e) = set_state(job, JobState::Cancelled, events) {
        log::error!("{}", e);
    }
    finish(job, ChapterStats::default(), events)
}

fn finish(
    job: &MergeJob,
    stats: ChapterStats,
    events: &UnboundedSender<MergeEvent>,
) -> JobReport {
    let report = JobReport::from_job(job, stats.chapters, stats.drift_ms);
    let _ = events.send(MergeEvent::JobFinished(report.clone()));
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::read_chapters;
    use crate::conversion::testing::{fake_mp3_bytes, Behaviour, FakeEncoder};
    use crate::core::{Group, TagEdit, TagEdits, Track};
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    /// A group of three real files in `dir`, numbered 2, 1, 3
    fn album(dir: &Path) -> Group {
        let mut group = Group::new("Test Album", "Test Album");
        for (name, number, seconds) in [("b.mp3", 2, 100.0), ("a.mp3", 1, 120.0), ("c.mp3", 3, 90.0)] {
            let path = dir.join(name);
            fs::write(&path, fake_mp3_bytes(1)).unwrap();
            let mut track = Track::new_for_test(&path.to_string_lossy());
            track.track_number = Some(number);
            track.duration = seconds;
            track.size = 1000;
            track.artist = Some("Tester".to_string());
            track.album = Some("Test Album".to_string());
            track.title = Some(format!("Track{}", number));
            group.add_track(track);
        }
        group.sort();
        group
    }

    fn partial_files(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.to_string_lossy().contains(".partial."))
            .collect()
    }

    #[tokio::test]
    async fn test_successful_merge() {
        let temp_dir = TempDir::new().unwrap();
        let mut job = MergeJob::from_group(&album(temp_dir.path())).unwrap();
        let encoder = FakeEncoder::new(Behaviour::Succeed);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let report = run_job(&mut job, &encoder, &MergeOptions::default(), &tx, &CancellationToken::new()).await;

        assert!(report.succeeded(), "state was {:?}", report.state);
        let final_path = temp_dir.path().join("Tester-Test Album_merged.mp3");
        assert_eq!(report.output_path, Some(final_path.clone()));
        assert!(final_path.exists());
        assert!(partial_files(temp_dir.path()).is_empty());

        // Encoder saw the tracks in merge order, stream copied
        let requests = encoder.requests.borrow();
        let names: Vec<String> = requests[0]
            .inputs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.mp3", "b.mp3", "c.mp3"]);
        assert_eq!(requests[0].mode, EncodeMode::StreamCopy);
        assert_eq!(requests[0].expected_duration, 310.0);

        let chapters = read_chapters(&final_path).unwrap();
        assert_eq!(chapters.len(), 3);
        assert_eq!(report.chapters, 3);
        assert_eq!(chapters[0].title, "Track1");
        assert_eq!((chapters[1].start_ms, chapters[1].end_ms), (120_000, 220_000));

        let mut saw_progress = false;
        let mut last_state = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                MergeEvent::Progress { .. } => saw_progress = true,
                MergeEvent::StateChanged { state, .. } => last_state = Some(state),
                _ => {}
            }
        }
        assert!(saw_progress);
        assert!(last_state.is_some_and(|s| s.produced_output()));
    }

    #[tokio::test]
    async fn test_bitrate_override_reencodes() {
        let temp_dir = TempDir::new().unwrap();
        let mut job = MergeJob::from_group(&album(temp_dir.path())).unwrap();
        let encoder = FakeEncoder::new(Behaviour::Succeed);
        let (tx, _rx) = mpsc::unbounded_channel();
        let options = MergeOptions {
            bitrate_kbps: Some(128),
            ..Default::default()
        };

        run_job(&mut job, &encoder, &options, &tx, &CancellationToken::new()).await;
        assert_eq!(
            encoder.requests.borrow()[0].mode,
            EncodeMode::Mp3 { bitrate_kbps: 128 }
        );
    }

    #[tokio::test]
    async fn test_flac_job_requests_flac_encode() {
        let temp_dir = TempDir::new().unwrap();
        let mut job = MergeJob::from_group(&album(temp_dir.path()))
            .unwrap()
            .with_format(AudioFormat::Flac);
        let encoder = FakeEncoder::new(Behaviour::Succeed);
        let (tx, _rx) = mpsc::unbounded_channel();
        let options = MergeOptions {
            flac_compression_level: 8,
            ..Default::default()
        };

        let report = run_job(&mut job, &encoder, &options, &tx, &CancellationToken::new()).await;

        let requests = encoder.requests.borrow();
        let request = &requests[0];
        assert_eq!(request.mode, EncodeMode::Flac { compression_level: 8 });
        assert!(request.output.to_string_lossy().ends_with(".partial.flac"));
        let final_path = temp_dir.path().join("Tester-Test Album_merged.flac");
        assert_eq!(report.output_path, Some(final_path.clone()));
        assert!(final_path.exists());
        assert!(partial_files(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_encoder_failure_leaves_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut job = MergeJob::from_group(&album(temp_dir.path())).unwrap();
        let encoder = FakeEncoder::new(Behaviour::Fail);
        let (tx, _rx) = mpsc::unbounded_channel();

        let report = run_job(&mut job, &encoder, &MergeOptions::default(), &tx, &CancellationToken::new()).await;

        match &report.state {
            JobState::Failed(reason) => {
                assert!(reason.contains("Test Album"));
                assert!(reason.contains("Invalid data"));
            }
            other => panic!("expected Failed, got {:?}", other),
        }
        assert!(report.output_path.is_none());
        assert!(!job.output_path().exists());
        assert!(partial_files(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_encode_leaves_no_output() {
        let temp_dir = TempDir::new().unwrap();
        let mut job = MergeJob::from_group(&album(temp_dir.path())).unwrap();
        let encoder = FakeEncoder::new(Behaviour::HangUntilCancelled);
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let options = MergeOptions::default();

        let trip = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        };
        let (report, _) = tokio::join!(
            run_job(&mut job, &encoder, &options, &tx, &cancel),
            trip
        );

        assert_eq!(report.state, JobState::Cancelled);
        assert!(!job.output_path().exists());
        assert!(partial_files(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_cancel_before_start_never_encodes() {
        let temp_dir = TempDir::new().unwrap();
        let mut job = MergeJob::from_group(&album(temp_dir.path())).unwrap();
        let encoder = FakeEncoder::new(Behaviour::Succeed);
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = run_job(&mut job, &encoder, &MergeOptions::default(), &tx, &cancel).await;
        assert_eq!(report.state, JobState::Cancelled);
        assert!(encoder.requests.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_source_fails_before_encoding() {
        let temp_dir = TempDir::new().unwrap();
        let group = album(temp_dir.path());
        fs::remove_file(temp_dir.path().join("b.mp3")).unwrap();
        let mut job = MergeJob::from_group(&group).unwrap();
        let encoder = FakeEncoder::new(Behaviour::Succeed);
        let (tx, _rx) = mpsc::unbounded_channel();

        let report = run_job(&mut job, &encoder, &MergeOptions::default(), &tx, &CancellationToken::new()).await;

        assert!(matches!(&report.state, JobState::Failed(reason) if reason.contains("b.mp3")));
        assert!(encoder.requests.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_missing_cover_file_is_partial_failure() {
        let temp_dir = TempDir::new().unwrap();
        let mut job = MergeJob::from_group(&album(temp_dir.path())).unwrap();
        job.transition(JobState::TagReview).unwrap();
        job.apply_edits(&TagEdits {
            album: TagEdit::Set("Renamed".to_string()),
            cover: crate::core::CoverEdit::File(temp_dir.path().join("missing.jpg")),
            ..Default::default()
        });
        let encoder = FakeEncoder::new(Behaviour::Succeed);
        let (tx, _rx) = mpsc::unbounded_channel();

        let report = run_job(&mut job, &encoder, &MergeOptions::default(), &tx, &CancellationToken::new()).await;

        assert!(matches!(&report.state, JobState::DonePartialFailure(reason) if reason.contains("missing.jpg")));
        let final_path = temp_dir.path().join("Tester-Renamed_merged.mp3");
        assert!(final_path.exists());
        assert_eq!(read_chapters(&final_path).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_cancel_job_reports_cancelled() {
        let temp_dir = TempDir::new().unwrap();
        let mut job = MergeJob::from_group(&album(temp_dir.path())).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let report = cancel_job(&mut job, &tx);
        assert_eq!(report.state, JobState::Cancelled);
        assert_eq!(report.chapters, 0);

        let mut finished = false;
        while let Ok(event) = rx.try_recv() {
            if let MergeEvent::JobFinished(r) = event {
                finished = r.state == JobState::Cancelled;
            }
        }
        assert!(finished);
    }
}
