//! Test fixtures for scanning and merging tests
//!
//! Generates short tagged audio files with ffmpeg. Tests that need real
//! audio call `ffmpeg()` first and return early when no ffmpeg is installed.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

static FFMPEG: OnceLock<Option<PathBuf>> = OnceLock::new();

/// A working ffmpeg binary, or None when unavailable
pub fn ffmpeg() -> Option<&'static Path> {
    FFMPEG
        .get_or_init(|| {
            let path = crate::conversion::verify_ffmpeg(None).ok()?;
            let works = Command::new(&path)
                .arg("-version")
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false);
            if !works {
                eprintln!("ffmpeg at {} does not run; skipping", path.display());
                return None;
            }
            Some(path)
        })
        .as_deref()
}

/// Tags for a generated fixture
#[derive(Debug, Clone, Default)]
pub struct FixtureTags<'a> {
    pub title: Option<&'a str>,
    pub artist: Option<&'a str>,
    pub album: Option<&'a str>,
    pub track: Option<u32>,
}

/// Generate a 440 Hz sine file in `dir`
///
/// The format follows the extension of `file_name` (mp3, flac or opus).
pub fn generate_audio_file(
    ffmpeg: &Path,
    dir: &Path,
    file_name: &str,
    duration_secs: u32,
    tags: &FixtureTags,
) -> PathBuf {
    let output_path = dir.join(file_name);

    let mut cmd = Command::new(ffmpeg);
    cmd.arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-f")
        .arg("lavfi")
        .arg("-i")
        .arg(format!("sine=frequency=440:duration={}", duration_secs))
        .arg("-y");

    match Path::new(file_name).extension().and_then(|e| e.to_str()) {
        Some("mp3") => {
            cmd.arg("-codec:a").arg("libmp3lame").arg("-b:a").arg("128k");
            cmd.arg("-id3v2_version").arg("4");
        }
        Some("flac") => {
            cmd.arg("-codec:a").arg("flac");
        }
        Some("opus") => {
            cmd.arg("-codec:a").arg("libopus");
        }
        other => panic!("Unsupported fixture format: {:?}", other),
    }

    for (key, value) in [
        ("title", tags.title.map(str::to_string)),
        ("artist", tags.artist.map(str::to_string)),
        ("album", tags.album.map(str::to_string)),
        ("track", tags.track.map(|n| n.to_string())),
    ] {
        if let Some(value) = value {
            cmd.arg("-metadata").arg(format!("{}={}", key, value));
        }
    }

    cmd.arg(&output_path);

    let output = cmd.output().expect("Failed to execute ffmpeg");
    if !output.status.success() {
        panic!(
            "ffmpeg failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    output_path
}

/// Create an album folder of `durations.len()` MP3 tracks, written in reverse order
pub fn create_test_album(ffmpeg: &Path, dir: &Path, album: &str, durations: &[u32]) -> PathBuf {
    let album_dir = dir.join(album);
    std::fs::create_dir_all(&album_dir).expect("Failed to create album directory");

    for (idx, seconds) in durations.iter().enumerate().rev() {
        let number = idx as u32 + 1;
        let title = format!("Track{}", number);
        generate_audio_file(
            ffmpeg,
            &album_dir,
            &format!("{:02} - {}.mp3", number, title),
            *seconds,
            &FixtureTags {
                title: Some(&title),
                artist: Some("Fixture Band"),
                album: Some(album),
                track: Some(number),
            },
        );
    }

    album_dir
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{read_chapters, read_track_tags, AudioFormat};
    use crate::conversion::{run_job, FfmpegEncoder, MergeEvent, MergeOptions};
    use crate::core::{build_groups, scan_folder, GroupingMode, JobState, MergeJob, ScanOptions};
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_generate_mp3_with_tags() {
        let Some(ffmpeg) = ffmpeg() else { return };
        let temp_dir = TempDir::new().unwrap();
        let path = generate_audio_file(
            ffmpeg,
            temp_dir.path(),
            "tagged.mp3",
            1,
            &FixtureTags {
                title: Some("Hello"),
                album: Some("Fixtures"),
                track: Some(4),
                ..Default::default()
            },
        );

        let tags = read_track_tags(&path).unwrap();
        assert_eq!(tags.title.as_deref(), Some("Hello"));
        assert_eq!(tags.album.as_deref(), Some("Fixtures"));
        assert_eq!(tags.track_number, Some(4));
        assert!(tags.duration.unwrap_or(0.0) > 0.5);
    }

    #[test]
    fn test_scan_and_group_real_album() {
        let Some(ffmpeg) = ffmpeg() else { return };
        let temp_dir = TempDir::new().unwrap();
        create_test_album(ffmpeg, temp_dir.path(), "Live", &[2, 1, 1]);

        let report = scan_folder(temp_dir.path(), &ScanOptions::default()).unwrap();
        assert_eq!(report.tracks.len(), 3);

        let groups = build_groups(&report.tracks, GroupingMode::ByAlbumTag);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "Live");
        let numbers: Vec<Option<u32>> = groups[0]
            .tracks()
            .iter()
            .map(|t| t.track.track_number)
            .collect();
        assert_eq!(numbers, vec![Some(1), Some(2), Some(3)]);
    }

    #[tokio::test]
    async fn test_merge_real_album_with_chapters() {
        let Some(ffmpeg) = ffmpeg() else { return };
        let temp_dir = TempDir::new().unwrap();
        let album_dir = create_test_album(ffmpeg, temp_dir.path(), "Merge Me", &[2, 1, 2]);

        let report = scan_folder(temp_dir.path(), &ScanOptions::default()).unwrap();
        let groups = build_groups(&report.tracks, GroupingMode::ByAlbumTag);
        let mut job = MergeJob::from_group(&groups[0]).unwrap();
        job.transition(JobState::TagReview).unwrap();

        let encoder = FfmpegEncoder::new(ffmpeg.to_path_buf());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let options = MergeOptions {
            bitrate_kbps: Some(128),
            ..Default::default()
        };
        let result = run_job(&mut job, &encoder, &options, &tx, &CancellationToken::new()).await;

        assert_eq!(result.state, JobState::Done, "{:?}", result.state);
        let output = album_dir.join("Fixture Band-Merge Me_merged.mp3");
        assert_eq!(result.output_path.as_deref(), Some(output.as_path()));

        let chapters = read_chapters(&output).unwrap();
        assert_eq!(chapters.len(), 3);
        let titles: Vec<&str> = chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Track1", "Track2", "Track3"]);
        assert_eq!(chapters[0].start_ms, 0);
        for pair in chapters.windows(2) {
            assert_eq!(pair[0].end_ms, pair[1].start_ms);
        }
        let expected: u64 = job.tracks().iter().map(|t| t.duration_ms()).sum();
        let end = chapters[2].end_ms as i64;
        assert!((end - expected as i64).abs() <= 250, "end {} vs {}", end, expected);

        let tags = read_track_tags(&output).unwrap();
        assert_eq!(tags.artist.as_deref(), Some("Fixture Band"));
        assert_eq!(tags.album.as_deref(), Some("Merge Me"));

        let mut progressed = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, MergeEvent::Progress { .. }) {
                progressed = true;
            }
        }
        assert!(progressed);
    }

    #[tokio::test]
    async fn test_merge_to_flac_with_comment_chapters() {
        let Some(ffmpeg) = ffmpeg() else { return };
        let temp_dir = TempDir::new().unwrap();
        let album_dir = create_test_album(ffmpeg, temp_dir.path(), "Lossless", &[1, 2, 1]);

        let report = scan_folder(temp_dir.path(), &ScanOptions::default()).unwrap();
        let groups = build_groups(&report.tracks, GroupingMode::ByAlbumTag);
        let mut job = MergeJob::from_group(&groups[0])
            .unwrap()
            .with_format(AudioFormat::Flac);

        let encoder = FfmpegEncoder::new(ffmpeg.to_path_buf());
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = run_job(&mut job, &encoder, &MergeOptions::default(), &tx, &CancellationToken::new()).await;

        assert_eq!(result.state, JobState::Done, "{:?}", result.state);
        let output = album_dir.join("Fixture Band-Lossless_merged.flac");
        assert!(output.exists());

        let chapters = read_chapters(&output).unwrap();
        let titles: Vec<&str> = chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Track1", "Track2", "Track3"]);
        assert_eq!(chapters[0].start_ms, 0);
        for pair in chapters.windows(2) {
            assert_eq!(pair[0].end_ms, pair[1].start_ms);
        }
        let expected: u64 = job.tracks().iter().map(|t| t.duration_ms()).sum();
        let end = chapters[2].end_ms as i64;
        assert!((end - expected as i64).abs() <= 250, "end {} vs {}", end, expected);

        let tags = read_track_tags(&output).unwrap();
        assert_eq!(tags.album.as_deref(), Some("Lossless"));
    }

    #[tokio::test]
    async fn test_mixed_formats_are_reencoded() {
        let Some(ffmpeg) = ffmpeg() else { return };
        let temp_dir = TempDir::new().unwrap();
        let album = FixtureTags {
            album: Some("Mixed"),
            ..Default::default()
        };
        generate_audio_file(ffmpeg, temp_dir.path(), "01.mp3", 1, &album);
        generate_audio_file(ffmpeg, temp_dir.path(), "02.flac", 1, &album);

        let report = scan_folder(temp_dir.path(), &ScanOptions::default()).unwrap();
        let groups = build_groups(&report.tracks, GroupingMode::ByFolder);
        let mut job = MergeJob::from_group(&groups[0]).unwrap();

        let encoder = FfmpegEncoder::new(ffmpeg.to_path_buf());
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = run_job(&mut job, &encoder, &MergeOptions::default(), &tx, &CancellationToken::new()).await;

        assert!(result.succeeded(), "{:?}", result.state);
        assert_eq!(read_chapters(&job.output_path()).unwrap().len(), 2);
    }
}
