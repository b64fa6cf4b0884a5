//! Folder scanning and audio file discovery
//!
//! This module walks a directory tree, picks out supported audio files and
//! reads the tag data each `Track` needs for grouping, ordering and chapters.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::audio::{is_audio_file, measure_duration, read_track_tags, AudioFormat, TrackTags};
use crate::error::ScanError;

/// Marker at the end of the file stem of files produced by a merge
pub const MERGED_SUFFIX: &str = "_merged";

/// One source audio file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub path: PathBuf,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub track_number: Option<u32>,
    pub year: Option<String>,
    pub genre: Option<String>,
    /// Fingerprint of the embedded front cover
    #[serde(skip)]
    pub cover_hash: Option<u64>,
    /// Duration in seconds (0.0 when it could not be measured)
    pub duration: f64,
    pub size: u64,
    pub format: AudioFormat,
}

impl Track {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn file_stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Title tag if present and non-empty, otherwise the filename without extension
    pub fn display_title(&self) -> String {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.file_stem())
    }

    /// Duration rounded to whole milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.duration.is_finite() && self.duration > 0.0 {
            (self.duration * 1000.0).round() as u64
        } else {
            0
        }
    }

    pub fn parent_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    fn from_parts(path: &Path, size: u64, tags: TrackTags, duration: f64) -> Option<Self> {
        Some(Self {
            path: path.to_path_buf(),
            album: tags.album,
            artist: tags.artist,
            title: tags.title,
            track_number: tags.track_number,
            year: tags.year,
            genre: tags.genre,
            cover_hash: tags.cover_hash,
            duration,
            size,
            format: AudioFormat::from_path(path)?,
        })
    }
}

#[cfg(test)]
impl Track {
    /// Create a tagless MP3 track for testing
    pub fn new_for_test(path: &str) -> Self {
        Self {
            path: PathBuf::from(path),
            album: None,
            artist: None,
            title: None,
            track_number: None,
            year: None,
            genre: None,
            cover_hash: None,
            duration: 180.0,
            size: 4_000_000,
            format: AudioFormat::from_path(Path::new(path)).unwrap_or(AudioFormat::Mp3),
        }
    }
}

/// Which files a scan picks up
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub skip_hidden: bool,
    pub skip_merged_outputs: bool,
    pub follow_links: bool,
    pub max_depth: Option<usize>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            skip_hidden: true,
            skip_merged_outputs: true,
            follow_links: true,
            max_depth: None,
        }
    }
}

/// Result of scanning one folder
#[derive(Debug, Default)]
pub struct ScanReport {
    pub tracks: Vec<Track>,
    /// Entries that were skipped because they could not be read
    pub skipped: Vec<ScanError>,
    /// Number of files whose tags could not be read (kept with empty tags)
    pub tag_failures: usize,
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn is_merged_output(path: &Path) -> bool {
    is_audio_file(path)
        && path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|stem| stem.to_lowercase().ends_with(MERGED_SUFFIX))
            .unwrap_or(false)
}

/// Scan a folder recursively for supported audio files
///
/// Unreadable entries are recorded in `skipped` and the scan continues.
/// Tracks come back ordered by path.
pub fn scan_folder(path: &Path, options: &ScanOptions) -> Result<ScanReport, ScanError> {
    if !path.is_dir() {
        return Err(ScanError::NotADirectory(path.to_path_buf()));
    }

    let mut report = ScanReport::default();

    let mut walker = WalkDir::new(path).follow_links(options.follow_links);
    if let Some(depth) = options.max_depth {
        walker = walker.max_depth(depth);
    }

    for entry in walker
        .into_iter()
        .filter_entry(|e| !options.skip_hidden || e.depth() == 0 || !is_hidden(e.path()))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let failed_path = e.path().map(Path::to_path_buf).unwrap_or_default();
                log::warn!("Skipping unreadable entry {}: {}", failed_path.display(), e);
                report.skipped.push(ScanError::Unreadable {
                    path: failed_path,
                    source: e.into(),
                });
                continue;
            }
        };

        let file_path = entry.path();
        if !entry.file_type().is_file() && !file_path.is_file() {
            continue;
        }
        if !is_audio_file(file_path) {
            continue;
        }
        if options.skip_merged_outputs && is_merged_output(file_path) {
            log::debug!("Skipping previous merge output {}", file_path.display());
            continue;
        }

        match scan_audio_file(file_path) {
            Ok((track, tags_ok)) => {
                if !tags_ok {
                    report.tag_failures += 1;
                }
                report.tracks.push(track);
            }
            Err(e) => {
                log::warn!("{}", e);
                report.skipped.push(e);
            }
        }
    }

    report.tracks.sort_by(|a, b| a.path.cmp(&b.path));

    log::info!(
        "Scanned {}: {} tracks, {} skipped, {} with unreadable tags",
        path.display(),
        report.tracks.len(),
        report.skipped.len(),
        report.tag_failures
    );

    Ok(report)
}

/// Scan a single audio file
///
/// Returns the track and whether its tags could be read. Corrupt tags are not
/// an error: the fields are left empty and the duration is measured from the
/// stream instead.
pub fn scan_audio_file(path: &Path) -> Result<(Track, bool), ScanError> {
    let metadata = fs::metadata(path).map_err(|e| ScanError::Unreadable {
        path: path.to_path_buf(),
        source: e,
    })?;

    let (tags, tags_ok) = match read_track_tags(path) {
        Ok(tags) => (tags, true),
        Err(e) => {
            log::warn!("{}", e);
            (TrackTags::default(), false)
        }
    };

    let duration = match tags.duration {
        Some(d) => d,
        None => measure_duration(path).unwrap_or_else(|e| {
            log::warn!("Could not measure duration of {}: {}", path.display(), e);
            0.0
        }),
    };

    let track = Track::from_parts(path, metadata.len(), tags, duration).ok_or_else(|| {
        ScanError::Unreadable {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "unsupported audio extension",
            ),
        }
    })?;

    Ok((track, tags_ok))
}

/// Calculate the total duration of a list of tracks
pub fn total_duration(tracks: &[Track]) -> f64 {
    tracks.iter().map(|t| t.duration).sum()
}

/// Calculate the total size of a list of tracks
pub fn total_size(tracks: &[Track]) -> u64 {
    tracks.iter().map(|t| t.size).sum()
}

/// Format duration as "Xm Ys", or "Xh Ym Zs" past an hour
pub fn format_duration(seconds: f64) -> String {
    let total_secs = seconds.max(0.0).round() as u64;
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else {
        format!("{}m {}s", mins, secs)
    }
}

/// Format size in human-readable form (KB, MB, GB)
/// Uses decimal units (1 MB = 1,000,000 bytes)
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1000;
    const MB: u64 = KB * 1000;
    const GB: u64 = MB * 1000;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
