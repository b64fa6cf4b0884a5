use std::collections::hash_map::DefaultHasher;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::path::Path;

use lofty::{Accessor, AudioFile, Picture, PictureType, Tag, TaggedFileExt};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::TagReadError;

/// Tag fields read from one source file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackTags {
    pub album: Option<String>,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub track_number: Option<u32>,
    pub year: Option<String>,
    pub genre: Option<String>,
    /// Fingerprint of the embedded front cover, if any
    pub cover_hash: Option<u64>,
    /// Duration in seconds from the container's audio properties
    pub duration: Option<f64>,
}

fn non_empty(value: Option<std::borrow::Cow<'_, str>>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn front_cover(tag: &Tag) -> Option<&Picture> {
    tag.pictures()
        .iter()
        .find(|p| p.pic_type() == PictureType::CoverFront)
        .or_else(|| tag.pictures().first())
}

/// Fingerprint image bytes so identical covers can be counted
pub fn cover_hash(data: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    hasher.finish()
}

/// Read album/artist/title/track/year/genre/cover and duration from a file
pub fn read_track_tags(path: &Path) -> Result<TrackTags, TagReadError> {
    let tagged = lofty::read_from_path(path).map_err(|e| TagReadError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let duration = tagged.properties().duration().as_secs_f64();
    let mut tags = TrackTags {
        duration: (duration > 0.0).then_some(duration),
        ..TrackTags::default()
    };

    if let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) {
        tags.album = non_empty(tag.album());
        tags.artist = non_empty(tag.artist());
        tags.title = non_empty(tag.title());
        tags.genre = non_empty(tag.genre());
        tags.track_number = tag.track();
        tags.year = tag.year().filter(|y| *y > 0).map(|y| y.to_string());
        tags.cover_hash = front_cover(tag).map(|p| cover_hash(p.data()));
    }

    Ok(tags)
}

/// Load the embedded front cover image of a file
pub fn read_cover_art(path: &Path) -> Option<Vec<u8>> {
    let tagged = lofty::read_from_path(path).ok()?;
    let tag = tagged.primary_tag().or_else(|| tagged.first_tag())?;
    front_cover(tag).map(|p| p.data().to_vec())
}

/// Measure the playable duration of a file in seconds by probing its stream
///
/// Used to check a merged output against the durations summed at scan time.
pub fn measure_duration(path: &Path) -> Result<f64, String> {
    let file = File::open(path).map_err(|e| format!("Failed to open file: {}", e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension() {
        hint.with_extension(&ext.to_string_lossy());
    }

    let detected = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| format!("Failed to detect audio format: {}", e))?;

    let track = detected
        .format
        .default_track()
        .ok_or_else(|| "No default track found".to_string())?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| "Unknown sample rate".to_string())? as f64;
    let n_frames = track
        .codec_params
        .n_frames
        .ok_or_else(|| "Unknown frame count".to_string())?;

    Ok(n_frames as f64 / sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_cover_hash_is_stable() {
        assert_eq!(cover_hash(b"jpeg bytes"), cover_hash(b"jpeg bytes"));
        assert_ne!(cover_hash(b"jpeg bytes"), cover_hash(b"png bytes"));
    }

    #[test]
    fn test_read_tags_nonexistent_file() {
        let result = read_track_tags(Path::new("/nonexistent/file.mp3"));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("/nonexistent/file.mp3"));
    }

    #[test]
    fn test_read_tags_garbage_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("garbage.flac");
        fs::write(&path, b"this is not a flac stream").unwrap();
        assert!(read_track_tags(&path).is_err());
    }

    #[test]
    fn test_measure_duration_nonexistent_file() {
        assert!(measure_duration(Path::new("/nonexistent/file.mp3")).is_err());
    }

    #[test]
    fn test_read_cover_art_missing_file() {
        assert!(read_cover_art(Path::new("/nonexistent/file.mp3")).is_none());
    }

    #[test]
    fn test_non_empty_trims_and_filters() {
        assert_eq!(non_empty(Some("  Album ".into())), Some("Album".to_string()));
        assert_eq!(non_empty(Some("   ".into())), None);
        assert_eq!(non_empty(None), None);
    }
}
