//! Chapter markers for merged files
//!
//! MP3 output gets one ID3v2 `CHAP` frame per source track, each with a `TIT2`
//! title sub-frame, plus a single top-level ordered `CTOC` listing every
//! chapter in merge order. FLAC and Opus output carry the same table as
//! `CHAPTERnnn` / `CHAPTERnnnNAME` Vorbis comments.
//!
//! Offsets are a running sum of track durations, so the tracks passed here must
//! be exactly the ordered set that was handed to the encoder.

use std::collections::BTreeMap;
use std::path::Path;

use id3::frame::{Chapter, TableOfContents};
use id3::{Content, Frame, Tag, TagLike, Version};
use lofty::{AudioFile, ItemKey, ItemValue, Probe, TagExt, TagItem, TaggedFileExt};
use serde::Serialize;

use super::metadata_writer::primary_tag_or_insert;
use super::AudioFormat;
use crate::core::Track;
use crate::error::{ChapterReadError, ChapterWriteError};

const TOC_ELEMENT_ID: &str = "toc";
const TOC_TITLE: &str = "Table of Contents";
/// "Byte offset not used" marker from the ID3v2 chapter addendum
const NO_BYTE_OFFSET: u32 = 0xFFFF_FFFF;

/// One entry of the chapter table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterEntry {
    pub element_id: String,
    pub title: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl ChapterEntry {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }
}

/// Build one chapter per track, contiguous from zero
///
/// Tracks with zero or unknown duration still get a (zero-length) chapter.
pub fn build_chapters(tracks: &[Track]) -> Vec<ChapterEntry> {
    let mut cursor = 0u64;
    tracks
        .iter()
        .enumerate()
        .map(|(idx, track)| {
            let start_ms = cursor;
            cursor += track.duration_ms();
            ChapterEntry {
                element_id: format!("chp{}", idx),
                title: track.display_title(),
                start_ms,
                end_ms: cursor,
            }
        })
        .collect()
}

/// Total length covered by a chapter table
pub fn total_duration_ms(chapters: &[ChapterEntry]) -> u64 {
    chapters.last().map(|c| c.end_ms).unwrap_or(0)
}

/// Align the table's final offset with the measured length of the merged file
///
/// When the difference is within `tolerance_ms` the last chapter is stretched
/// or trimmed to end exactly at `measured_ms`. A larger difference is logged
/// and the scanned offsets are kept, except that no chapter may start or end
/// past `measured_ms`. Returns the signed drift (measured minus computed).
pub fn reconcile_with_measured(
    chapters: &mut [ChapterEntry],
    measured_ms: u64,
    tolerance_ms: u64,
) -> i64 {
    let computed = total_duration_ms(chapters);
    let drift = measured_ms as i64 - computed as i64;

    let Some(last) = chapters.last_mut() else {
        return drift;
    };

    if drift.unsigned_abs() <= tolerance_ms {
        last.end_ms = measured_ms.max(last.start_ms);
        return drift;
    }

    log::warn!(
        "Merged output is {} ms but chapters cover {} ms (drift {} ms); keeping scanned offsets",
        measured_ms,
        computed,
        drift
    );
    if drift < 0 {
        for chapter in chapters.iter_mut() {
            chapter.start_ms = chapter.start_ms.min(measured_ms);
            chapter.end_ms = chapter.end_ms.min(measured_ms);
        }
    }
    drift
}

fn to_frame_time(ms: u64) -> u32 {
    u32::try_from(ms).unwrap_or(u32::MAX)
}

/// Replace the chapter table of a `format` file at `path`
pub fn write_chapters(
    path: &Path,
    chapters: &[ChapterEntry],
    format: AudioFormat,
) -> Result<(), ChapterWriteError> {
    if format.uses_id3() {
        write_id3_chapters(path, chapters)
    } else {
        write_comment_chapters(path, chapters)
    }
}

/// Read the chapter table of a merged file, ordered by start time
///
/// The storage is picked from the file extension; anything that is not FLAC or
/// Opus is read as ID3v2.
pub fn read_chapters(path: &Path) -> Result<Vec<ChapterEntry>, ChapterReadError> {
    match AudioFormat::from_path(path) {
        Some(format) if !format.uses_id3() => read_comment_chapters(path),
        _ => read_id3_chapters(path).map_err(|source| ChapterReadError::Id3 {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_id3_chapters(path: &Path, chapters: &[ChapterEntry]) -> Result<(), ChapterWriteError> {
    let chapter_error = |source| ChapterWriteError::Chapters {
        path: path.to_path_buf(),
        source,
    };

    let mut tag = match Tag::read_from_path(path) {
        Ok(tag) => tag,
        Err(e) if matches!(e.kind, id3::ErrorKind::NoTag) => Tag::new(),
        Err(e) => return Err(chapter_error(e)),
    };

    tag.remove("CHAP");
    tag.remove("CTOC");

    for chapter in chapters {
        tag.add_frame(Chapter {
            element_id: chapter.element_id.clone(),
            start_time: to_frame_time(chapter.start_ms),
            end_time: to_frame_time(chapter.end_ms),
            start_offset: NO_BYTE_OFFSET,
            end_offset: NO_BYTE_OFFSET,
            frames: vec![Frame::text("TIT2", chapter.title.clone())],
        });
    }

    tag.add_frame(TableOfContents {
        element_id: TOC_ELEMENT_ID.to_string(),
        top_level: true,
        ordered: true,
        elements: chapters.iter().map(|c| c.element_id.clone()).collect(),
        frames: vec![Frame::text("TIT2", TOC_TITLE)],
    });

    tag.write_to_path(path, Version::Id3v24)
        .map_err(chapter_error)?;

    log::debug!("Wrote {} chapters to {}", chapters.len(), path.display());
    Ok(())
}

fn read_id3_chapters(path: &Path) -> id3::Result<Vec<ChapterEntry>> {
    let tag = Tag::read_from_path(path)?;

    let mut chapters: Vec<ChapterEntry> = tag
        .chapters()
        .map(|chapter| {
            let title = chapter
                .frames
                .iter()
                .find(|f| f.id() == "TIT2")
                .and_then(|f| match f.content() {
                    Content::Text(text) => Some(text.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            ChapterEntry {
                element_id: chapter.element_id.clone(),
                title,
                start_ms: chapter.start_time as u64,
                end_ms: chapter.end_time as u64,
            }
        })
        .collect();

    chapters.sort_by_key(|c| (c.start_ms, c.end_ms));
    Ok(chapters)
}

/// `HH:MM:SS.mmm`
fn comment_timestamp(ms: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        ms / 3_600_000,
        (ms % 3_600_000) / 60_000,
        (ms % 60_000) / 1000,
        ms % 1000
    )
}

fn parse_comment_timestamp(value: &str) -> Option<u64> {
    let mut parts = value.trim().splitn(3, ':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let (seconds, fraction) = match parts.next()?.split_once('.') {
        Some((seconds, fraction)) => (seconds, fraction),
        None => (value.trim().rsplit(':').next()?, "0"),
    };
    let seconds: u64 = seconds.parse().ok()?;
    // Fractions are read as milliseconds: "5" is 500 ms, "123456" is 123 ms
    let millis: u64 = format!("{:0<3}", fraction).get(..3)?.parse().ok()?;
    Some(hours * 3_600_000 + minutes * 60_000 + seconds * 1000 + millis)
}

/// Chapter number and whether the key names a title, for `CHAPTERnnn[NAME]`
fn parse_chapter_key(key: &str) -> Option<(u32, bool)> {
    let upper = key.to_ascii_uppercase();
    let rest = upper.strip_prefix("CHAPTER")?;
    let (digits, is_name) = match rest.strip_suffix("NAME") {
        Some(digits) => (digits, true),
        None => (rest, false),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((digits.parse().ok()?, is_name))
}

fn write_comment_chapters(path: &Path, chapters: &[ChapterEntry]) -> Result<(), ChapterWriteError> {
    let comment_error = |message: String| ChapterWriteError::Comments {
        path: path.to_path_buf(),
        message,
    };

    let mut tagged_file = Probe::open(path)
        .map_err(|e| comment_error(format!("Failed to open file: {}", e)))?
        .read()
        .map_err(|e| comment_error(format!("Failed to read file: {}", e)))?;
    let tag = primary_tag_or_insert(&mut tagged_file)
        .ok_or_else(|| comment_error("Failed to create tag".to_string()))?;

    tag.retain(|item| !matches!(item.key(), ItemKey::Unknown(key) if parse_chapter_key(key).is_some()));

    for (idx, chapter) in chapters.iter().enumerate() {
        let key = format!("CHAPTER{:03}", idx + 1);
        tag.push_unchecked(TagItem::new(
            ItemKey::Unknown(key.clone()),
            ItemValue::Text(comment_timestamp(chapter.start_ms)),
        ));
        tag.push_unchecked(TagItem::new(
            ItemKey::Unknown(format!("{}NAME", key)),
            ItemValue::Text(chapter.title.clone()),
        ));
    }

    tag.save_to_path(path)
        .map_err(|e| comment_error(format!("Failed to save file: {}", e)))?;

    log::debug!("Wrote {} chapter comments to {}", chapters.len(), path.display());
    Ok(())
}

/// Vorbis comments store only start times; each chapter ends where the next
/// begins and the last one at the end of the stream.
fn read_comment_chapters(path: &Path) -> Result<Vec<ChapterEntry>, ChapterReadError> {
    let comment_error = |message: String| ChapterReadError::Comments {
        path: path.to_path_buf(),
        message,
    };

    let tagged_file = Probe::open(path)
        .map_err(|e| comment_error(format!("Failed to open file: {}", e)))?
        .read()
        .map_err(|e| comment_error(format!("Failed to read file: {}", e)))?;
    let stream_ms = u64::try_from(tagged_file.properties().duration().as_millis()).unwrap_or(u64::MAX);

    let Some(tag) = tagged_file.primary_tag() else {
        return Ok(Vec::new());
    };

    let mut by_number: BTreeMap<u32, (Option<u64>, String)> = BTreeMap::new();
    for item in tag.items() {
        let ItemKey::Unknown(key) = item.key() else {
            continue;
        };
        let (Some((number, is_name)), Some(text)) = (parse_chapter_key(key), item.value().text())
        else {
            continue;
        };
        let entry = by_number.entry(number).or_default();
        if is_name {
            entry.1 = text.to_string();
        } else {
            entry.0 = parse_comment_timestamp(text);
        }
    }

    let mut starts: Vec<(u64, String)> = by_number
        .into_values()
        .filter_map(|(start, title)| Some((start?, title)))
        .collect();
    starts.sort_by_key(|(start, _)| *start);

    let ends: Vec<u64> = starts
        .iter()
        .skip(1)
        .map(|(start, _)| *start)
        .chain(std::iter::once(stream_ms))
        .collect();

    Ok(starts
        .into_iter()
        .zip(ends)
        .enumerate()
        .map(|(idx, ((start_ms, title), end_ms))| ChapterEntry {
            element_id: format!("chp{}", idx),
            title,
            start_ms,
            end_ms: end_ms.max(start_ms),
        })
        .collect())
}
