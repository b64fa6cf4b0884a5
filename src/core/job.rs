//! Merge jobs and their lifecycle
//!
//! A `MergeJob` freezes one group's included tracks, in merge order, at the
//! moment it is created. The same snapshot feeds the encoder and the chapter
//! table, so the two can never disagree on order.

use std::fmt;
use std::path::PathBuf;

use sanitize_filename::sanitize;
use serde::Serialize;
use uuid::Uuid;

use super::tag_review::{detect_defaults, AlbumTags, TagEdits};
use super::scanning::{total_duration, total_size, MERGED_SUFFIX};
use super::{Group, Track};
use crate::audio::AudioFormat;
use crate::error::MergeError;

const UNKNOWN_ARTIST: &str = "Unknown Artist";
const UNKNOWN_ALBUM_NAME: &str = "Unknown Album";

/// Lifecycle of a merge job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum JobState {
    Pending,
    TagReview,
    Merging,
    ChapterWriting,
    Done,
    /// Audio merged, but tags or chapters could not be written
    DonePartialFailure(String),
    Failed(String),
    Cancelled,
}

impl JobState {
    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: &JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Pending, TagReview)
                | (Pending, Cancelled)
                | (TagReview, Merging)
                | (TagReview, Cancelled)
                | (Merging, ChapterWriting)
                | (Merging, Failed(_))
                | (Merging, Cancelled)
                | (ChapterWriting, Done)
                | (ChapterWriting, DonePartialFailure(_))
                | (ChapterWriting, Failed(_))
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Done
                | JobState::DonePartialFailure(_)
                | JobState::Failed(_)
                | JobState::Cancelled
        )
    }

    /// True when a merged file exists at the output path
    pub fn produced_output(&self) -> bool {
        matches!(self, JobState::Done | JobState::DonePartialFailure(_))
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::TagReview => write!(f, "tag review"),
            JobState::Merging => write!(f, "merging"),
            JobState::ChapterWriting => write!(f, "writing chapters"),
            JobState::Done => write!(f, "done"),
            JobState::DonePartialFailure(reason) => write!(f, "done with warnings: {}", reason),
            JobState::Failed(reason) => write!(f, "failed: {}", reason),
            JobState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Build the merged file name for an artist, album and output format
///
/// Blank values fall back to "Unknown Artist" / "Unknown Album". Characters
/// that are invalid in file names are removed; spaces are kept.
pub fn output_file_name(artist: &str, album: &str, format: AudioFormat) -> String {
    let artist = match artist.trim() {
        "" => UNKNOWN_ARTIST,
        a => a,
    };
    let album = match album.trim() {
        "" => UNKNOWN_ALBUM_NAME,
        a => a,
    };
    let stem = sanitize(format!("{}-{}", artist, album));
    format!("{}{}.{}", stem.trim(), MERGED_SUFFIX, format.as_str())
}

/// One group to be merged into one output file
#[derive(Debug, Clone, Serialize)]
pub struct MergeJob {
    pub id: Uuid,
    pub group_key: String,
    pub group_label: String,
    tracks: Vec<Track>,
    pub tags: AlbumTags,
    /// Container and codec of the merged file
    pub format: AudioFormat,
    state: JobState,
}

impl MergeJob {
    /// Snapshot the included tracks of `group` and propose default tags
    pub fn from_group(group: &Group) -> Result<Self, MergeError> {
        let tracks: Vec<Track> = group.included_tracks().into_iter().cloned().collect();
        if tracks.is_empty() {
            return Err(MergeError::NoTracks(group.label.clone()));
        }
        let tags = detect_defaults(&tracks, &group.label);

        Ok(Self {
            id: Uuid::new_v4(),
            group_key: group.key.clone(),
            group_label: group.label.clone(),
            tracks,
            tags,
            format: AudioFormat::default(),
            state: JobState::Pending,
        })
    }

    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = format;
        self
    }

    /// Tracks in merge order
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    /// Expected length of the merged audio in seconds
    pub fn expected_duration(&self) -> f64 {
        total_duration(&self.tracks)
    }

    pub fn total_size(&self) -> u64 {
        total_size(&self.tracks)
    }

    /// Directory the merged file is written to: that of the first track
    pub fn output_dir(&self) -> PathBuf {
        self.tracks
            .first()
            .map(Track::parent_dir)
            .unwrap_or_default()
    }

    /// Final output path, derived from the current tags
    pub fn output_path(&self) -> PathBuf {
        self.output_dir()
            .join(output_file_name(&self.tags.artist, &self.tags.album, self.format))
    }

    pub fn apply_edits(&mut self, edits: &TagEdits) {
        self.tags.apply(edits);
    }

    /// Move to `next`, rejecting moves the lifecycle does not allow
    pub fn transition(&mut self, next: JobState) -> Result<(), MergeError> {
        if !self.state.can_transition_to(&next) {
            return Err(MergeError::InvalidTransition {
                group: self.group_label.clone(),
                from: self.state.clone(),
                to: next,
            });
        }
        log::debug!("Job {} ({}): {} -> {}", self.id, self.group_label, self.state, next);
        self.state = next;
        Ok(())
    }
}
