//! Core application logic and state
//!
//! This module contains:
//! - Folder scanning and track metadata
//! - Grouping by album tag or folder, and merge ordering
//! - Group/track selection
//! - Tag defaults and operator edits
//! - Merge jobs and their lifecycle
//! - Persisted settings

mod group;
mod grouping;
mod job;
mod scanning;
mod sorting;
mod state;
mod tag_review;

pub use group::Group;
pub use grouping::{build_groups, exclude_track, select_groups, GroupingMode};
pub use job::{JobState, MergeJob};
pub use scanning::{format_duration, format_size, scan_folder, ScanOptions, ScanReport, Track};
pub use state::Settings;
pub use tag_review::{AlbumTags, CoverEdit, CoverSource, TagEdit, TagEdits};
