//! Bucketing scanned tracks into merge groups

use std::collections::HashMap;
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::{Group, Track};

/// Group key for tracks without an album tag
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// How tracks are bucketed into groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum GroupingMode {
    /// One group per album tag
    #[default]
    #[value(name = "album")]
    ByAlbumTag,
    /// One group per containing folder
    #[value(name = "folder")]
    ByFolder,
}

impl GroupingMode {
    /// Key and display label for a track under this mode
    pub fn key_for(&self, track: &Track) -> (String, String) {
        match self {
            GroupingMode::ByAlbumTag => {
                let album = track
                    .album
                    .as_deref()
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .unwrap_or(UNKNOWN_ALBUM)
                    .to_string();
                (album.clone(), album)
            }
            GroupingMode::ByFolder => {
                let dir = track.parent_dir();
                let label = dir
                    .file_name()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| dir.to_string_lossy().to_string());
                (dir.to_string_lossy().to_string(), label)
            }
        }
    }
}

/// Bucket tracks into groups, in first-seen order
///
/// Tracks keep their input order inside each group; call `Group::sort` (or use
/// `build_groups`) to get merge order.
pub fn group_tracks(tracks: &[Track], mode: GroupingMode) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for track in tracks {
        let (key, label) = mode.key_for(track);
        let idx = *index.entry(key.clone()).or_insert_with(|| {
            groups.push(Group::new(key, label));
            groups.len() - 1
        });
        if !groups[idx].add_track(track.clone()) {
            log::debug!("Duplicate track ignored: {}", track.path.display());
        }
    }

    groups
}

/// Group tracks and sort each group into merge order
pub fn build_groups(tracks: &[Track], mode: GroupingMode) -> Vec<Group> {
    let mut groups = group_tracks(tracks, mode);
    for group in &mut groups {
        group.sort();
    }
    groups
}

fn matches_group(group: &Group, wanted: &str) -> bool {
    let wanted = wanted.trim().to_lowercase();
    group.key.to_lowercase() == wanted || group.label.to_lowercase() == wanted
}

/// Include only the groups whose key or label matches an entry of `wanted`
///
/// Matching ignores case. Every other group is excluded. Returns the entries
/// that matched no group.
pub fn select_groups(groups: &mut [Group], wanted: &[String]) -> Vec<String> {
    for group in groups.iter_mut() {
        let keep = wanted.iter().any(|w| matches_group(group, w));
        group.set_included(keep);
    }
    wanted
        .iter()
        .filter(|w| !groups.iter().any(|g| matches_group(g, w)))
        .cloned()
        .collect()
}

/// Exclude the track at `path` from whichever group holds it
pub fn exclude_track(groups: &mut [Group], path: &Path) -> bool {
    let target = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut found = false;
    for group in groups.iter_mut() {
        let hit = group
            .tracks()
            .iter()
            .map(|t| t.track.path.clone())
            .find(|p| std::path::absolute(p).map(|a| a == target).unwrap_or(false) || p == path);
        if let Some(track_path) = hit {
            found |= group.set_track_included(&track_path, false);
        }
    }
    found
}
