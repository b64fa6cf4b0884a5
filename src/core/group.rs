//! Groups of tracks and their selection state
//!
//! A `Group` is one merge unit: an ordered list of tracks plus an inclusion
//! flag per track. The whole-group flag is derived (any track included).

use std::path::Path;

use serde::Serialize;

use super::sorting::sort_tracks;
use super::Track;

/// A track inside a group, with its selection flag
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTrack {
    pub track: Track,
    pub included: bool,
}

/// A set of tracks sharing a grouping key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    /// Album name or folder path
    pub key: String,
    /// Short name for display and output naming
    pub label: String,
    tracks: Vec<GroupTrack>,
}

impl Group {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            tracks: Vec::new(),
        }
    }

    /// Add a track (included by default). Returns false if its path is already present.
    pub fn add_track(&mut self, track: Track) -> bool {
        if self.contains(&track.path) {
            return false;
        }
        self.tracks.push(GroupTrack {
            track,
            included: true,
        });
        true
    }

    /// Remove a track by path. Returns the removed track.
    pub fn remove_track(&mut self, path: &Path) -> Option<Track> {
        let idx = self.tracks.iter().position(|t| t.track.path == path)?;
        Some(self.tracks.remove(idx).track)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.tracks.iter().any(|t| t.track.path == path)
    }

    pub fn tracks(&self) -> &[GroupTrack] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Put tracks into merge order
    pub fn sort(&mut self) {
        let mut tracks: Vec<Track> = Vec::with_capacity(self.tracks.len());
        let mut excluded = Vec::new();
        for entry in self.tracks.drain(..) {
            if !entry.included {
                excluded.push(entry.track.path.clone());
            }
            tracks.push(entry.track);
        }
        sort_tracks(&mut tracks);
        self.tracks = tracks
            .into_iter()
            .map(|track| GroupTrack {
                included: !excluded.contains(&track.path),
                track,
            })
            .collect();
    }

    /// True if any track is included
    pub fn is_included(&self) -> bool {
        self.tracks.iter().any(|t| t.included)
    }

    /// Include or exclude every track
    pub fn set_included(&mut self, included: bool) {
        for entry in &mut self.tracks {
            entry.included = included;
        }
    }

    /// Include or exclude one track. Returns false if the path is not in this group.
    pub fn set_track_included(&mut self, path: &Path, included: bool) -> bool {
        match self.tracks.iter_mut().find(|t| t.track.path == path) {
            Some(entry) => {
                entry.included = included;
                true
            }
            None => false,
        }
    }

    /// Flip one track's inclusion. Returns the new state, or None if absent.
    pub fn toggle_track(&mut self, path: &Path) -> Option<bool> {
        let entry = self.tracks.iter_mut().find(|t| t.track.path == path)?;
        entry.included = !entry.included;
        Some(entry.included)
    }

    /// Included tracks in merge order
    pub fn included_tracks(&self) -> Vec<&Track> {
        self.tracks
            .iter()
            .filter(|t| t.included)
            .map(|t| &t.track)
            .collect()
    }

    pub fn included_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.included).count()
    }

    /// Duration of the included tracks in seconds
    pub fn included_duration(&self) -> f64 {
        self.included_tracks().iter().map(|t| t.duration).sum()
    }
}
