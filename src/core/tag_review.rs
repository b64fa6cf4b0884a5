//! Album tag defaults and operator edits
//!
//! Before a group is merged, the output tags are proposed from the source
//! tracks and the operator may change or clear any of them.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::Serialize;

use super::Track;

/// Where the front cover of the merged file comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CoverSource {
    /// Copy the embedded cover of this source track
    Embedded(PathBuf),
    /// Read an image file from disk
    File(PathBuf),
}

/// Tags written to a merged file. Empty strings mean "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlbumTags {
    pub artist: String,
    pub album: String,
    pub year: String,
    pub genre: String,
    pub cover: Option<CoverSource>,
    pub compilation: bool,
}

/// A change to one text field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TagEdit {
    #[default]
    Keep,
    Set(String),
    Clear,
}

impl TagEdit {
    /// Interpret an interactive answer: empty keeps, `-` clears, anything else sets
    pub fn from_answer(answer: &str) -> Self {
        match answer.trim() {
            "" => TagEdit::Keep,
            "-" => TagEdit::Clear,
            value => TagEdit::Set(value.to_string()),
        }
    }

    fn apply_to(&self, field: &mut String) {
        match self {
            TagEdit::Keep => {}
            TagEdit::Set(value) => *field = value.trim().to_string(),
            TagEdit::Clear => field.clear(),
        }
    }
}

/// A change to the cover image
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CoverEdit {
    #[default]
    Keep,
    File(PathBuf),
    Clear,
}

/// Operator changes to the proposed tags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagEdits {
    pub artist: TagEdit,
    pub album: TagEdit,
    pub year: TagEdit,
    pub genre: TagEdit,
    pub cover: CoverEdit,
    pub compilation: Option<bool>,
}

impl TagEdits {
    pub fn is_empty(&self) -> bool {
        *self == TagEdits::default()
    }
}

impl AlbumTags {
    pub fn apply(&mut self, edits: &TagEdits) {
        edits.artist.apply_to(&mut self.artist);
        edits.album.apply_to(&mut self.album);
        edits.year.apply_to(&mut self.year);
        edits.genre.apply_to(&mut self.genre);
        match &edits.cover {
            CoverEdit::Keep => {}
            CoverEdit::File(path) => self.cover = Some(CoverSource::File(path.clone())),
            CoverEdit::Clear => self.cover = None,
        }
        if let Some(compilation) = edits.compilation {
            self.compilation = compilation;
        }
    }
}

/// Most frequent non-empty value, or None when absent or when the top count is shared
fn most_common<'a, I>(values: I) -> Option<String>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values.into_iter().flatten() {
        let value = value.trim();
        if !value.is_empty() {
            *counts.entry(value).or_insert(0) += 1;
        }
    }

    let top = counts.values().copied().max()?;
    let mut leaders = counts.iter().filter(|(_, count)| **count == top);
    let (value, _) = leaders.next()?;
    if leaders.next().is_some() {
        return None;
    }
    Some(value.to_string())
}

/// Propose tags for a merge of `tracks`
///
/// Each field takes the most common non-empty value across the tracks and is
/// left blank on a tie. A blank album falls back to `group_label`. The cover is
/// the most common embedded front cover. Compilation is proposed when more
/// than one artist appears.
pub fn detect_defaults(tracks: &[Track], group_label: &str) -> AlbumTags {
    let artist = most_common(tracks.iter().map(|t| t.artist.as_deref()));
    let album = most_common(tracks.iter().map(|t| t.album.as_deref()))
        .unwrap_or_else(|| group_label.to_string());
    let year = most_common(tracks.iter().map(|t| t.year.as_deref()));
    let genre = most_common(tracks.iter().map(|t| t.genre.as_deref()));

    let mut cover_counts: HashMap<u64, usize> = HashMap::new();
    for hash in tracks.iter().filter_map(|t| t.cover_hash) {
        *cover_counts.entry(hash).or_insert(0) += 1;
    }
    let cover = cover_counts
        .values()
        .copied()
        .max()
        .and_then(|top| {
            let leaders: Vec<u64> = cover_counts
                .iter()
                .filter(|(_, count)| **count == top)
                .map(|(hash, _)| *hash)
                .collect();
            (leaders.len() == 1).then(|| leaders[0])
        })
        .and_then(|hash| tracks.iter().find(|t| t.cover_hash == Some(hash)))
        .map(|t| CoverSource::Embedded(t.path.clone()));

    let distinct_artists: HashSet<&str> = tracks
        .iter()
        .filter_map(|t| t.artist.as_deref())
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .collect();

    AlbumTags {
        artist: artist.unwrap_or_default(),
        album,
        year: year.unwrap_or_default(),
        genre: genre.unwrap_or_default(),
        cover,
        compilation: distinct_artists.len() > 1,
    }
}
