//! Merge order within a group
//!
//! Numbered tracks come first in ascending track number; unnumbered tracks
//! follow. Ties and unnumbered tracks are ordered by case-insensitive filename,
//! then by full path, so the order is total and the same on every run.

use std::cmp::Ordering;

use super::Track;

/// Compare two tracks by merge order
pub fn compare_tracks(a: &Track, b: &Track) -> Ordering {
    let by_number = match (a.track_number, b.track_number) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    by_number
        .then_with(|| a.file_name().to_lowercase().cmp(&b.file_name().to_lowercase()))
        .then_with(|| a.path.cmp(&b.path))
}

/// Sort tracks in place into merge order
pub fn sort_tracks(tracks: &mut [Track]) {
    tracks.sort_by(compare_tracks);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(path: &str, number: Option<u32>) -> Track {
        let mut t = Track::new_for_test(path);
        t.track_number = number;
        t
    }

    fn names(tracks: &[Track]) -> Vec<String> {
        tracks.iter().map(|t| t.file_name()).collect()
    }

    #[test]
    fn test_sorts_by_track_number() {
        let mut tracks = vec![
            track("/a/x.mp3", Some(2)),
            track("/a/y.mp3", Some(1)),
            track("/a/z.mp3", Some(3)),
        ];
        sort_tracks(&mut tracks);
        assert_eq!(names(&tracks), vec!["y.mp3", "x.mp3", "z.mp3"]);
    }

    #[test]
    fn test_missing_numbers_sort_last_by_filename() {
        let mut tracks = vec![
            track("/a/Zeta.mp3", None),
            track("/a/b.mp3", Some(10)),
            track("/a/alpha.mp3", None),
            track("/a/c.mp3", Some(2)),
            track("/a/Beta.mp3", None),
        ];
        sort_tracks(&mut tracks);
        assert_eq!(
            names(&tracks),
            vec!["c.mp3", "b.mp3", "alpha.mp3", "Beta.mp3", "Zeta.mp3"]
        );
    }

    #[test]
    fn test_equal_numbers_tie_break_on_filename() {
        // Two discs both numbering from 1
        let mut tracks = vec![
            track("/a/disc2-01.mp3", Some(1)),
            track("/a/Disc1-01.mp3", Some(1)),
        ];
        sort_tracks(&mut tracks);
        assert_eq!(names(&tracks), vec!["Disc1-01.mp3", "disc2-01.mp3"]);
    }

    #[test]
    fn test_same_filename_in_different_folders_is_deterministic() {
        let mut forward = vec![track("/b/song.mp3", None), track("/a/song.mp3", None)];
        let mut backward = vec![track("/a/song.mp3", None), track("/b/song.mp3", None)];
        sort_tracks(&mut forward);
        sort_tracks(&mut backward);
        assert_eq!(forward, backward);
        assert_eq!(forward[0].path.to_str(), Some("/a/song.mp3"));
    }

    #[test]
    fn test_sort_is_idempotent() {
        let mut tracks = vec![
            track("/a/q.mp3", None),
            track("/a/p.mp3", Some(4)),
            track("/a/r.mp3", Some(1)),
            track("/a/O.mp3", None),
        ];
        sort_tracks(&mut tracks);
        let once = tracks.clone();
        sort_tracks(&mut tracks);
        assert_eq!(tracks, once);
    }
}
