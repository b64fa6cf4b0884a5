use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Audio formats accepted as merge inputs and produced as merge outputs
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Flac,
    Opus,
}

impl AudioFormat {
    /// Detect the format from a file extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "mp3" => Some(Self::Mp3),
            "flac" => Some(Self::Flac),
            "opus" => Some(Self::Opus),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
            Self::Opus => "opus",
        }
    }

    /// Whether chapters are stored as ID3v2 frames rather than Vorbis comments
    pub fn uses_id3(&self) -> bool {
        matches!(self, Self::Mp3)
    }
}

/// Check if a file is a supported audio file based on its extension
pub fn is_audio_file(path: &Path) -> bool {
    AudioFormat::from_path(path).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognizes_audio_formats() {
        assert!(is_audio_file(Path::new("test.mp3")));
        assert!(is_audio_file(Path::new("test.MP3")));
        assert!(is_audio_file(Path::new("test.flac")));
        assert!(is_audio_file(Path::new("test.opus")));
    }

    #[test]
    fn test_rejects_non_audio() {
        assert!(!is_audio_file(Path::new("test.txt")));
        assert!(!is_audio_file(Path::new("test.wav")));
        assert!(!is_audio_file(Path::new("test")));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(AudioFormat::from_path(Path::new("a/b.Flac")), Some(AudioFormat::Flac));
        assert_eq!(AudioFormat::from_path(Path::new("a/b.mp3")), Some(AudioFormat::Mp3));
        assert_eq!(AudioFormat::Opus.as_str(), "opus");
        assert_eq!(AudioFormat::default(), AudioFormat::Mp3);
    }

    #[test]
    fn test_format_serde_names() {
        let json = serde_json::to_string(&AudioFormat::Flac).unwrap();
        assert_eq!(json, "\"flac\"");
        let parsed: AudioFormat = serde_json::from_str("\"opus\"").unwrap();
        assert_eq!(parsed, AudioFormat::Opus);
        assert!(AudioFormat::Mp3.uses_id3());
        assert!(!AudioFormat::Opus.uses_id3());
    }
}
