//! Persisted application settings
//!
//! Stored as JSON at `<data dir>/MP3 Album Merger/settings.json`. A missing or
//! unreadable file yields the defaults; command-line flags override whatever
//! was loaded.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{GroupingMode, ScanOptions};
use crate::audio::AudioFormat;

fn default_bitrate() -> u32 {
    192
}

fn default_opus_bitrate() -> u32 {
    128
}

fn default_compression_level() -> u8 {
    5
}

fn default_parallel_jobs() -> usize {
    1
}

fn default_tolerance_ms() -> u64 {
    50
}

fn default_true() -> bool {
    true
}

/// Application-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub grouping_mode: GroupingMode,
    #[serde(default)]
    pub output_format: AudioFormat,
    /// Force re-encoding at this bitrate. None copies MP3 streams when possible.
    #[serde(default)]
    pub bitrate_kbps: Option<u32>,
    /// MP3 bitrate used when re-encoding is required
    #[serde(default = "default_bitrate")]
    pub default_bitrate_kbps: u32,
    #[serde(default = "default_opus_bitrate")]
    pub opus_bitrate_kbps: u32,
    /// FLAC compression level, 0 (fastest) to 8 (smallest)
    #[serde(default = "default_compression_level")]
    pub flac_compression_level: u8,
    #[serde(default = "default_parallel_jobs")]
    pub max_parallel_jobs: usize,
    /// Allowed drift between chapter table and measured output length
    #[serde(default = "default_tolerance_ms")]
    pub chapter_tolerance_ms: u64,
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub skip_hidden: bool,
    #[serde(default = "default_true")]
    pub skip_merged_outputs: bool,
    #[serde(default = "default_true")]
    pub follow_links: bool,
    #[serde(default)]
    pub max_depth: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            grouping_mode: GroupingMode::default(),
            output_format: AudioFormat::default(),
            bitrate_kbps: None,
            default_bitrate_kbps: default_bitrate(),
            opus_bitrate_kbps: default_opus_bitrate(),
            flac_compression_level: default_compression_level(),
            max_parallel_jobs: default_parallel_jobs(),
            chapter_tolerance_ms: default_tolerance_ms(),
            ffmpeg_path: None,
            skip_hidden: true,
            skip_merged_outputs: true,
            follow_links: true,
            max_depth: None,
        }
    }
}

impl Settings {
    const SETTINGS_FILE: &'static str = "settings.json";

    /// Get the app data directory (~/Library/Application Support/MP3 Album Merger/ on macOS)
    fn get_app_data_dir() -> Result<PathBuf, String> {
        let data_dir =
            dirs::data_dir().ok_or_else(|| "Could not determine data directory".to_string())?;
        Ok(data_dir.join("MP3 Album Merger"))
    }

    /// Location of the settings file
    pub fn path() -> Result<PathBuf, String> {
        Ok(Self::get_app_data_dir()?.join(Self::SETTINGS_FILE))
    }

    /// Load settings from disk, or return defaults if not found
    pub fn load() -> Self {
        match Self::path().and_then(|path| Self::load_from(&path)) {
            Ok(settings) => {
                log::debug!("Loaded settings from disk");
                settings
            }
            Err(e) => {
                log::debug!("Using default settings: {}", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Err("Settings file not found".to_string());
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read settings: {}", e))?;

        serde_json::from_str(&contents).map_err(|e| format!("Failed to parse settings: {}", e))
    }

    /// Save settings to the default location
    pub fn save(&self) -> Result<PathBuf, String> {
        let path = Self::path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| format!("Failed to create settings directory: {}", e))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        std::fs::write(path, json).map_err(|e| format!("Failed to write settings: {}", e))?;

        log::debug!("Saved settings to {:?}", path);
        Ok(())
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            skip_hidden: self.skip_hidden,
            skip_merged_outputs: self.skip_merged_outputs,
            follow_links: self.follow_links,
            max_depth: self.max_depth,
        }
    }

    /// Worker count for a batch, never zero
    pub fn parallel_jobs(&self) -> usize {
        self.max_parallel_jobs.max(1)
    }
}
