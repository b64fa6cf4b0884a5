//! Album merging
//!
//! Concatenates a job's tracks through ffmpeg, writes tags and chapters, and
//! runs batches of jobs with cancellation.

mod batch;
mod events;
mod ffmpeg;
mod output_manager;
mod runner;
#[cfg(test)]
pub(crate) mod testing;

pub use batch::run_batch;
pub use events::{JobReport, MergeEvent};
pub use ffmpeg::{EncodeMode, FfmpegEncoder};
pub use runner::MergeOptions;
#[cfg(test)]
pub(crate) use runner::run_job;

use std::path::{Path, PathBuf};

use crate::error::EncodeError;

/// Environment variable naming an ffmpeg binary
pub const FFMPEG_ENV: &str = "MP3_ALBUM_MERGER_FFMPEG";

#[cfg(windows)]
const FFMPEG_BINARY: &str = "ffmpeg.exe";
#[cfg(not(windows))]
const FFMPEG_BINARY: &str = "ffmpeg";

/// Bundled binary locations: the source tree in development, next to the executable otherwise
fn bundled_ffmpeg_paths() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
        candidates.push(
            PathBuf::from(manifest_dir)
                .join("resources")
                .join("bin")
                .join(FFMPEG_BINARY),
        );
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            // macOS app bundle: Contents/MacOS/../Resources/bin/ffmpeg
            candidates.push(
                exe_dir
                    .join("..")
                    .join("Resources")
                    .join("bin")
                    .join(FFMPEG_BINARY),
            );
            candidates.push(exe_dir.join("resources").join("bin").join(FFMPEG_BINARY));
        }
    }

    candidates
}

fn search_path() -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(FFMPEG_BINARY))
        .find(|candidate| candidate.is_file())
}

/// Locate ffmpeg
///
/// Order: the configured path, `MP3_ALBUM_MERGER_FFMPEG`, a bundled copy, then `PATH`.
pub fn get_ffmpeg_path(configured: Option<&Path>) -> Result<PathBuf, EncodeError> {
    if let Some(path) = configured {
        log::debug!("Using configured ffmpeg: {:?}", path);
        return Ok(path.to_path_buf());
    }

    if let Some(path) = std::env::var_os(FFMPEG_ENV).filter(|v| !v.is_empty()) {
        log::debug!("Using ffmpeg from {}: {:?}", FFMPEG_ENV, path);
        return Ok(PathBuf::from(path));
    }

    if let Some(path) = bundled_ffmpeg_paths().into_iter().find(|p| p.exists()) {
        log::debug!("Found bundled ffmpeg at {:?}", path);
        return Ok(path);
    }

    if let Some(path) = search_path() {
        log::debug!("Found ffmpeg on PATH at {:?}", path);
        return Ok(path);
    }

    Err(EncodeError::EncoderNotFound(
        "install ffmpeg, add it to PATH, or set MP3_ALBUM_MERGER_FFMPEG".to_string(),
    ))
}

/// Locate ffmpeg and check that it exists and is executable
pub fn verify_ffmpeg(configured: Option<&Path>) -> Result<PathBuf, EncodeError> {
    let path = get_ffmpeg_path(configured)?;

    if !path.is_file() {
        return Err(EncodeError::EncoderNotFound(format!(
            "no file at {}",
            path.display()
        )));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = std::fs::metadata(&path)?;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(EncodeError::EncoderNotFound(format!(
                "{} is not executable",
                path.display()
            )));
        }
    }

    log::debug!("ffmpeg verified at: {:?}", path);
    Ok(path)
}
