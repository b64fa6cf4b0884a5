//! Output placement for merged files
//!
//! A merge never writes to its final path directly. The encoder writes a
//! hidden `.{name}.{uuid}.partial.{ext}` next to the destination; only after
//! the audio, tags and chapters are complete is it renamed over the final path.

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::ffmpeg::EncodeMode;
use crate::error::OutputPathError;

/// Extra room required on top of the estimated output size
const SPACE_MARGIN_PERCENT: u64 = 10;

/// Typical FLAC bitrate for 16-bit stereo at 44.1 kHz
const FLAC_ESTIMATE_KBPS: u32 = 1000;

/// Estimate the merged file size in bytes
///
/// Stream copy produces roughly the sum of the inputs; encoding produces
/// bitrate times duration.
pub fn estimate_output_size(mode: EncodeMode, input_bytes: u64, duration_secs: f64) -> u64 {
    let bitrate_kbps = match mode {
        EncodeMode::StreamCopy => return input_bytes,
        EncodeMode::Mp3 { bitrate_kbps } | EncodeMode::Opus { bitrate_kbps } => bitrate_kbps,
        EncodeMode::Flac { .. } => FLAC_ESTIMATE_KBPS,
    };
    let bytes_per_sec = bitrate_kbps as f64 * 1000.0 / 8.0;
    (bytes_per_sec * duration_secs.max(0.0)).ceil() as u64
}

/// Free bytes available to unprivileged users on the filesystem holding `dir`
#[cfg(unix)]
#[allow(clippy::unnecessary_cast)]
pub fn available_space(dir: &Path) -> Option<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(dir.as_os_str().as_bytes()).ok()?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return None;
    }
    Some(stat.f_bavail as u64 * stat.f_frsize as u64)
}

#[cfg(not(unix))]
pub fn available_space(_dir: &Path) -> Option<u64> {
    None
}

/// Temporary and final location of one merge
#[derive(Debug, Clone)]
pub struct OutputManager {
    final_path: PathBuf,
    temp_path: PathBuf,
}

impl OutputManager {
    /// Check the destination and reserve a temporary path
    ///
    /// Fails before anything is written when the directory is missing, not
    /// writable, or short of `estimated_bytes` plus a margin.
    pub fn prepare(final_path: &Path, estimated_bytes: u64) -> Result<Self, OutputPathError> {
        let dir = final_path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();

        if !dir.is_dir() {
            return Err(OutputPathError::MissingDirectory(dir));
        }

        check_writable(&dir)?;

        let required =
            estimated_bytes.saturating_add(estimated_bytes / 100 * SPACE_MARGIN_PERCENT);
        if let Some(available) = available_space(&dir) {
            if available < required {
                return Err(OutputPathError::InsufficientSpace {
                    dir,
                    required,
                    available,
                });
            }
        }

        let stem = final_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "merged".to_string());
        let ext = final_path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| "mp3".to_string());
        let temp_path = dir.join(format!(".{}.{}.partial.{}", stem, Uuid::new_v4(), ext));

        Ok(Self {
            final_path: final_path.to_path_buf(),
            temp_path,
        })
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Move the finished temporary file over the final path
    pub fn finalize(&self) -> Result<PathBuf, OutputPathError> {
        fs::rename(&self.temp_path, &self.final_path).map_err(|source| {
            OutputPathError::Finalize {
                path: self.final_path.clone(),
                source,
            }
        })?;
        log::debug!(
            "Moved {} -> {}",
            self.temp_path.display(),
            self.final_path.display()
        );
        Ok(self.final_path.clone())
    }

    /// Delete the temporary file if it exists
    pub fn discard(&self) {
        match fs::remove_file(&self.temp_path) {
            Ok(()) => log::debug!("Removed partial output {}", self.temp_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "Failed to remove partial output {}: {}",
                self.temp_path.display(),
                e
            ),
        }
    }
}

/// Prove the directory accepts new files by creating and removing a scratch file
fn check_writable(dir: &Path) -> Result<(), OutputPathError> {
    let scratch = dir.join(format!(".mp3-album-merger-check-{}", Uuid::new_v4()));
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&scratch)
        .map_err(|source| OutputPathError::NotWritable {
            dir: dir.to_path_buf(),
            source,
        })?;
    let _ = fs::remove_file(&scratch);
    Ok(())
}
