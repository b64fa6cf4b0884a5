//! FFmpeg subprocess handling for album merging
//!
//! All inputs are joined with the concat demuxer into one MP3, FLAC or Opus
//! stream. Progress is read from `-progress pipe:1` on stdout; stderr is kept
//! for diagnostics.

use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::runner::MergeOptions;
use crate::audio::AudioFormat;
use crate::core::Track;
use crate::error::EncodeError;

const MAX_FLAC_COMPRESSION: u8 = 8;

/// How the merged stream is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeMode {
    /// Join MP3 frames without re-encoding
    StreamCopy,
    /// Encode with LAME at a constant bitrate
    Mp3 { bitrate_kbps: u32 },
    /// Lossless FLAC at a compression level (0-8)
    Flac { compression_level: u8 },
    /// Opus in an Ogg container
    Opus { bitrate_kbps: u32 },
}

impl EncodeMode {
    /// Pick the mode for merging `tracks` into `format`
    ///
    /// Only MP3 output can stream copy, and only when every input is MP3 and
    /// no bitrate is forced. `options.bitrate_kbps` applies to MP3 and Opus.
    pub fn choose(tracks: &[Track], format: AudioFormat, options: &MergeOptions) -> Self {
        match format {
            AudioFormat::Mp3 => match options.bitrate_kbps {
                Some(bitrate_kbps) => EncodeMode::Mp3 { bitrate_kbps },
                None if tracks.iter().all(|t| t.format == AudioFormat::Mp3) => {
                    EncodeMode::StreamCopy
                }
                None => EncodeMode::Mp3 {
                    bitrate_kbps: options.default_bitrate_kbps,
                },
            },
            AudioFormat::Flac => EncodeMode::Flac {
                compression_level: options.flac_compression_level.min(MAX_FLAC_COMPRESSION),
            },
            AudioFormat::Opus => EncodeMode::Opus {
                bitrate_kbps: options.bitrate_kbps.unwrap_or(options.opus_bitrate_kbps),
            },
        }
    }

    /// ffmpeg muxer name for the output container
    fn muxer(&self) -> &'static str {
        match self {
            EncodeMode::StreamCopy | EncodeMode::Mp3 { .. } => "mp3",
            EncodeMode::Flac { .. } => "flac",
            EncodeMode::Opus { .. } => "ogg",
        }
    }
}

/// One merge to perform
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    /// Sources in merge order
    pub inputs: Vec<PathBuf>,
    /// Where the merged stream is written
    pub output: PathBuf,
    pub mode: EncodeMode,
    /// Sum of the input durations in seconds, used for progress
    pub expected_duration: f64,
}

/// Something that can concatenate audio files into one output file
pub trait Encoder {
    /// Produce `request.output`, reporting progress as a percentage (0-100)
    ///
    /// Must return `EncodeError::Cancelled` promptly once `cancel` trips.
    fn encode(
        &self,
        request: &EncodeRequest,
        on_progress: &mut dyn FnMut(f32),
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<(), EncodeError>>;
}

/// Check that every source can be opened before anything is spawned
pub fn verify_sources(inputs: &[PathBuf]) -> Result<(), EncodeError> {
    for path in inputs {
        std::fs::File::open(path).map_err(|source| EncodeError::SourceUnreadable {
            path: path.clone(),
            source,
        })?;
    }
    Ok(())
}

/// Render the concat demuxer list for `inputs`
///
/// Single quotes are closed, escaped and reopened (`'\''`).
pub fn concat_list(inputs: &[PathBuf]) -> String {
    let mut list = String::from("ffconcat version 1.0\n");
    for path in inputs {
        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.clone());
        let escaped = absolute.to_string_lossy().replace('\'', "'\\''");
        list.push_str(&format!("file '{}'\n", escaped));
    }
    list
}

/// Build the ffmpeg argument list
pub fn build_args(list_path: &Path, request: &EncodeRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-hide_banner",
        "-nostdin",
        "-loglevel",
        "error",
        "-f",
        "concat",
        "-safe",
        "0",
        "-i",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(list_path.as_os_str().to_owned());

    // Audio only, and no metadata carried over from the first input
    for arg in ["-map", "0:a", "-vn", "-map_metadata", "-1"] {
        args.push(arg.into());
    }

    let codec: Vec<String> = match request.mode {
        EncodeMode::StreamCopy => vec!["-c".into(), "copy".into()],
        EncodeMode::Mp3 { bitrate_kbps } => vec![
            "-codec:a".into(),
            "libmp3lame".into(),
            "-b:a".into(),
            format!("{}k", bitrate_kbps),
        ],
        EncodeMode::Flac { compression_level } => vec![
            "-codec:a".into(),
            "flac".into(),
            "-compression_level".into(),
            compression_level.to_string(),
        ],
        EncodeMode::Opus { bitrate_kbps } => vec![
            "-codec:a".into(),
            "libopus".into(),
            "-b:a".into(),
            format!("{}k", bitrate_kbps),
        ],
    };
    args.extend(codec.into_iter().map(OsString::from));

    for arg in ["-progress", "pipe:1", "-nostats", "-y", "-f", request.mode.muxer()] {
        args.push(arg.into());
    }
    args.push(request.output.as_os_str().to_owned());
    args
}

/// Parse one `-progress` line into a percentage of `expected_duration`
///
/// Both `out_time_us` and `out_time_ms` carry microseconds.
pub fn parse_progress_line(line: &str, expected_duration: f64) -> Option<f32> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => {
            if expected_duration <= 0.0 {
                return None;
            }
            let micros: i64 = value.trim().parse().ok()?;
            let seconds = micros.max(0) as f64 / 1_000_000.0;
            Some(((seconds / expected_duration) * 100.0).clamp(0.0, 100.0) as f32)
        }
        "progress" if value.trim() == "end" => Some(100.0),
        _ => None,
    }
}

/// Last non-empty stderr line, or a placeholder
fn diagnostic(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .unwrap_or("Unknown error")
        .to_string()
}

/// Error for an ffmpeg run that exited unsuccessfully
///
/// An interrupted ffmpeg exits non-zero on its own, so a failure seen after
/// the token tripped is reported as a cancellation.
fn exit_failure(status: ExitStatus, stderr: &str, cancel: &CancellationToken) -> EncodeError {
    if cancel.is_cancelled() {
        return EncodeError::Cancelled;
    }
    EncodeError::Failed {
        status: status.to_string(),
        diagnostic: diagnostic(stderr),
    }
}

/// Encoder backed by an ffmpeg binary
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg_path: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg_path: PathBuf) -> Self {
        Self { ffmpeg_path }
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    async fn run(
        &self,
        list_path: &Path,
        request: &EncodeRequest,
        on_progress: &mut dyn FnMut(f32),
        cancel: &CancellationToken,
    ) -> Result<(), EncodeError> {
        let args = build_args(list_path, request);
        log::debug!("Running {} {:?}", self.ffmpeg_path.display(), args);

        let mut command = Command::new(&self.ffmpeg_path);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Keep terminal Ctrl-C away from ffmpeg; only the cancel token stops it
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    EncodeError::EncoderNotFound(self.ffmpeg_path.display().to_string())
                } else {
                    EncodeError::Spawn(e)
                }
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("ffmpeg stdout was not captured"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("ffmpeg stderr was not captured"))?;

        let stderr_task = tokio::spawn(async move {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text).await;
            text
        });

        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::info!("Cancelling ffmpeg for {}", request.output.display());
                    child.kill().await?;
                    return Err(EncodeError::Cancelled);
                }
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if let Some(percent) = parse_progress_line(&line, request.expected_duration) {
                            on_progress(percent);
                        }
                    }
                    None => break,
                },
            }
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                child.kill().await?;
                return Err(EncodeError::Cancelled);
            }
            status = child.wait() => status?,
        };

        let stderr_text = stderr_task.await.unwrap_or_default();
        if !status.success() {
            return Err(exit_failure(status, &stderr_text, cancel));
        }

        on_progress(100.0);
        Ok(())
    }
}

impl Encoder for FfmpegEncoder {
    async fn encode(
        &self,
        request: &EncodeRequest,
        on_progress: &mut dyn FnMut(f32),
        cancel: &CancellationToken,
    ) -> Result<(), EncodeError> {
        let list_path =
            std::env::temp_dir().join(format!("mp3-album-merger-{}.txt", Uuid::new_v4()));
        tokio::fs::write(&list_path, concat_list(&request.inputs)).await?;

        let result = self.run(&list_path, request, on_progress, cancel).await;

        if let Err(e) = tokio::fs::remove_file(&list_path).await {
            log::debug!("Failed to remove concat list {}: {}", list_path.display(), e);
        }
        result
    }
}
