//! Error types for scanning, merging and chapter writing
//!
//! Every variant carries the file or group it concerns so a failure can
//! always be attributed by name.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::JobState;

/// A file or directory could not be read during a scan. The scan continues.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Failed to read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Tag data in a source file was missing or corrupt. Fields are treated as absent.
#[derive(Error, Debug)]
#[error("Failed to read tags from {}: {message}", .path.display())]
pub struct TagReadError {
    pub path: PathBuf,
    pub message: String,
}

/// The output location cannot receive the merged file.
#[derive(Error, Debug)]
pub enum OutputPathError {
    #[error("Output directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("Output directory is not writable: {}: {source}", .dir.display())]
    NotWritable {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Not enough free space in {}: need about {required} bytes, {available} available",
        .dir.display()
    )]
    InsufficientSpace {
        dir: PathBuf,
        required: u64,
        available: u64,
    },

    #[error("Failed to move merged file into place at {}: {source}", .path.display())]
    Finalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The encoder could not produce the merged stream.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("ffmpeg binary not found: {0}")]
    EncoderNotFound(String),

    #[error("Source file is unreadable: {}: {source}", .path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn encoder: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Encoder exited with {status}: {diagnostic}")]
    Failed { status: String, diagnostic: String },

    #[error("Encoder I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding was cancelled")]
    Cancelled,
}

/// Tags or chapters could not be written. The merged audio is kept.
#[derive(Error, Debug)]
pub enum ChapterWriteError {
    #[error("Failed to write tags to {}: {message}", .path.display())]
    Tags { path: PathBuf, message: String },

    #[error("Failed to write chapters to {}: {source}", .path.display())]
    Chapters {
        path: PathBuf,
        #[source]
        source: id3::Error,
    },

    #[error("Failed to write chapter comments to {}: {message}", .path.display())]
    Comments { path: PathBuf, message: String },

    #[error("Failed to read cover image {}: {message}", .path.display())]
    Cover { path: PathBuf, message: String },
}

/// The chapter table of a merged file could not be read back.
#[derive(Error, Debug)]
pub enum ChapterReadError {
    #[error("Failed to read chapters from {}: {source}", .path.display())]
    Id3 {
        path: PathBuf,
        #[source]
        source: id3::Error,
    },

    #[error("Failed to read chapter comments from {}: {message}", .path.display())]
    Comments { path: PathBuf, message: String },
}

/// Failure of one merge job. Never aborts the rest of a batch.
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Group '{0}' has no included tracks")]
    NoTracks(String),

    #[error("Group '{group}': {source}")]
    Encode {
        group: String,
        #[source]
        source: EncodeError,
    },

    #[error("Group '{group}': {source}")]
    OutputPath {
        group: String,
        #[source]
        source: OutputPathError,
    },

    #[error("Job for '{group}' cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        group: String,
        from: JobState,
        to: JobState,
    },
}
