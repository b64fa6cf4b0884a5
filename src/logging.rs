//! Logging configuration for MP3 Album Merger
//!
//! Logs are written to both the terminal and a file at:
//! `~/Library/Logs/MP3-Album-Merger/mp3-album-merger.log` on macOS, or
//! `<local data dir>/MP3-Album-Merger/logs/mp3-album-merger.log` elsewhere.

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

const LOG_FILE: &str = "mp3-album-merger.log";
const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Get the log directory path
pub fn get_log_directory() -> Option<PathBuf> {
    if cfg!(target_os = "macos") {
        dirs::home_dir().map(|h| h.join("Library").join("Logs").join("MP3-Album-Merger"))
    } else {
        // Linux and Windows keep logs under the local data directory
        dirs::data_local_dir().map(|d| d.join("MP3-Album-Merger").join("logs"))
    }
}

/// Get the current log file path
pub fn get_log_file_path() -> Option<PathBuf> {
    get_log_directory().map(|d| d.join(LOG_FILE))
}

/// Move the log aside to `.log.old` once it grows past the limit
fn rotate_if_large(log_path: &Path, max_bytes: u64) {
    if let Ok(metadata) = fs::metadata(log_path) {
        if metadata.len() > max_bytes {
            let _ = fs::rename(log_path, log_path.with_extension("log.old"));
        }
    }
}

fn terminal_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Initialize the logging system
///
/// Terminal output shows info and above (debug with `verbose`); the file
/// always captures debug. Returns the path to the log file on success.
pub fn init_logging(verbose: bool) -> Option<PathBuf> {
    let log_dir = match get_log_directory() {
        Some(d) => d,
        None => {
            eprintln!("Warning: Could not determine log directory");
            init_terminal_only(verbose);
            return None;
        }
    };

    // Create log directory if it doesn't exist
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Could not create log directory: {}", e);
        init_terminal_only(verbose);
        return None;
    }

    let log_path = log_dir.join(LOG_FILE);

    // Rotate old log if it's too large (> 10MB)
    rotate_if_large(&log_path, MAX_LOG_BYTES);

    // Open log file (append mode)
    let log_file = match OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file: {}", e);
            // Fall back to terminal-only logging
            init_terminal_only(verbose);
            return None;
        }
    };

    // Configure logging format
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_thread_level(LevelFilter::Off) // Don't show thread IDs
        .set_target_level(LevelFilter::Off) // Don't show module targets
        .build();

    // Set up combined logger (terminal + file)
    let loggers: Vec<Box<dyn SharedLogger>> = vec![
        // Terminal logger - show info and above on stderr, debug when verbose
        TermLogger::new(
            terminal_level(verbose),
            config.clone(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ),
        // File logger - capture debug and above in file
        WriteLogger::new(LevelFilter::Debug, config, log_file),
    ];

    if CombinedLogger::init(loggers).is_err() {
        eprintln!("Warning: Logger already initialized");
    }

    // Write session start marker
    log::debug!("=== MP3 Album Merger session started ===");
    log::debug!("Log file: {}", log_path.display());

    Some(log_path)
}

/// Initialize terminal-only logging (fallback if file logging fails)
fn init_terminal_only(verbose: bool) {
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_thread_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .build();

    let term_logger = TermLogger::new(
        terminal_level(verbose),
        config,
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );
    let _ = CombinedLogger::init(vec![term_logger]);
}
