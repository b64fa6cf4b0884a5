//! MP3 Album Merger
//!
//! Scans a music folder, groups tracks by album tag or folder, and merges
//! each selected group into one MP3 with a chapter per track.

mod audio;
mod conversion;
mod core;
mod error;
mod logging;
#[cfg(test)]
mod test_fixtures;
mod ui;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::audio::{read_chapters, AudioFormat};
use crate::conversion::{
    run_batch, verify_ffmpeg, EncodeMode, FfmpegEncoder, JobReport, MergeOptions,
};
use crate::core::{
    build_groups, exclude_track, format_duration, scan_folder, select_groups, CoverEdit,
    GroupingMode, JobState, MergeJob, ScanReport, Settings, TagEdit, TagEdits,
};
use crate::ui::{
    render_events, render_groups, render_groups_json, render_summary, review_tags, ReviewOutcome,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Show debug output on the terminal
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the groups found in a folder
    Scan {
        /// Folder to scan recursively
        directory: PathBuf,

        #[command(flatten)]
        scan: ScanArgs,

        /// Print groups as JSON
        #[arg(long)]
        json: bool,
    },
    /// Merge groups into single files with chapters
    Merge(MergeArgs),
    /// Show or create the settings file
    Config {
        /// Write the default settings if no settings file exists
        #[arg(long)]
        init: bool,
    },
    /// Print the chapter table of a merged file
    Inspect {
        file: PathBuf,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// Group by album tag or by containing folder
    #[arg(long, value_enum)]
    group_by: Option<GroupingMode>,

    /// Do not descend more than this many levels
    #[arg(long)]
    max_depth: Option<usize>,

    /// Include hidden files and earlier merge outputs
    #[arg(long)]
    all_files: bool,
}

#[derive(Args)]
struct MergeArgs {
    /// Folder to scan recursively
    directory: PathBuf,

    #[command(flatten)]
    scan: ScanArgs,

    /// Merge only this group (key or label); repeatable
    #[arg(long = "group", value_name = "KEY")]
    groups: Vec<String>,

    /// Leave this track out; repeatable
    #[arg(long = "exclude", value_name = "PATH")]
    excludes: Vec<PathBuf>,

    /// Artist tag ('-' clears)
    #[arg(long)]
    artist: Option<String>,

    /// Album tag ('-' clears)
    #[arg(long)]
    album: Option<String>,

    /// Year tag ('-' clears)
    #[arg(long)]
    year: Option<String>,

    /// Genre tag ('-' clears)
    #[arg(long)]
    genre: Option<String>,

    /// Front cover image
    #[arg(long, value_name = "FILE", conflicts_with = "no_cover")]
    cover: Option<PathBuf>,

    /// Write no front cover
    #[arg(long)]
    no_cover: bool,

    /// Mark the output as a compilation
    #[arg(long)]
    compilation: Option<bool>,

    /// Output container and codec
    #[arg(long, value_enum)]
    format: Option<AudioFormat>,

    /// Re-encode at this bitrate (kbps); applies to mp3 and opus output
    #[arg(long, value_name = "KBPS")]
    bitrate: Option<u32>,

    /// FLAC compression level (0-8)
    #[arg(long, value_name = "LEVEL", value_parser = clap::value_parser!(u8).range(0..=8))]
    compression_level: Option<u8>,

    /// Number of merges to run at once
    #[arg(long)]
    jobs: Option<usize>,

    /// Accept proposed tags without asking
    #[arg(short, long)]
    yes: bool,

    /// Show what would be merged without writing anything
    #[arg(long)]
    dry_run: bool,
}

impl ScanArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(mode) = self.group_by {
            settings.grouping_mode = mode;
        }
        if self.max_depth.is_some() {
            settings.max_depth = self.max_depth;
        }
        if self.all_files {
            settings.skip_hidden = false;
            settings.skip_merged_outputs = false;
        }
    }
}

impl MergeArgs {
    fn tag_edits(&self) -> TagEdits {
        let text = |value: &Option<String>| {
            value
                .as_deref()
                .map(TagEdit::from_answer)
                .unwrap_or_default()
        };
        let cover = match (&self.cover, self.no_cover) {
            (Some(path), _) => CoverEdit::File(path.clone()),
            (None, true) => CoverEdit::Clear,
            (None, false) => CoverEdit::Keep,
        };
        TagEdits {
            artist: text(&self.artist),
            album: text(&self.album),
            year: text(&self.year),
            genre: text(&self.genre),
            cover,
            compilation: self.compilation,
        }
    }
}

async fn scan(directory: &Path, settings: &Settings) -> Result<ScanReport> {
    let directory = directory.to_path_buf();
    let options = settings.scan_options();
    let report = tokio::task::spawn_blocking(move || scan_folder(&directory, &options))
        .await
        .context("scan task panicked")??;

    for skipped in &report.skipped {
        log::warn!("Skipped: {}", skipped);
    }
    if report.tag_failures > 0 {
        log::warn!("{} files had unreadable tags", report.tag_failures);
    }
    log::info!("Found {} audio files", report.tracks.len());
    Ok(report)
}

fn cmd_scan(directory: &Path, report: &ScanReport, settings: &Settings, json: bool) -> Result<()> {
    let groups = build_groups(&report.tracks, settings.grouping_mode);
    log::debug!("{} groups in {}", groups.len(), directory.display());
    let mut out = io::stdout().lock();
    if json {
        render_groups_json(&groups, &mut out)?;
    } else {
        render_groups(&groups, &mut out)?;
    }
    Ok(())
}

fn print_plan(jobs: &[MergeJob], options: &MergeOptions) {
    for job in jobs {
        let mode = EncodeMode::choose(job.tracks(), job.format, options);
        println!(
            "{} -> {} ({} tracks, {}, {:?})",
            job.group_label,
            job.output_path().display(),
            job.tracks().len(),
            format_duration(job.expected_duration()),
            mode
        );
        for (idx, track) in job.tracks().iter().enumerate() {
            println!("  {:>2}. {}", idx + 1, track.display_title());
        }
    }
}

async fn cmd_merge(args: &MergeArgs, mut settings: Settings) -> Result<()> {
    args.scan.apply(&mut settings);
    if let Some(format) = args.format {
        settings.output_format = format;
    }
    if args.bitrate.is_some() {
        settings.bitrate_kbps = args.bitrate;
    }
    if let Some(level) = args.compression_level {
        settings.flac_compression_level = level;
    }
    if let Some(jobs) = args.jobs {
        settings.max_parallel_jobs = jobs;
    }

    let report = scan(&args.directory, &settings).await?;
    let mut groups = build_groups(&report.tracks, settings.grouping_mode);

    if !args.groups.is_empty() {
        let unmatched = select_groups(&mut groups, &args.groups);
        if !unmatched.is_empty() {
            let known: Vec<&str> = groups.iter().map(|g| g.label.as_str()).collect();
            bail!(
                "No group matches {:?}. Groups found: {}",
                unmatched,
                known.join(", ")
            );
        }
    }
    for path in &args.excludes {
        if !exclude_track(&mut groups, path) {
            log::warn!("--exclude {} matched no scanned track", path.display());
        }
    }

    let jobs: Vec<MergeJob> = groups
        .iter()
        .filter(|g| g.is_included())
        .filter_map(|g| MergeJob::from_group(g).ok())
        .map(|job| job.with_format(settings.output_format))
        .collect();
    if jobs.is_empty() {
        bail!("Nothing to merge in {}", args.directory.display());
    }

    let preset = args.tag_edits();
    let mut skipped: Vec<JobReport> = Vec::new();
    let mut accepted: Vec<MergeJob> = Vec::with_capacity(jobs.len());
    let stdin = io::stdin();
    let mut input = stdin.lock();
    for mut job in jobs {
        job.transition(JobState::TagReview)?;
        let outcome = if args.yes || args.dry_run {
            ReviewOutcome::Accept(preset.clone())
        } else {
            review_tags(&job, &preset, &mut input, &mut io::stdout())?
        };
        match outcome {
            ReviewOutcome::Accept(edits) => {
                job.apply_edits(&edits);
                accepted.push(job);
            }
            ReviewOutcome::Cancel => {
                job.transition(JobState::Cancelled)?;
                skipped.push(JobReport::from_job(&job, 0, None));
            }
        }
    }
    drop(input);

    let options = MergeOptions::from(&settings);
    if args.dry_run {
        print_plan(&accepted, &options);
        return Ok(());
    }
    if accepted.is_empty() {
        render_summary(&skipped, &mut io::stdout())?;
        return Ok(());
    }

    let encoder = FfmpegEncoder::new(verify_ffmpeg(settings.ffmpeg_path.as_deref())?);
    log::debug!("Using ffmpeg at {}", encoder.ffmpeg_path().display());

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling merges");
            interrupt.cancel();
        }
    });

    let (tx, rx) = mpsc::unbounded_channel();
    let (mut reports, _) = tokio::join!(
        run_batch(accepted, &encoder, &options, settings.parallel_jobs(), tx, &cancel),
        render_events(rx, io::stdout())
    );
    reports.extend(skipped);

    render_summary(&reports, &mut io::stdout())?;

    let failed = reports
        .iter()
        .filter(|r| matches!(r.state, JobState::Failed(_)))
        .count();
    if failed > 0 {
        bail!("{} of {} merges failed", failed, reports.len());
    }
    Ok(())
}

fn cmd_config(init: bool, settings: &Settings) -> Result<()> {
    let path = Settings::path().map_err(anyhow::Error::msg)?;
    if init {
        if path.exists() {
            println!("Settings already exist at {}", path.display());
        } else {
            Settings::default()
                .save_to(&path)
                .map_err(anyhow::Error::msg)?;
            println!("Wrote default settings to {}", path.display());
        }
        return Ok(());
    }
    println!("# {}", path.display());
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}

fn cmd_inspect(file: &Path, json: bool) -> Result<()> {
    let chapters = read_chapters(file)
        .with_context(|| format!("Failed to read chapters from {}", file.display()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&chapters)?);
        return Ok(());
    }
    if chapters.is_empty() {
        println!("No chapters in {}", file.display());
    }
    for chapter in &chapters {
        println!(
            "{:>6} {} - {}  {}",
            chapter.element_id,
            format_duration(chapter.start_ms as f64 / 1000.0),
            format_duration(chapter.end_ms as f64 / 1000.0),
            chapter.title
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let mut settings = Settings::load();

    match &cli.command {
        Command::Scan {
            directory,
            scan: scan_args,
            json,
        } => {
            scan_args.apply(&mut settings);
            let report = scan(directory, &settings).await?;
            cmd_scan(directory, &report, &settings, *json)
        }
        Command::Merge(args) => cmd_merge(args, settings).await,
        Command::Config { init } => cmd_config(*init, &settings),
        Command::Inspect { file, json } => cmd_inspect(file, *json),
    }
}
