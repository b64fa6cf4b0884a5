//! Interactive tag review on the terminal
//!
//! For each field the proposed value is shown in brackets. An empty answer
//! keeps it, `-` clears it, anything else replaces it. The final question
//! confirms the merge; answering no cancels the job.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use crate::core::{AlbumTags, CoverEdit, CoverSource, MergeJob, TagEdit, TagEdits};

/// Outcome of reviewing one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    Accept(TagEdits),
    Cancel,
}

fn ask<R: BufRead, W: Write>(input: &mut R, out: &mut W, question: &str) -> io::Result<String> {
    write!(out, "{}", question)?;
    out.flush()?;
    let mut answer = String::new();
    if input.read_line(&mut answer)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "input closed during tag review",
        ));
    }
    Ok(answer.trim().to_string())
}

fn ask_field<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    name: &str,
    current: &str,
) -> io::Result<TagEdit> {
    let answer = ask(input, out, &format!("  {:<12} [{}]: ", name, current))?;
    Ok(TagEdit::from_answer(&answer))
}

fn describe_cover(cover: &Option<CoverSource>) -> String {
    match cover {
        None => "none".to_string(),
        Some(CoverSource::Embedded(path)) => format!("embedded in {}", path.display()),
        Some(CoverSource::File(path)) => path.display().to_string(),
    }
}

fn yes_no(answer: &str, default: bool) -> Option<bool> {
    match answer.to_lowercase().as_str() {
        "" => Some(default),
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Ask until a yes/no answer is given
fn ask_yes_no<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    question: &str,
    default: bool,
) -> io::Result<bool> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    loop {
        let answer = ask(input, out, &format!("{} {}: ", question, hint))?;
        match yes_no(&answer, default) {
            Some(value) => return Ok(value),
            None => writeln!(out, "  Please answer y or n.")?,
        }
    }
}

/// Review the proposed tags of `job`, returning the operator's edits
///
/// `preset` holds edits already given on the command line; they are applied
/// before the questions so the prompts show them as the current values.
pub fn review_tags<R: BufRead, W: Write>(
    job: &MergeJob,
    preset: &TagEdits,
    input: &mut R,
    out: &mut W,
) -> io::Result<ReviewOutcome> {
    let mut tags: AlbumTags = job.tags.clone();
    tags.apply(preset);

    writeln!(
        out,
        "\nGroup '{}' ({} tracks)",
        job.group_label,
        job.tracks().len()
    )?;
    writeln!(out, "  Enter keeps a value, '-' clears it.")?;

    let mut edits = preset.clone();

    for (name, current, slot) in [
        ("Artist", tags.artist.clone(), &mut edits.artist),
        ("Album", tags.album.clone(), &mut edits.album),
        ("Year", tags.year.clone(), &mut edits.year),
        ("Genre", tags.genre.clone(), &mut edits.genre),
    ] {
        let edit = ask_field(input, out, name, &current)?;
        if edit != TagEdit::Keep {
            *slot = edit;
        }
    }

    let answer = ask(
        input,
        out,
        &format!("  {:<12} [{}]: ", "Cover image", describe_cover(&tags.cover)),
    )?;
    match answer.as_str() {
        "" => {}
        "-" => edits.cover = CoverEdit::Clear,
        path => edits.cover = CoverEdit::File(PathBuf::from(path)),
    }

    let compilation = ask_yes_no(input, out, "  Compilation ", tags.compilation)?;
    if compilation != tags.compilation {
        edits.compilation = Some(compilation);
    }

    let mut preview = job.clone();
    preview.apply_edits(&edits);
    let confirmed = ask_yes_no(
        input,
        out,
        &format!("Merge into {}?", preview.output_path().display()),
        true,
    )?;

    Ok(if confirmed {
        ReviewOutcome::Accept(edits)
    } else {
        ReviewOutcome::Cancel
    })
}
