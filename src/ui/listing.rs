//! Printing scanned groups

use std::io::{self, Write};

use crate::core::{format_duration, format_size, Group};

/// Write a numbered listing of groups and their tracks
///
/// Excluded tracks are marked with `-`, included ones with `+`.
pub fn render_groups<W: Write>(groups: &[Group], out: &mut W) -> io::Result<()> {
    if groups.is_empty() {
        writeln!(out, "No audio files found.")?;
        return Ok(());
    }

    for (idx, group) in groups.iter().enumerate() {
        let size: u64 = group.tracks().iter().map(|t| t.track.size).sum();
        writeln!(
            out,
            "[{}] {} ({} of {} tracks, {}, {})",
            idx + 1,
            group.label,
            group.included_count(),
            group.len(),
            format_duration(group.included_duration()),
            format_size(size)
        )?;
        if group.key != group.label {
            writeln!(out, "    key: {}", group.key)?;
        }
        for entry in group.tracks() {
            let marker = if entry.included { '+' } else { '-' };
            let number = entry
                .track
                .track_number
                .map(|n| format!("{:>2}", n))
                .unwrap_or_else(|| " ?".to_string());
            writeln!(
                out,
                "    {} {}. {} [{}] {}",
                marker,
                number,
                entry.track.display_title(),
                format_duration(entry.track.duration),
                entry.track.path.display()
            )?;
        }
    }
    Ok(())
}

/// Write groups as pretty JSON
pub fn render_groups_json<W: Write>(groups: &[Group], out: &mut W) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, groups)?;
    writeln!(out)
}
