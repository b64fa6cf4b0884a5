//! UI module - terminal presentation
//!
//! - `listing` - printing scanned groups (text or JSON)
//! - `prompt` - interactive tag review
//! - `progress` - merge progress and the final summary

pub mod listing;
pub mod progress;
pub mod prompt;

pub use listing::{render_groups, render_groups_json};
pub use progress::{render_events, render_summary, ProgressRenderer};
pub use prompt::{review_tags, ReviewOutcome};
