//! AI-assisted report drafting boundary.
//!
//! The core supplies the activity summary (the audit listing rendered over
//! a computed window) and consumes a string from the text-generation
//! collaborator. "Nothing to summarize" is a recognized condition distinct
//! from hard failures, so callers can fall back to a blank template
//! instead of showing an error.

use rusqlite::Connection;
use tracing::error;

use crate::audit::query::{self, TimeWindow};
use crate::audit::render;
use crate::error::CoreError;
use crate::model::UserId;

/// Text-generation collaborator: given a system prompt and a user prompt,
/// return drafted report text.
pub trait TextGenerator {
    /// # Errors
    ///
    /// Returns an error when generation fails; the service wraps it as
    /// [`DraftError::Generation`].
    fn draft(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String>;
}

/// Draft-generation failures.
#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    /// Nothing to summarize in the window; render a blank template.
    #[error("no recent activity found")]
    NoActivity,

    #[error(transparent)]
    Core(#[from] CoreError),

    /// The text-generation collaborator failed.
    #[error("draft generation failed: {0}")]
    Generation(String),
}

const SYSTEM_PROMPT: &str =
    "You are an assistant that writes concise, action-focused Dev Team Daily reports in markdown.";

const DEFAULT_TEMPLATE: &str = "\
*My Vibe:*

*_Yesterday's Wins (Completed Tasks):_*
* :white_check_mark: ``

*_Today's Focus & Status:_*
:large_green_circle: *_Main Focus_* ( )
* :hammer: ``
* :soon: ``

*_Blockers / @Mentions:_*
* :construction: ``
";

/// Headers-only fallback used when there is no recent activity or the
/// user cancels drafting.
#[must_use]
pub const fn blank_template() -> &'static str {
    DEFAULT_TEMPLATE
}

/// Whether an activity summary means "nothing happened".
#[must_use]
pub fn no_activity(activity_text: &str) -> bool {
    let trimmed = activity_text.trim();
    trimmed.is_empty() || trimmed.starts_with("No changes found")
}

/// Assemble the activity summary for `actor` and draft a report through
/// the generator.
///
/// # Errors
///
/// [`DraftError::NoActivity`] when the window holds nothing to summarize;
/// [`DraftError::Core`] when the audit query fails;
/// [`DraftError::Generation`] when the collaborator fails.
pub fn generate(
    conn: &Connection,
    actor: UserId,
    window: TimeWindow,
    previous_report: Option<&str>,
    generator: &dyn TextGenerator,
) -> Result<String, DraftError> {
    let listing = query::list_changes(conn, actor, window, None, 200)?;
    let activity_text = render::render_listing(&listing);

    if no_activity(&activity_text) {
        return Err(DraftError::NoActivity);
    }

    let prompt = build_prompt(&activity_text, previous_report.unwrap_or(""));
    generator.draft(SYSTEM_PROMPT, &prompt).map_err(|err| {
        error!("report draft generation failed: {err:#}");
        DraftError::Generation(err.to_string())
    })
}

fn build_prompt(activity_text: &str, previous_report_text: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str("Draft a daily report from the following activity log.\n\n");
    prompt.push_str("## Template\n\n");
    prompt.push_str(DEFAULT_TEMPLATE);
    if !previous_report_text.is_empty() {
        prompt.push_str("\n## Previous report\n\n");
        prompt.push_str(previous_report_text);
    }
    prompt.push_str("\n## Activity\n\n");
    prompt.push_str(activity_text);
    prompt
}
