//! `cad changes` — audit-trail queries from the terminal.

use anyhow::{Context, Result};
use clap::Args;
use std::io::Write;
use std::path::Path;

use cadence_core::audit::query::{TimeWindow, list_changes};
use cadence_core::audit::render::render_listing;
use cadence_core::clock::now_us;
use cadence_core::model::{TeamId, UserId};

use super::open_workspace_db;
use crate::output::{OutputMode, render};

const DAY_US: i64 = 86_400_000_000;

/// Arguments for `cad changes`.
#[derive(Args, Debug)]
pub struct ChangesArgs {
    /// Acting user id.
    #[arg(long)]
    user: i64,

    /// Scope to a team (requires association with the team or its org).
    #[arg(long)]
    team: Option<i64>,

    /// Window start, ISO 8601 (defaults to 24 hours ago).
    #[arg(long)]
    start: Option<String>,

    /// Window end, ISO 8601 (defaults to now).
    #[arg(long)]
    end: Option<String>,

    /// Maximum number of changes to return.
    #[arg(long, default_value_t = 100)]
    limit: usize,
}

fn parse_iso(raw: &str) -> Result<i64> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.timestamp_micros())
        .with_context(|| format!("invalid ISO 8601 datetime: '{raw}'"))
}

/// Execute `cad changes`.
pub fn run(args: &ChangesArgs, mode: OutputMode, root: &Path) -> Result<()> {
    let conn = open_workspace_db(root)?;

    let end_us = match &args.end {
        Some(raw) => parse_iso(raw)?,
        None => now_us(),
    };
    let start_us = match &args.start {
        Some(raw) => parse_iso(raw)?,
        None => end_us - DAY_US,
    };
    let window = TimeWindow::new(start_us, end_us)?;

    let listing = list_changes(
        &conn,
        UserId(args.user),
        window,
        args.team.map(TeamId),
        args.limit,
    )?;

    render(mode, &listing, |listing, w| {
        writeln!(w, "{}", render_listing(listing))
    })
}
