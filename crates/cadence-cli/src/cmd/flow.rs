//! `cad flow` — analytics derived from the transition log.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use cadence_core::flow::{
    self, StateDuration, TaskSelection, UserCycleTime, UserStateDuration,
};
use cadence_core::model::{ProjectId, TaskState};

use super::open_workspace_db;
use crate::output::{OutputMode, format_duration_us, render};

/// Arguments for `cad flow`.
#[derive(Args, Debug)]
pub struct FlowArgs {
    /// Restrict the walk to one project's tasks.
    #[arg(long)]
    project: Option<i64>,

    /// Split durations by the acting user.
    #[arg(long)]
    per_user: bool,

    /// Report per-user cycle times instead of state durations.
    #[arg(long)]
    cycle: bool,

    /// Cycle start state.
    #[arg(long, default_value = "in_progress")]
    start_state: String,

    /// Cycle end state.
    #[arg(long, default_value = "done")]
    end_state: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum FlowReport {
    States(Vec<StateDuration>),
    UserStates(Vec<UserStateDuration>),
    Cycles(Vec<UserCycleTime>),
}

/// Execute `cad flow`.
pub fn run(args: &FlowArgs, mode: OutputMode, root: &Path) -> Result<()> {
    let conn = open_workspace_db(root)?;
    let selection = args
        .project
        .map_or(TaskSelection::All, |id| TaskSelection::Project(ProjectId(id)));

    let report = if args.cycle {
        let start = TaskState::from_str(&args.start_state)?;
        let end = TaskState::from_str(&args.end_state)?;
        FlowReport::Cycles(flow::per_user_cycle_times(&conn, &selection, start, end)?)
    } else if args.per_user {
        FlowReport::UserStates(flow::per_user_state_durations(&conn, &selection)?)
    } else {
        FlowReport::States(flow::state_durations(&conn, &selection)?)
    };

    render(mode, &report, |report, w| render_human(report, w))
}

fn render_human(report: &FlowReport, w: &mut dyn Write) -> std::io::Result<()> {
    match report {
        FlowReport::States(stats) => {
            if stats.is_empty() {
                return writeln!(w, "No state durations recorded.");
            }
            writeln!(w, "{:<14} {:>6} {:>10} {:>10} {:>10}", "state", "count", "avg", "min", "max")?;
            for stat in stats {
                writeln!(
                    w,
                    "{:<14} {:>6} {:>10} {:>10} {:>10}",
                    stat.state,
                    stat.count,
                    format_duration_us(stat.avg_us),
                    format_duration_us(stat.min_us),
                    format_duration_us(stat.max_us)
                )?;
            }
            Ok(())
        }
        FlowReport::UserStates(stats) => {
            if stats.is_empty() {
                return writeln!(w, "No per-user durations recorded.");
            }
            writeln!(
                w,
                "{:<8} {:<14} {:>6} {:>10} {:>10} {:>10}",
                "user", "state", "count", "avg", "min", "max"
            )?;
            for stat in stats {
                writeln!(
                    w,
                    "{:<8} {:<14} {:>6} {:>10} {:>10} {:>10}",
                    stat.user_id,
                    stat.state,
                    stat.count,
                    format_duration_us(stat.avg_us),
                    format_duration_us(stat.min_us),
                    format_duration_us(stat.max_us)
                )?;
            }
            Ok(())
        }
        FlowReport::Cycles(stats) => {
            if stats.is_empty() {
                return writeln!(w, "No cycle times recorded.");
            }
            writeln!(
                w,
                "{:<8} {:>6} {:>10} {:>10} {:>10} {:>10}",
                "user", "count", "avg", "median", "min", "max"
            )?;
            for stat in stats {
                writeln!(
                    w,
                    "{:<8} {:>6} {:>10} {:>10} {:>10} {:>10}",
                    stat.user_id,
                    stat.count,
                    format_duration_us(stat.avg_us),
                    format_duration_us(stat.median_us),
                    format_duration_us(stat.min_us),
                    format_duration_us(stat.max_us)
                )?;
            }
            Ok(())
        }
    }
}
