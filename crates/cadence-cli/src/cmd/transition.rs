//! `cad transition` — apply a workflow or risk transition.

use anyhow::{Result, bail};
use clap::Args;
use serde_json::json;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use cadence_core::machine::{risk, task};
use cadence_core::model::{ProjectId, RiskState, TaskId, TaskState};
use cadence_core::notify::LogSink;
use cadence_core::transition::TransitionRow;

use super::open_workspace_db;
use crate::output::{OutputMode, render};

/// Arguments for `cad transition`.
#[derive(Args, Debug)]
pub struct TransitionArgs {
    /// Acting user id, recorded in the transition metadata.
    #[arg(long)]
    user: i64,

    /// Task to transition (workflow state machine).
    #[arg(long, conflicts_with = "project")]
    task: Option<i64>,

    /// Project to transition (risk state machine).
    #[arg(long)]
    project: Option<i64>,

    /// Target state.
    #[arg(long)]
    state: String,
}

/// Execute `cad transition`.
pub fn run(args: &TransitionArgs, mode: OutputMode, root: &Path) -> Result<()> {
    let mut conn = open_workspace_db(root)?;
    let metadata = json!({"user_id": args.user});

    let row: TransitionRow = match (args.task, args.project) {
        (Some(task_id), None) => {
            let target = TaskState::from_str(&args.state)?;
            task::transition_task(&mut conn, TaskId(task_id), target, metadata, &LogSink)?
        }
        (None, Some(project_id)) => {
            let target = RiskState::from_str(&args.state)?;
            risk::transition_project_risk(
                &mut conn,
                ProjectId(project_id),
                target,
                metadata,
                &LogSink,
            )?
        }
        _ => bail!("exactly one of --task or --project is required"),
    };

    render(mode, &row, |row, w| {
        writeln!(
            w,
            "Transitioned to {} (sort key {})",
            row.to_state, row.sort_key
        )
    })
}
