//! `cad init` — create the workspace directory, config, and database.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use cadence_core::config::Config;
use cadence_core::db;

use crate::output::{OutputMode, render};

/// Arguments for `cad init`.
#[derive(Args, Debug, Default)]
pub struct InitArgs {}

#[derive(Debug, Serialize)]
struct InitReport {
    root: String,
    database: String,
    schema_version: u32,
}

/// Execute `cad init`.
pub fn run(_args: &InitArgs, mode: OutputMode, root: &Path) -> Result<()> {
    let config = Config::load(root)?;
    config.save(root)?;

    let db_path = config.db_path(root);
    let conn = db::open(&db_path)?;
    let schema_version = db::migrations::current_schema_version(&conn)?;

    let report = InitReport {
        root: root.display().to_string(),
        database: db_path.display().to_string(),
        schema_version,
    };
    render(mode, &report, |report, w| {
        writeln!(w, "Initialized cadence workspace at {}", report.root)?;
        writeln!(w, "Database: {}", report.database)?;
        writeln!(w, "Schema version: {}", report.schema_version)
    })
}
