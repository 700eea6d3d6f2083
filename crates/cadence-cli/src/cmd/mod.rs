//! Command handlers.

pub mod changes;
pub mod flow;
pub mod init;
pub mod serve;
pub mod transition;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

use cadence_core::config::Config;
use cadence_core::db;

/// Open the workspace database under `root` per its config.
pub fn open_workspace_db(root: &Path) -> Result<Connection> {
    let config = Config::load(root).context("load workspace config")?;
    let path = config.db_path(root);
    anyhow::ensure!(
        path.exists(),
        "no cadence workspace at {} (run `cad init` first)",
        root.display()
    );
    db::open(&path)
}
