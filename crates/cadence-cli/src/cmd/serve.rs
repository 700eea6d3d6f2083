//! `cad serve` — run the MCP server over stdio.

use anyhow::Result;
use clap::Args;
use std::path::Path;

use cadence_core::auth::MembershipGate;
use cadence_core::config::Config;
use cadence_core::notify::{LogSink, NoopSink, NotificationSink};
use cadence_mcp::McpServer;

use super::open_workspace_db;

/// Arguments for `cad serve`.
#[derive(Args, Debug, Default)]
pub struct ServeArgs {}

/// Execute `cad serve`. Blocks until stdin reaches EOF.
pub fn run(_args: &ServeArgs, root: &Path) -> Result<()> {
    let config = Config::load(root)?;
    let conn = open_workspace_db(root)?;

    let sink: Box<dyn NotificationSink> = if config.notify.log_transitions {
        Box::new(LogSink)
    } else {
        Box::new(NoopSink)
    };

    let mut server = McpServer::new(conn, Box::new(MembershipGate), sink);
    tracing::info!("serving MCP over stdio");
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    server.serve(stdin.lock(), stdout.lock())
}
