//! cadence-mcp: the JSON-RPC (MCP) tool surface.
//!
//! Speaks JSON-RPC 2.0 over stdin/stdout, one message per line. Tools
//! dispatch into `cadence-core` with the acting user passed explicitly on
//! every call — there is no ambient per-request actor state anywhere.

#![forbid(unsafe_code)]

mod server;
pub mod tools;

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use cadence_core::auth::Gate;
use cadence_core::notify::NotificationSink;

/// Protocol version baseline echoed back to clients that do not declare one.
pub const MCP_VERSION: &str = "2024-11-05";

/// Server name advertised during `initialize`.
pub const SERVER_NAME: &str = "cadence-mcp";

/// An incoming JSON-RPC request or notification.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// Build a JSON-RPC success response.
#[must_use]
pub fn json_rpc_response(id: Option<Value>, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id.unwrap_or(Value::Null),
        "result": result,
    })
}

/// Build a JSON-RPC error response.
#[must_use]
pub fn json_rpc_error(id: Option<Value>, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id.unwrap_or(Value::Null),
        "error": { "code": code, "message": message },
    })
}

/// The MCP server: one database connection, one gate, one sink.
pub struct McpServer {
    pub(crate) conn: Connection,
    pub(crate) gate: Box<dyn Gate>,
    pub(crate) sink: Box<dyn NotificationSink>,
    pub(crate) initialized: bool,
}

impl McpServer {
    /// Build a server over an open database connection.
    #[must_use]
    pub fn new(conn: Connection, gate: Box<dyn Gate>, sink: Box<dyn NotificationSink>) -> Self {
        Self {
            conn,
            gate,
            sink,
            initialized: false,
        }
    }

    /// Borrow the underlying database connection (read paths, tests).
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Handle one raw input line. Returns `None` for notifications and
    /// unparseable blank lines.
    pub fn handle_line(&mut self, line: &str) -> Option<Value> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(request) => self.handle(request),
            Err(err) => {
                warn!("unparseable JSON-RPC line: {err}");
                Some(json_rpc_error(None, -32700, "Parse error"))
            }
        }
    }

    /// Serve requests line by line until EOF.
    ///
    /// # Errors
    ///
    /// Returns an error when stdin/stdout I/O fails.
    pub fn serve(&mut self, reader: impl BufRead, mut writer: impl Write) -> Result<()> {
        for line in reader.lines() {
            let line = line.context("read request line")?;
            if let Some(response) = self.handle_line(&line) {
                serde_json::to_writer(&mut writer, &response).context("write response")?;
                writer.write_all(b"\n").context("write newline")?;
                writer.flush().context("flush response")?;
            }
            debug!("request handled");
        }
        Ok(())
    }
}
