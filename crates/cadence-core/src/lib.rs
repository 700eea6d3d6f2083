//! cadence-core library.
//!
//! Core domain for the cadence tracker: the SQLite store, the ownership
//! hierarchy, the two state machines with their append-only transition
//! logs, the audit trail, and the flow analytics derived from it.
//!
//! # Conventions
//!
//! - **Errors**: typed [`error::CoreError`] inside the core;
//!   `anyhow::Result` at CLI/server boundaries.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `error!`, `debug!`).
//! - **Time**: integer microseconds since the Unix epoch (`*_us`).

pub mod audit;
pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod estimate;
pub mod flow;
pub mod machine;
pub mod model;
pub mod notify;
pub mod report;
pub mod store;
pub mod transition;

pub use error::{CoreError, CoreResult, ErrorCode};
