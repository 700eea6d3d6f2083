//! Typed persistence layer over the SQLite store.
//!
//! Write functions own their transaction (`BEGIN IMMEDIATE`), record audit
//! versions inline, and carry the explicit estimate-rollup reconciliation
//! where the contract requires it. Read functions take `&Connection` and
//! never mutate.

pub mod children;
pub mod parties;
pub mod projects;
pub mod scopes;
pub mod tasks;
