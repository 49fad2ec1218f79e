//! Parse Reconciler
//!
//! Job status tracking and reparse reconciliation for a record parsing
//! pipeline. Inbound parse/reparse requests are driven to a terminal status
//! by the `ReparseOrchestrator`, which decides whether a reparse changed
//! anything, persists the parsed artifact and the status trail in Postgres,
//! reads raw records from an ordered set of S3-compatible providers, and
//! publishes statuses on a Redis channel.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
