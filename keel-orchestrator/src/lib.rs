//! Keel Orchestrator
//!
//! Control plane for database change pipelines.
//!
//! Architecture:
//! - Store: persistence of pipeline aggregates (Postgres or in-memory)
//! - Engine: task executor, stage runner and the pipeline state machine
//! - Scheduler: background advancement of open pipelines
//! - Bookmarks: user-scoped links served next to the pipeline API
//! - API: HTTP endpoints over all of the above

pub mod api;
pub mod bookmark;
pub mod config;
pub mod db;
pub mod engine;
pub mod scheduler;
pub mod store;
