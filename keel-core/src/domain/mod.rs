//! Core domain types
//!
//! This module contains the core domain structures used across Keel crates.
//! These types are shared between the orchestrator (persists and drives them),
//! the drivers (execute task payloads) and the client (displays them).

pub mod bookmark;
pub mod engine;
pub mod pipeline;
pub mod role;
pub mod stage;
pub mod task;
