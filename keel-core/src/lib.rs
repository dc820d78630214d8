//! Keel Core
//!
//! Core types and abstractions for the Keel database change control plane.
//!
//! This crate contains:
//! - Domain types: Core business entities (Pipeline, Stage, Task, etc.)
//! - DTOs: Data transfer objects for the API boundary

pub mod domain;
pub mod dto;
