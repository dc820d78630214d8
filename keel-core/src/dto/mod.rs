//! Data Transfer Objects for the API boundary
//!
//! DTOs are the request and response shapes exchanged between the
//! orchestrator API and its clients.

pub mod bookmark;
pub mod driver;
pub mod pipeline;
