//! Scheduler layer
//!
//! Background advancement of open pipelines, so plans progress without an
//! external caller driving `advance`.

pub mod poller;

pub use poller::AdvancePoller;
