//! Data Transfer Objects for the controller API
//!
//! Request and response bodies exchanged between the controller and its
//! clients (CLI, dashboards, scripts).

pub mod deploy;
pub mod execution;
pub mod job;
pub mod pipeline;
pub mod rule;
