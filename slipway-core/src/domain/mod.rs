//! Core domain types
//!
//! This module contains the core domain structures used across Slipway crates.
//! The controller owns and mutates them; the client and CLI only read them.

pub mod event;
pub mod execution;
pub mod job;
pub mod log;
pub mod pipeline;
pub mod rollout;
pub mod webhook;
