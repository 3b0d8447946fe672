//! Slipway Core
//!
//! Core types and abstractions for the Slipway CI/CD controller.
//!
//! This crate contains:
//! - Domain types: Core business entities (Pipeline, BuildJob, PipelineExecution, rollouts)
//! - DTOs: Data transfer objects exchanged over the controller's HTTP API

pub mod domain;
pub mod dto;
