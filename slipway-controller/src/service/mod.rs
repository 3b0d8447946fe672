//! Service Module
//!
//! Business logic layer for the controller.
//! Services orchestrate between repositories, the cluster adapters and the
//! event bus, and contain the domain logic.

pub mod autodeploy;
pub mod builder;
pub mod events;
pub mod executor;
pub mod pattern;
pub mod pipeline;
pub mod queue;
pub mod rollout;
pub mod trigger;
pub mod webhook;

pub use autodeploy::AutoDeployer;
pub use builder::ImageBuilder;
pub use events::EventBus;
pub use executor::PipelineExecutor;
pub use queue::BuildQueue;
pub use rollout::RolloutController;
pub use trigger::TriggerRouter;

// Re-export for convenience
pub use pipeline as pipeline_service;
