//! Scheduler layer for the controller
//!
//! Background loops that drive the build queue: the dispatcher starts
//! queued jobs as capacity frees up, and the sweeper enforces retention on
//! finished jobs and execution history.

pub mod dispatcher;
pub mod sweeper;

pub use dispatcher::Dispatcher;
pub use sweeper::Sweeper;
