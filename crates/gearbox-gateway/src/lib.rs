//! Job trigger gateway.
//!
//! Wraps the platform's job system with three operations every component
//! builds on: start a named gear, poll it to a terminal state under a caller
//! deadline, and probe whether a gear is already active at a destination.
//! The gateway never retries; retry policy belongs to its callers.

pub mod gateway;
pub mod poll;

pub use gateway::JobGateway;
pub use poll::PollPolicy;
