//! Submission dispatcher.
//!
//! Routes an arriving file to the first pipeline whose tags and extensions
//! match, refuses to start a pipeline that is already active at the file's
//! destination, resolves the starting gear's inputs and launches it.

pub mod dispatcher;
pub mod locator;
pub mod router;

pub use dispatcher::{DispatchOutcome, Dispatcher, DispatcherOptions, StartedPipeline};
pub use locator::{InputResolver, UnresolvedInput};
pub use router::{PipelineRouter, RouteMatch};
