//! Visit QC coordinator.
//!
//! Evaluates a participant's visits for one module in date order, one QC job
//! at a time. A failing or in-review visit holds back every later visit of a
//! longitudinal module until it is resolved. The chain is rebuilt from the
//! platform on every invocation; nothing is cached between runs.

pub mod chain;
pub mod coordinator;
pub mod module_config;

pub use chain::VisitChain;
pub use coordinator::{
    ChainReport, ParticipantFailure, QcCoordinator, QcOptions, QcTrigger, SweepReport,
    VisitEvaluation,
};
pub use module_config::{ModuleConfig, ModuleConfigs};
