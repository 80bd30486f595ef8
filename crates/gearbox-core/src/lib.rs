//! Gearbox Core
//!
//! Domain types, configuration formats, port traits, and error handling for
//! the gear pipeline orchestration core. Every other crate in the workspace
//! speaks this vocabulary; adapters implement the traits in [`ports`].

pub mod batch;
pub mod config;
pub mod error;
pub mod file;
pub mod ids;
pub mod interpolation;
pub mod job;
pub mod notification;
pub mod pipeline;
pub mod ports;
pub mod provenance;
pub mod visit;
pub mod work_unit;

pub use error::{DispatchError, Error, Result};
pub use ids::*;
