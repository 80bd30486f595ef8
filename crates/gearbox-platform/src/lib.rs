//! Container platform adapters.
//!
//! [`HttpPlatform`] talks to the platform's REST API. [`MemoryPlatform`] keeps
//! everything in process with scripted job outcomes, for tests and local
//! rehearsal of a configuration.

pub mod config;
pub mod http;
pub mod memory;

pub use config::PlatformConfig;
pub use http::HttpPlatform;
pub use memory::{MemoryPlatform, ScriptedJob};
