//! Infrastructure layer module
//!
//! - Configuration management (figment layering)
//! - Logging (tracing subscriber setup)
//! - Crash-safe file persistence

pub mod config;
pub mod fs;
pub mod logging;
