//! Domain layer for the rpg-forge generation engine
//!
//! This module contains the plan graph, the persisted generation state, and
//! the collaborator ports the services depend on.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
