//! Core system types and foundations
//!
//! This module contains configuration, error handling and logging setup shared
//! by every other part of the crate.

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used items
pub use config::{BackendKind, Config};
pub use error::{BackendError, Error, Result, SerializationError};
