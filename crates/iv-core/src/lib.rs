//! iv-core: shared types, IDs, errors, configuration, and job events.
//!
//! This crate is the foundational dependency for the other increasevol
//! crates, providing the typed job identifier, a unified error type, the job
//! state model, application configuration, and a broadcast event bus.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod job;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use job::*;
