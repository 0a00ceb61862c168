//! increasevol - Batch audio volume booster for video files
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod inputs;
pub mod jobs;
pub mod summary;
