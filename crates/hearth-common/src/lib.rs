//! Common utilities for the hearth automation engine.
//!
//! This crate provides the unified error type shared across the workspace.

pub mod error;

pub use error::{HearthError, Result};
