//! Core utilities for the frames-in-flight renderer.
//!
//! This crate provides foundational types and utilities used across the renderer:
//! - Error types and result aliases
//! - Logging initialization
//! - Configuration management

mod config;
mod error;
mod logging;

pub use config::{RendererConfig, Winding};
pub use error::{Error, Result};
pub use logging::init_logging;
