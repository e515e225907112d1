//! Core utilities for the Vulkan renderer.
//!
//! This crate provides foundational types and utilities used across the renderer:
//! - Error types and result aliases
//! - Logging initialization
//! - Timer utilities
//! - Configuration management
//! - Asset path resolution

pub mod config;
mod error;
mod logging;
mod paths;
mod timer;

pub use config::{EngineConfig, PresentModeConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use paths::ResourcePaths;
pub use timer::Timer;
