//! Shared utilities for the correlation engine
//!
//! This crate provides common functionality used across the workspace,
//! including logging setup and engine configuration.

pub mod config;
pub mod logging;

pub use config::{ConfigError, EngineConfig};
pub use logging::init_tracing;
