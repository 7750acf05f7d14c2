//! Shared utilities for Coffer: logging setup, file classification, helpers.
//!
//! This crate provides common infrastructure used across all Coffer components.

#![forbid(unsafe_code)]

pub mod category;
pub mod helpers;

pub use category::{determine_file_category, FileCategory};

/// Initialize tracing with sensible defaults.
///
/// Log level is controlled by the `RUST_LOG` environment variable.
/// Defaults to `info` if not set.
pub fn init_tracing() {
    init_tracing_with_default("info");
}

/// Initialize tracing with a specific default level.
pub fn init_tracing_with_default(default_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
