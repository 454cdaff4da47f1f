//! Multiserver Common Library
//!
//! Shared types, lifecycle state, persistence and configuration for the
//! multiserver control panel.

pub mod artifacts;
pub mod config;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use artifacts::ArtifactStore;
pub use config::{Config, FailurePolicy};
pub use db::Database;
pub use error::{Error, Result};
pub use lifecycle::{Action, ServiceState, Transition};
pub use types::*;

/// Multiserver version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default store path
pub fn default_store_path() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".multiserver")
}

/// Default configuration file path
pub fn default_config_path() -> std::path::PathBuf {
    default_store_path().join("config.toml")
}

/// Home directory helper
mod dirs {
    pub fn home_dir() -> Option<std::path::PathBuf> {
        std::env::var_os("HOME").map(std::path::PathBuf::from)
    }
}
