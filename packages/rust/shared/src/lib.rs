//! Shared types, error model, and configuration for zivi.
//!
//! This crate is the foundation depended on by all other zivi crates.
//! It provides:
//! - [`ZiviError`]: the unified error type
//! - Domain types ([`Locale`], [`Language`], [`OutputFormat`])
//! - Configuration ([`AppConfig`], [`PacingConfig`], [`RowConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ApiConfig, AppConfig, CountryDefaults, DefaultsConfig, PacingConfig, PacingSettings,
    RowConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    resolve_token,
};
pub use error::{Result, ZiviError};
pub use types::{Language, Locale, OutputFormat};
