//! Configuration system for the Assay analysis pipeline.
//!
//! Provides TOML-based configuration with:
//! - `[server]` HTTP bind address and request handling limits
//! - `[storage]` data directory and SQLite database location
//! - `[pipeline]` step resolution, interpreters, and workspace conventions
//! - Config file layering (user config dir + project-local overrides)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, user_config_dir,
    user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
