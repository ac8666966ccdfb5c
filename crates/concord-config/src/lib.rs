//! Configuration system for the Concord memory store.
//!
//! Provides TOML-based configuration with:
//! - `[store]`, `[embedding]`, `[working]`, `[decay]`, `[procedural]` and
//!   `[recall]` sections, each optional with documented defaults
//! - `[[agents]]` entries that replace the built-in agent seed
//! - Config file layering (XDG user config, project-local, explicit path)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, default_database_path, load_config, load_config_file,
    load_config_with_options, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
