//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `~/.config/concord/concord.toml` (XDG user config)
//! 2. `./concord.toml` (project-local)
//! 3. An explicit `--config` path

use std::path::{Path, PathBuf};

use crate::{ConcordConfig, ConfigError, Result};

/// Config filename, both in the user config dir and project-local.
const CONFIG_FILE: &str = "concord.toml";

/// Application name for XDG directory resolution.
const APP_NAME: &str = "concord";

/// Database filename within the data directory.
const DATABASE_FILE: &str = "memory.db";

/// Environment variable to override the config directory.
const CONFIG_DIR_ENV: &str = "CONCORD_CONFIG_DIR";

/// Tracks where each config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged, validated configuration.
    pub config: ConcordConfig,
    /// Sources that were checked, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Warnings generated during loading (unreadable layers, plaintext keys).
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Discover and merge config layers, then apply `explicit` on top.
///
/// A missing or broken discovered layer is a warning; a missing or broken
/// explicit file is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(explicit, None, None)
}

/// Load configuration with explicit control over the searched directories.
///
/// `config_dir` overrides both `CONCORD_CONFIG_DIR` and the platform
/// default; `project_dir` replaces the current directory.
pub fn load_config_with_options(
    explicit: Option<&Path>,
    config_dir: Option<&Path>,
    project_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = ConcordConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    let user_path = match config_dir {
        Some(dir) => Some(dir.join(CONFIG_FILE)),
        None => xdg_config_path(),
    };
    if let Some(path) = user_path {
        sources.push(load_layer(&mut config, &path, &mut warnings));
    }

    let project_path = project_dir
        .map(|d| d.join(CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path, &mut warnings));

    if let Some(path) = explicit {
        config.merge(load_config_file(path)?);
        sources.push(ConfigSource {
            path: path.to_path_buf(),
            loaded: true,
        });
    }

    config.validate()?;
    check_plaintext_keys(&config, &mut warnings);

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Load config from a specific file path (no discovery, no validation).
pub fn load_config_file(path: &Path) -> Result<ConcordConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    ConcordConfig::from_toml(&contents)
}

/// Path of the user config file.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(CONFIG_FILE))
}

/// The user config directory for concord.
///
/// Checks `CONCORD_CONFIG_DIR` first, then falls back to the platform default.
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Where the CLI keeps its database when none is configured.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(APP_NAME).join(DATABASE_FILE))
}

fn load_layer(config: &mut ConcordConfig, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    if !path.is_file() {
        return ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        };
    }

    let loaded = match load_config_file(path) {
        Ok(layer) => {
            config.merge(layer);
            true
        }
        Err(e) => {
            warnings.push(format!("Failed to load {}: {}", path.display(), e));
            false
        }
    };
    ConfigSource {
        path: path.to_path_buf(),
        loaded,
    }
}

fn check_plaintext_keys(config: &ConcordConfig, warnings: &mut Vec<String>) {
    if config.embedding().api_key.is_some() {
        warnings.push(
            "[embedding] contains a plaintext API key. \
             Consider setting it through the variable named by api_key_env instead."
                .to_string(),
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_xdg_config_path_shape() {
        if let Some(p) = xdg_config_path() {
            assert!(p.ends_with("concord.toml"));
        }
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config_file(Path::new("/nonexistent/concord.toml"));
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_no_files_gives_defaults() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let loaded = load_config_with_options(None, Some(user.path()), Some(project.path())).unwrap();
        assert!(loaded.loaded_from().is_empty());
        assert_eq!(loaded.config.recall().default_limit, 5);
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn test_layers_merge_in_order() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let explicit_dir = TempDir::new().unwrap();

        fs::write(
            user.path().join("concord.toml"),
            "[working]\nmax_slots = 10\n\n[recall]\ndefault_limit = 2\n",
        )
        .unwrap();
        fs::write(project.path().join("concord.toml"), "[recall]\ndefault_limit = 4\n").unwrap();
        let explicit = explicit_dir.path().join("custom.toml");
        fs::write(&explicit, "[embedding]\ndimensions = 64\n").unwrap();

        let loaded = load_config_with_options(
            Some(&explicit),
            Some(user.path()),
            Some(project.path()),
        )
        .unwrap();
        assert_eq!(loaded.loaded_from().len(), 3);
        assert_eq!(loaded.config.working().max_slots, 10);
        assert_eq!(loaded.config.recall().default_limit, 4);
        assert_eq!(loaded.config.embedding().dimensions, Some(64));
    }

    #[test]
    fn test_broken_discovered_layer_warns() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::write(user.path().join("concord.toml"), "not [valid toml").unwrap();

        let loaded = load_config_with_options(None, Some(user.path()), Some(project.path())).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.loaded_from().is_empty());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let user = TempDir::new().unwrap();
        let result = load_config_with_options(
            Some(Path::new("/nonexistent/custom.toml")),
            Some(user.path()),
            Some(user.path()),
        );
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_invalid_values_fail_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[decay]\ndecay_rate = -0.5\n").unwrap();
        let result = load_config_with_options(Some(&path), Some(dir.path()), Some(dir.path()));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_plaintext_key_warning() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keys.toml");
        fs::write(&path, "[embedding]\nprovider = \"openai\"\napi_key = \"sk-secret\"\n").unwrap();
        let loaded = load_config_with_options(Some(&path), Some(dir.path()), Some(dir.path())).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains("plaintext"));
    }
}
