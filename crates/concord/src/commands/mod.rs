//! CLI command handlers.

pub mod agents;
pub mod maintain;
pub mod memory;
pub mod procedures;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use serde::Serialize;

use concord_config::ConcordConfig;
use concord_store::SharedStore;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration.
    pub config: ConcordConfig,
    /// Database path given on the command line.
    pub database: Option<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// The database the store opens: `--database`, then `store.database`,
    /// then the platform data directory.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database
            .clone()
            .or_else(|| self.config.store().database_path())
            .or_else(concord_config::default_database_path)
    }

    /// Open the persistent store.
    pub fn open_store(&self) -> Result<SharedStore> {
        let mut config = self.config.clone();
        let mut store = config.store();
        store.database = Some(
            self.database_path()
                .context("No database path: pass --database or set store.database")?,
        );
        config.store = Some(store);
        Ok(SharedStore::from_config(&config)?)
    }
}

pub(crate) fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    let line = s.lines().next().unwrap_or_default();
    if line.chars().count() <= max {
        line.to_string()
    } else {
        let cut: String = line.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer line here", 10), "a longe...");
        assert_eq!(truncate("first\nsecond", 20), "first");
    }

    #[test]
    fn test_cli_database_wins() {
        let ctx = Context {
            config: ConcordConfig::from_toml("[store]\ndatabase = \"/tmp/from-config.db\"")
                .unwrap(),
            database: Some(PathBuf::from("/tmp/from-flag.db")),
            json_output: false,
            verbose: false,
        };
        assert_eq!(ctx.database_path(), Some(PathBuf::from("/tmp/from-flag.db")));

        let ctx = Context {
            database: None,
            ..ctx
        };
        assert_eq!(ctx.database_path(), Some(PathBuf::from("/tmp/from-config.db")));
    }
}
