//! Configuration for lendkeeper
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{LendError, Result};

/// Main configuration for a lendkeeper instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for the data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── library_data.txt        (catalog)
    ///     └── borrowing_records.txt   (ledger)
    pub data_dir: PathBuf,

    /// Catalog file name, relative to `data_dir`
    pub catalog_file: String,

    /// Ledger file name, relative to `data_dir`
    pub ledger_file: String,

    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// Whether each rewrite is fsynced before it replaces the old file
    pub sync_strategy: SyncStrategy,
}

/// File sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync the rewritten file before renaming it into place (safest)
    EveryWrite,

    /// Leave flushing to the OS page cache (tests and benchmarks)
    OsBuffered,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./lendkeeper_data"),
            catalog_file: "library_data.txt".to_string(),
            ledger_file: "borrowing_records.txt".to_string(),
            sync_strategy: SyncStrategy::EveryWrite,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Full path of the catalog file
    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join(&self.catalog_file)
    }

    /// Full path of the ledger file
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(&self.ledger_file)
    }

    /// Check that the two files are distinct and named
    pub fn validate(&self) -> Result<()> {
        if self.catalog_file.trim().is_empty() || self.ledger_file.trim().is_empty() {
            return Err(LendError::Config("data file names must not be empty".to_string()));
        }
        if self.catalog_file == self.ledger_file {
            return Err(LendError::Config(format!(
                "catalog and ledger cannot share the file '{}'",
                self.catalog_file
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for both files)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the catalog file name
    pub fn catalog_file(mut self, name: impl Into<String>) -> Self {
        self.config.catalog_file = name.into();
        self
    }

    /// Set the ledger file name
    pub fn ledger_file(mut self, name: impl Into<String>) -> Self {
        self.config.ledger_file = name.into();
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
