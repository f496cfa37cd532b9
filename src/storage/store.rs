//! Persistence Store
//!
//! Loads and saves the catalog and ledger files.
//!
//! ## Responsibilities
//! - Read both files at startup, tolerating missing files
//! - Rewrite both files in full after every mutation
//! - Report what was loaded and what was skipped

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::catalog::{CatalogIndex, Item};
use crate::config::{Config, SyncStrategy};
use crate::error::{LendError, Result};
use crate::ledger::{LendingLedger, LoanRecord};

use super::codec::{decode_item, decode_record, encode_item, encode_record, RowOutcome};

/// What happened while reading one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileReport {
    /// False when the file did not exist
    pub found: bool,

    /// Rows turned into records
    pub rows_loaded: usize,

    /// Rows ignored because they did not have five fields
    pub rows_skipped: usize,
}

/// Result of a full load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub catalog: FileReport,
    pub ledger: FileReport,

    /// Items whose stored loan flag disagreed with their holder column
    pub flag_mismatches: Vec<String>,
}

/// Reads and writes the two data files
///
/// Holds no state beyond the paths; every save rewrites from what the caller
/// passes in.
#[derive(Debug, Clone)]
pub struct PersistenceStore {
    catalog_path: PathBuf,
    ledger_path: PathBuf,
    sync_strategy: SyncStrategy,
}

impl PersistenceStore {
    /// Create a store for the files named by `config`
    pub fn new(config: &Config) -> Self {
        Self {
            catalog_path: config.catalog_path(),
            ledger_path: config.ledger_path(),
            sync_strategy: config.sync_strategy,
        }
    }

    // =========================================================================
    // Load
    // =========================================================================

    /// Load both files
    ///
    /// A missing file yields an empty collection. Any other read failure, a
    /// bad timestamp or a repeated item identifier fails the whole load.
    pub fn load(&self) -> Result<(CatalogIndex, LendingLedger, LoadReport)> {
        let (items, catalog_report, flag_mismatches) = self.load_catalog()?;
        let (records, ledger_report) = self.load_ledger()?;

        let catalog = CatalogIndex::from_items(items)?;
        let ledger = LendingLedger::from_records(records);

        info!(
            items = catalog.len(),
            records = ledger.len(),
            "Loaded catalog and ledger"
        );

        Ok((
            catalog,
            ledger,
            LoadReport {
                catalog: catalog_report,
                ledger: ledger_report,
                flag_mismatches,
            },
        ))
    }

    /// Read catalog rows in file order
    ///
    /// Also returns the identifiers whose loan flag had to be corrected.
    pub fn load_catalog(&self) -> Result<(Vec<Item>, FileReport, Vec<String>)> {
        let mut items = Vec::new();
        let mut mismatches = Vec::new();
        let mut seen = HashSet::new();

        let report = read_rows(&self.catalog_path, |line_no, line| {
            match decode_item(line) {
                RowOutcome::Parsed(row) => {
                    if !seen.insert(row.item.id().to_string()) {
                        return Err(LendError::MalformedRecord {
                            path: self.catalog_path.clone(),
                            line: line_no,
                            reason: format!("identifier '{}' appears more than once", row.item.id()),
                        });
                    }
                    if row.flag_mismatch {
                        warn!(
                            item = row.item.id(),
                            "Catalog row loan flag disagrees with holder, using holder"
                        );
                        mismatches.push(row.item.id().to_string());
                    }
                    items.push(row.item);
                    Ok(true)
                }
                RowOutcome::Skipped { .. } => Ok(false),
            }
        })?;

        Ok((items, report, mismatches))
    }

    /// Read ledger rows in file order
    pub fn load_ledger(&self) -> Result<(Vec<LoanRecord>, FileReport)> {
        let mut records = Vec::new();

        let report = read_rows(&self.ledger_path, |line_no, line| {
            match decode_record(line) {
                Ok(RowOutcome::Parsed(record)) => {
                    records.push(record);
                    Ok(true)
                }
                Ok(RowOutcome::Skipped { .. }) => Ok(false),
                Err(e) => Err(LendError::MalformedRecord {
                    path: self.ledger_path.clone(),
                    line: line_no,
                    reason: e.to_string(),
                }),
            }
        })?;

        Ok((records, report))
    }

    // =========================================================================
    // Save
    // =========================================================================

    /// Rewrite both files, catalog first
    pub fn save(&self, catalog: &CatalogIndex, ledger: &LendingLedger) -> Result<()> {
        self.save_catalog(catalog)?;
        self.save_ledger(ledger)?;
        Ok(())
    }

    pub fn save_catalog(&self, catalog: &CatalogIndex) -> Result<()> {
        self.rewrite(&self.catalog_path, catalog.iter().map(encode_item))?;
        debug!(items = catalog.len(), path = %self.catalog_path.display(), "Saved catalog");
        Ok(())
    }

    pub fn save_ledger(&self, ledger: &LendingLedger) -> Result<()> {
        self.rewrite(&self.ledger_path, ledger.history().iter().map(encode_record))?;
        debug!(records = ledger.len(), path = %self.ledger_path.display(), "Saved ledger");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Replace `path` with the given rows via a temp file and rename
    fn rewrite(&self, path: &Path, rows: impl Iterator<Item = String>) -> Result<()> {
        let tmp_path = Self::tmp_path(path);

        if let Err(e) = self.write_rows(&tmp_path, rows) {
            Self::discard_tmp(&tmp_path);
            return Err(LendError::persistence(path, e));
        }

        if let Err(e) = fs::rename(&tmp_path, path) {
            Self::discard_tmp(&tmp_path);
            return Err(LendError::persistence(path, e));
        }

        if self.sync_strategy == SyncStrategy::EveryWrite {
            sync_parent_dir(path).map_err(|e| LendError::persistence(path, e))?;
        }

        Ok(())
    }

    fn write_rows(&self, tmp_path: &Path, rows: impl Iterator<Item = String>) -> std::io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(tmp_path)?;

        let mut writer = BufWriter::new(file);
        for row in rows {
            writer.write_all(row.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        if self.sync_strategy == SyncStrategy::EveryWrite {
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    /// "library_data.txt" → "library_data.txt.tmp"
    fn tmp_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        path.with_file_name(name)
    }

    /// Best-effort removal of a temp file after a failed write
    fn discard_tmp(tmp_path: &Path) {
        if let Err(e) = fs::remove_file(tmp_path) {
            debug!(path = %tmp_path.display(), "Could not remove temp file: {}", e);
        }
    }
}

/// Feed every non-blank line of `path` to `handle`
///
/// `handle` gets the 1-based line number and returns whether the row was
/// kept. A missing file is an empty file.
fn read_rows<F>(path: &Path, mut handle: F) -> Result<FileReport>
where
    F: FnMut(usize, &str) -> Result<bool>,
{
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "Data file not found, starting empty");
            return Ok(FileReport::default());
        }
        Err(e) => return Err(LendError::persistence(path, e)),
    };

    let mut report = FileReport {
        found: true,
        ..FileReport::default()
    };

    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| LendError::persistence(path, e))?;
        if line.is_empty() || line == "\r" {
            continue;
        }

        if handle(idx + 1, &line)? {
            report.rows_loaded += 1;
        } else {
            report.rows_skipped += 1;
            warn!(path = %path.display(), line = idx + 1, "Skipping row without five fields");
        }
    }

    Ok(report)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => File::open(dir)?.sync_all(),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
