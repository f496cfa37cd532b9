//! Engine Module
//!
//! The lending engine that coordinates the catalog, the ledger and storage.
//!
//! ## Responsibilities
//! - Validate every request before touching any state
//! - Drive the per-item loan state machine
//! - Persist both files after every mutation (write-through)
//! - Cross-check catalog and ledger on startup
//!
//! ## Loan State Machine
//! ```text
//!              borrow(holder)
//!   Available ───────────────► OnLoan(holder)
//!       ▲                           │
//!       └───────── return ──────────┘
//! ```
//! `borrow` on an item that is on loan and `return` on an available item are
//! rejected and change nothing.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::catalog::{CatalogIndex, Item};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{LendError, Result};
use crate::ledger::{LendingLedger, LoanRecord};
use crate::storage::{LoadReport, PersistenceStore, FIELD_SEPARATOR, NULL_LITERAL};

/// Loan status of a single item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LoanState {
    Available,
    OnLoan(String),
}

/// A disagreement between catalog and ledger found at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Inconsistency {
    /// The catalog row's loan flag disagreed with its holder column
    LoanFlagCorrected { item_id: String },

    /// Item is on loan but the ledger has no active record for it
    LoanedWithoutRecord { item_id: String, holder: String },

    /// Active ledger record for an item that is missing or available
    RecordWithoutLoan { item_id: String, record_id: String },

    /// Catalog and active record name different holders
    HolderMismatch {
        item_id: String,
        catalog_holder: String,
        ledger_holder: String,
    },

    /// More than one active record for the same item
    MultipleActiveLoans { item_id: String, count: usize },
}

/// What `LendingEngine::open` found on disk
#[derive(Debug, Clone, Default)]
pub struct StartupReport {
    pub load: LoadReport,
    pub inconsistencies: Vec<Inconsistency>,
}

impl StartupReport {
    pub fn is_consistent(&self) -> bool {
        self.inconsistencies.is_empty()
    }
}

/// The lending engine
///
/// ## Concurrency Model: Single Writer
///
/// Every operation runs to completion, save included, before it returns.
/// Mutating operations take `&mut self` and the engine holds no locks of its
/// own; callers on several threads go through `SharedEngine`, which
/// serializes whole operations so the borrow/return check-then-act stays
/// atomic.
///
/// The two files are rewritten in full on each mutation. Two processes
/// pointed at the same data directory will overwrite each other.
pub struct LendingEngine {
    /// Engine configuration
    config: Config,

    /// Reads/writes the catalog and ledger files
    store: PersistenceStore,

    /// Items, in insertion order
    catalog: CatalogIndex,

    /// Loan records, oldest first
    ledger: LendingLedger,

    /// Timestamp source for borrow/return
    clock: Box<dyn Clock>,

    /// Set when the last save failed; cleared by a successful save
    dirty: bool,

    /// Load statistics and consistency findings from `open`
    startup: StartupReport,
}

impl LendingEngine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate config and create the data directory
    /// 2. Load catalog and ledger (missing files mean empty collections)
    /// 3. Cross-check catalog against ledger and log findings
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with_clock(config, SystemClock)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Open with an explicit timestamp source
    pub fn open_with_clock(config: Config, clock: impl Clock + 'static) -> Result<Self> {
        // Step 1: Validate and create data directory
        config.validate()?;
        fs::create_dir_all(&config.data_dir)
            .map_err(|e| LendError::persistence(&config.data_dir, e))?;

        // Step 2: Load both files
        let store = PersistenceStore::new(&config);
        let (catalog, ledger, load) = store.load()?;

        if load.catalog.rows_skipped > 0 || load.ledger.rows_skipped > 0 {
            warn!(
                catalog_skipped = load.catalog.rows_skipped,
                ledger_skipped = load.ledger.rows_skipped,
                "Skipped malformed rows during load"
            );
        }

        // Step 3: Cross-check
        let inconsistencies = check_consistency(&catalog, &ledger, &load);
        for finding in &inconsistencies {
            warn!(?finding, "Catalog and ledger disagree");
        }

        info!(
            data_dir = %config.data_dir.display(),
            items = catalog.len(),
            records = ledger.len(),
            "Lending engine ready"
        );

        Ok(Self {
            config,
            store,
            catalog,
            ledger,
            clock: Box::new(clock),
            dirty: false,
            startup: StartupReport {
                load,
                inconsistencies,
            },
        })
    }

    // =========================================================================
    // Catalog Operations
    // =========================================================================

    /// Add a new, available item
    pub fn add_item(&mut self, id: &str, title: &str, attribution: &str) -> Result<()> {
        debug!(item = id, "Adding item");
        validate_identifier(id)?;
        validate_text("title", title)?;
        validate_text("attribution", attribution)?;

        if let Err(e) = self.catalog.add(Item::new(id, title, attribution)) {
            warn!(item = id, "Add rejected: {}", e);
            return Err(e);
        }

        info!(item = id, "Item added");
        self.persist()
    }

    /// Remove an item
    ///
    /// An active loan on the item is deleted from the ledger, not closed.
    /// Returned loans stay in the history. Returns how many active records
    /// were deleted.
    pub fn remove_item(&mut self, id: &str) -> Result<usize> {
        debug!(item = id, "Removing item");
        if !self.catalog.remove(id) {
            warn!(item = id, "Remove rejected: not found");
            return Err(LendError::NotFound(id.to_string()));
        }

        let dropped = self.ledger.cascade_remove(id);

        info!(item = id, dropped, "Item removed");
        self.persist()?;
        Ok(dropped)
    }

    /// Change title and/or attribution
    ///
    /// `None` or blank fields are left as they are.
    pub fn update_item(
        &mut self,
        id: &str,
        title: Option<&str>,
        attribution: Option<&str>,
    ) -> Result<()> {
        debug!(item = id, "Updating item");
        if let Some(title) = title {
            validate_text("title", title)?;
        }
        if let Some(attribution) = attribution {
            validate_text("attribution", attribution)?;
        }

        if let Err(e) = self.catalog.update(id, title, attribution) {
            warn!(item = id, "Update rejected: {}", e);
            return Err(e);
        }

        info!(item = id, "Item updated");
        self.persist()
    }

    /// Snapshot of one item
    pub fn find(&self, id: &str) -> Result<Item> {
        self.catalog
            .find(id)
            .cloned()
            .ok_or_else(|| LendError::NotFound(id.to_string()))
    }

    /// Items whose title or attribution contains `query`, ignoring case
    pub fn search(&self, query: &str) -> Vec<Item> {
        self.catalog.search(query).cloned().collect()
    }

    pub fn list_all(&self) -> Vec<Item> {
        self.catalog.iter().cloned().collect()
    }

    pub fn list_available(&self) -> Vec<Item> {
        self.catalog
            .iter()
            .filter(|item| !item.is_on_loan())
            .cloned()
            .collect()
    }

    pub fn list_on_loan(&self) -> Vec<Item> {
        self.catalog
            .iter()
            .filter(|item| item.is_on_loan())
            .cloned()
            .collect()
    }

    // =========================================================================
    // Lending Operations
    // =========================================================================

    /// Current loan state of an item
    pub fn loan_state(&self, id: &str) -> Result<LoanState> {
        let item = self
            .catalog
            .find(id)
            .ok_or_else(|| LendError::NotFound(id.to_string()))?;

        Ok(match item.holder() {
            Some(holder) => LoanState::OnLoan(holder.to_string()),
            None => LoanState::Available,
        })
    }

    /// Lend an available item to `holder`
    ///
    /// Returns a copy of the new ledger record. Active records the ledger still
    /// holds for an available item are left over from a return that was saved
    /// to the catalog but not the ledger; they are closed first so the item
    /// ends up with exactly one active record.
    pub fn borrow(&mut self, id: &str, holder: &str) -> Result<LoanRecord> {
        debug!(item = id, holder, "Borrow requested");
        validate_holder(holder)?;

        match self.loan_state(id) {
            Ok(LoanState::Available) => {}
            Ok(LoanState::OnLoan(current)) => {
                warn!(item = id, current = %current, "Borrow rejected: already on loan");
                return Err(LendError::BorrowRejected {
                    item_id: id.to_string(),
                    reason: format!("already on loan to {}", current),
                });
            }
            Err(_) => {
                warn!(item = id, "Borrow rejected: no such item");
                return Err(LendError::BorrowRejected {
                    item_id: id.to_string(),
                    reason: "no such item".to_string(),
                });
            }
        }

        let now = self.clock.now();
        while let Some(stale) = self.ledger.record_return(id, now) {
            warn!(
                item = id,
                record = stale.record_id(),
                stale_holder = stale.holder(),
                "Closed stale active loan record"
            );
        }

        self.catalog.set_holder(id, Some(holder.to_string()))?;
        let record = self.ledger.record_borrow(id, holder, now).clone();

        info!(item = id, holder, record = record.record_id(), "Item borrowed");
        self.persist()?;
        Ok(record)
    }

    /// Take back an item that is on loan
    ///
    /// Returns a copy of the closed ledger record. `None` means the catalog
    /// had the item on loan but the ledger held no active record for it, which
    /// only happens after loading inconsistent files; the item is still made
    /// available. Every active record for the item is closed; the one returned
    /// is the current holder's when there are several.
    pub fn return_item(&mut self, id: &str) -> Result<Option<LoanRecord>> {
        debug!(item = id, "Return requested");

        let holder = match self.loan_state(id) {
            Ok(LoanState::OnLoan(holder)) => holder,
            Ok(LoanState::Available) => {
                warn!(item = id, "Return rejected: not on loan");
                return Err(LendError::ReturnRejected {
                    item_id: id.to_string(),
                    reason: "not on loan".to_string(),
                });
            }
            Err(_) => {
                warn!(item = id, "Return rejected: no such item");
                return Err(LendError::ReturnRejected {
                    item_id: id.to_string(),
                    reason: "no such item".to_string(),
                });
            }
        };

        let now = self.clock.now();
        self.catalog.set_holder(id, None)?;

        let mut closed = Vec::new();
        while let Some(record) = self.ledger.record_return(id, now) {
            closed.push(record.clone());
        }
        if closed.len() > 1 {
            warn!(item = id, closed = closed.len(), "Closed several active loan records");
        }
        let current = closed
            .iter()
            .position(|record| record.holder() == holder)
            .unwrap_or(0);
        let record = (!closed.is_empty()).then(|| closed.swap_remove(current));

        match &record {
            Some(record) => info!(item = id, record = record.record_id(), "Item returned"),
            None => warn!(item = id, "Item returned without an active ledger record"),
        }

        self.persist()?;
        Ok(record)
    }

    /// The active loan record for an item, if any
    pub fn active_loan_for(&self, id: &str) -> Option<LoanRecord> {
        self.ledger.active_loan_for(id).cloned()
    }

    /// Every loan record, oldest first
    pub fn history(&self) -> Vec<LoanRecord> {
        self.ledger.history().to_vec()
    }

    /// Loan records of one item, oldest first
    ///
    /// Works for removed items too; their returned loans are kept.
    pub fn history_for(&self, id: &str) -> Vec<LoanRecord> {
        self.ledger.history_for(id).cloned().collect()
    }

    // =========================================================================
    // Durability
    // =========================================================================

    /// Write both files now
    ///
    /// Every mutation already saves; this is for retrying after a failed save
    /// and for shutdown.
    pub fn flush(&mut self) -> Result<()> {
        self.persist()
    }

    /// Close the engine gracefully
    ///
    /// Flushes both files one last time
    pub fn close(mut self) -> Result<()> {
        self.persist()?;
        info!(data_dir = %self.config.data_dir.display(), "Lending engine closed");
        Ok(())
    }

    /// Save both files; on failure keep the in-memory state and mark dirty
    fn persist(&mut self) -> Result<()> {
        match self.store.save(&self.catalog, &self.ledger) {
            Ok(()) => {
                self.dirty = false;
                Ok(())
            }
            Err(e) => {
                error!("Failed to save lending data: {}", e);
                self.dirty = true;
                Err(e)
            }
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// True when the last save failed and memory is ahead of disk
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Load statistics and consistency findings from startup
    pub fn startup_report(&self) -> &StartupReport {
        &self.startup
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn item_count(&self) -> usize {
        self.catalog.len()
    }

    pub fn record_count(&self) -> usize {
        self.ledger.len()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Reject text that would split or end a stored row
fn validate_text(field: &'static str, value: &str) -> Result<()> {
    if value.contains(FIELD_SEPARATOR) || value.contains('\n') || value.contains('\r') {
        return Err(LendError::InvalidField {
            field,
            reason: "must not contain tabs or line breaks".to_string(),
        });
    }
    Ok(())
}

fn validate_identifier(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(LendError::InvalidField {
            field: "identifier",
            reason: "must not be empty".to_string(),
        });
    }
    validate_text("identifier", id)
}

fn validate_holder(holder: &str) -> Result<()> {
    if holder.trim().is_empty() {
        return Err(LendError::InvalidField {
            field: "holder",
            reason: "must not be empty".to_string(),
        });
    }
    if holder == NULL_LITERAL {
        return Err(LendError::InvalidField {
            field: "holder",
            reason: format!("'{}' is reserved", NULL_LITERAL),
        });
    }
    validate_text("holder", holder)
}

// =============================================================================
// Startup Consistency
// =============================================================================

fn check_consistency(
    catalog: &CatalogIndex,
    ledger: &LendingLedger,
    load: &LoadReport,
) -> Vec<Inconsistency> {
    let mut findings: Vec<Inconsistency> = load
        .flag_mismatches
        .iter()
        .map(|item_id| Inconsistency::LoanFlagCorrected {
            item_id: item_id.clone(),
        })
        .collect();

    for item in catalog.iter() {
        let Some(holder) = item.holder() else {
            continue;
        };
        match ledger.active_loan_for(item.id()) {
            None => findings.push(Inconsistency::LoanedWithoutRecord {
                item_id: item.id().to_string(),
                holder: holder.to_string(),
            }),
            Some(record) if record.holder() != holder => {
                findings.push(Inconsistency::HolderMismatch {
                    item_id: item.id().to_string(),
                    catalog_holder: holder.to_string(),
                    ledger_holder: record.holder().to_string(),
                })
            }
            Some(_) => {}
        }
    }

    let mut counted = HashSet::new();
    for record in ledger.active_loans() {
        let on_loan = catalog
            .find(record.item_id())
            .is_some_and(|item| item.is_on_loan());
        if !on_loan {
            findings.push(Inconsistency::RecordWithoutLoan {
                item_id: record.item_id().to_string(),
                record_id: record.record_id().to_string(),
            });
        }

        if !counted.insert(record.item_id()) {
            continue;
        }

        let count = ledger
            .active_loans()
            .filter(|other| other.item_id() == record.item_id())
            .count();
        if count > 1 {
            findings.push(Inconsistency::MultipleActiveLoans {
                item_id: record.item_id().to_string(),
                count,
            });
        }
    }

    findings
}
