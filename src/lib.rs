//! # lendkeeper
//!
//! A catalog of lendable items and a ledger of who holds them:
//! - Add/remove/update/search items
//! - Borrow/return with at most one active loan per item
//! - Write-through persistence to two tab-separated text files
//! - Startup cross-check of catalog against ledger
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Caller (CLI / presentation layer)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  one call at a time (SharedEngine)
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    LendingEngine                             │
//! │          validate → mutate → save both files                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │CatalogIndex │          │LendingLedger│
//!   │   (items)   │          │  (records)  │
//!   └──────┬──────┘          └──────┬──────┘
//!          └────────────┬────────────┘
//!                       ▼
//!              ┌──────────────────┐
//!              │ PersistenceStore │
//!              │   (flat files)   │
//!              └──────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod clock;

pub mod catalog;
pub mod ledger;
pub mod storage;
pub mod engine;
pub mod shared;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{LendError, Result};
pub use config::{Config, SyncStrategy};
pub use catalog::{CatalogIndex, Item};
pub use ledger::{LendingLedger, LoanRecord};
pub use engine::{LendingEngine, LoanState};
pub use shared::SharedEngine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of lendkeeper
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
