//! Ledger Module
//!
//! Ordered log of borrow/return events.
//!
//! ## Responsibilities
//! - Append a record on every borrow
//! - Close the active record on return
//! - Answer "who has this item right now"
//! - Keep closed records as history, even after the item is gone
//!
//! ## Record Lifecycle
//! ```text
//!   record_borrow ──► active (returned_at = None)
//!                        │
//!          ┌─────────────┴──────────────┐
//!          ▼                            ▼
//!   record_return                 cascade_remove
//!   (returned_at = Some)          (record deleted)
//! ```

mod log;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub use log::LendingLedger;

/// One borrow of one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRecord {
    record_id: String,
    item_id: String,
    holder: String,
    borrowed_at: NaiveDateTime,
    returned_at: Option<NaiveDateTime>,
}

impl LoanRecord {
    /// Rebuild a record from stored fields
    ///
    /// Returns `None` when the return timestamp precedes the borrow timestamp.
    pub fn from_parts(
        record_id: impl Into<String>,
        item_id: impl Into<String>,
        holder: impl Into<String>,
        borrowed_at: NaiveDateTime,
        returned_at: Option<NaiveDateTime>,
    ) -> Option<Self> {
        if returned_at.is_some_and(|returned| returned < borrowed_at) {
            return None;
        }

        Some(Self {
            record_id: record_id.into(),
            item_id: item_id.into(),
            holder: holder.into(),
            borrowed_at,
            returned_at,
        })
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn borrowed_at(&self) -> NaiveDateTime {
        self.borrowed_at
    }

    pub fn returned_at(&self) -> Option<NaiveDateTime> {
        self.returned_at
    }

    /// An active loan has not been returned yet
    pub fn is_active(&self) -> bool {
        self.returned_at.is_none()
    }
}
