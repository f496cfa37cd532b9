//! Lending ledger implementation
//!
//! Vec-backed, append-oriented record log.

use chrono::NaiveDateTime;
use uuid::Uuid;

use super::LoanRecord;

/// In-memory ledger of loan records, oldest first
///
/// The ledger trusts its caller: `record_borrow` does not check for an
/// existing active loan. The engine checks the catalog and closes leftover
/// active records first.
#[derive(Debug, Default)]
pub struct LendingLedger {
    records: Vec<LoanRecord>,
}

impl LendingLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from records in their stored order
    pub fn from_records(records: Vec<LoanRecord>) -> Self {
        Self { records }
    }

    /// Append an active record with a fresh identifier
    pub fn record_borrow(
        &mut self,
        item_id: &str,
        holder: &str,
        timestamp: NaiveDateTime,
    ) -> &LoanRecord {
        let record = LoanRecord {
            record_id: Uuid::new_v4().to_string(),
            item_id: item_id.to_string(),
            holder: holder.to_string(),
            borrowed_at: timestamp,
            returned_at: None,
        };
        let idx = self.records.len();
        self.records.push(record);
        &self.records[idx]
    }

    /// Close the first active record for `item_id`
    ///
    /// Returns `None` (and changes nothing) when the item has no active loan.
    /// A timestamp earlier than the borrow time is clamped to the borrow time.
    pub fn record_return(&mut self, item_id: &str, timestamp: NaiveDateTime) -> Option<&LoanRecord> {
        let record = self
            .records
            .iter_mut()
            .find(|record| record.item_id == item_id && record.is_active())?;

        record.returned_at = Some(timestamp.max(record.borrowed_at));
        Some(&*record)
    }

    /// The active record for an item, if any
    pub fn active_loan_for(&self, item_id: &str) -> Option<&LoanRecord> {
        self.records
            .iter()
            .find(|record| record.item_id == item_id && record.is_active())
    }

    /// Every record, oldest first
    pub fn history(&self) -> &[LoanRecord] {
        &self.records
    }

    /// Records for one item, oldest first
    pub fn history_for<'a>(&'a self, item_id: &'a str) -> impl Iterator<Item = &'a LoanRecord> + 'a {
        self.records
            .iter()
            .filter(move |record| record.item_id == item_id)
    }

    /// Delete active records for `item_id`, keeping returned ones
    ///
    /// Returns how many records were deleted.
    pub fn cascade_remove(&mut self, item_id: &str) -> usize {
        let before = self.records.len();
        self.records
            .retain(|record| !(record.item_id == item_id && record.is_active()));
        before - self.records.len()
    }

    /// Active records, oldest first
    pub fn active_loans(&self) -> impl Iterator<Item = &LoanRecord> {
        self.records.iter().filter(|record| record.is_active())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
