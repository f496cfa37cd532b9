//! Catalog Module
//!
//! In-memory index of lendable items.
//!
//! ## Responsibilities
//! - Exact-match lookup by identifier
//! - Identifier uniqueness
//! - Case-insensitive title/attribution search
//! - Stable iteration in insertion order
//!
//! ## Data Structure Choice
//! A BTreeMap keyed by an insertion sequence number, plus a HashMap from
//! identifier to sequence number:
//! - Iteration order is insertion order, even after removals
//! - Lookup, insert and remove are all logarithmic or better

mod index;

use serde::{Deserialize, Serialize};

pub use index::CatalogIndex;

/// A catalog entry
///
/// The loan flag is not stored separately: an item is on loan exactly when it
/// has a holder, so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    id: String,
    title: String,
    attribution: String,
    holder: Option<String>,
}

impl Item {
    /// Create an available item
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        attribution: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            attribution: attribution.into(),
            holder: None,
        }
    }

    /// Rebuild an item as it was stored, holder included
    pub fn with_holder(mut self, holder: Option<String>) -> Self {
        self.holder = holder;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Author, artist or whoever the item is credited to
    pub fn attribution(&self) -> &str {
        &self.attribution
    }

    pub fn holder(&self) -> Option<&str> {
        self.holder.as_deref()
    }

    pub fn is_on_loan(&self) -> bool {
        self.holder.is_some()
    }

    /// Case-insensitive substring match on title or attribution
    ///
    /// `needle` must already be lowercase.
    pub(crate) fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.attribution.to_lowercase().contains(needle)
    }
}
