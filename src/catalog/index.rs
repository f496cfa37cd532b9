//! Catalog index implementation
//!
//! Insertion-ordered map of items keyed by identifier.

use std::collections::{BTreeMap, HashMap};

use crate::error::{LendError, Result};

use super::Item;

/// In-memory catalog of items
#[derive(Debug, Default)]
pub struct CatalogIndex {
    /// Items ordered by insertion sequence
    items: BTreeMap<u64, Item>,

    /// Identifier → insertion sequence
    positions: HashMap<String, u64>,

    /// Sequence number for the next insert
    next_seq: u64,
}

impl CatalogIndex {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from items in their stored order
    ///
    /// Fails on the first repeated identifier.
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Result<Self> {
        let mut index = Self::new();
        for item in items {
            index.add(item)?;
        }
        Ok(index)
    }

    /// Insert a new item
    pub fn add(&mut self, item: Item) -> Result<()> {
        if self.positions.contains_key(item.id()) {
            return Err(LendError::DuplicateIdentifier(item.id().to_string()));
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.positions.insert(item.id().to_string(), seq);
        self.items.insert(seq, item);
        Ok(())
    }

    /// Remove an item, returning whether it existed
    pub fn remove(&mut self, id: &str) -> bool {
        match self.positions.remove(id) {
            Some(seq) => self.items.remove(&seq).is_some(),
            None => false,
        }
    }

    /// Exact-match lookup
    pub fn find(&self, id: &str) -> Option<&Item> {
        let seq = self.positions.get(id)?;
        self.items.get(seq)
    }

    /// Overwrite title and/or attribution
    ///
    /// A field that is `None` or blank after trimming is left unchanged.
    pub fn update(&mut self, id: &str, title: Option<&str>, attribution: Option<&str>) -> Result<()> {
        let item = self
            .find_mut(id)
            .ok_or_else(|| LendError::NotFound(id.to_string()))?;

        if let Some(title) = non_blank(title) {
            item.title = title.to_string();
        }
        if let Some(attribution) = non_blank(attribution) {
            item.attribution = attribution.to_string();
        }
        Ok(())
    }

    /// Items whose title or attribution contains `query`, ignoring case
    pub fn search<'a>(&'a self, query: &str) -> impl Iterator<Item = &'a Item> + 'a {
        let needle = query.to_lowercase();
        self.items.values().filter(move |item| item.matches(&needle))
    }

    /// Set or clear the holder of an item
    pub(crate) fn set_holder(&mut self, id: &str, holder: Option<String>) -> Result<()> {
        let item = self
            .find_mut(id)
            .ok_or_else(|| LendError::NotFound(id.to_string()))?;
        item.holder = holder;
        Ok(())
    }

    /// All items in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Item> {
        let seq = self.positions.get(id)?;
        self.items.get_mut(seq)
    }
}

fn non_blank(field: Option<&str>) -> Option<&str> {
    field.filter(|value| !value.trim().is_empty())
}
