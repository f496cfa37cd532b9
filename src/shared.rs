//! Shared engine handle
//!
//! Serializes engine calls from several threads.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::engine::LendingEngine;
use crate::error::Result;
use crate::ledger::LoanRecord;

/// Cloneable handle to one engine behind a mutex
///
/// Each call holds the lock for the whole operation, save included, so two
/// threads can never both see an item as available and both borrow it.
#[derive(Clone)]
pub struct SharedEngine {
    inner: Arc<Mutex<LendingEngine>>,
}

impl SharedEngine {
    pub fn new(engine: LendingEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Run `f` with exclusive access to the engine
    pub fn with<R>(&self, f: impl FnOnce(&mut LendingEngine) -> R) -> R {
        let mut engine = self.inner.lock();
        f(&mut engine)
    }

    /// Hold the engine across several calls
    pub fn lock(&self) -> MutexGuard<'_, LendingEngine> {
        self.inner.lock()
    }

    pub fn borrow(&self, id: &str, holder: &str) -> Result<LoanRecord> {
        self.with(|engine| engine.borrow(id, holder))
    }

    pub fn return_item(&self, id: &str) -> Result<Option<LoanRecord>> {
        self.with(|engine| engine.return_item(id))
    }

    /// Take the engine back once every other handle is gone
    ///
    /// Returns the handle unchanged if clones are still alive.
    pub fn into_inner(self) -> std::result::Result<LendingEngine, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}
