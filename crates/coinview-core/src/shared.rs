//! Handle for sharing one repository between the engine and readers.
//!
//! Every call takes the lock for its own duration, so a reader sees the
//! repository either before or after a committed batch, never in between.
//! Readers get no ordering guarantee relative to the writer.

use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::Arc;

use crate::coins::CoinRecord;
use crate::error::LedgerError;
use crate::repository::{CoinChanges, CoinRepository};
use crate::types::Hash256;

#[derive(Debug, Default)]
pub struct SharedCoinRepository<R> {
    inner: Arc<RwLock<R>>,
}

impl<R> Clone for SharedCoinRepository<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: CoinRepository> SharedCoinRepository<R> {
    pub fn new(repo: R) -> Self {
        Self {
            inner: Arc::new(RwLock::new(repo)),
        }
    }

    /// Hold a read lock across several lookups for a consistent view.
    pub fn read(&self) -> RwLockReadGuard<'_, R> {
        self.inner.read()
    }
}

impl<R: CoinRepository> CoinRepository for SharedCoinRepository<R> {
    fn get(&self, txid: &Hash256) -> Result<Option<CoinRecord>, LedgerError> {
        self.inner.read().get(txid)
    }

    fn put(&mut self, txid: Hash256, record: CoinRecord) -> Result<(), LedgerError> {
        self.inner.write().put(txid, record)
    }

    fn delete(&mut self, txid: &Hash256) -> Result<(), LedgerError> {
        self.inner.write().delete(txid)
    }

    fn best_block(&self) -> Result<Hash256, LedgerError> {
        self.inner.read().best_block()
    }

    fn set_best_block(&mut self, hash: Hash256) -> Result<(), LedgerError> {
        self.inner.write().set_best_block(hash)
    }

    fn apply_changes(&mut self, changes: CoinChanges) -> Result<(), LedgerError> {
        self.inner.write().apply_changes(changes)
    }
}
