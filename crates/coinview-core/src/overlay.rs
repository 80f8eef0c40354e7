//! Write-buffering layer over another repository.
//!
//! Reads fall through to the parent on a miss; writes stay in the overlay
//! until [`CoinOverlay::into_changes`] hands them to the caller, who commits
//! them to the parent in one [`CoinRepository::apply_changes`]. Dropping an
//! overlay discards its writes. Overlays nest.

use std::collections::BTreeMap;

use crate::coins::CoinRecord;
use crate::error::LedgerError;
use crate::repository::{CoinChanges, CoinRepository};
use crate::types::Hash256;

pub struct CoinOverlay<'a, P: CoinRepository + ?Sized> {
    parent: &'a P,
    coins: BTreeMap<Hash256, Option<CoinRecord>>,
    best_block: Option<Hash256>,
}

impl<'a, P: CoinRepository + ?Sized> CoinOverlay<'a, P> {
    pub fn layered_over(parent: &'a P) -> Self {
        Self {
            parent,
            coins: BTreeMap::new(),
            best_block: None,
        }
    }

    /// Number of buffered coin writes.
    pub fn pending(&self) -> usize {
        self.coins.len()
    }

    pub fn into_changes(self) -> CoinChanges {
        CoinChanges {
            coins: self.coins,
            best_block: self.best_block,
        }
    }
}

impl<P: CoinRepository + ?Sized> CoinRepository for CoinOverlay<'_, P> {
    fn get(&self, txid: &Hash256) -> Result<Option<CoinRecord>, LedgerError> {
        match self.coins.get(txid) {
            Some(entry) => Ok(entry.clone()),
            None => self.parent.get(txid),
        }
    }

    fn put(&mut self, txid: Hash256, record: CoinRecord) -> Result<(), LedgerError> {
        if record.is_pruned() {
            return Err(LedgerError::PrunedRecordWrite(txid));
        }
        self.coins.insert(txid, Some(record));
        Ok(())
    }

    fn delete(&mut self, txid: &Hash256) -> Result<(), LedgerError> {
        self.coins.insert(*txid, None);
        Ok(())
    }

    fn best_block(&self) -> Result<Hash256, LedgerError> {
        match self.best_block {
            Some(hash) => Ok(hash),
            None => self.parent.best_block(),
        }
    }

    fn set_best_block(&mut self, hash: Hash256) -> Result<(), LedgerError> {
        self.best_block = Some(hash);
        Ok(())
    }

    fn apply_changes(&mut self, changes: CoinChanges) -> Result<(), LedgerError> {
        changes.validate()?;
        self.coins.extend(changes.coins);
        if changes.best_block.is_some() {
            self.best_block = changes.best_block;
        }
        Ok(())
    }
}
