//! Coin repository interface and in-memory implementation.
//!
//! A repository maps transaction ids to [`CoinRecord`]s and remembers the
//! block its contents reflect. Pruned records are never stored: a fully
//! spent transaction is represented by the absence of its key.
//!
//! Writes that must land together (one block's worth) are collected in a
//! [`CoinChanges`] batch, usually by a [`CoinOverlay`], and committed with
//! [`CoinRepository::apply_changes`].

use std::collections::{BTreeMap, HashMap};

use crate::coins::CoinRecord;
use crate::error::{CodecError, LedgerError};
use crate::overlay::CoinOverlay;
use crate::types::{Hash256, OutPoint};

/// A batch of repository writes. `None` deletes the key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoinChanges {
    pub coins: BTreeMap<Hash256, Option<CoinRecord>>,
    pub best_block: Option<Hash256>,
}

impl CoinChanges {
    pub fn is_empty(&self) -> bool {
        self.coins.is_empty() && self.best_block.is_none()
    }

    /// Fail if any write would store a pruned record.
    pub fn validate(&self) -> Result<(), LedgerError> {
        match self
            .coins
            .iter()
            .find(|(_, record)| record.as_ref().is_some_and(CoinRecord::is_pruned))
        {
            Some((txid, _)) => Err(LedgerError::PrunedRecordWrite(*txid)),
            None => Ok(()),
        }
    }
}

/// Key-value store of coin records plus the best-block pointer.
///
/// Single writer: the reorg engine assumes nobody else mutates the
/// repository while a block is being applied.
pub trait CoinRepository {
    /// Record for `txid`, or `None` if unknown or fully spent.
    fn get(&self, txid: &Hash256) -> Result<Option<CoinRecord>, LedgerError>;

    /// Insert or replace a record.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::PrunedRecordWrite`] if `record` has no live outputs
    fn put(&mut self, txid: Hash256, record: CoinRecord) -> Result<(), LedgerError>;

    fn delete(&mut self, txid: &Hash256) -> Result<(), LedgerError>;

    /// Block whose application the contents reflect. [`Hash256::ZERO`] when empty.
    fn best_block(&self) -> Result<Hash256, LedgerError>;

    fn set_best_block(&mut self, hash: Hash256) -> Result<(), LedgerError>;

    /// Commit a batch as one unit.
    fn apply_changes(&mut self, changes: CoinChanges) -> Result<(), LedgerError>;

    /// True iff the record for `outpoint.txid` exists and the slot is live.
    fn have_unspent_output(&self, outpoint: &OutPoint) -> Result<bool, LedgerError> {
        Ok(self
            .get(&outpoint.txid)?
            .is_some_and(|record| record.is_available(outpoint.vout)))
    }

    /// Store `record`, or delete the key if it is pruned.
    fn update(&mut self, txid: Hash256, record: CoinRecord) -> Result<(), LedgerError> {
        if record.is_pruned() {
            self.delete(&txid)
        } else {
            self.put(txid, record)
        }
    }

    /// An overlay that reads through to this repository and buffers writes.
    fn layered(&self) -> CoinOverlay<'_, Self>
    where
        Self: Sized,
    {
        CoinOverlay::layered_over(self)
    }
}

/// Encoded contents of a repository, for byte-level comparisons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySnapshot {
    pub best_block: Hash256,
    pub coins: BTreeMap<Hash256, Vec<u8>>,
}

/// In-memory coin repository. No persistence.
#[derive(Debug, Clone, Default)]
pub struct MemoryCoinRepository {
    coins: HashMap<Hash256, CoinRecord>,
    best_block: Hash256,
}

impl MemoryCoinRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Hash256, &CoinRecord)> {
        self.coins.iter()
    }

    /// Sum of unspent value over all records.
    pub fn total_value(&self) -> u64 {
        self.coins
            .values()
            .fold(0u64, |acc, r| acc.saturating_add(r.total_unspent_value()))
    }

    pub fn snapshot(&self) -> Result<RepositorySnapshot, CodecError> {
        let coins = self
            .coins
            .iter()
            .map(|(txid, record)| Ok((*txid, record.encode()?)))
            .collect::<Result<_, CodecError>>()?;
        Ok(RepositorySnapshot {
            best_block: self.best_block,
            coins,
        })
    }
}

impl CoinRepository for MemoryCoinRepository {
    fn get(&self, txid: &Hash256) -> Result<Option<CoinRecord>, LedgerError> {
        Ok(self.coins.get(txid).cloned())
    }

    fn put(&mut self, txid: Hash256, record: CoinRecord) -> Result<(), LedgerError> {
        if record.is_pruned() {
            return Err(LedgerError::PrunedRecordWrite(txid));
        }
        self.coins.insert(txid, record);
        Ok(())
    }

    fn delete(&mut self, txid: &Hash256) -> Result<(), LedgerError> {
        self.coins.remove(txid);
        Ok(())
    }

    fn best_block(&self) -> Result<Hash256, LedgerError> {
        Ok(self.best_block)
    }

    fn set_best_block(&mut self, hash: Hash256) -> Result<(), LedgerError> {
        self.best_block = hash;
        Ok(())
    }

    fn apply_changes(&mut self, changes: CoinChanges) -> Result<(), LedgerError> {
        changes.validate()?;
        for (txid, record) in changes.coins {
            match record {
                Some(record) => {
                    self.coins.insert(txid, record);
                }
                None => {
                    self.coins.remove(&txid);
                }
            }
        }
        if let Some(best) = changes.best_block {
            self.best_block = best;
        }
        Ok(())
    }
}
