//! Collaborators the reorg engine consumes but does not implement.
//!
//! - [`BlockSource`]: full blocks by id
//! - [`ChainIndex`]: block tree topology
//! - [`ConsensusChecker`]: sigop counting, input checks, scripts, subsidy

use std::sync::Arc;

use crate::error::{ConsensusError, LedgerError};
use crate::types::{Block, BlockHeader, Hash256, OutPoint, Transaction, TxOut};

/// Supplies full blocks. A block the engine asks for must be available.
pub trait BlockSource {
    fn block(&self, hash: &Hash256) -> Result<Option<Block>, LedgerError>;
}

/// Position of one block in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct BlockRef {
    pub hash: Hash256,
    pub height: u32,
    pub prev_hash: Hash256,
}

/// Block tree topology. This crate stores no headers of its own.
pub trait ChainIndex {
    fn block_ref(&self, hash: &Hash256) -> Result<Option<BlockRef>, LedgerError>;

    /// Like [`block_ref`](Self::block_ref) but unknown blocks are an error.
    fn require(&self, hash: &Hash256) -> Result<BlockRef, LedgerError> {
        self.block_ref(hash)?.ok_or(LedgerError::UnknownBlock(*hash))
    }

    /// Most recent block shared by the chains ending at `a` and `b`, or
    /// `None` if they share no block (including when either is
    /// [`Hash256::ZERO`]).
    fn lowest_common_ancestor(&self, a: &Hash256, b: &Hash256) -> Result<Option<BlockRef>, LedgerError> {
        if a.is_zero() || b.is_zero() {
            return Ok(None);
        }
        let mut a = self.require(a)?;
        let mut b = self.require(b)?;

        // Equalize heights.
        while a.height > b.height {
            a = self.require(&a.prev_hash)?;
        }
        while b.height > a.height {
            b = self.require(&b.prev_hash)?;
        }

        // Walk both back until they meet.
        while a.hash != b.hash {
            if a.prev_hash.is_zero() || b.prev_hash.is_zero() {
                return Ok(None);
            }
            a = self.require(&a.prev_hash)?;
            b = self.require(&b.prev_hash)?;
        }
        Ok(Some(a))
    }

    /// Blocks after `from` up to and including `to`, in ascending height.
    /// `from = None` starts before genesis.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnknownBlock`] if `from` is not an ancestor of `to`
    fn path(&self, from: Option<&Hash256>, to: &Hash256) -> Result<Vec<BlockRef>, LedgerError> {
        let stop = from.copied().unwrap_or(Hash256::ZERO);
        let stop_height = match from {
            Some(hash) => Some(self.require(hash)?.height),
            None => None,
        };
        let mut blocks = Vec::new();
        let mut cursor = *to;
        while cursor != stop {
            if cursor.is_zero() {
                return Err(LedgerError::UnknownBlock(stop));
            }
            let r = self.require(&cursor)?;
            if stop_height.is_some_and(|h| r.height <= h) {
                return Err(LedgerError::UnknownBlock(stop));
            }
            blocks.push(r);
            cursor = r.prev_hash;
        }
        blocks.reverse();
        Ok(blocks)
    }
}

impl<T: BlockSource + ?Sized> BlockSource for &T {
    fn block(&self, hash: &Hash256) -> Result<Option<Block>, LedgerError> {
        (**self).block(hash)
    }
}

impl<T: BlockSource + ?Sized> BlockSource for Arc<T> {
    fn block(&self, hash: &Hash256) -> Result<Option<Block>, LedgerError> {
        (**self).block(hash)
    }
}

impl<T: ChainIndex + ?Sized> ChainIndex for &T {
    fn block_ref(&self, hash: &Hash256) -> Result<Option<BlockRef>, LedgerError> {
        (**self).block_ref(hash)
    }
}

impl<T: ChainIndex + ?Sized> ChainIndex for Arc<T> {
    fn block_ref(&self, hash: &Hash256) -> Result<Option<BlockRef>, LedgerError> {
        (**self).block_ref(hash)
    }
}

/// An output being spent, with the creation data of its record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpentCoin {
    pub outpoint: OutPoint,
    pub output: TxOut,
    pub height: u32,
    pub is_coinbase: bool,
}

/// Rules the engine delegates. `spent` always lists one entry per input,
/// in input order.
pub trait ConsensusChecker {
    /// Signature operations counted without looking at spent outputs.
    fn legacy_sigops(&self, tx: &Transaction) -> usize;

    /// Signature operations inside pay-to-script-hash redeem scripts.
    fn p2sh_sigops(&self, tx: &Transaction, spent: &[SpentCoin]) -> usize;

    /// Value, range, and maturity checks. Returns the fee.
    fn check_inputs(&self, tx: &Transaction, spent: &[SpentCoin], height: u32) -> Result<u64, ConsensusError>;

    fn verify_scripts(&self, tx: &Transaction, spent: &[SpentCoin]) -> Result<(), ConsensusError>;

    fn block_subsidy(&self, height: u32) -> u64;

    fn max_block_sigops(&self) -> usize;

    /// Whether pay-to-script-hash sigops count for a block with this header.
    fn p2sh_active(&self, header: &BlockHeader) -> bool;
}
