//! In-memory block tree, usable as both [`BlockSource`] and [`ChainIndex`].

use std::collections::HashMap;

use crate::error::LedgerError;
use crate::traits::{BlockRef, BlockSource, ChainIndex};
use crate::types::{Block, Hash256};

#[derive(Debug, Clone, Default)]
pub struct MemoryBlockTree {
    blocks: HashMap<Hash256, Block>,
    refs: HashMap<Hash256, BlockRef>,
}

impl MemoryBlockTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a block whose parent is already known, or a genesis block
    /// (parent [`Hash256::ZERO`]). Re-inserting a block is a no-op.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnknownBlock`] if the parent is not in the tree
    pub fn insert(&mut self, block: Block) -> Result<BlockRef, LedgerError> {
        let hash = block.hash();
        if let Some(existing) = self.refs.get(&hash) {
            return Ok(*existing);
        }
        let prev_hash = block.prev_hash();
        let height = if prev_hash.is_zero() {
            0
        } else {
            self.refs
                .get(&prev_hash)
                .ok_or(LedgerError::UnknownBlock(prev_hash))?
                .height
                + 1
        };
        let r = BlockRef { hash, height, prev_hash };
        self.refs.insert(hash, r);
        self.blocks.insert(hash, block);
        Ok(r)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Highest block in the tree. Ties go to the lowest hash.
    pub fn highest(&self) -> Option<BlockRef> {
        self.refs
            .values()
            .max_by(|a, b| a.height.cmp(&b.height).then(b.hash.cmp(&a.hash)))
            .copied()
    }
}

impl BlockSource for MemoryBlockTree {
    fn block(&self, hash: &Hash256) -> Result<Option<Block>, LedgerError> {
        Ok(self.blocks.get(hash).cloned())
    }
}

impl ChainIndex for MemoryBlockTree {
    fn block_ref(&self, hash: &Hash256) -> Result<Option<BlockRef>, LedgerError> {
        Ok(self.refs.get(hash).copied())
    }
}
