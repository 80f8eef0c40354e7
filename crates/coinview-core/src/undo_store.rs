//! Storage for sealed undo records, keyed by block id.

use std::collections::HashMap;

use crate::error::{CodecError, CorruptionError, LedgerError};
use crate::types::Hash256;
use crate::undo::{BlockUndo, open, seal};

pub trait UndoStore {
    fn get_raw(&self, block: &Hash256) -> Result<Option<Vec<u8>>, LedgerError>;

    fn put_raw(&mut self, block: Hash256, bytes: Vec<u8>) -> Result<(), LedgerError>;

    fn delete_raw(&mut self, block: &Hash256) -> Result<(), LedgerError>;

    /// Seal `undo` against `prev_block` and store it under `block`.
    fn write_undo(&mut self, block: Hash256, prev_block: &Hash256, undo: &BlockUndo) -> Result<(), LedgerError> {
        let sealed = seal(prev_block, undo)?;
        self.put_raw(block, sealed)
    }

    /// Load and verify the undo record for `block`, whose parent is `prev_block`.
    ///
    /// # Errors
    ///
    /// - [`CorruptionError::UndoMissing`] if nothing is stored for `block`
    /// - [`CorruptionError::ChecksumMismatch`] if the checksum does not verify
    /// - [`CorruptionError::MalformedUndo`] if the record does not decode
    fn read_undo(&self, block: &Hash256, prev_block: &Hash256) -> Result<BlockUndo, LedgerError> {
        let sealed = self
            .get_raw(block)?
            .ok_or(CorruptionError::UndoMissing(*block))?;
        open(prev_block, &sealed).map_err(|e| {
            let err = match e {
                CodecError::ChecksumMismatch => CorruptionError::ChecksumMismatch(*block),
                source => CorruptionError::MalformedUndo { block: *block, source },
            };
            LedgerError::Corruption(err)
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryUndoStore {
    records: HashMap<Hash256, Vec<u8>>,
}

impl MemoryUndoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl UndoStore for MemoryUndoStore {
    fn get_raw(&self, block: &Hash256) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self.records.get(block).cloned())
    }

    fn put_raw(&mut self, block: Hash256, bytes: Vec<u8>) -> Result<(), LedgerError> {
        self.records.insert(block, bytes);
        Ok(())
    }

    fn delete_raw(&mut self, block: &Hash256) -> Result<(), LedgerError> {
        self.records.remove(block);
        Ok(())
    }
}
