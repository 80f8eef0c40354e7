//! RocksDB-backed coin repository and undo store.
//!
//! One database holds three column families: `coins` (txid to encoded
//! [`CoinRecord`]), `undo` (block hash to sealed undo record), and `meta`
//! (the best-block pointer). [`RocksCoinStore`] and [`RocksUndoStore`] share
//! the database handle so the engine can own both.
//!
//! [`CoinRepository::apply_changes`] commits every coin write and the
//! best-block move in one [`WriteBatch`].

use std::path::Path;
use std::sync::Arc;

use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};

use coinview_core::coins::CoinRecord;
use coinview_core::error::{CorruptionError, LedgerError};
use coinview_core::repository::{CoinChanges, CoinRepository};
use coinview_core::types::Hash256;
use coinview_core::undo_store::UndoStore;

use crate::config::RocksConfig;

// --- Column family names ---

const CF_COINS: &str = "coins";
const CF_UNDO: &str = "undo";
const CF_META: &str = "meta";

const ALL_CFS: &[&str] = &[CF_COINS, CF_UNDO, CF_META];

// --- Metadata keys ---

const META_BEST_BLOCK: &[u8] = b"best_block";

fn storage_err(e: rocksdb::Error) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

fn cf_handle<'a>(db: &'a DB, name: &str) -> Result<&'a rocksdb::ColumnFamily, LedgerError> {
    db.cf_handle(name)
        .ok_or_else(|| LedgerError::Storage(format!("missing column family: {name}")))
}

/// An open ledger database.
#[derive(Clone)]
pub struct LedgerDb {
    db: Arc<DB>,
}

impl LedgerDb {
    /// Open the database at `path` with default tuning, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        Self::open_with(path, &RocksConfig::default())
    }

    /// Open the database at `path`, creating missing column families.
    pub fn open_with(path: impl AsRef<Path>, cfg: &RocksConfig) -> Result<Self, LedgerError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(cfg.create_if_missing);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(cfg.max_open_files);
        db_opts.set_write_buffer_size(cfg.write_buffer_size_mb * 1024 * 1024);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors).map_err(storage_err)?;
        tracing::info!(path = %path.as_ref().display(), "opened ledger database");
        Ok(Self { db: Arc::new(db) })
    }

    pub fn coin_store(&self) -> RocksCoinStore {
        RocksCoinStore { db: Arc::clone(&self.db) }
    }

    pub fn undo_store(&self) -> RocksUndoStore {
        RocksUndoStore { db: Arc::clone(&self.db) }
    }

    /// Flush memtables to disk.
    pub fn flush(&self) -> Result<(), LedgerError> {
        for name in ALL_CFS {
            self.db.flush_cf(cf_handle(&self.db, name)?).map_err(storage_err)?;
        }
        Ok(())
    }

    /// Compact every column family. Reclaims space left by spent coins.
    pub fn compact(&self) -> Result<(), LedgerError> {
        for name in ALL_CFS {
            let cf = cf_handle(&self.db, name)?;
            self.db.compact_range_cf(cf, None::<&[u8]>, None::<&[u8]>);
        }
        Ok(())
    }

    /// Number of stored coin records. Walks the whole column family.
    pub fn coin_count(&self) -> Result<u64, LedgerError> {
        let cf = cf_handle(&self.db, CF_COINS)?;
        let mut count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item.map_err(storage_err)?;
            count += 1;
        }
        Ok(count)
    }
}

/// Coin repository over the `coins` and `meta` column families.
#[derive(Clone)]
pub struct RocksCoinStore {
    db: Arc<DB>,
}

impl RocksCoinStore {
    /// Every stored record, in txid byte order.
    pub fn records(&self) -> Result<Vec<(Hash256, CoinRecord)>, LedgerError> {
        let cf = cf_handle(&self.db, CF_COINS)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item.map_err(storage_err)?;
            let txid = Self::decode_key(&key)?;
            out.push((txid, Self::decode_record(txid, &value)?));
        }
        Ok(out)
    }

    fn decode_key(key: &[u8]) -> Result<Hash256, LedgerError> {
        let bytes: [u8; 32] = key
            .try_into()
            .map_err(|_| LedgerError::Storage(format!("invalid coin key length: {}", key.len())))?;
        Ok(Hash256(bytes))
    }

    fn decode_record(txid: Hash256, bytes: &[u8]) -> Result<CoinRecord, LedgerError> {
        CoinRecord::decode(bytes).map_err(|source| CorruptionError::MalformedCoins { txid, source }.into())
    }
}

impl CoinRepository for RocksCoinStore {
    fn get(&self, txid: &Hash256) -> Result<Option<CoinRecord>, LedgerError> {
        let cf = cf_handle(&self.db, CF_COINS)?;
        match self.db.get_cf(cf, txid.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Self::decode_record(*txid, &bytes).map(Some),
            None => Ok(None),
        }
    }

    fn put(&mut self, txid: Hash256, record: CoinRecord) -> Result<(), LedgerError> {
        if record.is_pruned() {
            return Err(LedgerError::PrunedRecordWrite(txid));
        }
        let cf = cf_handle(&self.db, CF_COINS)?;
        self.db
            .put_cf(cf, txid.as_bytes(), record.encode()?)
            .map_err(storage_err)
    }

    fn delete(&mut self, txid: &Hash256) -> Result<(), LedgerError> {
        let cf = cf_handle(&self.db, CF_COINS)?;
        self.db.delete_cf(cf, txid.as_bytes()).map_err(storage_err)
    }

    fn best_block(&self) -> Result<Hash256, LedgerError> {
        let cf = cf_handle(&self.db, CF_META)?;
        match self.db.get_cf(cf, META_BEST_BLOCK).map_err(storage_err)? {
            Some(bytes) => {
                let hash: [u8; 32] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| LedgerError::Storage("invalid best block length".into()))?;
                Ok(Hash256(hash))
            }
            None => Ok(Hash256::ZERO),
        }
    }

    fn set_best_block(&mut self, hash: Hash256) -> Result<(), LedgerError> {
        let cf = cf_handle(&self.db, CF_META)?;
        self.db.put_cf(cf, META_BEST_BLOCK, hash.as_bytes()).map_err(storage_err)
    }

    fn apply_changes(&mut self, changes: CoinChanges) -> Result<(), LedgerError> {
        changes.validate()?;
        let cf_coins = cf_handle(&self.db, CF_COINS)?;
        let cf_meta = cf_handle(&self.db, CF_META)?;

        let mut batch = WriteBatch::default();
        let (mut written, mut deleted) = (0usize, 0usize);
        for (txid, record) in &changes.coins {
            match record {
                Some(record) => {
                    batch.put_cf(cf_coins, txid.as_bytes(), record.encode()?);
                    written += 1;
                }
                None => {
                    batch.delete_cf(cf_coins, txid.as_bytes());
                    deleted += 1;
                }
            }
        }
        if let Some(best) = changes.best_block {
            batch.put_cf(cf_meta, META_BEST_BLOCK, best.as_bytes());
        }
        self.db.write(batch).map_err(storage_err)?;
        tracing::trace!(written, deleted, "committed coin batch");
        Ok(())
    }
}

/// Undo store over the `undo` column family.
#[derive(Clone)]
pub struct RocksUndoStore {
    db: Arc<DB>,
}

impl UndoStore for RocksUndoStore {
    fn get_raw(&self, block: &Hash256) -> Result<Option<Vec<u8>>, LedgerError> {
        let cf = cf_handle(&self.db, CF_UNDO)?;
        self.db.get_cf(cf, block.as_bytes()).map_err(storage_err)
    }

    fn put_raw(&mut self, block: Hash256, bytes: Vec<u8>) -> Result<(), LedgerError> {
        let cf = cf_handle(&self.db, CF_UNDO)?;
        self.db.put_cf(cf, block.as_bytes(), bytes).map_err(storage_err)
    }

    fn delete_raw(&mut self, block: &Hash256) -> Result<(), LedgerError> {
        let cf = cf_handle(&self.db, CF_UNDO)?;
        self.db.delete_cf(cf, block.as_bytes()).map_err(storage_err)
    }
}
