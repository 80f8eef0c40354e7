//! # coinview-core
//! The UTXO ledger engine: compact coin records, block undo logs, layered
//! coin repositories, and the connect/disconnect state machine that keeps the
//! set consistent with the chain it tracks.

pub mod chain;
pub mod checker;
pub mod coins;
pub mod compressor;
pub mod constants;
pub mod encode;
pub mod engine;
pub mod error;
pub mod overlay;
pub mod params;
pub mod repository;
pub mod shared;
pub mod traits;
pub mod types;
pub mod undo;
pub mod undo_store;

pub use chain::MemoryBlockTree;
pub use checker::StandardChecker;
pub use coins::CoinRecord;
pub use engine::{ConnectSummary, DisconnectSummary, ReorgEngine, ReorgOutcome, ReorgState};
pub use error::{CodecError, ConsensusError, CorruptionError, LedgerError};
pub use overlay::CoinOverlay;
pub use params::{ChainParams, Network};
pub use repository::{CoinChanges, CoinRepository, MemoryCoinRepository};
pub use traits::{BlockRef, BlockSource, ChainIndex, ConsensusChecker, SpentCoin};
pub use types::{Block, BlockHeader, Hash256, OutPoint, Transaction, TxIn, TxOut};
pub use undo::{BlockUndo, CoinMeta, SpentOutput, TxUndo};
pub use undo_store::{MemoryUndoStore, UndoStore};
