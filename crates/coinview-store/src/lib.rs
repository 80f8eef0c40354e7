//! # coinview-store
//! Persistent backends and process plumbing for the coinview ledger:
//! a RocksDB coin repository and undo store sharing one database, layered
//! configuration, and logging setup.

pub mod config;
pub mod logging;
pub mod rocks;

pub use crate::config::{LedgerConfig, RocksConfig};
pub use logging::init_logging;
pub use rocks::{LedgerDb, RocksCoinStore, RocksUndoStore};
