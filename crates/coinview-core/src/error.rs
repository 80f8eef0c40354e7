//! Error types for the ledger engine.
//!
//! Four concerns are kept apart: malformed bytes ([`CodecError`]), blocks that
//! break consensus rules ([`ConsensusError`]), undo or coin data that no longer
//! agrees with the chain ([`CorruptionError`]), and the umbrella [`LedgerError`]
//! returned by repositories and the reorg engine.
use thiserror::Error;

use crate::types::{Hash256, OutPoint};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of data: needed {needed} more byte(s)")] UnexpectedEof { needed: usize },
    #[error("varint does not fit in 64 bits")] VarIntOverflow,
    #[error("non-canonical compact size")] NonCanonicalCompactSize,
    #[error("length {len} exceeds limit {max}")] OversizedLength { len: u64, max: u64 },
    #[error("{0} trailing byte(s) after record")] TrailingBytes(usize),
    #[error("value {value} does not fit in {target}")] ValueOutOfRange { value: u64, target: &'static str },
    #[error("cannot encode a pruned coin record")] PrunedRecord,
    #[error("amount out of range: {0}")] AmountOutOfRange(u64),
    #[error("compressed amount overflows: {0}")] AmountOverflow(u64),
    #[error("invalid compressed public key")] InvalidPublicKey,
    #[error("undo checksum mismatch")] ChecksumMismatch,
    #[error("invalid hex: {0}")] InvalidHex(String),
}

/// A block or transaction broke a consensus rule. The block is not applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("first transaction is not a coinbase")] MissingCoinbase,
    #[error("extra coinbase at transaction index {0}")] MultipleCoinbases(usize),
    #[error("tried to overwrite transaction {0}")] DuplicateTransaction(Hash256),
    #[error("inputs missing or already spent: {0}")] MissingInputs(OutPoint),
    #[error("too many sigops: {count} > {max}")] TooManySigops { count: usize, max: usize },
    #[error("coinbase pays too much: {paid} > {limit}")] CoinbaseTooLarge { paid: u64, limit: u64 },
    #[error("value in below value out in {txid}: {value_in} < {value_out}")] InputsBelowOutputs { txid: Hash256, value_in: u64, value_out: u64 },
    #[error("premature spend of coinbase {outpoint} at depth {depth}")] PrematureCoinbaseSpend { outpoint: OutPoint, depth: u32 },
    #[error("input values out of range in {0}")] InputValuesOutOfRange(Hash256),
    #[error("script verification failed on input {index} of {txid}")] ScriptVerifyFailed { txid: Hash256, index: usize },
}

impl ConsensusError {
    /// Machine-readable reject reason, matching the strings peers exchange.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCoinbase => "bad-cb-missing",
            Self::MultipleCoinbases(_) => "bad-cb-multiple",
            Self::DuplicateTransaction(_) => "bad-txns-BIP30",
            Self::MissingInputs(_) => "bad-txns-inputs-missingorspent",
            Self::TooManySigops { .. } => "bad-blk-sigops",
            Self::CoinbaseTooLarge { .. } => "bad-cb-amount",
            Self::InputsBelowOutputs { .. } => "bad-txns-in-belowout",
            Self::PrematureCoinbaseSpend { .. } => "bad-txns-premature-spend-of-coinbase",
            Self::InputValuesOutOfRange(_) => "bad-txns-inputvalues-outofrange",
            Self::ScriptVerifyFailed { .. } => "bad-txns-script-verify-failed",
        }
    }
}

/// Stored data disagrees with the chain. The repository must be rebuilt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorruptionError {
    #[error("no undo data available for block {0}")] UndoMissing(Hash256),
    #[error("undo data inconsistent with block {block}: {undo_txs} record(s) for {block_txs} transaction(s)")] UndoBlockMismatch { block: Hash256, undo_txs: usize, block_txs: usize },
    #[error("undo data inconsistent with transaction {txid}: {undo_inputs} snapshot(s) for {tx_inputs} input(s)")] UndoTxMismatch { txid: Hash256, undo_inputs: usize, tx_inputs: usize },
    #[error("undo checksum mismatch for block {0}")] ChecksumMismatch(Hash256),
    #[error("undo record for block {block} is malformed: {source}")] MalformedUndo { block: Hash256, source: CodecError },
    #[error("stored coins for {txid} are malformed: {source}")] MalformedCoins { txid: Hash256, source: CodecError },
    #[error("added transaction mismatch for {0}")] OutputsMismatch(Hash256),
    #[error("undo data overwriting existing transaction {0}")] OverwritingTransaction(Hash256),
    #[error("undo data adding output to missing transaction {0}")] MissingTransaction(Hash256),
    #[error("undo data overwriting existing output {0}")] OverwritingOutput(OutPoint),
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error(transparent)] Codec(#[from] CodecError),
    #[error("block rejected: {0}")] Rejected(#[from] ConsensusError),
    #[error("database corrupted: {0}")] Corruption(#[from] CorruptionError),
    #[error("{action} blocks out of order: repository at {best}, block expects {expected}")] OutOfOrder { action: &'static str, best: Hash256, expected: Hash256 },
    #[error("block not found: {0}")] BlockNotFound(Hash256),
    #[error("block not in chain index: {0}")] UnknownBlock(Hash256),
    #[error("refusing to store pruned coin record for {0}")] PrunedRecordWrite(Hash256),
    #[error("storage: {0}")] Storage(String),
}

impl LedgerError {
    /// Errors after which the repository cannot be trusted or the caller is
    /// misusing the engine. Never retry these automatically.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::OutOfOrder { .. } | Self::Corruption(_))
    }

    /// Reject code when the error is a consensus rejection.
    pub fn reject_code(&self) -> Option<&'static str> {
        match self {
            Self::Rejected(e) => Some(e.code()),
            _ => None,
        }
    }
}
