//! The reorg engine: applies and reverses blocks against the coin repository.
//!
//! Every block is applied to a [`CoinOverlay`] first. Only when the whole
//! block has been checked is its undo record written and the overlay's
//! changes, including the best-block move, committed in one
//! [`CoinRepository::apply_changes`]. A rejected block leaves the repository
//! untouched.
//!
//! The engine assumes it is the only writer of its repository and undo store.

use tracing::{debug, error, info, warn};

use crate::coins::CoinRecord;
use crate::error::{ConsensusError, CorruptionError, LedgerError};
use crate::overlay::CoinOverlay;
use crate::params::{ChainParams, is_bip30_exception};
use crate::repository::{CoinChanges, CoinRepository};
use crate::traits::{BlockRef, BlockSource, ChainIndex, ConsensusChecker, SpentCoin};
use crate::types::{Block, Hash256, Transaction};
use crate::undo::{BlockUndo, TxUndo};
use crate::undo_store::UndoStore;

/// Where the engine is in a [`ReorgEngine::reorganize_to`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReorgState {
    #[default]
    Idle,
    Disconnecting,
    Connecting,
    /// The last reorganization stopped on an error. The repository reflects
    /// every block handled before the failing one.
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectSummary {
    pub hash: Hash256,
    pub height: u32,
    pub transactions: usize,
    /// Live outputs created.
    pub outputs_created: usize,
    pub inputs_spent: usize,
    pub fees: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisconnectSummary {
    pub hash: Hash256,
    pub height: u32,
    pub outputs_removed: usize,
    pub inputs_restored: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReorgOutcome {
    /// Last block shared by the old and new chains. `None` if they share none.
    pub fork: Option<BlockRef>,
    /// Disconnected blocks, tip first.
    pub disconnected: Vec<Hash256>,
    /// Connected blocks, lowest first.
    pub connected: Vec<Hash256>,
}

pub struct ReorgEngine<R, U, B, C, K> {
    coins: R,
    undo: U,
    blocks: B,
    chain: C,
    checker: K,
    params: ChainParams,
    state: ReorgState,
}

impl<R, U, B, C, K> ReorgEngine<R, U, B, C, K>
where
    R: CoinRepository,
    U: UndoStore,
    B: BlockSource,
    C: ChainIndex,
    K: ConsensusChecker,
{
    pub fn new(coins: R, undo: U, blocks: B, chain: C, checker: K, params: ChainParams) -> Self {
        Self {
            coins,
            undo,
            blocks,
            chain,
            checker,
            params,
            state: ReorgState::Idle,
        }
    }

    pub fn state(&self) -> ReorgState {
        self.state
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn coins(&self) -> &R {
        &self.coins
    }

    pub fn undo_store(&self) -> &U {
        &self.undo
    }

    pub fn undo_store_mut(&mut self) -> &mut U {
        &mut self.undo
    }

    pub fn into_parts(self) -> (R, U) {
        (self.coins, self.undo)
    }

    /// Apply `block` at `height` on top of the repository's best block.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::OutOfOrder`] if the best block is not the block's parent
    /// - [`LedgerError::Rejected`] if the block breaks a consensus rule; nothing is written
    pub fn connect_block(&mut self, block: &Block, height: u32) -> Result<ConnectSummary, LedgerError> {
        let hash = block.hash();
        let prev = block.prev_hash();
        let best = self.coins.best_block()?;
        if best != prev {
            error!(%hash, %best, "connecting blocks out of order");
            return Err(LedgerError::OutOfOrder {
                action: "connecting",
                best,
                expected: prev,
            });
        }

        if hash == self.params.genesis_hash {
            self.coins.apply_changes(CoinChanges {
                best_block: Some(hash),
                ..CoinChanges::default()
            })?;
            debug!(%hash, "connected genesis block");
            return Ok(ConnectSummary {
                hash,
                height,
                transactions: block.transactions.len(),
                ..ConnectSummary::default()
            });
        }

        let (undo, summary, changes) = {
            let mut view = self.coins.layered();
            let (undo, summary) = self
                .apply_block(&mut view, block, height, hash)
                .inspect_err(|e| match e.reject_code() {
                    Some(code) => warn!(%hash, height, code, "block rejected: {e}"),
                    None if e.is_fatal() => error!(%hash, height, "connect failed: {e}"),
                    None => {}
                })?;
            view.set_best_block(hash)?;
            (undo, summary, view.into_changes())
        };

        self.undo.write_undo(hash, &prev, &undo)?;
        self.coins.apply_changes(changes)?;
        debug!(
            %hash,
            height,
            txs = summary.transactions,
            created = summary.outputs_created,
            spent = summary.inputs_spent,
            "connected block"
        );
        Ok(summary)
    }

    /// Reverse `block`, which must be the repository's best block.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::OutOfOrder`] if `block` is not the best block
    /// - [`LedgerError::Corruption`] if undo data is missing, fails its
    ///   checksum, or disagrees with the block or the stored coins
    pub fn disconnect_block(&mut self, block: &Block, height: u32) -> Result<DisconnectSummary, LedgerError> {
        let hash = block.hash();
        let prev = block.prev_hash();
        let best = self.coins.best_block()?;
        if best != hash {
            error!(%hash, %best, "disconnecting blocks out of order");
            return Err(LedgerError::OutOfOrder {
                action: "disconnecting",
                best,
                expected: hash,
            });
        }

        if hash == self.params.genesis_hash {
            self.coins.apply_changes(CoinChanges {
                best_block: Some(prev),
                ..CoinChanges::default()
            })?;
            debug!(%hash, "disconnected genesis block");
            return Ok(DisconnectSummary { hash, height, ..DisconnectSummary::default() });
        }

        let result = self.undo.read_undo(&hash, &prev).and_then(|undo| {
            let mut view = self.coins.layered();
            let summary = self.revert_block(&mut view, block, height, hash, &undo)?;
            view.set_best_block(prev)?;
            Ok((summary, view.into_changes()))
        });
        let (summary, changes) = result.inspect_err(|e| {
            if e.is_fatal() {
                error!(%hash, height, "disconnect failed: {e}");
            }
        })?;

        self.coins.apply_changes(changes)?;
        debug!(
            %hash,
            height,
            removed = summary.outputs_removed,
            restored = summary.inputs_restored,
            "disconnected block"
        );
        Ok(summary)
    }

    /// Move the repository to the chain ending at `target`: disconnect back to
    /// the fork point, then connect forward.
    ///
    /// On error the state becomes [`ReorgState::Failed`] and the repository
    /// stays at the last block successfully handled. Nothing is retried.
    pub fn reorganize_to(&mut self, target: &Hash256) -> Result<ReorgOutcome, LedgerError> {
        self.state = ReorgState::Idle;
        let result = self.run_reorg(target);
        self.state = match result {
            Ok(_) => ReorgState::Idle,
            Err(_) => ReorgState::Failed,
        };
        result
    }

    fn run_reorg(&mut self, target: &Hash256) -> Result<ReorgOutcome, LedgerError> {
        let start = self.coins.best_block()?;
        self.chain.require(target)?;
        let fork = self.chain.lowest_common_ancestor(&start, target)?;
        let fork_hash = fork.map_or(Hash256::ZERO, |f| f.hash);
        info!(
            from = %start,
            to = %target,
            fork_height = ?fork.map(|f| f.height),
            "reorganizing"
        );

        self.state = ReorgState::Disconnecting;
        let mut disconnected = Vec::new();
        loop {
            let best = self.coins.best_block()?;
            if best == fork_hash {
                break;
            }
            let r = self.chain.require(&best)?;
            let block = self.fetch(&best)?;
            self.disconnect_block(&block, r.height)?;
            disconnected.push(best);
        }

        self.state = ReorgState::Connecting;
        let mut connected = Vec::new();
        for r in self.chain.path(fork.as_ref().map(|f| &f.hash), target)? {
            let block = self.fetch(&r.hash)?;
            self.connect_block(&block, r.height)?;
            connected.push(r.hash);
        }

        info!(
            disconnected = disconnected.len(),
            connected = connected.len(),
            tip = %target,
            "reorganization complete"
        );
        Ok(ReorgOutcome { fork, disconnected, connected })
    }

    fn fetch(&self, hash: &Hash256) -> Result<Block, LedgerError> {
        self.blocks.block(hash)?.ok_or(LedgerError::BlockNotFound(*hash))
    }

    /// Outputs spent by a non-coinbase transaction, in input order.
    fn spent_coins(view: &CoinOverlay<'_, R>, tx: &Transaction) -> Result<Vec<SpentCoin>, LedgerError> {
        let mut spent = Vec::with_capacity(tx.inputs.len());
        for input in &tx.inputs {
            let outpoint = input.previous_output;
            let record = view.get(&outpoint.txid)?;
            let Some((record, output)) = record
                .as_ref()
                .and_then(|r| r.output(outpoint.vout).map(|o| (r, o.clone())))
            else {
                return Err(ConsensusError::MissingInputs(outpoint).into());
            };
            spent.push(SpentCoin {
                outpoint,
                output,
                height: record.height(),
                is_coinbase: record.is_coinbase(),
            });
        }
        Ok(spent)
    }

    fn apply_block(
        &self,
        view: &mut CoinOverlay<'_, R>,
        block: &Block,
        height: u32,
        hash: Hash256,
    ) -> Result<(BlockUndo, ConnectSummary), LedgerError> {
        // Disconnecting relies on exactly one leading coinbase.
        if !block.transactions.first().is_some_and(Transaction::is_coinbase) {
            return Err(ConsensusError::MissingCoinbase.into());
        }
        if let Some(index) = block.transactions.iter().skip(1).position(Transaction::is_coinbase) {
            return Err(ConsensusError::MultipleCoinbases(index + 1).into());
        }

        let txids: Vec<Hash256> = block.transactions.iter().map(Transaction::txid).collect();

        if !is_bip30_exception(height, &hash) {
            for txid in &txids {
                if view.get(txid)?.is_some() {
                    return Err(ConsensusError::DuplicateTransaction(*txid).into());
                }
            }
        }

        let p2sh = self.checker.p2sh_active(&block.header);
        let max_sigops = self.checker.max_block_sigops();
        let mut sigops = 0usize;
        let mut undo = BlockUndo::default();
        let mut summary = ConnectSummary {
            hash,
            height,
            transactions: block.transactions.len(),
            ..ConnectSummary::default()
        };

        for (tx, txid) in block.transactions.iter().zip(&txids) {
            sigops += self.checker.legacy_sigops(tx);
            if sigops > max_sigops {
                return Err(ConsensusError::TooManySigops { count: sigops, max: max_sigops }.into());
            }

            if !tx.is_coinbase() {
                let spent = Self::spent_coins(view, tx)?;
                if p2sh {
                    sigops += self.checker.p2sh_sigops(tx, &spent);
                    if sigops > max_sigops {
                        return Err(ConsensusError::TooManySigops { count: sigops, max: max_sigops }.into());
                    }
                }
                let fee = self.checker.check_inputs(tx, &spent, height)?;
                summary.fees = summary.fees.saturating_add(fee);
                self.checker.verify_scripts(tx, &spent)?;

                let mut tx_undo = TxUndo { spent: Vec::with_capacity(tx.inputs.len()) };
                for input in &tx.inputs {
                    let outpoint = input.previous_output;
                    let mut record = view
                        .get(&outpoint.txid)?
                        .ok_or(ConsensusError::MissingInputs(outpoint))?;
                    let snapshot = record
                        .spend(outpoint.vout)
                        .ok_or(ConsensusError::MissingInputs(outpoint))?;
                    view.update(outpoint.txid, record)?;
                    tx_undo.spent.push(snapshot);
                }
                summary.inputs_spent += tx.inputs.len();
                undo.txs.push(tx_undo);
            }

            let record = CoinRecord::from_transaction(tx, height);
            summary.outputs_created += record.live_outputs().count();
            view.update(*txid, record)?;
        }

        let limit = self.checker.block_subsidy(height).saturating_add(summary.fees);
        let paid = block
            .coinbase()
            .map_or(Some(0), Transaction::total_output_value)
            .unwrap_or(u64::MAX);
        if paid > limit {
            return Err(ConsensusError::CoinbaseTooLarge { paid, limit }.into());
        }

        Ok((undo, summary))
    }

    fn revert_block(
        &self,
        view: &mut CoinOverlay<'_, R>,
        block: &Block,
        height: u32,
        hash: Hash256,
        undo: &BlockUndo,
    ) -> Result<DisconnectSummary, LedgerError> {
        if undo.txs.len() + 1 != block.transactions.len() {
            return Err(CorruptionError::UndoBlockMismatch {
                block: hash,
                undo_txs: undo.txs.len(),
                block_txs: block.transactions.len(),
            }
            .into());
        }

        let mut summary = DisconnectSummary { hash, height, ..DisconnectSummary::default() };
        for (i, tx) in block.transactions.iter().enumerate().rev() {
            let txid = tx.txid();

            // The outputs must be exactly what connecting created.
            let mut current = view.get(&txid)?.unwrap_or_default();
            current.clear_unspendable();
            let created = CoinRecord::from_transaction(tx, height);
            if current != created {
                return Err(CorruptionError::OutputsMismatch(txid).into());
            }
            summary.outputs_removed += created.live_outputs().count();
            view.delete(&txid)?;

            if i == 0 {
                continue;
            }
            let tx_undo = &undo.txs[i - 1];
            if tx_undo.spent.len() != tx.inputs.len() {
                return Err(CorruptionError::UndoTxMismatch {
                    txid,
                    undo_inputs: tx_undo.spent.len(),
                    tx_inputs: tx.inputs.len(),
                }
                .into());
            }
            for (input, spent) in tx.inputs.iter().zip(&tx_undo.spent).rev() {
                let outpoint = input.previous_output;
                let mut record = view.get(&outpoint.txid)?.unwrap_or_default();
                match spent.creation {
                    Some(meta) => {
                        if !record.is_pruned() {
                            return Err(CorruptionError::OverwritingTransaction(outpoint.txid).into());
                        }
                        record = CoinRecord::from_meta(meta);
                    }
                    None if record.is_pruned() => {
                        return Err(CorruptionError::MissingTransaction(outpoint.txid).into());
                    }
                    None => {}
                }
                if !record.restore(outpoint.vout, spent.output.clone()) {
                    return Err(CorruptionError::OverwritingOutput(outpoint).into());
                }
                view.put(outpoint.txid, record)?;
                summary.inputs_restored += 1;
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MemoryBlockTree;
    use crate::checker::StandardChecker;
    use crate::constants::{COIN, OP_CHECKSIG, OP_RETURN};
    use crate::repository::MemoryCoinRepository;
    use crate::types::{BlockHeader, OutPoint, TxIn, TxOut};
    use crate::undo_store::MemoryUndoStore;

    type TestEngine<'a> =
        ReorgEngine<MemoryCoinRepository, MemoryUndoStore, &'a MemoryBlockTree, &'a MemoryBlockTree, StandardChecker>;

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn script(tag: u8) -> Vec<u8> {
        vec![0x01, tag, OP_CHECKSIG]
    }

    fn coinbase(height: u32, tag: u8, values: &[u64]) -> Transaction {
        let mut script_sig = vec![0x04];
        script_sig.extend_from_slice(&height.to_le_bytes());
        script_sig.push(tag);
        Transaction {
            version: 1,
            inputs: vec![TxIn { previous_output: OutPoint::null(), script_sig, sequence: u32::MAX }],
            outputs: values.iter().map(|&value| TxOut { value, script_pubkey: script(tag) }).collect(),
            lock_time: 0,
        }
    }

    fn spend(prevouts: &[OutPoint], values: &[u64]) -> Transaction {
        Transaction {
            version: 2,
            inputs: prevouts
                .iter()
                .map(|&previous_output| TxIn { previous_output, script_sig: vec![], sequence: u32::MAX })
                .collect(),
            outputs: values.iter().map(|&value| TxOut { value, script_pubkey: script(0xee) }).collect(),
            lock_time: 0,
        }
    }

    fn make_block(prev: Hash256, txs: Vec<Transaction>) -> Block {
        let mut block = Block {
            header: BlockHeader {
                version: 1,
                prev_blockhash: prev,
                merkle_root: Hash256::ZERO,
                time: 1_400_000_000,
                bits: 0x207f_ffff,
                nonce: 0,
            },
            transactions: txs,
        };
        block.header.merkle_root = block.compute_merkle_root();
        block
    }

    fn op(tx: &Transaction, vout: u32) -> OutPoint {
        OutPoint { txid: tx.txid(), vout }
    }

    fn genesis() -> Block {
        make_block(Hash256::ZERO, vec![coinbase(0, 0, &[50 * COIN])])
    }

    fn engine<'a>(tree: &'a MemoryBlockTree, genesis: &Block) -> TestEngine<'a> {
        let mut params = ChainParams::with_genesis(genesis.hash());
        params.coinbase_maturity = 0;
        ReorgEngine::new(
            MemoryCoinRepository::new(),
            MemoryUndoStore::new(),
            tree,
            tree,
            StandardChecker::new(params.clone()),
            params,
        )
    }

    /// Genesis plus one block paying two coinbase outputs.
    fn started<'a>(tree: &'a MemoryBlockTree) -> (TestEngine<'a>, Block) {
        let g = genesis();
        let mut e = engine(tree, &g);
        e.connect_block(&g, 0).unwrap();
        let b1 = make_block(g.hash(), vec![coinbase(1, 1, &[30 * COIN, 20 * COIN])]);
        e.connect_block(&b1, 1).unwrap();
        (e, b1)
    }

    // ------------------------------------------------------------------
    // Connect
    // ------------------------------------------------------------------

    #[test]
    fn genesis_only_moves_best_block() {
        let tree = MemoryBlockTree::new();
        let g = genesis();
        let mut e = engine(&tree, &g);
        let summary = e.connect_block(&g, 0).unwrap();
        assert_eq!(summary.outputs_created, 0);
        assert_eq!(e.coins().best_block().unwrap(), g.hash());
        assert!(e.coins().is_empty());
        assert!(e.undo_store().is_empty());
    }

    #[test]
    fn connect_creates_coinbase_record_and_undo() {
        let tree = MemoryBlockTree::new();
        let (e, b1) = started(&tree);
        let cb = &b1.transactions[0];
        let record = e.coins().get(&cb.txid()).unwrap().unwrap();
        assert!(record.is_coinbase());
        assert_eq!(record.height(), 1);
        assert_eq!(record.total_unspent_value(), 50 * COIN);
        assert_eq!(e.coins().best_block().unwrap(), b1.hash());
        let undo = e.undo_store().read_undo(&b1.hash(), &b1.prev_hash()).unwrap();
        assert!(undo.txs.is_empty());
    }

    #[test]
    fn connect_out_of_order_is_fatal() {
        let tree = MemoryBlockTree::new();
        let g = genesis();
        let mut e = engine(&tree, &g);
        let orphan = make_block(Hash256([9; 32]), vec![coinbase(1, 1, &[COIN])]);
        let err = e.connect_block(&orphan, 1).unwrap_err();
        assert!(matches!(err, LedgerError::OutOfOrder { action: "connecting", .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn spend_records_undo_with_metadata_on_prune() {
        let tree = MemoryBlockTree::new();
        let (mut e, b1) = started(&tree);
        let cb = &b1.transactions[0];
        // Spend both outputs: the second spend prunes the record.
        let tx = spend(&[op(cb, 0), op(cb, 1)], &[49 * COIN]);
        let b2 = make_block(b1.hash(), vec![coinbase(2, 2, &[50 * COIN]), tx.clone()]);
        let summary = e.connect_block(&b2, 2).unwrap();
        assert_eq!(summary.inputs_spent, 2);
        assert_eq!(summary.fees, COIN);

        assert_eq!(e.coins().get(&cb.txid()).unwrap(), None);
        assert!(e.coins().have_unspent_output(&op(&tx, 0)).unwrap());

        let undo = e.undo_store().read_undo(&b2.hash(), &b1.hash()).unwrap();
        assert_eq!(undo.txs.len(), 1);
        assert_eq!(undo.txs[0].spent[0].creation, None);
        let meta = undo.txs[0].spent[1].creation.unwrap();
        assert_eq!((meta.height, meta.version, meta.is_coinbase), (1, 1, true));
    }

    #[test]
    fn missing_input_rejected_without_writes() {
        let tree = MemoryBlockTree::new();
        let (mut e, b1) = started(&tree);
        let before = e.coins().snapshot().unwrap();
        let tx = spend(&[OutPoint { txid: Hash256([7; 32]), vout: 0 }], &[1]);
        let b2 = make_block(b1.hash(), vec![coinbase(2, 2, &[COIN]), tx]);
        let err = e.connect_block(&b2, 2).unwrap_err();
        assert_eq!(err.reject_code(), Some("bad-txns-inputs-missingorspent"));
        assert_eq!(e.coins().snapshot().unwrap(), before);
        assert!(e.undo_store().get_raw(&b2.hash()).unwrap().is_none());
    }

    #[test]
    fn double_spend_in_one_block_rejected() {
        let tree = MemoryBlockTree::new();
        let (mut e, b1) = started(&tree);
        let cb = &b1.transactions[0];
        let b2 = make_block(
            b1.hash(),
            vec![
                coinbase(2, 2, &[COIN]),
                spend(&[op(cb, 0)], &[COIN]),
                spend(&[op(cb, 0)], &[2 * COIN]),
            ],
        );
        let err = e.connect_block(&b2, 2).unwrap_err();
        assert_eq!(err.reject_code(), Some("bad-txns-inputs-missingorspent"));
        assert_eq!(e.coins().best_block().unwrap(), b1.hash());
    }

    #[test]
    fn block_without_transactions_rejected() {
        let tree = MemoryBlockTree::new();
        let (mut e, b1) = started(&tree);
        let before = e.coins().snapshot().unwrap();
        let empty = make_block(b1.hash(), vec![]);
        let err = e.connect_block(&empty, 2).unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(ConsensusError::MissingCoinbase)));
        assert_eq!(err.reject_code(), Some("bad-cb-missing"));
        assert_eq!(e.coins().snapshot().unwrap(), before);
        assert!(e.undo_store().get_raw(&empty.hash()).unwrap().is_none());
    }

    #[test]
    fn block_not_led_by_coinbase_rejected() {
        let tree = MemoryBlockTree::new();
        let (mut e, b1) = started(&tree);
        let cb = &b1.transactions[0];
        let b2 = make_block(b1.hash(), vec![spend(&[op(cb, 0)], &[COIN]), coinbase(2, 2, &[COIN])]);
        let err = e.connect_block(&b2, 2).unwrap_err();
        assert_eq!(err.reject_code(), Some("bad-cb-missing"));
        assert_eq!(e.coins().best_block().unwrap(), b1.hash());
    }

    #[test]
    fn second_coinbase_rejected() {
        let tree = MemoryBlockTree::new();
        let (mut e, b1) = started(&tree);
        let b2 = make_block(b1.hash(), vec![coinbase(2, 2, &[COIN]), coinbase(2, 3, &[COIN])]);
        let err = e.connect_block(&b2, 2).unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(ConsensusError::MultipleCoinbases(1))));
        assert_eq!(err.reject_code(), Some("bad-cb-multiple"));
        assert_eq!(e.coins().best_block().unwrap(), b1.hash());

        // The chain still extends and unwinds normally afterwards.
        let good = make_block(b1.hash(), vec![coinbase(2, 2, &[COIN])]);
        e.connect_block(&good, 2).unwrap();
        e.disconnect_block(&good, 2).unwrap();
        assert_eq!(e.coins().best_block().unwrap(), b1.hash());
    }

    #[test]
    fn duplicate_unspent_txid_rejected() {
        let tree = MemoryBlockTree::new();
        let (mut e, b1) = started(&tree);
        // Same coinbase as block 1, so the same txid.
        let b2 = make_block(b1.hash(), vec![b1.transactions[0].clone()]);
        let err = e.connect_block(&b2, 2).unwrap_err();
        assert_eq!(err.reject_code(), Some("bad-txns-BIP30"));
    }

    #[test]
    fn duplicate_of_fully_spent_txid_allowed() {
        let tree = MemoryBlockTree::new();
        let (mut e, b1) = started(&tree);
        let cb = &b1.transactions[0];
        let b2 = make_block(
            b1.hash(),
            vec![coinbase(2, 2, &[COIN]), spend(&[op(cb, 0), op(cb, 1)], &[50 * COIN])],
        );
        e.connect_block(&b2, 2).unwrap();
        let b3 = make_block(b2.hash(), vec![cb.clone()]);
        e.connect_block(&b3, 3).unwrap();
        assert!(e.coins().have_unspent_output(&op(cb, 1)).unwrap());
    }

    #[test]
    fn coinbase_paying_more_than_subsidy_and_fees_rejected() {
        let tree = MemoryBlockTree::new();
        let (mut e, b1) = started(&tree);
        let cb = &b1.transactions[0];
        let b2 = make_block(
            b1.hash(),
            vec![coinbase(2, 2, &[50 * COIN + COIN + 1]), spend(&[op(cb, 1)], &[19 * COIN])],
        );
        let err = e.connect_block(&b2, 2).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Rejected(ConsensusError::CoinbaseTooLarge { paid, limit })
                if paid == 51 * COIN + 1 && limit == 51 * COIN
        ));
    }

    #[test]
    fn too_many_sigops_rejected() {
        let tree = MemoryBlockTree::new();
        let (mut e, b1) = started(&tree);
        let mut cb = coinbase(2, 2, &[COIN]);
        cb.outputs.push(TxOut { value: 0, script_pubkey: vec![OP_CHECKSIG; 20_001] });
        let b2 = make_block(b1.hash(), vec![cb]);
        let err = e.connect_block(&b2, 2).unwrap_err();
        assert_eq!(err.reject_code(), Some("bad-blk-sigops"));
    }

    #[test]
    fn spend_within_same_block() {
        let tree = MemoryBlockTree::new();
        let (mut e, b1) = started(&tree);
        let before = e.coins().snapshot().unwrap();
        let cb = &b1.transactions[0];
        let t1 = spend(&[op(cb, 0)], &[10 * COIN, 20 * COIN]);
        let t2 = spend(&[op(&t1, 1)], &[20 * COIN]);
        let b2 = make_block(b1.hash(), vec![coinbase(2, 2, &[50 * COIN]), t1.clone(), t2.clone()]);
        e.connect_block(&b2, 2).unwrap();
        assert!(e.coins().have_unspent_output(&op(&t1, 0)).unwrap());
        assert!(!e.coins().have_unspent_output(&op(&t1, 1)).unwrap());
        assert!(e.coins().have_unspent_output(&op(&t2, 0)).unwrap());

        e.disconnect_block(&b2, 2).unwrap();
        assert_eq!(e.coins().snapshot().unwrap(), before);
    }

    #[test]
    fn op_return_outputs_never_stored() {
        let tree = MemoryBlockTree::new();
        let (mut e, b1) = started(&tree);
        let cb = &b1.transactions[0];
        let mut tx = spend(&[op(cb, 0)], &[]);
        tx.outputs.push(TxOut { value: 0, script_pubkey: vec![OP_RETURN, 0x01, 0xff] });
        let b2 = make_block(b1.hash(), vec![coinbase(2, 2, &[50 * COIN]), tx.clone()]);
        e.connect_block(&b2, 2).unwrap();
        assert_eq!(e.coins().get(&tx.txid()).unwrap(), None);
        e.disconnect_block(&b2, 2).unwrap();
        assert!(e.coins().have_unspent_output(&op(cb, 0)).unwrap());
    }

    // ------------------------------------------------------------------
    // Disconnect
    // ------------------------------------------------------------------

    #[test]
    fn disconnect_restores_previous_state() {
        let tree = MemoryBlockTree::new();
        let (mut e, b1) = started(&tree);
        let before = e.coins().snapshot().unwrap();
        let cb = &b1.transactions[0];
        let b2 = make_block(
            b1.hash(),
            vec![coinbase(2, 2, &[50 * COIN]), spend(&[op(cb, 0), op(cb, 1)], &[50 * COIN])],
        );
        e.connect_block(&b2, 2).unwrap();
        let summary = e.disconnect_block(&b2, 2).unwrap();
        assert_eq!(summary.inputs_restored, 2);
        assert_eq!(summary.outputs_removed, 2);
        assert_eq!(e.coins().snapshot().unwrap(), before);
    }

    #[test]
    fn disconnect_genesis_returns_to_empty() {
        let tree = MemoryBlockTree::new();
        let (mut e, b1) = started(&tree);
        e.disconnect_block(&b1, 1).unwrap();
        e.disconnect_block(&genesis(), 0).unwrap();
        assert_eq!(e.coins().best_block().unwrap(), Hash256::ZERO);
        assert!(e.coins().is_empty());
    }

    #[test]
    fn disconnect_non_tip_is_fatal() {
        let tree = MemoryBlockTree::new();
        let (mut e, _) = started(&tree);
        let err = e.disconnect_block(&genesis(), 0).unwrap_err();
        assert!(matches!(err, LedgerError::OutOfOrder { action: "disconnecting", .. }));
    }

    #[test]
    fn disconnect_without_undo_is_corruption() {
        let tree = MemoryBlockTree::new();
        let (mut e, b1) = started(&tree);
        e.undo_store_mut().delete_raw(&b1.hash()).unwrap();
        let err = e.disconnect_block(&b1, 1).unwrap_err();
        assert!(matches!(err, LedgerError::Corruption(CorruptionError::UndoMissing(_))));
        assert_eq!(e.coins().best_block().unwrap(), b1.hash());
    }

    #[test]
    fn disconnect_with_flipped_undo_byte_is_corruption() {
        let tree = MemoryBlockTree::new();
        let (mut e, b1) = started(&tree);
        let mut raw = e.undo_store().get_raw(&b1.hash()).unwrap().unwrap();
        raw[0] ^= 0x01;
        e.undo_store_mut().put_raw(b1.hash(), raw).unwrap();
        let err = e.disconnect_block(&b1, 1).unwrap_err();
        assert!(matches!(err, LedgerError::Corruption(CorruptionError::ChecksumMismatch(_))));
    }

    #[test]
    fn disconnect_detects_tampered_outputs() {
        let tree = MemoryBlockTree::new();
        let (mut e, b1) = started(&tree);
        // Claim block 1 at the wrong height: the recreated record won't match.
        let err = e.disconnect_block(&b1, 5).unwrap_err();
        assert!(matches!(err, LedgerError::Corruption(CorruptionError::OutputsMismatch(_))));
    }

    #[test]
    fn disconnect_with_undo_for_other_block_shape_is_corruption() {
        let tree = MemoryBlockTree::new();
        let (mut e, b1) = started(&tree);
        let forged = BlockUndo { txs: vec![TxUndo::default()] };
        e.undo_store_mut().write_undo(b1.hash(), &b1.prev_hash(), &forged).unwrap();
        let err = e.disconnect_block(&b1, 1).unwrap_err();
        assert!(matches!(err, LedgerError::Corruption(CorruptionError::UndoBlockMismatch { .. })));
    }

    // ------------------------------------------------------------------
    // Reorganize
    // ------------------------------------------------------------------

    #[test]
    fn reorganize_from_empty_connects_from_genesis() {
        let g = genesis();
        let b1 = make_block(g.hash(), vec![coinbase(1, 1, &[COIN])]);
        let mut tree = MemoryBlockTree::new();
        tree.insert(g.clone()).unwrap();
        tree.insert(b1.clone()).unwrap();

        let mut e = engine(&tree, &g);
        let outcome = e.reorganize_to(&b1.hash()).unwrap();
        assert_eq!(outcome.fork, None);
        assert!(outcome.disconnected.is_empty());
        assert_eq!(outcome.connected, vec![g.hash(), b1.hash()]);
        assert_eq!(e.state(), ReorgState::Idle);
        assert_eq!(e.coins().best_block().unwrap(), b1.hash());
    }

    #[test]
    fn reorganize_switches_branches() {
        let g = genesis();
        let a1 = make_block(g.hash(), vec![coinbase(1, 0xa1, &[COIN])]);
        let b1 = make_block(g.hash(), vec![coinbase(1, 0xb1, &[COIN])]);
        let b2 = make_block(b1.hash(), vec![coinbase(2, 0xb2, &[COIN])]);
        let mut tree = MemoryBlockTree::new();
        for b in [&g, &a1, &b1, &b2] {
            tree.insert((*b).clone()).unwrap();
        }

        let mut e = engine(&tree, &g);
        e.reorganize_to(&a1.hash()).unwrap();
        let outcome = e.reorganize_to(&b2.hash()).unwrap();
        assert_eq!(outcome.fork.unwrap().hash, g.hash());
        assert_eq!(outcome.disconnected, vec![a1.hash()]);
        assert_eq!(outcome.connected, vec![b1.hash(), b2.hash()]);
        assert_eq!(e.coins().get(&a1.transactions[0].txid()).unwrap(), None);
        assert!(e.coins().get(&b2.transactions[0].txid()).unwrap().is_some());
    }

    #[test]
    fn reorganize_failure_sets_failed_state() {
        let g = genesis();
        let b1 = make_block(g.hash(), vec![coinbase(1, 1, &[COIN])]);
        let bad = make_block(
            b1.hash(),
            vec![coinbase(2, 2, &[COIN]), spend(&[OutPoint { txid: Hash256([3; 32]), vout: 0 }], &[1])],
        );
        let mut tree = MemoryBlockTree::new();
        for b in [&g, &b1, &bad] {
            tree.insert((*b).clone()).unwrap();
        }

        let mut e = engine(&tree, &g);
        assert!(e.reorganize_to(&bad.hash()).is_err());
        assert_eq!(e.state(), ReorgState::Failed);
        assert_eq!(e.coins().best_block().unwrap(), b1.hash());

        // A later call starts fresh.
        e.reorganize_to(&b1.hash()).unwrap();
        assert_eq!(e.state(), ReorgState::Idle);
    }

    #[test]
    fn reorganize_to_unknown_target_fails() {
        let tree = MemoryBlockTree::new();
        let g = genesis();
        let mut e = engine(&tree, &g);
        let err = e.reorganize_to(&Hash256([5; 32])).unwrap_err();
        assert!(matches!(err, LedgerError::UnknownBlock(_)));
        assert_eq!(e.state(), ReorgState::Failed);
    }
}
