//! Shared chain-building helpers for scenario tests.

use coinview_core::constants::{COIN, OP_CHECKSIG, OP_DUP, OP_EQUALVERIFY, OP_HASH160};
use coinview_core::{
    Block, BlockHeader, ChainParams, Hash256, MemoryBlockTree, MemoryCoinRepository, MemoryUndoStore, OutPoint,
    ReorgEngine, StandardChecker, Transaction, TxIn, TxOut,
};

pub type TestEngine<'a> =
    ReorgEngine<MemoryCoinRepository, MemoryUndoStore, &'a MemoryBlockTree, &'a MemoryBlockTree, StandardChecker>;

/// Coinbase value used by generated blocks. Below the subsidy at any test height.
pub const BLOCK_REWARD: u64 = COIN;

/// Pay-to-pubkey-hash script with a hash filled with `seed`.
pub fn p2pkh(seed: u8) -> Vec<u8> {
    let mut script = vec![OP_DUP, OP_HASH160, 20];
    script.extend_from_slice(&[seed; 20]);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

/// Coinbase whose txid is unique per `(height, tag)`.
pub fn make_coinbase(height: u32, tag: u8, values: &[u64]) -> Transaction {
    let mut script_sig = vec![0x04];
    script_sig.extend_from_slice(&height.to_le_bytes());
    script_sig.push(tag);
    Transaction {
        version: 1,
        inputs: vec![TxIn { previous_output: OutPoint::null(), script_sig, sequence: u32::MAX }],
        outputs: values.iter().map(|&value| TxOut { value, script_pubkey: p2pkh(tag) }).collect(),
        lock_time: 0,
    }
}

/// Unsigned spend of `inputs` paying `(value, seed)` outputs.
pub fn make_tx(inputs: &[OutPoint], outputs: &[(u64, u8)]) -> Transaction {
    Transaction {
        version: 2,
        inputs: inputs
            .iter()
            .map(|&previous_output| TxIn { previous_output, script_sig: vec![], sequence: u32::MAX })
            .collect(),
        outputs: outputs
            .iter()
            .map(|&(value, seed)| TxOut { value, script_pubkey: p2pkh(seed) })
            .collect(),
        lock_time: 0,
    }
}

/// Block on `prev` with a correct merkle root.
pub fn make_block(prev: Hash256, transactions: Vec<Transaction>) -> Block {
    let mut block = Block {
        header: BlockHeader {
            version: 1,
            prev_blockhash: prev,
            merkle_root: Hash256::ZERO,
            time: 1_400_000_000,
            bits: 0x207f_ffff,
            nonce: 0,
        },
        transactions,
    };
    block.header.merkle_root = block.compute_merkle_root();
    block
}

pub fn genesis() -> Block {
    make_block(Hash256::ZERO, vec![make_coinbase(0, 0, &[50 * COIN])])
}

/// Regtest rules over `genesis` with coinbase outputs spendable at once.
pub fn test_params(genesis: &Block) -> ChainParams {
    let mut params = ChainParams::with_genesis(genesis.hash());
    params.coinbase_maturity = 0;
    params
}

pub fn memory_engine<'a>(tree: &'a MemoryBlockTree, params: ChainParams) -> TestEngine<'a> {
    ReorgEngine::new(
        MemoryCoinRepository::new(),
        MemoryUndoStore::new(),
        tree,
        tree,
        StandardChecker::new(params.clone()),
        params,
    )
}

/// One branch of a generated chain: its tip and the outputs still unspent on it.
///
/// Cloning a branch forks it; both copies then spend the same coins.
#[derive(Debug, Clone)]
pub struct Branch {
    pub tip: Hash256,
    pub height: u32,
    tag: u8,
    unspent: Vec<(OutPoint, u64)>,
}

impl Branch {
    /// A branch starting at `genesis`, which creates no coins.
    pub fn from_genesis(genesis: &Block, tag: u8) -> Self {
        Self {
            tip: genesis.hash(),
            height: 0,
            tag,
            unspent: Vec::new(),
        }
    }

    /// Copy of this branch whose blocks differ from this one's.
    pub fn fork(&self, tag: u8) -> Self {
        Self { tag, ..self.clone() }
    }

    pub fn unspent(&self) -> &[(OutPoint, u64)] {
        &self.unspent
    }

    /// Build the next block: a coinbase plus `spends` transactions, each
    /// splitting the oldest unspent output in two.
    pub fn next_block(&mut self, spends: usize) -> Block {
        let height = self.height + 1;
        let coinbase = make_coinbase(height, self.tag, &[BLOCK_REWARD]);
        let mut created = vec![(OutPoint { txid: coinbase.txid(), vout: 0 }, BLOCK_REWARD)];
        let mut txs = vec![coinbase];

        for _ in 0..spends {
            if self.unspent.is_empty() {
                break;
            }
            let (outpoint, value) = self.unspent.remove(0);
            let half = value / 2;
            let tx = make_tx(&[outpoint], &[(half, self.tag), (value - half, height as u8)]);
            let txid = tx.txid();
            self.unspent.push((OutPoint { txid, vout: 0 }, half));
            self.unspent.push((OutPoint { txid, vout: 1 }, value - half));
            txs.push(tx);
        }

        self.unspent.append(&mut created);
        let block = make_block(self.tip, txs);
        self.tip = block.hash();
        self.height = height;
        block
    }
}
