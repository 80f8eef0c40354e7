//! Reference [`ConsensusChecker`] with pre-segwit Bitcoin rules.
//!
//! Signatures are not verified: [`StandardChecker::verify_scripts`] accepts
//! every input. Callers that need script validation supply their own checker.

use crate::constants::{
    INITIAL_SUBSIDY, MAX_PUBKEYS_PER_MULTISIG, OP_1, OP_16, OP_CHECKMULTISIG,
    OP_CHECKMULTISIGVERIFY, OP_CHECKSIG, OP_CHECKSIGVERIFY, OP_EQUAL, OP_HASH160, OP_PUSHDATA1,
    OP_PUSHDATA2, OP_PUSHDATA4, money_range,
};
use crate::error::ConsensusError;
use crate::params::ChainParams;
use crate::traits::{ConsensusChecker, SpentCoin};
use crate::types::{BlockHeader, Transaction};

#[derive(Debug, Clone)]
pub struct StandardChecker {
    params: ChainParams,
}

impl StandardChecker {
    pub fn new(params: ChainParams) -> Self {
        Self { params }
    }
}

impl Default for StandardChecker {
    fn default() -> Self {
        Self::new(ChainParams::default())
    }
}

/// One parsed instruction: opcode and pushed data (empty for non-pushes).
type Op<'a> = (u8, &'a [u8]);

/// Iterate the instructions of a script. Yields `None` once and stops if a
/// push runs past the end.
struct Instructions<'a> {
    script: &'a [u8],
    pos: usize,
    done: bool,
}

fn instructions(script: &[u8]) -> Instructions<'_> {
    Instructions { script, pos: 0, done: false }
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Option<Op<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos >= self.script.len() {
            return None;
        }
        let opcode = self.script[self.pos];
        self.pos += 1;
        if opcode > OP_PUSHDATA4 {
            return Some(Some((opcode, &[])));
        }
        let width = match opcode {
            OP_PUSHDATA1 => 1,
            OP_PUSHDATA2 => 2,
            OP_PUSHDATA4 => 4,
            _ => 0,
        };
        let len = if width == 0 {
            opcode as usize
        } else {
            let Some(bytes) = self.script.get(self.pos..self.pos + width) else {
                self.done = true;
                return Some(None);
            };
            self.pos += width;
            bytes.iter().rev().fold(0usize, |acc, b| (acc << 8) | *b as usize)
        };
        match self.script.get(self.pos..self.pos.saturating_add(len)) {
            Some(data) => {
                self.pos += len;
                Some(Some((opcode, data)))
            }
            None => {
                self.done = true;
                Some(None)
            }
        }
    }
}

/// Count signature operations. Inaccurate counting charges every
/// CHECKMULTISIG the maximum key count.
pub fn count_sigops(script: &[u8], accurate: bool) -> usize {
    let mut count = 0;
    let mut last = 0xff;
    for op in instructions(script) {
        let Some((opcode, _)) = op else { break };
        match opcode {
            OP_CHECKSIG | OP_CHECKSIGVERIFY => count += 1,
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                if accurate && (OP_1..=OP_16).contains(&last) {
                    count += (last - OP_1 + 1) as usize;
                } else {
                    count += MAX_PUBKEYS_PER_MULTISIG;
                }
            }
            _ => {}
        }
        last = opcode;
    }
    count
}

pub fn is_p2sh(script: &[u8]) -> bool {
    script.len() == 23 && script[0] == OP_HASH160 && script[1] == 20 && script[22] == OP_EQUAL
}

/// Sigops in the redeem script a push-only `script_sig` reveals last.
fn redeem_script_sigops(script_sig: &[u8]) -> usize {
    let mut last_push: &[u8] = &[];
    for op in instructions(script_sig) {
        match op {
            Some((opcode, data)) if opcode <= OP_16 => last_push = data,
            _ => return 0,
        }
    }
    count_sigops(last_push, true)
}

impl ConsensusChecker for StandardChecker {
    fn legacy_sigops(&self, tx: &Transaction) -> usize {
        let inputs: usize = tx.inputs.iter().map(|i| count_sigops(&i.script_sig, false)).sum();
        let outputs: usize = tx.outputs.iter().map(|o| count_sigops(&o.script_pubkey, false)).sum();
        inputs + outputs
    }

    fn p2sh_sigops(&self, tx: &Transaction, spent: &[SpentCoin]) -> usize {
        if tx.is_coinbase() {
            return 0;
        }
        tx.inputs
            .iter()
            .zip(spent)
            .filter(|(_, coin)| is_p2sh(&coin.output.script_pubkey))
            .map(|(input, _)| redeem_script_sigops(&input.script_sig))
            .sum()
    }

    fn check_inputs(&self, tx: &Transaction, spent: &[SpentCoin], height: u32) -> Result<u64, ConsensusError> {
        let txid = tx.txid();
        let mut value_in = 0u64;
        for coin in spent {
            if coin.is_coinbase {
                let depth = height.saturating_sub(coin.height);
                if depth < self.params.coinbase_maturity {
                    return Err(ConsensusError::PrematureCoinbaseSpend {
                        outpoint: coin.outpoint,
                        depth,
                    });
                }
            }
            value_in = value_in
                .checked_add(coin.output.value)
                .filter(|v| money_range(coin.output.value) && money_range(*v))
                .ok_or(ConsensusError::InputValuesOutOfRange(txid))?;
        }
        let value_out = tx.total_output_value().unwrap_or(u64::MAX);
        if value_in < value_out {
            return Err(ConsensusError::InputsBelowOutputs { txid, value_in, value_out });
        }
        Ok(value_in - value_out)
    }

    fn verify_scripts(&self, _tx: &Transaction, _spent: &[SpentCoin]) -> Result<(), ConsensusError> {
        Ok(())
    }

    fn block_subsidy(&self, height: u32) -> u64 {
        let halvings = height / self.params.subsidy_halving_interval;
        if halvings >= 64 {
            return 0;
        }
        INITIAL_SUBSIDY >> halvings
    }

    fn max_block_sigops(&self) -> usize {
        self.params.max_block_sigops
    }

    fn p2sh_active(&self, header: &BlockHeader) -> bool {
        header.time >= self.params.bip16_switch_time
    }
}
