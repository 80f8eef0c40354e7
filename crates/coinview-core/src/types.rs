//! Chain primitives: hashes, outpoints, transactions, blocks.
//!
//! Transactions and headers use the legacy consensus serialization
//! (little-endian integers, CompactSize-prefixed vectors). Transaction ids and
//! block hashes are SHA-256d of those bytes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::encode::{sha256d, write_compact_size};
use crate::error::CodecError;

/// A 32-byte hash in internal (wire) byte order.
///
/// Displayed and parsed as reversed hex, the way block explorers print ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash. Parent of genesis and best block of an empty repository.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter().rev() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for Hash256 {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes: [u8; 32] = hex::decode(s)
            .map_err(|e| CodecError::InvalidHex(e.to_string()))?
            .try_into()
            .map_err(|v: Vec<u8>| CodecError::InvalidHex(format!("expected 32 bytes, got {}", v.len())))?;
        bytes.reverse();
        Ok(Self(bytes))
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Scripts serialize to JSON as hex strings.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// Reference to one output of a previous transaction.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    pub txid: Hash256,
    pub vout: u32,
}

impl OutPoint {
    /// The null outpoint spent by coinbase inputs.
    pub fn null() -> Self {
        Self {
            txid: Hash256::ZERO,
            vout: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.vout == u32::MAX
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxIn {
    pub previous_output: OutPoint,
    #[serde(with = "hex_bytes")]
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TxOut {
    /// Amount in base units.
    pub value: u64,
    #[serde(with = "hex_bytes")]
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    /// Provably unspendable: starts with `OP_RETURN` or exceeds the script size limit.
    pub fn is_unspendable(&self) -> bool {
        self.script_pubkey.first() == Some(&crate::constants::OP_RETURN)
            || self.script_pubkey.len() > crate::constants::MAX_SCRIPT_SIZE
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    /// Legacy consensus serialization.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(10 + 41 * self.inputs.len() + 34 * self.outputs.len());
        buf.extend_from_slice(&self.version.to_le_bytes());
        write_compact_size(&mut buf, self.inputs.len() as u64);
        for input in &self.inputs {
            buf.extend_from_slice(input.previous_output.txid.as_bytes());
            buf.extend_from_slice(&input.previous_output.vout.to_le_bytes());
            write_compact_size(&mut buf, input.script_sig.len() as u64);
            buf.extend_from_slice(&input.script_sig);
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_compact_size(&mut buf, self.outputs.len() as u64);
        for output in &self.outputs {
            buf.extend_from_slice(&output.value.to_le_bytes());
            write_compact_size(&mut buf, output.script_pubkey.len() as u64);
            buf.extend_from_slice(&output.script_pubkey);
        }
        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf
    }

    pub fn txid(&self) -> Hash256 {
        sha256d(&self.serialize())
    }

    /// Exactly one input, spending the null outpoint.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    /// Sum of all output values. `None` on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_blockhash: Hash256,
    pub merkle_root: Hash256,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    const SIZE: usize = 4 + 32 + 32 + 4 + 4 + 4;

    pub fn serialize(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(self.prev_blockhash.as_bytes());
        out[36..68].copy_from_slice(self.merkle_root.as_bytes());
        out[68..72].copy_from_slice(&self.time.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    pub fn hash(&self) -> Hash256 {
        sha256d(&self.serialize())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    /// First transaction is the coinbase.
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    pub fn prev_hash(&self) -> Hash256 {
        self.header.prev_blockhash
    }

    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }

    /// Merkle root over the transaction ids.
    pub fn compute_merkle_root(&self) -> Hash256 {
        merkle_root(self.transactions.iter().map(Transaction::txid).collect())
    }
}

/// Bitcoin-style merkle root: odd levels duplicate their last element.
pub fn merkle_root(mut level: Vec<Hash256>) -> Hash256 {
    if level.is_empty() {
        return Hash256::ZERO;
    }
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            if let Some(last) = level.last().copied() {
                level.push(last);
            }
        }
        level = level
            .chunks(2)
            .map(|pair| {
                let mut data = [0u8; 64];
                data[..32].copy_from_slice(pair[0].as_bytes());
                data[32..].copy_from_slice(pair[1].as_bytes());
                sha256d(&data)
            })
            .collect();
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENESIS_PUBKEY: &str = "04678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5f";

    fn mainnet_genesis() -> Block {
        let mut script_sig = hex::decode("04ffff001d010445").unwrap();
        script_sig.extend_from_slice(
            b"The Times 03/Jan/2009 Chancellor on brink of second bailout for banks",
        );
        let mut script_pubkey = vec![0x41];
        script_pubkey.extend(hex::decode(GENESIS_PUBKEY).unwrap());
        script_pubkey.push(0xac);

        let coinbase = Transaction {
            version: 1,
            inputs: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig,
                sequence: u32::MAX,
            }],
            outputs: vec![TxOut { value: 50 * 100_000_000, script_pubkey }],
            lock_time: 0,
        };
        let merkle_root = coinbase.txid();
        Block {
            header: BlockHeader {
                version: 1,
                prev_blockhash: Hash256::ZERO,
                merkle_root,
                time: 1_231_006_505,
                bits: 0x1d00_ffff,
                nonce: 2_083_236_893,
            },
            transactions: vec![coinbase],
        }
    }

    #[test]
    fn genesis_txid_matches_mainnet() {
        let block = mainnet_genesis();
        assert_eq!(
            block.transactions[0].txid().to_string(),
            "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
        );
    }

    #[test]
    fn genesis_hash_matches_mainnet() {
        let block = mainnet_genesis();
        assert_eq!(
            block.hash().to_string(),
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
        );
        assert_eq!(block.compute_merkle_root(), block.header.merkle_root);
    }

    #[test]
    fn hash_display_is_reversed_and_parses_back() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x01;
        bytes[31] = 0xff;
        let h = Hash256(bytes);
        let s = h.to_string();
        assert!(s.starts_with("ff"));
        assert!(s.ends_with("01"));
        assert_eq!(s.parse::<Hash256>().unwrap(), h);
    }

    #[test]
    fn hash_parse_rejects_wrong_length() {
        assert!(matches!("abcd".parse::<Hash256>(), Err(CodecError::InvalidHex(_))));
        assert!(matches!("zz".parse::<Hash256>(), Err(CodecError::InvalidHex(_))));
    }

    #[test]
    fn hash_serde_uses_display_form() {
        let h: Hash256 = "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
            .parse()
            .unwrap();
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, "\"000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f\"");
        assert_eq!(serde_json::from_str::<Hash256>(&json).unwrap(), h);
    }

    #[test]
    fn coinbase_detection() {
        let block = mainnet_genesis();
        assert!(block.transactions[0].is_coinbase());

        let mut spend = block.transactions[0].clone();
        spend.inputs[0].previous_output = OutPoint { txid: Hash256([1; 32]), vout: 0 };
        assert!(!spend.is_coinbase());
    }

    #[test]
    fn unspendable_outputs() {
        let op_return = TxOut { value: 0, script_pubkey: vec![0x6a, 0x01, 0x02] };
        let oversized = TxOut { value: 1, script_pubkey: vec![0x51; 10_001] };
        let normal = TxOut { value: 1, script_pubkey: vec![0x51] };
        assert!(op_return.is_unspendable());
        assert!(oversized.is_unspendable());
        assert!(!normal.is_unspendable());
    }

    #[test]
    fn total_output_value_detects_overflow() {
        let tx = Transaction {
            version: 1,
            inputs: vec![],
            outputs: vec![
                TxOut { value: u64::MAX, script_pubkey: vec![] },
                TxOut { value: 1, script_pubkey: vec![] },
            ],
            lock_time: 0,
        };
        assert_eq!(tx.total_output_value(), None);
    }

    #[test]
    fn merkle_root_duplicates_odd_leaf() {
        let a = Hash256([1; 32]);
        let b = Hash256([2; 32]);
        let c = Hash256([3; 32]);
        assert_eq!(merkle_root(vec![a, b, c]), merkle_root(vec![a, b, c, c]));
        assert_eq!(merkle_root(vec![a]), a);
    }
}
