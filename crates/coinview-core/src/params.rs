//! Network selection and the consensus parameters the engine consults.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{BIP16_SWITCH_TIME, COINBASE_MATURITY, HALVING_INTERVAL, MAX_BLOCK_SIGOPS};
use crate::types::Hash256;

/// Blocks that historically duplicated an unspent coinbase txid and are
/// exempt from the duplicate-transaction check. Nothing else is exempt.
///
/// Hashes are stored in internal byte order; they display as
/// 00000000000a4d0a…e0caec and 00000000000743f1…7cd721.
pub const BIP30_EXCEPTIONS: [(u32, Hash256); 2] = [
    (
        91_842,
        Hash256([
            0xec, 0xca, 0xe0, 0x00, 0xe3, 0xc8, 0xe4, 0xe0, 0x93, 0x93, 0x63, 0x60, 0x43, 0x1f, 0x3b, 0x76,
            0x03, 0xc5, 0x63, 0xc1, 0xff, 0x61, 0x81, 0x39, 0x0a, 0x4d, 0x0a, 0x00, 0x00, 0x00, 0x00, 0x00,
        ]),
    ),
    (
        91_880,
        Hash256([
            0x21, 0xd7, 0x7c, 0xcb, 0x4c, 0x08, 0x38, 0x6a, 0x04, 0xac, 0x01, 0x96, 0xae, 0x10, 0xf6, 0xa1,
            0xd2, 0xc2, 0xa3, 0x77, 0x55, 0x8c, 0xa1, 0x90, 0xf1, 0x43, 0x07, 0x00, 0x00, 0x00, 0x00, 0x00,
        ]),
    ),
];

/// Returns true if the block at `height` with id `hash` is on the exception list.
pub fn is_bip30_exception(height: u32, hash: &Hash256) -> bool {
    BIP30_EXCEPTIONS.iter().any(|(h, id)| *h == height && id == hash)
}

/// Network type: Mainnet, Testnet, or Regtest.
///
/// # Examples
///
/// ```
/// use coinview_core::params::Network;
/// let net: Network = "testnet".parse().unwrap();
/// assert_eq!(net, Network::Testnet);
/// assert_eq!(net.data_dir_suffix(), "testnet");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    /// Subdirectory name appended to the base data directory path.
    pub fn data_dir_suffix(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Regtest => "regtest",
        }
    }

    /// Genesis block id, in display form.
    pub fn genesis_hash_hex(&self) -> &'static str {
        match self {
            Self::Mainnet => "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f",
            Self::Testnet => "000000000933ea01ad0ee984209779baaec3ced90fa3f408719526f8d77f4943",
            Self::Regtest => "0f9188f13cb7b2c71f2a335e3a4fc328bf5beb436012afca590b1a11466e2206",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.data_dir_suffix())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(Self::Mainnet),
            "testnet" | "test" => Ok(Self::Testnet),
            "regtest" => Ok(Self::Regtest),
            other => Err(format!("unknown network: {other}")),
        }
    }
}

/// Consensus parameters for one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainParams {
    pub network: Network,
    /// Connecting this block creates no coins.
    pub genesis_hash: Hash256,
    pub subsidy_halving_interval: u32,
    pub coinbase_maturity: u32,
    pub max_block_sigops: usize,
    pub bip16_switch_time: u32,
}

impl ChainParams {
    pub fn new(network: Network) -> Self {
        let genesis_hash = match network.genesis_hash_hex().parse() {
            Ok(hash) => hash,
            Err(_) => Hash256::ZERO,
        };
        let subsidy_halving_interval = match network {
            Network::Regtest => 150,
            _ => HALVING_INTERVAL,
        };
        Self {
            network,
            genesis_hash,
            subsidy_halving_interval,
            coinbase_maturity: COINBASE_MATURITY,
            max_block_sigops: MAX_BLOCK_SIGOPS,
            bip16_switch_time: BIP16_SWITCH_TIME,
        }
    }

    /// Regtest rules over a locally built chain whose genesis is `genesis_hash`.
    pub fn with_genesis(genesis_hash: Hash256) -> Self {
        Self {
            genesis_hash,
            ..Self::new(Network::Regtest)
        }
    }
}

impl Default for ChainParams {
    fn default() -> Self {
        Self::new(Network::Mainnet)
    }
}
