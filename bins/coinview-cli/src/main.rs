//! coinview-cli: inspect coin records, undo records, and ledger stores.
//!
//! `decode-coins` and `decode-undo` work on hex dumps and need no database.
//! The other commands open the RocksDB ledger named by the configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;

use coinview_core::encode::decode_hex;
use coinview_core::params::Network;
use coinview_core::undo::open;
use coinview_core::{CoinRecord, CoinRepository, Hash256};
use coinview_store::{init_logging, LedgerConfig, LedgerDb};

/// Inspect coinview ledger records and stores.
#[derive(Parser)]
#[command(name = "coinview-cli")]
#[command(version, about = "Inspect coinview ledger records and stores")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Data directory (overrides the configuration file).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Network (mainnet, testnet, regtest).
    #[arg(long, global = true)]
    network: Option<Network>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format ("text" or "json").
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a hex-encoded coin record.
    DecodeCoins {
        hex: String,
    },
    /// Verify and decode a hex-encoded sealed undo record.
    DecodeUndo {
        hex: String,
        /// Hash of the parent of the block the record belongs to.
        #[arg(long)]
        prev: Hash256,
    },
    /// Print the store's best block and record count.
    BestBlock,
    /// Print the stored coin record for a transaction.
    GetCoins {
        txid: Hash256,
    },
    /// Compact the store.
    Compact,
}

impl GlobalArgs {
    fn into_config(self) -> Result<LedgerConfig> {
        let mut config = LedgerConfig::load(self.config.as_deref()).context("loading configuration")?;
        if let Some(dir) = self.data_dir {
            config.data_dir = Some(dir);
        }
        if let Some(network) = self.network {
            config.network = network;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.global.into_config()?;
    init_logging(&config.log_level, &config.log_format);

    let output = match cli.command {
        Commands::DecodeCoins { hex } => decode_coins(&hex)?,
        Commands::DecodeUndo { hex, prev } => decode_undo(&hex, &prev)?,
        Commands::BestBlock => best_block(&config)?,
        Commands::GetCoins { txid } => get_coins(&config, &txid)?,
        Commands::Compact => compact(&config)?,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn open_db(config: &LedgerConfig) -> Result<LedgerDb> {
    let path = config.db_path();
    LedgerDb::open_with(&path, &config.rocksdb).with_context(|| format!("opening ledger at {}", path.display()))
}

fn decode_coins(hex: &str) -> Result<Value> {
    let bytes = decode_hex(hex)?;
    let record = CoinRecord::decode(&bytes).context("decoding coin record")?;
    Ok(serde_json::to_value(&record)?)
}

fn decode_undo(hex: &str, prev: &Hash256) -> Result<Value> {
    let bytes = decode_hex(hex)?;
    let undo = open(prev, &bytes).context("opening undo record")?;
    Ok(json!({
        "inputs": undo.input_count(),
        "txs": undo.txs,
    }))
}

fn best_block(config: &LedgerConfig) -> Result<Value> {
    let db = open_db(config)?;
    Ok(json!({
        "network": config.network,
        "best_block": db.coin_store().best_block()?,
        "coin_records": db.coin_count()?,
    }))
}

fn get_coins(config: &LedgerConfig, txid: &Hash256) -> Result<Value> {
    let db = open_db(config)?;
    let record = db.coin_store().get(txid)?;
    Ok(json!({ "txid": txid, "coins": record }))
}

fn compact(config: &LedgerConfig) -> Result<Value> {
    let db = open_db(config)?;
    db.compact()?;
    info!(path = %config.db_path().display(), "compacted ledger");
    Ok(json!({ "compacted": true, "coin_records": db.coin_count()? }))
}
