//! Ledger configuration.
//!
//! [`LedgerConfig::load`] layers three sources, later ones winning:
//! built-in defaults, an optional TOML file, then `COINVIEW__*` environment
//! variables (`COINVIEW__NETWORK=testnet`, `COINVIEW__ROCKSDB__MAX_OPEN_FILES=256`).

use std::path::{Path, PathBuf};

use ::config::{Config, ConfigError, Environment, File, FileFormat};
use coinview_core::params::{ChainParams, Network};
use serde::{Deserialize, Serialize};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "COINVIEW";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksConfig {
    /// `-1` keeps every file open.
    pub max_open_files: i32,
    pub write_buffer_size_mb: usize,
    pub create_if_missing: bool,
}

impl Default for RocksConfig {
    fn default() -> Self {
        Self {
            max_open_files: 512,
            write_buffer_size_mb: 64,
            create_if_missing: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Root directory for persistent data. Defaults to
    /// `<platform data dir>/coinview/<network>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    pub network: Network,
    /// Filter string (e.g. "info", "coinview_core=debug").
    pub log_level: String,
    /// "text" or "json".
    pub log_format: String,
    pub rocksdb: RocksConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            network: Network::Mainnet,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            rocksdb: RocksConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// Build the configuration from defaults, `file` if given, and the
    /// environment.
    ///
    /// # Errors
    ///
    /// Fails if `file` is given but missing or malformed, or if a value does
    /// not have the expected type.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Some(path) = file {
            builder = builder.add_source(File::from(path.to_path_buf()).format(FileFormat::Toml).required(true));
        }
        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("coinview")
                .join(self.network.data_dir_suffix())
        })
    }

    /// Path to the RocksDB ledger directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join("ledger")
    }

    pub fn chain_params(&self) -> ChainParams {
        ChainParams::new(self.network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let cfg = LedgerConfig::default();
        assert_eq!(cfg.network, Network::Mainnet);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.log_format, "text");
        assert!(cfg.rocksdb.create_if_missing);
    }

    #[test]
    fn default_data_dir_is_per_network() {
        let cfg = LedgerConfig {
            network: Network::Testnet,
            ..LedgerConfig::default()
        };
        assert!(cfg.data_dir().ends_with(Path::new("coinview").join(Network::Testnet.data_dir_suffix())));
    }

    #[test]
    fn db_path_appends_ledger() {
        let cfg = LedgerConfig {
            data_dir: Some(PathBuf::from("/tmp/coinview-test")),
            ..LedgerConfig::default()
        };
        assert_eq!(cfg.db_path(), PathBuf::from("/tmp/coinview-test/ledger"));
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "network = \"regtest\"\ndata_dir = \"/srv/coinview\"\n\n[rocksdb]\nmax_open_files = 64"
        )
        .unwrap();

        let cfg = LedgerConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.network, Network::Regtest);
        assert_eq!(cfg.data_dir, Some(PathBuf::from("/srv/coinview")));
        assert_eq!(cfg.rocksdb.max_open_files, 64);
        assert_eq!(cfg.rocksdb.write_buffer_size_mb, 64);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.chain_params().network, Network::Regtest);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LedgerConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
