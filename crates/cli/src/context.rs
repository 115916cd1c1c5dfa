//! Application context - opens the bank under a data directory

use std::path::{Path, PathBuf};
use teller_bank::{Bank, BankConfig};
use teller_core::Actor;
use tracing::debug;

pub const DATABASE_FILE: &str = "teller.db";
pub const CONFIG_FILE: &str = "teller.json";

pub struct AppContext {
    pub bank: Bank,
    pub actor: Actor,
    data_path: PathBuf,
}

impl AppContext {
    /// Open (or create) the bank in `data_path`. `teller.json` there, when
    /// present, overrides the default configuration.
    pub fn open(data_path: impl AsRef<Path>, actor: Actor) -> Result<Self, anyhow::Error> {
        let data_path = data_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_path)?;

        let config_path = data_path.join(CONFIG_FILE);
        let config = if config_path.exists() {
            BankConfig::from_file(&config_path)?
        } else {
            BankConfig::default()
        };
        debug!(path = %data_path.display(), actor = %actor, "Opening bank");

        let bank = Bank::open(data_path.join(DATABASE_FILE), config)?;
        Ok(Self {
            bank,
            actor,
            data_path,
        })
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }
}
