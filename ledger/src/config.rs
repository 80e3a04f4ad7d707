use std::{
    fs,
    path::{Path, PathBuf},
};

use core_types::types::Coins;

use crate::error::Result;

pub const DEFAULT_STARTING_BALANCE: Coins = 100;
pub const DEFAULT_STATE_DIR: &str = "ledger.state";

#[derive(Clone, Debug)]
pub struct LedgerConfig {
    pub state_dir: PathBuf,
    /// Balance granted to an account on first observed interaction.
    pub starting_balance: Coins,
}

impl LedgerConfig {
    pub fn new(state_dir: PathBuf) -> Self {
        Self {
            state_dir,
            starting_balance: DEFAULT_STARTING_BALANCE,
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn accounts_path(&self) -> PathBuf {
        self.state_dir.join("accounts.json")
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        if !self.state_dir.exists() {
            fs::create_dir_all(&self.state_dir)?;
        }
        Ok(())
    }
}
