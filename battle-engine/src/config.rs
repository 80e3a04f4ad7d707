use std::{
    fs,
    path::{Path, PathBuf},
};

use core_types::types::UserId;
use ledger::LedgerConfig;

/// Wiring for one engine instance. `owner` is the bootstrap admin
/// identity: always authorized, never revocable.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub state_dir: PathBuf,
    pub owner: UserId,
    pub ledger: LedgerConfig,
}

impl EngineConfig {
    pub fn new(state_dir: PathBuf, owner: UserId) -> Self {
        let ledger = LedgerConfig::new(state_dir.clone());
        Self {
            state_dir,
            owner,
            ledger,
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn battles_path(&self) -> PathBuf {
        self.state_dir.join("battles.json")
    }

    pub fn admins_path(&self) -> PathBuf {
        self.state_dir.join("admins.json")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        if !self.state_dir.exists() {
            fs::create_dir_all(&self.state_dir)?;
        }
        Ok(())
    }
}
