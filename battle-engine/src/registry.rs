use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use core_types::types::{Coins, UserId};

use crate::{
    battle::{now_s, Battle, BattleKey, BattleState, Outcome},
    error::RegistryError,
};

#[derive(Serialize, Deserialize, Default)]
struct BattlesFile {
    updated_at_s: i64,
    pending: Vec<Battle>,
    retired: Vec<Battle>,
}

struct RegistryState {
    pending: HashMap<BattleKey, Battle>,
    retired: Vec<Battle>,
}

/// Pending-battle table with compare-and-swap state transitions. The
/// write lock is the storage-level atomicity every transition rides on;
/// two racing transitions on one key cannot both observe the expected
/// state.
pub struct BattleRegistry {
    state: RwLock<RegistryState>,
    path: PathBuf,
}

impl BattleRegistry {
    pub fn load_or_init(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref().to_path_buf();
        let file = if path.exists() {
            let bytes = fs::read(&path)?;
            if bytes.is_empty() {
                BattlesFile::default()
            } else {
                serde_json::from_slice::<BattlesFile>(&bytes)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?
            }
        } else {
            BattlesFile::default()
        };

        let mut pending = HashMap::new();
        let mut retired = file.retired;
        for battle in file.pending {
            // A crash can leave a terminal battle in the pending list;
            // finish moving it to the audit side on load.
            if battle.state.is_terminal() {
                retired.push(battle);
            } else {
                pending.insert(battle.key(), battle);
            }
        }

        Ok(Self {
            state: RwLock::new(RegistryState { pending, retired }),
            path,
        })
    }

    fn persist_locked(&self, state: &RegistryState) -> Result<(), RegistryError> {
        let mut pending: Vec<Battle> = state.pending.values().cloned().collect();
        pending.sort_by_key(Battle::key);
        let file = BattlesFile {
            updated_at_s: OffsetDateTime::now_utc().unix_timestamp(),
            pending,
            retired: state.retired.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&file).expect("serialize battles");
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut RegistryState) -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        let mut state = self.state.write();
        let out = op(&mut state)?;
        self.persist_locked(&state)?;
        Ok(out)
    }

    /// Create a `Proposed` battle for the pair. A pair with a pending
    /// battle is rejected rather than overwritten so no stake record is
    /// ever silently lost.
    pub fn propose(
        &self,
        challenger: UserId,
        opponent: UserId,
        stake: Coins,
    ) -> Result<Battle, RegistryError> {
        self.mutate(|state| {
            let battle = Battle::propose(challenger, opponent, stake);
            let key = battle.key();
            if state.pending.contains_key(&key) {
                return Err(RegistryError::DuplicatePending { key });
            }
            state.pending.insert(key, battle.clone());
            Ok(battle)
        })
    }

    pub fn get(&self, key: BattleKey) -> Result<Battle, RegistryError> {
        self.state
            .read()
            .pending
            .get(&key)
            .cloned()
            .ok_or(RegistryError::NotFound { key })
    }

    /// Compare-and-swap on the battle's state field. Exactly one of two
    /// racing callers observes `expected`; the loser gets
    /// `StaleTransition` and must not apply any side effects.
    pub fn transition(
        &self,
        key: BattleKey,
        expected: BattleState,
        next: BattleState,
        outcome: Option<Outcome>,
    ) -> Result<Battle, RegistryError> {
        self.mutate(|state| {
            let battle = state
                .pending
                .get_mut(&key)
                .ok_or(RegistryError::NotFound { key })?;
            if battle.state != expected {
                return Err(RegistryError::StaleTransition {
                    key,
                    expected,
                    actual: battle.state,
                });
            }
            battle.state = next;
            if next.is_terminal() {
                battle.outcome = outcome;
                battle.resolved_at_s = Some(now_s());
            } else {
                battle.outcome = None;
                battle.resolved_at_s = None;
            }
            Ok(battle.clone())
        })
    }

    /// Drop a terminal battle from the pending view into the audit list.
    pub fn retire(&self, key: BattleKey) -> Result<Battle, RegistryError> {
        self.mutate(|state| {
            let battle = state
                .pending
                .remove(&key)
                .ok_or(RegistryError::NotFound { key })?;
            if !battle.state.is_terminal() {
                let actual = battle.state;
                state.pending.insert(key, battle);
                return Err(RegistryError::NotTerminal { key, actual });
            }
            state.retired.push(battle.clone());
            Ok(battle)
        })
    }

    /// Retained terminal battles, oldest first.
    pub fn audit_log(&self) -> Vec<Battle> {
        self.state.read().retired.clone()
    }

    /// Most recent terminal record for the pair, if any. Lets callers
    /// tell a lost settlement race apart from a battle that never
    /// existed.
    pub fn last_retired(&self, key: BattleKey) -> Option<Battle> {
        let state = self.state.read();
        state
            .retired
            .iter()
            .rev()
            .find(|battle| battle.key() == key)
            .cloned()
    }

    pub fn pending_count(&self) -> usize {
        self.state.read().pending.len()
    }
}
