use std::{
    collections::HashMap,
    fs, io,
    path::PathBuf,
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use core_types::types::{CoinDelta, Coins, UserId, UserRef};

use crate::{
    account::{Account, Ranking, StatDelta},
    config::LedgerConfig,
    error::{Result, StoreError},
};

#[derive(Serialize, Deserialize)]
struct AccountsFile {
    updated_at_s: i64,
    accounts: Vec<Account>,
}

struct LedgerState {
    accounts: HashMap<UserId, Account>,
    /// Display name -> the account that claimed it first and still holds
    /// it. Later accounts with the same name stay reachable by id only.
    names: HashMap<String, UserId>,
}

impl LedgerState {
    fn from_accounts(accounts: Vec<Account>) -> Self {
        let mut table = HashMap::with_capacity(accounts.len());
        let mut names = HashMap::new();
        // Claim order is not persisted; rebuilt in id order after a restart.
        let mut ordered = accounts;
        ordered.sort_by_key(|account| account.user_id);
        for account in ordered {
            names
                .entry(account.display_name.clone())
                .or_insert(account.user_id);
            table.insert(account.user_id, account);
        }
        Self {
            accounts: table,
            names,
        }
    }
}

/// Durable account table. Every mutation runs as one closure under the
/// write lock and persists before the call returns; that lock is the
/// storage-level atomic operation every caller relies on. Reads take the
/// read lock and see a consistent snapshot.
pub struct AccountLedger {
    state: RwLock<LedgerState>,
    path: PathBuf,
    starting_balance: Coins,
}

impl AccountLedger {
    pub fn load_or_init(config: &LedgerConfig) -> Result<Self> {
        config.ensure_dirs()?;
        let path = config.accounts_path();
        let accounts = if path.exists() {
            let bytes = fs::read(&path)?;
            if bytes.is_empty() {
                Vec::new()
            } else {
                serde_json::from_slice::<AccountsFile>(&bytes)
                    .map(|file| file.accounts)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?
            }
        } else {
            Vec::new()
        };
        Ok(Self {
            state: RwLock::new(LedgerState::from_accounts(accounts)),
            path,
            starting_balance: config.starting_balance,
        })
    }

    fn persist_locked(&self, state: &LedgerState) -> Result<()> {
        let mut accounts: Vec<Account> = state.accounts.values().cloned().collect();
        accounts.sort_by_key(|account| account.user_id);
        let file = AccountsFile {
            updated_at_s: OffsetDateTime::now_utc().unix_timestamp(),
            accounts,
        };
        let bytes = serde_json::to_vec_pretty(&file).expect("serialize accounts");
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Core mutation primitive: one closure under the write lock, then a
    /// persist of the resulting table.
    fn mutate<T>(&self, op: impl FnOnce(&mut LedgerState) -> Result<T>) -> Result<T> {
        let mut state = self.state.write();
        let out = op(&mut state)?;
        self.persist_locked(&state)?;
        Ok(out)
    }

    /// Returns the existing account or creates one with the configured
    /// starting balance. Refreshes the stored display name if the
    /// messaging layer reports a new one.
    pub fn get_or_create(&self, user: &UserRef) -> Result<Account> {
        let starting_balance = self.starting_balance;
        self.mutate(|state| {
            let LedgerState { accounts, names } = state;
            match accounts.get_mut(&user.id) {
                Some(account) => {
                    if account.display_name != user.display_name {
                        if names.get(&account.display_name) == Some(&user.id) {
                            names.remove(&account.display_name);
                        }
                        account.display_name = user.display_name.clone();
                        names.entry(user.display_name.clone()).or_insert(user.id);
                    }
                    Ok(account.clone())
                }
                None => {
                    let account =
                        Account::new(user.id, user.display_name.clone(), starting_balance);
                    names.entry(user.display_name.clone()).or_insert(user.id);
                    accounts.insert(user.id, account.clone());
                    Ok(account)
                }
            }
        })
    }

    pub fn get(&self, user_id: UserId) -> Result<Account> {
        self.state
            .read()
            .accounts
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::NotFound { user_id })
    }

    /// Single atomic increment-and-check. A debit that would push the
    /// balance below zero fails and leaves the balance unchanged.
    pub fn adjust_balance(&self, user_id: UserId, delta: CoinDelta) -> Result<Coins> {
        self.mutate(|state| {
            let account = state
                .accounts
                .get_mut(&user_id)
                .ok_or(StoreError::NotFound { user_id })?;
            apply_delta(account, delta)?;
            Ok(account.coins)
        })
    }

    pub fn increment_stats(&self, user_id: UserId, delta: StatDelta) -> Result<Account> {
        self.mutate(|state| {
            let account = state
                .accounts
                .get_mut(&user_id)
                .ok_or(StoreError::NotFound { user_id })?;
            account.wins += delta.wins;
            account.losses += delta.losses;
            Ok(account.clone())
        })
    }

    /// Settlement path: debit the loser, credit the winner, and bump both
    /// stat lines as one atomic unit. Nothing moves if the loser cannot
    /// cover the stake, and no snapshot can ever observe a balance change
    /// without its paired stat change.
    pub fn settle_transfer(&self, loser: UserId, winner: UserId, stake: Coins) -> Result<()> {
        self.mutate(|state| {
            let loser_account = state
                .accounts
                .get(&loser)
                .ok_or(StoreError::NotFound { user_id: loser })?;
            if loser_account.coins < stake {
                return Err(StoreError::InsufficientFunds {
                    user_id: loser,
                    balance: loser_account.coins,
                    debit: stake,
                });
            }
            if !state.accounts.contains_key(&winner) {
                return Err(StoreError::NotFound { user_id: winner });
            }
            if let Some(account) = state.accounts.get_mut(&loser) {
                account.coins -= stake;
                account.losses += 1;
            }
            if let Some(account) = state.accounts.get_mut(&winner) {
                account.coins += stake;
                account.wins += 1;
            }
            Ok(())
        })
    }

    /// Secondary-index lookup for admin commands that address a user by
    /// name rather than id.
    pub fn find_by_display_name(&self, name: &str) -> Result<Account> {
        let state = self.state.read();
        state
            .names
            .get(name)
            .and_then(|user_id| state.accounts.get(user_id))
            .cloned()
            .ok_or_else(|| StoreError::UnknownName {
                name: name.to_string(),
            })
    }

    /// Top `n` accounts under the given ranking, ties broken by ascending
    /// user id. One consistent snapshot under the read lock.
    pub fn top(&self, n: usize, ranking: Ranking) -> Vec<Account> {
        let state = self.state.read();
        let mut rows: Vec<Account> = state.accounts.values().cloned().collect();
        rows.sort_by(|a, b| match ranking {
            Ranking::ByBalance => b.coins.cmp(&a.coins).then(a.user_id.cmp(&b.user_id)),
            Ranking::ByWins => b.wins.cmp(&a.wins).then(a.user_id.cmp(&b.user_id)),
        });
        rows.truncate(n);
        rows
    }

    pub fn len(&self) -> usize {
        self.state.read().accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().accounts.is_empty()
    }
}

fn apply_delta(account: &mut Account, delta: CoinDelta) -> Result<()> {
    if delta >= 0 {
        account.coins = account.coins.saturating_add(delta as Coins);
    } else {
        let debit = delta.unsigned_abs();
        if account.coins < debit {
            return Err(StoreError::InsufficientFunds {
                user_id: account.user_id,
                balance: account.coins,
                debit,
            });
        }
        account.coins -= debit;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ledger_in(dir: &std::path::Path) -> AccountLedger {
        let config = LedgerConfig::new(dir.to_path_buf());
        AccountLedger::load_or_init(&config).expect("ledger bootstrap")
    }

    fn user(id: UserId, name: &str) -> UserRef {
        UserRef::new(id, name)
    }

    #[test]
    fn creates_account_with_starting_balance() {
        let dir = tempdir().unwrap();
        let ledger = ledger_in(dir.path());

        let account = ledger.get_or_create(&user(7, "alice")).unwrap();
        assert_eq!(account.coins, crate::config::DEFAULT_STARTING_BALANCE);
        assert_eq!(account.wins, 0);
        assert_eq!(account.losses, 0);

        // Second observation returns the same record.
        let again = ledger.get_or_create(&user(7, "alice")).unwrap();
        assert_eq!(again, account);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn refreshes_display_name_and_index() {
        let dir = tempdir().unwrap();
        let ledger = ledger_in(dir.path());

        ledger.get_or_create(&user(7, "alice")).unwrap();
        ledger.get_or_create(&user(7, "alice2")).unwrap();

        assert_eq!(ledger.find_by_display_name("alice2").unwrap().user_id, 7);
        assert!(matches!(
            ledger.find_by_display_name("alice"),
            Err(StoreError::UnknownName { .. })
        ));
    }

    #[test]
    fn duplicate_display_names_resolve_to_first_claimant() {
        let dir = tempdir().unwrap();
        let ledger = ledger_in(dir.path());

        ledger.get_or_create(&user(1, "dup")).unwrap();
        ledger.get_or_create(&user(2, "dup")).unwrap();

        assert_eq!(ledger.find_by_display_name("dup").unwrap().user_id, 1);
    }

    #[test]
    fn debit_below_zero_fails_and_leaves_balance() {
        let dir = tempdir().unwrap();
        let ledger = ledger_in(dir.path());
        ledger.get_or_create(&user(1, "alice")).unwrap();

        let err = ledger.adjust_balance(1, -200).unwrap_err();
        assert!(matches!(err, StoreError::InsufficientFunds { balance: 100, debit: 200, .. }));
        assert_eq!(ledger.get(1).unwrap().coins, 100);

        assert_eq!(ledger.adjust_balance(1, -100).unwrap(), 0);
        assert_eq!(ledger.adjust_balance(1, 30).unwrap(), 30);
    }

    #[test]
    fn adjust_balance_unknown_account() {
        let dir = tempdir().unwrap();
        let ledger = ledger_in(dir.path());
        assert!(matches!(
            ledger.adjust_balance(42, 5),
            Err(StoreError::NotFound { user_id: 42 })
        ));
    }

    #[test]
    fn settle_transfer_moves_stake_and_stats_atomically() {
        let dir = tempdir().unwrap();
        let ledger = ledger_in(dir.path());
        ledger.get_or_create(&user(1, "alice")).unwrap();
        ledger.get_or_create(&user(2, "bob")).unwrap();

        ledger.settle_transfer(2, 1, 30).unwrap();

        let winner = ledger.get(1).unwrap();
        let loser = ledger.get(2).unwrap();
        assert_eq!(winner.coins, 130);
        assert_eq!(winner.wins, 1);
        assert_eq!(loser.coins, 70);
        assert_eq!(loser.losses, 1);
    }

    #[test]
    fn settle_transfer_touches_nothing_on_insufficient_funds() {
        let dir = tempdir().unwrap();
        let ledger = ledger_in(dir.path());
        ledger.get_or_create(&user(1, "alice")).unwrap();
        ledger.get_or_create(&user(2, "bob")).unwrap();

        let err = ledger.settle_transfer(2, 1, 500).unwrap_err();
        assert!(matches!(err, StoreError::InsufficientFunds { .. }));
        assert_eq!(ledger.get(1).unwrap(), Account::new(1, "alice", 100));
        assert_eq!(ledger.get(2).unwrap(), Account::new(2, "bob", 100));
    }

    #[test]
    fn top_orders_deterministically_with_ties() {
        let dir = tempdir().unwrap();
        let ledger = ledger_in(dir.path());
        for (id, name) in [(3, "c"), (1, "a"), (2, "b")] {
            ledger.get_or_create(&user(id, name)).unwrap();
        }
        ledger.adjust_balance(2, 50).unwrap();
        ledger.increment_stats(3, StatDelta::win()).unwrap();

        let by_balance: Vec<UserId> = ledger
            .top(10, Ranking::ByBalance)
            .into_iter()
            .map(|a| a.user_id)
            .collect();
        assert_eq!(by_balance, vec![2, 1, 3]);

        let by_wins: Vec<UserId> = ledger
            .top(2, Ranking::ByWins)
            .into_iter()
            .map(|a| a.user_id)
            .collect();
        assert_eq!(by_wins, vec![3, 1]);
    }

    #[test]
    fn state_survives_reload() {
        let dir = tempdir().unwrap();
        {
            let ledger = ledger_in(dir.path());
            ledger.get_or_create(&user(1, "alice")).unwrap();
            ledger.adjust_balance(1, -40).unwrap();
            ledger.increment_stats(1, StatDelta::loss()).unwrap();
        }

        let reloaded = ledger_in(dir.path());
        let account = reloaded.get(1).unwrap();
        assert_eq!(account.coins, 60);
        assert_eq!(account.losses, 1);
        assert_eq!(reloaded.find_by_display_name("alice").unwrap().user_id, 1);
    }
}
