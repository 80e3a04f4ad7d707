use serde::{Deserialize, Serialize};

use core_types::types::{Coins, UserId};

/// Durable per-user record owned by the account store. Balances never go
/// negative; wins and losses only grow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: UserId,
    pub display_name: String,
    pub coins: Coins,
    pub wins: u64,
    pub losses: u64,
}

impl Account {
    pub fn new(user_id: UserId, display_name: impl Into<String>, coins: Coins) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            coins,
            wins: 0,
            losses: 0,
        }
    }
}

/// Monotonic stat bump applied by the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatDelta {
    pub wins: u64,
    pub losses: u64,
}

impl StatDelta {
    pub fn win() -> Self {
        Self { wins: 1, losses: 0 }
    }

    pub fn loss() -> Self {
        Self { wins: 0, losses: 1 }
    }
}

/// Leaderboard orderings. Ties break toward the lower user id so repeated
/// queries return a stable order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ranking {
    ByBalance,
    ByWins,
}

/// Snapshot returned for a user's own balance command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceReport {
    pub coins: Coins,
    pub wins: u64,
    pub losses: u64,
}
