use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use core_types::types::{Coins, UserId};

/// Normalized unordered pair of participants. `new(a, b)` and `new(b, a)`
/// address the same pending battle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BattleKey {
    low: UserId,
    high: UserId,
}

impl BattleKey {
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn users(&self) -> (UserId, UserId) {
        (self.low, self.high)
    }

    pub fn involves(&self, user_id: UserId) -> bool {
        self.low == user_id || self.high == user_id
    }
}

impl fmt::Display for BattleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.low, self.high)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattleState {
    Proposed,
    Approved,
    Settled,
    Cancelled,
}

impl BattleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BattleState::Settled | BattleState::Cancelled)
    }

    pub fn label(&self) -> &'static str {
        match self {
            BattleState::Proposed => "proposed",
            BattleState::Approved => "approved",
            BattleState::Settled => "settled",
            BattleState::Cancelled => "cancelled",
        }
    }
}

/// Adjudicated result of an approved battle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    ChallengerWin,
    OpponentWin,
    Draw,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::ChallengerWin => "challenger win",
            Outcome::OpponentWin => "opponent win",
            Outcome::Draw => "draw",
        }
    }
}

/// One wagered battle. The stake is fixed at proposal and coins only move
/// at settlement; terminal records are retained for audit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Battle {
    pub challenger: UserId,
    pub opponent: UserId,
    pub stake: Coins,
    pub state: BattleState,
    pub outcome: Option<Outcome>,
    pub proposed_at_s: i64,
    pub resolved_at_s: Option<i64>,
}

impl Battle {
    pub fn propose(challenger: UserId, opponent: UserId, stake: Coins) -> Self {
        Self {
            challenger,
            opponent,
            stake,
            state: BattleState::Proposed,
            outcome: None,
            proposed_at_s: now_s(),
            resolved_at_s: None,
        }
    }

    pub fn key(&self) -> BattleKey {
        BattleKey::new(self.challenger, self.opponent)
    }

    /// Winner and loser for a decided outcome; `None` for draws.
    pub fn decided(&self, outcome: Outcome) -> Option<(UserId, UserId)> {
        match outcome {
            Outcome::ChallengerWin => Some((self.challenger, self.opponent)),
            Outcome::OpponentWin => Some((self.opponent, self.challenger)),
            Outcome::Draw => None,
        }
    }
}

pub(crate) fn now_s() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
