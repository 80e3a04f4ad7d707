use thiserror::Error;

use core_types::types::UserId;
use ledger::StoreError;

use crate::battle::{BattleKey, BattleState};

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("a pending battle already exists for {key}")]
    DuplicatePending { key: BattleKey },
    #[error("stale transition for {key}: expected {}, actual {}", .expected.label(), .actual.label())]
    StaleTransition {
        key: BattleKey,
        expected: BattleState,
        actual: BattleState,
    },
    #[error("no pending battle for {key}")]
    NotFound { key: BattleKey },
    #[error("battle {key} is still {}, cannot retire", .actual.label())]
    NotTerminal { key: BattleKey, actual: BattleState },
    #[error("battle storage unavailable: {0}")]
    StorageUnavailable(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("user {user_id} is not authorized to adjudicate")]
    Forbidden { user_id: UserId },
    #[error("user {user_id} is already an admin")]
    AlreadyAdmin { user_id: UserId },
    #[error("user {user_id} is not an admin")]
    NotAdmin { user_id: UserId },
    #[error("the bootstrap owner cannot be revoked")]
    OwnerImmutable,
    #[error("admin roster storage unavailable: {0}")]
    StorageUnavailable(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("a battle needs two distinct participants")]
    IdenticalParticipants,
    #[error("stake must be a positive coin amount")]
    NonPositiveStake,
    #[error("account error: {0}")]
    Store(#[from] StoreError),
    #[error("battle error: {0}")]
    Registry(#[from] RegistryError),
    #[error("authorization error: {0}")]
    Roster(#[from] RosterError),
}
