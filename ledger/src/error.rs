use thiserror::Error;

use core_types::types::{Coins, UserId};

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account {user_id} holds {balance} coins, cannot cover {debit}")]
    InsufficientFunds {
        user_id: UserId,
        balance: Coins,
        debit: Coins,
    },
    #[error("no account for user {user_id}")]
    NotFound { user_id: UserId },
    #[error("no account holds display name '{name}'")]
    UnknownName { name: String },
    #[error("account storage unavailable: {0}")]
    StorageUnavailable(#[from] std::io::Error),
}
