//! Account store and leaderboard query for the coin ledger.
//!
//! The crate exposes:
//! - [`AccountLedger`]: durable user accounts with atomic balance and
//!   stat mutations (single increment-with-floor, never read-then-write).
//! - [`LedgerConfig`]: state directory and starting-balance knobs.
//! - [`Ranking`]: deterministic leaderboard orderings.

pub mod account;
pub mod config;
pub mod error;
pub mod store;

pub use account::{Account, BalanceReport, Ranking, StatDelta};
pub use config::{LedgerConfig, DEFAULT_STARTING_BALANCE};
pub use error::{Result, StoreError};
pub use store::AccountLedger;
