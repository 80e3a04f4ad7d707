//! Battle registry, authorization gate, and the wagered-battle
//! resolution engine.
//!
//! The crate exposes:
//! - [`BattleEngine`]: propose → approve → settle/cancel orchestration
//!   with at-most-once, conservation-preserving settlement.
//! - [`BattleRegistry`]: pending battles with compare-and-swap state
//!   transitions and a retained audit list.
//! - [`AdminRoster`]: the adjudication authorization gate.

pub mod battle;
pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod roster;

pub use battle::{Battle, BattleKey, BattleState, Outcome};
pub use config::EngineConfig;
pub use engine::{BattleEngine, LeaderboardRow, Settlement};
pub use error::{EngineError, RegistryError, Result, RosterError};
pub use registry::BattleRegistry;
pub use roster::AdminRoster;
