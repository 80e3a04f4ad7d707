use std::sync::Arc;

use log::{error, info, warn};

use core_types::types::{CoinDelta, Coins, UserId, UserRef};
use ledger::{Account, AccountLedger, BalanceReport, Ranking, StoreError};

use crate::{
    battle::{Battle, BattleKey, BattleState, Outcome},
    config::EngineConfig,
    error::{EngineError, RegistryError, Result, RosterError},
    registry::BattleRegistry,
    roster::AdminRoster,
};

/// Row returned by the leaderboard projection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaderboardRow {
    pub user_id: UserId,
    pub display_name: String,
    pub coins: Coins,
    pub wins: u64,
}

/// Result of a completed settlement.
#[derive(Clone, Debug)]
pub struct Settlement {
    pub battle: Battle,
    pub outcome: Outcome,
    /// Coins moved from loser to winner; zero for a draw.
    pub transferred: Coins,
}

/// Orchestrates proposal, approval, settlement and cancellation over the
/// account ledger, the battle registry, and the admin roster. The engine
/// holds no lock of its own: at-most-once settlement rests on the
/// registry's compare-and-swap and conservation on the ledger's atomic
/// transfer, so the guarantees survive any number of concurrent callers.
pub struct BattleEngine {
    accounts: Arc<AccountLedger>,
    registry: Arc<BattleRegistry>,
    roster: Arc<AdminRoster>,
}

impl BattleEngine {
    /// Wire the engine from its state directory.
    pub fn bootstrap(config: &EngineConfig) -> Result<Self> {
        config.ensure_dirs().map_err(RegistryError::from)?;
        let accounts = AccountLedger::load_or_init(&config.ledger)?;
        let registry = BattleRegistry::load_or_init(config.battles_path())?;
        let roster = AdminRoster::load_or_init(config.admins_path(), config.owner)?;
        Ok(Self::new(accounts, registry, roster))
    }

    /// Assemble from pre-built stores; tests inject arbitrary membership
    /// and balances this way.
    pub fn new(accounts: AccountLedger, registry: BattleRegistry, roster: AdminRoster) -> Self {
        Self {
            accounts: Arc::new(accounts),
            registry: Arc::new(registry),
            roster: Arc::new(roster),
        }
    }

    pub fn accounts(&self) -> Arc<AccountLedger> {
        Arc::clone(&self.accounts)
    }

    pub fn registry(&self) -> Arc<BattleRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn roster(&self) -> Arc<AdminRoster> {
        Arc::clone(&self.roster)
    }

    /// Account touch on any observed interaction: creates the account on
    /// first contact, refreshes the display name after.
    pub fn observe_user(&self, user: &UserRef) -> Result<Account> {
        Ok(self.accounts.get_or_create(user)?)
    }

    /// Create a `Proposed` battle between two distinct participants. Both
    /// balances are checked against the stake but nothing is reserved;
    /// coins only move at settlement.
    pub fn propose(
        &self,
        challenger: &UserRef,
        opponent: &UserRef,
        stake: Coins,
    ) -> Result<Battle> {
        if challenger.id == opponent.id {
            return Err(EngineError::IdenticalParticipants);
        }
        if stake == 0 {
            return Err(EngineError::NonPositiveStake);
        }
        let challenger_account = self.accounts.get_or_create(challenger)?;
        let opponent_account = self.accounts.get_or_create(opponent)?;
        require_funds(&challenger_account, stake)?;
        require_funds(&opponent_account, stake)?;

        let battle = self.registry.propose(challenger.id, opponent.id, stake)?;
        info!(
            "battle {} proposed: {} vs {} for {stake} coins",
            battle.key(),
            challenger.display_name,
            opponent.display_name
        );
        Ok(battle)
    }

    /// Load a pending battle expected to be in `expected`. A terminal
    /// record in the audit list means the caller lost a resolution race,
    /// not that the battle never existed; that surfaces as
    /// `StaleTransition`, never as `NotFound`.
    fn expect_pending(&self, key: BattleKey, expected: BattleState) -> Result<Battle> {
        let battle = match self.registry.get(key) {
            Ok(battle) => battle,
            Err(RegistryError::NotFound { .. }) => match self.registry.last_retired(key) {
                Some(prior) => {
                    return Err(RegistryError::StaleTransition {
                        key,
                        expected,
                        actual: prior.state,
                    }
                    .into())
                }
                None => return Err(RegistryError::NotFound { key }.into()),
            },
            Err(err) => return Err(err.into()),
        };
        if battle.state != expected {
            return Err(RegistryError::StaleTransition {
                key,
                expected,
                actual: battle.state,
            }
            .into());
        }
        Ok(battle)
    }

    /// Admin approval: CAS `Proposed -> Approved`. Balances are
    /// re-validated first; they may have drifted since the proposal.
    pub fn approve(&self, admin: UserId, key: BattleKey) -> Result<Battle> {
        self.roster.require(admin)?;
        let battle = self.expect_pending(key, BattleState::Proposed)?;
        require_funds(&self.accounts.get(battle.challenger)?, battle.stake)?;
        require_funds(&self.accounts.get(battle.opponent)?, battle.stake)?;

        let approved =
            self.registry
                .transition(key, BattleState::Proposed, BattleState::Approved, None)?;
        info!("battle {key} approved by {admin}");
        Ok(approved)
    }

    /// Admin adjudication: CAS `Approved -> Settled` with the outcome
    /// recorded before any coins move, then the atomic transfer. The CAS
    /// is what makes settlement at-most-once; a second call loses the
    /// race and applies nothing.
    pub fn settle(&self, admin: UserId, key: BattleKey, outcome: Outcome) -> Result<Settlement> {
        self.roster.require(admin)?;
        let battle = self.expect_pending(key, BattleState::Approved)?;
        if let Some((_, loser)) = battle.decided(outcome) {
            require_funds(&self.accounts.get(loser)?, battle.stake)?;
        }

        let settled = self.registry.transition(
            key,
            BattleState::Approved,
            BattleState::Settled,
            Some(outcome),
        )?;

        let transferred = match settled.decided(outcome) {
            Some((winner, loser)) => {
                match self.accounts.settle_transfer(loser, winner, settled.stake) {
                    Ok(()) => settled.stake,
                    Err(err @ StoreError::InsufficientFunds { .. }) => {
                        // A concurrent adjustment starved the loser between
                        // the re-check and the transfer; put the battle back
                        // in its prior, still-valid state.
                        warn!("settlement transfer for {key} failed, reverting approval: {err}");
                        self.registry.transition(
                            key,
                            BattleState::Settled,
                            BattleState::Approved,
                            None,
                        )?;
                        return Err(err.into());
                    }
                    Err(err) => {
                        error!("settlement transfer for {key} hit storage failure: {err}");
                        return Err(err.into());
                    }
                }
            }
            None => 0,
        };

        let battle = self.registry.retire(key)?;
        info!(
            "battle {key} settled as {} by {admin}, {transferred} coins moved",
            outcome.label()
        );
        Ok(Settlement {
            battle,
            outcome,
            transferred,
        })
    }

    /// Withdraw a still-proposed battle. Permitted to either participant
    /// or any admin; nothing was reserved, so nothing is refunded.
    pub fn cancel(&self, by: UserId, key: BattleKey) -> Result<Battle> {
        self.expect_pending(key, BattleState::Proposed)?;
        if !(key.involves(by) || self.roster.is_authorized(by)) {
            return Err(RosterError::Forbidden { user_id: by }.into());
        }
        self.registry
            .transition(key, BattleState::Proposed, BattleState::Cancelled, None)?;
        let battle = self.registry.retire(key)?;
        info!("battle {key} cancelled by {by}");
        Ok(battle)
    }

    pub fn pending_battle(&self, key: BattleKey) -> Result<Battle> {
        Ok(self.registry.get(key)?)
    }

    pub fn balance_report(&self, user: &UserRef) -> Result<BalanceReport> {
        let account = self.accounts.get_or_create(user)?;
        Ok(BalanceReport {
            coins: account.coins,
            wins: account.wins,
            losses: account.losses,
        })
    }

    /// Read-only projection over the account store; one consistent
    /// snapshot, no write side effects.
    pub fn leaderboard(&self, limit: usize, ranking: Ranking) -> Vec<LeaderboardRow> {
        self.accounts
            .top(limit, ranking)
            .into_iter()
            .map(|account| LeaderboardRow {
                user_id: account.user_id,
                display_name: account.display_name,
                coins: account.coins,
                wins: account.wins,
            })
            .collect()
    }

    /// Authorized free-form balance adjustment, positive or negative,
    /// floor-checked like every other debit.
    pub fn grant_coins(&self, admin: UserId, target: UserId, delta: CoinDelta) -> Result<Coins> {
        self.roster.require(admin)?;
        let balance = self.accounts.adjust_balance(target, delta)?;
        info!("admin {admin} adjusted {target} by {delta}, balance now {balance}");
        Ok(balance)
    }

    /// Same adjustment, addressing the target by display name.
    pub fn grant_coins_by_name(&self, admin: UserId, name: &str, delta: CoinDelta) -> Result<Coins> {
        self.roster.require(admin)?;
        let account = self.accounts.find_by_display_name(name)?;
        let balance = self.accounts.adjust_balance(account.user_id, delta)?;
        info!(
            "admin {admin} adjusted {} by {delta}, balance now {balance}",
            account.user_id
        );
        Ok(balance)
    }

    pub fn grant_admin(&self, by: UserId, target: UserId) -> Result<()> {
        self.roster.grant(by, target)?;
        info!("admin {by} granted adjudication rights to {target}");
        Ok(())
    }

    pub fn revoke_admin(&self, by: UserId, target: UserId) -> Result<()> {
        self.roster.revoke(by, target)?;
        info!("admin {by} revoked adjudication rights from {target}");
        Ok(())
    }

    /// Retained terminal battles, oldest first.
    pub fn audit_log(&self) -> Vec<Battle> {
        self.registry.audit_log()
    }
}

fn require_funds(account: &Account, stake: Coins) -> Result<()> {
    if account.coins < stake {
        return Err(StoreError::InsufficientFunds {
            user_id: account.user_id,
            balance: account.coins,
            debit: stake,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const OWNER: UserId = 1000;

    fn engine_in(dir: &std::path::Path) -> BattleEngine {
        let config = EngineConfig::new(dir.to_path_buf(), OWNER);
        BattleEngine::bootstrap(&config).expect("engine bootstrap")
    }

    fn alice() -> UserRef {
        UserRef::new(1, "alice")
    }

    fn bob() -> UserRef {
        UserRef::new(2, "bob")
    }

    #[test]
    fn propose_rejects_bad_arguments() {
        let dir = tempdir().unwrap();
        let engine = engine_in(dir.path());

        assert!(matches!(
            engine.propose(&alice(), &alice(), 10),
            Err(EngineError::IdenticalParticipants)
        ));
        assert!(matches!(
            engine.propose(&alice(), &bob(), 0),
            Err(EngineError::NonPositiveStake)
        ));
    }

    #[test]
    fn full_battle_round_trip() {
        let dir = tempdir().unwrap();
        let engine = engine_in(dir.path());

        let battle = engine.propose(&alice(), &bob(), 30).unwrap();
        let key = battle.key();
        assert_eq!(battle.state, BattleState::Proposed);

        let approved = engine.approve(OWNER, key).unwrap();
        assert_eq!(approved.state, BattleState::Approved);

        let settlement = engine.settle(OWNER, key, Outcome::ChallengerWin).unwrap();
        assert_eq!(settlement.transferred, 30);
        assert_eq!(settlement.battle.state, BattleState::Settled);

        let accounts = engine.accounts();
        assert_eq!(accounts.get(1).unwrap().coins, 130);
        assert_eq!(accounts.get(2).unwrap().coins, 70);
        assert_eq!(engine.audit_log().len(), 1);
    }

    #[test]
    fn non_admins_cannot_adjudicate() {
        let dir = tempdir().unwrap();
        let engine = engine_in(dir.path());
        let key = engine.propose(&alice(), &bob(), 10).unwrap().key();

        assert!(matches!(
            engine.approve(1, key),
            Err(EngineError::Roster(RosterError::Forbidden { user_id: 1 }))
        ));
        assert_eq!(engine.pending_battle(key).unwrap().state, BattleState::Proposed);
    }

    #[test]
    fn participants_can_cancel_their_own_proposal() {
        let dir = tempdir().unwrap();
        let engine = engine_in(dir.path());
        let key = engine.propose(&alice(), &bob(), 10).unwrap().key();

        assert!(matches!(
            engine.cancel(5, key),
            Err(EngineError::Roster(RosterError::Forbidden { user_id: 5 }))
        ));

        let cancelled = engine.cancel(2, key).unwrap();
        assert_eq!(cancelled.state, BattleState::Cancelled);
        assert!(engine.pending_battle(key).is_err());
    }
}
