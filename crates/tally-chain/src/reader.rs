//! # Collaborator Contracts
//!
//! Read-only access to finalized chain state. Implementations wrap an RPC
//! node, an indexer, or (for tests and offline reports) a JSON fixture.
//!
//! Storage reads are keyed by block hash; event queries take a half-open
//! block range `[start, end)`. All readers are shared by reference across
//! concurrent units of work, hence `Send + Sync`.

use crate::events::*;
use crate::storage::*;
use async_trait::async_trait;
use tally_core::{
    AccountId, Balance, BlockHash, BlockNumber, BlockRange, EraIndex, GroupId, Result,
};

/// Point-in-time storage reads
#[async_trait]
pub trait ChainSnapshotReader: Send + Sync {
    /// Hash of the finalized block at `height`
    async fn block_hash(&self, height: BlockNumber) -> Result<BlockHash>;

    /// `staking.activeEra` at `at`
    async fn active_era(&self, at: BlockHash) -> Result<EraIndex>;

    /// `staking.erasValidatorReward(era)`, `None` until the era is paid out
    async fn era_validator_reward(&self, at: BlockHash, era: EraIndex) -> Result<Option<Balance>>;

    /// `staking.erasTotalStake(era)`
    async fn era_total_stake(&self, at: BlockHash, era: EraIndex) -> Result<Balance>;

    /// `staking.erasRewardPoints(era)`
    async fn era_reward_points(&self, at: BlockHash, era: EraIndex) -> Result<EraRewardPoints>;

    /// `staking.erasValidatorPrefs(era, stash)`
    async fn era_validator_prefs(
        &self,
        at: BlockHash,
        era: EraIndex,
        stash: &AccountId,
    ) -> Result<ValidatorPrefs>;

    /// `staking.erasStakers(era, stash)`, `None` when no exposure is stored
    async fn era_stakers(
        &self,
        at: BlockHash,
        era: EraIndex,
        stash: &AccountId,
    ) -> Result<Option<Exposure>>;

    /// `staking.validatorSlashInEra(era, stash)`, slashed amount if any
    async fn validator_slash_in_era(
        &self,
        at: BlockHash,
        era: EraIndex,
        stash: &AccountId,
    ) -> Result<Option<Balance>>;

    /// All `staking.nominatorSlashInEra(era, *)` entries
    async fn nominator_slashes_in_era(
        &self,
        at: BlockHash,
        era: EraIndex,
    ) -> Result<Vec<(AccountId, Balance)>>;

    /// `staking.bonded(stash)`, `None` for an unbonded stash
    async fn bonded(&self, at: BlockHash, stash: &AccountId) -> Result<Option<AccountId>>;

    /// `<group>.budget`
    async fn group_budget(&self, at: BlockHash, group: &GroupId) -> Result<Balance>;

    /// `council.budget`
    async fn council_budget(&self, at: BlockHash) -> Result<Balance>;

    /// `members.membershipPrice`
    async fn membership_price(&self, at: BlockHash) -> Result<Balance>;
}

/// Indexed event queries over `[range.start, range.end)`
#[async_trait]
pub trait EventRangeReader: Send + Sync {
    async fn budget_refills(&self, range: BlockRange) -> Result<Vec<BudgetRefillEvent>>;

    async fn budget_updates(&self, range: BlockRange) -> Result<Vec<BudgetUpdatedEvent>>;

    async fn rewards_paid(&self, range: BlockRange) -> Result<Vec<RewardPaidEvent>>;

    /// Lifecycle and slash events of one group's workers
    async fn worker_events(&self, group: &GroupId, range: BlockRange) -> Result<Vec<WorkerEvent>>;

    async fn proposals_executed(&self, range: BlockRange) -> Result<Vec<ProposalExecutedEvent>>;

    async fn bounty_judgments(&self, range: BlockRange) -> Result<Vec<BountyJudgmentEvent>>;

    async fn members_invited(&self, range: BlockRange) -> Result<Vec<MemberInvitedEvent>>;

    /// Councilors seated at `block` with their accrued rewards
    async fn councilors_at(&self, block: BlockNumber) -> Result<Vec<CouncilorReward>>;
}

/// Membership lookups by account
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// Every membership whose root or controller account is in `accounts`
    async fn resolve_members_by_account(&self, accounts: &[AccountId]) -> Result<Vec<MemberRecord>>;
}
