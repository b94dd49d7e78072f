//! In-memory chain
//!
//! A `ChainFixture` describes storage as step functions over block height
//! (a value applies from its key block until the next key) plus a flat event
//! log. `MemoryChain` serves it through every reader trait, which makes it
//! usable both for offline reports over exported data and for tests.
//!
//! Block hashes are derived deterministically from the height, so a fixture
//! never needs to spell them out.

use crate::events::*;
use crate::reader::{ChainSnapshotReader, EventRangeReader, MemberDirectory};
use crate::storage::*;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tally_core::{
    AccountId, Balance, BlockHash, BlockNumber, BlockRange, EraIndex, GroupId, Perbill, Result,
    TallyError,
};
use tracing::debug;

/// Staking storage for one era
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EraFixture {
    #[serde(default)]
    pub validator_reward: Option<Balance>,

    #[serde(default)]
    pub total_stake: Balance,

    #[serde(default)]
    pub reward_points: EraRewardPoints,

    #[serde(default)]
    pub prefs: BTreeMap<AccountId, Perbill>,

    #[serde(default)]
    pub stakers: BTreeMap<AccountId, Exposure>,

    #[serde(default)]
    pub validator_slashes: BTreeMap<AccountId, Balance>,

    #[serde(default)]
    pub nominator_slashes: BTreeMap<AccountId, Balance>,
}

/// Indexed events, unsorted
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventLog {
    #[serde(default)]
    pub budget_refills: Vec<BudgetRefillEvent>,

    #[serde(default)]
    pub budget_updates: Vec<BudgetUpdatedEvent>,

    #[serde(default)]
    pub rewards_paid: Vec<RewardPaidEvent>,

    #[serde(default)]
    pub worker_events: Vec<WorkerEvent>,

    #[serde(default)]
    pub proposals_executed: Vec<ProposalExecutedEvent>,

    #[serde(default)]
    pub bounty_judgments: Vec<BountyJudgmentEvent>,

    #[serde(default)]
    pub members_invited: Vec<MemberInvitedEvent>,
}

/// Complete offline description of a chain
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChainFixture {
    /// Highest finalized block
    pub head: BlockNumber,

    /// Active era, keyed by the block it became active
    #[serde(default)]
    pub active_eras: BTreeMap<BlockNumber, EraIndex>,

    #[serde(default)]
    pub eras: BTreeMap<EraIndex, EraFixture>,

    /// Stash to controller
    #[serde(default)]
    pub bonded: BTreeMap<AccountId, AccountId>,

    /// Budget per working group, keyed by the block it was set
    #[serde(default)]
    pub group_budgets: BTreeMap<GroupId, BTreeMap<BlockNumber, Balance>>,

    #[serde(default)]
    pub council_budget: BTreeMap<BlockNumber, Balance>,

    #[serde(default)]
    pub membership_price: Balance,

    #[serde(default)]
    pub members: Vec<MemberRecord>,

    #[serde(default)]
    pub councilors: Vec<CouncilorReward>,

    #[serde(default)]
    pub events: EventLog,
}

impl ChainFixture {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| TallyError::Fixture(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| TallyError::Fixture(format!("{}: {}", path.display(), e)))?;
        let fixture = Self::from_json_str(&content)?;
        debug!(
            "Loaded fixture {} (head {}, {} eras)",
            path.display(),
            fixture.head,
            fixture.eras.len()
        );
        Ok(fixture)
    }
}

/// Value of a step function at `block`
fn step_at<V: Copy>(steps: &BTreeMap<BlockNumber, V>, block: BlockNumber) -> Option<V> {
    steps.range(..=block).next_back().map(|(_, v)| *v)
}

fn in_range(range: BlockRange, at: &EventPosition) -> bool {
    range.contains(at.block)
}

/// Reads that should fail, for exercising partial-failure paths
#[derive(Debug, Default)]
struct FailurePlan {
    eras: BTreeSet<EraIndex>,
    groups: BTreeSet<GroupId>,
}

/// Chain reader backed by a `ChainFixture`
pub struct MemoryChain {
    fixture: ChainFixture,
    /// Hashes handed out so far
    hashes: RwLock<HashMap<BlockHash, BlockNumber>>,
    failures: RwLock<FailurePlan>,
}

impl MemoryChain {
    pub fn new(fixture: ChainFixture) -> Self {
        Self {
            fixture,
            hashes: RwLock::new(HashMap::new()),
            failures: RwLock::new(FailurePlan::default()),
        }
    }

    pub fn fixture(&self) -> &ChainFixture {
        &self.fixture
    }

    /// Hash scheme used for every height
    pub fn hash_of(height: BlockNumber) -> BlockHash {
        BlockHash::from_content(format!("tally-block:{}", height).as_bytes())
    }

    /// Make every storage read for `era` fail
    pub fn fail_era(&self, era: EraIndex) {
        debug!("Injecting storage failure for era {}", era);
        self.failures.write().eras.insert(era);
    }

    /// Make budget and worker reads for `group` fail
    pub fn fail_group(&self, group: GroupId) {
        debug!("Injecting storage failure for group {}", group);
        self.failures.write().groups.insert(group);
    }

    fn height_of(&self, at: BlockHash) -> Result<BlockNumber> {
        self.hashes
            .read()
            .get(&at)
            .copied()
            .ok_or_else(|| TallyError::chain_read(format!("block {}", at), "unknown block hash"))
    }

    fn era(&self, era: EraIndex) -> Result<&EraFixture> {
        if self.failures.read().eras.contains(&era) {
            return Err(TallyError::chain_read(format!("era {}", era), "storage unavailable"));
        }
        self.fixture
            .eras
            .get(&era)
            .ok_or_else(|| TallyError::chain_read(format!("era {}", era), "era not found"))
    }

    fn check_group(&self, group: &GroupId) -> Result<()> {
        if self.failures.read().groups.contains(group) {
            return Err(TallyError::chain_read(format!("group {}", group), "storage unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainSnapshotReader for MemoryChain {
    async fn block_hash(&self, height: BlockNumber) -> Result<BlockHash> {
        if height > self.fixture.head {
            return Err(TallyError::chain_read(
                format!("block {}", height),
                format!("beyond finalized head {}", self.fixture.head),
            ));
        }
        let hash = Self::hash_of(height);
        self.hashes.write().insert(hash, height);
        Ok(hash)
    }

    async fn active_era(&self, at: BlockHash) -> Result<EraIndex> {
        let height = self.height_of(at)?;
        step_at(&self.fixture.active_eras, height).ok_or_else(|| {
            TallyError::chain_read(format!("activeEra at {}", height), "no active era")
        })
    }

    async fn era_validator_reward(&self, at: BlockHash, era: EraIndex) -> Result<Option<Balance>> {
        self.height_of(at)?;
        Ok(self.era(era)?.validator_reward)
    }

    async fn era_total_stake(&self, at: BlockHash, era: EraIndex) -> Result<Balance> {
        self.height_of(at)?;
        Ok(self.era(era)?.total_stake)
    }

    async fn era_reward_points(&self, at: BlockHash, era: EraIndex) -> Result<EraRewardPoints> {
        self.height_of(at)?;
        Ok(self.era(era)?.reward_points.clone())
    }

    async fn era_validator_prefs(
        &self,
        at: BlockHash,
        era: EraIndex,
        stash: &AccountId,
    ) -> Result<ValidatorPrefs> {
        self.height_of(at)?;
        let commission = self.era(era)?.prefs.get(stash).copied().unwrap_or_default();
        Ok(ValidatorPrefs { commission })
    }

    async fn era_stakers(
        &self,
        at: BlockHash,
        era: EraIndex,
        stash: &AccountId,
    ) -> Result<Option<Exposure>> {
        self.height_of(at)?;
        Ok(self.era(era)?.stakers.get(stash).cloned())
    }

    async fn validator_slash_in_era(
        &self,
        at: BlockHash,
        era: EraIndex,
        stash: &AccountId,
    ) -> Result<Option<Balance>> {
        self.height_of(at)?;
        Ok(self.era(era)?.validator_slashes.get(stash).copied())
    }

    async fn nominator_slashes_in_era(
        &self,
        at: BlockHash,
        era: EraIndex,
    ) -> Result<Vec<(AccountId, Balance)>> {
        self.height_of(at)?;
        Ok(self
            .era(era)?
            .nominator_slashes
            .iter()
            .map(|(who, amount)| (who.clone(), *amount))
            .collect())
    }

    async fn bonded(&self, at: BlockHash, stash: &AccountId) -> Result<Option<AccountId>> {
        self.height_of(at)?;
        Ok(self.fixture.bonded.get(stash).cloned())
    }

    async fn group_budget(&self, at: BlockHash, group: &GroupId) -> Result<Balance> {
        let height = self.height_of(at)?;
        self.check_group(group)?;
        let steps = self
            .fixture
            .group_budgets
            .get(group)
            .ok_or_else(|| TallyError::chain_read(format!("{}.budget", group), "no such module"))?;
        Ok(step_at(steps, height).unwrap_or(0))
    }

    async fn council_budget(&self, at: BlockHash) -> Result<Balance> {
        let height = self.height_of(at)?;
        Ok(step_at(&self.fixture.council_budget, height).unwrap_or(0))
    }

    async fn membership_price(&self, at: BlockHash) -> Result<Balance> {
        self.height_of(at)?;
        Ok(self.fixture.membership_price)
    }
}

#[async_trait]
impl EventRangeReader for MemoryChain {
    async fn budget_refills(&self, range: BlockRange) -> Result<Vec<BudgetRefillEvent>> {
        let events = &self.fixture.events.budget_refills;
        Ok(events.iter().filter(|e| in_range(range, &e.at)).cloned().collect())
    }

    async fn budget_updates(&self, range: BlockRange) -> Result<Vec<BudgetUpdatedEvent>> {
        let events = &self.fixture.events.budget_updates;
        Ok(events.iter().filter(|e| in_range(range, &e.at)).cloned().collect())
    }

    async fn rewards_paid(&self, range: BlockRange) -> Result<Vec<RewardPaidEvent>> {
        let events = &self.fixture.events.rewards_paid;
        Ok(events.iter().filter(|e| in_range(range, &e.at)).cloned().collect())
    }

    async fn worker_events(&self, group: &GroupId, range: BlockRange) -> Result<Vec<WorkerEvent>> {
        self.check_group(group)?;
        Ok(self
            .fixture
            .events
            .worker_events
            .iter()
            .filter(|e| &e.group == group && in_range(range, &e.at))
            .cloned()
            .collect())
    }

    async fn proposals_executed(&self, range: BlockRange) -> Result<Vec<ProposalExecutedEvent>> {
        let events = &self.fixture.events.proposals_executed;
        Ok(events.iter().filter(|e| in_range(range, &e.at)).cloned().collect())
    }

    async fn bounty_judgments(&self, range: BlockRange) -> Result<Vec<BountyJudgmentEvent>> {
        let events = &self.fixture.events.bounty_judgments;
        Ok(events.iter().filter(|e| in_range(range, &e.at)).cloned().collect())
    }

    async fn members_invited(&self, range: BlockRange) -> Result<Vec<MemberInvitedEvent>> {
        let events = &self.fixture.events.members_invited;
        Ok(events.iter().filter(|e| in_range(range, &e.at)).cloned().collect())
    }

    async fn councilors_at(&self, _block: BlockNumber) -> Result<Vec<CouncilorReward>> {
        Ok(self.fixture.councilors.clone())
    }
}

#[async_trait]
impl MemberDirectory for MemoryChain {
    async fn resolve_members_by_account(
        &self,
        accounts: &[AccountId],
    ) -> Result<Vec<MemberRecord>> {
        Ok(self
            .fixture
            .members
            .iter()
            .filter(|m| {
                accounts.contains(&m.root_account) || accounts.contains(&m.controller_account)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> ChainFixture {
        let mut fixture = ChainFixture {
            head: 1_000,
            ..Default::default()
        };
        fixture.active_eras.insert(0, 1);
        fixture.active_eras.insert(600, 2);
        fixture.council_budget.insert(0, 500);
        fixture.council_budget.insert(400, 300);
        fixture.eras.insert(
            1,
            EraFixture {
                validator_reward: Some(1_000),
                ..Default::default()
            },
        );
        fixture.events.budget_refills = vec![
            BudgetRefillEvent {
                at: EventPosition::new(99, 0),
                amount: 1,
            },
            BudgetRefillEvent {
                at: EventPosition::new(100, 0),
                amount: 2,
            },
            BudgetRefillEvent {
                at: EventPosition::new(200, 0),
                amount: 3,
            },
        ];
        fixture
    }

    #[tokio::test]
    async fn test_step_function_storage() {
        let chain = MemoryChain::new(fixture());
        let early = chain.block_hash(100).await.unwrap();
        let late = chain.block_hash(700).await.unwrap();

        assert_eq!(chain.active_era(early).await.unwrap(), 1);
        assert_eq!(chain.active_era(late).await.unwrap(), 2);
        assert_eq!(chain.council_budget(early).await.unwrap(), 500);
        assert_eq!(chain.council_budget(late).await.unwrap(), 300);
    }

    #[tokio::test]
    async fn test_unknown_hash_and_head() {
        let chain = MemoryChain::new(fixture());
        assert!(chain.block_hash(1_001).await.is_err());

        let stray = BlockHash::new([9u8; 32]);
        let err = chain.council_budget(stray).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_event_range_is_half_open() {
        let chain = MemoryChain::new(fixture());
        let refills = chain.budget_refills(BlockRange::new(100, 200)).await.unwrap();
        assert_eq!(refills.len(), 1);
        assert_eq!(refills[0].amount, 2);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let chain = MemoryChain::new(fixture());
        let at = chain.block_hash(10).await.unwrap();
        assert_eq!(chain.era_validator_reward(at, 1).await.unwrap(), Some(1_000));

        chain.fail_era(1);
        assert!(chain.era_validator_reward(at, 1).await.is_err());
    }

    #[test]
    fn test_fixture_json() {
        let json = r#"{
            "head": 50,
            "active_eras": { "0": 3 },
            "group_budgets": { "forumWorkingGroup": { "0": 10, "20": 5 } },
            "members": [
                { "id": 1, "root_account": "5Root", "controller_account": "5Ctrl" }
            ]
        }"#;
        let fixture = ChainFixture::from_json_str(json).unwrap();
        assert_eq!(fixture.head, 50);
        assert_eq!(fixture.members[0].id, 1);
        assert_eq!(
            fixture.group_budgets[&GroupId::from("forumWorkingGroup")].get(&20),
            Some(&5)
        );
    }
}
