//! # Budget Ledger
//!
//! Per-group budget flows over a block range, keyed by `GroupId`. The council
//! is tracked as one more group.
//!
//! For every group the ledger keeps the soft identity
//!
//! ```text
//! start + refills - end = spent + untracked
//! ```
//!
//! and surfaces `untracked` instead of hiding it. Budget moved between two
//! tracked groups appears on both sides (a spend on the source, a refill on
//! the target) and is left out of the aggregate identity, so only money
//! entering from outside or leaving to recipients counts there.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tally_chain::{ChainSnapshotReader, EventPosition};
use tally_core::{
    signed_sub, AccountId, Balance, BlockHash, GroupId, MemberId, Result, SignedBalance,
    TallyError, WorkerId,
};
use tracing::debug;

/// Where a refill came from
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefillSource {
    /// Minted into the system, e.g. the periodic council refill
    External,
    /// Moved from another group's budget
    Transfer(GroupId),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refill {
    pub at: EventPosition,
    pub amount: Balance,
    pub source: RefillSource,
}

/// What a spend line item paid for
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendCategory {
    WorkerReward,
    CouncilorReward,
    MembershipInvite,
    FundingRequest,
    BountyPayout,
    GroupBudgetTransfer,
}

impl SpendCategory {
    /// Budget moved to another group
    pub fn is_transfer(&self) -> bool {
        matches!(self, Self::GroupBudgetTransfer)
    }
}

impl fmt::Display for SpendCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WorkerReward => "worker reward",
            Self::CouncilorReward => "councilor reward",
            Self::MembershipInvite => "membership invite",
            Self::FundingRequest => "funding request",
            Self::BountyPayout => "bounty payout",
            Self::GroupBudgetTransfer => "group budget transfer",
        };
        f.write_str(name)
    }
}

/// Who received a spend
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    Worker {
        worker_id: WorkerId,
        member_id: Option<MemberId>,
    },
    Councilor {
        member_id: MemberId,
    },
    Member {
        member_id: MemberId,
    },
    Account(AccountId),
    Group(GroupId),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendItem {
    /// `None` for accruals read from storage rather than events
    pub at: Option<EventPosition>,
    pub category: SpendCategory,
    pub recipient: Recipient,
    pub amount: Balance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// One group's ledger over the range
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub group: GroupId,

    pub start_amount: Balance,

    pub end_amount: Balance,

    pub refills: Vec<Refill>,

    pub spends: Vec<SpendItem>,

    /// Sum of `spends`
    pub spent: Balance,
}

impl BudgetStatus {
    pub fn new(group: GroupId, start_amount: Balance, end_amount: Balance) -> Self {
        Self {
            group,
            start_amount,
            end_amount,
            refills: Vec::new(),
            spends: Vec::new(),
            spent: 0,
        }
    }

    /// Read both boundary amounts from storage
    pub async fn read(
        reader: &dyn ChainSnapshotReader,
        group: &GroupId,
        start: BlockHash,
        end: BlockHash,
    ) -> Result<Self> {
        let (start_amount, end_amount) = if group.is_council() {
            (
                reader.council_budget(start).await?,
                reader.council_budget(end).await?,
            )
        } else {
            (
                reader.group_budget(start, group).await?,
                reader.group_budget(end, group).await?,
            )
        };
        debug!("{} budget: {} at start, {} at end", group, start_amount, end_amount);
        Ok(Self::new(group.clone(), start_amount, end_amount))
    }

    pub fn refilled(&self) -> Balance {
        self.refills.iter().map(|r| r.amount).sum()
    }

    pub fn external_refills(&self) -> Balance {
        self.refills
            .iter()
            .filter(|r| r.source == RefillSource::External)
            .map(|r| r.amount)
            .sum()
    }

    pub fn spent_on(&self, category: SpendCategory) -> Balance {
        self.spends
            .iter()
            .filter(|s| s.category == category)
            .map(|s| s.amount)
            .sum()
    }

    /// `start + refills - end`
    pub fn drained(&self) -> Option<SignedBalance> {
        let inflow = self.start_amount.checked_add(self.refilled())?;
        signed_sub(inflow, self.end_amount)
    }

    /// Part of the drained amount no spend line explains
    pub fn untracked(&self) -> Option<SignedBalance> {
        self.drained()?
            .checked_sub(SignedBalance::try_from(self.spent).ok()?)
    }

    /// Per-category totals
    pub fn spent_by_category(&self) -> BTreeMap<SpendCategory, Balance> {
        let mut totals = BTreeMap::new();
        for spend in &self.spends {
            *totals.entry(spend.category).or_insert(0) += spend.amount;
        }
        totals
    }
}

/// Aggregate across every group in the ledger
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub start_amount: Balance,

    pub end_amount: Balance,

    /// Refills from outside the tracked groups
    pub external_refills: Balance,

    /// Moves between tracked groups
    pub transfers: Balance,

    /// Spend leaving the tracked groups
    pub spent: Balance,

    /// `start + external refills - end`
    pub drained: SignedBalance,

    /// `drained - spent`
    pub unattributed: SignedBalance,
}

/// Budget status of every tracked group
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetLedger {
    groups: BTreeMap<GroupId, BudgetStatus>,
}

impl BudgetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a group; replaces any previous status for it
    pub fn insert(&mut self, status: BudgetStatus) {
        self.groups.insert(status.group.clone(), status);
    }

    pub fn contains(&self, group: &GroupId) -> bool {
        self.groups.contains_key(group)
    }

    pub fn get(&self, group: &GroupId) -> Result<&BudgetStatus> {
        self.groups
            .get(group)
            .ok_or_else(|| TallyError::UnknownGroup(group.clone()))
    }

    fn get_mut(&mut self, group: &GroupId) -> Result<&mut BudgetStatus> {
        self.groups
            .get_mut(group)
            .ok_or_else(|| TallyError::UnknownGroup(group.clone()))
    }

    pub fn groups(&self) -> impl Iterator<Item = &BudgetStatus> {
        self.groups.values()
    }

    pub fn record_refill(&mut self, group: &GroupId, refill: Refill) -> Result<()> {
        self.get_mut(group)?.refills.push(refill);
        Ok(())
    }

    pub fn record_spend(&mut self, group: &GroupId, spend: SpendItem) -> Result<()> {
        let status = self.get_mut(group)?;
        status.spent = status
            .spent
            .checked_add(spend.amount)
            .ok_or(TallyError::Overflow("group spend"))?;
        status.spends.push(spend);
        Ok(())
    }

    /// Move budget between two groups
    ///
    /// Each tracked side gets its half: a transfer spend on `from`, a refill
    /// on `to`. Fails without recording anything if neither side is tracked.
    pub fn record_transfer(
        &mut self,
        from: &GroupId,
        to: &GroupId,
        amount: Balance,
        at: EventPosition,
    ) -> Result<()> {
        if !self.contains(from) && !self.contains(to) {
            return Err(TallyError::UnknownGroup(to.clone()));
        }
        if self.contains(from) {
            self.record_spend(
                from,
                SpendItem {
                    at: Some(at),
                    category: SpendCategory::GroupBudgetTransfer,
                    recipient: Recipient::Group(to.clone()),
                    amount,
                    note: None,
                },
            )?;
        }
        if self.contains(to) {
            self.record_refill(
                to,
                Refill {
                    at,
                    amount,
                    source: RefillSource::Transfer(from.clone()),
                },
            )?;
        }
        Ok(())
    }

    /// Refill that brings money into the tracked groups as a whole
    fn is_inflow(&self, refill: &Refill) -> bool {
        match &refill.source {
            RefillSource::External => true,
            RefillSource::Transfer(from) => !self.contains(from),
        }
    }

    /// Spend that moves money between two tracked groups
    fn is_internal(&self, spend: &SpendItem) -> bool {
        match &spend.recipient {
            Recipient::Group(to) => spend.category.is_transfer() && self.contains(to),
            _ => false,
        }
    }

    pub fn totals(&self) -> Result<LedgerTotals> {
        let overflow = || TallyError::Overflow("ledger totals");
        let mut totals = LedgerTotals::default();
        for status in self.groups.values() {
            totals.start_amount = totals
                .start_amount
                .checked_add(status.start_amount)
                .ok_or_else(overflow)?;
            totals.end_amount = totals
                .end_amount
                .checked_add(status.end_amount)
                .ok_or_else(overflow)?;
            for refill in status.refills.iter().filter(|r| self.is_inflow(r)) {
                totals.external_refills = totals
                    .external_refills
                    .checked_add(refill.amount)
                    .ok_or_else(overflow)?;
            }
            for spend in &status.spends {
                let bucket = if self.is_internal(spend) {
                    &mut totals.transfers
                } else {
                    &mut totals.spent
                };
                *bucket = bucket.checked_add(spend.amount).ok_or_else(overflow)?;
            }
        }

        let inflow = totals
            .start_amount
            .checked_add(totals.external_refills)
            .ok_or_else(overflow)?;
        totals.drained = signed_sub(inflow, totals.end_amount).ok_or_else(overflow)?;
        totals.unattributed = totals
            .drained
            .checked_sub(SignedBalance::try_from(totals.spent).map_err(|_| overflow())?)
            .ok_or_else(overflow)?;
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &str) -> GroupId {
        GroupId::from(name)
    }

    fn spend(category: SpendCategory, amount: Balance) -> SpendItem {
        SpendItem {
            at: Some(EventPosition::new(10, 0)),
            category,
            recipient: Recipient::Worker {
                worker_id: 1,
                member_id: Some(1),
            },
            amount,
            note: None,
        }
    }

    #[test]
    fn test_unattributed_spending() {
        let forum = group("forumWorkingGroup");
        let mut ledger = BudgetLedger::new();
        ledger.insert(BudgetStatus::new(forum.clone(), 500, 300));
        ledger
            .record_refill(
                &forum,
                Refill {
                    at: EventPosition::new(5, 0),
                    amount: 200,
                    source: RefillSource::External,
                },
            )
            .unwrap();
        ledger
            .record_spend(&forum, spend(SpendCategory::WorkerReward, 350))
            .unwrap();

        let status = ledger.get(&forum).unwrap();
        assert_eq!(status.drained(), Some(400));
        assert_eq!(status.untracked(), Some(50));

        let totals = ledger.totals().unwrap();
        assert_eq!(totals.unattributed, 50);
    }

    #[test]
    fn test_transfers_excluded_from_aggregate() {
        let council = GroupId::council();
        let storage = group("storageWorkingGroup");
        let mut ledger = BudgetLedger::new();
        ledger.insert(BudgetStatus::new(council.clone(), 1_000, 700));
        ledger.insert(BudgetStatus::new(storage.clone(), 0, 50));

        ledger
            .record_transfer(&council, &storage, 300, EventPosition::new(20, 1))
            .unwrap();
        ledger
            .record_spend(&storage, spend(SpendCategory::WorkerReward, 250))
            .unwrap();

        assert_eq!(ledger.get(&council).unwrap().untracked(), Some(0));
        assert_eq!(ledger.get(&storage).unwrap().untracked(), Some(0));

        let totals = ledger.totals().unwrap();
        assert_eq!(totals.transfers, 300);
        assert_eq!(totals.spent, 250);
        assert_eq!(totals.drained, 250);
        assert_eq!(totals.unattributed, 0);
    }

    #[test]
    fn test_unknown_group_is_explicit() {
        let mut ledger = BudgetLedger::new();
        let missing = group("missing");
        assert!(matches!(
            ledger.record_spend(&missing, spend(SpendCategory::BountyPayout, 1)),
            Err(TallyError::UnknownGroup(_))
        ));

        assert!(ledger
            .record_transfer(&GroupId::council(), &missing, 5, EventPosition::default())
            .is_err());
    }

    #[test]
    fn test_transfer_to_untracked_group_is_spend() {
        let council = GroupId::council();
        let mut ledger = BudgetLedger::new();
        ledger.insert(BudgetStatus::new(council.clone(), 100, 60));
        ledger
            .record_transfer(&council, &group("untracked"), 40, EventPosition::new(3, 0))
            .unwrap();

        let totals = ledger.totals().unwrap();
        assert_eq!(totals.transfers, 0);
        assert_eq!(totals.spent, 40);
        assert_eq!(totals.unattributed, 0);
    }

    #[test]
    fn test_transfer_from_untracked_group_is_inflow() {
        let forum = group("forumWorkingGroup");
        let mut ledger = BudgetLedger::new();
        ledger.insert(BudgetStatus::new(forum.clone(), 0, 30));
        ledger
            .record_transfer(&GroupId::council(), &forum, 30, EventPosition::new(3, 0))
            .unwrap();

        let totals = ledger.totals().unwrap();
        assert_eq!(totals.external_refills, 30);
        assert_eq!(totals.unattributed, 0);
    }

    #[test]
    fn test_group_without_events_spends_nothing() {
        let mut ledger = BudgetLedger::new();
        ledger.insert(BudgetStatus::new(group("membershipWorkingGroup"), 40, 40));
        let status = ledger.get(&group("membershipWorkingGroup")).unwrap();
        assert_eq!(status.spent, 0);
        assert_eq!(status.untracked(), Some(0));
    }

    #[test]
    fn test_spent_by_category() {
        let mut status = BudgetStatus::new(GroupId::council(), 0, 0);
        status.spends.push(spend(SpendCategory::CouncilorReward, 10));
        status.spends.push(spend(SpendCategory::CouncilorReward, 5));
        status.spends.push(spend(SpendCategory::FundingRequest, 7));
        let totals = status.spent_by_category();
        assert_eq!(totals[&SpendCategory::CouncilorReward], 15);
        assert_eq!(status.spent_on(SpendCategory::FundingRequest), 7);
    }
}
