//! # Worker Timeline
//!
//! Rebuilds each worker's tenure in one group from the ordered event log.
//!
//! ```text
//! Hired ──► Active ──► Terminated
//!              │
//!              └─────► Left
//! ```
//!
//! A record with no closing event is still active; that state is derived at
//! query time from `left_at == None`, never stored. Rewards and slashes are
//! folded into a record only when their block lies in `[hired_at, left_at)`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tally_chain::{EventPosition, RewardPaidEvent, WorkerEvent, WorkerEventKind};
use tally_core::{AccountId, Balance, BlockNumber, BlockRange, GroupId, MemberId, WorkerId};
use tracing::{debug, warn};

/// How a tenure ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerExit {
    Terminated,
    Left,
}

/// Tenure state at a given block
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    NotYetHired,
    Active,
    Terminated,
    Left,
}

/// A reward paid to a worker
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub at: EventPosition,
    pub amount: Balance,
}

/// One worker instance within one group
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub group: GroupId,

    pub worker_id: WorkerId,

    pub member_id: MemberId,

    pub handle: Option<String>,

    pub reward_account: AccountId,

    pub hired_at: BlockNumber,

    /// `None` while the worker is still in role
    pub left_at: Option<BlockNumber>,

    pub exit: Option<WorkerExit>,

    pub is_lead: bool,

    /// Block the lead role was unset, if it was
    pub lead_until: Option<BlockNumber>,

    /// Rewards paid during tenure
    pub reward: Balance,

    /// Stake slashed during tenure
    pub slashed: Balance,

    pub payments: Vec<Payment>,
}

impl WorkerRecord {
    /// True if `block` lies in `[hired_at, left_at)`
    pub fn is_active_at(&self, block: BlockNumber) -> bool {
        block >= self.hired_at && self.left_at.map_or(true, |left| block < left)
    }

    pub fn status_at(&self, block: BlockNumber) -> WorkerStatus {
        if block < self.hired_at {
            return WorkerStatus::NotYetHired;
        }
        match (self.left_at, self.exit) {
            (Some(left), Some(WorkerExit::Terminated)) if block >= left => WorkerStatus::Terminated,
            (Some(left), _) if block >= left => WorkerStatus::Left,
            _ => WorkerStatus::Active,
        }
    }

    /// Tenure end, or `fallback` for a worker still in role
    pub fn end_or(&self, fallback: BlockNumber) -> BlockNumber {
        self.left_at.unwrap_or(fallback)
    }

    /// True if the tenure shares a block with `[start, end)`
    pub fn overlaps(&self, start: BlockNumber, end: BlockNumber) -> bool {
        BlockRange::new(start, end).overlaps(self.hired_at, self.end_or(BlockNumber::MAX))
    }

    /// Tenure length clipped to `range`
    pub fn active_blocks(&self, range: BlockRange) -> BlockNumber {
        let start = self.hired_at.max(range.start);
        let end = self.end_or(range.end).min(range.end);
        end.saturating_sub(start)
    }

    /// Lead role interval, if this worker ever led
    pub fn lead_interval(&self) -> Option<(BlockNumber, Option<BlockNumber>)> {
        if !self.is_lead {
            return None;
        }
        let end = match (self.lead_until, self.left_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Some((self.hired_at, end))
    }

    /// True if the worker holds the lead role at `block`
    pub fn is_lead_at(&self, block: BlockNumber) -> bool {
        match self.lead_interval() {
            Some((start, end)) => block >= start && end.map_or(true, |e| block < e),
            None => false,
        }
    }

    pub fn reward_in(&self, start: BlockNumber, end: BlockNumber) -> Balance {
        self.payments
            .iter()
            .filter(|p| p.at.block >= start && p.at.block < end)
            .map(|p| p.amount)
            .sum()
    }
}

/// Outcome of offering a reward payment to the timeline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RewardFold {
    Folded,
    /// Worker exists but the payment lies outside its tenure
    OutsideTenure,
    UnknownWorker,
}

/// Reward events that could not be attributed to a tenure
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnfoldedRewards {
    pub outside_tenure: Vec<RewardPaidEvent>,
    pub unknown_worker: Vec<RewardPaidEvent>,
}

/// Every worker of one group up to an end block
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerTimeline {
    pub group: GroupId,

    /// Exclusive upper bound of the observed history
    pub end: BlockNumber,

    workers: BTreeMap<WorkerId, WorkerRecord>,

    pub unfolded: UnfoldedRewards,
}

impl WorkerTimeline {
    pub fn new(group: GroupId, end: BlockNumber) -> Self {
        Self {
            group,
            end,
            workers: BTreeMap::new(),
            unfolded: UnfoldedRewards::default(),
        }
    }

    /// Build from an unordered event log; events at or after `end` are ignored
    pub fn from_events(group: GroupId, end: BlockNumber, mut events: Vec<WorkerEvent>) -> Self {
        events.sort_by_key(|e| e.at);
        let mut timeline = Self::new(group, end);
        for event in &events {
            timeline.apply(event);
        }
        timeline
    }

    /// Single transition for one event
    pub fn apply(&mut self, event: &WorkerEvent) {
        if event.group != self.group {
            warn!(
                "Ignoring {} event for worker {} in timeline of {}",
                event.group, event.worker_id, self.group
            );
            return;
        }
        let block = event.at.block;
        if block >= self.end {
            return;
        }

        match &event.kind {
            WorkerEventKind::Hired {
                member_id,
                handle,
                reward_account,
                is_lead,
            } => {
                if self.workers.contains_key(&event.worker_id) {
                    warn!(
                        "Duplicate hire of worker {} in {} at block {}",
                        event.worker_id, self.group, block
                    );
                    return;
                }
                debug!(
                    "{}: worker {} (member {}) hired at {}",
                    self.group, event.worker_id, member_id, block
                );
                self.workers.insert(
                    event.worker_id,
                    WorkerRecord {
                        group: self.group.clone(),
                        worker_id: event.worker_id,
                        member_id: *member_id,
                        handle: handle.clone(),
                        reward_account: reward_account.clone(),
                        hired_at: block,
                        left_at: None,
                        exit: None,
                        is_lead: *is_lead,
                        lead_until: None,
                        reward: 0,
                        slashed: 0,
                        payments: Vec::new(),
                    },
                );
            }
            WorkerEventKind::Terminated => {
                self.close(event.worker_id, block, WorkerExit::Terminated)
            }
            WorkerEventKind::Exited => self.close(event.worker_id, block, WorkerExit::Left),
            WorkerEventKind::LeaderUnset => match self.workers.get_mut(&event.worker_id) {
                Some(record) if record.is_lead && record.lead_until.is_none() => {
                    record.lead_until = Some(block);
                }
                _ => warn!(
                    "{}: leader unset for worker {} who is not an active lead",
                    self.group, event.worker_id
                ),
            },
            WorkerEventKind::Slashed { amount } => match self.workers.get_mut(&event.worker_id) {
                Some(record) if record.is_active_at(block) => {
                    record.slashed = record.slashed.saturating_add(*amount);
                }
                _ => warn!(
                    "{}: slash of {} for worker {} outside any tenure at block {}",
                    self.group, amount, event.worker_id, block
                ),
            },
        }
    }

    fn close(&mut self, worker_id: WorkerId, block: BlockNumber, exit: WorkerExit) {
        match self.workers.get_mut(&worker_id) {
            Some(record) if record.left_at.is_none() => {
                debug!("{}: worker {} {:?} at {}", self.group, worker_id, exit, block);
                record.left_at = Some(block);
                record.exit = Some(exit);
            }
            Some(_) => warn!("{}: worker {} closed twice", self.group, worker_id),
            None => warn!("{}: closing unknown worker {}", self.group, worker_id),
        }
    }

    /// Attribute one reward payment
    pub fn fold_reward(&mut self, event: &RewardPaidEvent) -> RewardFold {
        let outcome = match self.workers.get_mut(&event.worker_id) {
            None => RewardFold::UnknownWorker,
            Some(record) if !record.is_active_at(event.at.block) => RewardFold::OutsideTenure,
            Some(record) => {
                record.reward = record.reward.saturating_add(event.amount);
                record.payments.push(Payment {
                    at: event.at,
                    amount: event.amount,
                });
                RewardFold::Folded
            }
        };
        match outcome {
            RewardFold::Folded => {}
            RewardFold::OutsideTenure => {
                debug!(
                    "{}: reward of {} at block {} outside tenure of worker {}",
                    self.group, event.amount, event.at.block, event.worker_id
                );
                self.unfolded.outside_tenure.push(event.clone());
            }
            RewardFold::UnknownWorker => {
                warn!(
                    "{}: reward paid to unknown worker {}",
                    self.group, event.worker_id
                );
                self.unfolded.unknown_worker.push(event.clone());
            }
        }
        outcome
    }

    /// Fold every payment of this group, in chain order
    pub fn fold_rewards<'e>(&mut self, events: impl IntoIterator<Item = &'e RewardPaidEvent>) {
        let mut ours: Vec<&RewardPaidEvent> =
            events.into_iter().filter(|e| e.group == self.group).collect();
        ours.sort_by_key(|e| e.at);
        for event in ours {
            self.fold_reward(event);
        }
    }

    pub fn get(&self, worker_id: WorkerId) -> Option<&WorkerRecord> {
        self.workers.get(&worker_id)
    }

    /// All records ordered by worker id
    pub fn workers(&self) -> impl Iterator<Item = &WorkerRecord> {
        self.workers.values()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Records whose tenure overlaps `[start, end)`
    pub fn overlapping(
        &self,
        start: BlockNumber,
        end: BlockNumber,
    ) -> impl Iterator<Item = &WorkerRecord> {
        self.workers.values().filter(move |w| w.overlaps(start, end))
    }

    pub fn active_at(&self, block: BlockNumber) -> impl Iterator<Item = &WorkerRecord> {
        self.workers.values().filter(move |w| w.is_active_at(block))
    }

    /// Member holding a worker role at `block`
    pub fn member_active_at(
        &self,
        member_id: MemberId,
        block: BlockNumber,
    ) -> Option<&WorkerRecord> {
        self.active_at(block).find(|w| w.member_id == member_id)
    }

    pub fn lead_at(&self, block: BlockNumber) -> Option<&WorkerRecord> {
        self.workers.values().find(|w| w.is_lead_at(block))
    }

    pub fn hired_in(&self, range: BlockRange) -> impl Iterator<Item = &WorkerRecord> {
        self.workers.values().filter(move |w| range.contains(w.hired_at))
    }

    pub fn left_in(&self, range: BlockRange) -> impl Iterator<Item = &WorkerRecord> {
        self.workers
            .values()
            .filter(move |w| w.left_at.map_or(false, |left| range.contains(left)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> GroupId {
        GroupId::from("forumWorkingGroup")
    }

    fn hired(
        block: BlockNumber,
        worker_id: WorkerId,
        member_id: MemberId,
        is_lead: bool,
    ) -> WorkerEvent {
        WorkerEvent {
            at: EventPosition::new(block, 0),
            group: group(),
            worker_id,
            kind: WorkerEventKind::Hired {
                member_id,
                handle: Some(format!("member{}", member_id)),
                reward_account: AccountId::new(format!("5Reward{}", worker_id)),
                is_lead,
            },
        }
    }

    fn event(block: BlockNumber, worker_id: WorkerId, kind: WorkerEventKind) -> WorkerEvent {
        WorkerEvent {
            at: EventPosition::new(block, 0),
            group: group(),
            worker_id,
            kind,
        }
    }

    fn reward(block: BlockNumber, worker_id: WorkerId, amount: Balance) -> RewardPaidEvent {
        RewardPaidEvent {
            at: EventPosition::new(block, 0),
            group: group(),
            worker_id,
            reward_account: AccountId::new(format!("5Reward{}", worker_id)),
            amount,
        }
    }

    #[test]
    fn test_reward_after_termination_not_folded() {
        let mut timeline = WorkerTimeline::from_events(
            group(),
            1_000,
            vec![
                event(500, 1, WorkerEventKind::Terminated),
                hired(100, 1, 10, false),
            ],
        );
        assert_eq!(timeline.fold_reward(&reward(300, 1, 40)), RewardFold::Folded);
        assert_eq!(
            timeline.fold_reward(&reward(600, 1, 25)),
            RewardFold::OutsideTenure
        );

        let worker = timeline.get(1).unwrap();
        assert_eq!(worker.reward, 40);
        assert_eq!(worker.left_at, Some(500));
        assert_eq!(worker.status_at(700), WorkerStatus::Terminated);
        assert_eq!(timeline.unfolded.outside_tenure.len(), 1);
    }

    #[test]
    fn test_huge_amounts_saturate() {
        let mut timeline = WorkerTimeline::from_events(
            group(),
            1_000,
            vec![
                hired(100, 1, 10, false),
                event(200, 1, WorkerEventKind::Slashed { amount: Balance::MAX }),
                event(300, 1, WorkerEventKind::Slashed { amount: 5 }),
            ],
        );
        assert_eq!(timeline.fold_reward(&reward(400, 1, Balance::MAX)), RewardFold::Folded);
        assert_eq!(timeline.fold_reward(&reward(500, 1, 7)), RewardFold::Folded);

        let worker = timeline.get(1).unwrap();
        assert_eq!(worker.reward, Balance::MAX);
        assert_eq!(worker.slashed, Balance::MAX);
        assert_eq!(worker.payments.len(), 2);
    }

    #[test]
    fn test_tenure_is_half_open() {
        let mut timeline = WorkerTimeline::from_events(
            group(),
            1_000,
            vec![hired(100, 1, 10, false), event(500, 1, WorkerEventKind::Exited)],
        );
        assert_eq!(timeline.fold_reward(&reward(100, 1, 1)), RewardFold::Folded);
        assert_eq!(timeline.fold_reward(&reward(500, 1, 1)), RewardFold::OutsideTenure);
        assert_eq!(timeline.fold_reward(&reward(99, 1, 1)), RewardFold::OutsideTenure);
        assert_eq!(timeline.get(1).unwrap().status_at(500), WorkerStatus::Left);
    }

    #[test]
    fn test_still_active_worker() {
        let timeline = WorkerTimeline::from_events(group(), 1_000, vec![hired(200, 3, 30, false)]);
        let worker = timeline.get(3).unwrap();
        assert_eq!(worker.left_at, None);
        assert_eq!(worker.status_at(999), WorkerStatus::Active);
        assert_eq!(worker.active_blocks(BlockRange::new(0, 1_000)), 800);
        assert_eq!(worker.active_blocks(BlockRange::new(500, 1_000)), 500);
    }

    #[test]
    fn test_unknown_worker_and_duplicates() {
        let mut timeline = WorkerTimeline::from_events(
            group(),
            1_000,
            vec![
                hired(100, 1, 10, false),
                hired(150, 1, 11, false),
                event(200, 9, WorkerEventKind::Terminated),
            ],
        );
        assert_eq!(timeline.get(1).unwrap().member_id, 10);
        assert_eq!(timeline.fold_reward(&reward(300, 9, 5)), RewardFold::UnknownWorker);
        assert_eq!(timeline.unfolded.unknown_worker.len(), 1);
    }

    #[test]
    fn test_slash_outside_tenure_ignored() {
        let timeline = WorkerTimeline::from_events(
            group(),
            1_000,
            vec![
                hired(100, 1, 10, false),
                event(200, 1, WorkerEventKind::Slashed { amount: 7 }),
                event(300, 1, WorkerEventKind::Terminated),
                event(400, 1, WorkerEventKind::Slashed { amount: 50 }),
            ],
        );
        assert_eq!(timeline.get(1).unwrap().slashed, 7);
    }

    #[test]
    fn test_events_past_end_ignored() {
        let timeline = WorkerTimeline::from_events(
            group(),
            500,
            vec![hired(100, 1, 10, false), event(500, 1, WorkerEventKind::Exited)],
        );
        assert_eq!(timeline.get(1).unwrap().left_at, None);
    }

    #[test]
    fn test_lead_interval() {
        let timeline = WorkerTimeline::from_events(
            group(),
            1_000,
            vec![
                hired(100, 1, 10, true),
                event(400, 1, WorkerEventKind::LeaderUnset),
                hired(400, 2, 20, true),
            ],
        );
        assert_eq!(timeline.lead_at(300).map(|w| w.worker_id), Some(1));
        assert_eq!(timeline.lead_at(400).map(|w| w.worker_id), Some(2));
        assert_eq!(timeline.get(1).unwrap().lead_interval(), Some((100, Some(400))));
    }

    #[test]
    fn test_hired_and_left_in_range() {
        let timeline = WorkerTimeline::from_events(
            group(),
            1_000,
            vec![
                hired(50, 1, 10, false),
                hired(250, 2, 20, false),
                event(300, 1, WorkerEventKind::Terminated),
            ],
        );
        let range = BlockRange::new(200, 400);
        let hired: Vec<WorkerId> = timeline.hired_in(range).map(|w| w.worker_id).collect();
        let left: Vec<WorkerId> = timeline.left_in(range).map(|w| w.worker_id).collect();
        assert_eq!(hired, vec![2]);
        assert_eq!(left, vec![1]);
        assert_eq!(timeline.member_active_at(20, 260).map(|w| w.worker_id), Some(2));
        assert!(timeline.member_active_at(10, 300).is_none());
    }
}
