//! # Report Driver
//!
//! Composes every component into one reconciliation report over a block
//! range. A report is a pure function of the range and the chain it reads.
//!
//! Caller input is validated up front and rejected as a whole. After that,
//! each era, each group and each event query is an isolated unit of work:
//! a failing unit is listed in `Report::failures` and everything else is
//! still computed.

use crate::budget::{
    BudgetLedger, BudgetStatus, LedgerTotals, Recipient, Refill, RefillSource, SpendCategory,
    SpendItem,
};
use crate::earners::{
    bounty_accounts, bounty_earners, nominator_earners, proposal_accounts, proposal_earners,
    staking_accounts, validator_earners, EarnerClassifier, EarnerContext, EarnersByContext,
};
use crate::era::{EraRangeSummary, EraRewardReconstructor, EraSnapshot};
use crate::opportunity::{validate_percentile, OpportunityScorer, OpportunityScores};
use crate::workers::{WorkerRecord, WorkerStatus, WorkerTimeline};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tally_chain::{
    BountyJudgmentEvent, BudgetRefillEvent, BudgetUpdatedEvent, ChainSnapshotReader,
    CouncilorReward, EventRangeReader, MemberDirectory, MemberInvitedEvent, ProposalDetails,
    ProposalExecutedEvent, RewardPaidEvent,
};
use tally_core::{
    AccountId, Balance, BlockHash, BlockNumber, BlockRange, EraIndex, GroupId, MemberId, Result,
    SignedBalance, TallyError, WorkerId,
};
use tracing::{debug, info, warn};

/// Scoring window parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringParams {
    pub term_length: BlockNumber,

    /// Percentile used for groups without an override
    pub default_percentile: u8,

    pub percentiles: BTreeMap<GroupId, u8>,
}

impl ScoringParams {
    pub fn percentile_for(&self, group: &GroupId) -> u8 {
        self.percentiles
            .get(group)
            .copied()
            .unwrap_or(self.default_percentile)
    }
}

/// What to reconcile
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub range: BlockRange,

    /// Working groups to track
    pub groups: Vec<GroupId>,

    pub include_council: bool,

    pub include_validators: bool,

    /// Group whose budget pays for invited memberships
    pub membership_group: Option<GroupId>,

    /// Group whose workers curate bounties; `None` counts every member-created bounty
    pub bounty_curator_group: Option<GroupId>,

    pub scoring: Option<ScoringParams>,

    /// Units of work in flight at once
    pub concurrency: usize,

    /// Allowed reward drift per era
    pub tolerance_per_era: Balance,
}

impl ReportRequest {
    pub fn new(range: BlockRange) -> Self {
        Self {
            range,
            groups: Vec::new(),
            include_council: true,
            include_validators: true,
            membership_group: None,
            bounty_curator_group: None,
            scoring: None,
            concurrency: 4,
            tolerance_per_era: 1,
        }
    }

    /// Reject the request before any read is made
    pub fn validate(&self) -> Result<()> {
        if self.range.is_empty() {
            return Err(TallyError::InconsistentRange(format!(
                "start block {} is not before end block {}",
                self.range.start, self.range.end
            )));
        }
        if self.concurrency == 0 {
            return Err(TallyError::InvalidParameter(
                "concurrency must be at least 1".into(),
            ));
        }
        if let Some(scoring) = &self.scoring {
            validate_percentile(scoring.default_percentile)?;
            for percentile in scoring.percentiles.values() {
                validate_percentile(*percentile)?;
            }
        }
        Ok(())
    }

    /// Every group with a ledger entry, in request order without duplicates
    pub fn tracked_groups(&self) -> Vec<GroupId> {
        let mut groups: Vec<GroupId> = Vec::new();
        let extra = [self.membership_group.clone(), self.bounty_curator_group.clone()];
        let council = self.include_council.then(GroupId::council);
        for group in self
            .groups
            .iter()
            .cloned()
            .chain(extra.into_iter().flatten())
            .chain(council)
        {
            if !groups.contains(&group) {
                groups.push(group);
            }
        }
        groups
    }
}

/// A unit of work that can fail on its own
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Era(EraIndex),
    Group(GroupId),
    /// A range-wide query, by name
    Query(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub unit: Unit,
    pub code: u32,
    pub retryable: bool,
    pub message: String,
}

impl UnitFailure {
    pub fn new(unit: Unit, error: &TallyError) -> Self {
        Self {
            unit,
            code: error.code(),
            retryable: error.is_retryable(),
            message: error.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Finding attached to a report
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Diagnostic {
    /// Reconstructed rewards differ from on-chain payouts; `era` is `None` for the whole range
    ReconciliationMismatch {
        era: Option<EraIndex>,
        actual: Balance,
        calculated: Balance,
        drift: SignedBalance,
        tolerance: Balance,
    },
    /// Budget drained without a matching spend line; `group` is `None` for the aggregate
    UnattributedSpending {
        group: Option<GroupId>,
        amount: SignedBalance,
    },
    ClassificationAmbiguity {
        account: AccountId,
        members: Vec<MemberId>,
    },
    /// Events targeting a group the ledger does not track
    UntrackedGroup { group: GroupId, events: usize },
    /// Reward payments not attributed to any tenure
    UnfoldedRewards {
        group: GroupId,
        outside_tenure: usize,
        unknown_worker: usize,
    },
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Self::ClassificationAmbiguity { .. } => Severity::Error,
            Self::ReconciliationMismatch { .. } | Self::UnattributedSpending { .. } => {
                Severity::Warning
            }
            Self::UntrackedGroup { .. } | Self::UnfoldedRewards { .. } => Severity::Info,
        }
    }
}

/// A councilor's rewards for the term
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouncilorRow {
    pub member_id: MemberId,
    pub handle: Option<String>,
    pub reward_account: AccountId,
    pub paid: Balance,
    pub unpaid: Balance,
}

/// A worker as seen from the report range
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRow {
    pub worker: WorkerRecord,
    /// Tenure clipped to the range
    pub active_blocks: BlockNumber,
    /// Status at the range end
    pub status: WorkerStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupWorkers {
    pub group: GroupId,
    pub hired_in_range: Vec<WorkerId>,
    pub left_in_range: Vec<WorkerId>,
    /// Workers whose tenure overlaps the range
    pub workers: Vec<WorkerRow>,
}

impl GroupWorkers {
    fn from_timeline(timeline: &WorkerTimeline, range: BlockRange) -> Self {
        Self {
            group: timeline.group.clone(),
            hired_in_range: timeline.hired_in(range).map(|w| w.worker_id).collect(),
            left_in_range: timeline.left_in(range).map(|w| w.worker_id).collect(),
            workers: timeline
                .overlapping(range.start, range.end)
                .map(|w| WorkerRow {
                    worker: w.clone(),
                    active_blocks: w.active_blocks(range),
                    status: w.status_at(range.end),
                })
                .collect(),
        }
    }
}

/// Everything that could be computed for a range
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Report {
    pub range: BlockRange,

    pub start_hash: BlockHash,

    pub end_hash: BlockHash,

    pub eras: Option<EraRangeSummary>,

    pub budgets: BudgetLedger,

    pub totals: LedgerTotals,

    pub councilors: Vec<CouncilorRow>,

    pub workers: Vec<GroupWorkers>,

    pub earners: Vec<EarnersByContext>,

    pub opportunity: Option<OpportunityScores>,

    pub diagnostics: Vec<Diagnostic>,

    pub failures: Vec<UnitFailure>,
}

impl Report {
    fn new(range: BlockRange, start_hash: BlockHash, end_hash: BlockHash) -> Self {
        Self {
            range,
            start_hash,
            end_hash,
            eras: None,
            budgets: BudgetLedger::new(),
            totals: LedgerTotals::default(),
            councilors: Vec::new(),
            workers: Vec::new(),
            earners: Vec::new(),
            opportunity: None,
            diagnostics: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// True if no unit failed
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_eras(&self) -> Vec<EraIndex> {
        self.failures
            .iter()
            .filter_map(|f| match f.unit {
                Unit::Era(era) => Some(era),
                _ => None,
            })
            .collect()
    }

    pub fn failed_groups(&self) -> Vec<GroupId> {
        self.failures
            .iter()
            .filter_map(|f| match &f.unit {
                Unit::Group(group) => Some(group.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn earners_for(&self, context: EarnerContext) -> Option<&EarnersByContext> {
        self.earners.iter().find(|e| e.context == context)
    }

    /// Keep the value of a successful query, or record the failure and use the default
    fn absorb<T: Default>(&mut self, unit: Unit, result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => {
                warn!("{:?} failed: {}", unit, err);
                self.failures.push(UnitFailure::new(unit, &err));
                T::default()
            }
        }
    }
}

/// Range-wide event queries
#[derive(Default)]
struct RangeEvents {
    refills: Vec<BudgetRefillEvent>,
    updates: Vec<BudgetUpdatedEvent>,
    rewards: Vec<RewardPaidEvent>,
    proposals: Vec<ProposalExecutedEvent>,
    bounties: Vec<BountyJudgmentEvent>,
    invites: Vec<MemberInvitedEvent>,
    councilors: Vec<CouncilorReward>,
}

struct GroupUnit {
    status: BudgetStatus,
    timeline: Option<WorkerTimeline>,
}

/// Counts ledger bookings aimed at untracked groups
#[derive(Default)]
struct Bookkeeper {
    untracked: BTreeMap<GroupId, usize>,
}

impl Bookkeeper {
    fn book(&mut self, result: Result<()>) -> Result<()> {
        match result {
            Err(TallyError::UnknownGroup(group)) => {
                *self.untracked.entry(group).or_insert(0) += 1;
                Ok(())
            }
            other => other,
        }
    }
}

/// Runs reconciliation reports against a set of chain readers
pub struct ReportDriver<'a> {
    chain: &'a dyn ChainSnapshotReader,
    events: &'a dyn EventRangeReader,
    members: &'a dyn MemberDirectory,
}

impl<'a> ReportDriver<'a> {
    pub fn new(
        chain: &'a dyn ChainSnapshotReader,
        events: &'a dyn EventRangeReader,
        members: &'a dyn MemberDirectory,
    ) -> Self {
        Self {
            chain,
            events,
            members,
        }
    }

    /// Use one backend for every reader
    pub fn from_backend<B>(backend: &'a B) -> Self
    where
        B: ChainSnapshotReader + EventRangeReader + MemberDirectory,
    {
        Self::new(backend, backend, backend)
    }

    pub async fn run(&self, request: &ReportRequest) -> Result<Report> {
        request.validate()?;
        let range = request.range;
        let scorer = match &request.scoring {
            Some(params) => Some(OpportunityScorer::new(range, params.term_length)?),
            None => None,
        };
        info!("Reconciling blocks {}", range);

        let start_hash = self.chain.block_hash(range.start).await?;
        let end_hash = self.chain.block_hash(range.end).await?;

        let era_summary = if request.include_validators {
            let first = self.chain.active_era(start_hash).await?;
            let last = self.chain.active_era(end_hash).await?;
            Some(EraRangeSummary::new(first, last)?)
        } else {
            None
        };

        let mut report = Report::new(range, start_hash, end_hash);

        // Groups: budgets and worker timelines
        let units: Vec<(GroupId, Result<GroupUnit>)> = stream::iter(request.tracked_groups())
            .map(|group| async move {
                let unit = self.group_unit(&group, start_hash, end_hash, range.end).await;
                (group, unit)
            })
            .buffered(request.concurrency)
            .collect()
            .await;

        let mut ledger = BudgetLedger::new();
        let mut timelines: BTreeMap<GroupId, WorkerTimeline> = BTreeMap::new();
        for (group, unit) in units {
            match unit {
                Ok(unit) => {
                    ledger.insert(unit.status);
                    if let Some(timeline) = unit.timeline {
                        timelines.insert(group, timeline);
                    }
                }
                Err(err) => {
                    warn!("Group {} failed: {}", group, err);
                    report.failures.push(UnitFailure::new(Unit::Group(group), &err));
                }
            }
        }
        info!(
            "Loaded {} of {} groups",
            ledger.groups().count(),
            request.tracked_groups().len()
        );

        let events = self.range_events(range, &mut report).await;

        // Ledger
        let mut keeper = Bookkeeper::default();
        book_budget_moves(&events, &mut ledger, &mut keeper)?;
        for timeline in timelines.values_mut() {
            timeline.fold_rewards(events.rewards.iter());
        }
        book_worker_rewards(&events.rewards, &timelines, &mut ledger, &mut keeper)?;
        report.councilors = book_councilors(&events.councilors, &mut ledger, &mut keeper)?;
        if let Some(group) = &request.membership_group {
            if !events.invites.is_empty() && ledger.contains(group) {
                let price = self.chain.membership_price(end_hash).await;
                let price = report.absorb(Unit::Query("membership_price".into()), price);
                book_invites(&events.invites, group, price, &mut ledger, &mut keeper)?;
            }
        }
        book_council_payouts(&events.proposals, &events.bounties, &mut ledger, &mut keeper)?;

        // Eras
        if let Some(mut summary) = era_summary {
            self.reconstruct_eras(&mut summary, end_hash, request, &mut report)
                .await;
            report.eras = Some(summary);
        }

        // Earners
        let mut accounts = proposal_accounts(&events.proposals);
        accounts.extend(bounty_accounts(&events.bounties));
        if let Some(summary) = &report.eras {
            accounts.extend(staking_accounts(summary));
        }
        let classifier = EarnerClassifier::resolve(self.members, &accounts).await;
        let classifier = report.absorb(Unit::Query("members".into()), classifier);
        for ambiguity in classifier.ambiguities() {
            report.diagnostics.push(Diagnostic::ClassificationAmbiguity {
                account: ambiguity.account.clone(),
                members: ambiguity.members.clone(),
            });
        }

        let mut earners = vec![proposal_earners(&events.proposals, &classifier)?];
        match &request.bounty_curator_group {
            Some(curator) => match timelines.get(curator) {
                Some(timeline) => {
                    earners.push(bounty_earners(&events.bounties, Some(timeline), &classifier)?)
                }
                None => warn!("Curator group {} unavailable, skipping bounty earners", curator),
            },
            None => earners.push(bounty_earners(&events.bounties, None, &classifier)?),
        }
        if let Some(summary) = &report.eras {
            earners.push(validator_earners(summary, &classifier)?);
            earners.push(nominator_earners(summary, &classifier)?);
        }
        report.earners = earners;

        // Workers and scores
        for timeline in timelines.values() {
            let unfolded = &timeline.unfolded;
            if !unfolded.outside_tenure.is_empty() || !unfolded.unknown_worker.is_empty() {
                report.diagnostics.push(Diagnostic::UnfoldedRewards {
                    group: timeline.group.clone(),
                    outside_tenure: unfolded.outside_tenure.len(),
                    unknown_worker: unfolded.unknown_worker.len(),
                });
            }
            report
                .workers
                .push(GroupWorkers::from_timeline(timeline, range));
        }
        if let (Some(scorer), Some(params)) = (&scorer, &request.scoring) {
            let scored: Vec<&WorkerTimeline> = timelines.values().collect();
            report.opportunity = Some(scorer.score(&scored, |g| params.percentile_for(g))?);
        }

        // Budget diagnostics
        for (group, events) in keeper.untracked {
            debug!("{} events for untracked group {}", events, group);
            report
                .diagnostics
                .push(Diagnostic::UntrackedGroup { group, events });
        }
        for status in ledger.groups() {
            if let Some(amount) = status.untracked().filter(|a| *a != 0) {
                report.diagnostics.push(Diagnostic::UnattributedSpending {
                    group: Some(status.group.clone()),
                    amount,
                });
            }
        }
        report.totals = ledger.totals()?;
        if report.totals.unattributed != 0 {
            warn!(
                "Unattributed spending of {} across tracked groups",
                report.totals.unattributed
            );
            report.diagnostics.push(Diagnostic::UnattributedSpending {
                group: None,
                amount: report.totals.unattributed,
            });
        }
        report.budgets = ledger;

        info!(
            "Report for {} done: {} diagnostics, {} failed units",
            range,
            report.diagnostics.len(),
            report.failures.len()
        );
        Ok(report)
    }

    async fn group_unit(
        &self,
        group: &GroupId,
        start_hash: BlockHash,
        end_hash: BlockHash,
        end: BlockNumber,
    ) -> Result<GroupUnit> {
        let status = BudgetStatus::read(self.chain, group, start_hash, end_hash).await?;
        let timeline = if group.is_council() {
            None
        } else {
            let events = self
                .events
                .worker_events(group, BlockRange::new(0, end))
                .await?;
            debug!("{}: {} worker events", group, events.len());
            Some(WorkerTimeline::from_events(group.clone(), end, events))
        };
        Ok(GroupUnit { status, timeline })
    }

    async fn range_events(&self, range: BlockRange, report: &mut Report) -> RangeEvents {
        let (refills, updates, rewards, proposals, bounties, invites, councilors) = futures::join!(
            self.events.budget_refills(range),
            self.events.budget_updates(range),
            self.events.rewards_paid(range),
            self.events.proposals_executed(range),
            self.events.bounty_judgments(range),
            self.events.members_invited(range),
            self.events.councilors_at(range.end),
        );
        RangeEvents {
            refills: report.absorb(Unit::Query("budget_refills".into()), refills),
            updates: report.absorb(Unit::Query("budget_updates".into()), updates),
            rewards: report.absorb(Unit::Query("rewards_paid".into()), rewards),
            proposals: report.absorb(Unit::Query("proposals_executed".into()), proposals),
            bounties: report.absorb(Unit::Query("bounty_judgments".into()), bounties),
            invites: report.absorb(Unit::Query("members_invited".into()), invites),
            councilors: report.absorb(Unit::Query("councilors".into()), councilors),
        }
    }

    async fn reconstruct_eras(
        &self,
        summary: &mut EraRangeSummary,
        at: BlockHash,
        request: &ReportRequest,
        report: &mut Report,
    ) {
        let reconstructor = EraRewardReconstructor::new(self.chain);
        let reconstructor = &reconstructor;
        let results: Vec<(EraIndex, Result<EraSnapshot>)> =
            stream::iter(summary.first_era..summary.last_era)
                .map(|era| async move { (era, reconstructor.reconstruct(era, at).await) })
                .buffered(request.concurrency)
                .collect()
                .await;

        let tolerance = request.tolerance_per_era;
        for (era, result) in results {
            let snapshot = match result {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!("Era {} failed: {}", era, err);
                    report.failures.push(UnitFailure::new(Unit::Era(era), &err));
                    continue;
                }
            };
            if let Some(drift) = snapshot.drift() {
                if drift.unsigned_abs() > tolerance {
                    warn!("Era {} drifts by {} from its payout", era, drift);
                    report.diagnostics.push(Diagnostic::ReconciliationMismatch {
                        era: Some(era),
                        actual: snapshot.total_reward,
                        calculated: snapshot.calculated_reward,
                        drift,
                        tolerance,
                    });
                }
            }
            if let Err(err) = summary.accumulate(snapshot) {
                report.failures.push(UnitFailure::new(Unit::Era(era), &err));
            }
        }

        if !summary.is_reconciled(tolerance) {
            report.diagnostics.push(Diagnostic::ReconciliationMismatch {
                era: None,
                actual: summary.actual_reward_sum,
                calculated: summary.calculated_reward_sum,
                drift: summary.drift().unwrap_or(SignedBalance::MAX),
                tolerance: summary.tolerance(tolerance),
            });
        }
        info!(
            "Reconstructed {} of {} eras",
            summary.eras.len(),
            summary.last_era - summary.first_era
        );
    }
}

/// External council refills and council-decided group budget changes
fn book_budget_moves(
    events: &RangeEvents,
    ledger: &mut BudgetLedger,
    keeper: &mut Bookkeeper,
) -> Result<()> {
    let council = GroupId::council();
    for refill in &events.refills {
        keeper.book(ledger.record_refill(
            &council,
            Refill {
                at: refill.at,
                amount: refill.amount,
                source: RefillSource::External,
            },
        ))?;
    }
    for update in &events.updates {
        let amount = update.change.unsigned_abs();
        if amount == 0 {
            continue;
        }
        let (from, to) = if update.change > 0 {
            (&council, &update.group)
        } else {
            (&update.group, &council)
        };
        keeper.book(ledger.record_transfer(from, to, amount, update.at))?;
    }
    Ok(())
}

/// Every recurring reward leaves its group's budget, attributed to a tenure or not
fn book_worker_rewards(
    rewards: &[RewardPaidEvent],
    timelines: &BTreeMap<GroupId, WorkerTimeline>,
    ledger: &mut BudgetLedger,
    keeper: &mut Bookkeeper,
) -> Result<()> {
    for reward in rewards {
        let worker = timelines
            .get(&reward.group)
            .and_then(|t| t.get(reward.worker_id));
        let note = match worker {
            Some(w) if !w.is_active_at(reward.at.block) => Some("paid outside tenure".to_string()),
            Some(_) => None,
            None => Some("worker unknown".to_string()),
        };
        keeper.book(ledger.record_spend(
            &reward.group,
            SpendItem {
                at: Some(reward.at),
                category: SpendCategory::WorkerReward,
                recipient: Recipient::Worker {
                    worker_id: reward.worker_id,
                    member_id: worker.map(|w| w.member_id),
                },
                amount: reward.amount,
                note,
            },
        ))?;
    }
    Ok(())
}

/// Paid councilor rewards are council spend; unpaid ones are only reported
fn book_councilors(
    councilors: &[CouncilorReward],
    ledger: &mut BudgetLedger,
    keeper: &mut Bookkeeper,
) -> Result<Vec<CouncilorRow>> {
    let council = GroupId::council();
    let mut rows = Vec::with_capacity(councilors.len());
    for councilor in councilors {
        keeper.book(ledger.record_spend(
            &council,
            SpendItem {
                at: None,
                category: SpendCategory::CouncilorReward,
                recipient: Recipient::Councilor {
                    member_id: councilor.member_id,
                },
                amount: councilor.accumulated_reward,
                note: (councilor.unpaid_reward > 0)
                    .then(|| format!("{} unpaid", councilor.unpaid_reward)),
            },
        ))?;
        rows.push(CouncilorRow {
            member_id: councilor.member_id,
            handle: councilor.handle.clone(),
            reward_account: councilor.reward_account.clone(),
            paid: councilor.accumulated_reward,
            unpaid: councilor.unpaid_reward,
        });
    }
    Ok(rows)
}

fn book_invites(
    invites: &[MemberInvitedEvent],
    group: &GroupId,
    price: Balance,
    ledger: &mut BudgetLedger,
    keeper: &mut Bookkeeper,
) -> Result<()> {
    for invite in invites {
        keeper.book(ledger.record_spend(
            group,
            SpendItem {
                at: Some(invite.at),
                category: SpendCategory::MembershipInvite,
                recipient: Recipient::Member {
                    member_id: invite.member_id,
                },
                amount: price,
                note: Some(format!("invited by member {}", invite.invited_by)),
            },
        ))?;
    }
    Ok(())
}

/// Funding requests and council-created bounties are paid from the council budget
fn book_council_payouts(
    proposals: &[ProposalExecutedEvent],
    bounties: &[BountyJudgmentEvent],
    ledger: &mut BudgetLedger,
    keeper: &mut Bookkeeper,
) -> Result<()> {
    let council = GroupId::council();
    for proposal in proposals {
        let destinations = match &proposal.details {
            ProposalDetails::FundingRequest { destinations } => destinations,
            ProposalDetails::Other { .. } => continue,
        };
        for destination in destinations {
            keeper.book(ledger.record_spend(
                &council,
                SpendItem {
                    at: Some(proposal.at),
                    category: SpendCategory::FundingRequest,
                    recipient: Recipient::Account(destination.account.clone()),
                    amount: destination.amount,
                    note: Some(format!("proposal {}", proposal.proposal_id)),
                },
            ))?;
        }
    }
    for bounty in bounties.iter().filter(|b| b.creator.is_none()) {
        for winner in bounty.winners.iter().filter(|w| w.reward > 0) {
            keeper.book(ledger.record_spend(
                &council,
                SpendItem {
                    at: Some(bounty.at),
                    category: SpendCategory::BountyPayout,
                    recipient: Recipient::Member {
                        member_id: winner.member_id,
                    },
                    amount: winner.reward,
                    note: Some(format!("bounty {}", bounty.bounty_id)),
                },
            ))?;
        }
    }
    Ok(())
}
