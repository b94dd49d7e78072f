//! # Opportunity Scoring
//!
//! Scores how often worker and lead roles change hands, over a window cut
//! into equal scoring terms.
//!
//! Terms are anchored at the window end and laid out backwards; a partial
//! term left over at the window start is dropped.
//!
//! ## Worker score (per group)
//!
//! 1. Take every worker active in the most recent term, except leads.
//! 2. Count the terms each member has held a role in the group.
//! 3. Sort ascending and pick `rank = ceil(percentile * count / 100)`,
//!    clamped to `[1, count]`.
//! 4. `score = min(1, 1 / terms_held[rank - 1])`.
//!
//! A group with no eligible worker has no score.
//!
//! ## Lead score
//!
//! `1 / terms` of the current lead with the shortest tenure across groups.

use crate::workers::{WorkerRecord, WorkerTimeline};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tally_core::{Balance, BlockNumber, BlockRange, GroupId, MemberId, Result, TallyError, WorkerId};
use tracing::debug;

/// One fixed-length slice `[start, end)` of the scoring window
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringTerm {
    /// 0 is the oldest term
    pub index: u32,
    pub start: BlockNumber,
    pub end: BlockNumber,
}

impl ScoringTerm {
    pub fn overlaps(&self, start: BlockNumber, end: Option<BlockNumber>) -> bool {
        BlockRange::new(self.start, self.end).overlaps(start, end.unwrap_or(BlockNumber::MAX))
    }
}

/// Cut `range` into terms of `term_length` blocks, newest last
pub fn plan_terms(range: BlockRange, term_length: BlockNumber) -> Result<Vec<ScoringTerm>> {
    if term_length == 0 {
        return Err(TallyError::InvalidParameter("term length must be positive".into()));
    }
    let count = range.len() / term_length;
    if count == 0 {
        return Err(TallyError::InconsistentRange(format!(
            "range {} is shorter than one term of {} blocks",
            range, term_length
        )));
    }
    Ok((0..count)
        .map(|index| {
            let start = range.end - (count - index) * term_length;
            ScoringTerm {
                index,
                start,
                end: start + term_length,
            }
        })
        .collect())
}

/// Reject percentiles outside `1..=100`
pub fn validate_percentile(percentile: u8) -> Result<()> {
    if percentile == 0 || percentile > 100 {
        return Err(TallyError::InvalidParameter(format!(
            "target percentile {} outside 1..=100",
            percentile
        )));
    }
    Ok(())
}

/// A worker considered for the group score
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedWorker {
    pub member_id: MemberId,
    pub worker_id: WorkerId,
    pub terms_held: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupScore {
    pub group: GroupId,

    pub percentile: u8,

    /// Sorted by terms held, most junior first
    pub workers: Vec<RankedWorker>,

    /// 1-based rank used, `None` without eligible workers
    pub rank: Option<usize>,

    pub score: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Tenure of a group's current lead
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadTenure {
    pub group: GroupId,
    pub worker_id: WorkerId,
    pub member_id: MemberId,
    pub terms_in_role: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeadScore {
    /// Current leads, shortest tenure first
    pub leads: Vec<LeadTenure>,

    pub score: Option<f64>,
}

/// Worker movement in one group during one term
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermActivity {
    pub term: u32,
    pub group: GroupId,
    pub workers_at_start: Vec<WorkerId>,
    pub workers_at_end: Vec<WorkerId>,
    pub hired: Vec<WorkerId>,
    pub left: Vec<WorkerId>,
    pub reward_paid: Balance,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpportunityScores {
    pub terms: Vec<ScoringTerm>,
    pub groups: Vec<GroupScore>,
    pub lead: LeadScore,
    pub activity: Vec<TermActivity>,
}

fn worker_ids<'w>(workers: impl Iterator<Item = &'w WorkerRecord>) -> Vec<WorkerId> {
    workers.map(|w| w.worker_id).collect()
}

/// Scores worker timelines against a fixed term plan
pub struct OpportunityScorer {
    terms: Vec<ScoringTerm>,
}

impl OpportunityScorer {
    pub fn new(range: BlockRange, term_length: BlockNumber) -> Result<Self> {
        Ok(Self {
            terms: plan_terms(range, term_length)?,
        })
    }

    pub fn terms(&self) -> &[ScoringTerm] {
        &self.terms
    }

    fn latest(&self) -> ScoringTerm {
        // plan_terms never returns an empty plan
        self.terms[self.terms.len() - 1]
    }

    fn terms_overlapped(&self, start: BlockNumber, end: Option<BlockNumber>) -> u32 {
        self.terms.iter().filter(|t| t.overlaps(start, end)).count() as u32
    }

    /// Terms in which `member_id` held any role in the group
    fn terms_held(&self, timeline: &WorkerTimeline, member_id: MemberId) -> u32 {
        self.terms
            .iter()
            .filter(|term| {
                timeline
                    .workers()
                    .filter(|w| w.member_id == member_id)
                    .any(|w| term.overlaps(w.hired_at, w.left_at))
            })
            .count() as u32
    }

    pub fn score_group(&self, timeline: &WorkerTimeline, percentile: u8) -> Result<GroupScore> {
        validate_percentile(percentile)?;
        let latest = self.latest();

        // only the lead at the end of the window is scored separately
        let mut by_member: BTreeMap<MemberId, RankedWorker> = BTreeMap::new();
        for worker in timeline
            .overlapping(latest.start, latest.end)
            .filter(|w| !w.is_lead_at(latest.end - 1))
        {
            by_member.entry(worker.member_id).or_insert_with(|| RankedWorker {
                member_id: worker.member_id,
                worker_id: worker.worker_id,
                terms_held: self.terms_held(timeline, worker.member_id),
            });
        }
        let mut workers: Vec<RankedWorker> = by_member.into_values().collect();
        workers.sort_by_key(|w| (w.terms_held, w.member_id));

        if workers.is_empty() {
            debug!("{}: no eligible workers in term {}", timeline.group, latest.index);
            return Ok(GroupScore {
                group: timeline.group.clone(),
                percentile,
                workers,
                rank: None,
                score: None,
                note: Some("no eligible workers in the latest term".into()),
            });
        }

        let count = workers.len();
        let rank = ((percentile as usize * count + 99) / 100).clamp(1, count);
        let terms_held = workers[rank - 1].terms_held.max(1);
        let score = (1.0 / terms_held as f64).clamp(0.0, 1.0);
        debug!(
            "{}: {} eligible workers, rank {}, score {:.4}",
            timeline.group, count, rank, score
        );

        Ok(GroupScore {
            group: timeline.group.clone(),
            percentile,
            workers,
            rank: Some(rank),
            score: Some(score),
            note: None,
        })
    }

    pub fn score_leads(&self, timelines: &[&WorkerTimeline]) -> LeadScore {
        let latest = self.latest();
        let mut leads: Vec<LeadTenure> = timelines
            .iter()
            .filter_map(|timeline| {
                let lead = timeline.lead_at(latest.end - 1)?;
                let (start, end) = lead.lead_interval()?;
                Some(LeadTenure {
                    group: timeline.group.clone(),
                    worker_id: lead.worker_id,
                    member_id: lead.member_id,
                    terms_in_role: self.terms_overlapped(start, end),
                })
            })
            .collect();
        leads.sort_by(|a, b| {
            a.terms_in_role
                .cmp(&b.terms_in_role)
                .then_with(|| a.group.cmp(&b.group))
        });

        let score = leads
            .first()
            .map(|lead| (1.0 / lead.terms_in_role.max(1) as f64).clamp(0.0, 1.0));
        LeadScore { leads, score }
    }

    pub fn activity(&self, timeline: &WorkerTimeline) -> Vec<TermActivity> {
        self.terms
            .iter()
            .map(|term| {
                let range = BlockRange::new(term.start, term.end);
                TermActivity {
                    term: term.index,
                    group: timeline.group.clone(),
                    workers_at_start: worker_ids(timeline.active_at(term.start)),
                    workers_at_end: worker_ids(timeline.active_at(term.end - 1)),
                    hired: worker_ids(timeline.hired_in(range)),
                    left: worker_ids(timeline.left_in(range)),
                    reward_paid: timeline
                        .workers()
                        .map(|w| w.reward_in(term.start, term.end))
                        .sum(),
                }
            })
            .collect()
    }

    /// Score every timeline with its own percentile
    pub fn score(
        &self,
        timelines: &[&WorkerTimeline],
        percentile_for: impl Fn(&GroupId) -> u8,
    ) -> Result<OpportunityScores> {
        let groups = timelines
            .iter()
            .map(|t| self.score_group(t, percentile_for(&t.group)))
            .collect::<Result<Vec<_>>>()?;
        let activity = timelines.iter().flat_map(|t| self.activity(t)).collect();

        Ok(OpportunityScores {
            terms: self.terms.clone(),
            groups,
            lead: self.score_leads(timelines),
            activity,
        })
    }
}
