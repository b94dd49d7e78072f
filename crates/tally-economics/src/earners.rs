//! # Earner Classification
//!
//! One rule decides whether a payout recipient is a compensable member:
//! the address must equal a membership's root account or, failing that, its
//! controller account. Bounty, proposal and staking payouts all go through
//! the same `EarnerClassifier`.

use crate::era::EraRangeSummary;
use crate::workers::WorkerTimeline;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tally_chain::{
    BountyJudgmentEvent, MemberDirectory, MemberRecord, ProposalDetails, ProposalExecutedEvent,
};
use tally_core::{AccountId, Balance, MemberId, Result, SignedBalance, TallyError};
use tracing::{debug, error};

/// Money flow an earning came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EarnerContext {
    Proposal,
    Bounty,
    Validator,
    Nominator,
}

impl fmt::Display for EarnerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Proposal => "proposal",
            Self::Bounty => "bounty",
            Self::Validator => "validator",
            Self::Nominator => "nominator",
        };
        f.write_str(name)
    }
}

/// Which account list matched
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedBy {
    Root,
    Controller,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub member_id: MemberId,
    pub handle: Option<String>,
    pub matched_by: MatchedBy,
}

/// An address that maps to more than one member
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ambiguity {
    pub account: AccountId,
    pub members: Vec<MemberId>,
}

impl From<&Ambiguity> for TallyError {
    fn from(a: &Ambiguity) -> Self {
        TallyError::ClassificationAmbiguity {
            account: a.account.clone(),
            members: a.members.clone(),
        }
    }
}

/// Address to member lookup over a fixed membership snapshot
#[derive(Clone, Debug, Default)]
pub struct EarnerClassifier {
    members: BTreeMap<MemberId, MemberRecord>,
    by_root: BTreeMap<AccountId, BTreeSet<MemberId>>,
    by_controller: BTreeMap<AccountId, BTreeSet<MemberId>>,
    ambiguities: Vec<Ambiguity>,
}

impl EarnerClassifier {
    pub fn new(records: impl IntoIterator<Item = MemberRecord>) -> Self {
        let mut classifier = Self::default();
        for record in records {
            classifier
                .by_root
                .entry(record.root_account.clone())
                .or_default()
                .insert(record.id);
            classifier
                .by_controller
                .entry(record.controller_account.clone())
                .or_default()
                .insert(record.id);
            classifier.members.insert(record.id, record);
        }

        let mut accounts: BTreeMap<&AccountId, BTreeSet<MemberId>> = BTreeMap::new();
        for (account, ids) in classifier.by_root.iter().chain(classifier.by_controller.iter()) {
            accounts.entry(account).or_default().extend(ids.iter().copied());
        }
        let ambiguities: Vec<Ambiguity> = accounts
            .into_iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(account, ids)| Ambiguity {
                account: account.clone(),
                members: ids.into_iter().collect(),
            })
            .collect();
        for ambiguity in &ambiguities {
            error!(
                "Account {} resolves to members {:?}",
                ambiguity.account, ambiguity.members
            );
        }
        classifier.ambiguities = ambiguities;
        classifier
    }

    /// Resolve every account in `accounts` through the directory
    pub async fn resolve(directory: &dyn MemberDirectory, accounts: &[AccountId]) -> Result<Self> {
        let unique: BTreeSet<&AccountId> = accounts.iter().collect();
        let unique: Vec<AccountId> = unique.into_iter().cloned().collect();
        let records = directory.resolve_members_by_account(&unique).await?;
        debug!(
            "Resolved {} accounts to {} memberships",
            unique.len(),
            records.len()
        );
        Ok(Self::new(records))
    }

    /// Root accounts first, then controllers; lowest member id wins a tie
    pub fn classify(&self, account: &AccountId) -> Option<Classification> {
        let lookup = |map: &BTreeMap<AccountId, BTreeSet<MemberId>>, matched_by| {
            map.get(account)
                .and_then(|ids| ids.iter().next())
                .map(|id| Classification {
                    member_id: *id,
                    handle: self.members.get(id).and_then(|m| m.handle.clone()),
                    matched_by,
                })
        };
        lookup(&self.by_root, MatchedBy::Root)
            .or_else(|| lookup(&self.by_controller, MatchedBy::Controller))
    }

    /// Like `classify`, but an ambiguous address is an error
    pub fn classify_strict(&self, account: &AccountId) -> Result<Option<Classification>> {
        match self.ambiguities.iter().find(|a| &a.account == account) {
            Some(ambiguity) => Err(ambiguity.into()),
            None => Ok(self.classify(account)),
        }
    }

    pub fn ambiguities(&self) -> &[Ambiguity] {
        &self.ambiguities
    }

    pub fn member(&self, id: MemberId) -> Option<&MemberRecord> {
        self.members.get(&id)
    }
}

/// A single payout to an account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarnerRecord {
    pub account: AccountId,

    /// Negative for a net loss after slashing
    pub amount: SignedBalance,

    pub context: EarnerContext,

    pub member_id: Option<MemberId>,

    pub handle: Option<String>,

    pub note: String,
}

/// Earnings of one context, split by eligibility
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarnersByContext {
    pub context: EarnerContext,

    pub earnings: SignedBalance,

    pub eligible_earnings: SignedBalance,

    pub ineligible_earnings: SignedBalance,

    pub eligible: Vec<EarnerRecord>,

    pub ineligible: Vec<EarnerRecord>,
}

impl EarnersByContext {
    pub fn new(context: EarnerContext) -> Self {
        Self {
            context,
            earnings: 0,
            eligible_earnings: 0,
            ineligible_earnings: 0,
            eligible: Vec::new(),
            ineligible: Vec::new(),
        }
    }

    /// Route a record by whether it resolved to a member
    pub fn push(&mut self, record: EarnerRecord) -> Result<()> {
        let overflow = || TallyError::Overflow("earnings");
        self.earnings = self.earnings.checked_add(record.amount).ok_or_else(overflow)?;
        if record.member_id.is_some() {
            self.eligible_earnings = self
                .eligible_earnings
                .checked_add(record.amount)
                .ok_or_else(overflow)?;
            self.eligible.push(record);
        } else {
            self.ineligible_earnings = self
                .ineligible_earnings
                .checked_add(record.amount)
                .ok_or_else(overflow)?;
            self.ineligible.push(record);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.eligible.len() + self.ineligible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> impl Iterator<Item = &EarnerRecord> {
        self.eligible.iter().chain(self.ineligible.iter())
    }
}

fn signed(amount: Balance) -> Result<SignedBalance> {
    SignedBalance::try_from(amount).map_err(|_| TallyError::Overflow("earner amount"))
}

fn classified_record(
    classifier: &EarnerClassifier,
    account: &AccountId,
    amount: SignedBalance,
    context: EarnerContext,
    note: String,
) -> EarnerRecord {
    let classification = classifier.classify(account);
    EarnerRecord {
        account: account.clone(),
        amount,
        context,
        member_id: classification.as_ref().map(|c| c.member_id),
        handle: classification.and_then(|c| c.handle),
        note,
    }
}

/// Accounts paid by funding-request proposals
pub fn proposal_accounts(proposals: &[ProposalExecutedEvent]) -> Vec<AccountId> {
    proposals
        .iter()
        .flat_map(|p| match &p.details {
            ProposalDetails::FundingRequest { destinations } => {
                destinations.iter().map(|d| d.account.clone()).collect()
            }
            ProposalDetails::Other { .. } => Vec::new(),
        })
        .collect()
}

/// Every destination of an executed funding request
pub fn proposal_earners(
    proposals: &[ProposalExecutedEvent],
    classifier: &EarnerClassifier,
) -> Result<EarnersByContext> {
    let mut earners = EarnersByContext::new(EarnerContext::Proposal);
    for proposal in proposals {
        let destinations = match &proposal.details {
            ProposalDetails::FundingRequest { destinations } => destinations,
            ProposalDetails::Other { .. } => continue,
        };
        for destination in destinations {
            earners.push(classified_record(
                classifier,
                &destination.account,
                signed(destination.amount)?,
                EarnerContext::Proposal,
                format!(
                    "Awarded {} in proposal {}",
                    destination.amount, proposal.proposal_id
                ),
            ))?;
        }
    }
    Ok(earners)
}

/// Payout accounts of every bounty winner
pub fn bounty_accounts(judgments: &[BountyJudgmentEvent]) -> Vec<AccountId> {
    judgments
        .iter()
        .flat_map(|j| j.winners.iter().filter_map(|w| w.account.clone()))
        .collect()
}

/// Winners of bounties judged in the range
///
/// With a curator timeline, only bounties whose creator held a worker role
/// in that group at the judgment block count. Without one, every
/// member-created bounty counts. Winners are classified by payout account;
/// a winner without one is ineligible.
pub fn bounty_earners(
    judgments: &[BountyJudgmentEvent],
    curators: Option<&WorkerTimeline>,
    classifier: &EarnerClassifier,
) -> Result<EarnersByContext> {
    let mut earners = EarnersByContext::new(EarnerContext::Bounty);
    for judgment in judgments {
        let creator = match judgment.creator {
            Some(creator) => creator,
            None => continue,
        };
        let curator_note = match curators {
            Some(timeline) => match timeline.member_active_at(creator, judgment.at.block) {
                Some(worker) => format!(" with worker id {}", worker.worker_id),
                None => {
                    debug!(
                        "Bounty {} creator {} not a {} worker at {}",
                        judgment.bounty_id, creator, timeline.group, judgment.at.block
                    );
                    continue;
                }
            },
            None => String::new(),
        };

        for winner in judgment.winners.iter().filter(|w| w.reward > 0) {
            let note = format!(
                "Bounty {} created by member {}{} in block {}, paid in block {} to member {}",
                judgment.bounty_id,
                creator,
                curator_note,
                judgment.created_in_block,
                judgment.at.block,
                winner.member_id
            );
            let record = match &winner.account {
                Some(account) => classified_record(
                    classifier,
                    account,
                    signed(winner.reward)?,
                    EarnerContext::Bounty,
                    note,
                ),
                None => EarnerRecord {
                    account: AccountId::from("na"),
                    amount: signed(winner.reward)?,
                    context: EarnerContext::Bounty,
                    member_id: None,
                    handle: winner.handle.clone(),
                    note: format!("{}, no payout account", note),
                },
            };
            earners.push(record)?;
        }
    }
    Ok(earners)
}

/// Stash and controller accounts of every validator in the summary, plus nominators
pub fn staking_accounts(summary: &EraRangeSummary) -> Vec<AccountId> {
    summary
        .stashes
        .values()
        .flat_map(|s| std::iter::once(s.stash.clone()).chain(s.controller.clone()))
        .chain(summary.nominators.keys().cloned())
        .collect()
}

/// Net staking earnings per stash, classified stash first then controller
pub fn validator_earners(
    summary: &EraRangeSummary,
    classifier: &EarnerClassifier,
) -> Result<EarnersByContext> {
    let mut earners = EarnersByContext::new(EarnerContext::Validator);
    for stash in summary.stashes.values() {
        let net = stash.net().ok_or(TallyError::Overflow("validator net reward"))?;
        let classification = classifier.classify(&stash.stash).or_else(|| {
            stash
                .controller
                .as_ref()
                .and_then(|controller| classifier.classify(controller))
        });
        let controller = stash
            .controller
            .as_ref()
            .map_or_else(|| "unknown".to_string(), |c| c.to_string());
        earners.push(EarnerRecord {
            account: stash.stash.clone(),
            amount: net,
            context: EarnerContext::Validator,
            member_id: classification.as_ref().map(|c| c.member_id),
            handle: classification.and_then(|c| c.handle),
            note: format!(
                "Controller {}, {} eras, reward {}, slashed {}",
                controller, stash.eras, stash.reward, stash.slashed
            ),
        })?;
    }
    Ok(earners)
}

/// Net staking earnings per nominator
pub fn nominator_earners(
    summary: &EraRangeSummary,
    classifier: &EarnerClassifier,
) -> Result<EarnersByContext> {
    let mut earners = EarnersByContext::new(EarnerContext::Nominator);
    for (who, totals) in &summary.nominators {
        let net = tally_core::signed_sub(totals.reward, totals.slashed)
            .ok_or(TallyError::Overflow("nominator net reward"))?;
        earners.push(classified_record(
            classifier,
            who,
            net,
            EarnerContext::Nominator,
            format!("Reward {}, slashed {}", totals.reward, totals.slashed),
        ))?;
    }
    Ok(earners)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tally_chain::{
        BountyWinner, EventPosition, FundingDestination, WorkerEvent, WorkerEventKind,
    };
    use tally_core::GroupId;

    fn member(id: MemberId, root: &str, controller: &str) -> MemberRecord {
        MemberRecord {
            id,
            handle: Some(format!("handle{}", id)),
            root_account: AccountId::from(root),
            controller_account: AccountId::from(controller),
        }
    }

    #[test]
    fn test_root_before_controller() {
        let classifier = EarnerClassifier::new(vec![
            member(1, "5Shared", "5CtrlA"),
            member(2, "5RootB", "5Shared"),
        ]);
        let found = classifier.classify(&AccountId::from("5Shared")).unwrap();
        assert_eq!(found.member_id, 1);
        assert_eq!(found.matched_by, MatchedBy::Root);

        let by_controller = classifier.classify(&AccountId::from("5CtrlA")).unwrap();
        assert_eq!(by_controller.matched_by, MatchedBy::Controller);
        assert!(classifier.classify(&AccountId::from("5Nobody")).is_none());
    }

    #[test]
    fn test_ambiguity_detected() {
        let classifier = EarnerClassifier::new(vec![
            member(1, "5Shared", "5CtrlA"),
            member(2, "5RootB", "5Shared"),
        ]);
        assert_eq!(classifier.ambiguities().len(), 1);
        assert_eq!(classifier.ambiguities()[0].members, vec![1, 2]);
        assert!(matches!(
            classifier.classify_strict(&AccountId::from("5Shared")),
            Err(TallyError::ClassificationAmbiguity { .. })
        ));
    }

    #[test]
    fn test_distinct_members_never_ambiguous() {
        let classifier = EarnerClassifier::new(vec![
            member(1, "5RootA", "5RootA"),
            member(2, "5RootB", "5CtrlB"),
        ]);
        assert!(classifier.ambiguities().is_empty());
    }

    #[test]
    fn test_proposal_earners() {
        let classifier = EarnerClassifier::new(vec![member(4, "5Root4", "5Ctrl4")]);
        let proposals = vec![
            ProposalExecutedEvent {
                at: EventPosition::new(10, 0),
                proposal_id: 7,
                details: ProposalDetails::FundingRequest {
                    destinations: vec![
                        FundingDestination {
                            account: AccountId::from("5Ctrl4"),
                            amount: 100,
                        },
                        FundingDestination {
                            account: AccountId::from("5Stranger"),
                            amount: 30,
                        },
                    ],
                },
            },
            ProposalExecutedEvent {
                at: EventPosition::new(11, 0),
                proposal_id: 8,
                details: ProposalDetails::Other {
                    name: "SetMembershipPrice".into(),
                },
            },
        ];

        let earners = proposal_earners(&proposals, &classifier).unwrap();
        assert_eq!(earners.earnings, 130);
        assert_eq!(earners.eligible_earnings, 100);
        assert_eq!(earners.ineligible_earnings, 30);
        assert_eq!(earners.eligible[0].member_id, Some(4));
        assert_eq!(proposal_accounts(&proposals).len(), 2);
    }

    #[test]
    fn test_bounty_requires_active_curator() {
        let curators = WorkerTimeline::from_events(
            GroupId::from("operationsWorkingGroupBeta"),
            1_000,
            vec![
                WorkerEvent {
                    at: EventPosition::new(100, 0),
                    group: GroupId::from("operationsWorkingGroupBeta"),
                    worker_id: 5,
                    kind: WorkerEventKind::Hired {
                        member_id: 50,
                        handle: None,
                        reward_account: AccountId::from("5Curator"),
                        is_lead: false,
                    },
                },
                WorkerEvent {
                    at: EventPosition::new(400, 0),
                    group: GroupId::from("operationsWorkingGroupBeta"),
                    worker_id: 5,
                    kind: WorkerEventKind::Exited,
                },
            ],
        );
        let judgment = |block, bounty_id| BountyJudgmentEvent {
            at: EventPosition::new(block, 0),
            bounty_id,
            creator: Some(50),
            created_in_block: 90,
            winners: vec![
                BountyWinner {
                    member_id: 9,
                    handle: Some("winner".into()),
                    account: Some(AccountId::from("5Winner")),
                    reward: 60,
                },
                BountyWinner {
                    member_id: 10,
                    handle: None,
                    account: None,
                    reward: 0,
                },
            ],
        };
        let judgments = vec![judgment(300, 1), judgment(500, 2)];

        let classifier = EarnerClassifier::new(vec![member(9, "5Winner", "5WinnerCtrl")]);

        let earners = bounty_earners(&judgments, Some(&curators), &classifier).unwrap();
        assert_eq!(earners.len(), 1);
        assert_eq!(earners.eligible_earnings, 60);
        assert!(earners.eligible[0].note.contains("Bounty 1"));

        let unchecked = bounty_earners(&judgments, None, &classifier).unwrap();
        assert_eq!(unchecked.earnings, 120);
        assert_eq!(bounty_accounts(&judgments).len(), 2);
    }

    #[test]
    fn test_bounty_winner_classified_by_account() {
        let judgment = BountyJudgmentEvent {
            at: EventPosition::new(300, 0),
            bounty_id: 3,
            creator: Some(50),
            created_in_block: 90,
            winners: vec![
                BountyWinner {
                    member_id: 9,
                    handle: Some("winner".into()),
                    account: Some(AccountId::from("5Stranger")),
                    reward: 60,
                },
                BountyWinner {
                    member_id: 11,
                    handle: None,
                    account: None,
                    reward: 15,
                },
            ],
        };
        let classifier = EarnerClassifier::new(Vec::new());

        let earners = bounty_earners(&[judgment], None, &classifier).unwrap();
        assert_eq!(earners.eligible_earnings, 0);
        assert_eq!(earners.ineligible_earnings, 75);
        assert_eq!(earners.ineligible[0].member_id, None);
        assert_eq!(earners.ineligible[0].account, AccountId::from("5Stranger"));
        assert!(earners.ineligible[1].note.contains("no payout account"));
    }

    proptest! {
        #[test]
        fn proptest_eligible_plus_ineligible_is_total(
            amounts in proptest::collection::vec((0u64..1_000_000, any::<bool>()), 0..32)
        ) {
            let classifier = EarnerClassifier::new(vec![member(1, "5Member", "5MemberCtrl")]);
            let mut earners = EarnersByContext::new(EarnerContext::Proposal);
            for (amount, is_member) in &amounts {
                let account = if *is_member { "5Member" } else { "5Outsider" };
                earners.push(classified_record(
                    &classifier,
                    &AccountId::from(account),
                    *amount as SignedBalance,
                    EarnerContext::Proposal,
                    String::new(),
                )).unwrap();
            }
            prop_assert_eq!(
                earners.eligible_earnings + earners.ineligible_earnings,
                earners.earnings
            );
            prop_assert_eq!(earners.len(), amounts.len());
        }

        #[test]
        fn proptest_classification_is_pure(id in 0u64..100, seed in 0u8..4) {
            let classifier = EarnerClassifier::new(vec![member(id, "5R", "5C")]);
            let account = AccountId::from(["5R", "5C", "5X", "5Y"][seed as usize]);
            prop_assert_eq!(classifier.classify(&account), classifier.classify(&account));
        }
    }
}
