//! Indexed events returned for a block range
//!
//! Every event carries its block number and its index within that block,
//! which together give a total order over an event log.

use serde::{Deserialize, Serialize};
use tally_core::{
    AccountId, Balance, BlockNumber, BountyId, GroupId, MemberId, ProposalId, SignedBalance,
    WorkerId,
};

/// Position of an event in the chain
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventPosition {
    pub block: BlockNumber,
    #[serde(default)]
    pub index: u32,
}

impl EventPosition {
    pub fn new(block: BlockNumber, index: u32) -> Self {
        Self { block, index }
    }
}

/// Council budget refilled from the mint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetRefillEvent {
    pub at: EventPosition,
    pub amount: Balance,
}

/// Working group budget changed by a council decision
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetUpdatedEvent {
    pub at: EventPosition,
    pub group: GroupId,
    /// Negative when budget moved back to the council
    pub change: SignedBalance,
}

/// Recurring reward paid to a worker
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPaidEvent {
    pub at: EventPosition,
    pub group: GroupId,
    pub worker_id: WorkerId,
    pub reward_account: AccountId,
    pub amount: Balance,
}

/// Worker lifecycle transitions and penalties
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerEventKind {
    /// Opening filled; the worker starts
    Hired {
        member_id: MemberId,
        #[serde(default)]
        handle: Option<String>,
        reward_account: AccountId,
        #[serde(default)]
        is_lead: bool,
    },
    /// Stake slashed while in role
    Slashed { amount: Balance },
    /// Removed by the lead or the council
    Terminated,
    /// Left voluntarily
    Exited,
    /// Lead role unset by the council
    LeaderUnset,
}

/// One entry of a group's worker history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerEvent {
    pub at: EventPosition,
    pub group: GroupId,
    pub worker_id: WorkerId,
    pub kind: WorkerEventKind,
}

/// One payout destination of a funding request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingDestination {
    pub account: AccountId,
    pub amount: Balance,
}

/// Details of an executed proposal, only funding requests move money here
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalDetails {
    FundingRequest { destinations: Vec<FundingDestination> },
    Other { name: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalExecutedEvent {
    pub at: EventPosition,
    pub proposal_id: ProposalId,
    pub details: ProposalDetails,
}

/// Winning entry of a judged bounty
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BountyWinner {
    pub member_id: MemberId,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub account: Option<AccountId>,
    pub reward: Balance,
}

/// Oracle judgment submitted for a bounty
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BountyJudgmentEvent {
    pub at: EventPosition,
    pub bounty_id: BountyId,
    /// Creating member, `None` for council-created bounties
    #[serde(default)]
    pub creator: Option<MemberId>,
    pub created_in_block: BlockNumber,
    #[serde(default)]
    pub winners: Vec<BountyWinner>,
}

/// Membership bought through an invitation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInvitedEvent {
    pub at: EventPosition,
    pub member_id: MemberId,
    pub invited_by: MemberId,
}
