//! # Tally Economics - Treasury & Reward Reconciliation
//!
//! Reconstructs where the platform's money went over a block range and
//! checks it against what the chain recorded.
//!
//! ## Components
//!
//! - **Era rewards**: per-validator and per-nominator split of each era payout
//! - **Budget ledger**: start, refills, spends and end balance for every group
//! - **Worker timelines**: hire/exit tenures with rewards folded in
//! - **Earner classification**: earnings split into member and non-member
//! - **Opportunity scores**: how long the top workers of each group have served
//!
//! ## Report Flow
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌────────────────────┐
//! │ ReportRequest│──▶│  ReportDriver    │──▶│      Report        │
//! └──────────────┘   │  groups (fan-out)│   │  eras / budgets    │
//!                    │  events          │   │  workers / earners │
//!                    │  eras   (fan-out)│   │  scores            │
//!                    │  members         │   │  diagnostics       │
//!                    └──────────────────┘   │  failures          │
//!                                           └────────────────────┘
//! ```
//!
//! A failing era or group only removes that unit from the report; an
//! invalid request or an unreachable range boundary fails the whole run.

pub mod budget;
pub mod earners;
pub mod era;
pub mod opportunity;
pub mod report;
pub mod workers;

// Re-exports
pub use budget::{
    BudgetLedger, BudgetStatus, LedgerTotals, Recipient, Refill, RefillSource, SpendCategory,
    SpendItem,
};
pub use earners::{
    bounty_accounts, bounty_earners, nominator_earners, proposal_earners, validator_earners,
    Classification, EarnerClassifier, EarnerContext, EarnerRecord, EarnersByContext, MatchedBy,
};
pub use era::{
    split_validator_reward, EraRangeSummary, EraRewardReconstructor, EraSnapshot,
    NominatorReward, RewardSplit, StashRewards, ValidatorRecord,
};
pub use opportunity::{
    plan_terms, GroupScore, LeadScore, OpportunityScorer, OpportunityScores, ScoringTerm,
    TermActivity,
};
pub use report::{
    CouncilorRow, Diagnostic, GroupWorkers, Report, ReportDriver, ReportRequest, ScoringParams,
    Severity, Unit, UnitFailure, WorkerRow,
};
pub use workers::{WorkerExit, WorkerRecord, WorkerStatus, WorkerTimeline};
