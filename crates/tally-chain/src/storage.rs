//! Storage records read at a block hash
//!
//! Shapes follow the staking, council and membership storage items they
//! are decoded from.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tally_core::{AccountId, Balance, MemberId, Perbill};

/// `erasRewardPoints(era)`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EraRewardPoints {
    /// Sum of all individual points, as stored on chain
    pub total: u32,

    /// Points earned per validator stash
    #[serde(default)]
    pub individual: BTreeMap<AccountId, u32>,
}

/// One nominator's backing of a validator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndividualExposure {
    pub who: AccountId,
    pub value: Balance,
}

/// `erasStakers(era, stash)`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exposure {
    /// Total backing, own plus nominators
    pub total: Balance,

    /// Validator's own bonded stake
    pub own: Balance,

    /// Nominator backings, in on-chain order
    #[serde(default)]
    pub others: Vec<IndividualExposure>,
}

/// `erasValidatorPrefs(era, stash)`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorPrefs {
    pub commission: Perbill,
}

/// One entry of `membershipById`, or a membership resolved by account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub id: MemberId,

    #[serde(default)]
    pub handle: Option<String>,

    pub root_account: AccountId,

    pub controller_account: AccountId,
}

/// A seated councilor and the rewards accrued for the term
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouncilorReward {
    pub member_id: MemberId,

    #[serde(default)]
    pub handle: Option<String>,

    pub reward_account: AccountId,

    /// Rewards actually paid out
    pub accumulated_reward: Balance,

    /// Rewards owed but not paid because the council budget ran dry
    #[serde(default)]
    pub unpaid_reward: Balance,
}
