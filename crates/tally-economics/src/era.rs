//! # Era Reward Reconstruction
//!
//! Recomputes every validator's and nominator's share of an era payout from
//! raw staking storage, then accumulates eras into a range summary that is
//! checked against the on-chain payouts.
//!
//! ## Split
//!
//! For a validator with `points` out of `total_points`:
//!
//! | quantity          | value                                              |
//! |-------------------|----------------------------------------------------|
//! | `reward_base`     | `round(era_reward * points / total_points)`        |
//! | `commission_cut`  | `round(reward_base * commission)`                  |
//! | `shared_pool`     | `reward_base - commission_cut`                     |
//! | `own_reward`      | `round(shared_pool * own / total) + commission_cut`|
//! | nominator `i`     | `round(shared_pool * stake_i / total)`             |
//!
//! `round` is [`div_round`](tally_core::div_round). The gap between
//! `reward_base` and the sum of the parts is kept per validator as
//! `rounding_residual`; it is at most one unit per rounded term.
//!
//! Slashes are reported next to the gross reward, never netted into it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tally_chain::{ChainSnapshotReader, Exposure};
use tally_core::{
    mul_div_round, signed_sub, AccountId, Balance, BlockHash, EraIndex, Perbill, Result,
    SignedBalance, TallyError,
};
use tracing::{debug, warn};

/// Result of splitting one validator's reward base
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RewardSplit {
    pub reward_base: Balance,
    pub commission_cut: Balance,
    pub shared_pool: Balance,
    /// Stake share of the pool plus the commission cut
    pub own_reward: Balance,
    /// One entry per `exposure.others`, same order
    pub nominator_rewards: Vec<Balance>,
    pub rounding_residual: SignedBalance,
}

/// Split a validator's share of `era_reward`
///
/// A zero `total_points` is rejected; callers skip such eras before
/// splitting. A validator with zero total stake keeps the whole base.
pub fn split_validator_reward(
    era_reward: Balance,
    points: u64,
    total_points: u64,
    commission: Perbill,
    exposure: &Exposure,
) -> Result<RewardSplit> {
    if total_points == 0 {
        return Err(TallyError::InvalidParameter(
            "cannot split a reward over zero points".into(),
        ));
    }

    let reward_base = mul_div_round(era_reward, points as u128, total_points as u128)
        .ok_or(TallyError::Overflow("reward base"))?;
    let commission_cut = commission.mul_round(reward_base);
    let shared_pool = reward_base - commission_cut;

    let (own_reward, nominator_rewards) = if exposure.total == 0 {
        (reward_base, vec![0; exposure.others.len()])
    } else {
        let own_share = mul_div_round(exposure.own, shared_pool, exposure.total)
            .ok_or(TallyError::Overflow("own reward"))?;
        let own_reward = own_share
            .checked_add(commission_cut)
            .ok_or(TallyError::Overflow("own reward"))?;
        let nominator_rewards = exposure
            .others
            .iter()
            .map(|n| {
                mul_div_round(shared_pool, n.value, exposure.total)
                    .ok_or(TallyError::Overflow("nominator reward"))
            })
            .collect::<Result<Vec<_>>>()?;
        (own_reward, nominator_rewards)
    };

    let distributed = nominator_rewards
        .iter()
        .try_fold(own_reward, |acc, r| acc.checked_add(*r))
        .ok_or(TallyError::Overflow("distributed reward"))?;
    let rounding_residual =
        signed_sub(reward_base, distributed).ok_or(TallyError::Overflow("rounding residual"))?;

    Ok(RewardSplit {
        reward_base,
        commission_cut,
        shared_pool,
        own_reward,
        nominator_rewards,
        rounding_residual,
    })
}

/// One nominator's stake behind a validator and the reward it earned
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NominatorReward {
    pub who: AccountId,
    pub stake: Balance,
    pub reward: Balance,
}

/// One validator within one era
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRecord {
    pub stash: AccountId,

    /// `None` when the stash is no longer bonded
    pub controller: Option<AccountId>,

    pub commission: Perbill,

    pub reward_points: u32,

    pub own_stake: Balance,

    pub total_stake: Balance,

    pub reward_base: Balance,

    pub commission_cut: Balance,

    /// Pool split by stake after commission
    pub shared_reward: Balance,

    /// Includes `commission_cut`
    pub own_reward: Balance,

    pub nominators: Vec<NominatorReward>,

    /// `reward_base - (own_reward + nominator rewards)`
    pub rounding_residual: SignedBalance,

    /// Validator-level slash recorded for the era
    pub slashed_amount: Balance,

    /// Storage that was missing and how it was filled in
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl ValidatorRecord {
    pub fn nominator_reward_sum(&self) -> Balance {
        self.nominators.iter().map(|n| n.reward).sum()
    }

    /// Own plus nominator rewards
    pub fn distributed_reward(&self) -> Balance {
        self.own_reward + self.nominator_reward_sum()
    }

    /// Own reward minus the validator slash; negative signals a net loss
    pub fn net_reward(&self) -> Option<SignedBalance> {
        signed_sub(self.own_reward, self.slashed_amount)
    }
}

/// Nominator slash recorded for an era, not tied to a single validator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NominatorSlash {
    pub who: AccountId,
    pub amount: Balance,
}

/// One reconstructed era
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EraSnapshot {
    pub era_index: EraIndex,

    /// On-chain era payout
    pub total_reward: Balance,

    pub total_stake: Balance,

    /// Sum of individual points
    pub total_points: u64,

    /// Ordered by stash
    pub validators: Vec<ValidatorRecord>,

    pub nominator_slashes: Vec<NominatorSlash>,

    /// Sum of every validator's distributed reward
    pub calculated_reward: Balance,

    /// Validator and nominator slashes together
    pub slashes_applied: Balance,
}

impl EraSnapshot {
    pub fn new(
        era_index: EraIndex,
        total_reward: Balance,
        total_stake: Balance,
        total_points: u64,
        validators: Vec<ValidatorRecord>,
        nominator_slashes: Vec<NominatorSlash>,
    ) -> Result<Self> {
        let calculated_reward = validators
            .iter()
            .try_fold(0u128, |acc, v| acc.checked_add(v.distributed_reward()))
            .ok_or(TallyError::Overflow("era calculated reward"))?;
        let slashes_applied = validators
            .iter()
            .map(|v| v.slashed_amount)
            .chain(nominator_slashes.iter().map(|s| s.amount))
            .try_fold(0u128, |acc, s| acc.checked_add(s))
            .ok_or(TallyError::Overflow("era slashes"))?;

        Ok(Self {
            era_index,
            total_reward,
            total_stake,
            total_points,
            validators,
            nominator_slashes,
            calculated_reward,
            slashes_applied,
        })
    }

    /// `calculated_reward - total_reward`
    pub fn drift(&self) -> Option<SignedBalance> {
        signed_sub(self.calculated_reward, self.total_reward)
    }

    pub fn nominator_reward_sum(&self) -> Balance {
        self.validators.iter().map(|v| v.nominator_reward_sum()).sum()
    }

    /// BLAKE3 of the JSON encoding
    pub fn digest(&self) -> Result<[u8; 32]> {
        let bytes =
            serde_json::to_vec(self).map_err(|e| TallyError::Serialization(e.to_string()))?;
        Ok(*blake3::hash(&bytes).as_bytes())
    }

    pub fn digest_hex(&self) -> Result<String> {
        self.digest().map(hex::encode)
    }
}

/// Rebuilds eras from staking storage
pub struct EraRewardReconstructor<'a> {
    reader: &'a dyn ChainSnapshotReader,
}

impl<'a> EraRewardReconstructor<'a> {
    pub fn new(reader: &'a dyn ChainSnapshotReader) -> Self {
        Self { reader }
    }

    /// Reconstruct `era` from storage at `at`
    pub async fn reconstruct(&self, era: EraIndex, at: BlockHash) -> Result<EraSnapshot> {
        let total_reward = self
            .reader
            .era_validator_reward(at, era)
            .await?
            .ok_or_else(|| {
                TallyError::chain_read(
                    format!("erasValidatorReward({})", era),
                    "no payout recorded",
                )
            })?;
        let total_stake = self.reader.era_total_stake(at, era).await?;
        let points = self.reader.era_reward_points(at, era).await?;

        let total_points: u64 = points.individual.values().map(|p| *p as u64).sum();
        if total_points != points.total as u64 {
            warn!(
                "Era {} stored point total {} differs from summed points {}",
                era, points.total, total_points
            );
        }

        let mut validators = Vec::new();
        if total_points == 0 {
            debug!("Era {} has no reward points, no validator rewards", era);
        } else {
            for (stash, &stash_points) in points.individual.iter().filter(|(_, p)| **p > 0) {
                let record = self
                    .validator(era, at, stash, stash_points, total_reward, total_points)
                    .await?;
                validators.push(record);
            }
        }

        let nominator_slashes = self
            .reader
            .nominator_slashes_in_era(at, era)
            .await?
            .into_iter()
            .map(|(who, amount)| {
                debug!("Nominator {} slashed {} in era {}", who, amount, era);
                NominatorSlash { who, amount }
            })
            .collect();

        let snapshot = EraSnapshot::new(
            era,
            total_reward,
            total_stake,
            total_points,
            validators,
            nominator_slashes,
        )?;
        debug!(
            "Era {}: {} validators, payout {}, calculated {}",
            era,
            snapshot.validators.len(),
            snapshot.total_reward,
            snapshot.calculated_reward
        );
        Ok(snapshot)
    }

    async fn validator(
        &self,
        era: EraIndex,
        at: BlockHash,
        stash: &AccountId,
        points: u32,
        era_reward: Balance,
        total_points: u64,
    ) -> Result<ValidatorRecord> {
        let mut notes = Vec::new();

        let commission = self.reader.era_validator_prefs(at, era, stash).await?.commission;
        let exposure = match self.reader.era_stakers(at, era, stash).await? {
            Some(exposure) => exposure,
            None => {
                warn!("No exposure for {} in era {}, using zero stake", stash, era);
                notes.push("exposure missing".to_string());
                Exposure::default()
            }
        };
        let slashed_amount = self
            .reader
            .validator_slash_in_era(at, era, stash)
            .await?
            .unwrap_or(0);
        if slashed_amount > 0 {
            debug!("Validator {} slashed {} in era {}", stash, slashed_amount, era);
        }
        let controller = self.reader.bonded(at, stash).await?;
        if controller.is_none() {
            notes.push("controller unknown".to_string());
        }

        let split =
            split_validator_reward(era_reward, points as u64, total_points, commission, &exposure)?;

        let nominators = exposure
            .others
            .iter()
            .zip(split.nominator_rewards.iter())
            .map(|(n, reward)| NominatorReward {
                who: n.who.clone(),
                stake: n.value,
                reward: *reward,
            })
            .collect();

        Ok(ValidatorRecord {
            stash: stash.clone(),
            controller,
            commission,
            reward_points: points,
            own_stake: exposure.own,
            total_stake: exposure.total,
            reward_base: split.reward_base,
            commission_cut: split.commission_cut,
            shared_reward: split.shared_pool,
            own_reward: split.own_reward,
            nominators,
            rounding_residual: split.rounding_residual,
            slashed_amount,
            notes,
        })
    }
}

/// Rewards and slashes of one stash across a range of eras
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StashRewards {
    pub stash: AccountId,

    /// Most recently seen controller
    pub controller: Option<AccountId>,

    pub reward: Balance,

    pub slashed: Balance,

    /// Eras in which the stash earned points
    pub eras: u32,
}

impl StashRewards {
    pub fn net(&self) -> Option<SignedBalance> {
        signed_sub(self.reward, self.slashed)
    }
}

/// Rewards and slashes of one nominator across a range of eras
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NominatorTotals {
    pub reward: Balance,
    pub slashed: Balance,
}

/// Accumulation of eras `[first_era, last_era)`
///
/// Totals here are membership-blind. The member versus non-member split of
/// these rewards lives in the `Validator` and `Nominator` earner contexts,
/// built from this summary by `validator_earners` and `nominator_earners`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EraRangeSummary {
    pub first_era: EraIndex,

    pub last_era: EraIndex,

    /// Reconstructed eras, ordered by index
    pub eras: Vec<EraSnapshot>,

    /// Sum of on-chain era payouts
    pub actual_reward_sum: Balance,

    /// Sum of reconstructed rewards
    pub calculated_reward_sum: Balance,

    pub total_nominator_rewards: Balance,

    pub total_slashes_applied: Balance,

    pub stashes: BTreeMap<AccountId, StashRewards>,

    pub nominators: BTreeMap<AccountId, NominatorTotals>,
}

impl EraRangeSummary {
    pub fn new(first_era: EraIndex, last_era: EraIndex) -> Result<Self> {
        if first_era >= last_era {
            return Err(TallyError::InconsistentRange(format!(
                "era range [{}, {}) is empty",
                first_era, last_era
            )));
        }
        Ok(Self {
            first_era,
            last_era,
            eras: Vec::new(),
            actual_reward_sum: 0,
            calculated_reward_sum: 0,
            total_nominator_rewards: 0,
            total_slashes_applied: 0,
            stashes: BTreeMap::new(),
            nominators: BTreeMap::new(),
        })
    }

    /// Fold one era in
    pub fn accumulate(&mut self, snapshot: EraSnapshot) -> Result<()> {
        if snapshot.era_index < self.first_era || snapshot.era_index >= self.last_era {
            return Err(TallyError::InconsistentRange(format!(
                "era {} outside [{}, {})",
                snapshot.era_index, self.first_era, self.last_era
            )));
        }

        self.actual_reward_sum = checked(self.actual_reward_sum, snapshot.total_reward)?;
        self.calculated_reward_sum =
            checked(self.calculated_reward_sum, snapshot.calculated_reward)?;
        self.total_nominator_rewards =
            checked(self.total_nominator_rewards, snapshot.nominator_reward_sum())?;
        self.total_slashes_applied = checked(self.total_slashes_applied, snapshot.slashes_applied)?;

        for validator in &snapshot.validators {
            let entry = self
                .stashes
                .entry(validator.stash.clone())
                .or_insert_with(|| StashRewards {
                    stash: validator.stash.clone(),
                    controller: None,
                    reward: 0,
                    slashed: 0,
                    eras: 0,
                });
            if validator.controller.is_some() {
                entry.controller = validator.controller.clone();
            }
            entry.reward = checked(entry.reward, validator.own_reward)?;
            entry.slashed = checked(entry.slashed, validator.slashed_amount)?;
            entry.eras += 1;

            for nominator in &validator.nominators {
                let totals = self.nominators.entry(nominator.who.clone()).or_default();
                totals.reward = checked(totals.reward, nominator.reward)?;
            }
        }
        for slash in &snapshot.nominator_slashes {
            let totals = self.nominators.entry(slash.who.clone()).or_default();
            totals.slashed = checked(totals.slashed, slash.amount)?;
        }

        let position = self
            .eras
            .partition_point(|e| e.era_index < snapshot.era_index);
        self.eras.insert(position, snapshot);
        Ok(())
    }

    /// `calculated_reward_sum - actual_reward_sum`
    pub fn drift(&self) -> Option<SignedBalance> {
        signed_sub(self.calculated_reward_sum, self.actual_reward_sum)
    }

    /// Allowed drift for the eras accumulated so far
    pub fn tolerance(&self, per_era: Balance) -> Balance {
        per_era.saturating_mul(self.eras.len() as u128)
    }

    pub fn is_reconciled(&self, per_era: Balance) -> bool {
        match self.drift() {
            Some(drift) => drift.unsigned_abs() <= self.tolerance(per_era),
            None => false,
        }
    }

    /// Eras the range covers but that were not accumulated
    pub fn missing_eras(&self) -> Vec<EraIndex> {
        (self.first_era..self.last_era)
            .filter(|era| self.eras.binary_search_by_key(era, |e| e.era_index).is_err())
            .collect()
    }
}

fn checked(a: Balance, b: Balance) -> Result<Balance> {
    a.checked_add(b).ok_or(TallyError::Overflow("era range totals"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tally_chain::{ChainFixture, EraFixture, EraRewardPoints, IndividualExposure, MemoryChain};

    fn exposure(own: Balance, others: &[(&str, Balance)]) -> Exposure {
        let others: Vec<IndividualExposure> = others
            .iter()
            .map(|(who, value)| IndividualExposure {
                who: AccountId::from(*who),
                value: *value,
            })
            .collect();
        Exposure {
            total: own + others.iter().map(|o| o.value).sum::<Balance>(),
            own,
            others,
        }
    }

    #[test]
    fn test_split_single_validator() {
        let split = split_validator_reward(
            1000,
            100,
            100,
            Perbill::from_percent(10),
            &exposure(200, &[("nominator", 800)]),
        )
        .unwrap();

        assert_eq!(split.reward_base, 1000);
        assert_eq!(split.commission_cut, 100);
        assert_eq!(split.shared_pool, 900);
        assert_eq!(split.own_reward, 280);
        assert_eq!(split.nominator_rewards, vec![720]);
        assert_eq!(split.rounding_residual, 0);
    }

    #[test]
    fn test_split_zero_stake_keeps_base() {
        let split =
            split_validator_reward(1000, 1, 4, Perbill::from_percent(5), &Exposure::default())
                .unwrap();
        assert_eq!(split.reward_base, 250);
        assert_eq!(split.own_reward, 250);
        assert_eq!(split.rounding_residual, 0);
    }

    #[test]
    fn test_split_rejects_zero_points() {
        assert!(split_validator_reward(1000, 0, 0, Perbill::ZERO, &Exposure::default()).is_err());
    }

    #[test]
    fn test_split_rounding_residual() {
        // 100 / 3 each: 33.33 rounds down three times
        let split = split_validator_reward(
            100,
            1,
            1,
            Perbill::ZERO,
            &exposure(1, &[("a", 1), ("b", 1)]),
        )
        .unwrap();
        assert_eq!(split.own_reward, 33);
        assert_eq!(split.nominator_rewards, vec![33, 33]);
        assert_eq!(split.rounding_residual, 1);
    }

    proptest! {
        #[test]
        fn proptest_residual_bounded_by_terms(
            reward in 0u128..1_000_000_000_000u128,
            points in 1u64..10_000,
            extra_points in 0u64..10_000,
            commission in 0u32..=1_000_000_000u32,
            own in 0u128..1_000_000_000u128,
            others in proptest::collection::vec(1u128..1_000_000_000u128, 0..8),
        ) {
            let named: Vec<(String, Balance)> = others
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("n{}", i), *v))
                .collect();
            let refs: Vec<(&str, Balance)> = named.iter().map(|(n, v)| (n.as_str(), *v)).collect();
            let exposure = exposure(own, &refs);

            let split = split_validator_reward(
                reward,
                points,
                points + extra_points,
                Perbill::from_parts(commission),
                &exposure,
            ).unwrap();

            let terms = (others.len() + 1) as u128;
            prop_assert!(split.rounding_residual.unsigned_abs() <= terms);
            prop_assert_eq!(split.commission_cut + split.shared_pool, split.reward_base);
        }
    }

    fn era_fixture() -> ChainFixture {
        let mut fixture = ChainFixture {
            head: 1_000,
            ..Default::default()
        };
        let validator = AccountId::from("5Validator");
        let mut points = EraRewardPoints {
            total: 100,
            ..Default::default()
        };
        points.individual.insert(validator.clone(), 100);
        points.individual.insert(AccountId::from("5Idle"), 0);

        let mut era = EraFixture {
            validator_reward: Some(1000),
            total_stake: 1000,
            reward_points: points,
            ..Default::default()
        };
        era.prefs.insert(validator.clone(), Perbill::from_percent(10));
        era.stakers
            .insert(validator.clone(), exposure(200, &[("5Nominator", 800)]));
        era.validator_slashes.insert(validator.clone(), 30);
        era.nominator_slashes.insert(AccountId::from("5Other"), 5);

        fixture.eras.insert(7, era);
        fixture
            .bonded
            .insert(validator, AccountId::from("5Controller"));
        fixture
    }

    #[tokio::test]
    async fn test_reconstruct_era() {
        let chain = MemoryChain::new(era_fixture());
        let at = chain.block_hash(1_000).await.unwrap();

        let snapshot = EraRewardReconstructor::new(&chain)
            .reconstruct(7, at)
            .await
            .unwrap();

        assert_eq!(snapshot.validators.len(), 1);
        let v = &snapshot.validators[0];
        assert_eq!(v.controller, Some(AccountId::from("5Controller")));
        assert_eq!(v.own_reward, 280);
        assert_eq!(v.nominator_reward_sum(), 720);
        assert_eq!(v.slashed_amount, 30);
        assert_eq!(v.net_reward(), Some(250));
        assert_eq!(snapshot.calculated_reward, 1000);
        assert_eq!(snapshot.drift(), Some(0));
        assert_eq!(snapshot.slashes_applied, 35);
    }

    #[tokio::test]
    async fn test_reconstruct_is_idempotent() {
        let chain = MemoryChain::new(era_fixture());
        let at = chain.block_hash(1_000).await.unwrap();
        let reconstructor = EraRewardReconstructor::new(&chain);

        let first = reconstructor.reconstruct(7, at).await.unwrap();
        let second = reconstructor.reconstruct(7, at).await.unwrap();
        assert_eq!(first.digest().unwrap(), second.digest().unwrap());
        assert_eq!(first.digest_hex().unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_missing_storage_degrades() {
        let mut fixture = era_fixture();
        fixture.bonded.clear();
        fixture.eras.get_mut(&7).unwrap().stakers.clear();
        let chain = MemoryChain::new(fixture);
        let at = chain.block_hash(1_000).await.unwrap();

        let snapshot = EraRewardReconstructor::new(&chain)
            .reconstruct(7, at)
            .await
            .unwrap();
        let v = &snapshot.validators[0];
        assert_eq!(v.controller, None);
        assert_eq!(v.own_reward, 1000);
        assert!(v.notes.iter().any(|n| n == "controller unknown"));
        assert!(v.notes.iter().any(|n| n == "exposure missing"));
    }

    #[tokio::test]
    async fn test_unpaid_era_is_read_error() {
        let mut fixture = era_fixture();
        fixture.eras.get_mut(&7).unwrap().validator_reward = None;
        let chain = MemoryChain::new(fixture);
        let at = chain.block_hash(1_000).await.unwrap();

        let err = EraRewardReconstructor::new(&chain)
            .reconstruct(7, at)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_range_summary() {
        let chain = MemoryChain::new(era_fixture());
        let at = chain.block_hash(1_000).await.unwrap();
        let snapshot = EraRewardReconstructor::new(&chain)
            .reconstruct(7, at)
            .await
            .unwrap();

        let mut summary = EraRangeSummary::new(7, 9).unwrap();
        summary.accumulate(snapshot).unwrap();

        assert_eq!(summary.actual_reward_sum, 1000);
        assert_eq!(summary.calculated_reward_sum, 1000);
        assert_eq!(summary.total_nominator_rewards, 720);
        assert_eq!(summary.missing_eras(), vec![8]);
        assert!(summary.is_reconciled(1));

        let stash = &summary.stashes[&AccountId::from("5Validator")];
        assert_eq!(stash.reward, 280);
        assert_eq!(stash.net(), Some(250));
        assert_eq!(summary.nominators[&AccountId::from("5Other")].slashed, 5);
    }

    #[test]
    fn test_empty_era_range_rejected() {
        assert!(matches!(
            EraRangeSummary::new(5, 5),
            Err(TallyError::InconsistentRange(_))
        ));
    }
}
