//! Contribution-weighted reward allocation.
//!
//! Each participant's marginal contribution to a batch is scored on four
//! components, each normalized by its batch-wide sum:
//!
//! ```text
//! direct    = settled notional + liquidity supplied outside the batch
//! time      = log2(days_in_pool + 1) × time_score_constant
//! scarcity  = direct × (opposite side's share of the pair's requested volume)
//! stability = direct × volatility_weight(tier)     Low 0, Medium ½, High 1
//!
//! score     = 0.40·direct + 0.30·time + 0.20·scarcity + 0.10·stability
//! ```
//!
//! The distributable pool per asset is the batch's fees plus priority
//! payments, scaled by `2^-era`. Shares are truncated in processing order
//! and the last participant with a positive score takes the residue, so
//! shares always sum to the distributable amount. Whatever is not
//! distributed (non-emitted halving remainder, or a whole pool nobody
//! scored on) is routed to the treasury.
//!
//! The computation is O(n) in participants per asset.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use fairbatch_ingress::EscrowLedger;
use fairbatch_types::amount::{pro_rata, truncate};
use fairbatch_types::constants::BPS_DENOMINATOR;
use fairbatch_types::{
    Account, Asset, AssetAmount, BatchId, ContributionInput, ContributionRecord, Direction,
    FairbatchError, OrderSettlement, ParticipantId, ProtocolConfig, Result, RewardAllocation,
    RewardShare, RewardWeights, SettlementReport, Transfer, TradingPair, VolatilityClassifier,
    VolatilityTier,
};
use rust_decimal::{Decimal, MathematicalOps};

use crate::idempotency::IdempotencyGuard;

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// `log2(days + 1) × constant`.
///
/// # Errors
/// `Internal` if the logarithm cannot be evaluated.
pub fn time_score(days_in_pool: u32, constant: Decimal) -> Result<Decimal> {
    if days_in_pool == 0 {
        return Ok(Decimal::ZERO);
    }
    let ln = |x: Decimal| {
        x.checked_ln()
            .ok_or_else(|| FairbatchError::Internal(format!("ln({x}) undefined")))
    };
    Ok(ln(Decimal::from(days_in_pool) + Decimal::ONE)? / ln(Decimal::TWO)? * constant)
}

/// Emission era of the `batch_index`-th batch (zero based).
#[must_use]
pub fn era_for(batch_index: u64, batches_per_era: u64) -> u64 {
    batch_index.checked_div(batches_per_era).unwrap_or(0)
}

/// `trunc(amount × 2^-era)`, zero past `max_era`.
#[must_use]
pub fn emission(amount: Decimal, era: u64, max_era: u64) -> Decimal {
    if era > max_era {
        return Decimal::ZERO;
    }
    Decimal::TWO
        .checked_powu(era)
        .map_or(Decimal::ZERO, |divisor| truncate(amount / divisor))
}

/// Requested base volume per (pair, side), used for the scarcity weight.
fn side_volumes(orders: &[OrderSettlement]) -> BTreeMap<(&TradingPair, Direction), Decimal> {
    let mut volumes = BTreeMap::new();
    for line in orders {
        *volumes
            .entry((&line.pair, line.direction))
            .or_insert(Decimal::ZERO) += line.requested;
    }
    volumes
}

/// Share of the pair's requested volume sitting on the other side.
fn scarcity_weight(
    volumes: &BTreeMap<(&TradingPair, Direction), Decimal>,
    pair: &TradingPair,
    direction: Direction,
) -> Decimal {
    let own = volumes.get(&(pair, direction)).copied().unwrap_or_default();
    let other = volumes
        .get(&(pair, direction.opposite()))
        .copied()
        .unwrap_or_default();
    let total = own + other;
    if total.is_zero() {
        Decimal::ZERO
    } else {
        other / total
    }
}

fn overflow(participant: ParticipantId) -> FairbatchError {
    FairbatchError::Internal(format!("contribution score of {participant} overflows"))
}

fn scaled(direct: Decimal, weight: Decimal, participant: ParticipantId) -> Result<Decimal> {
    direct.checked_mul(weight).ok_or_else(|| overflow(participant))
}

struct RawScore {
    participant: ParticipantId,
    direct: Decimal,
    days_in_pool: u32,
    time: Decimal,
    scarcity: Decimal,
    stability: Decimal,
}

/// Score every participant of a settled batch.
///
/// Participants appear in processing order: order lines first (execution
/// sequence), then liquidity-only contributors in input order. A
/// participant without an order line takes a neutral scarcity weight of ½
/// and the `Medium` volatility weight.
pub fn score_contributions(
    report: &SettlementReport,
    inputs: &[ContributionInput],
    volatility: &dyn VolatilityClassifier,
    at: DateTime<Utc>,
    weights: &RewardWeights,
    time_score_constant: Decimal,
) -> Result<Vec<ContributionRecord>> {
    let volumes = side_volumes(&report.orders);
    let half = Decimal::new(5, 1);

    let mut raw: Vec<RawScore> = Vec::new();
    let mut seen: BTreeSet<ParticipantId> = BTreeSet::new();

    for line in &report.orders {
        if !seen.insert(line.participant) {
            continue;
        }
        let input = inputs.iter().find(|i| i.participant == line.participant);
        let direct = line
            .notional
            .checked_add(input.map_or(Decimal::ZERO, |i| i.liquidity_provided))
            .ok_or_else(|| overflow(line.participant))?;
        let days = input.map_or(0, |i| i.days_in_pool);
        let tier = volatility.volatility_tier(&line.pair, at);
        raw.push(RawScore {
            participant: line.participant,
            direct,
            days_in_pool: days,
            time: time_score(days, time_score_constant)?,
            scarcity: scaled(direct, scarcity_weight(&volumes, &line.pair, line.direction), line.participant)?,
            stability: scaled(direct, tier.weight(), line.participant)?,
        });
    }

    for input in inputs {
        if !seen.insert(input.participant) {
            continue;
        }
        let direct = input.liquidity_provided;
        raw.push(RawScore {
            participant: input.participant,
            direct,
            days_in_pool: input.days_in_pool,
            time: time_score(input.days_in_pool, time_score_constant)?,
            scarcity: scaled(direct, half, input.participant)?,
            stability: scaled(direct, VolatilityTier::Medium.weight(), input.participant)?,
        });
    }

    let sum = |f: fn(&RawScore) -> Decimal| -> Result<Decimal> {
        raw.iter()
            .try_fold(Decimal::ZERO, |acc, r| acc.checked_add(f(r)))
            .ok_or_else(|| FairbatchError::Internal("contribution total overflows".into()))
    };
    let (sum_direct, sum_time, sum_scarcity, sum_stability) = (
        sum(|r| r.direct)?,
        sum(|r| r.time)?,
        sum(|r| r.scarcity)?,
        sum(|r| r.stability)?,
    );
    let normalized = |value: Decimal, total: Decimal| {
        if total.is_zero() {
            Decimal::ZERO
        } else {
            value / total
        }
    };
    let bps = |w: u32| Decimal::from(w) / Decimal::from(BPS_DENOMINATOR);

    let weighted: Vec<Decimal> = raw
        .iter()
        .map(|r| {
            bps(weights.direct_bps) * normalized(r.direct, sum_direct)
                + bps(weights.time_bps) * normalized(r.time, sum_time)
                + bps(weights.scarcity_bps) * normalized(r.scarcity, sum_scarcity)
                + bps(weights.stability_bps) * normalized(r.stability, sum_stability)
        })
        .collect();
    let total_weighted: Decimal = weighted.iter().copied().sum();

    Ok(raw
        .into_iter()
        .zip(weighted)
        .map(|(r, score)| ContributionRecord {
            participant: r.participant,
            direct: r.direct,
            days_in_pool: r.days_in_pool,
            time_score: r.time,
            scarcity_score: r.scarcity,
            stability_score: r.stability,
            weighted_score: score,
            share_fraction: normalized(score, total_weighted),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Splitting
// ---------------------------------------------------------------------------

/// Split `pool` over `scores`, with an optional per-participant floor.
///
/// Returns the per-participant amounts (same order as `scores`) and the
/// undistributed remainder. Amounts plus remainder always equal `pool`.
#[must_use]
pub fn split_pool(
    pool: Decimal,
    scores: &[Decimal],
    floor: Option<Decimal>,
) -> (Vec<Decimal>, Decimal) {
    if scores.is_empty() || pool <= Decimal::ZERO {
        return (vec![Decimal::ZERO; scores.len()], pool);
    }

    let n = Decimal::from(scores.len());
    let floor_each = match floor {
        Some(f) if f * n > pool => truncate(pool / n),
        Some(f) => f,
        None => Decimal::ZERO,
    };
    let rest = pool - floor_each * n;

    let total: Decimal = scores.iter().copied().sum();
    let Some(last) = scores.iter().rposition(|s| *s > Decimal::ZERO) else {
        return (vec![floor_each; scores.len()], rest);
    };

    let mut given = Decimal::ZERO;
    let amounts = scores
        .iter()
        .enumerate()
        .map(|(i, score)| {
            let share = match i.cmp(&last) {
                std::cmp::Ordering::Less => pro_rata(rest, *score, total),
                std::cmp::Ordering::Equal => rest - given,
                std::cmp::Ordering::Greater => Decimal::ZERO,
            };
            given += share;
            floor_each + share
        })
        .collect();
    (amounts, Decimal::ZERO)
}

// ---------------------------------------------------------------------------
// Allocator
// ---------------------------------------------------------------------------

/// Computes, caches and pays out per-batch reward allocations.
#[derive(Debug, Clone)]
pub struct RewardAllocator {
    weights: RewardWeights,
    time_score_constant: Decimal,
    min_reward_floor: Option<Decimal>,
    batches_per_era: u64,
    max_era: u64,
    allocations: BTreeMap<BatchId, RewardAllocation>,
    claims: IdempotencyGuard<(BatchId, ParticipantId)>,
}

impl RewardAllocator {
    #[must_use]
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            weights: config.reward_weights.clone(),
            time_score_constant: config.time_score_constant,
            min_reward_floor: config.min_reward_floor,
            batches_per_era: config.batches_per_era,
            max_era: config.max_era,
            allocations: BTreeMap::new(),
            claims: IdempotencyGuard::new(),
        }
    }

    #[must_use]
    pub fn allocation(&self, batch_id: BatchId) -> Option<&RewardAllocation> {
        self.allocations.get(&batch_id)
    }

    #[must_use]
    pub fn is_claimed(&self, batch_id: BatchId, participant: ParticipantId) -> bool {
        self.claims.contains(&(batch_id, participant))
    }

    /// Allocate a settled batch's proceeds. Cached per batch.
    pub fn allocate(
        &mut self,
        report: &SettlementReport,
        inputs: &[ContributionInput],
        batch_index: u64,
        volatility: &dyn VolatilityClassifier,
        at: DateTime<Utc>,
    ) -> Result<RewardAllocation> {
        let batch_id = report.batch_id;
        if let Some(existing) = self.allocations.get(&batch_id) {
            return Ok(existing.clone());
        }

        let era = era_for(batch_index, self.batches_per_era);
        let contributions = score_contributions(
            report,
            inputs,
            volatility,
            at,
            &self.weights,
            self.time_score_constant,
        )?;
        let scores: Vec<Decimal> = contributions.iter().map(|c| c.weighted_score).collect();

        let mut shares = Vec::new();
        let mut distributable: BTreeMap<Asset, Decimal> = BTreeMap::new();
        let mut treasury: BTreeMap<Asset, Decimal> = BTreeMap::new();

        for asset in report.proceeds_assets() {
            let proceeds = report.proceeds(&asset);
            let emitted = emission(proceeds, era, self.max_era);
            let (amounts, undistributed) = split_pool(emitted, &scores, self.min_reward_floor);

            let mut shared = Decimal::ZERO;
            for (record, amount) in contributions.iter().zip(amounts) {
                if amount > Decimal::ZERO {
                    shared += amount;
                    shares.push(RewardShare {
                        batch_id,
                        participant: record.participant,
                        asset: asset.clone(),
                        amount,
                    });
                }
            }

            let to_treasury = proceeds - emitted + undistributed;
            if shared > Decimal::ZERO {
                distributable.insert(asset.clone(), shared);
            }
            if to_treasury > Decimal::ZERO {
                treasury.insert(asset.clone(), to_treasury);
            }
            tracing::debug!(
                batch = batch_id.0,
                asset = %asset,
                %proceeds,
                %shared,
                treasury = %to_treasury,
                "proceeds split"
            );
        }

        let allocation = RewardAllocation {
            batch_id,
            era,
            contributions,
            shares,
            distributable,
            treasury,
        };
        tracing::info!(
            batch = batch_id.0,
            era,
            participants = allocation.contributions.len(),
            shares = allocation.shares.len(),
            "rewards allocated"
        );
        self.allocations.insert(batch_id, allocation.clone());
        Ok(allocation)
    }

    /// Credit a participant's shares to their escrow custody.
    ///
    /// # Errors
    /// - `AlreadyClaimed` on a repeat claim
    /// - `NoReward` if the batch has no allocation or the participant no share
    pub fn claim(
        &mut self,
        ledger: &mut EscrowLedger,
        batch_id: BatchId,
        participant: ParticipantId,
    ) -> Result<Vec<AssetAmount>> {
        if self.claims.contains(&(batch_id, participant)) {
            return Err(FairbatchError::AlreadyClaimed {
                batch: batch_id,
                participant,
            });
        }
        let owed = self
            .allocations
            .get(&batch_id)
            .map(|a| a.shares_for(participant))
            .unwrap_or_default();
        if owed.is_empty() {
            return Err(FairbatchError::NoReward {
                batch: batch_id,
                participant,
            });
        }

        let transfers: Vec<Transfer> = owed
            .iter()
            .map(|a| {
                Transfer::pay(
                    Account::Proceeds(batch_id),
                    Account::Participant(participant),
                    a.asset.clone(),
                    a.amount,
                )
            })
            .collect();
        ledger.apply_atomic(&transfers)?;
        self.claims.mark((batch_id, participant));

        tracing::info!(
            batch = batch_id.0,
            participant = %participant,
            assets = owed.len(),
            "reward claimed"
        );
        Ok(owed)
    }
}
