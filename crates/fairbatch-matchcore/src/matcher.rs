//! Batch-wide clearing.
//!
//! Takes the sequenced orders of one batch and clears every pair in
//! canonical (sorted) pair order. This is the only entry point the engine
//! calls; it has no side effects beyond logging.
//!
//! ```text
//! clear_batch(batch_id, sequenced, pricing, config) -> ClearingResult
//! ```
//!
//! A pair that cannot clear becomes a [`PairFailure`] with every one of its
//! orders listed for return; other pairs are unaffected.

use std::collections::BTreeSet;

use fairbatch_types::{
    BatchId, ClearingResult, Order, PairFailure, PricingProvider, ProtocolConfig, TradingPair,
};

use crate::clearing::compute_clearing_price;
use crate::determinism::compute_fill_root;

/// Clear all pairs of a batch.
///
/// `sequenced` must already be in execution order (see
/// [`crate::sequencer::shuffle`]). Output is a pure function of the inputs
/// and the pricing collaborator's answers.
#[must_use]
pub fn clear_batch(
    batch_id: BatchId,
    sequenced: &[Order],
    pricing: &dyn PricingProvider,
    config: &ProtocolConfig,
) -> ClearingResult {
    let pairs: BTreeSet<&TradingPair> = sequenced.iter().map(Order::pair).collect();

    let mut cleared = Vec::with_capacity(pairs.len());
    let mut failures = Vec::new();
    for pair in pairs {
        match compute_clearing_price(sequenced, pair, pricing, config.max_trade_size_bps) {
            Ok(clearing) => cleared.push(clearing),
            Err(err) => {
                let returned = sequenced
                    .iter()
                    .filter(|o| o.pair() == pair)
                    .map(|o| o.id)
                    .collect::<Vec<_>>();
                tracing::debug!(
                    batch = batch_id.0,
                    pair = %pair,
                    orders = returned.len(),
                    error = %err,
                    "pair failed to clear"
                );
                failures.push(PairFailure {
                    pair: pair.clone(),
                    reason: err.to_string(),
                    returned,
                });
            }
        }
    }

    let fill_root = compute_fill_root(batch_id, cleared.iter().flat_map(|p| p.fills.iter()));

    tracing::info!(
        batch = batch_id.0,
        orders = sequenced.len(),
        pairs = cleared.len(),
        failed_pairs = failures.len(),
        fill_root = %fill_root.short(),
        "batch cleared"
    );

    ClearingResult {
        batch_id,
        pairs: cleared,
        failures,
        fill_root,
    }
}
