//! Fill root: a single hash that pins down a batch's clearing output.
//!
//! Two replays of the same batch with the same seed must agree on the
//! `fill_root`; comparing roots is enough to detect divergence without
//! diffing every fill.

use fairbatch_types::{BatchId, Digest, Fill};
use sha2::{Digest as _, Sha256};

/// Domain separator for fill roots.
pub const FILL_ROOT_DOMAIN: &[u8] = b"fairbatch:fill_root:v1:";

/// Hash every fill, in order, under the batch id.
///
/// Decimals are normalized first so `1.50` and `1.5` hash identically.
#[must_use]
pub fn compute_fill_root<'a>(
    batch_id: BatchId,
    fills: impl IntoIterator<Item = &'a Fill>,
) -> Digest {
    let fills: Vec<&Fill> = fills.into_iter().collect();

    let mut hasher = Sha256::new();
    hasher.update(FILL_ROOT_DOMAIN);
    hasher.update(batch_id.0.to_le_bytes());
    hasher.update((fills.len() as u64).to_le_bytes());

    for fill in fills {
        hasher.update(fill.order_id.0.as_bytes());
        hasher.update(fill.participant.0.as_bytes());
        hasher.update(fill.pair.symbol().as_bytes());
        hasher.update(fill.direction.to_string().as_bytes());
        hasher.update(fill.counterparty.to_string().as_bytes());
        hasher.update(fill.amount.normalize().to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(fill.price.normalize().to_string().as_bytes());
        hasher.update([0u8]);
    }

    let result = hasher.finalize();
    let mut root = [0u8; 32];
    root.copy_from_slice(&result);
    Digest(root)
}

/// Recompute and compare.
#[must_use]
pub fn verify_fill_root<'a>(
    batch_id: BatchId,
    fills: impl IntoIterator<Item = &'a Fill>,
    expected: &Digest,
) -> bool {
    compute_fill_root(batch_id, fills) == *expected
}
