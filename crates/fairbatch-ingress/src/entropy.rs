//! Entropy aggregator: one ordering seed per batch from all honest reveals.
//!
//! ```text
//!   acc  = s_1 ⊕ s_2 ⊕ … ⊕ s_n              (each successful reveal)
//!   seed = SHA-256("fairbatch:seed:v1:" || acc || batch_id
//!                  || reveal_deadline_ms || reveal_count)
//! ```
//!
//! XOR with a fixed value is a bijection on 32-byte strings, so as long as
//! one secret is uniform and independent of the others, `acc` is uniform no
//! matter how the remaining `n - 1` participants chose theirs. Revealers
//! cannot wait and react: every reveal is due before the seed exists.

use chrono::{DateTime, Utc};
use fairbatch_types::{BatchId, FairbatchError, Result, Secret, Seed};
use sha2::{Digest as _, Sha256};

/// Domain separator for seed derivation.
pub const SEED_DOMAIN: &[u8] = b"fairbatch:seed:v1:";

/// XOR accumulator for one batch.
#[derive(Debug, Clone, Default)]
pub struct EntropyAggregator {
    acc: Secret,
    reveals: u64,
    seed: Option<Seed>,
}

impl EntropyAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one honestly revealed secret into the accumulator.
    pub fn absorb(&mut self, secret: &Secret) {
        self.acc = self.acc.xor(secret);
        self.reveals += 1;
    }

    /// Derive the batch seed. Callable once.
    ///
    /// # Errors
    /// `SeedAlreadyFinalized` on a second call.
    pub fn finalize(&mut self, batch_id: BatchId, reveal_deadline: DateTime<Utc>) -> Result<Seed> {
        if self.seed.is_some() {
            return Err(FairbatchError::SeedAlreadyFinalized(batch_id));
        }
        let mut hasher = Sha256::new();
        hasher.update(SEED_DOMAIN);
        hasher.update(self.acc.as_bytes());
        hasher.update(batch_id.0.to_le_bytes());
        hasher.update(reveal_deadline.timestamp_millis().to_le_bytes());
        hasher.update(self.reveals.to_le_bytes());
        let result = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&result);
        let seed = Seed(bytes);

        tracing::info!(
            batch = batch_id.0,
            reveals = self.reveals,
            seed = %seed.short(),
            "batch seed finalized"
        );
        self.seed = Some(seed);
        Ok(seed)
    }

    /// Current XOR of all absorbed secrets.
    #[must_use]
    pub fn accumulated(&self) -> Secret {
        self.acc
    }

    #[must_use]
    pub fn reveal_count(&self) -> u64 {
        self.reveals
    }

    /// The finalized seed, if any.
    #[must_use]
    pub fn seed(&self) -> Option<Seed> {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn xor_accumulates() {
        let mut agg = EntropyAggregator::new();
        agg.absorb(&Secret([0b1010; 32]));
        agg.absorb(&Secret([0b0110; 32]));
        assert_eq!(agg.accumulated(), Secret([0b1100; 32]));
        assert_eq!(agg.reveal_count(), 2);
    }

    #[test]
    fn finalize_once() {
        let mut agg = EntropyAggregator::new();
        agg.absorb(&Secret([1; 32]));
        let deadline = Utc::now();
        let seed = agg.finalize(BatchId(1), deadline).unwrap();
        assert_eq!(agg.seed(), Some(seed));
        let err = agg.finalize(BatchId(1), deadline).unwrap_err();
        assert!(matches!(err, FairbatchError::SeedAlreadyFinalized(_)));
    }

    #[test]
    fn seed_depends_on_batch_and_count() {
        let deadline = Utc::now();
        let seed_for = |batch: u64, secrets: &[Secret]| {
            let mut agg = EntropyAggregator::new();
            for s in secrets {
                agg.absorb(s);
            }
            agg.finalize(BatchId(batch), deadline).unwrap()
        };
        let s = Secret([9; 32]);
        assert_eq!(seed_for(1, &[s]), seed_for(1, &[s]));
        assert_ne!(seed_for(1, &[s]), seed_for(2, &[s]));
        // Same accumulator (s ⊕ s ⊕ s == s), different reveal count.
        assert_ne!(seed_for(1, &[s]), seed_for(1, &[s, s, s]));
    }

    #[test]
    fn honest_secret_makes_accumulator_a_bijection() {
        // Adversaries fix their secrets; the honest participant's first
        // byte ranges over all 256 values. Every outcome must be distinct,
        // i.e. the adversaries cannot steer the accumulator.
        let adversarial = [Secret([0xAA; 32]), Secret([0x3C; 32]), Secret([0xFF; 32])];
        let mut seen = HashSet::new();
        for b in 0..=255u8 {
            let mut honest = [0x11u8; 32];
            honest[0] = b;
            let mut agg = EntropyAggregator::new();
            for s in &adversarial {
                agg.absorb(s);
            }
            agg.absorb(&Secret(honest));
            assert!(seen.insert(agg.accumulated()));
        }
        assert_eq!(seen.len(), 256);
    }
}
