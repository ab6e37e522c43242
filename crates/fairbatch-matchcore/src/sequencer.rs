//! Fair sequencer: seed-driven execution order.
//!
//! ```text
//! shuffle(orders, seed):
//!   1. canonicalize: sort by arrival sequence (caller order is ignored)
//!   2. priority bidders first: bid desc, then arrival asc
//!   3. everyone else: Fisher-Yates over a ChaCha20 stream seeded with `seed`
//! ```
//!
//! `gen_range` draws without modulo bias, so over uniformly random seeds the
//! non-priority tail is uniform over all `n!` permutations. The same
//! `(orders, seed)` always yields the same sequence.

use std::cmp::Reverse;

use fairbatch_types::{Order, Seed};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Deterministically order revealed orders for execution.
#[must_use]
pub fn shuffle(orders: &[Order], seed: &Seed) -> Vec<Order> {
    let mut canonical: Vec<Order> = orders.to_vec();
    canonical.sort_by_key(|o| o.arrival_seq);

    let (mut priority, mut rest): (Vec<Order>, Vec<Order>) =
        canonical.into_iter().partition(Order::has_priority);

    priority.sort_by_key(|o| (Reverse(o.fields.priority_bid), o.arrival_seq));

    let mut rng = ChaCha20Rng::from_seed(seed.0);
    for i in (1..rest.len()).rev() {
        let j = rng.gen_range(0..=i);
        rest.swap(i, j);
    }

    priority.extend(rest);
    priority
}
