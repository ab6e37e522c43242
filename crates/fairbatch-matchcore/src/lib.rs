//! # fairbatch-matchcore
//!
//! **Pure compute plane for FairBatch.**
//!
//! MatchCore turns a batch's revealed orders and its finalized seed into a
//! deterministic clearing result. It has:
//!
//! - **Zero side effects**: no ledger access, no balance checks
//! - **Deterministic output**: same orders + same seed → same fills and root
//! - **Fair ordering**: seed-driven Fisher-Yates, priority bidders first
//! - **Uniform pricing**: one clearing price per pair, every fill at that price
//!
//! ```text
//! Order[] + Seed ──► shuffle() ──► clear_batch() ──► ClearingResult
//!                                     │
//!                                     └─ per pair: compute_clearing_price()
//! ```

pub mod clearing;
pub mod determinism;
pub mod matcher;
pub mod sequencer;

pub use clearing::{CurvePoint, compute_clearing_price};
pub use determinism::{compute_fill_root, verify_fill_root};
pub use matcher::clear_batch;
pub use sequencer::shuffle;
