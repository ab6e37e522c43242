//! # fairbatch-types
//!
//! Shared types, errors, and configuration for the **FairBatch** auction engine.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`BatchId`], [`ParticipantId`], [`CommitmentId`], [`TradingPair`]
//! - **Hashes and secrets**: [`Digest`], [`Secret`], [`Seed`]
//! - **Order model**: [`OrderFields`], [`Order`], [`Direction`]
//! - **Commitment model**: [`Commitment`], [`RevealStatus`], [`compute_digest`]
//! - **Batch model**: [`BatchPhase`], [`BatchSchedule`], [`BatchSummary`]
//! - **Clearing model**: [`Fill`], [`PairClearing`], [`ClearingResult`]
//! - **Settlement model**: [`SettlementReport`], [`OrderSettlement`], [`OrderOutcome`]
//! - **Rewards and slashing**: [`RewardAllocation`], [`RewardShare`], [`SlashEvent`]
//! - **Ledger model**: [`BalanceEntry`], [`Account`], [`Transfer`], [`Asset`]
//! - **Configuration**: [`ProtocolConfig`]
//! - **Collaborators**: [`PricingProvider`], [`AccessPolicy`], [`Treasury`], [`VolatilityClassifier`]
//! - **Errors**: [`FairbatchError`] with `FB_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

/// Upper-case `Display` labels for fieldless enums.
macro_rules! labels {
    ($ty:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(match self {
                    $(Self::$variant => $label,)+
                })
            }
        }
    };
}

pub mod amount;
pub mod balance;
pub mod batch;
pub mod clearing;
pub mod collaborators;
pub mod commitment;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod ids;
pub mod order;
pub mod reward;
pub mod settlement;
pub mod slash;

// Re-export all primary types at crate root for ergonomic imports:
//   use fairbatch_types::{Order, Commitment, BatchPhase, ...};

pub use balance::*;
pub use batch::*;
pub use clearing::*;
pub use collaborators::*;
pub use commitment::*;
pub use config::*;
pub use crypto::*;
pub use error::*;
pub use ids::*;
pub use order::*;
pub use reward::*;
pub use settlement::*;
pub use slash::*;

// Constants and amount helpers are accessed via their modules
// (`fairbatch_types::constants::FOO`, `fairbatch_types::amount::truncate`).
