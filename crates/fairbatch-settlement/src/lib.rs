//! # fairbatch-settlement
//!
//! **Finality Plane**: applies a batch's clearing result to the escrow
//! ledger, allocates its proceeds, and delivers protocol amounts to the
//! treasury.
//!
//! ## Architecture
//!
//! The Finality Plane receives a [`ClearingResult`] from MatchCore and:
//! 1. Builds every fill, fee and collateral return as one transfer list
//! 2. Applies it atomically to the [`EscrowLedger`]
//! 3. Checks supply conservation (deposits - withdrawals per asset)
//! 4. Scores contributions and splits proceeds into reward shares
//! 5. Sweeps the treasury portion and queues treasury deliveries, retried
//!    until the collaborator accepts them
//!
//! ```text
//! ClearingResult ──► SettlementExecutor ──► SettlementReport
//!                                               │
//!                        RewardAllocator ◄──────┘──► RewardAllocation
//!                                                        │
//!                        ProceedsRouter  ◄───────────────┘──► Treasury
//! ```
//!
//! Every stage caches its output per batch, so a failed stage is retried
//! as a whole without repeating the stages before it.
//!
//! [`ClearingResult`]: fairbatch_types::ClearingResult
//! [`EscrowLedger`]: fairbatch_ingress::EscrowLedger

pub mod executor;
pub mod idempotency;
pub mod pool_inventory;
pub mod rewards;
pub mod routing;
pub mod supply_conservation;
pub mod withdraw_lock;

pub use executor::{SettlementExecutor, SettlementPlan, plan_settlement};
pub use idempotency::IdempotencyGuard;
pub use pool_inventory::InventoryBoundPricing;
pub use rewards::RewardAllocator;
pub use routing::{Delivery, ProceedsRouter, RoutingStatus};
pub use supply_conservation::SupplyConservation;
pub use withdraw_lock::WithdrawLock;
