//! # fairbatch-ingress
//!
//! **Commit/Reveal Plane**: escrow custody, access checks, sealed
//! commitments, reveal validation with slashing, and entropy aggregation.
//!
//! ## Architecture
//!
//! 1. **EscrowLedger**: per-(account, asset) available/frozen balances with
//!    all-or-nothing transfer lists
//! 2. **AccessGate**: hard gate on collateral and priority bids
//! 3. **CommitmentStore**: one batch's sealed commitments, arrival ordered
//! 4. **RevealValidator**: opens commitments, slashes invalid or missing reveals
//! 5. **EntropyAggregator**: XOR of honest secrets → batch seed
//!
//! ## Flow
//!
//! ```text
//! COMMIT: AccessGate.validate_commit() → EscrowLedger.freeze() → CommitmentStore
//! REVEAL: RevealValidator.reveal() → Order + EntropyAggregator.absorb()
//! CLOSE:  RevealValidator.close_reveal_phase() → SlashEvents
//!         EntropyAggregator.finalize() → Seed → MatchCore
//! ```

pub mod access_gate;
pub mod commitment_store;
pub mod entropy;
pub mod ledger;
pub mod reveal;

pub use access_gate::AccessGate;
pub use commitment_store::{CommitRequest, CommitmentStore};
pub use entropy::EntropyAggregator;
pub use ledger::EscrowLedger;
pub use reveal::{RevealRequest, RevealValidator};
