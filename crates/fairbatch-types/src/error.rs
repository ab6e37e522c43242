//! Error types for the FairBatch auction engine.
//!
//! All errors use the `FB_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Commit errors
//! - 2xx: Reveal errors
//! - 3xx: Escrow / balance errors
//! - 4xx: Lifecycle errors
//! - 5xx: Clearing errors
//! - 6xx: Settlement errors
//! - 7xx: Reward errors
//! - 9xx: General / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{BatchId, BatchPhase, CommitmentId, Digest, ParticipantId, TradingPair};

/// Central error enum for all FairBatch operations.
#[derive(Debug, Error)]
pub enum FairbatchError {
    // =================================================================
    // Commit Errors (1xx)
    // =================================================================
    /// Posted collateral is below the protocol minimum.
    #[error("FB_ERR_100: Insufficient collateral: need {minimum}, posted {posted}")]
    InsufficientCollateral { minimum: Decimal, posted: Decimal },

    /// The participant already committed to this batch.
    #[error("FB_ERR_101: Participant {participant} already committed to {batch}")]
    DuplicateCommitment {
        batch: BatchId,
        participant: ParticipantId,
    },

    /// Another participant already committed the identical digest.
    #[error("FB_ERR_102: Digest {digest} already committed to {batch}")]
    DigestCollision { batch: BatchId, digest: Digest },

    /// The access collaborator's limit does not cover the request.
    #[error("FB_ERR_103: Access denied for {participant}: requested {requested}, limit {limit}")]
    AccessDenied {
        participant: ParticipantId,
        requested: Decimal,
        limit: Decimal,
    },

    /// The batch has reached its commitment capacity.
    #[error("FB_ERR_104: Batch {0} is full")]
    BatchFull(BatchId),

    // =================================================================
    // Reveal Errors (2xx)
    // =================================================================
    /// The revealed order does not match its commitment. The commitment
    /// has already been slashed when this is returned.
    #[error("FB_ERR_200: Invalid reveal for {commitment}: {reason}")]
    InvalidReveal {
        commitment: CommitmentId,
        reason: String,
    },

    /// The commitment was already revealed or slashed.
    #[error("FB_ERR_201: Commitment {0} already resolved")]
    CommitmentResolved(CommitmentId),

    /// No commitment with this id exists.
    #[error("FB_ERR_202: Commitment not found: {0}")]
    CommitmentNotFound(CommitmentId),

    /// The batch seed was already derived.
    #[error("FB_ERR_203: Seed already finalized for {0}")]
    SeedAlreadyFinalized(BatchId),

    // =================================================================
    // Escrow / Balance Errors (3xx)
    // =================================================================
    /// Not enough available balance to perform the operation.
    #[error("FB_ERR_300: Insufficient available balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    /// Not enough frozen (escrowed) balance to consume or release.
    #[error("FB_ERR_301: Insufficient frozen balance")]
    InsufficientFrozen,

    /// A transfer would route escrowed funds outside escrow custody.
    #[error("FB_ERR_302: Double-spend attempt: {reason}")]
    DoubleSpendAttempt { reason: String },

    /// Withdrawals are locked while a batch is settling.
    #[error("FB_ERR_303: Withdrawals locked while {0} is settling")]
    WithdrawLocked(BatchId),

    /// A deposit, withdrawal or transfer amount is negative or zero.
    #[error("FB_ERR_304: Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: Decimal, reason: String },

    // =================================================================
    // Lifecycle Errors (4xx)
    // =================================================================
    /// An operation was attempted outside its valid lifecycle phase.
    #[error("FB_ERR_400: Phase violation for {batch}: expected {expected}, got {actual}")]
    PhaseViolation {
        batch: BatchId,
        expected: BatchPhase,
        actual: BatchPhase,
    },

    /// A deadline-gated transition was attempted too early, or a
    /// deadline-bounded operation too late.
    #[error("FB_ERR_401: Deadline violation for {batch} in {phase}: {reason}")]
    DeadlineViolation {
        batch: BatchId,
        phase: BatchPhase,
        reason: String,
    },

    /// No batch with this id exists.
    #[error("FB_ERR_402: Batch not found: {0}")]
    BatchNotFound(BatchId),

    /// A batch is still accepting commitments or reveals.
    #[error("FB_ERR_403: Batch {0} is still open")]
    BatchStillOpen(BatchId),

    /// The audit log already holds an archive for this batch.
    #[error("FB_ERR_404: Archive already exists for {0}")]
    ArchiveExists(BatchId),

    // =================================================================
    // Clearing Errors (5xx)
    // =================================================================
    /// No crossing price exists for the pair.
    #[error("FB_ERR_500: Insufficient liquidity for {0}")]
    InsufficientLiquidity(TradingPair),

    // =================================================================
    // Settlement Errors (6xx)
    // =================================================================
    /// Routing proceeds to a downstream collaborator failed.
    #[error("FB_ERR_600: Settlement failure: {reason}")]
    SettlementFailure { reason: String },

    /// Supply conservation invariant violated.
    #[error("FB_ERR_601: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },

    // =================================================================
    // Reward Errors (7xx)
    // =================================================================
    /// The reward for this (batch, participant) was already claimed.
    #[error("FB_ERR_700: Reward already claimed by {participant} for {batch}")]
    AlreadyClaimed {
        batch: BatchId,
        participant: ParticipantId,
    },

    /// No reward share exists for this (batch, participant).
    #[error("FB_ERR_701: No reward for {participant} in {batch}")]
    NoReward {
        batch: BatchId,
        participant: ParticipantId,
    },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("FB_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("FB_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, inconsistent parameters, etc.).
    #[error("FB_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk, network).
    #[error("FB_ERR_903: I/O error: {0}")]
    Io(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, FairbatchError>;

impl From<std::io::Error> for FairbatchError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for FairbatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
