//! System-wide constants for the FairBatch auction engine.

/// Decimal places kept on amounts produced by a division (shares, slashes, fees).
pub const AMOUNT_PRECISION: u32 = 8;

/// Basis-point denominator (100% = 10_000 bps).
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Default COMMIT window in milliseconds.
pub const DEFAULT_COMMIT_MS: u64 = 8_000;

/// Default REVEAL window in milliseconds.
pub const DEFAULT_REVEAL_MS: u64 = 2_000;

/// Default share of collateral forfeited on an invalid or missing reveal.
pub const DEFAULT_SLASH_RATE_BPS: u32 = 5_000;

/// Default per-order ceiling as a share of pool liquidity.
pub const DEFAULT_MAX_TRADE_SIZE_BPS: u32 = 1_000;

/// Default trading fee charged on the received side of every fill.
pub const DEFAULT_FEE_RATE_BPS: u32 = 5;

/// Default split of slashed collateral.
pub const DEFAULT_SLASH_TREASURY_BPS: u32 = 5_000;
pub const DEFAULT_SLASH_INSURANCE_BPS: u32 = 3_000;
pub const DEFAULT_SLASH_BURN_BPS: u32 = 2_000;
pub const DEFAULT_SLASH_BOUNTY_BPS: u32 = 0;

/// Contribution weights (direct / time / scarcity / stability).
pub const DEFAULT_DIRECT_WEIGHT_BPS: u32 = 4_000;
pub const DEFAULT_TIME_WEIGHT_BPS: u32 = 3_000;
pub const DEFAULT_SCARCITY_WEIGHT_BPS: u32 = 2_000;
pub const DEFAULT_STABILITY_WEIGHT_BPS: u32 = 1_000;

/// Number of batches in one emission era (halving schedule).
pub const DEFAULT_BATCHES_PER_ERA: u64 = 1_000_000;

/// Eras beyond this cap emit nothing.
pub const DEFAULT_MAX_ERA: u64 = 32;

/// Maximum commitments accepted into a single batch.
pub const MAX_COMMITMENTS_PER_BATCH: usize = 100_000;

/// Scheduler tick interval in milliseconds.
pub const DEFAULT_TICK_MS: u64 = 100;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "FairBatch";
