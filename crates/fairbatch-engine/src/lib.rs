//! # fairbatch-engine
//!
//! **Orchestration**: the Batch Lifecycle Controller, the append-only batch
//! archive, a lock-protected handle for concurrent callers, the tokio
//! scheduler, and tracing setup.
//!
//! ## Batch pipeline
//!
//! ```text
//!  batch N    │ COMMIT │ REVEAL │ SETTLING ─► CLOSED
//!  batch N+1  │        │        │ COMMIT │ REVEAL │ SETTLING ─► CLOSED
//!             └────────┴────────┴────────┴────────┴──────────────────► time
//! ```
//!
//! A new batch opens as soon as the previous one leaves REVEAL. All state
//! changes go through one [`Controller`]; [`SharedEngine`] serializes
//! callers and [`Scheduler`] drives the clock.

pub mod audit_log;
pub mod batch;
pub mod lifecycle;
pub mod scheduler;
pub mod shared;
pub mod telemetry;

pub use audit_log::{AuditLog, BatchArchive};
pub use batch::{Batch, StageOutputs};
pub use lifecycle::{Collaborators, Controller};
pub use scheduler::Scheduler;
pub use shared::SharedEngine;
