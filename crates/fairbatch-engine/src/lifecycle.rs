//! Batch Lifecycle Controller.
//!
//! The only component that moves a batch between phases. It owns the escrow
//! ledger and every settlement-plane guard, holds the open and settling
//! batches, and runs the settlement stages in a fixed order:
//!
//! ```text
//!  open_batch ─► COMMIT ──begin_reveal──► REVEAL ──close_batch──► SETTLING ──► CLOSED
//!                  │                        │                        │
//!               commit()                 reveal()           slash non-reveals
//!                                                           seed → sequence → clear
//!                                                           settle → rewards → route
//!                                                           archive
//! ```
//!
//! Each stage output is cached on the [`Batch`]. If a stage fails the batch
//! stays in SETTLING and `finalize` (or the next `advance`) resumes from the
//! first stage without output. Withdrawals are refused while any batch is
//! SETTLING.
//!
//! Routing only sweeps the ledger and queues treasury deliveries; the batch
//! closes whether or not the collaborator accepted them. Every `advance`
//! retries the queue.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fairbatch_ingress::{AccessGate, CommitRequest, EscrowLedger, RevealRequest, RevealValidator};
use fairbatch_matchcore::{clear_batch, shuffle};
use fairbatch_settlement::{
    Delivery, InventoryBoundPricing, ProceedsRouter, RewardAllocator, SettlementExecutor,
    SupplyConservation, WithdrawLock,
};
use fairbatch_types::{
    Account, AccessPolicy, AssetAmount, BalanceEntry, BatchId, BatchPhase, BatchSchedule,
    CommitmentId, ContributionInput, FairbatchError, FixedVolatility, InMemoryTreasury, NoPool,
    OpenAccess, Order, ParticipantId, PricingProvider, ProtocolConfig, Result, RewardAllocation,
    TradingPair, Treasury, VolatilityClassifier,
};
use rust_decimal::Decimal;

use crate::audit_log::{AuditLog, BatchArchive};
use crate::batch::Batch;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// External services the controller calls into.
#[derive(Clone)]
pub struct Collaborators {
    pub pricing: Arc<dyn PricingProvider>,
    pub access: Arc<dyn AccessPolicy>,
    pub treasury: Arc<dyn Treasury>,
    pub volatility: Arc<dyn VolatilityClassifier>,
}

impl Collaborators {
    /// No pool, open access, an in-memory treasury and medium volatility.
    #[must_use]
    pub fn standalone() -> Self {
        Self {
            pricing: Arc::new(NoPool),
            access: Arc::new(OpenAccess),
            treasury: Arc::new(InMemoryTreasury::new()),
            volatility: Arc::new(FixedVolatility::default()),
        }
    }

    #[must_use]
    pub fn with_pricing(mut self, pricing: Arc<dyn PricingProvider>) -> Self {
        self.pricing = pricing;
        self
    }

    #[must_use]
    pub fn with_access(mut self, access: Arc<dyn AccessPolicy>) -> Self {
        self.access = access;
        self
    }

    #[must_use]
    pub fn with_treasury(mut self, treasury: Arc<dyn Treasury>) -> Self {
        self.treasury = treasury;
        self
    }

    #[must_use]
    pub fn with_volatility(mut self, volatility: Arc<dyn VolatilityClassifier>) -> Self {
        self.volatility = volatility;
        self
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::standalone()
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Drives batches through their lifecycle.
#[derive(Debug)]
pub struct Controller {
    config: ProtocolConfig,
    collaborators: Collaborators,
    gate: AccessGate,
    validator: RevealValidator,
    ledger: EscrowLedger,
    supply: SupplyConservation,
    withdraw_lock: WithdrawLock,
    executor: SettlementExecutor,
    allocator: RewardAllocator,
    router: ProceedsRouter,
    audit: AuditLog,
    batches: BTreeMap<BatchId, Batch>,
    next_batch: BatchId,
}

impl Controller {
    /// Build a controller around a validated config.
    ///
    /// # Errors
    /// `Configuration` if the config is inconsistent.
    pub fn new(config: ProtocolConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let gate = AccessGate::new(Arc::clone(&collaborators.access), config.min_collateral);
        let validator = RevealValidator::new(gate.clone(), &config);
        Ok(Self {
            executor: SettlementExecutor::new(&config),
            allocator: RewardAllocator::new(&config),
            gate,
            validator,
            ledger: EscrowLedger::new(),
            supply: SupplyConservation::new(),
            withdraw_lock: WithdrawLock::new(),
            router: ProceedsRouter::new(),
            audit: AuditLog::new(),
            batches: BTreeMap::new(),
            next_batch: BatchId(1),
            config,
            collaborators,
        })
    }

    // -----------------------------------------------------------------
    // Custody
    // -----------------------------------------------------------------

    /// Credit external funds to a participant's custody.
    pub fn deposit(&mut self, participant: ParticipantId, asset: &str, amount: Decimal) -> Result<()> {
        self.ledger.deposit(&Account::Participant(participant), asset, amount)?;
        self.supply.record_deposit(asset, amount);
        Ok(())
    }

    /// Seed a pair's pool inventory, used when batch flow fills against the pool.
    pub fn fund_pool(&mut self, pair: &TradingPair, asset: &str, amount: Decimal) -> Result<()> {
        self.ledger.deposit(&Account::Pool(pair.clone()), asset, amount)?;
        self.supply.record_deposit(asset, amount);
        Ok(())
    }

    /// Pay custody out of the system. Refused while any batch is settling.
    pub fn withdraw(&mut self, participant: ParticipantId, asset: &str, amount: Decimal) -> Result<()> {
        self.withdraw_lock.check_withdraw()?;
        self.ledger.withdraw(participant, asset, amount)?;
        self.supply.record_withdrawal(asset, amount);
        tracing::info!(participant = %participant, asset, %amount, "withdrawal");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Participant operations
    // -----------------------------------------------------------------

    /// Open the next batch.
    ///
    /// # Errors
    /// `BatchStillOpen` while another batch accepts commitments or reveals.
    pub fn open_batch(&mut self, now: DateTime<Utc>) -> Result<BatchId> {
        if let Some(open) = self.open_batch_id() {
            return Err(FairbatchError::BatchStillOpen(open));
        }
        let schedule =
            BatchSchedule::starting_at(now, self.config.commit_window, self.config.reveal_window)?;
        let id = self.next_batch;
        self.next_batch = id.next();
        self.batches
            .insert(id, Batch::new(id, schedule, self.config.max_commitments_per_batch));
        self.withdraw_lock.on_phase(id, BatchPhase::Commit);

        tracing::info!(
            batch = id.0,
            commit_deadline = %schedule.commit_deadline,
            reveal_deadline = %schedule.reveal_deadline,
            "batch opened"
        );
        Ok(id)
    }

    /// Accept a sealed commitment into a batch.
    pub fn commit(
        &mut self,
        batch_id: BatchId,
        request: CommitRequest,
        now: DateTime<Utc>,
    ) -> Result<CommitmentId> {
        let batch = self
            .batches
            .get_mut(&batch_id)
            .ok_or(FairbatchError::BatchNotFound(batch_id))?;
        let phase = batch.phase();
        batch.store.commit(&mut self.ledger, &self.gate, phase, request, now)
    }

    /// Open a commitment. An invalid reveal is slashed before the error returns.
    pub fn reveal(
        &mut self,
        batch_id: BatchId,
        request: RevealRequest,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let batch = self
            .batches
            .get_mut(&batch_id)
            .ok_or(FairbatchError::BatchNotFound(batch_id))?;
        let phase = batch.phase();
        let order = self.validator.reveal(
            &mut batch.store,
            &mut batch.entropy,
            &mut self.ledger,
            phase,
            request,
            now,
        )?;
        batch.orders.push(order.clone());
        Ok(order)
    }

    /// Attach externally measured contribution facts to a batch.
    ///
    /// # Errors
    /// `DeadlineViolation` once the batch's rewards have been allocated.
    pub fn submit_contributions(
        &mut self,
        batch_id: BatchId,
        inputs: impl IntoIterator<Item = ContributionInput>,
    ) -> Result<()> {
        let batch = self
            .batches
            .get_mut(&batch_id)
            .ok_or(FairbatchError::BatchNotFound(batch_id))?;
        if batch.stages.rewards.is_some() || batch.phase() == BatchPhase::Closed {
            return Err(FairbatchError::DeadlineViolation {
                batch: batch_id,
                phase: batch.phase(),
                reason: "rewards already allocated".into(),
            });
        }
        batch.contributions.extend(inputs);
        Ok(())
    }

    /// Credit a participant's reward shares for a closed batch.
    pub fn claim(&mut self, batch_id: BatchId, participant: ParticipantId) -> Result<Vec<AssetAmount>> {
        if !self.batches.contains_key(&batch_id) {
            return Err(FairbatchError::BatchNotFound(batch_id));
        }
        self.allocator.claim(&mut self.ledger, batch_id, participant)
    }

    // -----------------------------------------------------------------
    // Phase transitions
    // -----------------------------------------------------------------

    /// COMMIT → REVEAL once the commit deadline has passed.
    pub fn begin_reveal(&mut self, batch_id: BatchId, now: DateTime<Utc>) -> Result<()> {
        let batch = self
            .batches
            .get_mut(&batch_id)
            .ok_or(FairbatchError::BatchNotFound(batch_id))?;
        batch.require(BatchPhase::Commit)?;
        if now <= batch.schedule().commit_deadline {
            return Err(FairbatchError::DeadlineViolation {
                batch: batch_id,
                phase: BatchPhase::Commit,
                reason: format!("commit window open until {}", batch.schedule().commit_deadline),
            });
        }
        batch.transition(BatchPhase::Reveal)?;
        self.withdraw_lock.on_phase(batch_id, BatchPhase::Reveal);
        Ok(())
    }

    /// REVEAL → SETTLING once the reveal deadline has passed, then run the
    /// settlement stages. Returns the phase the batch ended in.
    pub fn close_batch(&mut self, batch_id: BatchId, now: DateTime<Utc>) -> Result<BatchPhase> {
        let batch = self
            .batches
            .get_mut(&batch_id)
            .ok_or(FairbatchError::BatchNotFound(batch_id))?;
        batch.require(BatchPhase::Reveal)?;
        if now <= batch.schedule().reveal_deadline {
            return Err(FairbatchError::DeadlineViolation {
                batch: batch_id,
                phase: BatchPhase::Reveal,
                reason: format!("reveal window open until {}", batch.schedule().reveal_deadline),
            });
        }

        let slashes = self
            .validator
            .close_reveal_phase(&mut batch.store, &mut self.ledger)?;
        if !slashes.is_empty() {
            tracing::warn!(batch = batch_id.0, count = slashes.len(), "non-reveals slashed");
        }
        batch.transition(BatchPhase::Settling)?;
        self.withdraw_lock.on_phase(batch_id, BatchPhase::Settling);

        self.run_stages(batch_id, now)
    }

    /// Resume a settling batch. Closed batches return `Closed` unchanged.
    pub fn finalize(&mut self, batch_id: BatchId, now: DateTime<Utc>) -> Result<BatchPhase> {
        match self.phase(batch_id)? {
            BatchPhase::Closed => Ok(BatchPhase::Closed),
            BatchPhase::Settling => self.run_stages(batch_id, now),
            actual => Err(FairbatchError::PhaseViolation {
                batch: batch_id,
                expected: BatchPhase::Settling,
                actual,
            }),
        }
    }

    /// Apply every transition that is due at `now`, oldest batch first.
    ///
    /// Returns the phases reached. Failures are logged and left for the
    /// next call.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Vec<(BatchId, BatchPhase)> {
        self.retry_deliveries();
        let ids: Vec<BatchId> = self
            .batches
            .iter()
            .filter(|(_, b)| b.phase() != BatchPhase::Closed)
            .map(|(id, _)| *id)
            .collect();

        let mut reached = Vec::new();
        for id in ids {
            loop {
                let Some(batch) = self.batches.get(&id) else {
                    break;
                };
                let before = batch.phase();
                let schedule = *batch.schedule();
                let step = match before {
                    BatchPhase::Commit if now > schedule.commit_deadline => {
                        self.begin_reveal(id, now).map(|()| BatchPhase::Reveal)
                    }
                    BatchPhase::Reveal if now > schedule.reveal_deadline => self.close_batch(id, now),
                    BatchPhase::Settling => self.finalize(id, now),
                    _ => break,
                };
                match step {
                    Ok(after) if after != before => reached.push((id, after)),
                    Ok(_) => break,
                    Err(err) => {
                        let stage = self.batches.get(&id).and_then(|b| b.stages().pending_stage());
                        tracing::warn!(batch = id.0, phase = %before, ?stage, error = %err, "transition deferred");
                        break;
                    }
                }
            }
        }
        reached
    }

    /// Retry queued treasury deliveries. Returns how many are still queued.
    pub fn retry_deliveries(&mut self) -> usize {
        if self.router.pending().next().is_none() {
            return 0;
        }
        let remaining = self.router.retry_pending(self.collaborators.treasury.as_ref());
        if remaining > 0 {
            tracing::warn!(remaining, "treasury deliveries still queued");
        }
        remaining
    }

    /// Seed → sequence → clearing → settlement → rewards → routing → archive.
    fn run_stages(&mut self, batch_id: BatchId, now: DateTime<Utc>) -> Result<BatchPhase> {
        let batch = self
            .batches
            .get_mut(&batch_id)
            .ok_or(FairbatchError::BatchNotFound(batch_id))?;
        batch.require(BatchPhase::Settling)?;

        if batch.stages.seed.is_none() {
            let deadline = batch.store.schedule().reveal_deadline;
            batch.stages.seed = Some(batch.entropy.finalize(batch_id, deadline)?);
        }
        let seed = cached(batch.stages.seed.as_ref(), batch_id, "seed")?;

        if batch.stages.sequence.is_none() {
            batch.stages.sequence = Some(shuffle(&batch.orders, seed));
        }
        let sequence = cached(batch.stages.sequence.as_deref(), batch_id, "sequence")?;

        if batch.stages.clearing.is_none() {
            let pricing = InventoryBoundPricing::new(self.collaborators.pricing.as_ref(), &self.ledger);
            batch.stages.clearing = Some(clear_batch(batch_id, sequence, &pricing, &self.config));
        }
        let clearing = cached(batch.stages.clearing.as_ref(), batch_id, "clearing")?;

        if batch.stages.settlement.is_none() {
            let report = self
                .executor
                .settle(
                    &mut self.ledger,
                    &self.supply,
                    self.collaborators.pricing.as_ref(),
                    clearing,
                    sequence,
                    batch.store.commitments(),
                )
                .inspect_err(|err| {
                    tracing::error!(batch = batch_id.0, error = %err, "settlement failed, batch stays SETTLING");
                })?;
            batch.stages.settlement = Some(report);
        }
        let report = cached(batch.stages.settlement.as_ref(), batch_id, "settlement")?;

        if batch.stages.rewards.is_none() {
            let allocation = self.allocator.allocate(
                report,
                &batch.contributions,
                batch_id.0.saturating_sub(1),
                self.collaborators.volatility.as_ref(),
                now,
            )?;
            batch.stages.rewards = Some(allocation);
        }
        let allocation = cached(batch.stages.rewards.as_ref(), batch_id, "rewards")?;

        if batch.stages.routing.is_none() {
            let status = self.router.route(
                &mut self.ledger,
                self.collaborators.treasury.as_ref(),
                allocation,
                batch.store.slashes(),
            )?;
            batch.stages.routing = Some(status);
        }

        let archive = BatchArchive {
            summary: batch.summary(now)?,
            clearing: clearing.clone(),
            settlement: report.clone(),
            contributions: allocation.contributions.clone(),
            rewards: allocation.shares.clone(),
            slashes: batch.store.slashes().to_vec(),
        };
        self.audit.append(archive)?;
        batch.transition(BatchPhase::Closed)?;
        self.withdraw_lock.on_phase(batch_id, BatchPhase::Closed);
        self.supply.verify_ledger(&self.ledger)?;

        tracing::info!(
            batch = batch_id.0,
            commitments = batch.store.len(),
            revealed = batch.orders.len(),
            slashed = batch.store.slashes().len(),
            "batch closed"
        );
        Ok(BatchPhase::Closed)
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    #[must_use]
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    #[must_use]
    pub fn batch(&self, batch_id: BatchId) -> Option<&Batch> {
        self.batches.get(&batch_id)
    }

    /// # Errors
    /// `BatchNotFound` for an unknown id.
    pub fn phase(&self, batch_id: BatchId) -> Result<BatchPhase> {
        self.batches
            .get(&batch_id)
            .map(Batch::phase)
            .ok_or(FairbatchError::BatchNotFound(batch_id))
    }

    /// The batch currently accepting commitments or reveals.
    #[must_use]
    pub fn open_batch_id(&self) -> Option<BatchId> {
        self.batches
            .values()
            .find(|b| b.phase().is_open())
            .map(Batch::id)
    }

    #[must_use]
    pub fn balance(&self, participant: ParticipantId, asset: &str) -> BalanceEntry {
        self.ledger.participant_balance(participant, asset)
    }

    #[must_use]
    pub fn ledger(&self) -> &EscrowLedger {
        &self.ledger
    }

    #[must_use]
    pub fn allocation(&self, batch_id: BatchId) -> Option<&RewardAllocation> {
        self.batches.get(&batch_id)?.stages().rewards.as_ref()
    }

    #[must_use]
    pub fn archive(&self, batch_id: BatchId) -> Option<&BatchArchive> {
        self.audit.get(batch_id)
    }

    #[must_use]
    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Treasury deliveries the collaborator has not accepted yet.
    #[must_use]
    pub fn pending_deliveries(&self) -> Vec<(BatchId, Delivery)> {
        self.router
            .pending()
            .map(|(batch_id, delivery)| (batch_id, delivery.clone()))
            .collect()
    }

    #[must_use]
    pub fn withdrawals_allowed(&self) -> bool {
        self.withdraw_lock.withdrawals_allowed()
    }

    /// Ledger supply per asset against recorded deposits and withdrawals.
    pub fn verify_supply(&self) -> Result<()> {
        self.supply.verify_ledger(&self.ledger)
    }
}

fn cached<'a, T: ?Sized>(slot: Option<&'a T>, batch_id: BatchId, stage: &str) -> Result<&'a T> {
    slot.ok_or_else(|| FairbatchError::Internal(format!("{batch_id}: {stage} output missing")))
}
