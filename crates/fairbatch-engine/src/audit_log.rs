//! Append-only batch archive.
//!
//! Every closed batch leaves exactly one [`BatchArchive`]. Archives are never
//! replaced; the log can be exported to and rebuilt from JSON lines, one
//! archive per line in batch order.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use fairbatch_types::{
    BatchId, BatchSummary, ClearingResult, ContributionRecord, FairbatchError, Result,
    RewardShare, SettlementReport, SlashEvent,
};
use serde::{Deserialize, Serialize};

/// Everything kept about a closed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchArchive {
    pub summary: BatchSummary,
    pub clearing: ClearingResult,
    pub settlement: SettlementReport,
    pub contributions: Vec<ContributionRecord>,
    pub rewards: Vec<RewardShare>,
    pub slashes: Vec<SlashEvent>,
}

impl BatchArchive {
    #[must_use]
    pub fn batch_id(&self) -> BatchId {
        self.summary.batch_id
    }
}

/// Archives keyed by batch id.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    entries: BTreeMap<BatchId, BatchArchive>,
}

impl AuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an archive.
    ///
    /// # Errors
    /// `ArchiveExists` if the batch is already archived.
    pub fn append(&mut self, archive: BatchArchive) -> Result<()> {
        let batch_id = archive.batch_id();
        if self.entries.contains_key(&batch_id) {
            return Err(FairbatchError::ArchiveExists(batch_id));
        }
        tracing::debug!(
            batch = batch_id.0,
            fills = archive.clearing.fills().count(),
            slashes = archive.slashes.len(),
            "batch archived"
        );
        self.entries.insert(batch_id, archive);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, batch_id: BatchId) -> Option<&BatchArchive> {
        self.entries.get(&batch_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BatchArchive> {
        self.entries.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write one JSON object per archive, in batch order.
    pub fn export_jsonl(&self, mut out: impl Write) -> Result<()> {
        for archive in self.entries.values() {
            serde_json::to_writer(&mut out, archive)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(())
    }

    /// Rebuild a log from JSON lines. Blank lines are skipped.
    ///
    /// # Errors
    /// `Serialization` naming the offending line, or `ArchiveExists` if a
    /// batch appears twice.
    pub fn import_jsonl(input: impl BufRead) -> Result<Self> {
        let mut log = Self::new();
        for (idx, line) in input.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let archive: BatchArchive = serde_json::from_str(&line).map_err(|e| {
                FairbatchError::Serialization(format!("line {}: {e}", idx + 1))
            })?;
            log.append(archive)?;
        }
        Ok(log)
    }
}
