//! Batch registry — owns every batch and mirrors each mutation to its store.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::batch::{Batch, BatchStatus, EventKind, NewBatch};
use crate::feeding_log::FeedingLog;
use crate::store::RecordStore;

/// Dashboard counters for the current batch set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrySummary {
    pub active: usize,
    pub completed: usize,
    /// Active batches whose next feeding is already past.
    pub overdue: usize,
    /// Active batches due within the next 24 hours (overdue ones included).
    pub due_within_24h: usize,
    /// Larvae across all active batches.
    pub total_larvae: u64,
}

/// In-memory batch set backed by a [`RecordStore`].
///
/// The in-memory state is authoritative for the running process. A failed
/// save is logged and otherwise ignored.
pub struct BatchRegistry {
    batches: Vec<Batch>,
    store: Box<dyn RecordStore<Batch>>,
}

impl BatchRegistry {
    /// Load the registry from its store.
    pub fn open(store: Box<dyn RecordStore<Batch>>) -> Self {
        let batches = store.load();
        tracing::info!("🐛 Loaded {} batches from {}", batches.len(), store.describe());
        Self { batches, store }
    }

    /// Add a new batch. Returns false without touching anything if the id
    /// is already taken or the input is invalid.
    pub fn add(&mut self, new: NewBatch) -> bool {
        if let Err(e) = new.validate() {
            tracing::warn!("⚠️ Rejected batch '{}': {e}", new.batch_id);
            return false;
        }
        if self.get(&new.batch_id).is_some() {
            tracing::warn!("⚠️ Batch '{}' already exists", new.batch_id);
            return false;
        }
        tracing::info!(
            "🐛 Batch added: '{}' ({} x {}, every {}d)",
            new.batch_id,
            new.larval_count,
            new.species,
            new.feeding_interval_days
        );
        self.batches.push(Batch::from_new(new));
        self.save();
        true
    }

    pub fn get(&self, batch_id: &str) -> Option<&Batch> {
        self.batches.iter().find(|b| b.batch_id == batch_id)
    }

    /// Every batch, in insertion order.
    pub fn all(&self) -> &[Batch] {
        &self.batches
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Active batches, soonest due first.
    pub fn list_active(&self) -> Vec<Batch> {
        let mut active: Vec<Batch> = self
            .batches
            .iter()
            .filter(|b| b.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|b| b.next_feeding_due);
        active
    }

    /// Record a feeding at the current time.
    pub fn mark_fed(&mut self, batch_id: &str, log: &mut FeedingLog) -> bool {
        self.mark_fed_at(batch_id, Utc::now(), log)
    }

    /// Record a feeding at `now`: reschedules, bumps the counter and logs it.
    /// Unknown and completed batches are a silent no-op (returns false).
    pub fn mark_fed_at(&mut self, batch_id: &str, now: DateTime<Utc>, log: &mut FeedingLog) -> bool {
        let Some(batch) = self.batches.iter_mut().find(|b| b.batch_id == batch_id) else {
            tracing::debug!("mark_fed: unknown batch '{batch_id}'");
            return false;
        };
        if !batch.is_active() {
            tracing::debug!("mark_fed: batch '{batch_id}' is {}", batch.status);
            return false;
        }
        let Some(next_due) = batch.next_due_after(now) else {
            tracing::warn!(
                "⚠️ Batch '{batch_id}': interval of {}d puts the next feeding out of range",
                batch.feeding_interval_days
            );
            return false;
        };
        batch.next_feeding_due = next_due;
        batch.total_feedings += 1;
        let total = batch.total_feedings;
        tracing::info!("🍃 Batch '{}' fed (#{total})", batch_id);

        log.append_at(
            batch_id,
            EventKind::Fed,
            &format!("Batch fed (Total feedings: {total})"),
            now,
        );
        self.save();
        true
    }

    /// Move a batch to `Completed`. Already-completed or unknown ids are
    /// no-ops: nothing is logged and false is returned.
    pub fn complete(&mut self, batch_id: &str, log: &mut FeedingLog) -> bool {
        let Some(batch) = self.batches.iter_mut().find(|b| b.batch_id == batch_id) else {
            tracing::debug!("complete: unknown batch '{batch_id}'");
            return false;
        };
        if batch.status == BatchStatus::Completed {
            return false;
        }
        batch.status = BatchStatus::Completed;
        tracing::info!("✅ Batch '{}' completed", batch_id);

        log.append(batch_id, EventKind::Completed, "Batch marked as completed");
        self.save();
        true
    }

    /// Drop every non-active batch. Returns how many were removed.
    pub fn purge_completed(&mut self) -> usize {
        let before = self.batches.len();
        self.batches.retain(|b| b.is_active());
        let removed = before - self.batches.len();
        self.save();
        if removed > 0 {
            tracing::info!("🧹 Purged {removed} completed batches");
        }
        removed
    }

    /// Remember when a reminder last went out for this batch.
    pub fn record_notification(&mut self, batch_id: &str, at: DateTime<Utc>) {
        if let Some(batch) = self.batches.iter_mut().find(|b| b.batch_id == batch_id) {
            batch.last_notified = Some(at);
            self.save();
        }
    }

    pub fn summary(&self, now: DateTime<Utc>) -> RegistrySummary {
        let mut summary = RegistrySummary::default();
        for batch in &self.batches {
            if !batch.is_active() {
                summary.completed += 1;
                continue;
            }
            summary.active += 1;
            summary.total_larvae += batch.larval_count as u64;
            if batch.overdue_by(now).is_some() {
                summary.overdue += 1;
            }
            if batch.due_within(now, Duration::hours(24)) {
                summary.due_within_24h += 1;
            }
        }
        summary
    }

    /// Write the current state to the store, logging any failure.
    pub fn save(&self) {
        if let Err(e) = self.store.save(&self.batches) {
            tracing::warn!("⚠️ Failed to save batches to {}: {e}", self.store.describe());
        }
    }
}
