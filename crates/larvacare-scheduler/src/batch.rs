//! Batch and log entry definitions — the core data model for feeding schedules.

use chrono::{DateTime, Duration, Utc};
use larvacare_core::{CareError, Result};
use serde::{Deserialize, Serialize};

/// Longest accepted feeding interval (ten years).
pub const MAX_FEEDING_INTERVAL_DAYS: u32 = 3650;

/// A cohort of larvae under care.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Caller-assigned unique ID. Never changes.
    pub batch_id: String,
    /// Species name (not checked against any reference table).
    pub species: String,
    /// Number of larvae in the batch.
    pub larval_count: u32,
    /// Phone number that receives reminders.
    pub contact_address: String,
    /// When the batch was started.
    pub start_date: DateTime<Utc>,
    /// Days between scheduled feedings.
    pub feeding_interval_days: u32,
    /// Single source of truth for "is this batch due".
    pub next_feeding_due: DateTime<Utc>,
    pub status: BatchStatus,
    /// How many times this batch has been fed.
    pub total_feedings: u32,
    /// Free text, opaque to the scheduler.
    #[serde(default)]
    pub notes: String,
    /// Last successful reminder. Mirrors the newest `NotificationSent` log entry.
    #[serde(default)]
    pub last_notified: Option<DateTime<Utc>>,
}

/// Batch lifecycle. `Completed` is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Active,
    Completed,
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchStatus::Active => write!(f, "active"),
            BatchStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Input for [`crate::BatchRegistry::add`].
#[derive(Debug, Clone)]
pub struct NewBatch {
    pub batch_id: String,
    pub species: String,
    pub larval_count: u32,
    pub contact_address: String,
    pub start_date: DateTime<Utc>,
    pub feeding_interval_days: u32,
    pub notes: String,
    pub next_feeding_due: DateTime<Utc>,
}

impl NewBatch {
    /// A batch starting at `start` whose first feeding is one interval later.
    pub fn starting_at(
        batch_id: &str,
        species: &str,
        larval_count: u32,
        contact_address: &str,
        feeding_interval_days: u32,
        start: DateTime<Utc>,
    ) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            species: species.to_string(),
            larval_count,
            contact_address: contact_address.to_string(),
            start_date: start,
            feeding_interval_days,
            notes: String::new(),
            // out-of-range intervals are caught by `validate`
            next_feeding_due: start
                .checked_add_signed(Duration::days(feeding_interval_days as i64))
                .unwrap_or(start),
        }
    }

    /// Check the input can become a batch.
    pub fn validate(&self) -> Result<()> {
        let reason = if self.batch_id.trim().is_empty() {
            "batch_id must not be empty".to_string()
        } else if self.larval_count == 0 {
            "larval_count must be positive".to_string()
        } else if self.feeding_interval_days == 0 {
            "feeding_interval_days must be positive".to_string()
        } else if self.feeding_interval_days > MAX_FEEDING_INTERVAL_DAYS {
            format!("feeding_interval_days must be at most {MAX_FEEDING_INTERVAL_DAYS}")
        } else {
            return Ok(());
        };
        Err(CareError::Validation(reason))
    }
}

impl Batch {
    pub(crate) fn from_new(new: NewBatch) -> Self {
        Self {
            batch_id: new.batch_id,
            species: new.species,
            larval_count: new.larval_count,
            contact_address: new.contact_address,
            start_date: new.start_date,
            feeding_interval_days: new.feeding_interval_days,
            next_feeding_due: new.next_feeding_due,
            status: BatchStatus::Active,
            total_feedings: 0,
            notes: new.notes,
            last_notified: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == BatchStatus::Active
    }

    /// Feeding interval as a duration.
    pub fn interval(&self) -> Duration {
        Duration::days(self.feeding_interval_days as i64)
    }

    /// When the next feeding falls if fed at `fed_at`. `None` if the date
    /// would leave the representable range.
    pub fn next_due_after(&self, fed_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        fed_at.checked_add_signed(self.interval())
    }

    /// How far past due the batch is at `now`, or `None` if not yet due.
    pub fn overdue_by(&self, now: DateTime<Utc>) -> Option<Duration> {
        let late = now - self.next_feeding_due;
        (late > Duration::zero()).then_some(late)
    }

    /// Whether the next feeding falls within `window` from `now` (or is already past).
    pub fn due_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.next_feeding_due <= now + window
    }
}

/// What a log entry records. De-duplication matches on this tag, never on text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Fed,
    Completed,
    NotificationSent,
    Note,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Fed => write!(f, "fed"),
            EventKind::Completed => write!(f, "completed"),
            EventKind::NotificationSent => write!(f, "notification_sent"),
            EventKind::Note => write!(f, "note"),
        }
    }
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    /// Weak reference: the batch may be purged while its history stays.
    pub batch_id: String,
    pub event_kind: EventKind,
    pub activity: String,
}
