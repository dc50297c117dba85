//! # LarvaCare Scheduler
//!
//! Feeding schedules for larval batches and overdue-feeding SMS reminders.
//!
//! ## Architecture
//! ```text
//! Nursery (owned, one per process)
//!   ├── BatchRegistry ── RecordStore<Batch>     (larval_batches)
//!   └── FeedingLog    ── RecordStore<LogEntry>  (feeding_log)
//!
//! NotificationScheduler (tokio interval)
//!   ├── plan:    active batches → overdue past grace → not in cool-down
//!   ├── deliver: NotificationGateway (Twilio / webhook / log)
//!   └── record:  NotificationSent entry + Batch.last_notified
//! ```

pub mod batch;
pub mod dispatch;
pub mod engine;
pub mod feeding_log;
pub mod notify;
pub mod nursery;
pub mod persistence;
pub mod registry;
pub mod store;

pub use batch::{Batch, BatchStatus, EventKind, LogEntry, NewBatch};
pub use dispatch::{LogGateway, TwilioGateway, WebhookGateway, gateway_from_config};
pub use engine::{NotificationScheduler, Reminder, SweepPolicy, SweepReport, spawn_scheduler};
pub use feeding_log::FeedingLog;
pub use notify::{NotificationGateway, format_reminder};
pub use nursery::Nursery;
pub use persistence::SqliteStore;
pub use registry::{BatchRegistry, RegistrySummary};
pub use store::{JsonFileStore, RecordStore};
