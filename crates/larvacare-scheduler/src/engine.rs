//! Notification scheduler — the overdue sweep and the loop that drives it.
//! Uses tokio::interval for zero-overhead ticking (sleeps between sweeps).

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use larvacare_core::config::SchedulerConfig;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::batch::{Batch, EventKind};
use crate::notify::{NotificationGateway, format_reminder};
use crate::nursery::Nursery;

/// Grace period and cool-down for automatic reminders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepPolicy {
    /// A batch must be late by more than this before it is overdue.
    pub grace: Duration,
    /// Minimum gap between two reminders for one batch.
    pub cooldown: Duration,
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self {
            grace: Duration::hours(1),
            cooldown: Duration::hours(4),
        }
    }
}

impl From<&SchedulerConfig> for SweepPolicy {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            grace: Duration::minutes(config.grace_minutes),
            cooldown: Duration::minutes(config.cooldown_minutes),
        }
    }
}

/// One reminder the sweep decided to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub batch_id: String,
    pub to: String,
    pub message: String,
    pub overdue_hours: i64,
}

/// Outcome counters for one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Active batches looked at.
    pub checked: usize,
    /// Within the grace period or not yet due.
    pub not_due: usize,
    /// Overdue but reminded recently.
    pub skipped_cooldown: usize,
    pub notified: usize,
    pub failed: usize,
}

/// Result of the read-only half of a sweep.
#[derive(Debug, Default)]
pub struct SweepPlan {
    pub reminders: Vec<Reminder>,
    pub report: SweepReport,
}

/// Decides which batches need a reminder and sends it through a gateway.
pub struct NotificationScheduler {
    gateway: Arc<dyn NotificationGateway>,
    policy: SweepPolicy,
}

impl NotificationScheduler {
    pub fn new(gateway: Arc<dyn NotificationGateway>, policy: SweepPolicy) -> Self {
        Self { gateway, policy }
    }

    pub fn policy(&self) -> SweepPolicy {
        self.policy
    }

    /// Pick the reminders due at `now`. Reads only.
    pub fn plan(&self, nursery: &Nursery, now: DateTime<Utc>) -> SweepPlan {
        let mut plan = SweepPlan::default();

        for batch in nursery.list_active() {
            plan.report.checked += 1;

            let overdue = match batch.overdue_by(now) {
                Some(late) if late > self.policy.grace => late,
                _ => {
                    plan.report.not_due += 1;
                    continue;
                }
            };

            if self.reminded_recently(nursery, &batch, now) {
                tracing::debug!("⏳ '{}' overdue but in cool-down", batch.batch_id);
                plan.report.skipped_cooldown += 1;
                continue;
            }

            let overdue_hours = overdue.num_hours();
            plan.reminders.push(Reminder {
                batch_id: batch.batch_id.clone(),
                to: batch.contact_address.clone(),
                message: format_reminder(
                    &batch.batch_id,
                    &batch.species,
                    batch.larval_count,
                    overdue_hours,
                ),
                overdue_hours,
            });
        }

        plan
    }

    /// Cool-down check: indexed field first, then the log.
    fn reminded_recently(&self, nursery: &Nursery, batch: &Batch, now: DateTime<Utc>) -> bool {
        if batch
            .last_notified
            .is_some_and(|at| now - at < self.policy.cooldown)
        {
            return true;
        }
        !nursery
            .log()
            .recent_notifications_at(&batch.batch_id, self.policy.cooldown, now)
            .is_empty()
    }

    /// Deliver one reminder. Never holds any lock.
    pub async fn deliver(&self, reminder: &Reminder) -> bool {
        tracing::info!(
            "🔔 Reminding '{}' via {} (overdue {}h)",
            reminder.batch_id,
            self.gateway.name(),
            reminder.overdue_hours
        );
        self.gateway.send(&reminder.to, &reminder.message).await
    }

    /// Record a delivery outcome. Only successes are logged, so failures are
    /// retried on the next sweep.
    pub fn record(nursery: &mut Nursery, reminder: &Reminder, delivered: bool, at: DateTime<Utc>) {
        if !delivered {
            tracing::warn!("⚠️ Reminder for '{}' not delivered; will retry", reminder.batch_id);
            return;
        }
        let (registry, log) = nursery.parts_mut();
        log.append_at(
            &reminder.batch_id,
            EventKind::NotificationSent,
            &format!(
                "Automatic notification sent (overdue by {}h)",
                reminder.overdue_hours
            ),
            at,
        );
        registry.record_notification(&reminder.batch_id, at);
    }

    /// Run one sweep over an exclusively borrowed nursery.
    pub async fn sweep_at(&self, nursery: &mut Nursery, now: DateTime<Utc>) -> SweepReport {
        let plan = self.plan(nursery, now);
        let mut report = plan.report;
        for reminder in &plan.reminders {
            let delivered = self.deliver(reminder).await;
            Self::record(nursery, reminder, delivered, now);
            tally(&mut report, delivered);
        }
        log_report(&report);
        report
    }

    /// Sweep at the current time.
    pub async fn sweep(&self, nursery: &mut Nursery) -> SweepReport {
        self.sweep_at(nursery, Utc::now()).await
    }

    /// Sweep a shared nursery. The lock is held while planning and while
    /// recording each outcome, never across a gateway call.
    pub async fn sweep_shared(&self, nursery: &Mutex<Nursery>, now: DateTime<Utc>) -> SweepReport {
        let plan = {
            let guard = nursery.lock().await;
            self.plan(&guard, now)
        };
        let mut report = plan.report;
        for reminder in &plan.reminders {
            let delivered = self.deliver(reminder).await;
            {
                let mut guard = nursery.lock().await;
                Self::record(&mut guard, reminder, delivered, now);
            }
            tally(&mut report, delivered);
        }
        log_report(&report);
        report
    }

    /// Send a reminder for one batch right now, ignoring grace and cool-down.
    /// Returns false for unknown or completed batches and failed deliveries.
    pub async fn notify_now(&self, nursery: &mut Nursery, batch_id: &str, now: DateTime<Utc>) -> bool {
        let Some(batch) = nursery.registry().get(batch_id).filter(|b| b.is_active()) else {
            tracing::warn!("⚠️ No active batch '{batch_id}' to notify");
            return false;
        };
        let overdue_hours = batch.overdue_by(now).map(|d| d.num_hours()).unwrap_or(0);
        let message = format_reminder(&batch.batch_id, &batch.species, batch.larval_count, overdue_hours);
        let to = batch.contact_address.clone();

        if !self.gateway.send(&to, &message).await {
            tracing::warn!("⚠️ Manual reminder for '{batch_id}' not delivered");
            return false;
        }

        let (registry, log) = nursery.parts_mut();
        log.append_at(batch_id, EventKind::NotificationSent, "Manual notification sent", now);
        registry.record_notification(batch_id, now);
        true
    }
}

fn tally(report: &mut SweepReport, delivered: bool) {
    if delivered {
        report.notified += 1;
    } else {
        report.failed += 1;
    }
}

fn log_report(report: &SweepReport) {
    if report.notified > 0 || report.failed > 0 {
        tracing::info!(
            "📣 Sweep: {} checked, {} notified, {} failed, {} cooling down",
            report.checked,
            report.notified,
            report.failed,
            report.skipped_cooldown
        );
    } else {
        tracing::debug!("Sweep: {} checked, nothing to send", report.checked);
    }
}

/// Spawn-able sweep loop. Runs until the surrounding task is dropped.
pub async fn spawn_scheduler(
    nursery: Arc<Mutex<Nursery>>,
    scheduler: Arc<NotificationScheduler>,
    check_interval_secs: u64,
) {
    // tokio rejects a zero period
    let period = check_interval_secs.max(1);
    tracing::info!("⏰ Feeding scheduler started (check every {period}s)");

    let mut interval = tokio::time::interval(std::time::Duration::from_secs(period));

    loop {
        interval.tick().await;
        scheduler.sweep_shared(&nursery, Utc::now()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{LogEntry, NewBatch};
    use crate::store::{BATCHES, FEEDING_LOG, JsonFileStore};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Counts calls; succeeds unless told otherwise.
    #[derive(Default)]
    struct CountingGateway {
        calls: AtomicUsize,
        failing: AtomicBool,
        last_message: std::sync::Mutex<String>,
    }

    #[async_trait]
    impl NotificationGateway for CountingGateway {
        async fn send(&self, _to: &str, message: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_message.lock().unwrap() = message.to_string();
            !self.failing.load(Ordering::SeqCst)
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    fn setup(dir: &TempDir, overdue: Duration) -> (Nursery, Arc<CountingGateway>, NotificationScheduler) {
        let mut nursery = Nursery::from_stores(
            Box::new(JsonFileStore::<Batch>::new(dir.path(), BATCHES)),
            Box::new(JsonFileStore::<LogEntry>::new(dir.path(), FEEDING_LOG)),
        );
        let mut new = NewBatch::starting_at("B1", "Moth-Atlas", 50, "+15550001111", 2, t0() - Duration::days(3));
        new.next_feeding_due = t0() - overdue;
        assert!(nursery.add(new));

        let gateway = Arc::new(CountingGateway::default());
        let scheduler = NotificationScheduler::new(gateway.clone(), SweepPolicy::default());
        (nursery, gateway, scheduler)
    }

    #[tokio::test]
    async fn test_overdue_batch_notified_once() {
        let dir = TempDir::new().unwrap();
        let (mut nursery, gateway, scheduler) = setup(&dir, Duration::minutes(90));

        let report = scheduler.sweep_at(&mut nursery, t0()).await;
        assert_eq!(report.notified, 1);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
        assert_eq!(nursery.log().len(), 1);
        let entry = &nursery.log().all()[0];
        assert_eq!(entry.event_kind, EventKind::NotificationSent);
        assert_eq!(entry.activity, "Automatic notification sent (overdue by 1h)");
        assert_eq!(nursery.registry().get("B1").unwrap().last_notified, Some(t0()));

        // second sweep a minute later is inside the cool-down
        let report = scheduler.sweep_at(&mut nursery, t0() + Duration::minutes(1)).await;
        assert_eq!(report.skipped_cooldown, 1);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_within_grace_not_notified() {
        let dir = TempDir::new().unwrap();
        let (mut nursery, gateway, scheduler) = setup(&dir, Duration::minutes(60));
        let report = scheduler.sweep_at(&mut nursery, t0()).await;
        assert_eq!(report.not_due, 1);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
        assert!(nursery.log().is_empty());
    }

    #[tokio::test]
    async fn test_recent_log_entry_suppresses() {
        let dir = TempDir::new().unwrap();
        let (mut nursery, gateway, scheduler) = setup(&dir, Duration::hours(6));
        let (_, log) = nursery.parts_mut();
        log.append_at("B1", EventKind::NotificationSent, "sent", t0() - Duration::minutes(30));

        let report = scheduler.sweep_at(&mut nursery, t0()).await;
        assert_eq!(report.skipped_cooldown, 1);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
        assert_eq!(nursery.log().len(), 1);
    }

    #[tokio::test]
    async fn test_old_log_entry_does_not_suppress() {
        let dir = TempDir::new().unwrap();
        let (mut nursery, gateway, scheduler) = setup(&dir, Duration::hours(6));
        let (_, log) = nursery.parts_mut();
        log.append_at("B1", EventKind::NotificationSent, "sent", t0() - Duration::hours(5));

        let report = scheduler.sweep_at(&mut nursery, t0()).await;
        assert_eq!(report.notified, 1);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
        assert!(gateway.last_message.lock().unwrap().contains("OVERDUE by 6 hours"));
    }

    #[tokio::test]
    async fn test_failed_delivery_is_retried() {
        let dir = TempDir::new().unwrap();
        let (mut nursery, gateway, scheduler) = setup(&dir, Duration::hours(2));
        gateway.failing.store(true, Ordering::SeqCst);

        let report = scheduler.sweep_at(&mut nursery, t0()).await;
        assert_eq!(report.failed, 1);
        assert!(nursery.log().is_empty());
        assert!(nursery.registry().get("B1").unwrap().last_notified.is_none());

        gateway.failing.store(false, Ordering::SeqCst);
        let report = scheduler.sweep_at(&mut nursery, t0() + Duration::minutes(5)).await;
        assert_eq!(report.notified, 1);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_completed_batch_ignored() {
        let dir = TempDir::new().unwrap();
        let (mut nursery, gateway, scheduler) = setup(&dir, Duration::hours(10));
        nursery.complete("B1");

        let report = scheduler.sweep_at(&mut nursery, t0()).await;
        assert_eq!(report.checked, 0);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
        assert!(!scheduler.notify_now(&mut nursery, "B1", t0()).await);
    }

    #[tokio::test]
    async fn test_notify_now_ignores_grace() {
        let dir = TempDir::new().unwrap();
        let (mut nursery, gateway, scheduler) = setup(&dir, -Duration::hours(12));

        assert!(scheduler.notify_now(&mut nursery, "B1", t0()).await);
        assert!(gateway.last_message.lock().unwrap().contains("fresh leaves"));
        assert_eq!(nursery.log().all()[0].activity, "Manual notification sent");
        assert!(!scheduler.notify_now(&mut nursery, "ghost", t0()).await);
    }

    #[tokio::test]
    async fn test_sweep_shared_records_under_lock() {
        let dir = TempDir::new().unwrap();
        let (nursery, gateway, scheduler) = setup(&dir, Duration::hours(3));
        let shared = Mutex::new(nursery);

        let report = scheduler.sweep_shared(&shared, t0()).await;
        assert_eq!(report.notified, 1);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
        assert_eq!(shared.lock().await.log().len(), 1);
    }

    #[tokio::test]
    async fn test_scheduler_loop_survives_zero_interval() {
        let dir = TempDir::new().unwrap();
        let (nursery, gateway, scheduler) = setup(&dir, Duration::hours(3));
        let shared = Arc::new(Mutex::new(nursery));

        let handle = tokio::spawn(spawn_scheduler(shared.clone(), Arc::new(scheduler), 0));
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        assert!(!handle.is_finished());
        // first tick fires immediately
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert_eq!(shared.lock().await.log().len(), 1);
    }

    #[test]
    fn test_policy_from_config() {
        let config = SchedulerConfig {
            check_interval_secs: 30,
            grace_minutes: 15,
            cooldown_minutes: 120,
        };
        let policy = SweepPolicy::from(&config);
        assert_eq!(policy.grace, Duration::minutes(15));
        assert_eq!(policy.cooldown, Duration::hours(2));
        assert_eq!(SweepPolicy::default().cooldown, Duration::hours(4));
    }
}
