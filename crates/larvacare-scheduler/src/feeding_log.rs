//! Feeding log — append-only audit trail of feedings, completions and reminders.

use chrono::{DateTime, Duration, Utc};
use larvacare_core::{CareError, Result};

use crate::batch::{Batch, EventKind, LogEntry};
use crate::store::RecordStore;

/// Section header for the batch table in an export.
pub const EXPORT_BATCHES_HEADER: &str = "LARVAL BATCHES";
/// Section header for the log table in an export.
pub const EXPORT_LOG_HEADER: &str = "FEEDING LOG";

/// Append-only log with its own store, independent of the batch registry.
pub struct FeedingLog {
    entries: Vec<LogEntry>,
    store: Box<dyn RecordStore<LogEntry>>,
}

impl FeedingLog {
    /// Load the log from its store.
    pub fn open(store: Box<dyn RecordStore<LogEntry>>) -> Self {
        let entries = store.load();
        tracing::info!("📒 Loaded {} log entries from {}", entries.len(), store.describe());
        Self { entries, store }
    }

    /// Append an entry stamped with the current time.
    pub fn append(&mut self, batch_id: &str, kind: EventKind, activity: &str) {
        self.append_at(batch_id, kind, activity, Utc::now());
    }

    /// Append an entry with an explicit timestamp.
    pub fn append_at(&mut self, batch_id: &str, kind: EventKind, activity: &str, at: DateTime<Utc>) {
        self.entries.push(LogEntry {
            timestamp: at,
            batch_id: batch_id.to_string(),
            event_kind: kind,
            activity: activity.to_string(),
        });
        self.save();
    }

    /// Every entry, newest first.
    pub fn all(&self) -> Vec<LogEntry> {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
    }

    /// Entries for one batch, newest first.
    pub fn for_batch(&self, batch_id: &str) -> Vec<LogEntry> {
        let mut entries: Vec<LogEntry> = self
            .entries
            .iter()
            .filter(|e| e.batch_id == batch_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
    }

    /// Notifications sent for `batch_id` within `within` of the current time.
    pub fn recent_notifications_for(&self, batch_id: &str, within: Duration) -> Vec<LogEntry> {
        self.recent_notifications_at(batch_id, within, Utc::now())
    }

    /// Notifications sent for `batch_id` less than `within` before `now`.
    pub fn recent_notifications_at(
        &self,
        batch_id: &str,
        within: Duration,
        now: DateTime<Utc>,
    ) -> Vec<LogEntry> {
        self.entries
            .iter()
            .filter(|e| {
                e.batch_id == batch_id
                    && e.event_kind == EventKind::NotificationSent
                    && now - e.timestamp < within
            })
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bulk-clear the whole log. Only for an explicit operator command.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.save();
        tracing::warn!("🧹 Feeding log cleared ({removed} entries)");
        removed
    }

    /// Render `batches` and the full log as two labelled CSV sections.
    ///
    /// Line breaks inside text fields become spaces, so every record is one
    /// physical line and the section headers are the only comma-free lines.
    pub fn export(&self, batches: &[Batch]) -> Result<String> {
        let mut out = String::new();
        out.push_str(EXPORT_BATCHES_HEADER);
        out.push('\n');
        out.push_str(&batches_csv(batches)?);
        out.push('\n');
        out.push_str(EXPORT_LOG_HEADER);
        out.push('\n');
        out.push_str(&log_csv(&self.entries)?);
        Ok(out)
    }

    /// Write the current state to the store, logging any failure.
    pub fn save(&self) {
        if let Err(e) = self.store.save(&self.entries) {
            tracing::warn!("⚠️ Failed to save feeding log to {}: {e}", self.store.describe());
        }
    }
}

fn batches_csv(batches: &[Batch]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record([
        "batch_id",
        "species",
        "larval_count",
        "contact_address",
        "start_date",
        "feeding_interval_days",
        "next_feeding_due",
        "status",
        "total_feedings",
        "notes",
        "last_notified",
    ])?;
    for b in batches {
        wtr.write_record([
            one_line(&b.batch_id),
            one_line(&b.species),
            b.larval_count.to_string(),
            one_line(&b.contact_address),
            b.start_date.to_rfc3339(),
            b.feeding_interval_days.to_string(),
            b.next_feeding_due.to_rfc3339(),
            b.status.to_string(),
            b.total_feedings.to_string(),
            one_line(&b.notes),
            b.last_notified.map(|t| t.to_rfc3339()).unwrap_or_default(),
        ])?;
    }
    finish(wtr)
}

fn log_csv(entries: &[LogEntry]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(["timestamp", "batch_id", "event_kind", "activity"])?;
    for e in entries {
        wtr.write_record([
            e.timestamp.to_rfc3339(),
            one_line(&e.batch_id),
            e.event_kind.to_string(),
            one_line(&e.activity),
        ])?;
    }
    finish(wtr)
}

fn one_line(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\r', '\n'], " ")
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = wtr
        .into_inner()
        .map_err(|e| CareError::Io(std::io::Error::other(e.error().to_string())))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::NewBatch;
    use crate::store::{FEEDING_LOG, JsonFileStore};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> FeedingLog {
        FeedingLog::open(Box::new(JsonFileStore::<LogEntry>::new(dir.path(), FEEDING_LOG)))
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_all_is_newest_first() {
        let dir = TempDir::new().unwrap();
        let mut log = open(&dir);
        log.append_at("B1", EventKind::Fed, "first", t0());
        log.append_at("B1", EventKind::Fed, "third", t0() + Duration::hours(2));
        log.append_at("B2", EventKind::Note, "second", t0() + Duration::hours(1));

        let activities: Vec<String> = log.all().into_iter().map(|e| e.activity).collect();
        assert_eq!(activities, vec!["third", "second", "first"]);
        assert_eq!(log.for_batch("B1").len(), 2);
    }

    #[test]
    fn test_append_persists() {
        let dir = TempDir::new().unwrap();
        open(&dir).append("B1", EventKind::Note, "moved to larger box");
        let reloaded = open(&dir);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.all()[0].activity, "moved to larger box");
    }

    #[test]
    fn test_recent_notifications_matches_tag_batch_and_window() {
        let dir = TempDir::new().unwrap();
        let mut log = open(&dir);
        let now = t0();
        log.append_at("B1", EventKind::NotificationSent, "sent", now - Duration::minutes(30));
        log.append_at("B1", EventKind::NotificationSent, "old", now - Duration::hours(5));
        log.append_at("B2", EventKind::NotificationSent, "other batch", now - Duration::minutes(5));
        // text mentions a notification but the tag says otherwise
        log.append_at("B1", EventKind::Note, "notification sent by hand", now);

        let recent = log.recent_notifications_at("B1", Duration::hours(4), now);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].activity, "sent");

        let at_edge = log.recent_notifications_at("B1", Duration::minutes(30), now);
        assert!(at_edge.is_empty());
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let mut log = open(&dir);
        log.append("B1", EventKind::Fed, "fed");
        log.append("B1", EventKind::Fed, "fed");
        assert_eq!(log.clear(), 2);
        assert!(open(&dir).is_empty());
    }

    #[test]
    fn test_export_has_both_sections() {
        let dir = TempDir::new().unwrap();
        let mut log = open(&dir);
        log.append_at("B1", EventKind::Fed, "Batch fed (Total feedings: 1)", t0());
        let mut new = NewBatch::starting_at("B1", "Moth-Atlas", 50, "+15550001111", 2, t0());
        new.notes = "privet, then lilac".into();
        let batches = vec![Batch::from_new(new)];

        let text = log.export(&batches).unwrap();
        let (batch_part, log_part) = text.split_once(EXPORT_LOG_HEADER).unwrap();
        assert!(batch_part.starts_with(EXPORT_BATCHES_HEADER));

        let mut rdr = csv::Reader::from_reader(
            batch_part.trim_start_matches(EXPORT_BATCHES_HEADER).trim().as_bytes(),
        );
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], "B1");
        assert_eq!(&rows[0][7], "active");
        assert_eq!(&rows[0][9], "privet, then lilac");

        let mut rdr = csv::Reader::from_reader(log_part.trim().as_bytes());
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][2], "fed");
    }

    #[test]
    fn test_export_flattens_multiline_text() {
        let dir = TempDir::new().unwrap();
        let mut log = open(&dir);
        log.append_at("B1", EventKind::Note, "moved\r\nFEEDING LOG", t0());
        let mut new = NewBatch::starting_at("B1", "Moth-Atlas", 50, "+15550001111", 2, t0());
        new.notes = "ok\nFEEDING LOG\nmore".into();
        let batches = vec![Batch::from_new(new)];

        let text = log.export(&batches).unwrap();
        let headers: Vec<&str> = text.lines().filter(|l| *l == EXPORT_LOG_HEADER).collect();
        assert_eq!(headers.len(), 1);
        // two section headers, two column headers, one record each, one blank separator
        assert_eq!(text.lines().count(), 7);

        let (_, log_part) = text.split_once(&format!("\n{EXPORT_LOG_HEADER}\n")).unwrap();
        let mut rdr = csv::Reader::from_reader(log_part.as_bytes());
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(&rows[0][3], "moved FEEDING LOG");
        assert!(text.contains("ok FEEDING LOG more"));
    }
}
