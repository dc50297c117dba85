//! Nursery — the explicitly owned registry + log pair.
//! Constructed once at startup, handed to whoever runs the sweep loop,
//! and saved one last time on shutdown.

use chrono::{DateTime, Utc};
use larvacare_core::config::StorageBackend;
use larvacare_core::{LarvaCareConfig, Result};

use crate::batch::{Batch, LogEntry, NewBatch};
use crate::feeding_log::FeedingLog;
use crate::persistence::SqliteStore;
use crate::registry::{BatchRegistry, RegistrySummary};
use crate::store::{BATCHES, FEEDING_LOG, JsonFileStore, RecordStore};

pub struct Nursery {
    registry: BatchRegistry,
    log: FeedingLog,
}

impl Nursery {
    /// Open both collections with the configured backend.
    pub fn open(config: &LarvaCareConfig) -> Result<Self> {
        let dir = config.data_path();
        let batches: Box<dyn RecordStore<Batch>>;
        let log: Box<dyn RecordStore<LogEntry>>;
        match config.storage.backend {
            StorageBackend::Json => {
                batches = Box::new(JsonFileStore::<Batch>::new(&dir, BATCHES));
                log = Box::new(JsonFileStore::<LogEntry>::new(&dir, FEEDING_LOG));
            }
            StorageBackend::Sqlite => {
                let path = dir.join(&config.storage.sqlite_file);
                batches = Box::new(SqliteStore::<Batch>::open(&path, BATCHES)?);
                log = Box::new(SqliteStore::<LogEntry>::open(&path, FEEDING_LOG)?);
            }
        }
        Ok(Self::from_stores(batches, log))
    }

    /// Build from arbitrary stores.
    pub fn from_stores(
        batches: Box<dyn RecordStore<Batch>>,
        log: Box<dyn RecordStore<LogEntry>>,
    ) -> Self {
        Self {
            registry: BatchRegistry::open(batches),
            log: FeedingLog::open(log),
        }
    }

    pub fn registry(&self) -> &BatchRegistry {
        &self.registry
    }

    pub fn log(&self) -> &FeedingLog {
        &self.log
    }

    /// Split borrow for callers that mutate both halves together.
    pub fn parts_mut(&mut self) -> (&mut BatchRegistry, &mut FeedingLog) {
        (&mut self.registry, &mut self.log)
    }

    pub fn add(&mut self, new: NewBatch) -> bool {
        self.registry.add(new)
    }

    pub fn list_active(&self) -> Vec<Batch> {
        self.registry.list_active()
    }

    pub fn mark_fed(&mut self, batch_id: &str) -> bool {
        self.registry.mark_fed(batch_id, &mut self.log)
    }

    pub fn mark_fed_at(&mut self, batch_id: &str, now: DateTime<Utc>) -> bool {
        self.registry.mark_fed_at(batch_id, now, &mut self.log)
    }

    pub fn complete(&mut self, batch_id: &str) -> bool {
        self.registry.complete(batch_id, &mut self.log)
    }

    pub fn purge_completed(&mut self) -> usize {
        self.registry.purge_completed()
    }

    pub fn summary(&self, now: DateTime<Utc>) -> RegistrySummary {
        self.registry.summary(now)
    }

    /// Current batch snapshot plus the full log, as CSV sections.
    pub fn export(&self) -> Result<String> {
        self.log.export(self.registry.all())
    }

    pub fn clear_log(&mut self) -> usize {
        self.log.clear()
    }

    /// Final save of both collections.
    pub fn shutdown(&self) {
        self.registry.save();
        self.log.save();
        tracing::info!(
            "💾 Nursery saved ({} batches, {} log entries)",
            self.registry.len(),
            self.log.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_for(dir: &TempDir, backend: StorageBackend) -> LarvaCareConfig {
        let mut config = LarvaCareConfig::default();
        config.data_dir = dir.path().to_string_lossy().into_owned();
        config.storage.backend = backend;
        config
    }

    #[test]
    fn test_reopen_json_and_sqlite() {
        for backend in [StorageBackend::Json, StorageBackend::Sqlite] {
            let dir = TempDir::new().unwrap();
            let config = config_for(&dir, backend);
            {
                let mut nursery = Nursery::open(&config).unwrap();
                assert!(nursery.add(NewBatch::starting_at("B1", "Moth", 5, "+1", 2, Utc::now())));
                assert!(nursery.mark_fed("B1"));
                nursery.shutdown();
            }
            let nursery = Nursery::open(&config).unwrap();
            assert_eq!(nursery.registry().get("B1").unwrap().total_feedings, 1, "{backend:?}");
            assert_eq!(nursery.log().len(), 1, "{backend:?}");
        }
    }

    #[test]
    fn test_export_includes_batches_and_log() {
        let dir = TempDir::new().unwrap();
        let mut nursery = Nursery::open(&config_for(&dir, StorageBackend::Json)).unwrap();
        nursery.add(NewBatch::starting_at("B7", "Papilio", 9, "+1", 1, Utc::now()));
        nursery.complete("B7");

        let text = nursery.export().unwrap();
        assert!(text.contains("LARVAL BATCHES"));
        assert!(text.contains("FEEDING LOG"));
        assert!(text.contains("Batch marked as completed"));
    }
}
