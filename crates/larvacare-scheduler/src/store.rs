//! File-based record store — lightweight persistence.
//! Collections saved as JSON files — human-readable, git-friendly.
//! Only reads on startup and writes on mutation, never on every tick.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use larvacare_core::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Collection name for batches.
pub const BATCHES: &str = "larval_batches";
/// Collection name for the feeding log.
pub const FEEDING_LOG: &str = "feeding_log";

/// Durable ordered sequence of records for one logical collection.
pub trait RecordStore<T>: Send {
    /// Load all records. Missing or corrupt data yields an empty sequence.
    fn load(&self) -> Vec<T>;

    /// Replace the whole collection. Readers never observe a partial write.
    fn save(&self, records: &[T]) -> Result<()>;

    /// Human-readable location, for log lines.
    fn describe(&self) -> String;
}

/// JSON file store: one `<collection>.json` per collection.
pub struct JsonFileStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    /// Create a store for `collection` inside `dir`.
    pub fn new(dir: &Path, collection: &str) -> Self {
        std::fs::create_dir_all(dir).ok();
        Self {
            path: dir.join(format!("{collection}.json")),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> RecordStore<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> Vec<T> {
        if !self.path.exists() {
            return Vec::new();
        }
        match std::fs::read_to_string(&self.path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("⚠️ Failed to parse {}: {e}", self.path.display());
                Vec::new()
            }),
            Err(e) => {
                tracing::warn!("⚠️ Failed to read {}: {e}", self.path.display());
                Vec::new()
            }
        }
    }

    fn save(&self, records: &[T]) -> Result<()> {
        let json = serde_json::to_string_pretty(records)?;
        // Write to a sibling temp file, then rename over the target.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!("💾 Saved {} records to {}", records.len(), self.path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
