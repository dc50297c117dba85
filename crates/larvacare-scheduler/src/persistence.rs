//! SQLite-backed persistence for batch and log collections.
//! Alternative to the JSON file store when a single database file is preferred.

use std::marker::PhantomData;
use std::path::Path;

use larvacare_core::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::store::RecordStore;

/// SQLite record store. Each record is one JSON row tagged with its collection.
pub struct SqliteStore<T> {
    conn: rusqlite::Connection,
    collection: String,
    label: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SqliteStore<T> {
    /// Open or create the database and bind this store to `collection`.
    pub fn open(path: &Path, collection: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = rusqlite::Connection::open(path)?;
        let store = Self {
            conn,
            collection: collection.to_string(),
            label: format!("{}#{}", path.display(), collection),
            _marker: PhantomData,
        };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory database, for tests and dry runs.
    pub fn open_in_memory(collection: &str) -> Result<Self> {
        let store = Self {
            conn: rusqlite::Connection::open_in_memory()?,
            collection: collection.to_string(),
            label: format!(":memory:#{collection}"),
            _marker: PhantomData,
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                seq INTEGER NOT NULL,
                body TEXT NOT NULL,             -- JSON record
                PRIMARY KEY (collection, seq)
            );
            ",
        )?;
        Ok(())
    }
}

impl<T> RecordStore<T> for SqliteStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> Vec<T> {
        let mut stmt = match self
            .conn
            .prepare("SELECT body FROM records WHERE collection = ?1 ORDER BY seq")
        {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("⚠️ Failed to query {}: {e}", self.label);
                return Vec::new();
            }
        };

        let rows = stmt
            .query_map([&self.collection], |row| row.get::<_, String>(0))
            .map(|rows| rows.filter_map(|r| r.ok()).collect::<Vec<_>>());

        match rows {
            Ok(bodies) => bodies
                .iter()
                .filter_map(|body| match serde_json::from_str(body) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        tracing::warn!("⚠️ Skipping corrupt row in {}: {e}", self.label);
                        None
                    }
                })
                .collect(),
            Err(e) => {
                tracing::warn!("⚠️ Failed to read {}: {e}", self.label);
                Vec::new()
            }
        }
    }

    fn save(&self, records: &[T]) -> Result<()> {
        let bodies = records
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // Whole collection replaced in one transaction.
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM records WHERE collection = ?1", [&self.collection])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO records (collection, seq, body) VALUES (?1, ?2, ?3)",
            )?;
            for (seq, body) in bodies.iter().enumerate() {
                insert.execute(rusqlite::params![self.collection, seq as i64, body])?;
            }
        }
        tx.commit()?;
        tracing::debug!("💾 Saved {} records to {}", records.len(), self.label);
        Ok(())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
