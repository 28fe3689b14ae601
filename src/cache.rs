use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Content-hash keyed embedding cache backed by SQLite. Rows age out by
/// last access, so repeated indexing of the same sources keeps the working
/// set warm while abandoned projects decay.
pub struct EmbeddingCache {
    conn: Mutex<Connection>,
}

impl EmbeddingCache {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create cache directory {}", parent.display()))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("open embedding cache at {}", db_path.display()))?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS embeddings (
                hash TEXT PRIMARY KEY,
                vector BLOB,
                model TEXT,
                created_at TIMESTAMP,
                last_accessed TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_last_accessed ON embeddings(last_accessed);
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS embeddings (
                hash TEXT PRIMARY KEY,
                vector BLOB,
                model TEXT,
                created_at TIMESTAMP,
                last_accessed TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_last_accessed ON embeddings(last_accessed);
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Fetch a cached vector and bump `last_accessed`. Blobs that are not
    /// UTF-8 JSON arrays are evicted and reported as a miss; earlier
    /// releases stored binary pickles here.
    pub fn get(&self, text_hash: &str) -> Result<Option<Vec<f32>>> {
        let conn = self.conn.lock().unwrap();
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT vector FROM embeddings WHERE hash = ?1",
                params![text_hash],
                |row| row.get(0),
            )
            .optional()?;
        let Some(blob) = blob else {
            return Ok(None);
        };
        let parsed = std::str::from_utf8(&blob)
            .ok()
            .filter(|text| text.trim_start().starts_with('['))
            .and_then(|text| serde_json::from_str::<Vec<f32>>(text).ok());
        match parsed {
            Some(vector) => {
                conn.execute(
                    "UPDATE embeddings SET last_accessed = ?1 WHERE hash = ?2",
                    params![Utc::now().to_rfc3339(), text_hash],
                )?;
                Ok(Some(vector))
            }
            None => {
                tracing::warn!("evicting malformed cache row {text_hash}");
                conn.execute("DELETE FROM embeddings WHERE hash = ?1", params![text_hash])?;
                Ok(None)
            }
        }
    }

    pub fn set(&self, text_hash: &str, model: &str, vector: &[f32]) -> Result<()> {
        let blob = serde_json::to_vec(vector)?;
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO embeddings (hash, vector, model, created_at, last_accessed)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![text_hash, blob, model, now],
        )?;
        Ok(())
    }

    /// Delete rows not accessed within the last `days` days.
    pub fn prune(&self, days: i64) -> Result<usize> {
        let cutoff = (Utc::now() - chrono::Duration::days(days)).to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM embeddings WHERE last_accessed < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let cache = EmbeddingCache::open_in_memory().unwrap();
        let vector = vec![0.25_f32, -1.0, 3.5];
        cache.set("abc123", "bge-m3", &vector).unwrap();
        assert_eq!(cache.get("abc123").unwrap(), Some(vector));
    }

    #[test]
    fn miss_returns_none() {
        let cache = EmbeddingCache::open_in_memory().unwrap();
        assert_eq!(cache.get("missing").unwrap(), None);
    }

    #[test]
    fn prune_zero_days_clears() {
        let cache = EmbeddingCache::open_in_memory().unwrap();
        cache.set("h", "m", &[1.0]).unwrap();
        cache.prune(0).unwrap();
        assert_eq!(cache.get("h").unwrap(), None);
    }

    #[test]
    fn legacy_binary_blob_is_evicted() {
        let cache = EmbeddingCache::open_in_memory().unwrap();
        {
            let conn = cache.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO embeddings (hash, vector, model, created_at, last_accessed)
                 VALUES ('legacy', X'80049502', 'old', '2020-01-01', '2020-01-01')",
                [],
            )
            .unwrap();
        }
        assert_eq!(cache.get("legacy").unwrap(), None);
        // the row is gone, not just skipped
        let conn = cache.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
