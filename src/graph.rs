use crate::model::EdgeRecord;
use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

/// Persistent edge store shared by every project, scoped by project id.
/// Cycles are allowed and expected (mutual recursion); traversal order is
/// the consumer's business.
pub struct KnowledgeGraph {
    conn: Mutex<Connection>,
}

impl KnowledgeGraph {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create graph directory {}", parent.display()))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("open knowledge graph at {}", db_path.display()))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            CREATE TABLE IF NOT EXISTS edges (
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                confidence TEXT NOT NULL,
                detail TEXT,
                project TEXT NOT NULL,
                PRIMARY KEY (project, source_id, target_id, kind)
            );
            CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(project, source_id);
            CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(project, target_id);
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn open_temp() -> Result<Self> {
        let dir = std::env::temp_dir().join(format!(
            "codeintel-kg-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        Self::open(&dir.join("kg.sqlite"))
    }

    pub fn add_edge(&self, project: &str, edge: &EdgeRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        insert_edge(&conn, project, edge)?;
        Ok(())
    }

    /// Insert a file's worth of edges inside one transaction. Pass 2 calls
    /// this once per source file.
    pub fn insert_batch(&self, project: &str, edges: &[EdgeRecord]) -> Result<usize> {
        if edges.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for edge in edges {
            insert_edge(&tx, project, edge)?;
        }
        tx.commit()?;
        Ok(edges.len())
    }

    pub fn edges_from(&self, project: &str, source_id: &str) -> Result<Vec<EdgeRecord>> {
        self.query_edges(
            "SELECT source_id, target_id, kind, confidence, detail FROM edges
             WHERE project = ?1 AND source_id = ?2
             ORDER BY target_id, kind",
            project,
            source_id,
        )
    }

    pub fn edges_to(&self, project: &str, target_id: &str) -> Result<Vec<EdgeRecord>> {
        self.query_edges(
            "SELECT source_id, target_id, kind, confidence, detail FROM edges
             WHERE project = ?1 AND target_id = ?2
             ORDER BY source_id, kind",
            project,
            target_id,
        )
    }

    fn query_edges(&self, sql: &str, project: &str, id: &str) -> Result<Vec<EdgeRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![project, id], |row| {
            Ok(EdgeRecord {
                source_id: row.get(0)?,
                target_id: row.get(1)?,
                kind: row.get(2)?,
                confidence: row.get(3)?,
                detail: row.get(4)?,
            })
        })?;
        let mut edges = Vec::new();
        for row in rows {
            edges.push(row?);
        }
        Ok(edges)
    }

    pub fn clear_project(&self, project: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM edges WHERE project = ?1", params![project])?;
        Ok(deleted)
    }

    /// Drop edges originating from the given chunk ids. Incremental passes
    /// use this with the ids a re-parsed file is about to replace.
    pub fn clear_sources(&self, project: &str, source_ids: &[String]) -> Result<usize> {
        if source_ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut deleted = 0;
        {
            let mut stmt =
                tx.prepare("DELETE FROM edges WHERE project = ?1 AND source_id = ?2")?;
            for id in source_ids {
                deleted += stmt.execute(params![project, id])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }

    pub fn edge_count(&self, project: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM edges WHERE project = ?1",
            params![project],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn insert_edge(conn: &Connection, project: &str, edge: &EdgeRecord) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO edges (source_id, target_id, kind, confidence, detail, project)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            edge.source_id,
            edge.target_id,
            edge.kind,
            edge.confidence,
            edge.detail,
            project
        ],
    )?;
    Ok(())
}
