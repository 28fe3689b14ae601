use crate::model::{Chunk, DependencyHub, LanguageCount, RiskCandidate};
use crate::sanitize;
use anyhow::{bail, Context, Result};
use rusqlite::{ffi::sqlite3_auto_extension, params, Connection};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, Once};
use tracing::debug;

static VEC_EXTENSION: Once = Once::new();

fn register_vec_extension() {
    VEC_EXTENSION.call_once(|| unsafe {
        sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    });
}

/// Per-project chunk storage: one scalar table plus one vec0 virtual table
/// per project id. Every read gates on table existence first, so a query
/// against an unindexed project never creates empty tables.
pub struct VectorStore {
    conn: Mutex<Connection>,
    dims: usize,
}

pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine distance; smaller is closer.
    pub distance: f32,
}

impl VectorStore {
    pub fn open(db_path: &Path, dims: usize) -> Result<Self> {
        register_vec_extension();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create store directory {}", parent.display()))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("open vector store at {}", db_path.display()))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            dims,
        })
    }

    #[cfg(test)]
    pub fn open_in_memory(dims: usize) -> Result<Self> {
        register_vec_extension();
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
            dims,
        })
    }

    fn chunks_table(project: &str) -> String {
        format!("chunks_{project}")
    }

    fn vec_table(project: &str) -> String {
        format!("vec_{project}")
    }

    fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn ensure_tables(&self, conn: &Connection, project: &str) -> Result<()> {
        let chunks = Self::chunks_table(project);
        let vec = Self::vec_table(project);
        conn.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS {chunks} (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                language TEXT NOT NULL,
                symbol_name TEXT NOT NULL,
                symbol_kind TEXT NOT NULL,
                start_line INTEGER NOT NULL,
                end_line INTEGER NOT NULL,
                content TEXT NOT NULL,
                signature TEXT NOT NULL DEFAULT '',
                docstring TEXT NOT NULL DEFAULT '',
                parent_symbol TEXT NOT NULL DEFAULT '',
                complexity INTEGER NOT NULL DEFAULT 1,
                dependencies TEXT NOT NULL DEFAULT '[]',
                author TEXT,
                last_modified TEXT,
                content_hash TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{chunks}_filename ON {chunks}(filename);
            CREATE INDEX IF NOT EXISTS idx_{chunks}_symbol ON {chunks}(symbol_name);
            CREATE VIRTUAL TABLE IF NOT EXISTS {vec} USING vec0(
                chunk_id TEXT PRIMARY KEY,
                embedding float[{dims}] distance_metric=cosine
            );
            ",
            dims = self.dims,
        ))?;
        Ok(())
    }

    /// Delete any rows for the chunks' filenames, then insert the new rows
    /// and their vectors, all in one transaction. A concurrent reader sees
    /// each file either entirely old or entirely new.
    pub fn upsert_chunks(
        &self,
        project: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        if chunks.len() != vectors.len() {
            bail!(
                "chunk/vector count mismatch: {} vs {}",
                chunks.len(),
                vectors.len()
            );
        }
        let mut conn = self.conn.lock().unwrap();
        self.ensure_tables(&conn, project)?;
        let chunks_table = Self::chunks_table(project);
        let vec_table = Self::vec_table(project);

        let filenames: HashSet<&str> = chunks.iter().map(|c| c.filename.as_str()).collect();
        let tx = conn.transaction()?;
        for filename in filenames {
            delete_file_rows(&tx, &chunks_table, &vec_table, filename)?;
        }
        {
            let mut insert_chunk = tx.prepare(&format!(
                "INSERT OR REPLACE INTO {chunks_table}
                 (id, filename, language, symbol_name, symbol_kind, start_line, end_line,
                  content, signature, docstring, parent_symbol, complexity, dependencies,
                  author, last_modified, content_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
            ))?;
            let mut insert_vec = tx.prepare(&format!(
                "INSERT OR REPLACE INTO {vec_table} (chunk_id, embedding) VALUES (?1, ?2)"
            ))?;
            for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
                insert_chunk.execute(params![
                    chunk.id,
                    chunk.filename,
                    chunk.language,
                    chunk.symbol_name,
                    chunk.symbol_kind,
                    chunk.start_line,
                    chunk.end_line,
                    chunk.content,
                    chunk.signature,
                    chunk.docstring,
                    chunk.parent_symbol,
                    chunk.complexity,
                    serde_json::to_string(&chunk.dependencies)?,
                    chunk.author,
                    chunk.last_modified,
                    chunk.content_hash,
                ])?;
                insert_vec.execute(params![chunk.id, serde_json::to_string(vector)?])?;
            }
        }
        tx.commit()?;
        debug!(%project, rows = chunks.len(), "chunks upserted");
        Ok(())
    }

    /// Chunk ids currently stored for the given filenames. The indexer
    /// collects these before an upsert so stale graph edges can be cleared.
    pub fn chunk_ids_for_files(&self, project: &str, filenames: &[String]) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let table = Self::chunks_table(project);
        if !Self::table_exists(&conn, &table)? {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        let mut stmt = conn.prepare(&format!("SELECT id FROM {table} WHERE filename = ?1"))?;
        for filename in filenames {
            let rows = stmt.query_map(params![filename], |row| row.get::<_, String>(0))?;
            for row in rows {
                ids.push(row?);
            }
        }
        Ok(ids)
    }

    pub fn delete_files(&self, project: &str, filenames: &[String]) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let chunks_table = Self::chunks_table(project);
        if !Self::table_exists(&conn, &chunks_table)? {
            return Ok(0);
        }
        let vec_table = Self::vec_table(project);
        let tx = conn.transaction()?;
        let mut deleted = 0;
        for filename in filenames {
            deleted += delete_file_rows(&tx, &chunks_table, &vec_table, filename)?;
        }
        tx.commit()?;
        Ok(deleted)
    }

    /// Map of filename to stored content hash, for incremental skip.
    pub fn stored_hashes(&self, project: &str) -> Result<HashMap<String, String>> {
        let conn = self.conn.lock().unwrap();
        let table = Self::chunks_table(project);
        let mut out = HashMap::new();
        if !Self::table_exists(&conn, &table)? {
            return Ok(out);
        }
        let mut stmt =
            conn.prepare(&format!("SELECT DISTINCT filename, content_hash FROM {table}"))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (filename, hash) = row?;
            out.insert(filename, hash);
        }
        Ok(out)
    }

    /// KNN over the project's vectors, closest first. `extra_filter` is a
    /// pre-sanitized predicate over the scalar columns.
    pub fn search(
        &self,
        project: &str,
        query_vector: &[f32],
        limit: usize,
        extra_filter: Option<&str>,
    ) -> Result<Vec<ScoredChunk>> {
        let conn = self.conn.lock().unwrap();
        let chunks_table = Self::chunks_table(project);
        if !Self::table_exists(&conn, &chunks_table)? {
            return Ok(Vec::new());
        }
        let vec_table = Self::vec_table(project);
        let filter = match extra_filter {
            Some(clause) => format!("AND ({clause})"),
            None => String::new(),
        };
        let sql = format!(
            "SELECT {cols}, v.distance
             FROM {vec_table} v
             INNER JOIN {chunks_table} c ON v.chunk_id = c.id
             WHERE v.embedding MATCH ?1 AND k = ?2 {filter}
             ORDER BY v.distance",
            cols = chunk_columns("c"),
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![serde_json::to_string(query_vector)?, limit as i64],
            |row| {
                Ok(ScoredChunk {
                    chunk: row_to_chunk(row)?,
                    distance: row.get(16)?,
                })
            },
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Exact symbol-name lookup, optionally narrowed to one file. Values are
    /// interpolated through the sanitizer per the store filter contract.
    pub fn find_chunks_by_symbol(
        &self,
        project: &str,
        name: &str,
        filename: Option<&str>,
    ) -> Result<Vec<Chunk>> {
        let conn = self.conn.lock().unwrap();
        let table = Self::chunks_table(project);
        if !Self::table_exists(&conn, &table)? {
            return Ok(Vec::new());
        }
        let mut sql = format!(
            "SELECT {cols} FROM {table} c WHERE c.symbol_name = '{name}'",
            cols = chunk_columns("c"),
            name = sanitize::sanitize(name)?,
        );
        if let Some(filename) = filename {
            sql.push_str(&format!(
                " AND c.filename = '{}'",
                sanitize::sanitize(filename)?
            ));
        }
        sql.push_str(" ORDER BY c.filename, c.start_line");
        collect_chunks(&conn, &sql)
    }

    /// Substring search over chunk content, used by the keyword leg of
    /// hybrid retrieval and the reference fallback.
    pub fn find_chunks_containing_text(
        &self,
        project: &str,
        literal: &str,
        limit: usize,
    ) -> Result<Vec<Chunk>> {
        let conn = self.conn.lock().unwrap();
        let table = Self::chunks_table(project);
        if !Self::table_exists(&conn, &table)? {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {cols} FROM {table} c
             WHERE c.content LIKE '%{pattern}%' ESCAPE '\\'
             ORDER BY c.filename, c.start_line LIMIT {limit}",
            cols = chunk_columns("c"),
            pattern = sanitize::sanitize_like(literal)?,
        );
        collect_chunks(&conn, &sql)
    }

    pub fn chunks_for_file(&self, project: &str, filename: &str) -> Result<Vec<Chunk>> {
        let conn = self.conn.lock().unwrap();
        let table = Self::chunks_table(project);
        if !Self::table_exists(&conn, &table)? {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {cols} FROM {table} c WHERE c.filename = '{filename}'
             ORDER BY c.start_line",
            cols = chunk_columns("c"),
            filename = sanitize::sanitize(filename)?,
        );
        collect_chunks(&conn, &sql)
    }

    pub fn get_chunks_by_ids(&self, project: &str, ids: &[String]) -> Result<Vec<Chunk>> {
        let conn = self.conn.lock().unwrap();
        let table = Self::chunks_table(project);
        if !Self::table_exists(&conn, &table)? {
            return Ok(Vec::new());
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT {cols} FROM {table} c WHERE c.id = ?1",
            cols = chunk_columns("c"),
        ))?;
        let mut out = Vec::new();
        for id in ids {
            let rows = stmt.query_map(params![id], |row| row_to_chunk(row))?;
            for row in rows {
                out.push(row?);
            }
        }
        Ok(out)
    }

    /// The chunk whose line range covers `line` in `filename`; innermost
    /// (shortest) range wins when definitions nest.
    pub fn find_chunk_at(
        &self,
        project: &str,
        filename: &str,
        line: i64,
    ) -> Result<Option<Chunk>> {
        let conn = self.conn.lock().unwrap();
        let table = Self::chunks_table(project);
        if !Self::table_exists(&conn, &table)? {
            return Ok(None);
        }
        let sql = format!(
            "SELECT {cols} FROM {table} c
             WHERE c.filename = '{filename}' AND c.start_line <= {line} AND c.end_line >= {line}
             ORDER BY (c.end_line - c.start_line) ASC LIMIT 1",
            cols = chunk_columns("c"),
            filename = sanitize::sanitize(filename)?,
        );
        Ok(collect_chunks(&conn, &sql)?.into_iter().next())
    }

    pub fn update_git_meta(
        &self,
        project: &str,
        filename: &str,
        author: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let table = Self::chunks_table(project);
        if !Self::table_exists(&conn, &table)? {
            return Ok(());
        }
        conn.execute(
            &format!("UPDATE {table} SET author = ?1, last_modified = ?2 WHERE filename = ?3"),
            params![author, last_modified, filename],
        )?;
        Ok(())
    }

    pub fn delete_project(&self, project: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let chunks_table = Self::chunks_table(project);
        let vec_table = Self::vec_table(project);
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {chunks_table};
             DROP TABLE IF EXISTS {vec_table};"
        ))?;
        Ok(())
    }

    pub fn count_chunks(&self, project: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let table = Self::chunks_table(project);
        if !Self::table_exists(&conn, &table)? {
            return Ok(0);
        }
        let count = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    pub fn count_files(&self, project: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let table = Self::chunks_table(project);
        if !Self::table_exists(&conn, &table)? {
            return Ok(0);
        }
        let count = conn.query_row(
            &format!("SELECT COUNT(DISTINCT filename) FROM {table}"),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn language_breakdown(&self, project: &str) -> Result<Vec<LanguageCount>> {
        let conn = self.conn.lock().unwrap();
        let table = Self::chunks_table(project);
        if !Self::table_exists(&conn, &table)? {
            return Ok(Vec::new());
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT language, COUNT(*), COUNT(DISTINCT filename)
             FROM {table} GROUP BY language ORDER BY COUNT(*) DESC"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(LanguageCount {
                language: row.get(0)?,
                chunks: row.get(1)?,
                files: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Import strings ranked by how many distinct files declare them.
    pub fn dependency_hubs(&self, project: &str, top: usize) -> Result<Vec<DependencyHub>> {
        let conn = self.conn.lock().unwrap();
        let table = Self::chunks_table(project);
        if !Self::table_exists(&conn, &table)? {
            return Ok(Vec::new());
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT filename, dependencies FROM {table}"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut counts: HashMap<String, i64> = HashMap::new();
        for row in rows {
            let (_, deps_json) = row?;
            let deps: Vec<String> = serde_json::from_str(&deps_json).unwrap_or_default();
            for dep in deps {
                *counts.entry(dep).or_insert(0) += 1;
            }
        }
        let mut hubs: Vec<DependencyHub> = counts
            .into_iter()
            .map(|(dependency, importers)| DependencyHub {
                dependency,
                importers,
            })
            .collect();
        hubs.sort_by(|a, b| b.importers.cmp(&a.importers).then(a.dependency.cmp(&b.dependency)));
        hubs.truncate(top);
        Ok(hubs)
    }

    /// Callables at or above the complexity threshold whose file has no
    /// sibling test file in the index.
    pub fn high_risk(&self, project: &str, threshold: i64, top: usize) -> Result<Vec<RiskCandidate>> {
        let conn = self.conn.lock().unwrap();
        let table = Self::chunks_table(project);
        if !Self::table_exists(&conn, &table)? {
            return Ok(Vec::new());
        }
        let mut filenames: HashSet<String> = HashSet::new();
        {
            let mut stmt = conn.prepare(&format!("SELECT DISTINCT filename FROM {table}"))?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            for row in rows {
                filenames.insert(row?);
            }
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT filename, symbol_name, complexity FROM {table}
             WHERE complexity >= ?1 AND symbol_kind IN ('function', 'method')
             ORDER BY complexity DESC, filename"
        ))?;
        let rows = stmt.query_map(params![threshold], |row| {
            Ok(RiskCandidate {
                filename: row.get(0)?,
                symbol_name: row.get(1)?,
                complexity: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            let candidate = row?;
            if !has_sibling_test(&candidate.filename, &filenames) {
                out.push(candidate);
                if out.len() >= top {
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Distinct (filename, last_modified) pairs for staleness accounting.
    pub fn file_timestamps(&self, project: &str) -> Result<Vec<(String, Option<String>)>> {
        let conn = self.conn.lock().unwrap();
        let table = Self::chunks_table(project);
        if !Self::table_exists(&conn, &table)? {
            return Ok(Vec::new());
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT filename, last_modified FROM {table}"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn has_sibling_test(filename: &str, filenames: &HashSet<String>) -> bool {
    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if stem.starts_with("test_") || stem.ends_with("_test") || stem.ends_with(".test") {
        return true;
    }
    filenames.iter().any(|other| {
        let other_stem = Path::new(other)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        other_stem == format!("test_{stem}")
            || other_stem == format!("{stem}_test")
            || other_stem == format!("{stem}.test")
    })
}

fn delete_file_rows(
    conn: &Connection,
    chunks_table: &str,
    vec_table: &str,
    filename: &str,
) -> Result<usize> {
    let mut ids = Vec::new();
    {
        let mut stmt =
            conn.prepare(&format!("SELECT id FROM {chunks_table} WHERE filename = ?1"))?;
        let rows = stmt.query_map(params![filename], |row| row.get::<_, String>(0))?;
        for row in rows {
            ids.push(row?);
        }
    }
    let mut del_vec = conn.prepare(&format!("DELETE FROM {vec_table} WHERE chunk_id = ?1"))?;
    for id in &ids {
        del_vec.execute(params![id])?;
    }
    let deleted = conn.execute(
        &format!("DELETE FROM {chunks_table} WHERE filename = ?1"),
        params![filename],
    )?;
    Ok(deleted)
}

fn chunk_columns(alias: &str) -> String {
    [
        "id",
        "filename",
        "language",
        "symbol_name",
        "symbol_kind",
        "start_line",
        "end_line",
        "content",
        "signature",
        "docstring",
        "parent_symbol",
        "complexity",
        "dependencies",
        "author",
        "last_modified",
        "content_hash",
    ]
    .iter()
    .map(|col| format!("{alias}.{col}"))
    .collect::<Vec<_>>()
    .join(", ")
}

fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
    let deps_json: String = row.get(12)?;
    Ok(Chunk {
        id: row.get(0)?,
        filename: row.get(1)?,
        language: row.get(2)?,
        symbol_name: row.get(3)?,
        symbol_kind: row.get(4)?,
        start_line: row.get(5)?,
        end_line: row.get(6)?,
        content: row.get(7)?,
        signature: row.get(8)?,
        docstring: row.get(9)?,
        parent_symbol: row.get(10)?,
        complexity: row.get(11)?,
        dependencies: serde_json::from_str(&deps_json).unwrap_or_default(),
        author: row.get(13)?,
        last_modified: row.get(14)?,
        content_hash: row.get(15)?,
    })
}

fn collect_chunks(conn: &Connection, sql: &str) -> Result<Vec<Chunk>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| row_to_chunk(row))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::symbol_kind;
    use crate::util;

    fn chunk(filename: &str, symbol: &str, start: i64, content: &str) -> Chunk {
        Chunk {
            id: util::chunk_id(filename, symbol, start),
            filename: filename.to_string(),
            language: "python".to_string(),
            symbol_name: symbol.to_string(),
            symbol_kind: symbol_kind::FUNCTION.to_string(),
            start_line: start,
            end_line: start + 2,
            content: content.to_string(),
            signature: format!("{symbol}()"),
            docstring: String::new(),
            parent_symbol: String::new(),
            complexity: 1,
            dependencies: vec!["os".to_string()],
            author: None,
            last_modified: None,
            content_hash: "hash".to_string(),
        }
    }

    fn unit(dim: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[hot] = 1.0;
        v
    }

    #[test]
    fn upsert_then_symbol_lookup() {
        let store = VectorStore::open_in_memory(4).unwrap();
        let chunks = vec![chunk("src/a.py", "foo", 1, "def foo(): pass")];
        store
            .upsert_chunks("p1", &chunks, &[unit(4, 0)])
            .unwrap();
        let found = store.find_chunks_by_symbol("p1", "foo", None).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, chunks[0].id);
        assert_eq!(found[0].dependencies, vec!["os".to_string()]);
    }

    #[test]
    fn reindex_replaces_file_rows() {
        let store = VectorStore::open_in_memory(4).unwrap();
        store
            .upsert_chunks(
                "p1",
                &[
                    chunk("src/a.py", "foo", 1, "v1"),
                    chunk("src/a.py", "bar", 5, "v1"),
                ],
                &[unit(4, 0), unit(4, 1)],
            )
            .unwrap();
        store
            .upsert_chunks("p1", &[chunk("src/a.py", "foo", 1, "v2")], &[unit(4, 0)])
            .unwrap();
        assert_eq!(store.count_chunks("p1").unwrap(), 1);
        assert!(store
            .find_chunks_by_symbol("p1", "bar", None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn vector_search_orders_by_distance() {
        let store = VectorStore::open_in_memory(4).unwrap();
        store
            .upsert_chunks(
                "p1",
                &[
                    chunk("src/a.py", "near", 1, "near"),
                    chunk("src/b.py", "far", 1, "far"),
                ],
                &[unit(4, 0), unit(4, 3)],
            )
            .unwrap();
        let hits = store.search("p1", &unit(4, 0), 2, None).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.symbol_name, "near");
        assert!(hits[0].distance < hits[1].distance);
    }

    #[test]
    fn reads_never_create_tables() {
        let store = VectorStore::open_in_memory(4).unwrap();
        assert!(store.search("ghost", &unit(4, 0), 5, None).unwrap().is_empty());
        assert_eq!(store.count_chunks("ghost").unwrap(), 0);
        let conn = store.conn.lock().unwrap();
        assert!(!VectorStore::table_exists(&conn, "chunks_ghost").unwrap());
    }

    #[test]
    fn projects_do_not_leak() {
        let store = VectorStore::open_in_memory(4).unwrap();
        store
            .upsert_chunks("p1", &[chunk("a.py", "only_in_p1", 1, "x")], &[unit(4, 0)])
            .unwrap();
        assert!(store
            .find_chunks_by_symbol("p2", "only_in_p1", None)
            .unwrap()
            .is_empty());
        store.delete_project("p1").unwrap();
        assert_eq!(store.count_chunks("p1").unwrap(), 0);
    }

    #[test]
    fn like_lookup_escapes_wildcards() {
        let store = VectorStore::open_in_memory(4).unwrap();
        store
            .upsert_chunks(
                "p1",
                &[
                    chunk("a.py", "pct", 1, "value = '100%'"),
                    chunk("b.py", "plain", 1, "value = 100"),
                ],
                &[unit(4, 0), unit(4, 1)],
            )
            .unwrap();
        let hits = store.find_chunks_containing_text("p1", "100%", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].symbol_name, "pct");
    }

    #[test]
    fn injection_attempt_is_rejected() {
        let store = VectorStore::open_in_memory(4).unwrap();
        store
            .upsert_chunks("p1", &[chunk("a.py", "foo", 1, "x")], &[unit(4, 0)])
            .unwrap();
        assert!(store
            .find_chunks_by_symbol("p1", "x' OR '1'='1", None)
            .is_err());
    }
}
