use crate::cache::EmbeddingCache;
use crate::config::Config;
use crate::embedder::Embedder;
use crate::gitmeta;
use crate::graph::KnowledgeGraph;
use crate::linker;
use crate::model::{FileError, RefreshSummary};
use crate::parser::{CodeParser, ParsedFile};
use crate::resolve::Resolvers;
use crate::store::VectorStore;
use crate::util;
use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};

pub mod scan;

/// The engine owns every long-lived collaborator: parser, embedder, the
/// two stores, and the resolver set. All per-project state is keyed by
/// project id; nothing global is mutable.
pub struct Engine {
    pub(crate) parser: Mutex<CodeParser>,
    pub(crate) embedder: Embedder,
    pub(crate) store: VectorStore,
    pub(crate) graph: KnowledgeGraph,
    pub(crate) resolvers: Resolvers,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Engine {
    pub fn new(config: &Config) -> Result<Self> {
        config.ensure_dirs()?;
        let cache = Arc::new(EmbeddingCache::open(&config.cache_db_path())?);
        let embedder = Embedder::http(config, cache)?;
        Self::with_embedder(config, embedder)
    }

    /// Engine with a deterministic hash embedder; no endpoint required.
    pub fn offline(config: &Config) -> Result<Self> {
        config.ensure_dirs()?;
        let cache = Arc::new(EmbeddingCache::open(&config.cache_db_path())?);
        let embedder = Embedder::hashed(config.embedding_dimensions, cache);
        Self::with_embedder(config, embedder)
    }

    fn with_embedder(config: &Config, embedder: Embedder) -> Result<Self> {
        Ok(Self {
            parser: Mutex::new(CodeParser::new()?),
            embedder,
            store: VectorStore::open(&config.store_db_path(), config.embedding_dimensions)?,
            graph: KnowledgeGraph::open(&config.graph_db_path())?,
            resolvers: Resolvers::new(),
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    /// One index pass and one retrieval mutation at a time per project.
    pub(crate) fn project_lock(&self, project: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        Arc::clone(
            locks
                .entry(project.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    pub fn resolve_root(&self, root_path: &str) -> Result<PathBuf> {
        let root = std::fs::canonicalize(root_path)
            .with_context(|| format!("project root {root_path} does not exist"))?;
        Ok(root)
    }

    /// Scan, hash-compare, parse, embed, upsert, then link usages and
    /// enrich with git metadata. Per-file failures are isolated into the
    /// summary; a file that fails is retried on the next pass because its
    /// stored hash never advances.
    pub async fn refresh_index(
        &self,
        root: &Path,
        force_full: bool,
        include: &[String],
        exclude: &[String],
    ) -> Result<RefreshSummary> {
        let started = Instant::now();
        let project = util::project_id(root);
        let lock = self.project_lock(&project);
        let _guard = lock.lock().await;

        if force_full {
            info!(%project, "force full scan: clearing project state");
            self.store.delete_project(&project)?;
            self.graph.clear_project(&project)?;
        }

        let scope = scan::ScopeFilter::new(include, exclude)?;
        let scanned = scan::scan_project(root, &scope)?;
        let stored = self.store.stored_hashes(&project)?;

        let mut summary = RefreshSummary::default();

        // files that would have been scanned but are gone from disk
        let seen: HashSet<&str> = scanned.iter().map(|f| f.rel_path.as_str()).collect();
        let vanished: Vec<String> = stored
            .keys()
            .filter(|path| !seen.contains(path.as_str()) && scope.allows(path))
            .cloned()
            .collect();
        if !vanished.is_empty() {
            let old_ids = self.store.chunk_ids_for_files(&project, &vanished)?;
            self.graph.clear_sources(&project, &old_ids)?;
            summary.deleted = self.store.delete_files(&project, &vanished)?;
        }

        // Pass 1: parse, embed, upsert. Parsed files are kept in memory
        // for pass 2 so nothing is parsed twice; the map dies with the
        // call, bounding its footprint to one refresh.
        let mut parsed_files: BTreeMap<String, (String, ParsedFile)> = BTreeMap::new();
        for file in &scanned {
            if !force_full {
                if stored.get(&file.rel_path).map(|hash| hash.as_str()) == Some(file.hash.as_str())
                {
                    summary.skipped += 1;
                    continue;
                }
            }
            let source = match std::fs::read(&file.abs_path) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(err) => {
                    summary.errors.push(FileError {
                        file: file.rel_path.clone(),
                        kind: "parse".to_string(),
                        msg: err.to_string(),
                    });
                    continue;
                }
            };

            let parsed = {
                let mut parser = self.parser.lock().unwrap();
                parser.parse_file(&file.rel_path, &file.language, &source, &file.hash)
            };
            let parsed = match parsed {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(file = %file.rel_path, "parser failed: {err}");
                    summary.errors.push(FileError {
                        file: file.rel_path.clone(),
                        kind: "parse".to_string(),
                        msg: err.to_string(),
                    });
                    continue;
                }
            };

            let texts: Vec<String> = parsed.chunks.iter().map(|c| c.content.clone()).collect();
            let vectors = match self.embedder.embed(&texts).await {
                Ok(vectors) => vectors,
                Err(err) => {
                    warn!(file = %file.rel_path, "embedding failed: {err}");
                    summary.errors.push(FileError {
                        file: file.rel_path.clone(),
                        kind: "embedding".to_string(),
                        msg: err.to_string(),
                    });
                    continue;
                }
            };

            // edges sourced at this file's old chunks are stale the moment
            // the new rows land
            let old_ids = self
                .store
                .chunk_ids_for_files(&project, std::slice::from_ref(&file.rel_path))?;
            self.graph.clear_sources(&project, &old_ids)?;

            if let Err(err) = self.store.upsert_chunks(&project, &parsed.chunks, &vectors) {
                summary.errors.push(FileError {
                    file: file.rel_path.clone(),
                    kind: "storage".to_string(),
                    msg: err.to_string(),
                });
                continue;
            }
            summary.indexed += 1;
            summary.chunks += parsed.chunks.len();
            parsed_files.insert(file.rel_path.clone(), (file.language.clone(), parsed));
        }

        // Pass 2: every target already exists, so edges can never dangle.
        for (filename, (language, parsed)) in &parsed_files {
            match linker::link_file(
                &project,
                root,
                filename,
                language,
                parsed,
                &self.resolvers,
                &self.store,
                &self.graph,
            ) {
                Ok(edges) => summary.edges += edges,
                Err(err) => summary.errors.push(FileError {
                    file: filename.clone(),
                    kind: "storage".to_string(),
                    msg: err.to_string(),
                }),
            }
        }

        // Git enrichment runs after both passes; failures degrade to nulls.
        let indexed: Vec<String> = parsed_files.keys().cloned().collect();
        let git_info = gitmeta::batch_git_info(root, &indexed).await;
        for (filename, info) in git_info {
            if info.author.is_some() || info.last_modified.is_some() {
                self.store.update_git_meta(
                    &project,
                    &filename,
                    info.author.as_deref(),
                    info.last_modified.as_deref(),
                )?;
            }
        }

        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            %project,
            indexed = summary.indexed,
            skipped = summary.skipped,
            chunks = summary.chunks,
            edges = summary.edges,
            "refresh complete"
        );
        Ok(summary)
    }
}
