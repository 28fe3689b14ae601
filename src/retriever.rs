use crate::gitmeta;
use crate::indexer::Engine;
use crate::indexer::scan::ScopeFilter;
use crate::model::{
    confidence, edge_kind, Chunk, DefinitionHit, ProjectStats, ReferenceHit, SearchHit,
};
use crate::util;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

const MAX_KEYWORDS: usize = 3;
const KEYWORD_FETCH_LIMIT: usize = 10;
const MAX_DEFINITION_CANDIDATES: usize = 10;
const HIGH_RISK_COMPLEXITY: i64 = 10;
const STALE_AFTER_DAYS: i64 = 30;

/// Per-path retrieval rank; lower wins. Source trees beat tests beat
/// docs, and the ordering is stable for equal-priority paths.
pub fn file_priority(rel_path: &str) -> i64 {
    let lower = rel_path.to_ascii_lowercase();
    if lower.ends_with(".md") || lower.starts_with("docs/") || lower.contains("/docs/") {
        return 3;
    }
    let is_test = lower.starts_with("test")
        || lower.contains("/test")
        || lower.contains("_test.")
        || lower.contains(".test.")
        || Path::new(&lower)
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with("test_"))
            .unwrap_or(false);
    if is_test {
        return 2;
    }
    if lower.starts_with("src/") || lower.starts_with("lib/") || lower.starts_with("app/") {
        return 0;
    }
    1
}

/// Hybrid search: dense similarity first, keyword LIKE matches merged in,
/// glob post-filter, then a language and file-priority rerank.
pub async fn search_code(
    engine: &Engine,
    root: &Path,
    query: &str,
    limit: usize,
    include: &[String],
    exclude: &[String],
) -> Result<Vec<SearchHit>> {
    let limit = limit.clamp(1, 100);
    let project = util::project_id(root);
    let scope = ScopeFilter::new(include, exclude)?;

    let query_vector = engine
        .embedder
        .embed_one(query)
        .await
        .context("embed query")?;
    let fetch_limit = if scope.is_empty() { limit } else { limit * 5 };

    // vector leg
    let mut scored: Vec<(Chunk, f32)> = engine
        .store
        .search(&project, &query_vector, fetch_limit, None)?
        .into_iter()
        .map(|hit| (hit.chunk, 1.0 - hit.distance))
        .collect();

    // keyword leg, deduped against the vector results by chunk id
    let mut seen: HashMap<String, usize> = scored
        .iter()
        .enumerate()
        .map(|(idx, (chunk, _))| (chunk.id.clone(), idx))
        .collect();
    for keyword in extract_keywords(query) {
        let matches = engine
            .store
            .find_chunks_containing_text(&project, &keyword, KEYWORD_FETCH_LIMIT)?;
        for chunk in matches {
            if seen.contains_key(&chunk.id) {
                continue;
            }
            seen.insert(chunk.id.clone(), scored.len());
            scored.push((chunk, 0.0));
        }
    }

    scored.retain(|(chunk, _)| scope.allows(&chunk.filename));

    let query_language = infer_language(query);
    scored.sort_by(|(a, score_a), (b, score_b)| {
        let lang_a = query_language.as_deref() == Some(a.language.as_str());
        let lang_b = query_language.as_deref() == Some(b.language.as_str());
        lang_b
            .cmp(&lang_a)
            .then_with(|| file_priority(&a.filename).cmp(&file_priority(&b.filename)))
            .then_with(|| score_b.partial_cmp(score_a).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.filename.cmp(&b.filename))
    });
    scored.truncate(limit);

    debug!(%project, results = scored.len(), "search complete");
    Ok(scored
        .into_iter()
        .map(|(chunk, score)| SearchHit {
            filename: chunk.filename,
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            symbol_name: chunk.symbol_name,
            symbol_kind: chunk.symbol_kind,
            language: chunk.language,
            content: chunk.content,
            author: chunk.author,
            last_modified: chunk.last_modified,
            score,
        })
        .collect())
}

/// Up to three keywords: ALL-CAPS tokens of three letters or longer, or
/// any token of six letters or longer.
fn extract_keywords(query: &str) -> Vec<String> {
    let mut keywords = Vec::new();
    for token in query.split(|ch: char| !ch.is_ascii_alphabetic()) {
        if token.is_empty() {
            continue;
        }
        let all_caps = token.len() >= 3 && token.chars().all(|ch| ch.is_ascii_uppercase());
        if (all_caps || token.len() >= 6) && !keywords.iter().any(|k| k == token) {
            keywords.push(token.to_string());
            if keywords.len() == MAX_KEYWORDS {
                break;
            }
        }
    }
    keywords
}

/// Best-effort guess at the language a query is about, from language
/// names and file extensions mentioned in it.
fn infer_language(query: &str) -> Option<String> {
    let lower = query.to_ascii_lowercase();
    let table: &[(&str, &str)] = &[
        (".py", "python"),
        ("python", "python"),
        (".tsx", "tsx"),
        (".ts", "typescript"),
        ("typescript", "typescript"),
        (".jsx", "javascript"),
        (".js", "javascript"),
        ("javascript", "javascript"),
        ("golang", "go"),
        (".go", "go"),
        (".rs", "rust"),
        ("rust", "rust"),
        (".java", "java"),
        ("java", "java"),
        (".cpp", "cpp"),
        ("c++", "cpp"),
        (".dart", "dart"),
        ("dart", "dart"),
        ("flutter", "dart"),
        (".sql", "sql"),
        ("sql", "sql"),
        ("firestore", "firestore"),
        ("markdown", "markdown"),
    ];
    for (needle, language) in table {
        if lower.contains(needle) {
            return Some(language.to_string());
        }
    }
    None
}

/// Definition lookup: locate the requesting chunk by position, follow its
/// outgoing edges to definitions of `symbol`, and fall back to a
/// project-wide name lookup when the graph is silent.
pub fn find_definition(
    engine: &Engine,
    root: &Path,
    symbol: &str,
    filename: Option<&str>,
    line: Option<i64>,
) -> Result<Vec<DefinitionHit>> {
    let project = util::project_id(root);

    let mut hits: Vec<DefinitionHit> = Vec::new();
    if let (Some(filename), Some(line)) = (filename, line) {
        if let Some(requesting) = locate_chunk(engine, &project, root, filename, line)? {
            let edges = engine.graph.edges_from(&project, &requesting)?;
            let target_ids: Vec<String> = edges.iter().map(|e| e.target_id.clone()).collect();
            let targets = engine.store.get_chunks_by_ids(&project, &target_ids)?;
            let by_id: HashMap<&str, &Chunk> =
                targets.iter().map(|c| (c.id.as_str(), c)).collect();
            for edge in &edges {
                if let Some(chunk) = by_id.get(edge.target_id.as_str()) {
                    if chunk.symbol_name == symbol {
                        hits.push(definition_hit(chunk, &edge.confidence));
                    }
                }
            }
        }
    }

    if hits.is_empty() {
        let mut candidates = engine.store.find_chunks_by_symbol(&project, symbol, None)?;
        let language = filename.and_then(|f| crate::indexer::scan::detect_language(Path::new(f)));
        candidates.sort_by(|a, b| {
            let lang_a = language == Some(a.language.as_str()) || language.is_none();
            let lang_b = language == Some(b.language.as_str()) || language.is_none();
            lang_b
                .cmp(&lang_a)
                .then_with(|| file_priority(&a.filename).cmp(&file_priority(&b.filename)))
                .then_with(|| a.filename.cmp(&b.filename))
        });
        candidates.truncate(MAX_DEFINITION_CANDIDATES);
        hits = candidates
            .iter()
            .map(|chunk| definition_hit(chunk, confidence::NAME_MATCH))
            .collect();
    }
    Ok(hits)
}

/// The chunk covering (filename, line), from a fresh parse of the file on
/// disk; the stored rows answer when the file is unreadable.
fn locate_chunk(
    engine: &Engine,
    project: &str,
    root: &Path,
    filename: &str,
    line: i64,
) -> Result<Option<String>> {
    let abs = util::to_abs_path(root, filename);
    if let Ok(bytes) = std::fs::read(&abs) {
        let source = String::from_utf8_lossy(&bytes).into_owned();
        let language = crate::indexer::scan::detect_language(&abs).unwrap_or("text");
        let hash = util::sha256_hex(&bytes);
        let parsed = {
            let mut parser = engine.parser.lock().unwrap();
            parser.parse_file(filename, language, &source, &hash)
        };
        if let Ok(parsed) = parsed {
            let owner = parsed
                .chunks
                .iter()
                .filter(|c| c.start_line <= line && line <= c.end_line)
                .min_by_key(|c| c.end_line - c.start_line);
            if let Some(owner) = owner {
                return Ok(Some(owner.id.clone()));
            }
        }
    }
    Ok(engine
        .store
        .find_chunk_at(project, filename, line)?
        .map(|chunk| chunk.id))
}

fn definition_hit(chunk: &Chunk, conf: &str) -> DefinitionHit {
    DefinitionHit {
        filename: chunk.filename.clone(),
        start_line: chunk.start_line,
        end_line: chunk.end_line,
        symbol_name: chunk.symbol_name.clone(),
        symbol_kind: chunk.symbol_kind.clone(),
        language: chunk.language.clone(),
        signature: chunk.signature.clone(),
        confidence: conf.to_string(),
    }
}

/// Reference lookup: incoming edges of every definition named `symbol`,
/// falling back to a content scan tagged `name_match` when the graph has
/// nothing structural.
pub fn find_references(engine: &Engine, root: &Path, symbol: &str) -> Result<Vec<ReferenceHit>> {
    let project = util::project_id(root);
    let definitions = engine.store.find_chunks_by_symbol(&project, symbol, None)?;

    let mut hits: Vec<ReferenceHit> = Vec::new();
    for definition in &definitions {
        let edges = engine.graph.edges_to(&project, &definition.id)?;
        let source_ids: Vec<String> = edges.iter().map(|e| e.source_id.clone()).collect();
        let sources = engine.store.get_chunks_by_ids(&project, &source_ids)?;
        let by_id: HashMap<&str, &Chunk> = sources.iter().map(|c| (c.id.as_str(), c)).collect();
        for edge in &edges {
            let Some(source) = by_id.get(edge.source_id.as_str()) else {
                continue;
            };
            hits.push(ReferenceHit {
                filename: source.filename.clone(),
                start_line: source.start_line,
                end_line: source.end_line,
                symbol_name: source.symbol_name.clone(),
                kind: edge.kind.clone(),
                confidence: edge.confidence.clone(),
                context: edge
                    .detail
                    .as_deref()
                    .and_then(|detail| serde_json::from_str::<serde_json::Value>(detail).ok())
                    .and_then(|value| {
                        value.get("context").and_then(|c| c.as_str()).map(String::from)
                    }),
            });
        }
    }

    if hits.is_empty() {
        for chunk in engine
            .store
            .find_chunks_containing_text(&project, symbol, 20)?
        {
            if chunk.symbol_name == symbol {
                continue;
            }
            hits.push(ReferenceHit {
                filename: chunk.filename,
                start_line: chunk.start_line,
                end_line: chunk.end_line,
                symbol_name: chunk.symbol_name,
                kind: edge_kind::REFERENCE.to_string(),
                confidence: confidence::NAME_MATCH.to_string(),
                context: None,
            });
        }
    }

    hits.sort_by(|a, b| {
        file_priority(&a.filename)
            .cmp(&file_priority(&b.filename))
            .then_with(|| a.filename.cmp(&b.filename))
            .then_with(|| a.start_line.cmp(&b.start_line))
    });
    Ok(hits)
}

/// Project statistics: counts, language breakdown, dependency hubs,
/// high-complexity symbols without sibling tests, branch and staleness.
pub async fn get_stats(engine: &Engine, root: &Path) -> Result<ProjectStats> {
    let project = util::project_id(root);
    let chunks = engine.store.count_chunks(&project)?;
    let files = engine.store.count_files(&project)?;
    let languages = engine.store.language_breakdown(&project)?;
    let dependency_hubs = engine.store.dependency_hubs(&project, 10)?;
    let high_risk = engine
        .store
        .high_risk(&project, HIGH_RISK_COMPLEXITY, 10)?;
    let active_branch = gitmeta::active_branch(root).await;

    let cutoff = chrono::Utc::now() - chrono::Duration::days(STALE_AFTER_DAYS);
    let stale_files = engine
        .store
        .file_timestamps(&project)?
        .into_iter()
        .filter(|(_, modified)| {
            modified
                .as_deref()
                .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
                .map(|ts| ts.with_timezone(&chrono::Utc) < cutoff)
                .unwrap_or(false)
        })
        .count() as i64;

    Ok(ProjectStats {
        chunks,
        files,
        languages,
        dependency_hubs,
        high_risk,
        active_branch,
        stale_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_match_caps_and_long_tokens() {
        assert_eq!(
            extract_keywords("JWT authentication token flow"),
            vec!["JWT", "authentication"]
        );
        assert_eq!(extract_keywords("fix the bug"), Vec::<String>::new());
        // capped at three
        assert_eq!(
            extract_keywords("database storage indexing retrieval pipeline").len(),
            3
        );
    }

    #[test]
    fn priority_orders_source_tests_docs() {
        assert!(file_priority("src/auth.py") < file_priority("pkg/util.py"));
        assert!(file_priority("pkg/util.py") < file_priority("tests/test_auth.py"));
        assert!(file_priority("tests/test_auth.py") < file_priority("docs/auth.md"));
        assert_eq!(file_priority("lib/main.dart"), 0);
    }

    #[test]
    fn language_inference_from_query() {
        assert_eq!(infer_language("python auth middleware"), Some("python".to_string()));
        assert_eq!(infer_language("where is main.go"), Some("go".to_string()));
        assert_eq!(infer_language("login widget in flutter"), Some("dart".to_string()));
        assert_eq!(infer_language("authentication"), None);
    }
}
