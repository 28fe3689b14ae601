use crate::graph::KnowledgeGraph;
use crate::model::{confidence, edge_kind, usage_kind, EdgeRecord, Usage};
use crate::parser::ParsedFile;
use crate::resolve::Resolvers;
use crate::retriever::file_priority;
use crate::store::VectorStore;
use anyhow::Result;
use serde_json::json;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Cap on name-match fallback targets per usage; a common name matching
/// dozens of definitions says nothing about any one of them.
const MAX_NAME_MATCH_TARGETS: usize = 3;

/// Pass 2 for one file: resolve every usage the parser recorded into
/// edges, import-resolution first, then same-file scope, then the
/// project-global name fallback. Edges land in one batch per file.
pub fn link_file(
    project: &str,
    project_root: &Path,
    filename: &str,
    language: &str,
    parsed: &ParsedFile,
    resolvers: &Resolvers,
    store: &VectorStore,
    graph: &KnowledgeGraph,
) -> Result<usize> {
    let dependencies: Vec<String> = parsed
        .chunks
        .first()
        .map(|chunk| chunk.dependencies.clone())
        .unwrap_or_default();
    let source_abs = project_root.join(filename);

    // resolve each import once; reused for usage lookups and import edges
    let mut resolved_imports: Vec<String> = Vec::new();
    for dep in &dependencies {
        if let Some(rel) = resolvers.resolve(language, dep, &source_abs, project_root) {
            if rel != filename && !resolved_imports.contains(&rel) {
                resolved_imports.push(rel);
            }
        }
    }

    let mut edges: Vec<EdgeRecord> = Vec::new();
    let mut seen: HashSet<(String, String, String)> = HashSet::new();

    for usage in &parsed.usages {
        let (targets, conf) = resolve_usage(
            project,
            filename,
            language,
            usage,
            &resolved_imports,
            store,
        )?;
        for target_id in targets {
            if target_id == usage.chunk_id {
                continue;
            }
            let kind = edge_kind_for(usage);
            let key = (usage.chunk_id.clone(), target_id.clone(), kind.to_string());
            if !seen.insert(key) {
                continue;
            }
            edges.push(EdgeRecord {
                source_id: usage.chunk_id.clone(),
                target_id,
                kind: kind.to_string(),
                confidence: conf.to_string(),
                detail: usage.context.as_ref().map(|context| {
                    json!({ "context": context, "line": usage.line }).to_string()
                }),
            });
        }
    }

    // one import edge per resolved file, anchored on the lead chunks
    if let Some(lead) = parsed.chunks.first() {
        for rel in &resolved_imports {
            let Some(target_lead) = store.chunks_for_file(project, rel)?.into_iter().next() else {
                continue;
            };
            if target_lead.id == lead.id {
                continue;
            }
            let key = (
                lead.id.clone(),
                target_lead.id.clone(),
                edge_kind::IMPORT.to_string(),
            );
            if seen.insert(key) {
                edges.push(EdgeRecord {
                    source_id: lead.id.clone(),
                    target_id: target_lead.id,
                    kind: edge_kind::IMPORT.to_string(),
                    confidence: confidence::STRUCTURAL.to_string(),
                    detail: None,
                });
            }
        }
    }

    let written = graph.insert_batch(project, &edges)?;
    debug!(filename, edges = written, "linked file");
    Ok(written)
}

/// Target chunk ids for a usage plus the confidence of how they were
/// found. Import and same-file hits are structural; the global fallback
/// is name-only evidence.
fn resolve_usage(
    project: &str,
    filename: &str,
    language: &str,
    usage: &Usage,
    resolved_imports: &[String],
    store: &VectorStore,
) -> Result<(Vec<String>, &'static str)> {
    for rel in resolved_imports {
        let matches = store.find_chunks_by_symbol(project, &usage.name, Some(rel))?;
        if !matches.is_empty() {
            return Ok((
                matches.into_iter().map(|c| c.id).collect(),
                confidence::STRUCTURAL,
            ));
        }
    }

    let same_file = store.find_chunks_by_symbol(project, &usage.name, Some(filename))?;
    if !same_file.is_empty() {
        return Ok((
            same_file.into_iter().map(|c| c.id).collect(),
            confidence::STRUCTURAL,
        ));
    }

    let mut global = store.find_chunks_by_symbol(project, &usage.name, None)?;
    global.retain(|chunk| chunk.language == language);
    global.sort_by(|a, b| {
        file_priority(&a.filename)
            .cmp(&file_priority(&b.filename))
            .then_with(|| a.filename.cmp(&b.filename))
    });
    global.truncate(MAX_NAME_MATCH_TARGETS);
    Ok((
        global.into_iter().map(|c| c.id).collect(),
        confidence::NAME_MATCH,
    ))
}

fn edge_kind_for(usage: &Usage) -> &'static str {
    match usage.kind.as_str() {
        usage_kind::CALL => edge_kind::CALL,
        usage_kind::DECORATOR => edge_kind::DECORATOR,
        usage_kind::INSTANTIATION => edge_kind::INSTANTIATE,
        usage_kind::REFERENCE => {
            if usage.context.as_deref() == Some("inherits") {
                edge_kind::INHERIT
            } else {
                edge_kind::REFERENCE
            }
        }
        _ => edge_kind::REFERENCE,
    }
}
