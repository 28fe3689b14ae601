use codeintel::config::Config;
use codeintel::indexer::Engine;
use codeintel::model::{confidence, edge_kind};
use codeintel::retriever;
use codeintel::util;
use std::fs;
use std::path::{Path, PathBuf};

fn engine_for(storage: &Path) -> Engine {
    let config = Config {
        storage_root: storage.to_path_buf(),
        embedding_dimensions: 16,
        ..Config::default()
    };
    Engine::offline(&config).unwrap()
}

fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn two_file_python_project_links_call_edge() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("proj");
    fs::create_dir_all(&root).unwrap();
    write(&root, "a.py", "def foo():\n    pass\n");
    write(&root, "b.py", "from a import foo\nfoo()\n");

    let engine = engine_for(&dir.path().join("storage"));
    let summary = engine.refresh_index(&root, false, &[], &[]).await.unwrap();
    assert_eq!(summary.indexed, 2);
    assert!(summary.errors.is_empty());
    assert!(summary.edges >= 1);

    let refs = retriever::find_references(&engine, &root, "foo").unwrap();
    let call = refs
        .iter()
        .find(|hit| hit.kind == edge_kind::CALL)
        .expect("call reference from b.py");
    assert_eq!(call.filename, "b.py");
    assert_eq!(call.confidence, confidence::STRUCTURAL);
}

#[tokio::test]
async fn unchanged_files_are_skipped_and_ids_stay_stable() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("proj");
    fs::create_dir_all(&root).unwrap();
    write(&root, "a.py", "def foo():\n    pass\n");
    write(&root, "b.py", "from a import foo\nfoo()\n");

    let engine = engine_for(&dir.path().join("storage"));
    engine.refresh_index(&root, false, &[], &[]).await.unwrap();

    // a no-op pass performs zero writes
    let second = engine.refresh_index(&root, false, &[], &[]).await.unwrap();
    assert_eq!(second.indexed, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(second.chunks, 0);

    // a comment-only edit re-indexes b.py and recreates its edges, while
    // the chunk id for foo in a.py never moves
    write(&root, "b.py", "# call helper\nfrom a import foo\nfoo()\n");
    let third = engine.refresh_index(&root, false, &[], &[]).await.unwrap();
    assert_eq!(third.indexed, 1);
    assert_eq!(third.skipped, 1);

    let refs = retriever::find_references(&engine, &root, "foo").unwrap();
    assert!(refs.iter().any(|hit| hit.kind == edge_kind::CALL
        && hit.filename == "b.py"
        && hit.confidence == confidence::STRUCTURAL));

    let defs = retriever::find_definition(&engine, &root, "foo", None, None).unwrap();
    assert_eq!(defs.len(), 1);
    let project = util::project_id(&root);
    let stored = engine_project_chunk_id(&engine, &project, "foo");
    assert_eq!(stored, util::chunk_id("a.py", "foo", defs[0].start_line));
}

fn engine_project_chunk_id(engine: &Engine, project: &str, symbol: &str) -> String {
    let chunks = engine
        .store()
        .find_chunks_by_symbol(project, symbol, None)
        .unwrap();
    chunks[0].id.clone()
}

#[tokio::test]
async fn deleted_files_drop_their_chunks_and_edges() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("proj");
    fs::create_dir_all(&root).unwrap();
    write(&root, "a.py", "def foo():\n    pass\n");
    write(&root, "b.py", "from a import foo\nfoo()\n");

    let engine = engine_for(&dir.path().join("storage"));
    engine.refresh_index(&root, false, &[], &[]).await.unwrap();

    fs::remove_file(root.join("b.py")).unwrap();
    let summary = engine.refresh_index(&root, false, &[], &[]).await.unwrap();
    assert!(summary.deleted >= 1);

    let refs = retriever::find_references(&engine, &root, "foo").unwrap();
    assert!(refs.iter().all(|hit| hit.filename != "b.py"));
}

#[tokio::test]
async fn projects_are_fully_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let root_a = dir.path().join("proj_a");
    let root_b = dir.path().join("proj_b");
    fs::create_dir_all(&root_a).unwrap();
    fs::create_dir_all(&root_b).unwrap();
    write(&root_a, "only_a.py", "def alpha_only(): pass\n");
    write(&root_b, "only_b.py", "def beta_only(): pass\n");

    let engine = engine_for(&dir.path().join("storage"));
    engine.refresh_index(&root_a, false, &[], &[]).await.unwrap();
    engine.refresh_index(&root_b, false, &[], &[]).await.unwrap();

    let cross = retriever::find_definition(&engine, &root_b, "alpha_only", None, None).unwrap();
    assert!(cross.is_empty());
    let own = retriever::find_definition(&engine, &root_b, "beta_only", None, None).unwrap();
    assert_eq!(own.len(), 1);
}

#[tokio::test]
async fn malicious_import_never_produces_an_edge() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("proj");
    fs::create_dir_all(&root).unwrap();
    write(
        &root,
        "evil.js",
        "import secrets from '../../../../etc/passwd';\nsecrets();\n",
    );

    let engine = engine_for(&dir.path().join("storage"));
    let summary = engine.refresh_index(&root, false, &[], &[]).await.unwrap();
    assert_eq!(summary.indexed, 1);

    let defs = retriever::find_definition(&engine, &root, "secrets", None, None).unwrap();
    assert!(defs.is_empty());
    // the hostile specifier resolved to nothing, so the graph stays empty
    let project = util::project_id(&root);
    assert_eq!(engine.graph().edge_count(&project).unwrap(), 0);
}

#[tokio::test]
async fn force_full_rebuilds_from_scratch() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("proj");
    fs::create_dir_all(&root).unwrap();
    write(&root, "a.py", "def foo():\n    pass\n");

    let engine = engine_for(&dir.path().join("storage"));
    engine.refresh_index(&root, false, &[], &[]).await.unwrap();
    let forced = engine.refresh_index(&root, true, &[], &[]).await.unwrap();
    assert_eq!(forced.indexed, 1);
    assert_eq!(forced.skipped, 0);

    let stats = retriever::get_stats(&engine, &root).await.unwrap();
    assert_eq!(stats.files, 1);
}
