use serde::Serialize;

/// Chunk kinds. A file with no extracted definitions yields a single
/// synthetic chunk of kind `CHUNK` covering the whole file.
pub mod symbol_kind {
    pub const FUNCTION: &str = "function";
    pub const CLASS: &str = "class";
    pub const METHOD: &str = "method";
    pub const VARIABLE: &str = "variable";
    pub const CONSTANT: &str = "constant";
    pub const MATCH_PATH: &str = "match_path";
    pub const DIAGRAM_NODE: &str = "diagram_node";
    pub const CHUNK: &str = "chunk";
}

pub mod usage_kind {
    pub const CALL: &str = "call";
    pub const DECORATOR: &str = "decorator";
    pub const INSTANTIATION: &str = "instantiation";
    pub const REFERENCE: &str = "reference";
    pub const MATCH_TARGET: &str = "match_target";
}

pub mod edge_kind {
    pub const CALL: &str = "call";
    pub const IMPORT: &str = "import";
    pub const INHERIT: &str = "inherit";
    pub const INSTANTIATE: &str = "instantiate";
    pub const DECORATOR: &str = "decorator";
    pub const REFERENCE: &str = "reference";
}

pub mod confidence {
    /// The edge came out of AST plus import-resolution linkage.
    pub const STRUCTURAL: &str = "structural";
    /// The edge rests on symbol-name equality alone.
    pub const NAME_MATCH: &str = "name_match";
}

/// The atomic semantic unit: one definition (or synthetic block) of one file.
/// `id = sha256(filename ":" symbol_name ":" start_line)[..32]`, stable
/// across runs given unchanged inputs. Vectors travel alongside chunks, not
/// inside them.
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    pub id: String,
    /// Project-root-relative, forward slashes.
    pub filename: String,
    pub language: String,
    /// Never empty; synthetic `<file>:<start>-<end>` for unnamed content.
    pub symbol_name: String,
    pub symbol_kind: String,
    pub start_line: i64,
    pub end_line: i64,
    pub content: String,
    /// Declared name plus parameter list for callables, empty otherwise.
    pub signature: String,
    pub docstring: String,
    /// Enclosing class name, empty at top level.
    pub parent_symbol: String,
    /// 1 + control-flow branch points in the node.
    pub complexity: i64,
    /// Import strings declared by the enclosing file.
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    /// sha256 of the file bytes at ingest; drives incremental skip.
    pub content_hash: String,
}

/// A transient name reference produced by the parser and consumed by the
/// linker. Never persisted as a row; only materialized into edges.
#[derive(Debug, Clone)]
pub struct Usage {
    /// Chunk the reference occurs in.
    pub chunk_id: String,
    /// Referenced identifier.
    pub name: String,
    pub kind: String,
    /// Optional enclosing call identifier, e.g. `Depends`.
    pub context: Option<String>,
    pub line: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeRecord {
    pub source_id: String,
    pub target_id: String,
    pub kind: String,
    pub confidence: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchHit {
    pub filename: String,
    pub start_line: i64,
    pub end_line: i64,
    pub symbol_name: String,
    pub symbol_kind: String,
    pub language: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    pub score: f32,
}

#[derive(Debug, Serialize)]
pub struct DefinitionHit {
    pub filename: String,
    pub start_line: i64,
    pub end_line: i64,
    pub symbol_name: String,
    pub symbol_kind: String,
    pub language: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub signature: String,
    pub confidence: String,
}

#[derive(Debug, Serialize)]
pub struct ReferenceHit {
    pub filename: String,
    pub start_line: i64,
    pub end_line: i64,
    pub symbol_name: String,
    pub kind: String,
    pub confidence: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FileError {
    pub file: String,
    pub kind: String,
    pub msg: String,
}

#[derive(Debug, Default, Serialize)]
pub struct RefreshSummary {
    pub indexed: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub chunks: usize,
    pub edges: usize,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FileError>,
}

#[derive(Debug, Serialize)]
pub struct LanguageCount {
    pub language: String,
    pub chunks: i64,
    pub files: i64,
}

#[derive(Debug, Serialize)]
pub struct DependencyHub {
    pub dependency: String,
    pub importers: i64,
}

#[derive(Debug, Serialize)]
pub struct RiskCandidate {
    pub filename: String,
    pub symbol_name: String,
    pub complexity: i64,
}

#[derive(Debug, Serialize)]
pub struct ProjectStats {
    pub chunks: i64,
    pub files: i64,
    pub languages: Vec<LanguageCount>,
    pub dependency_hubs: Vec<DependencyHub>,
    pub high_risk: Vec<RiskCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_branch: Option<String>,
    pub stale_files: i64,
}
