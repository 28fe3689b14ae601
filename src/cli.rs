use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "codeintel")]
#[command(about = "Local code intelligence: semantic indexing and retrieval over JSON-RPC stdio")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve JSON-RPC on stdin/stdout
    Serve {
        /// Use the deterministic offline embedder instead of the HTTP endpoint
        #[arg(long)]
        offline: bool,
    },
    /// Index (or re-index) a project root
    Reindex {
        root: String,
        /// Drop existing project state and rebuild from scratch
        #[arg(long)]
        force: bool,
        /// Include globs; only matching paths are indexed
        #[arg(long)]
        include: Vec<String>,
        /// Exclude globs; matching paths are skipped
        #[arg(long)]
        exclude: Vec<String>,
        #[arg(long)]
        offline: bool,
    },
    /// Hybrid semantic search over an indexed project
    Search {
        root: String,
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        offline: bool,
    },
    /// Project statistics
    Stats { root: String },
    /// One-shot JSON-RPC call, for debugging
    Request {
        method: String,
        #[arg(default_value = "{}")]
        params: String,
        #[arg(long, default_value = "cli")]
        id: String,
        #[arg(long)]
        offline: bool,
    },
    /// Delete embedding-cache rows unused for N days
    PruneCache {
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
}
