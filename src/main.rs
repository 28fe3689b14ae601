use anyhow::Result;
use clap::Parser;
use codeintel::{cache, cli, config::Config, indexer::Engine, retriever, rpc};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    // stdout belongs to the JSON-RPC stream; everything diagnostic goes to
    // stderr. LOG_LEVEL feeds the filter, RUST_LOG still wins if set.
    let filter = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}

fn build_engine(offline: bool) -> Result<Engine> {
    let config = Config::get();
    if offline {
        Engine::offline(config)
    } else {
        Engine::new(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = cli::Args::parse();

    match args.command {
        cli::Command::Serve { offline } => {
            let engine = build_engine(offline)?;
            rpc::serve(engine).await
        }
        cli::Command::Reindex {
            root,
            force,
            include,
            exclude,
            offline,
        } => {
            let engine = build_engine(offline)?;
            let root = engine.resolve_root(&root)?;
            let summary = engine.refresh_index(&root, force, &include, &exclude).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        cli::Command::Search {
            root,
            query,
            limit,
            offline,
        } => {
            let engine = build_engine(offline)?;
            let root = engine.resolve_root(&root)?;
            let hits = retriever::search_code(&engine, &root, &query, limit, &[], &[]).await?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
            Ok(())
        }
        cli::Command::Stats { root } => {
            let engine = build_engine(true)?;
            let root = engine.resolve_root(&root)?;
            let stats = retriever::get_stats(&engine, &root).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        cli::Command::Request {
            method,
            params,
            id,
            offline,
        } => {
            let engine = build_engine(offline)?;
            let response = rpc::call(&engine, &method, &params, &id).await?;
            println!("{response}");
            Ok(())
        }
        cli::Command::PruneCache { days } => {
            let config = Config::get();
            config.ensure_dirs()?;
            let cache = cache::EmbeddingCache::open(&config.cache_db_path())?;
            let pruned = cache.prune(days)?;
            println!("{}", serde_json::json!({ "pruned": pruned }));
            Ok(())
        }
    }
}
