// Configuration for codeintel.
// Reads from environment variables with sensible defaults.

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

static CONFIG: OnceLock<Config> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct Config {
    /// Embedding model name sent to the endpoint (EMBEDDING_MODEL)
    pub embedding_model: String,

    /// HTTP endpoint for embedding requests (EMBEDDING_ENDPOINT)
    pub embedding_endpoint: String,

    /// Fixed vector dimension per project (EMBEDDING_DIMENSIONS)
    pub embedding_dimensions: usize,

    /// Root directory for all persisted state (STORAGE_ROOT)
    pub storage_root: PathBuf,

    /// Concurrent embedding batches (CODEINTEL_EMBED_CONCURRENCY)
    pub embed_concurrency: usize,

    /// Concurrent git subprocesses (CODEINTEL_GIT_CONCURRENCY)
    pub git_concurrency: usize,

    /// Embedding request timeout in seconds (CODEINTEL_EMBED_TIMEOUT_SECS)
    pub embed_timeout_secs: u64,

    /// Git subprocess wall-clock budget in seconds (CODEINTEL_GIT_TIMEOUT_SECS)
    pub git_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding_model: "bge-m3:latest".to_string(),
            embedding_endpoint: "http://localhost:11434/api/embeddings".to_string(),
            embedding_dimensions: 1024,
            storage_root: default_storage_root(),
            embed_concurrency: 5,
            git_concurrency: 10,
            embed_timeout_secs: 60,
            git_timeout_secs: 10,
        }
    }
}

fn default_storage_root() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".codeintel")
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(val) = env::var("EMBEDDING_MODEL") {
            if !val.trim().is_empty() {
                config.embedding_model = val;
            }
        }
        if let Ok(val) = env::var("EMBEDDING_ENDPOINT") {
            if !val.trim().is_empty() {
                config.embedding_endpoint = val;
            }
        }
        if let Ok(val) = env::var("STORAGE_ROOT") {
            if !val.trim().is_empty() {
                config.storage_root = PathBuf::from(val);
            }
        }
        parse_env("EMBEDDING_DIMENSIONS", &mut config.embedding_dimensions);
        parse_env("CODEINTEL_EMBED_CONCURRENCY", &mut config.embed_concurrency);
        parse_env("CODEINTEL_GIT_CONCURRENCY", &mut config.git_concurrency);
        parse_env("CODEINTEL_EMBED_TIMEOUT_SECS", &mut config.embed_timeout_secs);
        parse_env("CODEINTEL_GIT_TIMEOUT_SECS", &mut config.git_timeout_secs);

        config
    }

    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::from_env)
    }

    pub fn store_db_path(&self) -> PathBuf {
        self.storage_root.join("db").join("index.sqlite")
    }

    pub fn graph_db_path(&self) -> PathBuf {
        self.storage_root.join("kg.sqlite")
    }

    pub fn cache_db_path(&self) -> PathBuf {
        self.storage_root.join("cache").join("embeddings.sqlite")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.storage_root.join("logs")
    }

    /// Creates the storage layout. Failure here is fatal: nothing can be
    /// persisted without it.
    pub fn ensure_dirs(&self) -> anyhow::Result<()> {
        for dir in [
            self.storage_root.join("db"),
            self.storage_root.join("cache"),
            self.log_dir(),
        ] {
            std::fs::create_dir_all(&dir)
                .map_err(|err| anyhow::anyhow!("create {}: {err}", dir.display()))?;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr + std::fmt::Display>(name: &str, slot: &mut T) {
    if let Ok(val) = env::var(name) {
        match val.parse() {
            Ok(parsed) => *slot = parsed,
            Err(_) => {
                tracing::warn!("invalid {name} value {val:?}, using default {slot}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.embed_concurrency, 5);
        assert_eq!(config.git_concurrency, 10);
        assert_eq!(config.embedding_dimensions, 1024);
        assert!(config.store_db_path().ends_with("db/index.sqlite"));
        assert!(config.cache_db_path().ends_with("cache/embeddings.sqlite"));
    }
}
