use crate::cache::EmbeddingCache;
use crate::config::Config;
use crate::util;
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

const RETRY_ATTEMPTS: u32 = 3;

/// Text-to-vector client. Stateless with respect to projects: the cache is
/// keyed by model-scoped content hashes, so switching models never replays
/// vectors from another model.
pub struct Embedder {
    backend: Backend,
    cache: Arc<EmbeddingCache>,
    semaphore: Arc<Semaphore>,
    model: String,
    dims: usize,
}

enum Backend {
    Http {
        client: reqwest::Client,
        endpoint: String,
    },
    /// Deterministic vectors derived from the text hash. Used by tests and
    /// offline smoke runs; carries no semantic signal.
    Hashed,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl Embedder {
    pub fn http(config: &Config, cache: Arc<EmbeddingCache>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.embed_timeout_secs))
            .build()
            .context("build embedding http client")?;
        Ok(Self {
            backend: Backend::Http {
                client,
                endpoint: config.embedding_endpoint.clone(),
            },
            cache,
            semaphore: Arc::new(Semaphore::new(config.embed_concurrency.max(1))),
            model: config.embedding_model.clone(),
            dims: config.embedding_dimensions,
        })
    }

    pub fn hashed(dims: usize, cache: Arc<EmbeddingCache>) -> Self {
        Self {
            backend: Backend::Hashed,
            cache,
            semaphore: Arc::new(Semaphore::new(1)),
            model: "hashed".to_string(),
            dims,
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    fn cache_key(&self, text: &str) -> String {
        util::short_hash(&format!("{}:{}", self.model, text))
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(std::slice::from_ref(&text.to_string())).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow!("empty embedding response"))
    }

    /// Embed `texts`, returning vectors in input order. Cache hits are
    /// served locally; misses fan out under the global concurrency gate.
    /// Any miss that fails after retries fails the whole call, so a file is
    /// either fully vectorized or not upserted at all.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses: Vec<(usize, String)> = Vec::new();

        for (idx, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                vectors[idx] = Some(vec![0.0; self.dims]);
                continue;
            }
            if let Some(hit) = self.cache.get(&self.cache_key(text))? {
                vectors[idx] = Some(hit);
            } else {
                misses.push((idx, text.clone()));
            }
        }
        debug!(
            total = texts.len(),
            misses = misses.len(),
            "embedding batch"
        );

        match &self.backend {
            Backend::Hashed => {
                for (idx, text) in misses {
                    let vector = hashed_vector(&text, self.dims);
                    self.cache.set(&self.cache_key(&text), &self.model, &vector)?;
                    vectors[idx] = Some(vector);
                }
            }
            Backend::Http { client, endpoint } => {
                let mut tasks = tokio::task::JoinSet::new();
                for (idx, text) in misses {
                    let client = client.clone();
                    let endpoint = endpoint.clone();
                    let model = self.model.clone();
                    let semaphore = Arc::clone(&self.semaphore);
                    tasks.spawn(async move {
                        let _permit = semaphore
                            .acquire_owned()
                            .await
                            .map_err(|_| anyhow!("embedding gate closed"))?;
                        let vector = fetch_embedding(&client, &endpoint, &model, &text).await?;
                        Ok::<_, anyhow::Error>((idx, text, vector))
                    });
                }
                while let Some(joined) = tasks.join_next().await {
                    let (idx, text, vector) = joined.context("embedding task panicked")??;
                    if vector.len() != self.dims {
                        warn!(
                            expected = self.dims,
                            got = vector.len(),
                            "embedding dimension mismatch"
                        );
                    }
                    self.cache.set(&self.cache_key(&text), &self.model, &vector)?;
                    vectors[idx] = Some(vector);
                }
            }
        }

        vectors
            .into_iter()
            .map(|slot| slot.ok_or_else(|| anyhow!("embedding batch left a gap")))
            .collect()
    }
}

async fn fetch_embedding(
    client: &reqwest::Client,
    endpoint: &str,
    model: &str,
    text: &str,
) -> Result<Vec<f32>> {
    let body = serde_json::json!({ "model": model, "prompt": text });
    let mut last_err = None;

    for attempt in 0..RETRY_ATTEMPTS {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
        }
        let response = client.post(endpoint).json(&body).send().await;
        match response {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    let parsed: EmbedResponse = response
                        .json()
                        .await
                        .context("parse embedding response")?;
                    if parsed.embedding.is_empty() {
                        bail!("embedding response missing vector");
                    }
                    return Ok(parsed.embedding);
                }
                if status.is_server_error() {
                    last_err = Some(anyhow!("embedding endpoint returned {status}"));
                    continue;
                }
                bail!("embedding endpoint returned {status}");
            }
            Err(err) => {
                warn!(attempt, "embedding request failed: {err}");
                last_err = Some(err.into());
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow!("embedding failed after retries")))
}

/// Unit-norm pseudo-vector seeded by the text hash. Deterministic so tests
/// and repeated runs agree on bytes.
fn hashed_vector(text: &str, dims: usize) -> Vec<f32> {
    let digest = util::sha256_hex(text.as_bytes());
    let bytes = digest.as_bytes();
    let mut vector: Vec<f32> = (0..dims)
        .map(|i| {
            let b = bytes[i % bytes.len()];
            (b as f32 / 127.5) - 1.0 + (i as f32 * 1e-4)
        })
        .collect();
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashed_embedder(dims: usize) -> Embedder {
        let cache = Arc::new(EmbeddingCache::open_in_memory().unwrap());
        Embedder::hashed(dims, cache)
    }

    #[tokio::test]
    async fn preserves_input_order() {
        let embedder = hashed_embedder(16);
        let texts = vec!["alpha".to_string(), "beta".to_string(), "alpha".to_string()];
        let vectors = embedder.embed(&texts).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0], vectors[2]);
        assert_ne!(vectors[0], vectors[1]);
    }

    #[tokio::test]
    async fn empty_text_embeds_to_zero_vector() {
        let embedder = hashed_embedder(8);
        let vectors = embedder.embed(&["   ".to_string()]).await.unwrap();
        assert_eq!(vectors[0], vec![0.0; 8]);
    }

    #[tokio::test]
    async fn second_call_hits_cache() {
        let embedder = hashed_embedder(8);
        let first = embedder.embed_one("token").await.unwrap();
        let second = embedder.embed_one("token").await.unwrap();
        assert_eq!(first, second);
    }
}
