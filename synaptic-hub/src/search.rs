//! Relevance scoring for `search_tools` and keyword selection.
//!
//! Two strategies: cosine similarity against the registry's precomputed
//! embeddings (query embedded through an OpenAI-compatible endpoint), and a
//! plain text match used whenever embeddings or the endpoint are unavailable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::registry::RegistryMap;

/// A registry entry and its relevance to a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredName {
    pub name: String,
    pub score: f32,
}

#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// Rank corpus entries against `query`, highest score first.
    async fn score(&self, query: &str, corpus: &RegistryMap) -> Vec<ScoredName>;
}

/// Produces an embedding vector for free text
#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Option<Vec<f32>>;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator == 0.0 {
        0.0
    } else {
        dot / denominator
    }
}

fn sort_desc(results: &mut [ScoredName]) {
    // stable: ties keep registry order
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Keyword OR-match over name, description and category.
///
/// Per keyword the best field wins: exact name 1.0, name contains 0.8,
/// description 0.6, category 0.4. Each extra matching keyword adds 0.1,
/// capped at 1.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextMatchScorer;

impl TextMatchScorer {
    pub fn rank(&self, query: &str, corpus: &RegistryMap) -> Vec<ScoredName> {
        let query_lower = query.to_lowercase();
        let keywords: Vec<&str> = query_lower.split_whitespace().collect();
        if keywords.is_empty() {
            return Vec::new();
        }

        let mut results = Vec::new();
        for (name, descriptor) in corpus {
            let name_lower = name.to_lowercase();
            let description_lower = descriptor.description.to_lowercase();
            let category_lower = descriptor.category.as_str().to_lowercase();

            let mut score = 0.0f32;
            let mut match_count = 0u32;
            for keyword in &keywords {
                let keyword_score = if name_lower == *keyword {
                    1.0
                } else if name_lower.contains(keyword) {
                    0.8
                } else if description_lower.contains(keyword) {
                    0.6
                } else if category_lower.contains(keyword) {
                    0.4
                } else {
                    continue;
                };
                score = score.max(keyword_score);
                match_count += 1;
            }

            if match_count > 1 {
                score = (score + (match_count - 1) as f32 * 0.1).min(1.0);
            }
            if score > 0.0 {
                results.push(ScoredName {
                    name: name.clone(),
                    score,
                });
            }
        }
        sort_desc(&mut results);
        results
    }
}

#[async_trait]
impl RelevanceScorer for TextMatchScorer {
    async fn score(&self, query: &str, corpus: &RegistryMap) -> Vec<ScoredName> {
        self.rank(query, corpus)
    }
}

/// Semantic ranking over precomputed embeddings with a text-match fallback
pub struct EmbeddingScorer {
    embedder: Arc<dyn QueryEmbedder>,
    fallback: TextMatchScorer,
}

impl EmbeddingScorer {
    pub fn new(embedder: Arc<dyn QueryEmbedder>) -> Self {
        Self {
            embedder,
            fallback: TextMatchScorer,
        }
    }
}

#[async_trait]
impl RelevanceScorer for EmbeddingScorer {
    async fn score(&self, query: &str, corpus: &RegistryMap) -> Vec<ScoredName> {
        let has_embeddings = corpus.values().any(|d| d.embedding.is_some());
        if !has_embeddings {
            return self.fallback.rank(query, corpus);
        }

        let Some(query_embedding) = self.embedder.embed(query).await else {
            debug!("[Search] No query embedding available, using text match");
            return self.fallback.rank(query, corpus);
        };

        let mut results: Vec<ScoredName> = corpus
            .iter()
            .filter_map(|(name, descriptor)| {
                descriptor.embedding.as_ref().map(|embedding| ScoredName {
                    name: name.clone(),
                    score: cosine_similarity(&query_embedding, embedding),
                })
            })
            .collect();
        if results.is_empty() {
            return self.fallback.rank(query, corpus);
        }
        sort_desc(&mut results);
        results
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `/embeddings` endpoint, with a per-process cache
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    config: EmbeddingConfig,
    api_key: Option<String>,
    cache: DashMap<String, Vec<f32>>,
}

impl OpenAiEmbedder {
    pub fn from_config(config: EmbeddingConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!(
                "[Search] {} not set; keyword search will use text matching",
                config.api_key_env
            );
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            config,
            api_key,
            cache: DashMap::new(),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    async fn request(&self, api_key: &str, text: &str) -> Result<Vec<f32>, String> {
        let url = format!("{}/embeddings", self.config.api_base.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&json!({ "model": self.config.model, "input": text }))
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;
        let body: EmbeddingResponse = response.json().await.map_err(|e| e.to_string())?;
        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| "empty embedding response".to_string())
    }
}

#[async_trait]
impl QueryEmbedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let key = text.trim().to_lowercase();
        if key.is_empty() {
            return None;
        }
        if let Some(hit) = self.cache.get(&key) {
            return Some(hit.clone());
        }
        let api_key = self.api_key.as_deref()?;
        match self.request(api_key, text).await {
            Ok(embedding) => {
                self.cache.insert(key, embedding.clone());
                Some(embedding)
            }
            Err(e) => {
                warn!("[Search] Embedding request failed: {}", e);
                None
            }
        }
    }
}
