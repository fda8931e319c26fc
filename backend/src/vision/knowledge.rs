use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::KnowledgeContext;

#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("Knowledge store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Query embedding failed: {0}")]
    EmbeddingFailed(String),
    #[error("No knowledge found for query")]
    NoResults,
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn breed_context(&self, breed: &str) -> Result<KnowledgeContext, KnowledgeError>;

    async fn crossbreed_context(
        &self,
        breeds: &[String; 2],
    ) -> Result<KnowledgeContext, KnowledgeError>;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
}

// Ranked chunk returned by the semantic store. `section` tags which part
// of a breed profile the chunk came from.
#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeChunk {
    pub text: String,
    pub source: String,
    pub section: String,
    #[allow(dead_code)]
    pub score: f32,
}

#[derive(Deserialize)]
struct SearchResponse {
    matches: Vec<KnowledgeChunk>,
}

#[derive(Clone)]
pub struct KnowledgeService {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    search_limit: usize,
}

impl KnowledgeService {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            timeout,
            search_limit: 8,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, KnowledgeError> {
        let response = self
            .http
            .post(self.endpoint("v1/embeddings"))
            .timeout(self.timeout)
            .json(&EmbeddingRequest { text })
            .send()
            .await
            .map_err(|e| KnowledgeError::StoreUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(KnowledgeError::EmbeddingFailed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| KnowledgeError::EmbeddingFailed(e.to_string()))?;
        Ok(parsed.embedding)
    }

    async fn search(&self, vector: &[f32]) -> Result<Vec<KnowledgeChunk>, KnowledgeError> {
        let response = self
            .http
            .post(self.endpoint("v1/search"))
            .timeout(self.timeout)
            .json(&SearchRequest {
                vector,
                limit: self.search_limit,
            })
            .send()
            .await
            .map_err(|e| KnowledgeError::StoreUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(KnowledgeError::StoreUnavailable(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| KnowledgeError::StoreUnavailable(e.to_string()))?;
        Ok(parsed.matches)
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<KnowledgeChunk>, KnowledgeError> {
        let vector = self.embed(query).await?;
        let chunks = self.search(&vector).await?;
        if chunks.is_empty() {
            return Err(KnowledgeError::NoResults);
        }
        Ok(chunks)
    }
}

#[async_trait]
impl KnowledgeStore for KnowledgeService {
    async fn breed_context(&self, breed: &str) -> Result<KnowledgeContext, KnowledgeError> {
        let query = format!(
            "{} breed profile, temperament, care and health considerations",
            display_breed(breed)
        );
        let chunks = self.retrieve(&query).await?;
        Ok(assemble_context(
            chunks,
            Some(breed.to_string()),
            None,
        ))
    }

    async fn crossbreed_context(
        &self,
        breeds: &[String; 2],
    ) -> Result<KnowledgeContext, KnowledgeError> {
        let query = format!(
            "{} {} mix traits, temperament, care and health considerations",
            display_breed(&breeds[0]),
            display_breed(&breeds[1]),
        );
        let chunks = self.retrieve(&query).await?;
        Ok(assemble_context(chunks, None, Some(breeds.to_vec())))
    }
}

pub fn display_breed(breed: &str) -> String {
    breed.replace('_', " ")
}

// Folds ranked chunks into the context shape: section-tagged chunks land
// in their slot, anything unrecognized counts as general description.
// Sources keep first-seen rank order without duplicates.
pub fn assemble_context(
    chunks: Vec<KnowledgeChunk>,
    breed: Option<String>,
    parent_breeds: Option<Vec<String>>,
) -> KnowledgeContext {
    let mut description = Vec::new();
    let mut care = Vec::new();
    let mut health = Vec::new();
    let mut sources: Vec<String> = Vec::new();

    for chunk in chunks {
        if !sources.contains(&chunk.source) {
            sources.push(chunk.source.clone());
        }
        match chunk.section.as_str() {
            "care" | "care_summary" => care.push(chunk.text),
            "health" | "health_info" => health.push(chunk.text),
            _ => description.push(chunk.text),
        }
    }

    KnowledgeContext {
        breed,
        parent_breeds,
        description: description.join(" "),
        care_summary: care.join(" "),
        health_info: health.join(" "),
        sources,
    }
}
