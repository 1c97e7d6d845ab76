//! Chunk translation contract

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::jobs::estimate::count_tokens;
use crate::jobs::models::Language;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum ProviderError {
    /// Retryable: rate limit, timeout, network
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Chunk-fatal: content rejected, unsupported encoding
    #[error("permanent provider error: {0}")]
    Permanent(String),
}

/// One chunk handed to the translation provider
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    pub job_id: Uuid,
    pub chunk_index: u32,
    pub text: String,
    pub source_lang: Language,
    pub target_lang: Language,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkTranslation {
    pub translated_text: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// External translation engine
#[async_trait]
pub trait ChunkProcessor: Send + Sync {
    async fn process(&self, request: &ChunkRequest) -> Result<ChunkTranslation, ProviderError>;
}

/// Placeholder engine that tags the text instead of translating it
#[derive(Debug, Clone, Default)]
pub struct StubProcessor;

impl StubProcessor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChunkProcessor for StubProcessor {
    async fn process(&self, request: &ChunkRequest) -> Result<ChunkTranslation, ProviderError> {
        let translated_text = format!(
            "[{}->{}] {}",
            request.source_lang, request.target_lang, request.text
        );
        tracing::debug!(
            job_id = %request.job_id,
            chunk_index = request.chunk_index,
            "Stub translation"
        );
        Ok(ChunkTranslation {
            tokens_in: count_tokens(&request.text),
            tokens_out: count_tokens(&translated_text),
            translated_text,
        })
    }
}
