//! 嵌入：供政策检索索引使用
//!
//! OpenAiEmbedder 调 OpenAI 兼容的 /embeddings；HashEmbedder 为离线的特征哈希词袋向量，
//! 无 API Key 时使用，保证检索链路在本地可用。

use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;

use crate::memory::tokenizer;

/// 嵌入提供方
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 将文本编码为向量；失败时返回错误字符串
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String>;

    fn name(&self) -> &str;
}

/// 使用 async-openai 调用 OpenAI 兼容的 embeddings API
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url {
            config = config.with_api_base(url);
        }
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(vec![]);
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String(text.to_string()))
            .build()
            .map_err(|e| e.to_string())?;
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;
        Ok(response
            .data
            .first()
            .map(|e| e.embedding.clone())
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        &self.model
    }
}

const FNV_OFFSET: u64 = 14695981039346656037;
const FNV_PRIME: u64 = 1099511628211;

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// 特征哈希嵌入：每个词哈希到一个维度并按符号位 ±1 累加，最后 L2 归一化
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dimension];
        for token in tokenizer::tokenize(text) {
            let h = fnv1a(token.as_bytes());
            let idx = (h % self.dimension as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            vec[idx] += sign;
        }
        let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vec.iter_mut().for_each(|x| *x /= norm);
        }
        vec
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        Ok(self.embed_text(text))
    }

    fn name(&self) -> &str {
        "feature-hash"
    }
}

/// 根据配置选择嵌入：有模型名与 OPENAI_API_KEY 时用 OpenAI，否则特征哈希
pub fn create_embedder_from_config(
    base_url: Option<&str>,
    model: Option<&str>,
    dimension: usize,
) -> Arc<dyn EmbeddingProvider> {
    let key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
    match (model, key) {
        (Some(model), Some(key)) => {
            tracing::info!("Using OpenAI embeddings ({})", model);
            Arc::new(OpenAiEmbedder::new(base_url, model, &key))
        }
        _ => {
            tracing::debug!("embedding: no model or OPENAI_API_KEY, using feature hashing");
            Arc::new(HashEmbedder::new(dimension))
        }
    }
}
