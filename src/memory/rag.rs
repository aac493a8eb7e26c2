//! 政策检索（RetrievalBackend）
//!
//! PolicyIndex：政策文档分块 -> 嵌入 -> 内存索引；search 先按向量余弦取 fetch_k 个候选，
//! 再对候选做语义 / 词法两路 min-max 归一化，按 `alpha * semantic + (1 - alpha) * lexical` 混合打分取 top_k。
//! 空结果是合法输出，不是错误。

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use walkdir::WalkDir;

use crate::core::AgentError;
use crate::llm::EmbeddingProvider;
use crate::memory::tokenizer;

/// 检索参数（fetch_k 个候选中取 top_k，alpha 为语义分权重）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    pub fetch_k: usize,
    pub top_k: usize,
    pub alpha: f32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            fetch_k: 10,
            top_k: 3,
            alpha: 0.85,
        }
    }
}

/// 一条检索结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    /// 来源政策文档 ID（文件名去扩展名）
    pub doc_id: String,
    pub chunk_id: String,
    pub text: String,
    /// 混合得分（0..=1）
    pub score: f32,
}

/// 检索后端：按自由文本查询返回有序片段，可能为空
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    async fn search(&self, query: &str, params: SearchParams) -> Result<Vec<Snippet>, AgentError>;
}

/// 文档块
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub doc_id: String,
    pub text: String,
    /// 在原文档中的字节偏移
    pub offset: usize,
}

/// 分块参数（字符数）
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// 断句分隔符，按优先级从高到低
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separators: vec!["\n\n".into(), "\n".into(), " ".into()],
        }
    }
}

/// 递归分隔符分块器（UTF-8 安全）
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn chunk(&self, doc_id: &str, text: &str) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let size = self.config.chunk_size.max(1);
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < total {
            let target_end = (start + size).min(total);
            let mut end = target_end;

            // 非文末时，在窗口内最靠后的高优先级分隔符处断开
            if target_end < total {
                let window: String = chars[start..target_end].iter().collect();
                for sep in &self.config.separators {
                    if let Some(pos) = window.rfind(sep.as_str()) {
                        let cut = window[..pos].chars().count() + sep.chars().count();
                        if cut > 0 {
                            end = start + cut;
                            break;
                        }
                    }
                }
            }

            let piece: String = chars[start..end].iter().collect();
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                let offset = chars[..start].iter().map(|c| c.len_utf8()).sum();
                chunks.push(Chunk {
                    id: format!("{}_{}", doc_id, chunks.len()),
                    doc_id: doc_id.to_string(),
                    text: trimmed.to_string(),
                    offset,
                });
            }

            if end >= total {
                break;
            }
            let overlap = self.config.chunk_overlap.min(end - start);
            let next = end - overlap;
            start = if next > start { next } else { end };
        }

        chunks
    }
}

struct IndexedChunk {
    chunk: Chunk,
    embedding: Vec<f32>,
    tokens: std::collections::HashSet<String>,
}

/// 内存政策索引
pub struct PolicyIndex {
    entries: RwLock<Vec<IndexedChunk>>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Chunker,
}

impl PolicyIndex {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            embedder,
            chunker: Chunker::default(),
        }
    }

    pub fn with_chunking_config(mut self, config: ChunkingConfig) -> Self {
        self.chunker = Chunker::new(config);
        self
    }

    /// 索引一篇文档（同 doc_id 的旧块先移除），返回新增块数
    pub async fn index_document(&self, doc_id: &str, text: &str) -> anyhow::Result<usize> {
        let mut indexed = Vec::new();
        for chunk in self.chunker.chunk(doc_id, text) {
            let embedding = self
                .embedder
                .embed(&chunk.text)
                .await
                .map_err(|e| anyhow::anyhow!("embed {}: {}", chunk.id, e))?;
            let tokens = tokenizer::token_set(&chunk.text);
            indexed.push(IndexedChunk {
                chunk,
                embedding,
                tokens,
            });
        }
        let added = indexed.len();
        let mut entries = self.entries.write().await;
        entries.retain(|e| e.chunk.doc_id != doc_id);
        entries.extend(indexed);
        Ok(added)
    }

    /// 遍历目录，索引所有 .md / .txt 政策文档；返回总块数
    pub async fn ingest_dir(&self, dir: impl AsRef<Path>) -> anyhow::Result<usize> {
        let dir = dir.as_ref();
        let mut total = 0;
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.with_context(|| format!("walk {}", dir.display()))?;
            let path = entry.path();
            let is_doc = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("txt"));
            if !entry.file_type().is_file() || !is_doc {
                continue;
            }
            let doc_id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("policy")
                .to_string();
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("read policy {}", path.display()))?;
            let added = self.index_document(&doc_id, &text).await?;
            tracing::debug!(doc_id = %doc_id, chunks = added, "policy indexed");
            total += added;
        }
        tracing::info!(dir = %dir.display(), chunks = total, "policy index ready");
        Ok(total)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl RetrievalBackend for PolicyIndex {
    async fn search(&self, query: &str, params: SearchParams) -> Result<Vec<Snippet>, AgentError> {
        let entries = self.entries.read().await;
        if entries.is_empty() || params.top_k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(AgentError::RetrievalFailed)?;

        // 1) 候选：余弦相似度前 fetch_k，映射到 [0, 1]
        let mut candidates: Vec<(f32, &IndexedChunk)> = entries
            .iter()
            .map(|e| {
                let cos = cosine_similarity(&query_embedding, &e.embedding);
                (((cos + 1.0) / 2.0).max(0.0), e)
            })
            .collect();
        candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(params.fetch_k.max(params.top_k));

        // 2) 词法重叠
        let query_tokens = tokenizer::token_set(query);
        let semantic: Vec<f32> = candidates.iter().map(|(s, _)| *s).collect();
        let lexical: Vec<f32> = candidates
            .iter()
            .map(|(_, e)| tokenizer::overlap_ratio(&query_tokens, &e.tokens))
            .collect();

        // 3) 归一化后混合
        let semantic = min_max_normalize(&semantic);
        let lexical = min_max_normalize(&lexical);
        let alpha = params.alpha.clamp(0.0, 1.0);
        let mut scored: Vec<Snippet> = candidates
            .iter()
            .zip(semantic.iter().zip(lexical.iter()))
            .map(|((_, e), (s, l))| Snippet {
                doc_id: e.chunk.doc_id.clone(),
                chunk_id: e.chunk.id.clone(),
                text: e.chunk.text.clone(),
                score: alpha * s + (1.0 - alpha) * l,
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(params.top_k);

        let confidence = scored.first().map(|s| s.score).unwrap_or(0.0);
        let doc_ids: Vec<&str> = scored.iter().map(|s| s.doc_id.as_str()).collect();
        let record = serde_json::json!({
            "event": "retrieval",
            "query": query,
            "fetch_k": params.fetch_k,
            "top_k": params.top_k,
            "alpha": alpha,
            "doc_ids": doc_ids,
            "confidence": confidence,
        });
        tracing::info!(retrieval = %record, "rag");

        Ok(scored)
    }
}

/// 余弦相似度；维度不一致或零向量时为 0
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// min-max 归一化；全部相等时统一为 1.0
fn min_max_normalize(values: &[f32]) -> Vec<f32> {
    let Some(min) = values.iter().cloned().reduce(f32::min) else {
        return Vec::new();
    };
    let max = values.iter().cloned().fold(min, f32::max);
    if max - min < 1e-12 {
        return vec![1.0; values.len()];
    }
    values.iter().map(|v| (v - min) / (max - min)).collect()
}
