//! LLM 层：决策用的对话补全客户端（OpenAI 兼容 / Mock）与政策检索用的嵌入

pub mod embedding;
pub mod mock;
pub mod openai;
pub mod traits;

pub use embedding::{create_embedder_from_config, EmbeddingProvider, HashEmbedder, OpenAiEmbedder};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::LlmClient;
