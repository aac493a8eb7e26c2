//! Agent 装配：根据配置创建 LLM / Oracle / 工具 / 政策索引 / Composer / 会话记忆
//!
//! 没有 API Key 时一切都能离线运行：Oracle 回落到规则，嵌入回落到特征哈希。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::agent::SupportAgent;
use crate::config::{load_config, AppConfig, OracleKind};
use crate::llm::{create_embedder_from_config, LlmClient, MockLlmClient, OpenAiClient};
use crate::memory::{
    ChunkingConfig, FileSessionMemory, InMemorySessionMemory, PolicyIndex, SearchParams, SessionMemory,
};
use crate::react::{ActionDispatcher, DecisionOracle, LlmOracle, ReasonActLoop, RuleOracle, TemplateComposer};
use crate::tools::{register_lookup_tools, MockStore, ToolExecutor, ToolRegistry};

fn openai_key() -> Option<String> {
    std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())
}

/// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / Mock）
pub(crate) fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    match openai_key() {
        Some(key) if provider != "mock" => {
            tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
            Arc::new(
                OpenAiClient::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, Some(&key))
                    .with_request_timeout(Duration::from_secs(cfg.llm.timeouts.request)),
            )
        }
        _ => {
            tracing::warn!("No API key set or provider is mock, using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
    }
}

/// 选择决策来源；配置为 llm 但没有 Key 时回落到规则
pub fn create_oracle(cfg: &AppConfig, tools: &ToolExecutor) -> Arc<dyn DecisionOracle> {
    match cfg.agent.oracle {
        OracleKind::Rule => Arc::new(RuleOracle::new()),
        OracleKind::Llm if openai_key().is_some() => {
            Arc::new(LlmOracle::new(create_llm_from_config(cfg)).with_tool_catalog(&tools.catalog()))
        }
        OracleKind::Llm => {
            tracing::warn!("oracle = llm but OPENAI_API_KEY is not set, falling back to rule oracle");
            Arc::new(RuleOracle::new())
        }
    }
}

/// 按配置装配完整的客服 Agent
pub async fn build_agent(cfg: &AppConfig) -> anyhow::Result<SupportAgent> {
    let store = MockStore::load(&cfg.tools.data_dir)
        .with_context(|| format!("Failed to load mock data from {}", cfg.tools.data_dir.display()))?;
    let mut registry = ToolRegistry::new();
    register_lookup_tools(&mut registry, Arc::new(store));
    let executor = ToolExecutor::new(registry, cfg.tools.tool_timeout_secs);

    let embedder = create_embedder_from_config(
        cfg.llm.base_url.as_deref(),
        cfg.rag.embedding_model.as_deref(),
        cfg.rag.embedding_dim,
    );
    let index = PolicyIndex::new(embedder).with_chunking_config(ChunkingConfig {
        chunk_size: cfg.rag.chunk_size,
        chunk_overlap: cfg.rag.chunk_overlap,
        ..ChunkingConfig::default()
    });
    if cfg.rag.policies_dir.is_dir() {
        let chunks = index
            .ingest_dir(&cfg.rag.policies_dir)
            .await
            .with_context(|| format!("Failed to index policies in {}", cfg.rag.policies_dir.display()))?;
        tracing::info!(chunks, dir = %cfg.rag.policies_dir.display(), "policy index ready");
    } else {
        tracing::warn!(dir = %cfg.rag.policies_dir.display(), "policies directory not found, retrieval will return nothing");
    }

    let oracle = create_oracle(cfg, &executor);
    let dispatcher = ActionDispatcher::new(Arc::new(executor), Arc::new(index))
        .with_search_params(SearchParams {
            fetch_k: cfg.rag.fetch_k,
            top_k: cfg.rag.top_k,
            alpha: cfg.rag.alpha,
        })
        .with_timeout(Duration::from_secs(cfg.agent.action_timeout_secs));

    tracing::info!(oracle = oracle.name(), max_iterations = cfg.agent.max_iterations, "agent configured");
    let react = ReasonActLoop::new(oracle, dispatcher, Arc::new(TemplateComposer::new()))
        .with_max_iterations(cfg.agent.max_iterations)
        .with_oracle_timeout(Duration::from_secs(cfg.agent.oracle_timeout_secs));

    let memory: Arc<dyn SessionMemory> = match &cfg.app.session_dir {
        Some(dir) => Arc::new(FileSessionMemory::new(dir).with_history_limit(cfg.agent.history_limit)),
        None => Arc::new(InMemorySessionMemory::new(cfg.agent.history_limit)),
    };

    Ok(SupportAgent::new(react, memory))
}

/// 加载配置（失败时使用默认值）并装配 Agent
pub async fn create_agent(config_path: Option<PathBuf>) -> anyhow::Result<SupportAgent> {
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    build_agent(&cfg).await
}
