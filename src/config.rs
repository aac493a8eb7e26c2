//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SUPPORT__*` 覆盖（双下划线表示嵌套，如 `SUPPORT__AGENT__ORACLE=llm`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub agent: AgentSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub rag: RagSection,
}

/// [app] 段：应用名、会话文件目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 会话 JSON 文件目录；未设置时会话只保存在内存中
    pub session_dir: Option<PathBuf>,
}

/// 决策来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OracleKind {
    /// 确定性规则
    #[default]
    Rule,
    /// LLM（需要 OPENAI_API_KEY，缺失时回落到 rule）
    Llm,
}

/// [agent] 段：ReAct 循环参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_iterations: usize,
    /// 会话历史保留轮数
    pub history_limit: usize,
    pub oracle: OracleKind,
    /// 单次 Oracle / Composer 调用超时（秒）
    pub oracle_timeout_secs: u64,
    /// 单次工具 / 检索调用的外层超时（秒）
    pub action_timeout_secs: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            history_limit: 20,
            oracle: OracleKind::Rule,
            oracle_timeout_secs: 30,
            action_timeout_secs: 15,
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [tools] 段：模拟数据目录、工具超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// orders.json / refunds.json / inventory.json 所在目录
    pub data_dir: PathBuf,
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            tool_timeout_secs: 10,
        }
    }
}

/// [rag] 段：政策目录、检索与分块参数、嵌入
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagSection {
    pub policies_dir: PathBuf,
    pub fetch_k: usize,
    pub top_k: usize,
    /// 语义分权重（0..=1）
    pub alpha: f32,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// 特征哈希嵌入维度
    pub embedding_dim: usize,
    /// 设置且有 OPENAI_API_KEY 时使用 OpenAI embeddings
    pub embedding_model: Option<String>,
}

impl Default for RagSection {
    fn default() -> Self {
        Self {
            policies_dir: PathBuf::from("data/policies"),
            fetch_k: 10,
            top_k: 3,
            alpha: 0.85,
            chunk_size: 1000,
            chunk_overlap: 200,
            embedding_dim: 256,
            embedding_model: None,
        }
    }
}

/// 从 config 目录加载配置，环境变量 SUPPORT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SUPPORT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SUPPORT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
