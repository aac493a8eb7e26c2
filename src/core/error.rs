//! Agent 错误类型与轨迹错误描述
//!
//! AgentError 是各外部协作方（Oracle / 工具后端 / 检索后端 / Composer / 会话存储）的失败形态；
//! ErrorKind + ErrorDescriptor 是写入 AgentState.errors 的运维可见分类，全部非致命。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Agent 运行过程中可能出现的错误（超时、解析、工具、检索、存储等）
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    #[error("Cancelled")]
    Cancelled,

    #[error("Decision oracle timeout")]
    OracleTimeout,

    #[error("Decision oracle failed: {0}")]
    OracleFailed(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Retrieval timeout")]
    RetrievalTimeout,

    #[error("Retrieval failed: {0}")]
    RetrievalFailed(String),

    #[error("Compose failed: {0}")]
    ComposeFailed(String),

    #[error("Session memory error: {0}")]
    Memory(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    /// 映射到轨迹中的错误分类；取消、存储、配置错误不进入轨迹，返回 None
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            AgentError::OracleTimeout
            | AgentError::OracleFailed(_)
            | AgentError::JsonParseError(_) => Some(ErrorKind::InvalidDecision),
            AgentError::ToolTimeout(_) | AgentError::RetrievalTimeout => {
                Some(ErrorKind::BackendTimeout)
            }
            AgentError::UnknownTool(_)
            | AgentError::ToolExecutionFailed(_)
            | AgentError::RetrievalFailed(_) => Some(ErrorKind::BackendError),
            AgentError::ComposeFailed(_) => Some(ErrorKind::ComposeError),
            AgentError::Cancelled | AgentError::Memory(_) | AgentError::Config(_) => None,
        }
    }
}

/// 轨迹错误分类（运维可见，不直接展示给终端用户）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Oracle 输出缺字段 / 格式错误 / 调用失败
    InvalidDecision,
    /// Oracle 返回了四种动作之外的动作名
    InvalidAction,
    /// 工具后端没有找到记录
    BackendNotFound,
    BackendTimeout,
    BackendError,
    /// 达到 MAX_ITERATIONS，强制进入 COMPOSE
    IterationLimitReached,
    /// call_tool 缺少必需槽位，安全网改为 ask_for_slot
    MissingRequiredSlot,
    ComposeError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidDecision => "invalid_decision",
            ErrorKind::InvalidAction => "invalid_action",
            ErrorKind::BackendNotFound => "backend_not_found",
            ErrorKind::BackendTimeout => "backend_timeout",
            ErrorKind::BackendError => "backend_error",
            ErrorKind::IterationLimitReached => "iteration_limit_reached",
            ErrorKind::MissingRequiredSlot => "missing_required_slot",
            ErrorKind::ComposeError => "compose_error",
        }
    }

    /// 该错误是否代表外部后端不可用（not_found 不算：后端可用但无记录）
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, ErrorKind::BackendTimeout | ErrorKind::BackendError)
    }

    /// Oracle 决策被 fail-closed 处理为 finish
    pub fn is_decision_fault(&self) -> bool {
        matches!(self, ErrorKind::InvalidDecision | ErrorKind::InvalidAction)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一条错误记录：分类、发生时的 iteration、细节
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub iteration: usize,
    pub detail: String,
}

impl ErrorDescriptor {
    pub fn new(kind: ErrorKind, iteration: usize, detail: impl Into<String>) -> Self {
        Self {
            kind,
            iteration,
            detail: detail.into(),
        }
    }
}

/// 单次运行对外的结果码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    NeedsClarification,
    LimitExceededButAnswered,
    InternalError,
}

/// 恢复引擎根据错误分类给出的下一步动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 写入观察后继续下一轮 REASON，让 Oracle 自行调整
    Continue,
    /// 直接向用户澄清（AWAIT_USER）
    AskUser,
    /// 跳过剩余推理，进入 COMPOSE
    ForceCompose,
}
