//! 工具执行器
//!
//! 持有 ToolRegistry 与超时，invoke(tool, slots) 在超时内调用对应工具，
//! 超时或失败时转为 AgentError（ToolTimeout / ToolExecutionFailed）；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::react::{Slots, ToolName};
use crate::tools::{ToolBackend, ToolOutcome, ToolRegistry};

/// 工具执行器：对每次调用施加超时，并将结果映射为 AgentError
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self::with_timeout(registry, Duration::from_secs(timeout_secs))
    }

    pub fn with_timeout(registry: ToolRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// 按名执行工具并输出 JSON 审计日志
    pub async fn execute(&self, tool_name: &str, args: serde_json::Value) -> Result<ToolOutcome, AgentError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| AgentError::UnknownTool(tool_name.to_string()))?;

        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, tool.execute(args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(ToolOutcome::Found(_))) => (true, "ok"),
            Ok(Ok(ToolOutcome::NotFound(_))) => (true, "not_found"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(out)) => Ok(out),
            Ok(Err(e)) => Err(AgentError::ToolExecutionFailed(format!("{}: {}", tool_name, e))),
            Err(_) => Err(AgentError::ToolTimeout(tool_name.to_string())),
        }
    }

    /// 已注册工具的目录（见 ToolRegistry::catalog）
    pub fn catalog(&self) -> serde_json::Value {
        self.registry.catalog()
    }
}

#[async_trait]
impl ToolBackend for ToolExecutor {
    async fn invoke(&self, tool: ToolName, params: &Slots) -> Result<ToolOutcome, AgentError> {
        self.execute(tool.as_str(), params.to_json()).await
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
