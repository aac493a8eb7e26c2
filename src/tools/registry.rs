//! 工具注册表与 ToolBackend 接口
//!
//! 查询工具实现 Tool trait（name / description / execute），由 ToolRegistry 按名注册与查找；
//! ToolBackend 是 ReAct 循环看到的窄接口：按 ToolName + 槽位调用，返回记录或 not_found。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::react::{Slots, ToolName};

/// 工具执行结果：找到记录，或后端可用但无此记录
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Found(Value),
    NotFound(String),
}

/// 工具 trait：名称、描述、参数 schema、异步执行（args 为 JSON，只读且幂等）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（与 ToolName::as_str 一致）
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 JSON Schema
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具；Err 表示后端故障（数据源不可用等）
    async fn execute(&self, args: Value) -> Result<ToolOutcome, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 工具目录（按名称排序）：[{name, description, parameters}]，写入 LLM 决策提示
    pub fn catalog(&self) -> Value {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        Value::Array(
            names
                .into_iter()
                .filter_map(|n| self.tools.get(n))
                .map(|t| {
                    serde_json::json!({
                        "name": t.name(),
                        "description": t.description(),
                        "parameters": t.parameters_schema(),
                    })
                })
                .collect(),
        )
    }
}

/// ReAct 循环使用的工具后端
#[async_trait]
pub trait ToolBackend: Send + Sync {
    async fn invoke(&self, tool: ToolName, params: &Slots) -> Result<ToolOutcome, AgentError>;
}
