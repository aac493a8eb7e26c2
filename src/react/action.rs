//! 动作：四种封闭动作及 Oracle 边界的校验
//!
//! Oracle 返回的是松散 JSON（RawDecision）；validate_decision 把它收窄为 Action，
//! 任何缺字段 / 格式错误 / 未知动作都 fail-closed 为 finish，并给出错误分类。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::ErrorKind;
use crate::react::{Intent, SlotName, Slots};

/// 动作类别（写入轨迹的名字）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    AskForSlot,
    CallTool,
    CallRag,
    Finish,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::AskForSlot => "ask_for_slot",
            ActionKind::CallTool => "call_tool",
            ActionKind::CallRag => "call_rag",
            ActionKind::Finish => "finish",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ask_for_slot" => Some(ActionKind::AskForSlot),
            "call_tool" => Some(ActionKind::CallTool),
            "call_rag" => Some(ActionKind::CallRag),
            "finish" => Some(ActionKind::Finish),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 后端查询工具
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    OrderStatus,
    RefundStatus,
    Inventory,
}

impl ToolName {
    pub const ALL: [ToolName; 3] = [ToolName::OrderStatus, ToolName::RefundStatus, ToolName::Inventory];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::OrderStatus => "order_status",
            ToolName::RefundStatus => "refund_status",
            ToolName::Inventory => "inventory",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "order_status" => Some(ToolName::OrderStatus),
            "refund_status" => Some(ToolName::RefundStatus),
            "inventory" => Some(ToolName::Inventory),
            _ => None,
        }
    }

    /// 工具对应的查询意图
    pub fn intent(&self) -> Intent {
        match self {
            ToolName::OrderStatus => Intent::OrderStatus,
            ToolName::RefundStatus => Intent::RefundStatus,
            ToolName::Inventory => Intent::Inventory,
        }
    }

    /// 调用前必须具备的槽位中缺失的那个
    pub fn missing_slot(&self, slots: &Slots) -> Option<SlotName> {
        self.intent().missing_slot(slots)
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 经过校验的动作（带各自的参数）
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// 向用户询问槽位；None 时按意图优先级选择
    AskForSlot { slot: Option<SlotName> },
    /// 调用工具；tool 为 None 时按意图选择，params 覆盖 / 补充当前槽位
    CallTool { tool: Option<ToolName>, params: Slots },
    /// 检索政策；query 为 None 时使用用户原话
    CallRag { query: Option<String> },
    Finish,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::AskForSlot { .. } => ActionKind::AskForSlot,
            Action::CallTool { .. } => ActionKind::CallTool,
            Action::CallRag { .. } => ActionKind::CallRag,
            Action::Finish => ActionKind::Finish,
        }
    }

    /// 写入轨迹的 action_input
    pub fn input_json(&self) -> Value {
        match self {
            Action::AskForSlot { slot } => match slot {
                Some(s) => serde_json::json!({ "slot": s.as_str() }),
                None => serde_json::json!({}),
            },
            Action::CallTool { tool, params } => {
                let mut obj = serde_json::Map::new();
                if let Some(t) = tool {
                    obj.insert("tool".into(), Value::String(t.as_str().into()));
                }
                if !params.is_empty() {
                    obj.insert("params".into(), params.to_json());
                }
                Value::Object(obj)
            }
            Action::CallRag { query } => match query {
                Some(q) => serde_json::json!({ "query": q }),
                None => serde_json::json!({}),
            },
            Action::Finish => serde_json::json!({}),
        }
    }
}

/// Oracle 原始输出：`{"thought": "...", "action": "call_tool", "action_input": {...}}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawDecision {
    /// 本步推理理由
    #[serde(default)]
    pub thought: Option<String>,
    /// ask_for_slot | call_tool | call_rag | finish
    #[serde(default)]
    pub action: Option<String>,
    /// 动作参数：call_tool 为 {"tool": "...", "params": {...}}，call_rag 为 {"query": "..."}，ask_for_slot 为 {"slot": "..."}
    #[serde(default)]
    pub action_input: Value,
}

impl RawDecision {
    pub fn new(thought: impl Into<String>, action: impl Into<String>, action_input: Value) -> Self {
        Self {
            thought: Some(thought.into()),
            action: Some(action.into()),
            action_input,
        }
    }
}

/// 校验通过的决策
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub thought: String,
    pub action: Action,
}

/// 校验失败：分类 + 细节；调用方按 finish 处理
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionFault {
    pub kind: ErrorKind,
    pub detail: String,
    /// 原始输出里若有可用的 thought，保留下来写入轨迹
    pub thought: Option<String>,
}

impl DecisionFault {
    fn new(kind: ErrorKind, detail: impl Into<String>, thought: Option<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            thought,
        }
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// 在 Oracle 边界收窄决策
pub fn validate_decision(raw: &RawDecision) -> Result<Decision, DecisionFault> {
    let thought = non_empty(raw.thought.as_deref());

    let Some(action_name) = non_empty(raw.action.as_deref()) else {
        return Err(DecisionFault::new(ErrorKind::InvalidDecision, "missing field 'action'", thought));
    };
    let Some(kind) = ActionKind::parse(&action_name) else {
        return Err(DecisionFault::new(
            ErrorKind::InvalidAction,
            format!("unrecognized action '{}'", action_name),
            thought,
        ));
    };
    let Some(thought) = thought else {
        return Err(DecisionFault::new(ErrorKind::InvalidDecision, "missing field 'thought'", None));
    };

    let input = match &raw.action_input {
        Value::Null => serde_json::Map::new(),
        Value::Object(obj) => obj.clone(),
        other => {
            return Err(DecisionFault::new(
                ErrorKind::InvalidDecision,
                format!("action_input must be an object, got {}", other),
                Some(thought),
            ))
        }
    };
    let text_field = |key: &str| non_empty(input.get(key).and_then(Value::as_str));

    let action = match kind {
        ActionKind::AskForSlot => Action::AskForSlot {
            slot: text_field("slot").and_then(|s| SlotName::parse(&s)),
        },
        ActionKind::CallTool => {
            let tool = match text_field("tool") {
                None => None,
                Some(name) => match ToolName::parse(&name) {
                    Some(t) => Some(t),
                    None => {
                        return Err(DecisionFault::new(
                            ErrorKind::InvalidDecision,
                            format!("unknown tool '{}'", name),
                            Some(thought),
                        ))
                    }
                },
            };
            let as_object = Value::Object(input.clone());
            let mut params = Slots::from_json(&as_object);
            if let Some(nested) = input.get("params") {
                params.merge_from(&Slots::from_json(nested));
            }
            Action::CallTool { tool, params }
        }
        ActionKind::CallRag => Action::CallRag {
            query: text_field("query"),
        },
        ActionKind::Finish => Action::Finish,
    };

    Ok(Decision { thought, action })
}
