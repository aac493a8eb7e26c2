//! Composer：把完成的轨迹渲染成给用户的回复
//!
//! TemplateComposer：工具结果按意图模板格式化；政策问题（没有工具结果时）取前两个片段；
//! 末尾附政策出处。什么都没有时返回请用户补充信息的提示。原始后端错误不会出现在回复里。

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{AgentError, ErrorKind};
use crate::react::{Intent, Observation, Scratchpad, SlotName, Slots, ToolName};

/// 没有任何可用信息时的回复
pub const NO_INFO_REPLY: &str =
    "I couldn't find any information matching your request. Could you share more details (order ID or product ID)?";

/// Composer 失败时的兜底回复
pub const COMPOSE_FAILED_REPLY: &str = "Sorry, something went wrong while composing the answer.";

/// 政策片段展示的最大字符数
const SNIPPET_CHARS: usize = 300;
/// 政策问题直接展示的片段数
const SNIPPETS_SHOWN: usize = 2;

/// 最终回复渲染
#[async_trait]
pub trait Composer: Send + Sync {
    async fn compose(&self, scratchpad: &Scratchpad, intent: Intent, slots: &Slots) -> Result<String, AgentError>;
}

/// 模板渲染（确定性，无外部调用）
#[derive(Debug, Default, Clone)]
pub struct TemplateComposer;

impl TemplateComposer {
    pub fn new() -> Self {
        Self
    }
}

fn text(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn field(data: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| text(data.get(*k)))
}

fn format_tool_result(tool: ToolName, data: &Value, slots: &Slots) -> String {
    match tool {
        ToolName::OrderStatus => {
            let id = field(data, &["order_id"]).or(slots.get(SlotName::OrderId).map(str::to_string)).unwrap_or_default();
            let status = field(data, &["order_status", "status"]).unwrap_or_else(|| "unknown".into());
            let mut s = format!("Order {} is currently: {}.", id, status);
            if let Some(expected) = field(data, &["expected_delivery"]) {
                s.push_str(&format!(" Expected delivery: {}.", expected));
            }
            if let Some(reason) = field(data, &["delay_reason"]) {
                s.push_str(&format!(" Reason: {}.", reason));
            }
            s
        }
        ToolName::RefundStatus => {
            let id = field(data, &["order_id"]).or(slots.get(SlotName::OrderId).map(str::to_string)).unwrap_or_default();
            let status = field(data, &["refund_status", "status"]).unwrap_or_else(|| "unknown".into());
            let mut s = format!("Refund status for order {}: {}.", id, status);
            if let Some(amount) = field(data, &["refund_amount", "amount"]) {
                s.push_str(&format!(" Amount: {}.", amount));
            }
            if let Some(processed) = field(data, &["processed_at"]) {
                s.push_str(&format!(" Processed at: {}.", processed));
            }
            s
        }
        ToolName::Inventory => {
            let id = field(data, &["product_id"]).or(slots.get(SlotName::ProductId).map(str::to_string)).unwrap_or_default();
            let in_stock = data.get("in_stock").and_then(Value::as_bool).unwrap_or(false);
            let mut s = format!("Product {}: {}.", id, if in_stock { "In stock" } else { "Out of stock" });
            if let Some(qty) = field(data, &["quantity_available", "quantity"]) {
                s.push_str(&format!(" Quantity available: {}.", qty));
            }
            if let Some(restock) = field(data, &["restock_date"]) {
                s.push_str(&format!(" Restock expected: {}.", restock));
            }
            s
        }
    }
}

fn format_no_result(tool: ToolName, reason: ErrorKind, slots: &Slots) -> String {
    let id = |slot: SlotName| slots.get(slot).unwrap_or("you provided").to_string();
    match (tool, reason) {
        (ToolName::OrderStatus, ErrorKind::BackendNotFound) => {
            format!("I couldn't find the order {}. Please check the order ID.", id(SlotName::OrderId))
        }
        (ToolName::RefundStatus, ErrorKind::BackendNotFound) => {
            let which = slots
                .get(SlotName::OrderId)
                .map(|o| format!("order {}", o))
                .or(slots.get(SlotName::RefundId).map(|r| format!("refund ID {}", r)))
                .unwrap_or_else(|| "that order".into());
            format!("I couldn't find the refund for {}. Please check the ID.", which)
        }
        (ToolName::Inventory, ErrorKind::BackendNotFound) => {
            format!("I couldn't find product {}. Please check the product ID.", id(SlotName::ProductId))
        }
        _ => "I couldn't reach our records system just now, so I can't confirm the details. Please try again in a moment.".to_string(),
    }
}

#[async_trait]
impl Composer for TemplateComposer {
    async fn compose(&self, scratchpad: &Scratchpad, intent: Intent, slots: &Slots) -> Result<String, AgentError> {
        let mut pieces: Vec<String> = Vec::new();

        // 每个工具取最后一次观察（成功或无结果）
        let mut per_tool: Vec<(ToolName, &Observation)> = Vec::new();
        for obs in scratchpad.observations() {
            let tool = match obs {
                Observation::ToolResult { tool, .. } => Some(*tool),
                Observation::NoResult { source, .. } => ToolName::parse(source),
                _ => None,
            };
            if let Some(tool) = tool {
                per_tool.retain(|(t, _)| *t != tool);
                per_tool.push((tool, obs));
            }
        }
        // 当前意图的工具排在最前
        per_tool.sort_by_key(|(t, _)| Some(*t) != intent.default_tool());
        for (tool, obs) in &per_tool {
            match obs {
                Observation::ToolResult { data, .. } => pieces.push(format_tool_result(*tool, data, slots)),
                Observation::NoResult { reason, .. } => pieces.push(format_no_result(*tool, *reason, slots)),
                _ => {}
            }
        }
        let has_tool_part = !pieces.is_empty();

        let snippets = scratchpad.snippets();
        if !has_tool_part && !intent.is_lookup() {
            let texts: Vec<String> = snippets
                .iter()
                .take(SNIPPETS_SHOWN)
                .map(|s| {
                    let cut: String = s.text.chars().take(SNIPPET_CHARS).collect();
                    if s.text.chars().count() > SNIPPET_CHARS {
                        format!("{}...", cut.trim())
                    } else {
                        cut.trim().to_string()
                    }
                })
                .filter(|t| !t.is_empty())
                .collect();
            if !texts.is_empty() {
                pieces.push(texts.join("\n\n"));
            }
        }

        if pieces.is_empty() {
            return Ok(NO_INFO_REPLY.to_string());
        }

        let mut provenance: Vec<&str> = Vec::new();
        for s in &snippets {
            if !provenance.contains(&s.doc_id.as_str()) {
                provenance.push(&s.doc_id);
            }
        }
        if !provenance.is_empty() {
            pieces.push(format!("_Policy reference: {}_", provenance.join(", ")));
        }

        Ok(pieces.join("\n\n"))
    }
}
