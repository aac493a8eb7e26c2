//! DecisionOracle：REASON 阶段的决策来源
//!
//! RuleOracle 为确定性规则（默认，离线可用）；LlmOracle 把状态与决策 JSON Schema 发给 LLM，
//! parse_decision 从回复文本中提取 JSON 并反序列化为 RawDecision。校验在 validate_decision 里做。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::react::{Intent, Observation, RawDecision, Scratchpad, Slots};
use crate::tools::decision_schema_json;

/// Oracle 的输入（状态快照；Scratchpad 克隆只增加引用计数）
#[derive(Debug, Clone)]
pub struct OracleInput {
    pub user_message: String,
    pub intent: Intent,
    pub slots: Slots,
    pub scratchpad: Scratchpad,
    pub last_observation: Option<Observation>,
    pub iteration: usize,
    pub max_iterations: usize,
}

/// 决策来源
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn decide(&self, input: &OracleInput) -> Result<RawDecision, AgentError>;

    fn name(&self) -> &str;
}

/// 规则决策：缺槽位先问；查询意图先调工具；有结果（或政策问题）再查政策；最后 finish
#[derive(Debug, Default, Clone)]
pub struct RuleOracle;

impl RuleOracle {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DecisionOracle for RuleOracle {
    async fn decide(&self, input: &OracleInput) -> Result<RawDecision, AgentError> {
        let intent = input.intent;

        if let Some(slot) = intent.missing_slot(&input.slots) {
            return Ok(RawDecision::new(
                format!("Intent {} needs {} before anything can be looked up.", intent, slot),
                "ask_for_slot",
                json!({ "slot": slot.as_str() }),
            ));
        }

        if let Some(tool) = intent.default_tool() {
            if !input.scratchpad.tool_attempted(tool) {
                return Ok(RawDecision::new(
                    format!("All required slots are known; calling {}.", tool),
                    "call_tool",
                    json!({ "tool": tool.as_str(), "params": input.slots.to_json() }),
                ));
            }
            let has_result = input.scratchpad.tool_results().any(|(t, _)| t == tool);
            if has_result && !input.scratchpad.retrieval_attempted() {
                return Ok(RawDecision::new(
                    "Got the record; looking up related policy for context.",
                    "call_rag",
                    json!({ "query": input.user_message }),
                ));
            }
            return Ok(RawDecision::new(
                "The lookup is done; ready to answer.",
                "finish",
                json!({}),
            ));
        }

        if intent == Intent::Policy && !input.scratchpad.retrieval_attempted() {
            return Ok(RawDecision::new(
                "This is a policy question; searching the policy documents.",
                "call_rag",
                json!({ "query": input.user_message }),
            ));
        }

        Ok(RawDecision::new(
            "Nothing else to gather; composing the answer.",
            "finish",
            json!({}),
        ))
    }

    fn name(&self) -> &str {
        "rule"
    }
}

const SYSTEM_PROMPT: &str = "You are the reasoning step of a customer-support agent that answers questions about orders, refunds, inventory and store policy.
Each turn you choose exactly ONE next action:
- ask_for_slot: a required identifier is missing (order_id, refund_id or product_id). action_input: {\"slot\": \"order_id\"}
- call_tool: look up a record. action_input: {\"tool\": \"order_status\" | \"refund_status\" | \"inventory\", \"params\": {\"order_id\": \"...\"}}
- call_rag: search the policy documents. action_input: {\"query\": \"...\"}
- finish: enough information has been gathered to answer.
Order IDs are numbers with 4 or more digits, product IDs look like P123, refund IDs look like RF10021.
Never invent identifiers. Reply with a single JSON object and nothing else.";

/// 解析 LLM 输出：提取 ```json 代码块或最外层 {...}，反序列化为 RawDecision
pub fn parse_decision(output: &str) -> Result<RawDecision, AgentError> {
    let trimmed = output.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            &trimmed[start..=end]
        } else {
            trimmed
        }
    } else {
        return Err(AgentError::JsonParseError(format!(
            "no JSON object in oracle output: {}",
            trimmed.chars().take(200).collect::<String>()
        )));
    };

    serde_json::from_str(json_str)
        .map_err(|e| AgentError::JsonParseError(format!("{}: {}", e, json_str)))
}

/// LLM 决策：持有 LLM 与带 Schema 的 system prompt
pub struct LlmOracle {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl LlmOracle {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        let system_prompt = format!(
            "{}\n\nJSON Schema of your reply:\n{}",
            SYSTEM_PROMPT,
            decision_schema_json()
        );
        Self { llm, system_prompt }
    }

    /// 在 system prompt 中附上工具目录（name / description / parameters）
    pub fn with_tool_catalog(mut self, catalog: &serde_json::Value) -> Self {
        self.system_prompt
            .push_str(&format!("\n\nAvailable tools:\n{}", catalog));
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    fn state_message(input: &OracleInput) -> String {
        let last = input
            .last_observation
            .as_ref()
            .map(Observation::summary)
            .unwrap_or_else(|| "(none)".to_string());
        format!(
            "User message: {}\nIntent: {}\nKnown slots: {}\nIteration: {}/{}\n\nTrace so far:\n{}\nLast observation: {}\n\nWhat is the next action?",
            input.user_message,
            input.intent,
            input.slots.to_json(),
            input.iteration,
            input.max_iterations,
            input.scratchpad.render(),
            last
        )
    }
}

#[async_trait]
impl DecisionOracle for LlmOracle {
    async fn decide(&self, input: &OracleInput) -> Result<RawDecision, AgentError> {
        let messages = vec![
            Message::system(self.system_prompt.clone()),
            Message::user(Self::state_message(input)),
        ];
        let output = self
            .llm
            .complete(&messages)
            .await
            .map_err(AgentError::OracleFailed)?;
        parse_decision(&output)
    }

    fn name(&self) -> &str {
        "llm"
    }
}
