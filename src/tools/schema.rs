//! 决策 JSON Schema 生成（schemars）
//!
//! 将合法决策 `{"thought", "action", "action_input"}` 的结构注入 LlmOracle 的 system prompt，减少 LLM 输出格式错误。

use schemars::schema_for;

use crate::react::RawDecision;

/// 返回决策的 JSON Schema 字符串
pub fn decision_schema_json() -> String {
    let schema = schema_for!(RawDecision);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
