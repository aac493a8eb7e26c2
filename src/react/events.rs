//! ReAct 过程事件：用于展示分类、思考、动作、观察与最终回复

use serde::Serialize;

use crate::react::{Intent, Slots};

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// CLASSIFY 完成
    Classified { intent: Intent, slots: Slots },
    /// 进入第几个 REASON/ACT 周期
    StepUpdate { step: usize, max_steps: usize },
    /// Oracle 的推理理由
    Thought { text: String },
    /// 新槽位导致意图被纠正
    IntentCorrected { from: Intent, to: Intent },
    /// 即将执行的动作
    ActionDispatched {
        action: String,
        input: serde_json::Value,
    },
    /// 动作观察（预览，避免过长）
    Observation { preview: String },
    /// 记录到 errors 的错误
    Error { kind: String, detail: String },
    /// AWAIT_USER：向用户澄清
    Clarification { prompt: String },
    /// COMPOSE 完成
    Composed { answer: String },
}
