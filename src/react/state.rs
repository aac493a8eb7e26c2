//! AgentState：单次 ReAct 调用独占的工作状态

use serde::Serialize;
use serde_json::Value;

use crate::core::{ErrorDescriptor, ErrorKind, RunLedger};
use crate::react::{ActionKind, Intent, Observation, Scratchpad, Slots};

/// 默认最大迭代数
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// 一次调用的工作状态；不跨会话共享
#[derive(Debug, Clone, Serialize)]
pub struct AgentState {
    pub user_message: String,
    pub intent: Intent,
    pub slots: Slots,
    /// 本条消息中用户明确给出的槽位；工具结果不得改写
    pub stated: Slots,
    /// 最近一次推理理由（每轮覆盖）
    pub thought: Option<String>,
    pub action: Option<ActionKind>,
    pub action_input: Value,
    /// 最近一次执行动作的观察
    pub observation: Option<Observation>,
    pub scratchpad: Scratchpad,
    /// 已完成的 REASON/ACT 周期数
    pub iteration: usize,
    pub max_iterations: usize,
    pub errors: Vec<ErrorDescriptor>,
    /// 仅在 COMPOSE 完成后设置
    pub final_answer: Option<String>,
    #[serde(skip)]
    pub ledger: RunLedger,
}

impl AgentState {
    pub fn new(user_message: impl Into<String>, slots: Slots, max_iterations: usize) -> Self {
        Self {
            user_message: user_message.into(),
            intent: Intent::Unknown,
            slots,
            stated: Slots::new(),
            thought: None,
            action: None,
            action_input: Value::Null,
            observation: None,
            scratchpad: Scratchpad::new(),
            iteration: 0,
            max_iterations: max_iterations.max(1),
            errors: Vec::new(),
            final_answer: None,
            ledger: RunLedger::default(),
        }
    }

    /// 追加错误（只追加，不替换）
    pub fn record_error(&mut self, kind: ErrorKind, detail: impl Into<String>) -> &ErrorDescriptor {
        let detail = detail.into();
        tracing::warn!(kind = %kind, iteration = self.iteration, detail = %detail, "react error recorded");
        self.errors.push(ErrorDescriptor::new(kind, self.iteration, detail));
        &self.errors[self.errors.len() - 1]
    }

    pub fn has_error(&self, kind: ErrorKind) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }

    pub fn limit_reached(&self) -> bool {
        self.iteration >= self.max_iterations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_append_in_order() {
        let mut state = AgentState::new("hi", Slots::new(), 5);
        state.record_error(ErrorKind::BackendTimeout, "order_status timed out");
        state.iteration = 2;
        state.record_error(ErrorKind::BackendNotFound, "no order");
        assert_eq!(state.errors.len(), 2);
        assert_eq!(state.errors[0].iteration, 0);
        assert_eq!(state.errors[1].kind, ErrorKind::BackendNotFound);
        assert!(state.has_error(ErrorKind::BackendTimeout));
        assert!(!state.has_error(ErrorKind::InvalidDecision));
    }

    #[test]
    fn test_limit_reached() {
        let mut state = AgentState::new("hi", Slots::new(), 0);
        assert_eq!(state.max_iterations, 1);
        assert!(!state.limit_reached());
        state.iteration = 1;
        assert!(state.limit_reached());
    }
}
