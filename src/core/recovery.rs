//! 错误恢复与升级策略
//!
//! handle：ErrorKind -> RecoveryAction，决定 ReAct 循环在记录错误后的走向；
//! assess：根据终态与错误账本给出对外 RunStatus（仅两种情况升级为 internal_error）。

use crate::core::{ErrorDescriptor, ErrorKind, RecoveryAction, RunStatus};

/// 循环终态（AWAIT_USER / COMPOSE）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    AwaitUser,
    Compose,
}

/// 运行结束时用于评估的摘要
#[derive(Debug, Clone, Copy, Default)]
pub struct RunLedger {
    /// 实际发起的后端调用数（工具 + 检索）
    pub backend_calls: usize,
    /// 其中超时 / 出错的次数（not_found 不计）
    pub backend_failures: usize,
    /// 是否因 invalid_decision 进入 COMPOSE（invalid_action 不计）
    pub closed_on_fault: bool,
}

/// 语义化错误恢复：所有错误对循环都非致命，只决定下一步去向
#[derive(Debug, Default, Clone)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, kind: ErrorKind) -> RecoveryAction {
        match kind {
            ErrorKind::InvalidDecision | ErrorKind::InvalidAction => RecoveryAction::ForceCompose,
            ErrorKind::IterationLimitReached => RecoveryAction::ForceCompose,
            ErrorKind::MissingRequiredSlot => RecoveryAction::AskUser,
            ErrorKind::BackendNotFound
            | ErrorKind::BackendTimeout
            | ErrorKind::BackendError
            | ErrorKind::ComposeError => RecoveryAction::Continue,
        }
    }

    /// 对外结果码：
    /// - AWAIT_USER -> needs_clarification
    /// - COMPOSE 且因 fail-closed 决策结束，或全部后端调用失败 -> internal_error
    /// - COMPOSE 且记录了 iteration_limit_reached -> limit_exceeded_but_answered
    pub fn assess(
        &self,
        terminal: Terminal,
        ledger: &RunLedger,
        errors: &[ErrorDescriptor],
    ) -> RunStatus {
        if terminal == Terminal::AwaitUser {
            return RunStatus::NeedsClarification;
        }
        let all_backends_down =
            ledger.backend_calls > 0 && ledger.backend_failures == ledger.backend_calls;
        if ledger.closed_on_fault || all_backends_down {
            return RunStatus::InternalError;
        }
        if errors
            .iter()
            .any(|e| e.kind == ErrorKind::IterationLimitReached)
        {
            return RunStatus::LimitExceededButAnswered;
        }
        RunStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_errors_continue() {
        let engine = RecoveryEngine::new();
        assert_eq!(engine.handle(ErrorKind::BackendTimeout), RecoveryAction::Continue);
        assert_eq!(engine.handle(ErrorKind::BackendNotFound), RecoveryAction::Continue);
    }

    #[test]
    fn test_missing_slot_asks_user() {
        let engine = RecoveryEngine::new();
        assert_eq!(
            engine.handle(ErrorKind::MissingRequiredSlot),
            RecoveryAction::AskUser
        );
    }

    #[test]
    fn test_assess_clarification() {
        let engine = RecoveryEngine::new();
        let status = engine.assess(Terminal::AwaitUser, &RunLedger::default(), &[]);
        assert_eq!(status, RunStatus::NeedsClarification);
    }

    #[test]
    fn test_assess_limit() {
        let engine = RecoveryEngine::new();
        let errors = vec![ErrorDescriptor::new(ErrorKind::IterationLimitReached, 5, "limit")];
        let ledger = RunLedger {
            backend_calls: 5,
            backend_failures: 0,
            closed_on_fault: false,
        };
        assert_eq!(
            engine.assess(Terminal::Compose, &ledger, &errors),
            RunStatus::LimitExceededButAnswered
        );
    }

    #[test]
    fn test_assess_total_backend_outage() {
        let engine = RecoveryEngine::new();
        let ledger = RunLedger {
            backend_calls: 2,
            backend_failures: 2,
            closed_on_fault: false,
        };
        assert_eq!(
            engine.assess(Terminal::Compose, &ledger, &[]),
            RunStatus::InternalError
        );
    }

    #[test]
    fn test_assess_partial_outage_is_success() {
        let engine = RecoveryEngine::new();
        let ledger = RunLedger {
            backend_calls: 2,
            backend_failures: 1,
            closed_on_fault: false,
        };
        assert_eq!(engine.assess(Terminal::Compose, &ledger, &[]), RunStatus::Success);
    }

    #[test]
    fn test_assess_no_backend_calls_is_success() {
        let engine = RecoveryEngine::new();
        assert_eq!(
            engine.assess(Terminal::Compose, &RunLedger::default(), &[]),
            RunStatus::Success
        );
    }
}
