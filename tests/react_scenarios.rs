//! ReAct 循环端到端场景：规则 Oracle、脚本化 Oracle、后端故障与取消

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use support_agent::core::{AgentError, ErrorKind, RunStatus, Terminal};
use support_agent::llm::MockLlmClient;
use support_agent::react::{
    ActionDispatcher, ActionKind, Intent, LlmOracle, LoopOutcome, LoopSeed, Observation, RawDecision, ReactEvent,
    ReasonActLoop, RuleOracle, ScratchEntry, SlotName, TemplateComposer, NO_INFO_REPLY,
};
use tokio_util::sync::CancellationToken;

use common::*;

async fn run(lp: &ReasonActLoop, message: &str) -> LoopOutcome {
    lp.run(&LoopSeed::default(), message, &CancellationToken::new(), None)
        .await
        .unwrap()
}

fn assert_trace_invariants(outcome: &LoopOutcome, max_iterations: usize) {
    let state = &outcome.state;
    assert!(state.iteration <= max_iterations);
    assert_eq!(state.scratchpad.len(), 1 + state.iteration);
    assert!(matches!(state.scratchpad.entries()[0], ScratchEntry::Classify { .. }));
    for (i, cycle) in state.scratchpad.cycles().enumerate() {
        assert_eq!(cycle.iteration, i + 1);
        assert!(!cycle.thoughts.is_empty());
    }
    match outcome.terminal {
        Terminal::AwaitUser => {
            assert!(state.final_answer.is_none());
            assert!(outcome.clarification.is_some());
        }
        Terminal::Compose => {
            assert!(state.final_answer.as_deref().is_some_and(|a| !a.is_empty()));
            assert!(outcome.clarification.is_none());
        }
    }
}

#[tokio::test]
async fn test_order_status_full_cycle() {
    let lp = react_loop(Arc::new(RuleOracle::new()), executor(), policy_index().await);
    let outcome = run(&lp, "Where is my order 98762?").await;

    assert_eq!(outcome.terminal, Terminal::Compose);
    assert_eq!(outcome.status, RunStatus::Success);
    assert_eq!(outcome.state.intent, Intent::OrderStatus);
    assert_eq!(outcome.state.slots.get(SlotName::OrderId), Some("98762"));
    assert_eq!(outcome.state.iteration, 3);
    let actions: Vec<ActionKind> = outcome.state.scratchpad.cycles().map(|c| c.action).collect();
    assert_eq!(actions, vec![ActionKind::CallTool, ActionKind::CallRag, ActionKind::Finish]);
    assert!(outcome.state.errors.is_empty());

    let answer = outcome.state.final_answer.clone().unwrap();
    assert!(answer.starts_with("Order 98762 is currently: Out for delivery."));
    assert!(answer.contains("Expected delivery: 2024-06-14."));
    assert!(answer.contains("_Policy reference:"));
    assert_trace_invariants(&outcome, 5);
}

#[tokio::test]
async fn test_missing_order_id_asks_user() {
    let lp = react_loop(Arc::new(RuleOracle::new()), executor(), policy_index().await);
    let outcome = run(&lp, "Where is my order?").await;

    assert_eq!(outcome.terminal, Terminal::AwaitUser);
    assert_eq!(outcome.status, RunStatus::NeedsClarification);
    assert_eq!(outcome.state.iteration, 1);
    assert_eq!(outcome.clarification.as_deref(), Some(SlotName::OrderId.prompt()));
    assert_eq!(outcome.state.action, Some(ActionKind::AskForSlot));
    assert_eq!(outcome.state.ledger.backend_calls, 0);
    assert_trace_invariants(&outcome, 5);
}

#[tokio::test]
async fn test_iteration_limit_still_answers() {
    let lp = react_loop(Arc::new(AlwaysCallTool), executor(), policy_index().await);
    let outcome = run(&lp, "Where is my order 98762?").await;

    assert_eq!(outcome.terminal, Terminal::Compose);
    assert_eq!(outcome.state.iteration, 5);
    assert_eq!(outcome.status, RunStatus::LimitExceededButAnswered);
    let last = outcome.state.errors.last().unwrap();
    assert_eq!(last.kind, ErrorKind::IterationLimitReached);
    assert_eq!(last.iteration, 5);
    let last_cycle = outcome.state.scratchpad.cycles().last().unwrap();
    assert!(last_cycle.notes.iter().any(|n| n.contains("Iteration limit")));
    assert!(outcome.state.final_answer.unwrap().contains("Order 98762"));
}

#[tokio::test]
async fn test_iteration_limit_respects_configured_max() {
    let lp = react_loop(Arc::new(AlwaysCallTool), executor(), policy_index().await).with_max_iterations(2);
    let outcome = run(&lp, "Where is my order 98762?").await;
    assert_eq!(outcome.state.iteration, 2);
    assert_trace_invariants(&outcome, 2);
}

#[tokio::test]
async fn test_policy_question_without_matches() {
    let lp = react_loop(Arc::new(RuleOracle::new()), executor(), empty_index());
    let outcome = run(&lp, "Do you offer gift wrapping?").await;

    assert_eq!(outcome.state.intent, Intent::Policy);
    assert_eq!(outcome.state.iteration, 2);
    assert_eq!(outcome.status, RunStatus::Success);
    let rag = outcome.state.scratchpad.cycles().next().unwrap();
    assert!(matches!(rag.observation, Observation::Snippets { count: 0, .. }));
    assert_eq!(outcome.state.final_answer.as_deref(), Some(NO_INFO_REPLY));
}

#[tokio::test]
async fn test_policy_question_uses_snippets() {
    let lp = react_loop(Arc::new(RuleOracle::new()), executor(), policy_index().await);
    let outcome = run(&lp, "How long do refunds take?").await;

    assert_eq!(outcome.state.intent, Intent::Policy);
    let answer = outcome.state.final_answer.unwrap();
    assert!(answer.contains("_Policy reference:"));
    assert_ne!(answer, NO_INFO_REPLY);
}

#[tokio::test]
async fn test_inventory_lookup() {
    let lp = react_loop(Arc::new(RuleOracle::new()), executor(), policy_index().await);
    let outcome = run(&lp, "Is P123 in stock?").await;

    assert_eq!(outcome.state.intent, Intent::Inventory);
    assert!(outcome
        .state
        .final_answer
        .unwrap()
        .starts_with("Product P123: In stock. Quantity available: 42."));
}

#[tokio::test]
async fn test_unknown_order_is_not_found_not_failure() {
    let lp = react_loop(Arc::new(RuleOracle::new()), executor(), policy_index().await);
    let outcome = run(&lp, "Where is my order 11111?").await;

    assert!(outcome.state.errors.iter().any(|e| e.kind == ErrorKind::BackendNotFound));
    assert_eq!(outcome.status, RunStatus::Success);
    assert_eq!(
        outcome.state.final_answer.as_deref(),
        Some("I couldn't find the order 11111. Please check the order ID.")
    );
}

#[tokio::test]
async fn test_unknown_action_finishes_without_escalation() {
    let oracle = ScriptedOracle::new([RawDecision::new("let me dance", "dance", json!({}))]);
    let lp = react_loop(Arc::new(oracle), executor(), policy_index().await);
    let outcome = run(&lp, "Where is my order 98762?").await;

    assert_eq!(outcome.state.errors[0].kind, ErrorKind::InvalidAction);
    assert_eq!(outcome.state.iteration, 1);
    assert_eq!(outcome.state.action, Some(ActionKind::Finish));
    assert!(!outcome.state.ledger.closed_on_fault);
    assert_eq!(outcome.status, RunStatus::Success);
    assert_eq!(outcome.state.final_answer.as_deref(), Some(NO_INFO_REPLY));
    assert_trace_invariants(&outcome, 5);
}

#[tokio::test]
async fn test_unknown_action_after_lookup_answers_from_result() {
    let oracle = ScriptedOracle::new([
        RawDecision::new(
            "look it up",
            "call_tool",
            json!({ "tool": "order_status", "params": { "order_id": "98762" } }),
        ),
        RawDecision::new("wrap up somehow", "summarize", json!({})),
    ]);
    let lp = react_loop(Arc::new(oracle), executor(), policy_index().await);
    let outcome = run(&lp, "Where is my order 98762?").await;

    assert!(outcome.state.has_error(ErrorKind::InvalidAction));
    assert_eq!(outcome.state.iteration, 2);
    assert_eq!(outcome.status, RunStatus::Success);
    assert!(outcome
        .state
        .final_answer
        .as_deref()
        .is_some_and(|a| a.starts_with("Order 98762 is currently")));
    assert_trace_invariants(&outcome, 5);
}

#[tokio::test]
async fn test_malformed_decision_is_invalid_decision() {
    let malformed = RawDecision {
        thought: None,
        action: Some("call_tool".into()),
        action_input: json!({ "tool": "order_status" }),
    };
    let lp = react_loop(Arc::new(ScriptedOracle::new([malformed])), executor(), policy_index().await);
    let outcome = run(&lp, "Where is my order 98762?").await;

    assert_eq!(outcome.state.errors[0].kind, ErrorKind::InvalidDecision);
    assert_eq!(outcome.status, RunStatus::InternalError);
    assert_eq!(outcome.state.ledger.backend_calls, 0);
}

#[tokio::test]
async fn test_unknown_tool_is_invalid_decision() {
    let oracle = ScriptedOracle::new([RawDecision::new(
        "try a new tool",
        "call_tool",
        json!({ "tool": "teleport", "params": {} }),
    )]);
    let lp = react_loop(Arc::new(oracle), executor(), policy_index().await);
    let outcome = run(&lp, "Where is my order 98762?").await;
    assert_eq!(outcome.state.errors[0].kind, ErrorKind::InvalidDecision);
}

#[tokio::test]
async fn test_tool_timeout_is_recorded_and_answered() {
    let dispatcher = ActionDispatcher::new(Arc::new(SlowTools(Duration::from_secs(2))), policy_index().await)
        .with_timeout(Duration::from_millis(50));
    let lp = ReasonActLoop::new(Arc::new(RuleOracle::new()), dispatcher, Arc::new(TemplateComposer::new()));
    let outcome = run(&lp, "Where is my order 98762?").await;

    assert_eq!(outcome.state.errors[0].kind, ErrorKind::BackendTimeout);
    assert_eq!(outcome.state.iteration, 2);
    assert_eq!(outcome.status, RunStatus::InternalError);
    let answer = outcome.state.final_answer.unwrap();
    assert!(answer.contains("couldn't reach"));
    assert!(!answer.to_lowercase().contains("timeout"));
}

#[tokio::test]
async fn test_retrieval_failure_becomes_observation() {
    let lp = react_loop(Arc::new(RuleOracle::new()), executor(), Arc::new(BrokenRetrieval));
    let outcome = run(&lp, "Where is my order 98762?").await;

    assert!(outcome.state.errors.iter().any(|e| e.kind == ErrorKind::BackendError));
    // 工具成功，检索失败：不是全部后端失败
    assert_eq!(outcome.status, RunStatus::Success);
    assert!(outcome.state.final_answer.unwrap().starts_with("Order 98762"));
}

#[tokio::test]
async fn test_missing_slot_safety_net() {
    let oracle = ScriptedOracle::new([RawDecision::new(
        "check stock",
        "call_tool",
        json!({ "tool": "inventory", "params": {} }),
    )]);
    let lp = react_loop(Arc::new(oracle), executor(), policy_index().await);
    let outcome = run(&lp, "Is it in stock?").await;

    assert_eq!(outcome.terminal, Terminal::AwaitUser);
    assert_eq!(outcome.status, RunStatus::NeedsClarification);
    assert_eq!(outcome.clarification.as_deref(), Some(SlotName::ProductId.prompt()));
    assert!(outcome.state.errors.iter().any(|e| e.kind == ErrorKind::MissingRequiredSlot));
    let cycle = outcome.state.scratchpad.cycles().next().unwrap();
    assert_eq!(cycle.action, ActionKind::AskForSlot);
    assert!(!cycle.notes.is_empty());
    assert_eq!(outcome.state.ledger.backend_calls, 0);
}

#[tokio::test]
async fn test_intent_corrected_from_tool_result() {
    let oracle = ScriptedOracle::new([
        RawDecision::new(
            "the refund belongs to order 10021",
            "call_tool",
            json!({ "tool": "refund_status", "params": { "order_id": "10021" } }),
        ),
        RawDecision::new("answer now", "finish", json!({})),
    ]);
    let lp = react_loop(Arc::new(oracle), executor(), policy_index().await);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let outcome = lp
        .run(
            &LoopSeed::default(),
            "How long does a refund take?",
            &CancellationToken::new(),
            Some(&tx),
        )
        .await
        .unwrap();

    match &outcome.state.scratchpad.entries()[0] {
        ScratchEntry::Classify { intent, .. } => assert_eq!(*intent, Intent::Policy),
        other => panic!("unexpected first entry: {:?}", other),
    }
    assert_eq!(outcome.state.intent, Intent::RefundStatus);
    assert_eq!(outcome.state.slots.get(SlotName::RefundId), Some("RF10021"));
    let second = outcome.state.scratchpad.cycles().nth(1).unwrap();
    assert_eq!(second.thoughts.len(), 2);
    assert!(outcome
        .state
        .final_answer
        .unwrap()
        .starts_with("Refund status for order 10021: Completed."));

    drop(tx);
    let mut corrected = false;
    while let Some(ev) = rx.recv().await {
        if let ReactEvent::IntentCorrected { from, to } = ev {
            assert_eq!((from, to), (Intent::Policy, Intent::RefundStatus));
            corrected = true;
        }
    }
    assert!(corrected);
}

#[tokio::test]
async fn test_events_follow_the_loop() {
    let lp = react_loop(Arc::new(RuleOracle::new()), executor(), policy_index().await);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    lp.run(&LoopSeed::default(), "Where is my order 98762?", &CancellationToken::new(), Some(&tx))
        .await
        .unwrap();
    drop(tx);

    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        events.push(ev);
    }
    assert!(matches!(events.first(), Some(ReactEvent::Classified { intent: Intent::OrderStatus, .. })));
    assert!(matches!(events.last(), Some(ReactEvent::Composed { .. })));
    let dispatched = events
        .iter()
        .filter(|e| matches!(e, ReactEvent::ActionDispatched { .. }))
        .count();
    assert_eq!(dispatched, 3);
}

#[tokio::test]
async fn test_llm_oracle_drives_the_loop() {
    let llm = MockLlmClient::with_replies([
        "```json\n{\"thought\": \"look up the order\", \"action\": \"call_tool\", \"action_input\": {\"tool\": \"order_status\", \"params\": {\"order_id\": \"98762\"}}}\n```",
    ]);
    let lp = react_loop(Arc::new(LlmOracle::new(Arc::new(llm))), executor(), policy_index().await);
    let outcome = run(&lp, "Where is my order 98762?").await;

    assert_eq!(outcome.state.iteration, 2);
    assert_eq!(outcome.status, RunStatus::Success);
    assert!(outcome.state.final_answer.unwrap().contains("Out for delivery"));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let lp = react_loop(Arc::new(RuleOracle::new()), executor(), policy_index().await);
    let token = CancellationToken::new();
    token.cancel();
    let result = lp.run(&LoopSeed::default(), "Where is my order 98762?", &token, None).await;
    assert!(matches!(result, Err(AgentError::Cancelled)));
}

#[tokio::test]
async fn test_cancel_interrupts_oracle() {
    let lp = react_loop(Arc::new(HangingOracle), executor(), policy_index().await);
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        lp.run(&LoopSeed::default(), "Where is my order 98762?", &token, None),
    )
    .await
    .expect("cancellation should stop the run");
    assert!(matches!(result, Err(AgentError::Cancelled)));
}

#[tokio::test]
async fn test_seed_slots_are_used() {
    let lp = react_loop(Arc::new(RuleOracle::new()), executor(), policy_index().await);
    let seed = LoopSeed {
        slots: [(SlotName::OrderId, "98762".to_string())].into_iter().collect(),
        last_intent: Some(Intent::OrderStatus),
    };
    let outcome = lp
        .run(&seed, "any update on that?", &CancellationToken::new(), None)
        .await
        .unwrap();
    assert_eq!(outcome.state.intent, Intent::OrderStatus);
    assert!(outcome.state.final_answer.unwrap().starts_with("Order 98762"));
}
