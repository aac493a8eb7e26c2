//! ReAct 主循环
//!
//! CLASSIFY -> REASON -> ACT -> {REASON | AWAIT_USER | COMPOSE}。
//! iteration 只在 ACT 完成时加一，call_tool / call_rag 之后达到 max_iterations 即强制 COMPOSE，
//! 因此每次调用最多 max_iterations 个 REASON/ACT 周期。Oracle 输出在边界校验，不合法一律按 finish 处理；
//! 其中只有 invalid_decision 会让本次运行以 internal_error 收尾。
//! 取消只在周期之间或后端调用进行中生效，返回 Cancelled，部分轨迹由调用方丢弃。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, ErrorKind, RecoveryAction, RecoveryEngine, RunStatus, Terminal};
use crate::react::{
    corrected_intent, validate_decision, Action, ActionDispatcher, AgentState, Composer, CycleRecord,
    DecisionOracle, Intent, IntentClassifier, Observation, OracleInput, ReactEvent, ScratchEntry, SlotName,
    Slots, COMPOSE_FAILED_REPLY, DEFAULT_MAX_ITERATIONS,
};

/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// SessionMemory 提供的种子
#[derive(Debug, Clone, Default)]
pub struct LoopSeed {
    pub slots: Slots,
    pub last_intent: Option<Intent>,
}

/// 一次调用的结果
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub state: AgentState,
    pub terminal: Terminal,
    pub status: RunStatus,
    /// AWAIT_USER 时的澄清提示
    pub clarification: Option<String>,
}

enum Phase {
    Classify,
    Reason,
    Act { thoughts: Vec<String>, action: Action },
    AwaitUser,
    Compose,
}

fn send_event(tx: Option<&UnboundedSender<ReactEvent>>, ev: ReactEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

fn preview(text: &str) -> String {
    let head: String = text.chars().take(OBSERVATION_PREVIEW_CHARS).collect();
    if text.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!("{}...", head)
    } else {
        head
    }
}

/// 推理 / 行动循环
pub struct ReasonActLoop {
    classifier: IntentClassifier,
    oracle: Arc<dyn DecisionOracle>,
    dispatcher: ActionDispatcher,
    composer: Arc<dyn Composer>,
    recovery: RecoveryEngine,
    max_iterations: usize,
    oracle_timeout: Duration,
}

impl ReasonActLoop {
    pub fn new(oracle: Arc<dyn DecisionOracle>, dispatcher: ActionDispatcher, composer: Arc<dyn Composer>) -> Self {
        Self {
            classifier: IntentClassifier::default(),
            oracle,
            dispatcher,
            composer,
            recovery: RecoveryEngine::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            oracle_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_classifier(mut self, classifier: IntentClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Oracle 与 Composer 单次调用的超时
    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn oracle_name(&self) -> &str {
        self.oracle.name()
    }

    fn record(&self, state: &mut AgentState, kind: ErrorKind, detail: String, events: Option<&UnboundedSender<ReactEvent>>) {
        send_event(
            events,
            ReactEvent::Error {
                kind: kind.to_string(),
                detail: detail.clone(),
            },
        );
        state.record_error(kind, detail);
    }

    /// 执行一次调用
    pub async fn run(
        &self,
        seed: &LoopSeed,
        user_message: &str,
        cancel: &CancellationToken,
        events: Option<&UnboundedSender<ReactEvent>>,
    ) -> Result<LoopOutcome, AgentError> {
        let mut state = AgentState::new(user_message, seed.slots.clone(), self.max_iterations);
        let mut changed: Vec<SlotName> = Vec::new();
        let mut phase = Phase::Classify;

        loop {
            phase = match phase {
                Phase::Classify => {
                    let c = self.classifier.classify(user_message, &seed.slots, seed.last_intent);
                    tracing::debug!(intent = %c.intent, rationale = %c.rationale, "CLASSIFY");
                    state.intent = c.intent;
                    state.slots = c.slots;
                    state.stated = c.extracted;
                    state.thought = Some(c.rationale.clone());
                    state.scratchpad.push(ScratchEntry::Classify {
                        intent: state.intent,
                        slots: state.slots.clone(),
                        thought: c.rationale,
                    });
                    send_event(
                        events,
                        ReactEvent::Classified {
                            intent: state.intent,
                            slots: state.slots.clone(),
                        },
                    );
                    Phase::Reason
                }

                Phase::Reason => {
                    if cancel.is_cancelled() {
                        return Err(AgentError::Cancelled);
                    }
                    send_event(
                        events,
                        ReactEvent::StepUpdate {
                            step: state.iteration + 1,
                            max_steps: self.max_iterations,
                        },
                    );

                    let mut thoughts = Vec::new();
                    if let Some(to) = corrected_intent(state.intent, &changed, &state.slots) {
                        if to != state.intent {
                            let from = state.intent;
                            thoughts.push(format!(
                                "New information ({}) points to {} rather than {}; switching intent and keeping earlier results.",
                                changed.iter().map(SlotName::as_str).collect::<Vec<_>>().join(", "),
                                to,
                                from
                            ));
                            tracing::debug!(from = %from, to = %to, "intent corrected");
                            send_event(events, ReactEvent::IntentCorrected { from, to });
                            state.intent = to;
                        }
                    }
                    changed.clear();

                    let input = OracleInput {
                        user_message: state.user_message.clone(),
                        intent: state.intent,
                        slots: state.slots.clone(),
                        scratchpad: state.scratchpad.clone(),
                        last_observation: state.observation.clone(),
                        iteration: state.iteration,
                        max_iterations: self.max_iterations,
                    };
                    let raw = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                        r = timeout(self.oracle_timeout, self.oracle.decide(&input)) => {
                            r.unwrap_or(Err(AgentError::OracleTimeout))
                        }
                    };

                    let decision = match raw {
                        Ok(raw) => validate_decision(&raw),
                        Err(e) => Err(crate::react::DecisionFault {
                            kind: e.kind().unwrap_or(ErrorKind::InvalidDecision),
                            detail: e.to_string(),
                            thought: None,
                        }),
                    };
                    let (thought, action) = match decision {
                        Ok(d) => (d.thought, d.action),
                        Err(fault) => {
                            self.record(&mut state, fault.kind, fault.detail, events);
                            let action = match self.recovery.handle(fault.kind) {
                                RecoveryAction::ForceCompose => {
                                    // invalid_action 按 finish 收尾，不升级
                                    if fault.kind == ErrorKind::InvalidDecision {
                                        state.ledger.closed_on_fault = true;
                                    }
                                    Action::Finish
                                }
                                RecoveryAction::AskUser => Action::AskForSlot { slot: None },
                                RecoveryAction::Continue => Action::Finish,
                            };
                            let thought = fault
                                .thought
                                .unwrap_or_else(|| "The decision was unusable; answering with what is already known.".to_string());
                            (thought, action)
                        }
                    };

                    tracing::debug!(iteration = state.iteration, action = %action.kind(), "REASON");
                    send_event(events, ReactEvent::Thought { text: thought.clone() });
                    thoughts.push(thought.clone());
                    state.thought = Some(thought);
                    state.action = Some(action.kind());
                    state.action_input = action.input_json();
                    Phase::Act { thoughts, action }
                }

                Phase::Act { thoughts, action } => {
                    send_event(
                        events,
                        ReactEvent::ActionDispatched {
                            action: action.kind().to_string(),
                            input: action.input_json(),
                        },
                    );
                    let out = self.dispatcher.dispatch(&action, &state, cancel).await?;

                    state.iteration += 1;
                    if let Some(failed) = out.backend_call {
                        state.ledger.backend_calls += 1;
                        if failed {
                            state.ledger.backend_failures += 1;
                        }
                    }
                    for (kind, detail) in out.errors {
                        self.record(&mut state, kind, detail, events);
                    }
                    changed = state.slots.merge_respecting(&out.mined, &state.stated);

                    let kind = out.action.kind();
                    state.action = Some(kind);
                    state.action_input = out.action.input_json();
                    state.observation = Some(out.observation.clone());
                    state.scratchpad.push(ScratchEntry::Cycle(CycleRecord {
                        iteration: state.iteration,
                        thoughts,
                        action: kind,
                        action_input: state.action_input.clone(),
                        observation: out.observation.clone(),
                        notes: out.notes,
                    }));
                    send_event(
                        events,
                        ReactEvent::Observation {
                            preview: preview(&out.observation.summary()),
                        },
                    );
                    tracing::debug!(iteration = state.iteration, action = %kind, "ACT");

                    match out.action {
                        Action::AskForSlot { .. } => Phase::AwaitUser,
                        Action::Finish => Phase::Compose,
                        Action::CallTool { .. } | Action::CallRag { .. } => {
                            if state.limit_reached() {
                                let note = format!(
                                    "Iteration limit ({}) reached; composing with the information gathered so far.",
                                    self.max_iterations
                                );
                                state.scratchpad.annotate_last(note.clone());
                                self.record(&mut state, ErrorKind::IterationLimitReached, note, events);
                                Phase::Compose
                            } else {
                                Phase::Reason
                            }
                        }
                    }
                }

                Phase::AwaitUser => {
                    let prompt = match &state.observation {
                        Some(Observation::Clarification { prompt, .. }) => prompt.clone(),
                        _ => SlotName::OrderId.prompt().to_string(),
                    };
                    send_event(events, ReactEvent::Clarification { prompt: prompt.clone() });
                    let status = self.recovery.assess(Terminal::AwaitUser, &state.ledger, &state.errors);
                    tracing::info!(iteration = state.iteration, intent = %state.intent, "AWAIT_USER");
                    return Ok(LoopOutcome {
                        state,
                        terminal: Terminal::AwaitUser,
                        status,
                        clarification: Some(prompt),
                    });
                }

                Phase::Compose => {
                    if cancel.is_cancelled() {
                        return Err(AgentError::Cancelled);
                    }
                    let composed = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                        r = timeout(
                            self.oracle_timeout,
                            self.composer.compose(&state.scratchpad, state.intent, &state.slots),
                        ) => r.unwrap_or_else(|_| Err(AgentError::ComposeFailed("composer timed out".into()))),
                    };
                    let answer = match composed {
                        Ok(answer) if !answer.trim().is_empty() => answer,
                        Ok(_) => {
                            self.record(&mut state, ErrorKind::ComposeError, "composer returned empty text".into(), events);
                            COMPOSE_FAILED_REPLY.to_string()
                        }
                        Err(e) => {
                            self.record(&mut state, ErrorKind::ComposeError, e.to_string(), events);
                            COMPOSE_FAILED_REPLY.to_string()
                        }
                    };
                    send_event(events, ReactEvent::Composed { answer: answer.clone() });
                    state.final_answer = Some(answer);
                    let status = self.recovery.assess(Terminal::Compose, &state.ledger, &state.errors);
                    tracing::info!(iteration = state.iteration, intent = %state.intent, status = ?status, "COMPOSE");
                    return Ok(LoopOutcome {
                        state,
                        terminal: Terminal::Compose,
                        status,
                        clarification: None,
                    });
                }
            };
        }
    }
}
