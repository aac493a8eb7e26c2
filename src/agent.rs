//! 客服 Agent 运行时
//!
//! 对外入口：`SupportAgent::run` 处理一条用户消息。
//! 同一会话的调用由 SessionSupervisor 串行化；会话快照在调用前读取、调用后写回。
//! 被取消的调用不写回任何状态。

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::Instrument;

use crate::core::{AgentError, ErrorDescriptor, RunStatus, SessionLease, SessionSupervisor};
use crate::memory::{SessionMemory, SessionSnapshot, Turn};
use crate::react::{Intent, LoopOutcome, LoopSeed, ReactEvent, ReasonActLoop, Scratchpad, Slots};

/// 给用户的回复：最终答案或澄清问题
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Reply {
    Answer(String),
    Clarification(String),
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Reply::Answer(t) | Reply::Clarification(t) => t,
        }
    }

    pub fn is_clarification(&self) -> bool {
        matches!(self, Reply::Clarification(_))
    }
}

/// 一次调用的对外结果（可直接序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub session_id: String,
    pub reply: Reply,
    pub status: RunStatus,
    pub intent: Intent,
    pub slots: Slots,
    pub iteration_count: usize,
    pub scratchpad: Scratchpad,
    pub errors: Vec<ErrorDescriptor>,
}

impl AgentResponse {
    fn from_outcome(session_id: &str, outcome: LoopOutcome) -> Self {
        let LoopOutcome {
            state, clarification, status, ..
        } = outcome;
        let reply = match clarification {
            Some(prompt) => Reply::Clarification(prompt),
            None => Reply::Answer(state.final_answer.clone().unwrap_or_default()),
        };
        Self {
            session_id: session_id.to_string(),
            reply,
            status,
            intent: state.intent,
            slots: state.slots,
            iteration_count: state.iteration,
            scratchpad: state.scratchpad,
            errors: state.errors,
        }
    }
}

/// 客服 Agent：ReAct 循环 + 会话记忆 + 会话监管
pub struct SupportAgent {
    react: ReasonActLoop,
    memory: Arc<dyn SessionMemory>,
    supervisor: SessionSupervisor,
}

impl SupportAgent {
    pub fn new(react: ReasonActLoop, memory: Arc<dyn SessionMemory>) -> Self {
        Self {
            react,
            memory,
            supervisor: SessionSupervisor::new(),
        }
    }

    pub fn memory(&self) -> &Arc<dyn SessionMemory> {
        &self.memory
    }

    pub fn react(&self) -> &ReasonActLoop {
        &self.react
    }

    /// 处理一条用户消息
    pub async fn run(&self, session_id: &str, user_message: &str) -> Result<AgentResponse, AgentError> {
        self.run_with_events(session_id, user_message, None).await
    }

    /// 处理一条用户消息，并把过程事件发送到 `events`
    pub async fn run_with_events(
        &self,
        session_id: &str,
        user_message: &str,
        events: Option<&UnboundedSender<ReactEvent>>,
    ) -> Result<AgentResponse, AgentError> {
        let lease = self.supervisor.acquire(session_id).await;
        let span = tracing::info_span!("support_turn", session = %session_id, run = %lease.run_id());
        let result = self.run_leased(&lease, user_message, events).instrument(span).await;
        self.supervisor.release(lease).await;
        result
    }

    /// 取消该会话正在进行的调用
    pub async fn cancel(&self, session_id: &str) -> bool {
        self.supervisor.cancel(session_id).await
    }

    async fn run_leased(
        &self,
        lease: &SessionLease,
        user_message: &str,
        events: Option<&UnboundedSender<ReactEvent>>,
    ) -> Result<AgentResponse, AgentError> {
        let session_id = lease.session_id();
        let mut snapshot = match self.memory.load(session_id).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "session load failed, starting fresh");
                SessionSnapshot::default()
            }
        };
        let seed = LoopSeed {
            slots: snapshot.slots.clone(),
            last_intent: snapshot.last_intent,
        };

        let outcome = match self.react.run(&seed, user_message, lease.cancel_token(), events).await {
            Ok(o) => o,
            Err(AgentError::Cancelled) => {
                tracing::info!("run cancelled, session left unchanged");
                return Err(AgentError::Cancelled);
            }
            Err(e) => return Err(e),
        };

        let response = AgentResponse::from_outcome(session_id, outcome);
        snapshot.record_turn(
            &response.slots,
            response.intent,
            Turn::new(user_message, response.reply.text(), Some(response.intent)),
            self.memory.history_limit(),
        );
        self.memory
            .save(session_id, &snapshot)
            .await
            .map_err(|e| AgentError::Memory(e.to_string()))?;

        tracing::info!(
            intent = %response.intent,
            status = ?response.status,
            iterations = response.iteration_count,
            errors = response.errors.len(),
            "turn complete"
        );
        Ok(response)
    }
}
