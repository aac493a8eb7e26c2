//! 动作分发（ACT）
//!
//! 每个 ACT 最多一次外部调用（工具或检索），带超时并可被取消；失败一律变成结构化的 NoResult 观察，
//! 不向上抛错。call_tool 缺必需槽位时不调后端，改为 ask_for_slot（安全网）。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, ErrorKind};
use crate::memory::{RetrievalBackend, SearchParams, Snippet};
use crate::react::{Action, AgentState, Observation, SlotName, Slots};
use crate::tools::{ToolBackend, ToolOutcome};

/// 检索结果摘要中每个片段保留的字符数
const CONDENSED_CHARS: usize = 160;

/// 一次分发的结果
#[derive(Debug, Clone)]
pub struct Dispatched {
    /// 实际执行的动作（安全网会把 call_tool 换成 ask_for_slot）
    pub action: Action,
    pub observation: Observation,
    /// 需要写入 errors 的记录
    pub errors: Vec<(ErrorKind, String)>,
    /// 写入本周期 scratchpad 的说明
    pub notes: Vec<String>,
    /// 从参数 / 工具结果中得到的槽位
    pub mined: Slots,
    /// 发起了后端调用时为 Some(是否失败)
    pub backend_call: Option<bool>,
}

impl Dispatched {
    fn new(action: Action, observation: Observation) -> Self {
        Self {
            action,
            observation,
            errors: Vec::new(),
            notes: Vec::new(),
            mined: Slots::new(),
            backend_call: None,
        }
    }
}

/// 动作分发器
pub struct ActionDispatcher {
    tools: Arc<dyn ToolBackend>,
    retrieval: Arc<dyn RetrievalBackend>,
    search: SearchParams,
    timeout: Duration,
}

impl ActionDispatcher {
    pub fn new(tools: Arc<dyn ToolBackend>, retrieval: Arc<dyn RetrievalBackend>) -> Self {
        Self {
            tools,
            retrieval,
            search: SearchParams::default(),
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_search_params(mut self, params: SearchParams) -> Self {
        self.search = params;
        self
    }

    /// 单次外部调用的超时
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 执行动作；只有取消会返回 Err
    pub async fn dispatch(
        &self,
        action: &Action,
        state: &AgentState,
        cancel: &CancellationToken,
    ) -> Result<Dispatched, AgentError> {
        match action {
            Action::AskForSlot { slot } => Ok(ask_for_slot(*slot, state)),
            Action::Finish => Ok(Dispatched::new(Action::Finish, Observation::Ready)),
            Action::CallTool { tool, params } => self.call_tool(*tool, params, state, cancel).await,
            Action::CallRag { query } => self.call_rag(query.as_deref(), state, cancel).await,
        }
    }

    async fn call_tool(
        &self,
        tool: Option<crate::react::ToolName>,
        params: &Slots,
        state: &AgentState,
        cancel: &CancellationToken,
    ) -> Result<Dispatched, AgentError> {
        let action = Action::CallTool {
            tool,
            params: params.clone(),
        };
        let Some(tool) = tool.or_else(|| state.intent.default_tool()) else {
            let detail = format!("call_tool without a tool for intent {}", state.intent);
            let mut out = Dispatched::new(
                action,
                Observation::NoResult {
                    source: "call_tool".into(),
                    reason: ErrorKind::BackendError,
                    detail: detail.clone(),
                },
            );
            out.errors.push((ErrorKind::BackendError, detail));
            return Ok(out);
        };

        let mut merged = state.slots.clone();
        merged.merge_from(params);
        // 本轮用户给出了该工具的某个标识时，只用本轮给出的标识查询
        let accepted = tool.intent().slot_priority();
        if accepted.iter().any(|s| state.stated.contains(*s)) {
            for slot in accepted {
                if let Some(v) = state.stated.get(*slot) {
                    merged.set(*slot, v);
                } else {
                    merged.remove(*slot);
                }
            }
        }

        if let Some(slot) = tool.missing_slot(&merged) {
            let mut out = ask_for_slot(Some(slot), state);
            let detail = format!("{} requires {}", tool, slot);
            out.notes.push(format!("call_tool({}) is missing {}; asking the user instead.", tool, slot));
            out.errors.push((ErrorKind::MissingRequiredSlot, detail));
            return Ok(out);
        }

        let action = Action::CallTool {
            tool: Some(tool),
            params: params.clone(),
        };
        let call = timeout(self.timeout, self.tools.invoke(tool, &merged));
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            r = call => r.unwrap_or_else(|_| Err(AgentError::ToolTimeout(tool.to_string()))),
        };

        let mut out = match result {
            Ok(ToolOutcome::Found(data)) => {
                let mut out = Dispatched::new(action, Observation::ToolResult { tool, data: data.clone() });
                out.mined = Slots::from_json(&data);
                out.backend_call = Some(false);
                out
            }
            Ok(ToolOutcome::NotFound(detail)) => {
                let mut out = Dispatched::new(
                    action,
                    Observation::NoResult {
                        source: tool.to_string(),
                        reason: ErrorKind::BackendNotFound,
                        detail: detail.clone(),
                    },
                );
                out.errors.push((ErrorKind::BackendNotFound, detail));
                out.backend_call = Some(false);
                out
            }
            Err(e) => {
                let kind = e.kind().unwrap_or(ErrorKind::BackendError);
                let mut out = Dispatched::new(
                    action,
                    Observation::NoResult {
                        source: tool.to_string(),
                        reason: kind,
                        detail: e.to_string(),
                    },
                );
                out.errors.push((kind, e.to_string()));
                out.backend_call = Some(true);
                out
            }
        };
        // oracle 给出的参数同样视为确认过的槽位
        let mut mined = params.clone();
        mined.merge_from(&out.mined);
        out.mined = mined;
        Ok(out)
    }

    async fn call_rag(
        &self,
        query: Option<&str>,
        state: &AgentState,
        cancel: &CancellationToken,
    ) -> Result<Dispatched, AgentError> {
        let query = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or(state.user_message.as_str())
            .to_string();
        let action = Action::CallRag {
            query: Some(query.clone()),
        };

        let call = timeout(self.timeout, self.retrieval.search(&query, self.search));
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            r = call => r.unwrap_or(Err(AgentError::RetrievalTimeout)),
        };

        Ok(match result {
            Ok(snippets) => {
                let mut out = Dispatched::new(
                    action,
                    Observation::Snippets {
                        query,
                        count: snippets.len(),
                        condensed: condense(&snippets),
                        snippets,
                    },
                );
                out.backend_call = Some(false);
                out
            }
            Err(e) => {
                let kind = e.kind().unwrap_or(ErrorKind::BackendError);
                let mut out = Dispatched::new(
                    action,
                    Observation::NoResult {
                        source: "retrieval".into(),
                        reason: kind,
                        detail: e.to_string(),
                    },
                );
                out.errors.push((kind, e.to_string()));
                out.backend_call = Some(true);
                out
            }
        })
    }
}

/// 选出最高优先级的缺失槽位并生成澄清提示；不调用任何后端
fn ask_for_slot(requested: Option<SlotName>, state: &AgentState) -> Dispatched {
    let slot = requested
        .or_else(|| state.intent.missing_slot(&state.slots))
        .or_else(|| state.intent.slot_priority().first().copied())
        .unwrap_or(SlotName::OrderId);
    Dispatched::new(
        Action::AskForSlot { slot: Some(slot) },
        Observation::Clarification {
            slot,
            prompt: slot.prompt().to_string(),
        },
    )
}

fn condense(snippets: &[Snippet]) -> String {
    snippets
        .iter()
        .map(|s| {
            let text: String = s.text.chars().take(CONDENSED_CHARS).collect();
            if s.text.chars().count() > CONDENSED_CHARS {
                format!("[{}] {}...", s.doc_id, text)
            } else {
                format!("[{}] {}", s.doc_id, text)
            }
        })
        .collect::<Vec<_>>()
        .join(" | ")
}
