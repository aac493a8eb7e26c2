//! Scratchpad：一次调用内只追加的推理轨迹
//!
//! 第一条为 CLASSIFY 记录，之后每个 REASON/ACT 周期一条 CycleRecord（thought + action + observation）。
//! 底层是 `Arc<Vec<_>>`，克隆只增加引用计数；追加时 copy-on-write，已经交出去的快照不会被后续追加改变。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::ErrorKind;
use crate::memory::Snippet;
use crate::react::{ActionKind, Intent, SlotName, Slots, ToolName};

/// 一次动作执行后的观察
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Observation {
    /// 工具返回了记录
    ToolResult { tool: ToolName, data: Value },
    /// 结构化的“无结果”标记（not_found / 超时 / 后端错误）
    NoResult {
        source: String,
        reason: ErrorKind,
        detail: String,
    },
    /// 检索结果；count 可以为 0
    Snippets {
        query: String,
        count: usize,
        condensed: String,
        snippets: Vec<Snippet>,
    },
    /// 需要用户补充的槽位及提示语
    Clarification { slot: SlotName, prompt: String },
    /// finish：可以进入 COMPOSE
    Ready,
}

impl Observation {
    /// 一行摘要，用于日志、事件与 Oracle 提示
    pub fn summary(&self) -> String {
        match self {
            Observation::ToolResult { tool, data } => format!("{} -> {}", tool, data),
            Observation::NoResult { source, reason, detail } => {
                format!("{}: no result ({}): {}", source, reason, detail)
            }
            Observation::Snippets { count, condensed, .. } => {
                if *count == 0 {
                    "0 policy snippets".to_string()
                } else {
                    format!("{} policy snippets: {}", count, condensed)
                }
            }
            Observation::Clarification { slot, prompt } => format!("ask user for {}: {}", slot, prompt),
            Observation::Ready => "ready to compose".to_string(),
        }
    }
}

/// 一个 REASON/ACT 周期
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    /// 本周期结束后的 iteration（从 1 开始）
    pub iteration: usize,
    /// 本周期的推理；意图纠正会作为单独一条写在 Oracle 的 thought 之前
    pub thoughts: Vec<String>,
    pub action: ActionKind,
    pub action_input: Value,
    pub observation: Observation,
    /// 附加说明（安全网触发、达到迭代上限等）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// 轨迹条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum ScratchEntry {
    Classify {
        intent: Intent,
        slots: Slots,
        thought: String,
    },
    Cycle(CycleRecord),
}

/// 只追加的有序轨迹
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scratchpad(Arc<Vec<ScratchEntry>>);

impl Scratchpad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ScratchEntry) {
        Arc::make_mut(&mut self.0).push(entry);
    }

    /// 给最后一个周期追加说明（迭代上限等）；没有周期时忽略
    pub fn annotate_last(&mut self, note: impl Into<String>) {
        if let Some(ScratchEntry::Cycle(record)) = Arc::make_mut(&mut self.0).last_mut() {
            record.notes.push(note.into());
        }
    }

    pub fn entries(&self) -> &[ScratchEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn cycles(&self) -> impl Iterator<Item = &CycleRecord> {
        self.0.iter().filter_map(|e| match e {
            ScratchEntry::Cycle(r) => Some(r),
            ScratchEntry::Classify { .. } => None,
        })
    }

    pub fn cycle_count(&self) -> usize {
        self.cycles().count()
    }

    pub fn observations(&self) -> impl Iterator<Item = &Observation> {
        self.cycles().map(|r| &r.observation)
    }

    /// 工具成功返回的数据（按出现顺序）
    pub fn tool_results(&self) -> impl Iterator<Item = (ToolName, &Value)> {
        self.observations().filter_map(|o| match o {
            Observation::ToolResult { tool, data } => Some((*tool, data)),
            _ => None,
        })
    }

    /// 某工具是否已经被调用过（无论成功与否）
    pub fn tool_attempted(&self, tool: ToolName) -> bool {
        self.cycles().any(|r| {
            r.action == ActionKind::CallTool
                && match &r.observation {
                    Observation::ToolResult { tool: t, .. } => *t == tool,
                    Observation::NoResult { source, .. } => source == tool.as_str(),
                    _ => false,
                }
        })
    }

    pub fn retrieval_attempted(&self) -> bool {
        self.cycles().any(|r| r.action == ActionKind::CallRag)
    }

    /// 全部检索到的片段（去重按 chunk_id，保留首次出现的顺序）
    pub fn snippets(&self) -> Vec<&Snippet> {
        let mut seen = std::collections::HashSet::new();
        self.observations()
            .filter_map(|o| match o {
                Observation::Snippets { snippets, .. } => Some(snippets.iter()),
                _ => None,
            })
            .flatten()
            .filter(|s| seen.insert(s.chunk_id.clone()))
            .collect()
    }

    /// 人类可读的 Thought / Action / Observation 轨迹
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in self.0.iter() {
            match entry {
                ScratchEntry::Classify { intent, slots, thought } => {
                    let slots: Vec<String> = slots.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                    out.push_str(&format!(
                        "[classify] intent={} slots={{{}}}\nThought: {}\n",
                        intent,
                        slots.join(", "),
                        thought
                    ));
                }
                ScratchEntry::Cycle(r) => {
                    out.push_str(&format!("[{}]\n", r.iteration));
                    for t in &r.thoughts {
                        out.push_str(&format!("Thought: {}\n", t));
                    }
                    out.push_str(&format!("Action: {} {}\n", r.action, r.action_input));
                    out.push_str(&format!("Observation: {}\n", r.observation.summary()));
                    for n in &r.notes {
                        out.push_str(&format!("Note: {}\n", n));
                    }
                }
            }
        }
        out
    }
}
