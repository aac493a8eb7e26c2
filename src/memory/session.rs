//! 会话记忆：跨轮次的槽位、上一轮意图与对话历史
//!
//! SessionMemory 是唯一跨调用持久化状态的组件：load 给 ReAct 循环提供种子，save 写回本轮结果。
//! 同一会话的串行化由 SessionSupervisor 负责；save 为 last-writer-wins，并按 history_limit 截断历史。

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::memory::{History, Turn};
use crate::react::{Intent, Slots};

/// 默认保留的历史轮数
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// 会话的持久化投影
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default)]
    pub slots: Slots,
    #[serde(default)]
    pub last_intent: Option<Intent>,
    #[serde(default)]
    pub history: History,
}

impl SessionSnapshot {
    /// 合并本轮结果：非空槽位覆盖，记录意图，追加一轮历史
    pub fn record_turn(&mut self, slots: &Slots, intent: Intent, turn: Turn, history_limit: usize) {
        self.slots.merge_from(slots);
        if intent != Intent::Unknown {
            self.last_intent = Some(intent);
        }
        self.history.push(turn, history_limit);
    }
}

/// 会话记忆接口
#[async_trait]
pub trait SessionMemory: Send + Sync {
    /// 读取会话；不存在时返回空快照
    async fn load(&self, session_id: &str) -> anyhow::Result<SessionSnapshot>;

    /// 写入会话（覆盖），历史超过上限时丢弃最旧的
    async fn save(&self, session_id: &str, snapshot: &SessionSnapshot) -> anyhow::Result<()>;

    /// 历史轮数上限
    fn history_limit(&self) -> usize {
        DEFAULT_HISTORY_LIMIT
    }
}

/// 进程内会话记忆（测试 / 未配置 session_dir 时使用）
#[derive(Debug)]
pub struct InMemorySessionMemory {
    sessions: RwLock<HashMap<String, SessionSnapshot>>,
    history_limit: usize,
}

impl InMemorySessionMemory {
    pub fn new(history_limit: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            history_limit,
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for InMemorySessionMemory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

#[async_trait]
impl SessionMemory for InMemorySessionMemory {
    async fn load(&self, session_id: &str) -> anyhow::Result<SessionSnapshot> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, session_id: &str, snapshot: &SessionSnapshot) -> anyhow::Result<()> {
        let mut stored = snapshot.clone();
        stored.history.prune(self.history_limit);
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), stored);
        Ok(())
    }

    fn history_limit(&self) -> usize {
        self.history_limit
    }
}
