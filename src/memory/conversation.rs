//! 对话记录
//!
//! Message / Role 用于拼 LLM 请求；Turn 是一轮「用户输入 -> 客服回复」的持久化记录，
//! History 保留最近 N 轮，超出时丢弃最旧的。

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::react::Intent;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条 LLM 消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 一轮对话：用户原话、最终对外回复（答案或澄清问题）、本轮意图
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub user: String,
    pub assistant: String,
    #[serde(default)]
    pub intent: Option<Intent>,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>, intent: Option<Intent>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
            intent,
            at: Utc::now(),
        }
    }
}

/// 有上限的对话历史（按轮计数，最旧的先丢弃）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    turns: VecDeque<Turn>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: impl IntoIterator<Item = Turn>, limit: usize) -> Self {
        let mut history = Self {
            turns: turns.into_iter().collect(),
        };
        history.prune(limit);
        history
    }

    pub fn push(&mut self, turn: Turn, limit: usize) {
        self.turns.push_back(turn);
        self.prune(limit);
    }

    /// 超出 limit 时从头部丢弃
    pub fn prune(&mut self, limit: usize) {
        while self.turns.len() > limit {
            self.turns.pop_front();
        }
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
