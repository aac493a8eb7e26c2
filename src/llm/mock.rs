//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序返回预置回复；脚本用完后返回一个 finish 决策，便于本地跑通 LlmOracle。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::memory::{Message, Role};

/// Mock 客户端：预置回复队列；记录最后一条 User 消息
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<String>>,
    last_prompt: Mutex<Option<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            last_prompt: Mutex::new(None),
        }
    }

    /// 最后一次请求中的 User 消息
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().ok().and_then(|p| p.clone())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone());
        if let Ok(mut p) = self.last_prompt.lock() {
            *p = last_user;
        }

        let scripted = self
            .replies
            .lock()
            .map_err(|e| e.to_string())?
            .pop_front();
        Ok(scripted.unwrap_or_else(|| {
            r#"{"thought": "Mock: nothing more to do.", "action": "finish", "action_input": {}}"#
                .to_string()
        }))
    }
}
