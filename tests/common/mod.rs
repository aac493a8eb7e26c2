//! 集成测试共用的夹具：模拟数据、政策索引、脚本化 Oracle、慢后端

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use support_agent::core::AgentError;
use support_agent::llm::HashEmbedder;
use support_agent::memory::{PolicyIndex, RetrievalBackend, SearchParams, Snippet};
use support_agent::react::{
    ActionDispatcher, DecisionOracle, OracleInput, RawDecision, ReasonActLoop, Slots, TemplateComposer, ToolName,
};
use support_agent::tools::{register_lookup_tools, MockStore, ToolBackend, ToolExecutor, ToolOutcome, ToolRegistry};

pub fn store() -> MockStore {
    MockStore::from_tables(
        json!({
            "98762": {
                "order_status": "Out for delivery",
                "expected_delivery": "2024-06-14",
                "delay_reason": "High parcel volume"
            },
            "10021": { "order_status": "Refunded" },
            "54321": { "order_status": "Returned" }
        }),
        json!({
            "10021": {
                "refund_id": "RF10021",
                "refund_status": "Completed",
                "refund_amount": "$49.99"
            },
            "54321": {
                "refund_id": "RF54321",
                "refund_status": "Pending review",
                "refund_amount": "$120.00"
            }
        }),
        json!({
            "P123": { "in_stock": true, "quantity_available": 42 },
            "P456": { "in_stock": false, "quantity_available": 0, "restock_date": "2024-07-01" }
        }),
    )
    .unwrap()
}

pub fn executor() -> Arc<ToolExecutor> {
    let mut registry = ToolRegistry::new();
    register_lookup_tools(&mut registry, Arc::new(store()));
    Arc::new(ToolExecutor::new(registry, 5))
}

pub async fn policy_index() -> Arc<PolicyIndex> {
    let index = PolicyIndex::new(Arc::new(HashEmbedder::new(128)));
    index
        .index_document(
            "shipping_policy",
            "An order marked out for delivery normally arrives the same day. Delivery delays over 3 days are investigated with the carrier.",
        )
        .await
        .unwrap();
    index
        .index_document(
            "refund_policy",
            "Refunds are processed within 5 to 7 business days after the returned item is received.",
        )
        .await
        .unwrap();
    Arc::new(index)
}

pub fn empty_index() -> Arc<PolicyIndex> {
    Arc::new(PolicyIndex::new(Arc::new(HashEmbedder::new(64))))
}

pub fn dispatcher(tools: Arc<dyn ToolBackend>, retrieval: Arc<dyn RetrievalBackend>) -> ActionDispatcher {
    ActionDispatcher::new(tools, retrieval).with_search_params(SearchParams::default())
}

pub fn react_loop(
    oracle: Arc<dyn DecisionOracle>,
    tools: Arc<dyn ToolBackend>,
    retrieval: Arc<dyn RetrievalBackend>,
) -> ReasonActLoop {
    ReasonActLoop::new(oracle, dispatcher(tools, retrieval), Arc::new(TemplateComposer::new()))
}

/// 按顺序返回预设决策，用完后一律 finish
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<RawDecision>>,
    calls: Mutex<usize>,
}

impl ScriptedOracle {
    pub fn new(replies: impl IntoIterator<Item = RawDecision>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn decide(&self, _input: &OracleInput) -> Result<RawDecision, AgentError> {
        *self.calls.lock().unwrap() += 1;
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| RawDecision::new("done", "finish", json!({}))))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// 每次都要求查订单
pub struct AlwaysCallTool;

#[async_trait]
impl DecisionOracle for AlwaysCallTool {
    async fn decide(&self, _input: &OracleInput) -> Result<RawDecision, AgentError> {
        Ok(RawDecision::new(
            "Checking the order again.",
            "call_tool",
            json!({ "tool": "order_status", "params": { "order_id": "98762" } }),
        ))
    }

    fn name(&self) -> &str {
        "always-call-tool"
    }
}

/// 永不返回的 Oracle（用于取消）
pub struct HangingOracle;

#[async_trait]
impl DecisionOracle for HangingOracle {
    async fn decide(&self, _input: &OracleInput) -> Result<RawDecision, AgentError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(RawDecision::new("late", "finish", json!({})))
    }

    fn name(&self) -> &str {
        "hanging"
    }
}

/// 比分发器超时更慢的工具后端
pub struct SlowTools(pub Duration);

#[async_trait]
impl ToolBackend for SlowTools {
    async fn invoke(&self, _tool: ToolName, _params: &Slots) -> Result<ToolOutcome, AgentError> {
        tokio::time::sleep(self.0).await;
        Ok(ToolOutcome::Found(json!({})))
    }
}

/// 总是失败的检索后端
pub struct BrokenRetrieval;

#[async_trait]
impl RetrievalBackend for BrokenRetrieval {
    async fn search(&self, _query: &str, _params: SearchParams) -> Result<Vec<Snippet>, AgentError> {
        Err(AgentError::RetrievalFailed("index offline".into()))
    }
}
