//! Support Agent - Rust 客服智能体
//!
//! 模块划分：
//! - **agent**: 对外运行时（会话串行化、会话记忆读写、结果投影）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、恢复与升级策略、会话监管、装配
//! - **llm**: LLM 客户端（OpenAI 兼容 / Mock）与嵌入
//! - **memory**: 会话记忆（内存 / JSON 文件）、政策检索索引、分词
//! - **react**: 意图分类、槽位、决策、动作分发、ReAct 主循环、回复渲染
//! - **tools**: 订单 / 退款 / 库存查询工具与执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use agent::{AgentResponse, Reply, SupportAgent};
