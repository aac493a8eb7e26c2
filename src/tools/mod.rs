//! 工具层：查询工具、注册表、带超时与审计日志的执行器、决策 Schema

pub mod executor;
pub mod lookup;
pub mod registry;
pub mod schema;

pub use executor::ToolExecutor;
pub use lookup::{register_lookup_tools, InventoryTool, MockStore, OrderStatusTool, RefundStatusTool};
pub use registry::{Tool, ToolBackend, ToolOutcome, ToolRegistry};
pub use schema::decision_schema_json;
