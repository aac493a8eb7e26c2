//! 查询工具：订单状态、退款状态、库存
//!
//! 数据来自 data_dir 下的 orders.json / refunds.json / inventory.json（id -> 记录）；
//! 表为空或文件缺失时工具返回错误（后端不可用），id 不存在时返回 NotFound。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::react::SlotName;
use crate::tools::{Tool, ToolOutcome, ToolRegistry};

type Table = HashMap<String, Map<String, Value>>;

/// 只读的 JSON 数据源
#[derive(Debug, Default, Clone)]
pub struct MockStore {
    orders: Table,
    refunds: Table,
    inventory: Table,
}

impl MockStore {
    /// 从目录加载三张表；缺失的文件视为空表
    pub fn load(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        Ok(Self {
            orders: load_table(&dir.join("orders.json"))?,
            refunds: load_table(&dir.join("refunds.json"))?,
            inventory: load_table(&dir.join("inventory.json"))?,
        })
    }

    pub fn from_tables(orders: Value, refunds: Value, inventory: Value) -> anyhow::Result<Self> {
        Ok(Self {
            orders: serde_json::from_value(orders).context("orders table")?,
            refunds: serde_json::from_value(refunds).context("refunds table")?,
            inventory: serde_json::from_value(inventory).context("inventory table")?,
        })
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}

fn load_table(path: &Path) -> anyhow::Result<Table> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "mock data file missing, table is empty");
        return Ok(Table::new());
    }
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

fn arg(args: &Value, slot: SlotName) -> Option<String> {
    match args.get(slot.as_str()) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// 返回带 id 字段的记录副本
fn with_id(entry: &Map<String, Value>, slot: SlotName, id: &str) -> Value {
    let mut obj = entry.clone();
    obj.entry(slot.as_str().to_string())
        .or_insert_with(|| Value::String(id.to_string()));
    Value::Object(obj)
}

fn order_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": { "order_id": { "type": "string", "description": "Order ID (4+ digits)" } },
        "required": ["order_id"]
    })
}

/// 订单状态
pub struct OrderStatusTool {
    store: Arc<MockStore>,
}

impl OrderStatusTool {
    pub fn new(store: Arc<MockStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for OrderStatusTool {
    fn name(&self) -> &str {
        "order_status"
    }

    fn description(&self) -> &str {
        "Get order status, expected delivery and delay reason by order ID."
    }

    fn parameters_schema(&self) -> Value {
        order_schema()
    }

    async fn execute(&self, args: Value) -> Result<ToolOutcome, String> {
        let order_id = arg(&args, SlotName::OrderId).ok_or("Missing order_id")?;
        if self.store.orders.is_empty() {
            return Err("Orders DB empty or not found.".into());
        }
        Ok(match self.store.orders.get(&order_id) {
            Some(entry) => ToolOutcome::Found(with_id(entry, SlotName::OrderId, &order_id)),
            None => ToolOutcome::NotFound(format!("Order {} not found", order_id)),
        })
    }
}

/// 退款状态：有 refund_id 时先按记录里的 refund_id 字段查，再按 order_id 直接查
pub struct RefundStatusTool {
    store: Arc<MockStore>,
}

impl RefundStatusTool {
    pub fn new(store: Arc<MockStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for RefundStatusTool {
    fn name(&self) -> &str {
        "refund_status"
    }

    fn description(&self) -> &str {
        "Get refund status, amount and processing date by order ID or refund ID."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "order_id": { "type": "string" },
                "refund_id": { "type": "string", "description": "Refund ID like RF10021" }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutcome, String> {
        let order_id = arg(&args, SlotName::OrderId);
        let refund_id = arg(&args, SlotName::RefundId);
        if order_id.is_none() && refund_id.is_none() {
            return Err("Missing order_id or refund_id".into());
        }
        if self.store.refunds.is_empty() {
            return Err("Refunds DB empty or not found.".into());
        }

        if let Some(rid) = &refund_id {
            let hit = self.store.refunds.iter().find(|(_, e)| {
                e.get("refund_id")
                    .and_then(Value::as_str)
                    .is_some_and(|r| r.eq_ignore_ascii_case(rid))
            });
            if let Some((oid, entry)) = hit {
                return Ok(ToolOutcome::Found(with_id(entry, SlotName::OrderId, oid)));
            }
        }
        if let Some(oid) = &order_id {
            if let Some(entry) = self.store.refunds.get(oid) {
                return Ok(ToolOutcome::Found(with_id(entry, SlotName::OrderId, oid)));
            }
        }
        let which = refund_id
            .map(|r| format!("refund {}", r))
            .or(order_id.map(|o| format!("order {}", o)))
            .unwrap_or_default();
        Ok(ToolOutcome::NotFound(format!("No refund found for {}", which)))
    }
}

/// 库存
pub struct InventoryTool {
    store: Arc<MockStore>,
}

impl InventoryTool {
    pub fn new(store: Arc<MockStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for InventoryTool {
    fn name(&self) -> &str {
        "inventory"
    }

    fn description(&self) -> &str {
        "Check stock, available quantity and restock date by product ID."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "product_id": { "type": "string", "description": "Product ID like P123" } },
            "required": ["product_id"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutcome, String> {
        let product_id = arg(&args, SlotName::ProductId)
            .map(|p| p.to_uppercase())
            .ok_or("Missing product_id")?;
        if self.store.inventory.is_empty() {
            return Err("Inventory DB empty or not found.".into());
        }
        Ok(match self.store.inventory.get(&product_id) {
            Some(entry) => ToolOutcome::Found(with_id(entry, SlotName::ProductId, &product_id)),
            None => ToolOutcome::NotFound(format!("Product {} not found", product_id)),
        })
    }
}

/// 注册三个查询工具
pub fn register_lookup_tools(registry: &mut ToolRegistry, store: Arc<MockStore>) {
    registry.register(OrderStatusTool::new(store.clone()));
    registry.register(RefundStatusTool::new(store.clone()));
    registry.register(InventoryTool::new(store));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> Arc<MockStore> {
        Arc::new(
            MockStore::from_tables(
                json!({"98762": {"order_status": "out for delivery", "expected_delivery": "2025-01-12"}}),
                json!({
                    "10021": {"refund_id": "RF10021", "refund_status": "processed", "refund_amount": 499},
                    "54321": {"refund_id": "RF54321", "refund_status": "pending review"}
                }),
                json!({"P123": {"in_stock": true, "quantity_available": 12}}),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_order_found_and_not_found() {
        let tool = OrderStatusTool::new(store());
        match tool.execute(json!({"order_id": "98762"})).await.unwrap() {
            ToolOutcome::Found(v) => {
                assert_eq!(v["order_status"], "out for delivery");
                assert_eq!(v["order_id"], "98762");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            tool.execute(json!({"order_id": "11111"})).await.unwrap(),
            ToolOutcome::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_lookup_is_idempotent() {
        let tool = InventoryTool::new(store());
        let a = tool.execute(json!({"product_id": "p123"})).await.unwrap();
        let b = tool.execute(json!({"product_id": "p123"})).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_refund_by_refund_id() {
        let tool = RefundStatusTool::new(store());
        match tool.execute(json!({"refund_id": "rf10021"})).await.unwrap() {
            ToolOutcome::Found(v) => assert_eq!(v["order_id"], "10021"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_refund_id_wins_over_order_id() {
        let tool = RefundStatusTool::new(store());
        match tool.execute(json!({"order_id": "10021", "refund_id": "RF54321"})).await.unwrap() {
            ToolOutcome::Found(v) => {
                assert_eq!(v["refund_status"], "pending review");
                assert_eq!(v["order_id"], "54321");
            }
            other => panic!("unexpected {:?}", other),
        }
        // 退款号查不到时仍按订单号
        match tool.execute(json!({"order_id": "10021", "refund_id": "RF99999"})).await.unwrap() {
            ToolOutcome::Found(v) => assert_eq!(v["refund_id"], "RF10021"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_table_is_backend_error() {
        let tool = OrderStatusTool::new(Arc::new(MockStore::default()));
        let err = tool.execute(json!({"order_id": "98762"})).await.unwrap_err();
        assert!(err.contains("Orders DB"));
    }

    #[test]
    fn test_load_missing_dir_gives_empty_tables() {
        let dir = tempfile::tempdir().unwrap();
        let store = MockStore::load(dir.path()).unwrap();
        assert_eq!(store.order_count(), 0);
    }
}
