//! 槽位：意图所需的结构化参数（order_id / refund_id / product_id）
//!
//! 来源：用户文本的规则抽取、SessionMemory 携带、工具结果挖掘。
//! 合并只接受非空值，已确认的槽位不会被空抽取覆盖。

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// 槽位名
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotName {
    OrderId,
    RefundId,
    ProductId,
}

impl SlotName {
    pub const ALL: [SlotName; 3] = [SlotName::OrderId, SlotName::RefundId, SlotName::ProductId];

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotName::OrderId => "order_id",
            SlotName::RefundId => "refund_id",
            SlotName::ProductId => "product_id",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "order_id" => Some(SlotName::OrderId),
            "refund_id" => Some(SlotName::RefundId),
            "product_id" => Some(SlotName::ProductId),
            _ => None,
        }
    }

    /// 向用户澄清该槽位时的提示语
    pub fn prompt(&self) -> &'static str {
        match self {
            SlotName::OrderId => {
                "I can check that for you. Could you share the order ID (e.g., 98762)?"
            }
            SlotName::RefundId => {
                "Could you share the refund ID (e.g., RF10021) or the order ID for that refund?"
            }
            SlotName::ProductId => {
                "Please provide the product ID (e.g., P123) so I can check availability."
            }
        }
    }
}

impl std::fmt::Display for SlotName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn order_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{4,})\b").unwrap())
}

fn refund_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(RF-?\d{3,})\b").unwrap())
}

fn product_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(P\d[0-9A-Za-z_-]{0,11})\b").unwrap())
}

/// 当前已知槽位（有序映射，序列化为 `{"order_id": "98762"}`）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slots(BTreeMap<SlotName, String>);

impl Slots {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从用户文本抽取：4 位以上数字为订单号，RF+数字为退款号，P+数字开头为商品号（统一大写）
    pub fn extract(text: &str) -> Self {
        let mut slots = Slots::new();
        if let Some(m) = order_re().captures(text).and_then(|c| c.get(1)) {
            slots.set(SlotName::OrderId, m.as_str());
        }
        if let Some(m) = refund_re().captures(text).and_then(|c| c.get(1)) {
            slots.set(SlotName::RefundId, m.as_str().to_uppercase().replace('-', ""));
        }
        if let Some(m) = product_re().captures(text).and_then(|c| c.get(1)) {
            slots.set(SlotName::ProductId, m.as_str().to_uppercase());
        }
        slots
    }

    /// 从工具结果 / action_input 这类 JSON 对象中挖掘标识字段（字符串或数字）
    pub fn from_json(value: &serde_json::Value) -> Self {
        let mut slots = Slots::new();
        let Some(obj) = value.as_object() else {
            return slots;
        };
        for name in SlotName::ALL {
            let v = match obj.get(name.as_str()) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Number(n)) => n.to_string(),
                _ => continue,
            };
            slots.set(name, v);
        }
        slots
    }

    /// 设置槽位；空白值被忽略，返回是否写入
    pub fn set(&mut self, name: SlotName, value: impl Into<String>) -> bool {
        let value = value.into();
        let value = value.trim();
        if value.is_empty() {
            return false;
        }
        self.0.insert(name, value.to_string());
        true
    }

    pub fn get(&self, name: SlotName) -> Option<&str> {
        self.0.get(&name).map(String::as_str)
    }

    pub fn contains(&self, name: SlotName) -> bool {
        self.0.contains_key(&name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotName, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// 合并 other 的非空值；返回值发生变化的槽位
    pub fn merge_from(&mut self, other: &Slots) -> Vec<SlotName> {
        let mut changed = Vec::new();
        for (name, value) in other.iter() {
            if self.get(name) != Some(value) && self.set(name, value) {
                changed.push(name);
            }
        }
        changed
    }

    /// 同 merge_from，但不覆盖 `stated` 中取值不同的槽位（本轮用户明确给出的值优先）
    pub fn merge_respecting(&mut self, other: &Slots, stated: &Slots) -> Vec<SlotName> {
        let kept: Slots = other
            .iter()
            .filter(|(name, value)| !matches!(stated.get(*name), Some(s) if s != *value))
            .map(|(name, value)| (name, value.to_string()))
            .collect();
        self.merge_from(&kept)
    }

    pub fn remove(&mut self, name: SlotName) -> Option<String> {
        self.0.remove(&name)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

impl FromIterator<(SlotName, String)> for Slots {
    fn from_iter<T: IntoIterator<Item = (SlotName, String)>>(iter: T) -> Self {
        let mut slots = Slots::new();
        for (k, v) in iter {
            slots.set(k, v);
        }
        slots
    }
}
