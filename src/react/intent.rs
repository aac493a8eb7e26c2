//! 意图分类（CLASSIFY）与意图纠正
//!
//! IntentClassifier 为规则分类：先抽取槽位，再按关键词规则归入五类意图；
//! 简短补充消息（只回了一个订单号 / 商品号）交给按上一轮意图注册的 FollowUpStrategy。
//! `corrected_intent` 在 REASON 阶段根据新出现的槽位纠正意图。

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::react::{SlotName, Slots, ToolName};

/// 用户请求的意图分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    OrderStatus,
    RefundStatus,
    Inventory,
    Policy,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::OrderStatus => "order_status",
            Intent::RefundStatus => "refund_status",
            Intent::Inventory => "inventory",
            Intent::Policy => "policy",
            Intent::Unknown => "unknown",
        }
    }

    /// 该意图可用的槽位，按澄清优先级排列；任一存在即满足
    pub fn slot_priority(&self) -> &'static [SlotName] {
        match self {
            Intent::OrderStatus => &[SlotName::OrderId],
            Intent::RefundStatus => &[SlotName::OrderId, SlotName::RefundId],
            Intent::Inventory => &[SlotName::ProductId],
            Intent::Policy | Intent::Unknown => &[],
        }
    }

    /// 缺失时应向用户询问的槽位（最高优先级那个）；已满足或无需槽位时为 None
    pub fn missing_slot(&self, slots: &Slots) -> Option<SlotName> {
        let wanted = self.slot_priority();
        if wanted.is_empty() || wanted.iter().any(|s| slots.contains(*s)) {
            None
        } else {
            wanted.first().copied()
        }
    }

    /// 需要调用后端查询的意图
    pub fn is_lookup(&self) -> bool {
        self.default_tool().is_some()
    }

    pub fn default_tool(&self) -> Option<ToolName> {
        match self {
            Intent::OrderStatus => Some(ToolName::OrderStatus),
            Intent::RefundStatus => Some(ToolName::RefundStatus),
            Intent::Inventory => Some(ToolName::Inventory),
            Intent::Policy | Intent::Unknown => None,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 命中的规则；Fallback 表示没有任何关键词命中
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleHit {
    Keyword(&'static str),
    Fallback,
    Empty,
}

fn has_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

/// 仅按文本规则分类（不看会话上下文）
pub fn classify_text(text: &str, slots: &Slots) -> (Intent, RuleHit) {
    if !text.chars().any(char::is_alphanumeric) {
        return (Intent::Unknown, RuleHit::Empty);
    }
    let t = text.to_lowercase();
    let has_order = slots.contains(SlotName::OrderId);

    if slots.contains(SlotName::RefundId) {
        return (Intent::RefundStatus, RuleHit::Keyword("refund_id"));
    }
    if has_any(&t, &["how long", "how many days"]) && has_any(&t, &["refund", "return"]) {
        return (Intent::Policy, RuleHit::Keyword("refund_duration"));
    }
    if t.contains("refund") {
        if has_any(&t, &["status", "check", "what is"]) {
            return (Intent::RefundStatus, RuleHit::Keyword("refund_status"));
        }
        if has_any(&t, &["how long", "policy", "take"]) {
            return (Intent::Policy, RuleHit::Keyword("refund_policy"));
        }
        return (Intent::RefundStatus, RuleHit::Keyword("refund"));
    }
    if t.contains("where is my order") || t.contains("track") || (t.contains("where") && t.contains("order")) {
        return (Intent::OrderStatus, RuleHit::Keyword("tracking"));
    }
    if t.contains("order") && has_order {
        return (Intent::OrderStatus, RuleHit::Keyword("order_id"));
    }
    if t.contains("out for delivery") || (t.contains("delivery") && has_any(&t, &["late", "delay"])) {
        if has_order {
            return (Intent::OrderStatus, RuleHit::Keyword("delivery_with_order"));
        }
        return (Intent::Policy, RuleHit::Keyword("delivery_delay"));
    }
    if has_any(&t, &["charged", "charge", "fees", "convenience fee"]) {
        return (Intent::Policy, RuleHit::Keyword("charges"));
    }
    if has_any(&t, &["return", "return window", "refund policy"]) {
        return (Intent::Policy, RuleHit::Keyword("returns"));
    }
    if slots.contains(SlotName::ProductId) || has_any(&t, &["in stock", "stock", "available"]) {
        return (Intent::Inventory, RuleHit::Keyword("stock"));
    }
    (Intent::Policy, RuleHit::Fallback)
}

/// 简短补充消息的解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUp {
    pub intent: Intent,
    pub slot: SlotName,
    pub value: String,
}

/// 补充消息抽取策略：判断消息是否只是对上一轮澄清的回答
pub trait FollowUpStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn resolve(&self, message: &str, previous: Option<Intent>) -> Option<FollowUp>;
}

/// 纯数字回复 -> order_id；沿用上一轮的订单 / 退款意图，否则按订单查询
#[derive(Debug, Default)]
pub struct DigitFollowUp;

impl FollowUpStrategy for DigitFollowUp {
    fn name(&self) -> &'static str {
        "digits"
    }

    fn resolve(&self, message: &str, previous: Option<Intent>) -> Option<FollowUp> {
        let raw = message.trim().trim_start_matches('#');
        if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let intent = match previous {
            Some(Intent::RefundStatus) => Intent::RefundStatus,
            _ => Intent::OrderStatus,
        };
        Some(FollowUp {
            intent,
            slot: SlotName::OrderId,
            value: raw.to_string(),
        })
    }
}

/// 只回了一个商品号（如 "p123"）-> product_id，库存查询
#[derive(Debug, Default)]
pub struct ProductCodeFollowUp;

impl FollowUpStrategy for ProductCodeFollowUp {
    fn name(&self) -> &'static str {
        "product_code"
    }

    fn resolve(&self, message: &str, _previous: Option<Intent>) -> Option<FollowUp> {
        let raw = message.trim();
        if raw.split_whitespace().count() != 1 {
            return None;
        }
        let value = Slots::extract(raw).get(SlotName::ProductId)?.to_string();
        (value.len() == raw.len()).then_some(FollowUp {
            intent: Intent::Inventory,
            slot: SlotName::ProductId,
            value,
        })
    }
}

/// 按上一轮意图登记的补充消息策略；未登记的意图走 fallback 列表
pub struct FollowUpRegistry {
    by_intent: HashMap<Intent, Vec<Arc<dyn FollowUpStrategy>>>,
    fallback: Vec<Arc<dyn FollowUpStrategy>>,
}

impl FollowUpRegistry {
    pub fn empty() -> Self {
        Self {
            by_intent: HashMap::new(),
            fallback: Vec::new(),
        }
    }

    pub fn register(&mut self, previous: Intent, strategy: Arc<dyn FollowUpStrategy>) {
        self.by_intent.entry(previous).or_default().push(strategy);
    }

    pub fn register_fallback(&mut self, strategy: Arc<dyn FollowUpStrategy>) {
        self.fallback.push(strategy);
    }

    /// 依次尝试上一轮意图的策略；返回 (策略名, 结果)
    pub fn resolve(&self, message: &str, previous: Option<Intent>) -> Option<(&'static str, FollowUp)> {
        let strategies = previous
            .and_then(|p| self.by_intent.get(&p))
            .unwrap_or(&self.fallback);
        strategies
            .iter()
            .find_map(|s| s.resolve(message, previous).map(|f| (s.name(), f)))
    }
}

impl Default for FollowUpRegistry {
    fn default() -> Self {
        let digits: Arc<dyn FollowUpStrategy> = Arc::new(DigitFollowUp);
        let product: Arc<dyn FollowUpStrategy> = Arc::new(ProductCodeFollowUp);
        let mut registry = Self::empty();
        registry.register(Intent::OrderStatus, digits.clone());
        registry.register(Intent::RefundStatus, digits.clone());
        registry.register(Intent::Inventory, product.clone());
        registry.register(Intent::Inventory, digits.clone());
        registry.register_fallback(digits);
        registry.register_fallback(product);
        registry
    }
}

/// CLASSIFY 的产出
#[derive(Debug, Clone)]
pub struct Classification {
    pub intent: Intent,
    /// 携带槽位合并本轮抽取后的结果
    pub slots: Slots,
    /// 本轮从消息中抽取到的槽位
    pub extracted: Slots,
    pub rationale: String,
}

/// 规则意图分类器
pub struct IntentClassifier {
    follow_ups: FollowUpRegistry,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(FollowUpRegistry::default())
    }
}

impl IntentClassifier {
    pub fn new(follow_ups: FollowUpRegistry) -> Self {
        Self { follow_ups }
    }

    /// 分类一条用户消息；carried / previous 来自 SessionMemory
    pub fn classify(&self, message: &str, carried: &Slots, previous: Option<Intent>) -> Classification {
        let mut extracted = Slots::extract(message);

        let (intent, rationale) = if let Some((name, follow_up)) = self.follow_ups.resolve(message, previous) {
            extracted.set(follow_up.slot, follow_up.value.clone());
            (
                follow_up.intent,
                format!("Follow-up reply ({}) fills {}.", name, follow_up.slot),
            )
        } else {
            let (intent, hit) = classify_text(message, &extracted);
            match (hit, previous) {
                // 没有关键词命中：若携带的槽位足以继续上一轮的查询，则沿用上一轮意图
                (RuleHit::Fallback, Some(prev))
                    if prev.is_lookup() && prev.missing_slot(&merged(carried, &extracted)).is_none() =>
                {
                    (prev, format!("No new topic detected; continuing previous intent {}.", prev))
                }
                (RuleHit::Keyword(rule), _) => (intent, format!("Matched rule '{}'.", rule)),
                (RuleHit::Fallback, _) => (intent, "No specific rule matched; treating as a policy question.".to_string()),
                (RuleHit::Empty, _) => (intent, "Message has no usable content.".to_string()),
            }
        };

        Classification {
            intent,
            slots: merged(carried, &extracted),
            extracted,
            rationale,
        }
    }
}

fn merged(carried: &Slots, extracted: &Slots) -> Slots {
    let mut slots = carried.clone();
    slots.merge_from(extracted);
    slots
}

/// 新出现的槽位强烈指向另一意图时返回纠正后的意图
pub fn corrected_intent(current: Intent, changed: &[SlotName], slots: &Slots) -> Option<Intent> {
    let weak = matches!(current, Intent::Policy | Intent::Unknown);
    if changed.contains(&SlotName::RefundId) && (weak || current == Intent::OrderStatus) {
        return Some(Intent::RefundStatus);
    }
    if changed.contains(&SlotName::OrderId) && weak {
        return Some(Intent::OrderStatus);
    }
    if changed.contains(&SlotName::ProductId) && weak && !slots.contains(SlotName::OrderId) {
        return Some(Intent::Inventory);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(msg: &str) -> Intent {
        IntentClassifier::default().classify(msg, &Slots::new(), None).intent
    }

    #[test]
    fn test_keyword_rules() {
        assert_eq!(classify("Where is my order 98762?"), Intent::OrderStatus);
        assert_eq!(classify("Where is my order?"), Intent::OrderStatus);
        assert_eq!(classify("What is the status of my refund for 10021"), Intent::RefundStatus);
        assert_eq!(classify("How long do refunds take?"), Intent::Policy);
        assert_eq!(classify("Why was I charged a convenience fee?"), Intent::Policy);
        assert_eq!(classify("Is P123 in stock?"), Intent::Inventory);
        assert_eq!(classify("My delivery is late"), Intent::Policy);
        assert_eq!(classify("My delivery for 98762 is late"), Intent::OrderStatus);
        assert_eq!(classify("hello there"), Intent::Policy);
        assert_eq!(classify("?!"), Intent::Unknown);
    }

    #[test]
    fn test_refund_id_implies_refund_status() {
        let c = IntentClassifier::default().classify("any news on RF10021", &Slots::new(), None);
        assert_eq!(c.intent, Intent::RefundStatus);
        assert_eq!(c.slots.get(SlotName::RefundId), Some("RF10021"));
    }

    #[test]
    fn test_digit_follow_up_inherits_previous_intent() {
        let c = IntentClassifier::default().classify("98762", &Slots::new(), Some(Intent::RefundStatus));
        assert_eq!(c.intent, Intent::RefundStatus);
        assert_eq!(c.slots.get(SlotName::OrderId), Some("98762"));

        let c = IntentClassifier::default().classify(" 98762 ", &Slots::new(), Some(Intent::Policy));
        assert_eq!(c.intent, Intent::OrderStatus);
    }

    #[test]
    fn test_product_code_follow_up() {
        let c = IntentClassifier::default().classify("p456", &Slots::new(), Some(Intent::Inventory));
        assert_eq!(c.intent, Intent::Inventory);
        assert_eq!(c.slots.get(SlotName::ProductId), Some("P456"));
    }

    #[test]
    fn test_custom_follow_up_registry() {
        struct Never;
        impl FollowUpStrategy for Never {
            fn name(&self) -> &'static str {
                "never"
            }
            fn resolve(&self, _: &str, _: Option<Intent>) -> Option<FollowUp> {
                None
            }
        }
        let mut registry = FollowUpRegistry::empty();
        registry.register_fallback(Arc::new(Never));
        let c = IntentClassifier::new(registry).classify("98762", &Slots::new(), None);
        // 不走补充策略时，裸数字仍被抽取为订单号但意图回落为 policy
        assert_eq!(c.intent, Intent::Policy);
        assert_eq!(c.slots.get(SlotName::OrderId), Some("98762"));
    }

    #[test]
    fn test_carried_intent_on_fallback() {
        let mut carried = Slots::new();
        carried.set(SlotName::OrderId, "98762");
        let c = IntentClassifier::default().classify("and when will it arrive?", &carried, Some(Intent::OrderStatus));
        assert_eq!(c.intent, Intent::OrderStatus);
        assert_eq!(c.slots.get(SlotName::OrderId), Some("98762"));

        // 有明确关键词时不沿用
        let c = IntentClassifier::default().classify("what is your return window?", &carried, Some(Intent::OrderStatus));
        assert_eq!(c.intent, Intent::Policy);
    }

    #[test]
    fn test_missing_slot_priority() {
        let empty = Slots::new();
        assert_eq!(Intent::OrderStatus.missing_slot(&empty), Some(SlotName::OrderId));
        assert_eq!(Intent::RefundStatus.missing_slot(&empty), Some(SlotName::OrderId));
        assert_eq!(Intent::Policy.missing_slot(&empty), None);

        let mut s = Slots::new();
        s.set(SlotName::RefundId, "RF10021");
        assert_eq!(Intent::RefundStatus.missing_slot(&s), None);
    }

    #[test]
    fn test_corrected_intent() {
        let mut slots = Slots::new();
        slots.set(SlotName::RefundId, "RF10021");
        assert_eq!(
            corrected_intent(Intent::OrderStatus, &[SlotName::RefundId], &slots),
            Some(Intent::RefundStatus)
        );
        assert_eq!(corrected_intent(Intent::Inventory, &[SlotName::RefundId], &slots), None);
        assert_eq!(corrected_intent(Intent::OrderStatus, &[], &slots), None);
        slots.set(SlotName::OrderId, "98762");
        assert_eq!(
            corrected_intent(Intent::Policy, &[SlotName::OrderId], &slots),
            Some(Intent::OrderStatus)
        );
    }
}
