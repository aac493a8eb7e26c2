//! 认知层：意图分类、槽位、动作与校验、轨迹、决策 Oracle、动作分发、Composer、ReAct 主循环

pub mod action;
pub mod composer;
pub mod dispatch;
pub mod events;
pub mod intent;
pub mod loop_;
pub mod planner;
pub mod scratchpad;
pub mod slots;
pub mod state;

pub use action::{validate_decision, Action, ActionKind, Decision, DecisionFault, RawDecision, ToolName};
pub use composer::{Composer, TemplateComposer, COMPOSE_FAILED_REPLY, NO_INFO_REPLY};
pub use dispatch::{ActionDispatcher, Dispatched};
pub use events::ReactEvent;
pub use intent::{
    classify_text, corrected_intent, Classification, DigitFollowUp, FollowUp, FollowUpRegistry,
    FollowUpStrategy, Intent, IntentClassifier, ProductCodeFollowUp, RuleHit,
};
pub use loop_::{LoopOutcome, LoopSeed, ReasonActLoop};
pub use planner::{parse_decision, DecisionOracle, LlmOracle, OracleInput, RuleOracle};
pub use scratchpad::{CycleRecord, Observation, ScratchEntry, Scratchpad};
pub use slots::{SlotName, Slots};
pub use state::{AgentState, DEFAULT_MAX_ITERATIONS};
