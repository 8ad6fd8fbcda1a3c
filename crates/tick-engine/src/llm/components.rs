//! ECS component for LLM-driven entities.

use serde::{Deserialize, Serialize};
use tick_ecs::component::Component;

/// Marks an entity as strategically driven by an LLM and tracks its query
/// bookkeeping.
///
/// `role`, `personality`, `context`, and `parser` name definitions in the
/// [`LlmManager`](crate::llm::LlmManager); an empty `parser` uses the
/// default JSON-into-blackboard parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmAgent {
    pub role: String,
    pub personality: String,
    pub context: String,
    pub parser: String,
    /// Minimum ticks between queries. 0 queries as fast as rate limits
    /// allow.
    pub query_interval: u64,
    /// Higher priorities dispatch first when rate-limited.
    pub priority: i32,
    /// Tick of the most recent dispatch.
    pub last_query_tick: u64,
    /// True while a query is in flight.
    pub pending: bool,
    pub consecutive_errors: u32,
    /// Consecutive errors before the agent is put on cooldown.
    pub max_retries: u32,
    /// Cooldown length once `max_retries` is hit.
    pub cooldown_ticks: u64,
    /// Tick at which the cooldown expires.
    pub cooldown_until: u64,
}

impl LlmAgent {
    pub fn new(
        role: impl Into<String>,
        personality: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            role: role.into(),
            personality: personality.into(),
            context: context.into(),
            parser: String::new(),
            query_interval: 100,
            priority: 0,
            last_query_tick: 0,
            pending: false,
            consecutive_errors: 0,
            max_retries: 3,
            cooldown_ticks: 200,
            cooldown_until: 0,
        }
    }

    pub fn with_parser(mut self, parser: impl Into<String>) -> Self {
        self.parser = parser.into();
        self
    }

    pub fn with_query_interval(mut self, query_interval: u64) -> Self {
        self.query_interval = query_interval;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl Component for LlmAgent {
    const NAME: &'static str = "llm.LlmAgent";
}
