//! LLM layer configuration.

/// Immutable configuration for the strategic LLM layer.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Maximum new queries dispatched per tick.
    pub max_queries_per_tick: usize,
    /// Sliding-window (per simulated second) rate limit across ticks.
    pub max_queries_per_second: usize,
    /// Worker threads servicing blocking client calls.
    pub worker_threads: usize,
    /// Seconds before an in-flight query is treated as timed out.
    pub query_timeout: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            max_queries_per_tick: 1,
            max_queries_per_second: 5,
            worker_threads: 4,
            query_timeout: 30.0,
        }
    }
}
