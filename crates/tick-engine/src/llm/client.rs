//! LLM client trait, errors, and the deterministic mock client.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

/// Failure inside the LLM layer. Unlike every other subsystem, these are
/// caught by the LLM system and converted into error callbacks + cooldowns
/// rather than aborting the tick.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    /// The client call failed.
    #[error("llm client error: {0}")]
    Client(String),
    /// An in-flight query exceeded the configured timeout.
    #[error("llm query timed out after {0:.1}s")]
    Timeout(f64),
    /// The response could not be parsed.
    #[error("llm parse error: {0}")]
    Parse(String),
}

/// A blocking LLM client, invoked from the worker pool. Network clients
/// live with the embedder; the kernel ships only this trait and
/// [`MockClient`].
pub trait LlmClient: Send + Sync {
    /// Send a prompt, returning the raw response text.
    ///
    /// # Errors
    ///
    /// Any [`LlmError`]; the system routes it through error handling.
    fn query(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError>;
}

// ---------------------------------------------------------------------------
// MockClient
// ---------------------------------------------------------------------------

enum MockResponses {
    /// Exact `(system_prompt, user_message)` lookup; missing pairs answer
    /// `"{}"`.
    Map(HashMap<(String, String), String>),
    /// Dynamic responses.
    Func(Box<dyn Fn(&str, &str) -> String + Send + Sync>),
}

/// Deterministic client for tests and demos, with optional latency
/// simulation and error injection.
pub struct MockClient {
    responses: MockResponses,
    latency: Duration,
    error_rate: f64,
    rng: Mutex<Pcg64>,
}

impl MockClient {
    /// A client answering from a fixed `(system, user) -> response` map.
    pub fn from_map(responses: HashMap<(String, String), String>) -> Self {
        Self {
            responses: MockResponses::Map(responses),
            latency: Duration::ZERO,
            error_rate: 0.0,
            rng: Mutex::new(Pcg64::seed_from_u64(0)),
        }
    }

    /// A client computing responses from the prompt.
    pub fn from_fn(f: impl Fn(&str, &str) -> String + Send + Sync + 'static) -> Self {
        Self {
            responses: MockResponses::Func(Box::new(f)),
            latency: Duration::ZERO,
            error_rate: 0.0,
            rng: Mutex::new(Pcg64::seed_from_u64(0)),
        }
    }

    /// Sleep this long before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail with this probability, drawn from a private seeded RNG (the
    /// engine RNG is never touched from worker threads).
    pub fn with_error_rate(mut self, error_rate: f64) -> Self {
        self.error_rate = error_rate;
        self
    }
}

impl LlmClient for MockClient {
    fn query(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError> {
        if self.error_rate > 0.0 {
            let roll = match self.rng.lock() {
                Ok(mut rng) => rng.gen::<f64>(),
                Err(_) => 0.0,
            };
            if roll < self.error_rate {
                return Err(LlmError::Client("mock error".to_owned()));
            }
        }
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        match &self.responses {
            MockResponses::Map(map) => Ok(map
                .get(&(system_prompt.to_owned(), user_message.to_owned()))
                .cloned()
                .unwrap_or_else(|| "{}".to_owned())),
            MockResponses::Func(f) => Ok(f(system_prompt, user_message)),
        }
    }
}
