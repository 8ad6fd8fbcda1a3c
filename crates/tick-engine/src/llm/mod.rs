//! Strategic LLM layer: async queries with rate limits and cooldowns.
//!
//! Blocking client calls run on a bounded worker pool; completions become
//! visible to the [`llm_system`](system::llm_system) at the top of its next
//! run. All client failures are caught and converted into error callbacks
//! plus cooldowns -- the only subsystem that does not abort the tick on
//! error.

pub mod client;
pub mod components;
pub mod config;
pub mod manager;
pub mod parsers;
pub mod pressure;
pub mod system;

pub use client::{LlmClient, LlmError, MockClient};
pub use components::LlmAgent;
pub use config::LlmConfig;
pub use manager::LlmManager;
pub use parsers::{default_json_parser, strip_code_fences};
pub use pressure::{pressure_system, PressureThresholds};
pub use system::{llm_system, LlmHooks};
