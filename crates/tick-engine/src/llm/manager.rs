//! LLM manager: prompt-component registries, client handle, and the worker
//! pool that services blocking client calls.
//!
//! The pool is the one place the kernel touches threads: blocking client
//! queries run on plain worker threads and their results flow back over an
//! mpsc channel drained at the top of the LLM system each tick. Nothing
//! else in the kernel can observe the pool.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tick_ecs::prelude::*;

use crate::ai::components::Blackboard;
use crate::llm::client::{LlmClient, LlmError};
use crate::llm::config::LlmConfig;
use crate::EngineError;

/// Context template: reads the world into a user-message string.
pub type ContextFn = Box<dyn Fn(&World, EntityId) -> String>;

/// Response parser: `(response_text, blackboard)`.
pub type ParserFn = Rc<dyn Fn(&str, &mut Blackboard) -> Result<(), LlmError>>;

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

struct Job {
    entity: EntityId,
    client: Arc<dyn LlmClient>,
    system_prompt: String,
    user_message: String,
}

/// A completed query, drained by the LLM system.
pub(crate) struct QueryOutcome {
    pub entity: EntityId,
    pub outcome: Result<String, LlmError>,
    pub latency: f64,
}

struct WorkerPool {
    jobs: mpsc::Sender<Job>,
    results: mpsc::Receiver<QueryOutcome>,
}

impl WorkerPool {
    fn spawn(threads: usize) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (result_tx, result_rx) = mpsc::channel::<QueryOutcome>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        for _ in 0..threads.max(1) {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            std::thread::spawn(move || loop {
                let job = {
                    let Ok(receiver) = job_rx.lock() else {
                        break;
                    };
                    receiver.recv()
                };
                let Ok(job) = job else {
                    break;
                };
                let started = Instant::now();
                let outcome = job.client.query(&job.system_prompt, &job.user_message);
                let sent = result_tx.send(QueryOutcome {
                    entity: job.entity,
                    outcome,
                    latency: started.elapsed().as_secs_f64(),
                });
                if sent.is_err() {
                    break;
                }
            });
        }

        Self {
            jobs: job_tx,
            results: result_rx,
        }
    }
}

// ---------------------------------------------------------------------------
// LlmManager
// ---------------------------------------------------------------------------

/// Central registry for roles, personalities, context templates, parsers,
/// and the client. Follows the same define-by-name / look-up-by-name shape
/// as the AI manager.
pub struct LlmManager {
    pub(crate) config: LlmConfig,
    roles: RefCell<HashMap<String, String>>,
    personalities: RefCell<HashMap<String, String>>,
    contexts: RefCell<HashMap<String, ContextFn>>,
    parsers: RefCell<HashMap<String, ParserFn>>,
    client: RefCell<Option<Arc<dyn LlmClient>>>,
    pool: RefCell<Option<WorkerPool>>,
    /// Dispatch instants of in-flight queries, for timeout detection.
    in_flight: RefCell<HashMap<EntityId, Instant>>,
    /// Ticks of recent dispatches, for the sliding-window rate limit.
    pub(crate) dispatch_ticks: RefCell<std::collections::VecDeque<u64>>,
}

impl LlmManager {
    pub fn new(config: LlmConfig) -> Rc<Self> {
        Rc::new(Self {
            config,
            roles: RefCell::new(HashMap::new()),
            personalities: RefCell::new(HashMap::new()),
            contexts: RefCell::new(HashMap::new()),
            parsers: RefCell::new(HashMap::new()),
            client: RefCell::new(None),
            pool: RefCell::new(None),
            in_flight: RefCell::new(HashMap::new()),
            dispatch_ticks: RefCell::new(std::collections::VecDeque::new()),
        })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    // -- definitions --------------------------------------------------------

    /// Register a static role prompt fragment.
    pub fn define_role(&self, name: &str, text: &str) {
        self.roles
            .borrow_mut()
            .insert(name.to_owned(), text.to_owned());
    }

    /// Register a static personality prompt fragment.
    pub fn define_personality(&self, name: &str, text: &str) {
        self.personalities
            .borrow_mut()
            .insert(name.to_owned(), text.to_owned());
    }

    /// Register a context template reading the world into a user message.
    pub fn define_context(&self, name: &str, f: impl Fn(&World, EntityId) -> String + 'static) {
        self.contexts
            .borrow_mut()
            .insert(name.to_owned(), Box::new(f));
    }

    /// Register a named response parser.
    pub fn define_parser(
        &self,
        name: &str,
        f: impl Fn(&str, &mut Blackboard) -> Result<(), LlmError> + 'static,
    ) {
        self.parsers.borrow_mut().insert(name.to_owned(), Rc::new(f));
    }

    /// Set the client implementation.
    pub fn register_client(&self, client: Arc<dyn LlmClient>) {
        *self.client.borrow_mut() = Some(client);
    }

    pub fn has_client(&self) -> bool {
        self.client.borrow().is_some()
    }

    /// Look up a named parser.
    pub fn parser(&self, name: &str) -> Option<ParserFn> {
        self.parsers.borrow().get(name).cloned()
    }

    // -- prompt assembly ----------------------------------------------------

    /// Assemble `(system_prompt, user_message)` from the agent's named role,
    /// personality, and context. `None` if any piece is missing.
    pub fn assemble_prompt(
        &self,
        world: &World,
        entity: EntityId,
        role: &str,
        personality: &str,
        context: &str,
    ) -> Option<(String, String)> {
        let role_text = self.roles.borrow().get(role).cloned()?;
        let personality_text = self.personalities.borrow().get(personality).cloned()?;
        let contexts = self.contexts.borrow();
        let context_fn = contexts.get(context)?;
        let user_message = context_fn(world, entity);
        Some((format!("{role_text}\n\n{personality_text}"), user_message))
    }

    // -- dispatch and completion --------------------------------------------

    /// Submit a prompt to the worker pool, marking the entity in flight.
    ///
    /// # Errors
    ///
    /// [`EngineError::Llm`] when no client is registered or the pool is
    /// shut down.
    pub(crate) fn submit(
        &self,
        entity: EntityId,
        system_prompt: String,
        user_message: String,
    ) -> Result<(), EngineError> {
        let client = self
            .client
            .borrow()
            .clone()
            .ok_or_else(|| EngineError::Llm("no llm client registered".to_owned()))?;

        let mut pool = self.pool.borrow_mut();
        let pool = pool.get_or_insert_with(|| WorkerPool::spawn(self.config.worker_threads));
        pool.jobs
            .send(Job {
                entity,
                client,
                system_prompt,
                user_message,
            })
            .map_err(|_| EngineError::Llm("worker pool shut down".to_owned()))?;
        self.in_flight.borrow_mut().insert(entity, Instant::now());
        Ok(())
    }

    /// Drain all completed queries without blocking.
    pub(crate) fn poll(&self) -> Vec<QueryOutcome> {
        let pool = self.pool.borrow();
        let Some(pool) = pool.as_ref() else {
            return Vec::new();
        };
        let mut outcomes = Vec::new();
        while let Ok(outcome) = pool.results.try_recv() {
            self.in_flight.borrow_mut().remove(&outcome.entity);
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Entities whose in-flight query exceeded the configured timeout; each
    /// is removed from the in-flight set (a late result is dropped by the
    /// system because the agent is no longer pending).
    pub(crate) fn take_timed_out(&self) -> Vec<EntityId> {
        let timeout = self.config.query_timeout;
        let mut in_flight = self.in_flight.borrow_mut();
        let expired: Vec<EntityId> = in_flight
            .iter()
            .filter(|(_, started)| started.elapsed().as_secs_f64() > timeout)
            .map(|(&entity, _)| entity)
            .collect();
        for entity in &expired {
            in_flight.remove(entity);
        }
        expired
    }
}
