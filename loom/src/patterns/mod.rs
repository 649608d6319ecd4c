//! Pattern engines: the seven coordination shapes plus event-driven mode.
//!
//! All engines consume `{workflow, initial_prompt, variables}` through a
//! [`PatternContext`], produce a final aggregated [`PatternOutcome`], and
//! stream intermediate state through the fabric and the progress sink.

mod conditional;
mod debate;
mod event_driven;
mod fork_join;
mod iterative;
mod parallel;
mod pipeline;
mod swarm;

pub use conditional::run_conditional;
pub use debate::run_debate;
pub use event_driven::run_event_driven;
pub use fork_join::run_fork_join;
pub use iterative::run_iterative;
pub use parallel::run_parallel;
pub use pipeline::run_pipeline;
pub use swarm::run_swarm;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use progress_event::{EnvelopeState, ProgressEnvelope, ProgressEvent};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentDefinition, AgentRuntime, RuntimeOptions, TerminalKind, TurnOutcome};
use crate::error_store::ErrorStore;
use crate::fabric::Fabric;
use crate::limiter::RateLimiter;
use crate::llm::LlmClient;
use crate::session::SessionSaver;
use crate::tools::{ExecutorConfig, ToolExecutor, ToolRegistry};
use crate::workflow::{
    resolve_agent_ref, AgentRef, FailurePolicy, WorkflowConfig, WorkflowError,
};

/// Builds agent runtimes for the engines: resolves references against the
/// registry and base directory, then wires the shared collaborators in.
pub struct AgentFactory {
    llm: Arc<dyn LlmClient>,
    fabric: Arc<Fabric>,
    tool_registry: Arc<ToolRegistry>,
    error_store: Option<Arc<dyn ErrorStore>>,
    saver: Option<Arc<dyn SessionSaver>>,
    limiter: Option<Arc<RateLimiter>>,
    agent_registry: HashMap<String, AgentDefinition>,
    base_dir: PathBuf,
}

impl AgentFactory {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: Arc<dyn LlmClient>,
        fabric: Arc<Fabric>,
        tool_registry: Arc<ToolRegistry>,
        error_store: Option<Arc<dyn ErrorStore>>,
        saver: Option<Arc<dyn SessionSaver>>,
        limiter: Option<Arc<RateLimiter>>,
        agent_registry: HashMap<String, AgentDefinition>,
        base_dir: PathBuf,
    ) -> Self {
        Self {
            llm,
            fabric,
            tool_registry,
            error_store,
            saver,
            limiter,
            agent_registry,
            base_dir,
        }
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    pub fn fabric(&self) -> &Arc<Fabric> {
        &self.fabric
    }

    pub fn resolve(&self, agent_ref: &AgentRef) -> Result<AgentDefinition, WorkflowError> {
        resolve_agent_ref(agent_ref, &self.base_dir, &self.agent_registry)
    }

    /// Builds a runtime for a resolved definition, honoring its tool
    /// concurrency and wiring the workflow id through the tool context.
    pub fn build(&self, definition: AgentDefinition, workflow_id: &str) -> AgentRuntime {
        let executor = Arc::new(ToolExecutor::new(
            Arc::clone(&self.tool_registry),
            Arc::clone(&self.fabric),
            self.error_store.clone(),
            ExecutorConfig {
                concurrency: definition.config.tool_concurrency,
                ..ExecutorConfig::default()
            },
        ));
        AgentRuntime::new(
            definition,
            Arc::clone(&self.llm),
            executor,
            RuntimeOptions {
                saver: self.saver.clone(),
                limiter: self.limiter.clone(),
                workflow_id: Some(workflow_id.to_string()),
                session_id: None,
            },
        )
    }

    pub fn spawn(
        &self,
        agent_ref: &AgentRef,
        workflow_id: &str,
    ) -> Result<AgentRuntime, WorkflowError> {
        Ok(self.build(self.resolve(agent_ref)?, workflow_id))
    }
}

/// Fire-and-forget progress emission with envelope sequencing.
pub struct ProgressSink {
    inner: Option<Mutex<(mpsc::UnboundedSender<ProgressEnvelope>, EnvelopeState)>>,
}

impl ProgressSink {
    pub fn new(workflow_id: &str, tx: Option<mpsc::UnboundedSender<ProgressEnvelope>>) -> Self {
        Self {
            inner: tx.map(|tx| Mutex::new((tx, EnvelopeState::new(workflow_id.to_string())))),
        }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub async fn emit(&self, event: ProgressEvent) {
        if let Some(inner) = &self.inner {
            let mut guard = inner.lock().await;
            let timestamp = Utc::now().to_rfc3339();
            let enveloped = guard.1.wrap(event, timestamp);
            // A gone subscriber never fails the workflow.
            let _ = guard.0.send(enveloped);
        }
    }
}

/// Everything an engine needs for one run.
pub struct PatternContext {
    pub workflow_id: String,
    pub initial_prompt: String,
    pub variables: HashMap<String, String>,
    pub config: WorkflowConfig,
    pub cancel: CancellationToken,
    pub progress: ProgressSink,
    pub factory: AgentFactory,
}

impl PatternContext {
    /// The engine's failure policy, unless the workflow config overrides it.
    pub fn failure_policy(&self, engine_default: FailurePolicy) -> FailurePolicy {
        self.config.failure.unwrap_or(engine_default)
    }

    /// Base interpolation variables every engine provides.
    pub fn base_vars(&self) -> HashMap<String, String> {
        let mut vars = self.variables.clone();
        vars.insert("user_query".to_string(), self.initial_prompt.clone());
        vars
    }
}

/// Aggregated result status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutcomeStatus {
    Complete,
    /// Produced output, but without the requested guarantee (e.g. no swarm
    /// consensus, or skipped agents).
    Partial,
}

/// One agent's piece of the final result.
#[derive(Clone, Debug)]
pub struct AgentContribution {
    pub agent: String,
    pub output: String,
    pub kind: TerminalKind,
}

/// Final aggregated result of one engine run.
#[derive(Clone, Debug)]
pub struct PatternOutcome {
    pub status: OutcomeStatus,
    pub output: String,
    pub contributions: Vec<AgentContribution>,
}

impl PatternOutcome {
    pub fn complete(output: impl Into<String>, contributions: Vec<AgentContribution>) -> Self {
        Self {
            status: OutcomeStatus::Complete,
            output: output.into(),
            contributions,
        }
    }

    pub fn partial(output: impl Into<String>, contributions: Vec<AgentContribution>) -> Self {
        Self {
            status: OutcomeStatus::Partial,
            output: output.into(),
            contributions,
        }
    }
}

/// Runs one agent turn, re-invoking once under the retry policy.
pub(crate) async fn invoke_agent(
    runtime: &AgentRuntime,
    prompt: &str,
    cancel: &CancellationToken,
    policy: FailurePolicy,
) -> TurnOutcome {
    let outcome = runtime.handle_message(prompt, cancel).await;
    if outcome.succeeded() || policy != FailurePolicy::Retry || cancel.is_cancelled() {
        return outcome;
    }
    tracing::debug!(agent = runtime.agent_id(), "retrying failed agent once");
    runtime.handle_message(prompt, cancel).await
}

pub(crate) fn contribution(agent: &str, outcome: &TurnOutcome) -> AgentContribution {
    AgentContribution {
        agent: agent.to_string(),
        output: outcome.text.clone(),
        kind: outcome.kind,
    }
}

/// Normalization used by consensus comparisons and branch matching.
pub(crate) fn normalize(text: &str) -> String {
    text.trim().trim_end_matches(['.', '!']).to_lowercase()
}
