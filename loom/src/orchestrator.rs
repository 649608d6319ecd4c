//! Workflow orchestrator: validates a workflow, builds per-stage agent
//! runtimes, dispatches to the pattern engines, and aggregates the result.
//!
//! Every failure mode surfaces as a machine-readable [`Terminal`]; nothing
//! leaks past the workflow boundary. Cancellation from the caller's token
//! propagates to every child task, and the workflow-level timeout produces a
//! structured budget terminal.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use progress_event::{ProgressEnvelope, ProgressEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::agent::AgentDefinition;
use crate::error::{FailureKind, Terminal, TerminalStatus};
use crate::error_store::ErrorStore;
use crate::fabric::Fabric;
use crate::limiter::RateLimiter;
use crate::llm::LlmClient;
use crate::patterns::{
    run_conditional, run_debate, run_event_driven, run_fork_join, run_iterative, run_parallel,
    run_pipeline, run_swarm, AgentContribution, AgentFactory, OutcomeStatus, PatternContext,
    PatternOutcome, ProgressSink,
};
use crate::session::SessionSaver;
use crate::tools::{
    GetErrorDetailTool, GetToolResultTool, PublishMessageTool, SendMessageTool, ToolRegistry,
};
use crate::workflow::{
    parse_workflow_str, validate, PatternSpec, Workflow, WorkflowError, WorkflowSpec,
};

/// Per-execution options.
#[derive(Default)]
pub struct ExecuteOptions {
    /// Caller-supplied template variables.
    pub variables: HashMap<String, String>,
    /// Progress event stream; events are fire-and-forget.
    pub progress: Option<mpsc::UnboundedSender<ProgressEnvelope>>,
    /// External cancellation; a child of this token reaches every agent.
    pub cancel: Option<CancellationToken>,
}

/// Final result of `execute`.
#[derive(Clone, Debug)]
pub struct WorkflowResult {
    pub workflow_id: String,
    pub status: TerminalStatus,
    pub output: String,
    pub contributions: Vec<AgentContribution>,
    pub warnings: Vec<String>,
    /// Present when the workflow failed.
    pub terminal: Option<Terminal>,
}

impl WorkflowResult {
    pub fn succeeded(&self) -> bool {
        self.status != TerminalStatus::Failed
    }
}

/// Process-level orchestrator. Fabric and stores are shared singletons; the
/// orchestrator itself is cheap to clone per call site via `Arc`.
pub struct Orchestrator {
    fabric: Arc<Fabric>,
    llm: Arc<dyn LlmClient>,
    tool_registry: Arc<ToolRegistry>,
    error_store: Option<Arc<dyn ErrorStore>>,
    saver: Option<Arc<dyn SessionSaver>>,
    limiter: Option<Arc<RateLimiter>>,
    agent_registry: HashMap<String, AgentDefinition>,
    base_dir: PathBuf,
}

impl Orchestrator {
    /// Wires the orchestrator and registers the always-on builtin tools
    /// (fabric messaging and large-result retrieval).
    pub fn new(fabric: Arc<Fabric>, llm: Arc<dyn LlmClient>) -> Self {
        let tool_registry = Arc::new(ToolRegistry::new());
        tool_registry.register(Arc::new(PublishMessageTool::new(Arc::clone(&fabric))));
        tool_registry.register(Arc::new(SendMessageTool::new(Arc::clone(&fabric))));
        tool_registry.register(Arc::new(GetToolResultTool::new(Arc::clone(
            fabric.shared_memory(),
        ))));
        Self {
            fabric,
            llm,
            tool_registry,
            error_store: None,
            saver: None,
            limiter: None,
            agent_registry: HashMap::new(),
            base_dir: PathBuf::from("."),
        }
    }

    /// Configures the error submission channel; `get_error_detail` becomes
    /// available to agents iff a store is configured.
    pub fn with_error_store(mut self, store: Arc<dyn ErrorStore>) -> Self {
        self.tool_registry
            .register(Arc::new(GetErrorDetailTool::new(Arc::clone(&store))));
        self.error_store = Some(store);
        self
    }

    pub fn with_session_saver(mut self, saver: Arc<dyn SessionSaver>) -> Self {
        self.saver = Some(saver);
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Base directory against which relative agent paths resolve.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Registers an agent definition under its name for registry references.
    pub fn register_agent(&mut self, definition: AgentDefinition) {
        self.agent_registry
            .insert(definition.name.clone(), definition);
    }

    pub fn tool_registry(&self) -> &Arc<ToolRegistry> {
        &self.tool_registry
    }

    pub fn fabric(&self) -> &Arc<Fabric> {
        &self.fabric
    }

    /// Parses a workflow document and executes it; document warnings join
    /// the validation warnings in the result.
    pub async fn execute_document(
        &self,
        text: &str,
        initial_prompt: &str,
        options: ExecuteOptions,
    ) -> WorkflowResult {
        match parse_workflow_str(text) {
            Ok(parsed) => {
                let mut result = self
                    .execute(&parsed.workflow, initial_prompt, options)
                    .await;
                let mut warnings = parsed.warnings;
                warnings.append(&mut result.warnings);
                result.warnings = warnings;
                result
            }
            Err(e) => failed_result("unparsed", e.to_terminal(), Vec::new()),
        }
    }

    /// Executes one workflow to a structured result.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        initial_prompt: &str,
        options: ExecuteOptions,
    ) -> WorkflowResult {
        let progress = ProgressSink::new(&workflow.id, options.progress.clone());

        let report = match validate(workflow, &options.variables) {
            Ok(report) => report,
            Err(e) => {
                let terminal = e.to_terminal();
                progress
                    .emit(ProgressEvent::WorkflowFailed {
                        kind: terminal.kind.as_str().to_string(),
                        message: terminal.message.clone(),
                    })
                    .await;
                return failed_result(&workflow.id, terminal, Vec::new());
            }
        };

        let cancel = options
            .cancel
            .map(|token| token.child_token())
            .unwrap_or_default();

        let ctx = PatternContext {
            workflow_id: workflow.id.clone(),
            initial_prompt: initial_prompt.to_string(),
            variables: options.variables,
            config: workflow.config.clone(),
            cancel: cancel.clone(),
            progress,
            factory: AgentFactory::new(
                Arc::clone(&self.llm),
                Arc::clone(&self.fabric),
                Arc::clone(&self.tool_registry),
                self.error_store.clone(),
                self.saver.clone(),
                self.limiter.clone(),
                self.agent_registry.clone(),
                self.base_dir.clone(),
            ),
        };

        let engine = self.dispatch(workflow, &ctx);
        let outcome = match workflow.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, engine).await {
                Ok(inner) => inner,
                Err(_) => {
                    // The supervisor's cancellation reaches all child tasks.
                    cancel.cancel();
                    Err(WorkflowError::Timeout(limit))
                }
            },
            None => engine.await,
        };

        match outcome {
            Ok(outcome) => {
                ctx.progress
                    .emit(ProgressEvent::WorkflowCompleted {
                        output: outcome.output.clone(),
                    })
                    .await;
                success_result(&workflow.id, outcome, report.warnings)
            }
            Err(e) => {
                let terminal = e.to_terminal();
                ctx.progress
                    .emit(ProgressEvent::WorkflowFailed {
                        kind: terminal.kind.as_str().to_string(),
                        message: terminal.message.clone(),
                    })
                    .await;
                failed_result(&workflow.id, terminal, report.warnings)
            }
        }
    }

    async fn dispatch(
        &self,
        workflow: &Workflow,
        ctx: &PatternContext,
    ) -> Result<PatternOutcome, WorkflowError> {
        match &workflow.spec {
            WorkflowSpec::Pattern(pattern) => match pattern {
                PatternSpec::Pipeline { stages } => run_pipeline(ctx, stages).await,
                PatternSpec::ForkJoin { agents, merge } => {
                    run_fork_join(ctx, agents, *merge).await
                }
                PatternSpec::Parallel { tasks, merge } => run_parallel(ctx, tasks, *merge).await,
                PatternSpec::Debate {
                    debaters,
                    moderator,
                    rounds,
                } => run_debate(ctx, debaters, moderator, *rounds).await,
                PatternSpec::Swarm {
                    voters,
                    judge,
                    strategy,
                    confidence_threshold,
                    share_votes,
                } => {
                    run_swarm(
                        ctx,
                        voters,
                        judge.as_ref(),
                        *strategy,
                        *confidence_threshold,
                        *share_votes,
                    )
                    .await
                }
                PatternSpec::Conditional {
                    classifier,
                    branches,
                } => run_conditional(ctx, classifier, branches).await,
                PatternSpec::Iterative {
                    body,
                    max_iterations,
                    restart_if_contains,
                } => {
                    run_iterative(ctx, body, *max_iterations, restart_if_contains.as_deref()).await
                }
            },
            WorkflowSpec::EventDriven(spec) => run_event_driven(ctx, spec).await,
        }
    }
}

fn success_result(
    workflow_id: &str,
    outcome: PatternOutcome,
    warnings: Vec<String>,
) -> WorkflowResult {
    WorkflowResult {
        workflow_id: workflow_id.to_string(),
        status: match outcome.status {
            OutcomeStatus::Complete => TerminalStatus::Completed,
            OutcomeStatus::Partial => TerminalStatus::Partial,
        },
        output: outcome.output,
        contributions: outcome.contributions,
        warnings,
        terminal: None,
    }
}

fn failed_result(workflow_id: &str, terminal: Terminal, warnings: Vec<String>) -> WorkflowResult {
    tracing::warn!(workflow = workflow_id, kind = terminal.kind.as_str(),
        message = %terminal.message, "workflow failed");
    WorkflowResult {
        workflow_id: workflow_id.to_string(),
        status: TerminalStatus::Failed,
        output: String::new(),
        contributions: Vec::new(),
        warnings,
        terminal: Some(terminal),
    }
}

/// Convenience for embedders that only need the failure kind.
pub fn failure_kind(result: &WorkflowResult) -> Option<FailureKind> {
    result.terminal.as_ref().map(|t| t.kind)
}
