//! Workflow model: the entities a workflow document parses into.
//!
//! A workflow is either pattern-orchestrated (one of seven coordination
//! shapes) or event-driven (an entrypoint plus agents coordinating through
//! the fabric). Agent references resolve inline, by registry id, or by path.

mod document;
mod interpolate;
mod validate;

pub use document::{
    parse_agent_str, parse_workflow_str, resolve_agent_ref, AgentOverrides, ParsedWorkflow,
};
pub use interpolate::{find_placeholders, interpolate};
pub use validate::{validate, ValidationReport};

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::agent::AgentDefinition;
use crate::error::{FailureKind, Terminal};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("agent not found: {0}")]
    AgentNotFound(String),
    #[error("document error: {0}")]
    Document(String),
    #[error("unresolved placeholder '{{{{{0}}}}}'")]
    UnresolvedPlaceholder(String),
    #[error("workflow timed out after {0:?}")]
    Timeout(Duration),
    #[error("workflow cancelled")]
    Cancelled,
    #[error("stage '{stage}' failed: {message}")]
    StageFailed { stage: String, message: String },
}

impl WorkflowError {
    /// Machine-readable terminal for the workflow boundary.
    pub fn to_terminal(&self) -> Terminal {
        let kind = match self {
            WorkflowError::Validation(_)
            | WorkflowError::Document(_)
            | WorkflowError::UnresolvedPlaceholder(_) => FailureKind::Validation,
            WorkflowError::AgentNotFound(_) => FailureKind::NotFound,
            WorkflowError::Timeout(_) => FailureKind::BudgetExceeded,
            WorkflowError::Cancelled => FailureKind::Cancelled,
            WorkflowError::StageFailed { .. } => FailureKind::Fatal,
        };
        let mut terminal = Terminal::failed(kind, self.to_string());
        if let WorkflowError::StageFailed { stage, .. } = self {
            terminal = terminal.with_span(format!("stage:{}", stage));
        }
        terminal
    }
}

/// Reference to an agent: inline body, registry id, or a path to another
/// agent document. Fields explicitly present alongside a `path` override the
/// fields of the loaded file.
#[derive(Clone, Debug)]
pub enum AgentRef {
    Inline(Box<AgentDefinition>),
    Registry(String),
    Path {
        path: PathBuf,
        overrides: Box<AgentOverrides>,
    },
}

impl AgentRef {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        AgentRef::Path {
            path: path.into(),
            overrides: Box::default(),
        }
    }

    /// Best-effort display name (used in validation messages and progress).
    pub fn display_name(&self) -> String {
        match self {
            AgentRef::Inline(def) => def.name.clone(),
            AgentRef::Registry(id) => id.clone(),
            AgentRef::Path { path, overrides } => overrides.name.clone().unwrap_or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string())
            }),
        }
    }
}

/// One pipeline stage.
#[derive(Clone, Debug)]
pub struct Stage {
    pub name: String,
    pub agent: AgentRef,
    /// Prompt template; `{{previous}}` and `{{user_query}}` are available.
    pub prompt: Option<String>,
    /// A non-fatal stage failure is recorded and skipped instead of aborting.
    pub non_fatal: bool,
}

/// One parallel task: an agent with its own prompt template.
#[derive(Clone, Debug)]
pub struct TaskSpec {
    pub name: String,
    pub agent: AgentRef,
    pub prompt: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeStrategy {
    Concatenate,
    Summary,
    Consensus,
    First,
    Best,
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "concatenate" => Ok(Self::Concatenate),
            "summary" => Ok(Self::Summary),
            "consensus" => Ok(Self::Consensus),
            "first" => Ok(Self::First),
            "best" => Ok(Self::Best),
            other => Err(format!(
                "unknown merge_strategy '{}' (use concatenate, summary, consensus, first, best)",
                other
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwarmStrategy {
    Majority,
    Supermajority,
    Unanimous,
}

impl SwarmStrategy {
    /// Fraction of (confidence-filtered) votes the winner must reach.
    pub fn threshold(self) -> f64 {
        match self {
            SwarmStrategy::Majority => 0.5,
            SwarmStrategy::Supermajority => 2.0 / 3.0,
            SwarmStrategy::Unanimous => 1.0,
        }
    }

    /// Whether `share` of the votes meets this strategy.
    pub fn met(self, share: f64) -> bool {
        match self {
            // Majority is strict (> 50%); the others are inclusive.
            SwarmStrategy::Majority => share > self.threshold(),
            _ => share >= self.threshold(),
        }
    }
}

impl FromStr for SwarmStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "majority" => Ok(Self::Majority),
            "supermajority" => Ok(Self::Supermajority),
            "unanimous" => Ok(Self::Unanimous),
            other => Err(format!(
                "unknown swarm strategy '{}' (use majority, supermajority, unanimous)",
                other
            )),
        }
    }
}

/// The seven pattern shapes.
#[derive(Clone, Debug)]
pub enum PatternSpec {
    Pipeline {
        stages: Vec<Stage>,
    },
    ForkJoin {
        agents: Vec<AgentRef>,
        merge: MergeStrategy,
    },
    Parallel {
        tasks: Vec<TaskSpec>,
        merge: MergeStrategy,
    },
    Debate {
        debaters: Vec<AgentRef>,
        moderator: AgentRef,
        rounds: u32,
    },
    Swarm {
        voters: Vec<AgentRef>,
        judge: Option<AgentRef>,
        strategy: SwarmStrategy,
        confidence_threshold: f64,
        share_votes: bool,
    },
    Conditional {
        classifier: AgentRef,
        /// Branch label → single-agent branch. Nested sub-workflow branches
        /// are rejected at validation.
        branches: BTreeMap<String, AgentRef>,
    },
    Iterative {
        body: AgentRef,
        max_iterations: u32,
        /// Restart while the body's output contains this needle.
        restart_if_contains: Option<String>,
    },
}

impl PatternSpec {
    pub fn type_name(&self) -> &'static str {
        match self {
            PatternSpec::Pipeline { .. } => "pipeline",
            PatternSpec::ForkJoin { .. } => "fork-join",
            PatternSpec::Parallel { .. } => "parallel",
            PatternSpec::Debate { .. } => "debate",
            PatternSpec::Swarm { .. } => "swarm",
            PatternSpec::Conditional { .. } => "conditional",
            PatternSpec::Iterative { .. } => "iterative",
        }
    }
}

/// Event-driven workflow: no pattern; the entrypoint starts and the rest
/// auto-spawn on fabric traffic. `communication` is documentation only.
#[derive(Clone, Debug)]
pub struct EventDrivenSpec {
    pub entrypoint: String,
    pub agents: Vec<AgentRef>,
    pub communication: Option<String>,
}

#[derive(Clone, Debug)]
pub enum WorkflowSpec {
    Pattern(PatternSpec),
    EventDriven(EventDrivenSpec),
}

/// How a pattern engine treats a per-agent failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the workflow and surface the error.
    Fatal,
    /// Record the failure and continue with the remaining agents.
    Skip,
    /// Re-invoke the agent once with the same input, then skip.
    Retry,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fatal" => Ok(Self::Fatal),
            "skip" => Ok(Self::Skip),
            "retry" => Ok(Self::Retry),
            other => Err(format!(
                "unknown failure policy '{}' (use fatal, skip, retry)",
                other
            )),
        }
    }
}

/// Workflow-level knobs.
#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    /// Wall-clock limit for the whole run.
    pub timeout: Option<Duration>,
    /// Total agent turns across all agents in an event-driven workflow.
    pub max_workflow_turns: u32,
    /// Pipeline stages see the full stage history instead of only `previous`.
    pub pass_full_history: bool,
    /// Overrides the engine's default per-agent failure handling.
    pub failure: Option<FailurePolicy>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(600)),
            max_workflow_turns: 50,
            pass_full_history: false,
            failure: None,
        }
    }
}

/// A parsed workflow.
#[derive(Clone, Debug)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub labels: HashMap<String, String>,
    pub spec: WorkflowSpec,
    pub config: WorkflowConfig,
}

impl Workflow {
    pub fn pattern(name: impl Into<String>, spec: PatternSpec) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            labels: HashMap::new(),
            spec: WorkflowSpec::Pattern(spec),
            config: WorkflowConfig::default(),
        }
    }

    pub fn event_driven(name: impl Into<String>, spec: EventDrivenSpec) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            labels: HashMap::new(),
            spec: WorkflowSpec::EventDriven(spec),
            config: WorkflowConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }
}
