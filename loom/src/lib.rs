//! # Loom
//!
//! A multi-agent LLM orchestration runtime. Declarative workflows drive a set
//! of LLM-backed agents over a **tri-modal communication fabric**: broadcast
//! pub/sub, a durable point-to-point queue, and tiered shared memory, with
//! payloads routed between inline *values* and content-addressed *references*
//! by size and policy.
//!
//! ## Design principles
//!
//! - **Fabric owns shared state**: agents reference each other only by id;
//!   hub-and-spoke and peer-to-peer shapes emerge from topic subscriptions
//!   and addressing, never from back-pointers.
//! - **Structured terminals**: every failure mode (validation, budget,
//!   transient, backend, fatal) ends in a machine-readable [`Terminal`];
//!   no error type leaks past the workflow boundary.
//! - **Value/reference routing**: a [`PolicyManager`] decides per message
//!   type whether bytes travel inline or through the [`ReferenceStore`].
//! - **Progressive error disclosure**: verbose tool errors land in the
//!   [`ErrorStore`]; the LLM sees a 100-char summary plus an id it can
//!   expand with `get_error_detail`.
//!
//! ## Main modules
//!
//! - [`fabric`]: [`Fabric`] — the bundle of [`BroadcastBus`], [`MessageQueue`],
//!   [`SharedMemory`], [`ReferenceStore`], and [`PolicyManager`].
//! - [`orchestrator`]: [`Orchestrator`] — parse, validate, dispatch to the
//!   pattern engines, aggregate.
//! - [`patterns`]: the seven pattern engines (pipeline, fork-join, parallel,
//!   debate, swarm, conditional, iterative) plus event-driven execution.
//! - [`agent`]: [`AgentRuntime`] — the conversation loop with budgets and
//!   self-correction.
//! - [`segmented`]: [`SegmentedMemory`] — ROM / Kernel / L1 / L2 context.
//! - [`tools`]: [`ToolRegistry`], [`ToolExecutor`], builtin tools.
//! - [`llm`]: [`LlmClient`] trait, [`MockLlm`], [`ScriptedLlm`].
//! - [`session`]: [`Session`], [`MemorySaver`], [`SqliteSaver`].
//! - [`workflow`]: document parsing, validation, interpolation.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use loom::{
//!     BroadcastBus, ExecuteOptions, Fabric, InMemoryReferenceStore, MessageQueue, MockLlm,
//!     Orchestrator, PolicyManager, SharedMemory,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let fabric = Arc::new(Fabric::new(
//!     Arc::new(BroadcastBus::new()),
//!     Arc::new(MessageQueue::new("loom.db")?),
//!     Arc::new(SharedMemory::with_spill_dir("/tmp/loom-spill")),
//!     Arc::new(InMemoryReferenceStore::new()),
//!     Arc::new(PolicyManager::new()),
//! ));
//! let orchestrator = Orchestrator::new(fabric, Arc::new(MockLlm::with_no_tool_calls("ok")));
//!
//! let yaml = std::fs::read_to_string("workflow.yaml")?;
//! let result = orchestrator
//!     .execute_document(&yaml, "hello", ExecuteOptions::default())
//!     .await;
//! println!("{}", result.output);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod bus;
pub mod codec;
pub mod error;
pub mod error_store;
pub mod fabric;
pub mod limiter;
pub mod llm;
pub mod message;
pub mod orchestrator;
pub mod patterns;
pub mod payload;
pub mod policy;
pub mod queue;
pub mod reference;
pub mod segmented;
pub mod session;
pub mod shared_memory;
pub mod tools;
pub mod workflow;

pub use progress_event::{ProgressEnvelope, ProgressEvent};

pub use agent::{
    AgentConfig, AgentDefinition, AgentRuntime, RunPhase, RuntimeOptions, TerminalKind,
    TurnOutcome,
};
pub use bus::{
    BroadcastBus, BusError, BusMessage, BusMetrics, MetadataFilter, Subscription, TopicPattern,
};
pub use error::{FailureKind, Terminal, TerminalStatus};
pub use error_store::{
    ErrorFilter, ErrorStore, ErrorStoreError, InMemoryErrorStore, SqliteErrorStore, StoredError,
};
pub use fabric::{Fabric, FabricError};
pub use limiter::RateLimiter;
pub use llm::{LlmClient, LlmError, LlmResponse, LlmUsage, MockLlm, ScriptedLlm};
pub use message::{Message, ToolCall};
pub use orchestrator::{ExecuteOptions, Orchestrator, WorkflowResult};
pub use patterns::{AgentContribution, OutcomeStatus, PatternOutcome};
pub use payload::MessagePayload;
pub use policy::{PolicyManager, PolicyRule, RoutingDecision, RoutingMode};
pub use queue::{
    BackoffPolicy, MessageQueue, OutgoingMessage, Priority, QueueError, QueueMessage, QueueStatus,
    ReceiveFilter,
};
pub use reference::{
    InMemoryReferenceStore, RefLocation, RefStats, Reference, ReferenceError, ReferenceStore,
    SqliteReferenceStore, StoreOpts,
};
pub use segmented::{SegmentBudgets, SegmentedMemory, Summarizer};
pub use session::{MemorySaver, Session, SessionError, SessionSaver, SqliteSaver};
pub use shared_memory::{
    NamespaceStats, PutOpts, SharedMemory, SharedMemoryConfig, SharedMemoryError, SharedNamespace,
};
pub use tools::{
    ExecutorConfig, Tool, ToolContext, ToolError, ToolExecutor, ToolRegistry, ToolSpec,
    TOOL_GET_ERROR_DETAIL, TOOL_GET_TOOL_RESULT, TOOL_PUBLISH_MESSAGE, TOOL_SEND_MESSAGE,
};
pub use workflow::{
    parse_agent_str, parse_workflow_str, AgentRef, EventDrivenSpec, FailurePolicy, MergeStrategy,
    PatternSpec, Stage, SwarmStrategy, TaskSpec, ValidationReport, Workflow, WorkflowConfig,
    WorkflowError, WorkflowSpec,
};

/// When running `cargo test -p loom`, initializes tracing from `RUST_LOG` so
/// that unit tests in `src/**` can print logs with `--nocapture`.
#[cfg(test)]
mod test_logging {
    use ctor::ctor;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::Layer;

    #[ctor]
    fn init() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_filter(filter),
            )
            .try_init();
    }
}
