//! Agent definitions and the per-session conversation runtime.

mod config;
mod runtime;

pub use config::{AgentConfig, AgentDefinition};
pub use runtime::{AgentRuntime, RunPhase, RuntimeOptions, TerminalKind, TurnOutcome};
