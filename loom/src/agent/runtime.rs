//! The conversation loop: render memory → LLM → tool calls → loop.
//!
//! Budgets (`max_turns`, `max_tool_executions`, wall clock) terminate the
//! loop with a structured outcome, never a crash. One loop runs per session
//! at a time; sessions are independent and may run concurrently.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::limiter::RateLimiter;
use crate::llm::{LlmClient, LlmError, LlmResponse};
use crate::message::Message;
use crate::segmented::{SegmentedMemory, Summarizer};
use crate::session::{Session, SessionSaver};
use crate::tools::{ToolContext, ToolExecutor, TOOL_GET_ERROR_DETAIL, TOOL_GET_TOOL_RESULT};

use super::{AgentConfig, AgentDefinition};

/// Why the loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminalKind {
    Completed,
    BudgetExhausted,
    Cancelled,
    Fatal,
}

/// Loop lifecycle. `idle ⇄ in_turn` transitions are driven by incoming
/// messages; only `terminal` releases the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    InTurn,
    AwaitingTools,
    Terminal(TerminalKind),
}

/// Structured result of processing one incoming message.
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    pub kind: TerminalKind,
    pub text: String,
    pub turns: u32,
    pub tool_executions: u32,
}

impl TurnOutcome {
    pub fn succeeded(&self) -> bool {
        self.kind == TerminalKind::Completed
    }
}

/// Optional collaborators for a runtime.
#[derive(Default)]
pub struct RuntimeOptions {
    pub saver: Option<Arc<dyn SessionSaver>>,
    pub limiter: Option<Arc<RateLimiter>>,
    pub workflow_id: Option<String>,
    /// Reuse an existing session id instead of minting one.
    pub session_id: Option<String>,
}

struct RuntimeState {
    memory: SegmentedMemory,
    session: Session,
    phase: RunPhase,
}

/// Per-agent conversation runtime.
///
/// **Interaction**: Built by the orchestrator per workflow stage (or per
/// event-driven agent); owns its segmented memory and session exclusively.
pub struct AgentRuntime {
    definition: AgentDefinition,
    llm: Arc<dyn LlmClient>,
    executor: Arc<ToolExecutor>,
    summarizer: Summarizer,
    options: RuntimeOptions,
    state: Mutex<RuntimeState>,
}

impl AgentRuntime {
    pub fn new(
        definition: AgentDefinition,
        llm: Arc<dyn LlmClient>,
        executor: Arc<ToolExecutor>,
        options: RuntimeOptions,
    ) -> Self {
        let rom = vec![Message::system(definition.system_prompt.clone())];
        let memory = SegmentedMemory::new(rom, definition.memory.clone());
        let mut session = Session::new(definition.name.clone());
        if let Some(id) = &options.session_id {
            session = session.with_id(id.clone());
        }
        let summarizer = Summarizer::new(Arc::clone(&llm));
        Self {
            definition,
            llm,
            executor,
            summarizer,
            options,
            state: Mutex::new(RuntimeState {
                memory,
                session,
                phase: RunPhase::Idle,
            }),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &AgentDefinition {
        &self.definition
    }

    pub async fn session_id(&self) -> String {
        self.state.lock().await.session.id.clone()
    }

    pub async fn phase(&self) -> RunPhase {
        self.state.lock().await.phase
    }

    /// Current render of the session's segmented memory.
    pub async fn render(&self) -> Vec<Message> {
        self.state.lock().await.memory.render()
    }

    /// Replays a persisted session into a fresh runtime: the render equals
    /// the original's at the same turn index (given a deterministic LLM).
    pub async fn restore(&self, session: Session) -> Result<(), crate::segmented::MemoryError> {
        let mut state = self.state.lock().await;
        let rom = vec![Message::system(self.definition.system_prompt.clone())];
        let mut memory = SegmentedMemory::new(rom, self.definition.memory.clone());
        for message in &session.messages {
            memory.append(message.clone());
            if memory.over_budget() {
                memory.compact(&self.summarizer).await?;
            }
        }
        state.memory = memory;
        state.session = session;
        state.phase = RunPhase::Idle;
        Ok(())
    }

    /// Processes one incoming message to a structured terminal outcome.
    /// Holding the state lock for the whole call enforces one loop per
    /// session at a time.
    pub async fn handle_message(&self, input: &str, cancel: &CancellationToken) -> TurnOutcome {
        let mut state = self.state.lock().await;
        state.phase = RunPhase::InTurn;

        let outcome = match self.definition.config.turn_timeout {
            Some(limit) => {
                tokio::select! {
                    _ = cancel.cancelled() => self.terminal(TerminalKind::Cancelled, "cancelled before turn", 0, 0),
                    result = tokio::time::timeout(limit, self.run_loop(&mut state, input, cancel)) => {
                        match result {
                            Ok(outcome) => outcome,
                            Err(_) => self.terminal(
                                TerminalKind::BudgetExhausted,
                                format!("wall-clock budget ({:?}) exceeded", limit),
                                0,
                                0,
                            ),
                        }
                    }
                }
            }
            None => {
                tokio::select! {
                    _ = cancel.cancelled() => self.terminal(TerminalKind::Cancelled, "cancelled before turn", 0, 0),
                    outcome = self.run_loop(&mut state, input, cancel) => outcome,
                }
            }
        };

        state.phase = RunPhase::Terminal(outcome.kind);
        self.persist(&mut state).await;
        state.phase = RunPhase::Idle;
        outcome
    }

    async fn run_loop(
        &self,
        state: &mut RuntimeState,
        input: &str,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        let config = &self.definition.config;
        self.record(state, Message::user(input));

        let mut turns: u32 = 0;
        let mut tool_executions: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return self.terminal(TerminalKind::Cancelled, "cancelled", turns, tool_executions);
            }
            if turns >= config.max_turns {
                return self.terminal(
                    TerminalKind::BudgetExhausted,
                    format!("turn budget ({}) exceeded", config.max_turns),
                    turns,
                    tool_executions,
                );
            }

            if state.memory.over_budget() {
                if let Err(e) = state.memory.compact(&self.summarizer).await {
                    return self.terminal(TerminalKind::Fatal, e.to_string(), turns, tool_executions);
                }
            }

            let messages = state.memory.render();
            let tool_specs = self.tool_specs();
            let response = match self.call_llm(&messages, &tool_specs).await {
                Ok(r) => r,
                Err(e) => {
                    return self.terminal(TerminalKind::Fatal, e.to_string(), turns, tool_executions)
                }
            };
            turns += 1;

            if response.tool_calls.is_empty() {
                self.record(state, Message::assistant(response.content.clone()));
                self.persist(state).await;
                return TurnOutcome {
                    kind: TerminalKind::Completed,
                    text: response.content,
                    turns,
                    tool_executions,
                };
            }

            self.record(
                state,
                Message::assistant_with_tool_calls(
                    response.content.clone(),
                    response.tool_calls.clone(),
                ),
            );

            if tool_executions + response.tool_calls.len() as u32 > config.max_tool_executions {
                return self.terminal(
                    TerminalKind::BudgetExhausted,
                    format!("tool execution budget ({}) exceeded", config.max_tool_executions),
                    turns,
                    tool_executions,
                );
            }

            state.phase = RunPhase::AwaitingTools;
            let ctx = ToolContext::new(
                self.definition.name.as_str(),
                state.session.id.as_str(),
            )
            .with_cancel(cancel.child_token());
            let ctx = match &self.options.workflow_id {
                Some(id) => ctx.with_workflow_id(id.clone()),
                None => ctx,
            };
            let results = self.executor.execute_all(&response.tool_calls, &ctx).await;
            tool_executions += response.tool_calls.len() as u32;
            state.phase = RunPhase::InTurn;

            let mut failed_tool: Option<String> = None;
            for result in results {
                if let Message::ToolResult {
                    is_error: true,
                    tool_name,
                    ..
                } = &result
                {
                    failed_tool = Some(tool_name.clone());
                }
                self.record(state, result);
            }
            self.persist(state).await;

            if let Some(tool_name) = failed_tool {
                if !config.enable_self_correction {
                    return self.terminal(
                        TerminalKind::Fatal,
                        format!("tool '{}' failed and self-correction is disabled", tool_name),
                        turns,
                        tool_executions,
                    );
                }
                // Self-correction: the loop continues so the LLM can observe
                // the error and retry.
            }
        }
    }

    fn terminal(
        &self,
        kind: TerminalKind,
        text: impl Into<String>,
        turns: u32,
        tool_executions: u32,
    ) -> TurnOutcome {
        TurnOutcome {
            kind,
            text: text.into(),
            turns,
            tool_executions,
        }
    }

    fn record(&self, state: &mut RuntimeState, message: Message) {
        state.memory.append(message.clone());
        state.session.messages.push(message);
        state.session.touch();
    }

    async fn persist(&self, state: &mut RuntimeState) {
        if let Some(saver) = &self.options.saver {
            if let Err(e) = saver.save(&state.session).await {
                tracing::warn!(session = %state.session.id, error = %e, "session save failed");
            }
        }
    }

    fn tool_specs(&self) -> Vec<crate::tools::ToolSpec> {
        let registry = self.executor.registry();
        let mut names = self.definition.tools.clone();
        for builtin in [TOOL_GET_ERROR_DETAIL, TOOL_GET_TOOL_RESULT] {
            if registry.contains(builtin) && !names.iter().any(|n| n == builtin) {
                names.push(builtin.to_string());
            }
        }
        registry.specs_for(&names)
    }

    /// One LLM call, rate limited, with timeout and transient retry.
    async fn call_llm(
        &self,
        messages: &[Message],
        tools: &[crate::tools::ToolSpec],
    ) -> Result<LlmResponse, LlmError> {
        let mut backoff = Duration::from_millis(100);
        let mut last_transient: Option<LlmError> = None;
        for _attempt in 0..3 {
            if let Some(limiter) = &self.options.limiter {
                limiter.acquire().await;
            }
            let call = self.llm.complete(messages, tools);
            let result = match self.definition.config.llm_timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(inner) => inner,
                    Err(_) => Err(LlmError::Timeout(limit)),
                },
                None => call.await,
            };
            match result {
                Ok(response) => return Ok(response),
                Err(e @ LlmError::Transient(_)) | Err(e @ LlmError::Timeout(_)) => {
                    tracing::debug!(error = %e, "transient llm failure; backing off");
                    last_transient = Some(e);
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(other) => return Err(other),
            }
        }
        Err(last_transient.unwrap_or_else(|| LlmError::Provider("llm retries exhausted".into())))
    }
}
