//! Parallel tool execution for one LLM turn.
//!
//! Every tool call goes through: registry lookup → schema validation →
//! bounded-concurrency execution with timeout and cancellation → error
//! routing through the error submission channel → large-result routing into
//! session-scoped shared memory.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error_store::{format_fallback, format_for_llm, summarize, ErrorStore};
use crate::fabric::Fabric;
use crate::message::{Message, ToolCall};
use crate::payload::MSG_TOOL_RESULT;
use crate::policy::RoutingDecision;
use crate::shared_memory::{PutOpts, SharedNamespace};

use super::{schema, ToolContext, ToolError, ToolRegistry};

/// Executor knobs.
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Per-agent cap on concurrently running tool calls.
    pub concurrency: usize,
    /// Per-tool-call timeout.
    pub tool_timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            tool_timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// Runs the tool calls of one turn in parallel and shapes the results the
/// LLM sees.
///
/// **Interaction**: Owned by each agent runtime; shares the process-wide
/// registry, fabric, and error store.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    fabric: Arc<Fabric>,
    errors: Option<Arc<dyn ErrorStore>>,
    config: ExecutorConfig,
}

impl ToolExecutor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        fabric: Arc<Fabric>,
        errors: Option<Arc<dyn ErrorStore>>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            registry,
            fabric,
            errors,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Executes all calls concurrently (bounded) and returns one tool-result
    /// message per call, in call order.
    pub async fn execute_all(&self, calls: &[ToolCall], ctx: &ToolContext) -> Vec<Message> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let futures = calls.iter().map(|call| {
            let semaphore = Arc::clone(&semaphore);
            let call = call.clone();
            async move {
                // A closed semaphore cannot happen here; treat it as cancellation.
                let _permit = match semaphore.acquire().await {
                    Ok(p) => p,
                    Err(_) => return self.cancelled_result(&call),
                };
                self.execute_one(call, ctx).await
            }
        });
        futures::future::join_all(futures).await
    }

    async fn execute_one(&self, call: ToolCall, ctx: &ToolContext) -> Message {
        if ctx.cancel.is_cancelled() {
            return self.cancelled_result(&call);
        }

        let Some(tool) = self.registry.lookup(&call.name) else {
            return Message::tool_result(
                &call.call_id,
                &call.name,
                format!("Unknown tool '{}'", call.name),
                true,
            );
        };

        // Validation errors are structured tool errors, not invocations.
        let spec = tool.spec();
        if let Err(violation) = schema::validate_args(&spec.input_schema, &call.arguments) {
            return Message::tool_result(
                &call.call_id,
                &call.name,
                format!("Invalid arguments for '{}': {}", call.name, violation),
                true,
            );
        }

        let run = tool.call(call.arguments.clone(), ctx);
        let outcome = match self.config.tool_timeout {
            Some(timeout) => {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => return self.cancelled_result(&call),
                    result = tokio::time::timeout(timeout, run) => match result {
                        Ok(inner) => inner,
                        Err(_) => Err(ToolError::Timeout(timeout)),
                    },
                }
            }
            None => {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => return self.cancelled_result(&call),
                    result = run => result,
                }
            }
        };

        match outcome {
            Ok(text) => self.shape_result(&call, text, ctx).await,
            Err(error) => self.shape_error(&call, error, ctx).await,
        }
    }

    fn cancelled_result(&self, call: &ToolCall) -> Message {
        Message::tool_result(&call.call_id, &call.name, "Cancelled", true)
    }

    /// Large results are parked in session-scoped shared memory and replaced
    /// by a retrieval handle; the threshold is the `tool_result` policy rule.
    async fn shape_result(&self, call: &ToolCall, text: String, ctx: &ToolContext) -> Message {
        let decision = self
            .fabric
            .policy()
            .decide(MSG_TOOL_RESULT, text.len());
        if decision == RoutingDecision::Value {
            return Message::tool_result(&call.call_id, &call.name, text, false);
        }

        let ns = SharedNamespace::Session(ctx.session_id.clone());
        let handle = format!("tool_result/{}", call.call_id);
        match self
            .fabric
            .shared_memory()
            .put(&ns, &handle, text.as_bytes(), PutOpts::default())
            .await
        {
            Ok(()) => Message::tool_result(
                &call.call_id,
                &call.name,
                format!(
                    "Result too large to inline ({} bytes). Use {}(\"{}\") to retrieve it.",
                    text.len(),
                    super::TOOL_GET_TOOL_RESULT,
                    handle
                ),
                false,
            ),
            Err(e) => {
                tracing::warn!(error = %e, "failed to park large tool result; inlining");
                Message::tool_result(&call.call_id, &call.name, text, false)
            }
        }
    }

    /// Errors go through the error submission channel; the LLM sees a short
    /// message with the error id. Store failure falls back to truncation.
    async fn shape_error(&self, call: &ToolCall, error: ToolError, ctx: &ToolContext) -> Message {
        let raw = error.raw_payload();
        let content = match &self.errors {
            Some(store) => match store.store(&ctx.session_id, &call.name, raw.clone()).await {
                Ok(id) => format_for_llm(&call.name, &summarize(&raw), &id),
                Err(e) => {
                    tracing::warn!(error = %e, "error store unavailable; truncating");
                    format_fallback(&call.name, &raw)
                }
            },
            None => format_fallback(&call.name, &raw),
        };
        Message::tool_result(&call.call_id, &call.name, content, true)
    }
}
