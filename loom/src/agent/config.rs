//! Agent definition and runtime budgets.

use std::time::Duration;

use crate::segmented::SegmentBudgets;

/// Runtime budgets and switches for one agent.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Conversation loop iterations per incoming message.
    pub max_turns: u32,
    /// Total tool executions per incoming message.
    pub max_tool_executions: u32,
    /// Wall-clock bound on one incoming message's processing.
    pub turn_timeout: Option<Duration>,
    /// Bound on a single LLM call.
    pub llm_timeout: Option<Duration>,
    /// Keep looping after a tool error so the LLM can observe it and retry.
    pub enable_self_correction: bool,
    /// Cap on concurrently running tool calls from one turn.
    pub tool_concurrency: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: 50,
            max_tool_executions: 50,
            turn_timeout: Some(Duration::from_secs(300)),
            llm_timeout: Some(Duration::from_secs(120)),
            enable_self_correction: true,
            tool_concurrency: 8,
        }
    }
}

/// A resolved agent: what a workflow stage actually runs.
///
/// **Interaction**: Produced by document resolution (inline body, registry
/// id, or path); consumed by the orchestrator when it builds runtimes.
#[derive(Clone, Debug)]
pub struct AgentDefinition {
    pub name: String,
    pub system_prompt: String,
    /// Names resolved against the process tool registry.
    pub tools: Vec<String>,
    /// Bus topic patterns this agent listens on (event-driven workflows).
    pub subscriptions: Vec<String>,
    pub memory: SegmentBudgets,
    pub config: AgentConfig,
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            tools: Vec::new(),
            subscriptions: Vec::new(),
            memory: SegmentBudgets::default(),
            config: AgentConfig::default(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_subscriptions(mut self, subscriptions: Vec<String>) -> Self {
        self.subscriptions = subscriptions;
        self
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_budgets() {
        let c = AgentConfig::default();
        assert_eq!(c.max_turns, 50);
        assert_eq!(c.max_tool_executions, 50);
        assert!(c.enable_self_correction);
    }
}
