//! Event-driven workflow: auto-spawn on fabric traffic and quiescence.

mod common;

use std::sync::Arc;

use loom::{
    AgentDefinition, AgentRef, EventDrivenSpec, ExecuteOptions, LlmResponse, ScriptedLlm,
    TerminalStatus, ToolCall, Workflow,
};
use serde_json::json;

fn agent(name: &str, system_prompt: &str, subscriptions: &[&str]) -> AgentRef {
    AgentRef::Inline(Box::new(
        AgentDefinition::new(name, system_prompt)
            .with_subscriptions(subscriptions.iter().map(|s| s.to_string()).collect()),
    ))
}

/// The host kicks off a brainstorm; idea agents reply on the host's topic.
/// Each agent acts exactly once per incoming message: a trailing user
/// message triggers a publish, a trailing tool result closes the turn.
fn brainstorm_llm() -> ScriptedLlm {
    ScriptedLlm::new(|messages, _tools| {
        let system = messages
            .iter()
            .find(|m| m.role() == "system")
            .map(|m| m.content().to_string())
            .unwrap_or_default();
        let last = messages.last().expect("non-empty render");
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role() == "user")
            .map(|m| m.content().to_string())
            .unwrap_or_default();

        if system.contains("host") {
            if last.role() == "user" && last_user.contains("idea from") {
                // A reply arrived on the host's subscription.
                return Ok(LlmResponse::text(format!("collected: {}", last_user)));
            }
            if last.role() == "tool_result" {
                return Ok(LlmResponse::text("kicked off".to_string()));
            }
            return Ok(LlmResponse {
                content: String::new(),
                tool_calls: vec![ToolCall::new(
                    "c1",
                    "publish_message",
                    json!({"topic": "brainstorm-chat", "message": "need ideas for names"}),
                )],
                usage: None,
            });
        }

        // Idea agents: reply once on the host's reply topic, then stop.
        if last.role() == "tool_result" {
            return Ok(LlmResponse::text("idea sent".to_string()));
        }
        let me = if system.contains("alice") { "alice" } else { "bob" };
        Ok(LlmResponse {
            content: String::new(),
            tool_calls: vec![ToolCall::new(
                "c1",
                "publish_message",
                json!({"topic": "chat.replies", "message": format!("idea from {}", me)}),
            )],
            usage: None,
        })
    })
}

/// **Scenario**: the entrypoint publishes to `brainstorm-chat`; two
/// subscribed agents are auto-spawned by the publish, each replies, and the
/// entrypoint processes at least one reply before the run quiesces.
#[tokio::test]
async fn auto_spawn_and_reply() {
    let (_dir, orchestrator, _saver) = common::test_orchestrator(Arc::new(brainstorm_llm()));

    let workflow = Workflow::event_driven(
        "brainstorm",
        EventDrivenSpec {
            entrypoint: "host".to_string(),
            agents: vec![
                agent("host", "You are the host of the brainstorm", &["chat.replies"]),
                agent("alice", "You are alice; reply with an idea", &["brainstorm-chat"]),
                agent("bob", "You are bob; reply with an idea", &["brainstorm-chat"]),
            ],
            communication: Some("peer-to-peer-pub-sub".to_string()),
        },
    );

    let result = orchestrator
        .execute(&workflow, "brainstorm names", ExecuteOptions::default())
        .await;
    assert_eq!(result.status, TerminalStatus::Completed);

    // Both idea agents were spawned and contributed.
    let agents: Vec<&str> = result.contributions.iter().map(|c| c.agent.as_str()).collect();
    assert!(agents.contains(&"alice"));
    assert!(agents.contains(&"bob"));

    // The host processed at least one reply.
    assert!(result.output.starts_with("collected: idea from"));
    let host_turns = agents.iter().filter(|a| **a == "host").count();
    assert!(host_turns >= 2, "host ran {} turns", host_turns);
}

/// **Scenario**: the workflow turn budget bounds an otherwise chatty run and
/// surfaces PARTIAL.
#[tokio::test]
async fn workflow_turn_budget_bounds_the_run() {
    // Every incoming message triggers one publish to the other's topic, so
    // the rally never ends on its own.
    let llm = ScriptedLlm::new(|messages, _tools| {
        let system = messages
            .iter()
            .find(|m| m.role() == "system")
            .map(|m| m.content().to_string())
            .unwrap_or_default();
        let last = messages.last().expect("non-empty render");
        if last.role() == "tool_result" {
            return Ok(LlmResponse::text("sent".to_string()));
        }
        let topic = if system.contains("ping") { "court.pong" } else { "court.ping" };
        Ok(LlmResponse {
            content: String::new(),
            tool_calls: vec![ToolCall::new(
                "c1",
                "publish_message",
                json!({"topic": topic, "message": "your serve"}),
            )],
            usage: None,
        })
    });
    let (_dir, orchestrator, _saver) = common::test_orchestrator(Arc::new(llm));

    let mut workflow = Workflow::event_driven(
        "ping-pong",
        EventDrivenSpec {
            entrypoint: "ping".to_string(),
            agents: vec![
                agent("ping", "You are ping", &["court.ping"]),
                agent("pong", "You are pong", &["court.pong"]),
            ],
            communication: None,
        },
    );
    workflow.config.max_workflow_turns = 5;

    let result = orchestrator
        .execute(&workflow, "serve", ExecuteOptions::default())
        .await;
    assert_eq!(result.status, TerminalStatus::Partial);
    assert_eq!(result.contributions.len(), 5);
}
