//! End-to-end runs of the fork-join, swarm, debate, conditional, and
//! iterative engines with deterministic LLM stubs.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use loom::{
    AgentDefinition, AgentRef, ExecuteOptions, LlmResponse, MergeStrategy, PatternSpec,
    ScriptedLlm, SwarmStrategy, TerminalStatus, Workflow,
};

fn inline(name: &str, system_prompt: &str) -> AgentRef {
    AgentRef::Inline(Box::new(AgentDefinition::new(name, system_prompt)))
}

/// Stub that answers with a fixed string embedded in the agent's system
/// prompt after "say:".
fn say_llm() -> ScriptedLlm {
    ScriptedLlm::new(|messages, _tools| {
        let system = messages
            .iter()
            .find(|m| m.role() == "system")
            .map(|m| m.content().to_string())
            .unwrap_or_default();
        let said = system
            .split("say:")
            .nth(1)
            .map(str::trim)
            .unwrap_or("nothing");
        Ok(LlmResponse::text(said.to_string()))
    })
}

/// **Scenario**: fork-join with concatenate merge contains both agents'
/// outputs in agent-definition order.
#[tokio::test]
async fn fork_join_concatenate_keeps_definition_order() {
    let (_dir, orchestrator, _saver) = common::test_orchestrator(Arc::new(say_llm()));

    let workflow = Workflow::pattern(
        "both-report",
        PatternSpec::ForkJoin {
            agents: vec![
                inline("alpha", "say: alpha: ok"),
                inline("beta", "say: beta: ok"),
            ],
            merge: MergeStrategy::Concatenate,
        },
    );

    let result = orchestrator
        .execute(&workflow, "report in", ExecuteOptions::default())
        .await;
    assert_eq!(result.status, TerminalStatus::Completed);
    let alpha_at = result.output.find("alpha: ok").unwrap();
    let beta_at = result.output.find("beta: ok").unwrap();
    assert!(alpha_at < beta_at, "definition order preserved");
}

/// **Scenario**: three voters emit X, X, Y under majority; consensus is X.
#[tokio::test]
async fn swarm_majority_consensus() {
    let (_dir, orchestrator, _saver) = common::test_orchestrator(Arc::new(say_llm()));

    let workflow = Workflow::pattern(
        "vote",
        PatternSpec::Swarm {
            voters: vec![
                inline("v1", "say: X"),
                inline("v2", "say: X"),
                inline("v3", "say: Y"),
            ],
            judge: None,
            strategy: SwarmStrategy::Majority,
            confidence_threshold: 0.0,
            share_votes: false,
        },
    );

    let result = orchestrator
        .execute(&workflow, "X or Y?", ExecuteOptions::default())
        .await;
    assert_eq!(result.status, TerminalStatus::Completed);
    assert_eq!(result.output, "X");
}

/// **Scenario**: a 50/50 split misses majority; without a judge the result
/// is PARTIAL.
#[tokio::test]
async fn swarm_without_consensus_is_partial() {
    let (_dir, orchestrator, _saver) = common::test_orchestrator(Arc::new(say_llm()));

    let workflow = Workflow::pattern(
        "split-vote",
        PatternSpec::Swarm {
            voters: vec![inline("v1", "say: X"), inline("v2", "say: Y")],
            judge: None,
            strategy: SwarmStrategy::Majority,
            confidence_threshold: 0.0,
            share_votes: false,
        },
    );

    let result = orchestrator
        .execute(&workflow, "X or Y?", ExecuteOptions::default())
        .await;
    assert_eq!(result.status, TerminalStatus::Partial);
}

/// **Scenario**: the judge breaks a missed threshold.
#[tokio::test]
async fn swarm_judge_breaks_ties() {
    let (_dir, orchestrator, _saver) = common::test_orchestrator(Arc::new(say_llm()));

    let workflow = Workflow::pattern(
        "judged-vote",
        PatternSpec::Swarm {
            voters: vec![inline("v1", "say: X"), inline("v2", "say: Y")],
            judge: Some(inline("judge", "say: X wins")),
            strategy: SwarmStrategy::Unanimous,
            confidence_threshold: 0.0,
            share_votes: false,
        },
    );

    let result = orchestrator
        .execute(&workflow, "X or Y?", ExecuteOptions::default())
        .await;
    assert_eq!(result.status, TerminalStatus::Completed);
    assert_eq!(result.output, "X wins");
}

/// **Scenario**: one voter is its own consensus under any strategy.
#[tokio::test]
async fn swarm_single_voter_is_the_outcome() {
    let (_dir, orchestrator, _saver) = common::test_orchestrator(Arc::new(say_llm()));

    let workflow = Workflow::pattern(
        "solo-vote",
        PatternSpec::Swarm {
            voters: vec![inline("only", "say: X")],
            judge: None,
            strategy: SwarmStrategy::Unanimous,
            confidence_threshold: 0.0,
            share_votes: false,
        },
    );

    let result = orchestrator
        .execute(&workflow, "X?", ExecuteOptions::default())
        .await;
    assert_eq!(result.status, TerminalStatus::Completed);
    assert_eq!(result.output, "X");
}

/// **Scenario**: debate with rounds = 0 runs the moderator only.
#[tokio::test]
async fn debate_zero_rounds_is_moderator_only() {
    let (_dir, orchestrator, _saver) = common::test_orchestrator(Arc::new(say_llm()));

    let workflow = Workflow::pattern(
        "quiet-debate",
        PatternSpec::Debate {
            debaters: vec![inline("d1", "say: point one"), inline("d2", "say: point two")],
            moderator: inline("moderator", "say: synthesis without debate"),
            rounds: 0,
        },
    );

    let result = orchestrator
        .execute(&workflow, "topic", ExecuteOptions::default())
        .await;
    assert_eq!(result.status, TerminalStatus::Completed);
    assert_eq!(result.output, "synthesis without debate");
    // Only the moderator contributed.
    assert_eq!(result.contributions.len(), 1);
    assert_eq!(result.contributions[0].agent, "moderator");
}

/// **Scenario**: debaters see the accumulated transcript; the moderator sees
/// everything and synthesizes last.
#[tokio::test]
async fn debate_rounds_accumulate_transcript() {
    let llm = ScriptedLlm::new(|messages, _tools| {
        let system = messages
            .iter()
            .find(|m| m.role() == "system")
            .map(|m| m.content().to_string())
            .unwrap_or_default();
        let user = messages
            .iter()
            .rev()
            .find(|m| m.role() == "user")
            .map(|m| m.content().to_string())
            .unwrap_or_default();
        if system.contains("moderator") {
            let turns = user.matches("said-something").count();
            Ok(LlmResponse::text(format!("synthesized {} turns", turns)))
        } else {
            Ok(LlmResponse::text("said-something".to_string()))
        }
    });
    let (_dir, orchestrator, _saver) = common::test_orchestrator(Arc::new(llm));

    let workflow = Workflow::pattern(
        "two-round-debate",
        PatternSpec::Debate {
            debaters: vec![inline("d1", "debater one"), inline("d2", "debater two")],
            moderator: inline("mod", "You are the moderator"),
            rounds: 2,
        },
    );

    let result = orchestrator
        .execute(&workflow, "topic", ExecuteOptions::default())
        .await;
    // 2 debaters × 2 rounds = 4 transcript turns reach the moderator.
    assert_eq!(result.output, "synthesized 4 turns");
}

/// **Scenario**: the classifier's normalized output picks the branch, and
/// the branch agent answers the original prompt.
#[tokio::test]
async fn conditional_routes_by_classifier_output() {
    let llm = ScriptedLlm::new(|messages, _tools| {
        let system = messages
            .iter()
            .find(|m| m.role() == "system")
            .map(|m| m.content().to_string())
            .unwrap_or_default();
        if system.contains("classify") {
            Ok(LlmResponse::text("  Billing.  ".to_string()))
        } else if system.contains("billing") {
            Ok(LlmResponse::text("handled by billing".to_string()))
        } else {
            Ok(LlmResponse::text("wrong branch".to_string()))
        }
    });
    let (_dir, orchestrator, _saver) = common::test_orchestrator(Arc::new(llm));

    let mut branches = BTreeMap::new();
    branches.insert("billing".to_string(), inline("billing-agent", "billing desk"));
    branches.insert("support".to_string(), inline("support-agent", "support desk"));
    let workflow = Workflow::pattern(
        "router",
        PatternSpec::Conditional {
            classifier: inline("classifier", "classify the request"),
            branches,
        },
    );

    let result = orchestrator
        .execute(&workflow, "my invoice is wrong", ExecuteOptions::default())
        .await;
    assert_eq!(result.status, TerminalStatus::Completed);
    assert_eq!(result.output, "handled by billing");
}

/// **Scenario**: iterative restarts while the predicate matches and stops at
/// the iteration bound, threading output back in as input.
#[tokio::test]
async fn iterative_restarts_until_bound() {
    let llm = ScriptedLlm::new(|messages, _tools| {
        let user = messages
            .iter()
            .rev()
            .find(|m| m.role() == "user")
            .map(|m| m.content().to_string())
            .unwrap_or_default();
        let depth = user.matches("again").count();
        Ok(LlmResponse::text(format!("{} again", user_depth_marker(depth))))
    });

    fn user_depth_marker(depth: usize) -> String {
        "again ".repeat(depth + 1).trim_end().to_string()
    }

    let (_dir, orchestrator, _saver) = common::test_orchestrator(Arc::new(llm));
    let workflow = Workflow::pattern(
        "refine",
        PatternSpec::Iterative {
            body: inline("refiner", "keep refining"),
            max_iterations: 3,
            restart_if_contains: Some("again".to_string()),
        },
    );

    let result = orchestrator
        .execute(&workflow, "start", ExecuteOptions::default())
        .await;
    assert_eq!(result.status, TerminalStatus::Completed);
    // Exactly max_iterations body runs.
    assert_eq!(result.contributions.len(), 3);
}
