//! Executing workflows straight from YAML documents.

mod common;

use std::sync::Arc;

use loom::{ExecuteOptions, LlmResponse, ScriptedLlm, TerminalStatus};

fn echo_llm() -> ScriptedLlm {
    ScriptedLlm::new(|messages, _tools| {
        let user = messages
            .iter()
            .rev()
            .find(|m| m.role() == "user")
            .map(|m| m.content().to_string())
            .unwrap_or_default();
        Ok(LlmResponse::text(user))
    })
}

/// **Scenario**: a YAML pipeline document executes end to end, with the
/// caller variable substituted into a stage prompt.
#[tokio::test]
async fn yaml_pipeline_executes() {
    let (_dir, orchestrator, _saver) = common::test_orchestrator(Arc::new(echo_llm()));

    let doc = r#"
apiVersion: loom/v1
kind: Workflow
metadata:
  name: translator
spec:
  type: pipeline
  stages:
    - name: phrase
      agent: { name: phraser, system_prompt: Phrase it. }
      prompt: "Say {{user_query}} in {{language}}"
"#;
    let options = ExecuteOptions {
        variables: [("language".to_string(), "French".to_string())].into(),
        ..Default::default()
    };
    let result = orchestrator.execute_document(doc, "good morning", options).await;
    assert_eq!(result.status, TerminalStatus::Completed);
    assert_eq!(result.output, "Say good morning in French");
}

/// **Scenario**: an undeclared variable fails validation before any agent
/// runs, with a machine-readable terminal.
#[tokio::test]
async fn undeclared_variable_fails_validation() {
    let (_dir, orchestrator, _saver) = common::test_orchestrator(Arc::new(echo_llm()));

    let doc = r#"
apiVersion: loom/v1
kind: Workflow
metadata: { name: broken }
spec:
  type: pipeline
  stages:
    - name: s1
      agent: { name: a, system_prompt: sys }
      prompt: "needs {{undeclared_thing}}"
"#;
    let result = orchestrator
        .execute_document(doc, "go", ExecuteOptions::default())
        .await;
    assert_eq!(result.status, TerminalStatus::Failed);
    let terminal = result.terminal.unwrap();
    assert_eq!(terminal.kind, loom::FailureKind::Validation);
    assert!(terminal.message.contains("undeclared_thing"));
}

/// **Scenario**: the deprecated `pattern:` key executes but surfaces a
/// deprecation warning; a swarm document additionally carries the
/// swarm-confirmation warning.
#[tokio::test]
async fn warnings_surface_in_result() {
    let (_dir, orchestrator, _saver) = common::test_orchestrator(Arc::new(echo_llm()));

    let doc = r#"
apiVersion: loom/v1
kind: Workflow
metadata: { name: legacy-swarm }
spec:
  pattern: swarm
  strategy: majority
  voters:
    - { name: v1, system_prompt: vote }
    - { name: v2, system_prompt: vote }
"#;
    let result = orchestrator
        .execute_document(doc, "same answer", ExecuteOptions::default())
        .await;
    assert!(result.succeeded());
    assert!(result.warnings.iter().any(|w| w.contains("deprecated")));
    assert!(result.warnings.iter().any(|w| w.contains("swarm")));
}

/// **Scenario**: a registry reference resolves against agents registered on
/// the orchestrator.
#[tokio::test]
async fn registry_agents_resolve() {
    let (_dir, mut orchestrator, _saver) = common::test_orchestrator(Arc::new(echo_llm()));
    orchestrator.register_agent(loom::AgentDefinition::new("echoer", "Echo it back."));

    let doc = r#"
apiVersion: loom/v1
kind: Workflow
metadata: { name: registry-run }
spec:
  type: pipeline
  stages:
    - name: only
      agent: echoer
"#;
    let result = orchestrator
        .execute_document(doc, "registered agents work", ExecuteOptions::default())
        .await;
    assert_eq!(result.status, TerminalStatus::Completed);
    assert_eq!(result.output, "registered agents work");
}

/// **Scenario**: an unknown pattern type produces a validation failure, not
/// a silent fallback.
#[tokio::test]
async fn unknown_pattern_type_fails() {
    let (_dir, orchestrator, _saver) = common::test_orchestrator(Arc::new(echo_llm()));
    let doc = r#"
apiVersion: loom/v1
kind: Workflow
metadata: { name: nope }
spec: { type: roundtable }
"#;
    let result = orchestrator
        .execute_document(doc, "go", ExecuteOptions::default())
        .await;
    assert_eq!(result.status, TerminalStatus::Failed);
    assert_eq!(result.terminal.unwrap().kind, loom::FailureKind::Validation);
}
