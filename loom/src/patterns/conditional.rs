//! Conditional engine: a classifier picks a branch; the branch agent handles
//! the original prompt.

use std::collections::BTreeMap;

use progress_event::ProgressEvent;

use crate::workflow::{AgentRef, FailurePolicy, WorkflowError};

use super::{contribution, invoke_agent, normalize, PatternContext, PatternOutcome};

/// Runs the classifier, selects the branch matching its normalized output
/// (falling back to a `default` branch when present), and executes it.
pub async fn run_conditional(
    ctx: &PatternContext,
    classifier: &AgentRef,
    branches: &BTreeMap<String, AgentRef>,
) -> Result<PatternOutcome, WorkflowError> {
    let classifier_definition = ctx.factory.resolve(classifier)?;
    let classifier_runtime = ctx.factory.build(classifier_definition, &ctx.workflow_id);
    let outcome = invoke_agent(
        &classifier_runtime,
        &ctx.initial_prompt,
        &ctx.cancel,
        FailurePolicy::Fatal,
    )
    .await;
    if !outcome.succeeded() {
        return Err(WorkflowError::StageFailed {
            stage: classifier_runtime.agent_id().to_string(),
            message: outcome.text,
        });
    }
    let label = normalize(&outcome.text);
    let mut contributions = vec![contribution(classifier_runtime.agent_id(), &outcome)];

    let branch = branches
        .iter()
        .find(|(key, _)| normalize(key) == label)
        .map(|(_, agent)| agent)
        .or_else(|| branches.get("default"))
        .ok_or_else(|| {
            WorkflowError::Validation(format!(
                "classifier output '{}' matches no branch (have: {})",
                label,
                branches.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })?;

    let branch_definition = ctx.factory.resolve(branch)?;
    let branch_name = branch_definition.name.clone();
    let branch_runtime = ctx.factory.build(branch_definition, &ctx.workflow_id);
    ctx.progress
        .emit(ProgressEvent::StageStarted {
            stage: label.clone(),
            agent: branch_name.clone(),
        })
        .await;
    let branch_outcome = invoke_agent(
        &branch_runtime,
        &ctx.initial_prompt,
        &ctx.cancel,
        ctx.failure_policy(FailurePolicy::Fatal),
    )
    .await;
    if !branch_outcome.succeeded() {
        return Err(WorkflowError::StageFailed {
            stage: branch_name,
            message: branch_outcome.text,
        });
    }
    ctx.progress
        .emit(ProgressEvent::StageCompleted {
            stage: label,
            agent: branch_name.clone(),
            output: branch_outcome.text.clone(),
        })
        .await;
    contributions.push(contribution(&branch_name, &branch_outcome));

    Ok(PatternOutcome::complete(branch_outcome.text, contributions))
}
