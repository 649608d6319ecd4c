//! Iterative engine: run the body, restart on the predicate, bounded by
//! `max_iterations`; each restart threads the body's output back as input.

use progress_event::ProgressEvent;

use crate::workflow::{AgentRef, FailurePolicy, WorkflowError};

use super::{contribution, invoke_agent, PatternContext, PatternOutcome};

pub async fn run_iterative(
    ctx: &PatternContext,
    body: &AgentRef,
    max_iterations: u32,
    restart_if_contains: Option<&str>,
) -> Result<PatternOutcome, WorkflowError> {
    let policy = ctx.failure_policy(FailurePolicy::Fatal);
    let mut input = ctx.initial_prompt.clone();
    let mut contributions = Vec::new();
    let mut last_output = String::new();

    for iteration in 1..=max_iterations {
        if ctx.cancel.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }
        let definition = ctx.factory.resolve(body)?;
        let agent_name = definition.name.clone();
        let runtime = ctx.factory.build(definition, &ctx.workflow_id);

        ctx.progress
            .emit(ProgressEvent::StageStarted {
                stage: format!("iteration-{}", iteration),
                agent: agent_name.clone(),
            })
            .await;
        let outcome = invoke_agent(&runtime, &input, &ctx.cancel, policy).await;
        if !outcome.succeeded() {
            return Err(WorkflowError::StageFailed {
                stage: format!("iteration-{}", iteration),
                message: outcome.text,
            });
        }
        ctx.progress
            .emit(ProgressEvent::StageCompleted {
                stage: format!("iteration-{}", iteration),
                agent: agent_name.clone(),
                output: outcome.text.clone(),
            })
            .await;
        contributions.push(contribution(&agent_name, &outcome));
        last_output = outcome.text;

        let restart = restart_if_contains
            .map(|needle| last_output.contains(needle))
            .unwrap_or(false);
        if restart && iteration < max_iterations {
            input = last_output.clone();
        } else {
            break;
        }
    }

    Ok(PatternOutcome::complete(last_output, contributions))
}
