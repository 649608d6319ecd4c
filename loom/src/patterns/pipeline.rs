//! Pipeline engine: stages run sequentially, each seeing the previous
//! stage's output (or the full history when `pass_full_history` is set).

use progress_event::ProgressEvent;

use crate::workflow::{interpolate, FailurePolicy, Stage, WorkflowError};

use super::{contribution, invoke_agent, PatternContext, PatternOutcome};

/// Runs stages in order. A stage failure aborts the pipeline unless the
/// stage is marked non-fatal, in which case it is recorded and skipped.
pub async fn run_pipeline(
    ctx: &PatternContext,
    stages: &[Stage],
) -> Result<PatternOutcome, WorkflowError> {
    let policy = ctx.failure_policy(FailurePolicy::Fatal);
    let mut previous = ctx.initial_prompt.clone();
    let mut history: Vec<String> = Vec::new();
    let mut contributions = Vec::new();
    let mut any_skipped = false;

    for stage in stages {
        if ctx.cancel.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }
        let definition = ctx.factory.resolve(&stage.agent)?;
        let agent_name = definition.name.clone();
        let runtime = ctx.factory.build(definition, &ctx.workflow_id);

        let mut vars = ctx.base_vars();
        vars.insert("previous".to_string(), previous.clone());
        if ctx.config.pass_full_history {
            vars.insert("history".to_string(), history.join("\n\n"));
        } else {
            vars.insert("history".to_string(), String::new());
        }
        let prompt = match &stage.prompt {
            Some(template) => interpolate(template, &vars)?,
            None if ctx.config.pass_full_history && !history.is_empty() => {
                format!("{}\n\n{}", history.join("\n\n"), previous)
            }
            None => previous.clone(),
        };

        ctx.progress
            .emit(ProgressEvent::StageStarted {
                stage: stage.name.clone(),
                agent: agent_name.clone(),
            })
            .await;

        let outcome = invoke_agent(&runtime, &prompt, &ctx.cancel, policy).await;
        contributions.push(contribution(&agent_name, &outcome));

        if outcome.succeeded() {
            ctx.progress
                .emit(ProgressEvent::StageCompleted {
                    stage: stage.name.clone(),
                    agent: agent_name.clone(),
                    output: outcome.text.clone(),
                })
                .await;
            history.push(outcome.text.clone());
            previous = outcome.text;
        } else if stage.non_fatal || policy == FailurePolicy::Skip {
            // Recorded and skipped; the next stage sees the prior output.
            tracing::warn!(stage = %stage.name, "non-fatal stage failure skipped");
            any_skipped = true;
        } else {
            return Err(WorkflowError::StageFailed {
                stage: stage.name.clone(),
                message: outcome.text,
            });
        }
    }

    Ok(if any_skipped {
        PatternOutcome::partial(previous, contributions)
    } else {
        PatternOutcome::complete(previous, contributions)
    })
}
