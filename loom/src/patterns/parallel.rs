//! Parallel engine: independent tasks, each with its own prompt template,
//! merged like fork-join.

use futures::future::join_all;
use progress_event::ProgressEvent;

use crate::workflow::{interpolate, FailurePolicy, MergeStrategy, TaskSpec, WorkflowError};

use super::fork_join::merge_outputs;
use super::{contribution, invoke_agent, AgentContribution, PatternContext, PatternOutcome};

/// Runs every task in parallel with its own instantiated prompt.
pub async fn run_parallel(
    ctx: &PatternContext,
    tasks: &[TaskSpec],
    merge: MergeStrategy,
) -> Result<PatternOutcome, WorkflowError> {
    let policy = ctx.failure_policy(FailurePolicy::Skip);
    let vars = ctx.base_vars();

    let mut prepared = Vec::with_capacity(tasks.len());
    for task in tasks {
        let definition = ctx.factory.resolve(&task.agent)?;
        let prompt = interpolate(&task.prompt, &vars)?;
        prepared.push((
            task.name.clone(),
            prompt,
            ctx.factory.build(definition, &ctx.workflow_id),
        ));
    }

    let outcomes = join_all(prepared.iter().map(|(name, prompt, runtime)| async {
        ctx.progress
            .emit(ProgressEvent::StageStarted {
                stage: name.clone(),
                agent: runtime.agent_id().to_string(),
            })
            .await;
        let outcome = invoke_agent(runtime, prompt, &ctx.cancel, policy).await;
        ctx.progress
            .emit(ProgressEvent::StageCompleted {
                stage: name.clone(),
                agent: runtime.agent_id().to_string(),
                output: outcome.text.clone(),
            })
            .await;
        (runtime.agent_id().to_string(), outcome)
    }))
    .await;

    let contributions: Vec<AgentContribution> = outcomes
        .iter()
        .map(|(agent, outcome)| contribution(agent, outcome))
        .collect();
    let succeeded: Vec<&AgentContribution> = contributions
        .iter()
        .zip(&outcomes)
        .filter(|(_, (_, o))| o.succeeded())
        .map(|(c, _)| c)
        .collect();

    if succeeded.is_empty() || (policy == FailurePolicy::Fatal && succeeded.len() < outcomes.len())
    {
        let failed = outcomes
            .iter()
            .find(|(_, o)| !o.succeeded())
            .map(|(a, o)| (a.clone(), o.text.clone()))
            .unwrap_or_default();
        return Err(WorkflowError::StageFailed {
            stage: failed.0,
            message: failed.1,
        });
    }
    let all_ok = succeeded.len() == outcomes.len();

    let outcome = merge_outputs(ctx, merge, &succeeded, all_ok).await?;
    Ok(PatternOutcome {
        contributions,
        ..outcome
    })
}
