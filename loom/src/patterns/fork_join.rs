//! Fork-join engine: every agent answers the same prompt in parallel, then
//! the results merge per strategy.

use futures::future::join_all;
use progress_event::ProgressEvent;

use crate::llm::LlmError;
use crate::message::Message;
use crate::workflow::{AgentRef, FailurePolicy, MergeStrategy, WorkflowError};

use super::{
    contribution, invoke_agent, normalize, AgentContribution, PatternContext, PatternOutcome,
};

/// Runs all agents against the initial prompt and merges.
pub async fn run_fork_join(
    ctx: &PatternContext,
    agents: &[AgentRef],
    merge: MergeStrategy,
) -> Result<PatternOutcome, WorkflowError> {
    let policy = ctx.failure_policy(FailurePolicy::Skip);

    let mut runtimes = Vec::with_capacity(agents.len());
    for agent_ref in agents {
        let definition = ctx.factory.resolve(agent_ref)?;
        runtimes.push(ctx.factory.build(definition, &ctx.workflow_id));
    }

    let outcomes = join_all(runtimes.iter().map(|runtime| async {
        let outcome = invoke_agent(runtime, &ctx.initial_prompt, &ctx.cancel, policy).await;
        (runtime.agent_id().to_string(), outcome)
    }))
    .await;

    let mut contributions: Vec<AgentContribution> = Vec::with_capacity(outcomes.len());
    for (agent, outcome) in &outcomes {
        ctx.progress
            .emit(ProgressEvent::AgentResponse {
                agent: agent.clone(),
                content: outcome.text.clone(),
            })
            .await;
        contributions.push(contribution(agent, outcome));
    }

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

/// Applies one merge strategy to the successful outputs. Exposed to the
/// parallel engine, which shares the merge semantics.
pub(crate) async fn merge_outputs(
    ctx: &PatternContext,
    merge: MergeStrategy,
    succeeded: &[&AgentContribution],
    all_ok: bool,
) -> Result<PatternOutcome, WorkflowError> {
    let wrap = |output: String| {
        if all_ok {
            PatternOutcome::complete(output, Vec::new())
        } else {
            PatternOutcome::partial(output, Vec::new())
        }
    };

    match merge {
        MergeStrategy::Concatenate => {
            // Agent-definition order is the resolution order above.
            let joined = succeeded
                .iter()
                .map(|c| c.output.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            Ok(wrap(joined))
        }
        MergeStrategy::First => Ok(wrap(
            succeeded
                .first()
                .map(|c| c.output.clone())
                .unwrap_or_default(),
        )),
        MergeStrategy::Consensus => {
            let first = normalize(&succeeded[0].output);
            if succeeded.iter().all(|c| normalize(&c.output) == first) && all_ok {
                Ok(wrap(succeeded[0].output.clone()))
            } else {
                let joined = succeeded
                    .iter()
                    .map(|c| format!("{}: {}", c.agent, c.output))
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(PatternOutcome::partial(joined, Vec::new()))
            }
        }
        MergeStrategy::Summary => {
            let merged = merge_llm_call(
                ctx,
                "Synthesize the following agent responses into one coherent answer.",
                succeeded,
            )
            .await?;
            Ok(wrap(merged))
        }
        MergeStrategy::Best => {
            let merged = merge_llm_call(
                ctx,
                "Pick the single best of the following agent responses and reply with it verbatim.",
                succeeded,
            )
            .await?;
            Ok(wrap(merged))
        }
    }
}

async fn merge_llm_call(
    ctx: &PatternContext,
    instruction: &str,
    succeeded: &[&AgentContribution],
) -> Result<String, WorkflowError> {
    let body = succeeded
        .iter()
        .map(|c| format!("## {}\n{}", c.agent, c.output))
        .collect::<Vec<_>>()
        .join("\n\n");
    let messages = vec![
        Message::system(instruction),
        Message::user(format!("Question: {}\n\n{}", ctx.initial_prompt, body)),
    ];
    ctx.factory
        .llm()
        .complete(&messages, &[])
        .await
        .map(|r| r.content)
        .map_err(|e: LlmError| WorkflowError::StageFailed {
            stage: "merge".to_string(),
            message: e.to_string(),
        })
}
