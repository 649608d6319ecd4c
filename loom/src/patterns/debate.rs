//! Debate engine: debaters take turns over N rounds, then a moderator
//! synthesizes.
//!
//! Debaters see the accumulated debate transcript (including same-round
//! prior responses) but never the moderator's synthesis; the moderator sees
//! the full transcript.

use progress_event::ProgressEvent;

use crate::workflow::{AgentRef, FailurePolicy, WorkflowError};

use super::{contribution, invoke_agent, PatternContext, PatternOutcome};

/// Runs `rounds` debate rounds then one moderator pass. With `rounds = 0`
/// only the moderator runs.
pub async fn run_debate(
    ctx: &PatternContext,
    debaters: &[AgentRef],
    moderator: &AgentRef,
    rounds: u32,
) -> Result<PatternOutcome, WorkflowError> {
    let policy = ctx.failure_policy(FailurePolicy::Skip);
    let mut transcript: Vec<(String, String)> = Vec::new();
    let mut contributions = Vec::new();

    let mut runtimes = Vec::with_capacity(debaters.len());
    for debater in debaters {
        let definition = ctx.factory.resolve(debater)?;
        runtimes.push(ctx.factory.build(definition, &ctx.workflow_id));
    }

    for round in 1..=rounds {
        for runtime in &runtimes {
            if ctx.cancel.is_cancelled() {
                return Err(WorkflowError::Cancelled);
            }
            let prompt = debater_prompt(&ctx.initial_prompt, round, rounds, &transcript);
            let outcome = invoke_agent(runtime, &prompt, &ctx.cancel, policy).await;
            ctx.progress
                .emit(ProgressEvent::AgentResponse {
                    agent: runtime.agent_id().to_string(),
                    content: outcome.text.clone(),
                })
                .await;
            contributions.push(contribution(runtime.agent_id(), &outcome));
            if outcome.succeeded() {
                transcript.push((runtime.agent_id().to_string(), outcome.text));
            } else if policy == FailurePolicy::Fatal {
                return Err(WorkflowError::StageFailed {
                    stage: runtime.agent_id().to_string(),
                    message: outcome.text,
                });
            }
            // Skipped debater turns leave the transcript untouched.
        }
    }

    let moderator_definition = ctx.factory.resolve(moderator)?;
    let moderator_runtime = ctx.factory.build(moderator_definition, &ctx.workflow_id);
    let prompt = moderator_prompt(&ctx.initial_prompt, &transcript);
    let outcome = invoke_agent(&moderator_runtime, &prompt, &ctx.cancel, FailurePolicy::Fatal).await;
    if !outcome.succeeded() {
        return Err(WorkflowError::StageFailed {
            stage: moderator_runtime.agent_id().to_string(),
            message: outcome.text,
        });
    }
    ctx.progress
        .emit(ProgressEvent::AgentResponse {
            agent: moderator_runtime.agent_id().to_string(),
            content: outcome.text.clone(),
        })
        .await;
    contributions.push(contribution(moderator_runtime.agent_id(), &outcome));

    Ok(PatternOutcome::complete(outcome.text, contributions))
}

fn render_transcript(transcript: &[(String, String)]) -> String {
    transcript
        .iter()
        .map(|(agent, text)| format!("{}: {}", agent, text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn debater_prompt(
    topic: &str,
    round: u32,
    rounds: u32,
    transcript: &[(String, String)],
) -> String {
    if transcript.is_empty() {
        format!(
            "Debate topic: {}\n\nRound {} of {}. Present your position.",
            topic, round, rounds
        )
    } else {
        format!(
            "Debate topic: {}\n\nTranscript so far:\n{}\n\nRound {} of {}. Respond to the \
             arguments above and advance your position.",
            topic,
            render_transcript(transcript),
            round,
            rounds
        )
    }
}

fn moderator_prompt(topic: &str, transcript: &[(String, String)]) -> String {
    if transcript.is_empty() {
        format!(
            "Debate topic: {}\n\nNo debate turns took place. Give your own synthesis of the topic.",
            topic
        )
    } else {
        format!(
            "Debate topic: {}\n\nFull transcript:\n{}\n\nSynthesize the debate into a final answer.",
            topic,
            render_transcript(transcript)
        )
    }
}
