//! Swarm engine: voters answer (in parallel, or sequentially when votes are
//! shared), consensus is tallied per strategy, and an optional judge breaks
//! ties.

use futures::future::join_all;
use progress_event::ProgressEvent;

use crate::workflow::{AgentRef, FailurePolicy, SwarmStrategy, WorkflowError};

use super::{
    contribution, invoke_agent, normalize, AgentContribution, PatternContext, PatternOutcome,
};

/// One parsed vote.
#[derive(Clone, Debug)]
struct Vote {
    voter: String,
    answer: String,
    confidence: f64,
}

/// Voters may reply with plain text (confidence 1.0) or a JSON object
/// `{"answer": …, "confidence": …}`.
fn parse_vote(voter: &str, text: &str) -> Vote {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text.trim()) {
        if let Some(answer) = value.get("answer").and_then(|a| a.as_str()) {
            return Vote {
                voter: voter.to_string(),
                answer: answer.to_string(),
                confidence: value
                    .get("confidence")
                    .and_then(|c| c.as_f64())
                    .unwrap_or(1.0),
            };
        }
    }
    Vote {
        voter: voter.to_string(),
        answer: text.trim().to_string(),
        confidence: 1.0,
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn run_swarm(
    ctx: &PatternContext,
    voters: &[AgentRef],
    judge: Option<&AgentRef>,
    strategy: SwarmStrategy,
    confidence_threshold: f64,
    share_votes: bool,
) -> Result<PatternOutcome, WorkflowError> {
    let policy = ctx.failure_policy(FailurePolicy::Skip);

    let mut runtimes = Vec::with_capacity(voters.len());
    for voter in voters {
        let definition = ctx.factory.resolve(voter)?;
        runtimes.push(ctx.factory.build(definition, &ctx.workflow_id));
    }

    let mut contributions: Vec<AgentContribution> = Vec::new();
    let mut votes: Vec<Vote> = Vec::new();

    if share_votes {
        // Sequential: each voter sees the votes cast before it.
        for runtime in &runtimes {
            if ctx.cancel.is_cancelled() {
                return Err(WorkflowError::Cancelled);
            }
            let prompt = if votes.is_empty() {
                ctx.initial_prompt.clone()
            } else {
                let prior = votes
                    .iter()
                    .map(|v| format!("{}: {}", v.voter, v.answer))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("{}\n\nVotes so far:\n{}", ctx.initial_prompt, prior)
            };
            let outcome = invoke_agent(runtime, &prompt, &ctx.cancel, policy).await;
            contributions.push(contribution(runtime.agent_id(), &outcome));
            if outcome.succeeded() {
                votes.push(parse_vote(runtime.agent_id(), &outcome.text));
            } else if policy == FailurePolicy::Fatal {
                return Err(WorkflowError::StageFailed {
                    stage: runtime.agent_id().to_string(),
                    message: outcome.text,
                });
            }
        }
    } else {
        let outcomes = join_all(runtimes.iter().map(|runtime| async {
            let outcome = invoke_agent(runtime, &ctx.initial_prompt, &ctx.cancel, policy).await;
            (runtime.agent_id().to_string(), outcome)
        }))
        .await;
        for (voter, outcome) in &outcomes {
            contributions.push(contribution(voter, outcome));
            if outcome.succeeded() {
                votes.push(parse_vote(voter, &outcome.text));
            } else if policy == FailurePolicy::Fatal {
                return Err(WorkflowError::StageFailed {
                    stage: voter.clone(),
                    message: outcome.text.clone(),
                });
            }
        }
    }

    for vote in &votes {
        ctx.progress
            .emit(ProgressEvent::AgentResponse {
                agent: vote.voter.clone(),
                content: vote.answer.clone(),
            })
            .await;
    }

    // Low-confidence votes are filtered out before tallying.
    let tallied: Vec<&Vote> = votes
        .iter()
        .filter(|v| v.confidence >= confidence_threshold)
        .collect();

    if let Some((winner, share)) = tally(&tallied) {
        if strategy.met(share) {
            return Ok(PatternOutcome::complete(winner, contributions));
        }
    }

    // Threshold missed: the judge breaks ties, else the result is PARTIAL.
    if let Some(judge_ref) = judge {
        let definition = ctx.factory.resolve(judge_ref)?;
        let runtime = ctx.factory.build(definition, &ctx.workflow_id);
        let ballot = votes
            .iter()
            .map(|v| format!("{} (confidence {:.2}): {}", v.voter, v.confidence, v.answer))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Question: {}\n\nThe voters did not reach consensus:\n{}\n\nDecide the final answer.",
            ctx.initial_prompt, ballot
        );
        let outcome = invoke_agent(&runtime, &prompt, &ctx.cancel, FailurePolicy::Fatal).await;
        if !outcome.succeeded() {
            return Err(WorkflowError::StageFailed {
                stage: runtime.agent_id().to_string(),
                message: outcome.text,
            });
        }
        contributions.push(contribution(runtime.agent_id(), &outcome));
        return Ok(PatternOutcome::complete(outcome.text, contributions));
    }

    let top = tally(&tallied).map(|(winner, _)| winner).unwrap_or_default();
    Ok(PatternOutcome::partial(top, contributions))
}

/// Winner answer (original casing of its first occurrence) and its share of
/// the tallied votes.
fn tally(votes: &[&Vote]) -> Option<(String, f64)> {
    if votes.is_empty() {
        return None;
    }
    let mut counts: Vec<(String, String, usize)> = Vec::new();
    for vote in votes {
        let key = normalize(&vote.answer);
        match counts.iter_mut().find(|(k, _, _)| *k == key) {
            Some((_, _, n)) => *n += 1,
            None => counts.push((key, vote.answer.clone(), 1)),
        }
    }
    counts
        .into_iter()
        .max_by_key(|(_, _, n)| *n)
        .map(|(_, original, n)| (original, n as f64 / votes.len() as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_votes_with_confidence() {
        let vote = parse_vote("v1", r#"{"answer": "X", "confidence": 0.4}"#);
        assert_eq!(vote.answer, "X");
        assert!((vote.confidence - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn plain_text_vote_defaults_to_full_confidence() {
        let vote = parse_vote("v1", "  Y  ");
        assert_eq!(vote.answer, "Y");
        assert!((vote.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn tally_finds_majority_share() {
        let votes = vec![
            parse_vote("a", "X"),
            parse_vote("b", "x"),
            parse_vote("c", "Y"),
        ];
        let refs: Vec<&Vote> = votes.iter().collect();
        let (winner, share) = tally(&refs).unwrap();
        assert_eq!(winner, "X");
        assert!((share - 2.0 / 3.0).abs() < 1e-9);
    }
}
