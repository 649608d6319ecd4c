//! Event-driven engine: an entrypoint agent plus agents that auto-spawn
//! lazily when fabric traffic targets them.
//!
//! Agents coordinate through bus subscriptions and the point-to-point queue;
//! hub-and-spoke and peer-to-peer shapes emerge from who subscribes where.
//! The run ends when all agents quiesce (no pending messages, no running
//! turns) or the workflow turn budget is reached.

use std::collections::HashMap;
use std::time::Duration;

use progress_event::ProgressEvent;

use crate::agent::AgentRuntime;
use crate::bus::Subscription;
use crate::tools::{TOOL_PUBLISH_MESSAGE, TOOL_SEND_MESSAGE};
use crate::workflow::{EventDrivenSpec, WorkflowError};

use super::{AgentContribution, OutcomeStatus, PatternContext, PatternOutcome};

pub async fn run_event_driven(
    ctx: &PatternContext,
    spec: &EventDrivenSpec,
) -> Result<PatternOutcome, WorkflowError> {
    let fabric = ctx.factory.fabric().clone();

    // Resolve every agent up front; runtimes spawn lazily on first message.
    let mut order: Vec<String> = Vec::with_capacity(spec.agents.len());
    let mut definitions = HashMap::new();
    for agent_ref in &spec.agents {
        let mut definition = ctx.factory.resolve(agent_ref)?;
        for tool in [TOOL_PUBLISH_MESSAGE, TOOL_SEND_MESSAGE] {
            if !definition.tools.iter().any(|t| t == tool) {
                definition.tools.push(tool.to_string());
            }
        }
        order.push(definition.name.clone());
        definitions.insert(definition.name.clone(), definition);
    }

    // Subscriptions are registered before anything runs so that no publish
    // is lost while its target agent is still unspawned.
    let mut inboxes: Vec<(String, Subscription)> = Vec::new();
    for name in &order {
        let definition = &definitions[name];
        for pattern in &definition.subscriptions {
            let subscription = fabric
                .subscribe(pattern, Vec::new())
                .map_err(|e| WorkflowError::Validation(e.to_string()))?;
            inboxes.push((name.clone(), subscription));
        }
    }

    let mut runtimes: HashMap<String, AgentRuntime> = HashMap::new();
    let mut contributions: Vec<AgentContribution> = Vec::new();
    let mut turns: u32 = 0;

    // The entrypoint runs first with the initial prompt.
    let entry_name = spec.entrypoint.clone();
    let entry_definition = definitions
        .get(&entry_name)
        .cloned()
        .ok_or_else(|| WorkflowError::AgentNotFound(entry_name.clone()))?;
    runtimes.insert(
        entry_name.clone(),
        ctx.factory.build(entry_definition, &ctx.workflow_id),
    );
    let outcome = runtimes[&entry_name]
        .handle_message(&ctx.initial_prompt, &ctx.cancel)
        .await;
    turns += 1;
    ctx.progress
        .emit(ProgressEvent::AgentResponse {
            agent: entry_name.clone(),
            content: outcome.text.clone(),
        })
        .await;
    let mut entry_output = outcome.text.clone();
    contributions.push(AgentContribution {
        agent: entry_name.clone(),
        output: outcome.text,
        kind: outcome.kind,
    });

    let mut budget_hit = false;
    loop {
        if ctx.cancel.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }
        if turns >= ctx.config.max_workflow_turns {
            budget_hit = true;
            break;
        }

        // One delivery per pass: bus inboxes first, then the durable queue.
        let mut delivery: Option<(String, String)> = None;
        for (agent, subscription) in inboxes.iter_mut() {
            while let Some(message) = subscription.try_receive() {
                // An agent's own publishes are not redelivered to it.
                if message.sender == *agent {
                    continue;
                }
                let bytes = fabric
                    .open_payload(&message.payload)
                    .await
                    .map_err(|e| WorkflowError::Validation(e.to_string()))?;
                delivery = Some((agent.clone(), String::from_utf8_lossy(&bytes).into_owned()));
                break;
            }
            if delivery.is_some() {
                break;
            }
        }
        if delivery.is_none() {
            for name in &order {
                let received = fabric
                    .queue()
                    .receive(name, None, Duration::ZERO)
                    .await
                    .map_err(|e| WorkflowError::Validation(e.to_string()))?;
                if let Some(message) = received {
                    let bytes = fabric
                        .open_payload(&message.payload)
                        .await
                        .map_err(|e| WorkflowError::Validation(e.to_string()))?;
                    let _ = fabric.queue().ack(&message.id).await;
                    delivery = Some((name.clone(), String::from_utf8_lossy(&bytes).into_owned()));
                    break;
                }
            }
        }

        let Some((agent_name, input)) = delivery else {
            // No pending messages and no running turns: quiescent.
            break;
        };

        // Auto-spawn on first message.
        if !runtimes.contains_key(&agent_name) {
            let definition = definitions
                .get(&agent_name)
                .cloned()
                .ok_or_else(|| WorkflowError::AgentNotFound(agent_name.clone()))?;
            runtimes.insert(
                agent_name.clone(),
                ctx.factory.build(definition, &ctx.workflow_id),
            );
            tracing::debug!(agent = %agent_name, "auto-spawned on first fabric message");
        }

        let outcome = runtimes[&agent_name].handle_message(&input, &ctx.cancel).await;
        turns += 1;
        ctx.progress
            .emit(ProgressEvent::AgentResponse {
                agent: agent_name.clone(),
                content: outcome.text.clone(),
            })
            .await;
        if agent_name == entry_name {
            entry_output = outcome.text.clone();
        }
        contributions.push(AgentContribution {
            agent: agent_name,
            output: outcome.text,
            kind: outcome.kind,
        });
    }

    Ok(PatternOutcome {
        status: if budget_hit {
            OutcomeStatus::Partial
        } else {
            OutcomeStatus::Complete
        },
        output: entry_output,
        contributions,
    })
}
