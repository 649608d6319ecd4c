//! Workflow validation: structural checks, template placeholder resolution,
//! and operator-facing warnings.

use std::collections::{HashMap, HashSet};

use super::{
    find_placeholders, PatternSpec, Workflow, WorkflowError, WorkflowSpec,
};

/// Placeholders every engine provides.
const BUILTIN_PLACEHOLDERS: [&str; 3] = ["user_query", "previous", "history"];

/// Non-fatal findings surfaced to the operator.
#[derive(Clone, Debug, Default)]
pub struct ValidationReport {
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Validates a workflow against the caller-supplied variables. Errors abort
/// before execution; warnings ride along in the report.
pub fn validate(
    workflow: &Workflow,
    variables: &HashMap<String, String>,
) -> Result<ValidationReport, WorkflowError> {
    let mut report = ValidationReport::default();
    let known: HashSet<&str> = BUILTIN_PLACEHOLDERS
        .iter()
        .copied()
        .chain(variables.keys().map(String::as_str))
        .collect();

    match &workflow.spec {
        WorkflowSpec::Pattern(pattern) => {
            validate_pattern(pattern, &known, &mut report)?;
        }
        WorkflowSpec::EventDriven(spec) => {
            if spec.agents.is_empty() {
                return Err(WorkflowError::Validation(
                    "event-driven workflow needs at least one agent".to_string(),
                ));
            }
            let names: Vec<String> = spec.agents.iter().map(|a| a.display_name()).collect();
            if !names.iter().any(|n| n == &spec.entrypoint) {
                return Err(WorkflowError::Validation(format!(
                    "entrypoint '{}' is not among the workflow's agents",
                    spec.entrypoint
                )));
            }
        }
    }
    Ok(report)
}

fn validate_pattern(
    pattern: &PatternSpec,
    known: &HashSet<&str>,
    report: &mut ValidationReport,
) -> Result<(), WorkflowError> {
    match pattern {
        PatternSpec::Pipeline { stages } => {
            if stages.is_empty() {
                return Err(WorkflowError::Validation("pipeline has no stages".to_string()));
            }
            for stage in stages {
                if let Some(prompt) = &stage.prompt {
                    check_placeholders(prompt, known, &format!("stage '{}'", stage.name))?;
                }
            }
        }
        PatternSpec::ForkJoin { agents, .. } => {
            if agents.is_empty() {
                return Err(WorkflowError::Validation("fork-join has no agents".to_string()));
            }
        }
        PatternSpec::Parallel { tasks, .. } => {
            if tasks.is_empty() {
                return Err(WorkflowError::Validation("parallel has no tasks".to_string()));
            }
            for task in tasks {
                check_placeholders(&task.prompt, known, &format!("task '{}'", task.name))?;
            }
        }
        PatternSpec::Debate { debaters, .. } => {
            if debaters.is_empty() {
                return Err(WorkflowError::Validation("debate has no debaters".to_string()));
            }
        }
        PatternSpec::Swarm {
            voters,
            confidence_threshold,
            ..
        } => {
            if voters.is_empty() {
                return Err(WorkflowError::Validation("swarm has no voters".to_string()));
            }
            if !(0.0..=1.0).contains(confidence_threshold) {
                return Err(WorkflowError::Validation(format!(
                    "confidence_threshold {} is outside [0, 1]",
                    confidence_threshold
                )));
            }
            // Operator confirmation flag: swarm support is newer than the
            // other patterns.
            report.warn("workflow uses the swarm pattern; confirm swarm support is intended");
        }
        PatternSpec::Conditional { branches, .. } => {
            if branches.is_empty() {
                return Err(WorkflowError::Validation(
                    "conditional has no branches".to_string(),
                ));
            }
        }
        PatternSpec::Iterative { max_iterations, .. } => {
            if *max_iterations == 0 {
                return Err(WorkflowError::Validation(
                    "iterative max_iterations must be at least 1".to_string(),
                ));
            }
        }
    }
    Ok(())
}

fn check_placeholders(
    template: &str,
    known: &HashSet<&str>,
    where_: &str,
) -> Result<(), WorkflowError> {
    for name in find_placeholders(template) {
        if !known.contains(name.as_str()) {
            tracing::debug!(placeholder = %name, location = %where_, "unresolved placeholder");
            return Err(WorkflowError::UnresolvedPlaceholder(name));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentDefinition;
    use crate::workflow::{AgentRef, EventDrivenSpec, Stage, SwarmStrategy};

    fn inline(name: &str) -> AgentRef {
        AgentRef::Inline(Box::new(AgentDefinition::new(name, "sys")))
    }

    /// **Scenario**: an unresolved placeholder fails validation before any
    /// execution happens.
    #[test]
    fn unresolved_placeholder_fails() {
        let workflow = Workflow::pattern(
            "p",
            PatternSpec::Pipeline {
                stages: vec![Stage {
                    name: "s1".to_string(),
                    agent: inline("a"),
                    prompt: Some("use {{undeclared}}".to_string()),
                    non_fatal: false,
                }],
            },
        );
        let err = validate(&workflow, &HashMap::new()).unwrap_err();
        assert!(matches!(err, WorkflowError::UnresolvedPlaceholder(_)));
    }

    /// **Scenario**: caller-supplied variables satisfy custom placeholders.
    #[test]
    fn caller_variables_resolve() {
        let workflow = Workflow::pattern(
            "p",
            PatternSpec::Pipeline {
                stages: vec![Stage {
                    name: "s1".to_string(),
                    agent: inline("a"),
                    prompt: Some("{{previous}} in {{language}}".to_string()),
                    non_fatal: false,
                }],
            },
        );
        let vars = HashMap::from([("language".to_string(), "French".to_string())]);
        assert!(validate(&workflow, &vars).is_ok());
    }

    /// **Scenario**: swarm workflows validate with an operator warning.
    #[test]
    fn swarm_gets_confirmation_warning() {
        let workflow = Workflow::pattern(
            "s",
            PatternSpec::Swarm {
                voters: vec![inline("v1")],
                judge: None,
                strategy: SwarmStrategy::Majority,
                confidence_threshold: 0.5,
                share_votes: false,
            },
        );
        let report = validate(&workflow, &HashMap::new()).unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("swarm"));
    }

    #[test]
    fn empty_pipeline_rejected() {
        let workflow = Workflow::pattern("p", PatternSpec::Pipeline { stages: vec![] });
        assert!(validate(&workflow, &HashMap::new()).is_err());
    }

    #[test]
    fn event_driven_entrypoint_must_exist() {
        let workflow = Workflow::event_driven(
            "e",
            EventDrivenSpec {
                entrypoint: "missing".to_string(),
                agents: vec![inline("present")],
                communication: None,
            },
        );
        let err = validate(&workflow, &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("entrypoint"));
    }

    #[test]
    fn confidence_threshold_bounds_checked() {
        let workflow = Workflow::pattern(
            "s",
            PatternSpec::Swarm {
                voters: vec![inline("v")],
                judge: None,
                strategy: SwarmStrategy::Unanimous,
                confidence_threshold: 1.5,
                share_votes: false,
            },
        );
        assert!(validate(&workflow, &HashMap::new()).is_err());
    }
}
