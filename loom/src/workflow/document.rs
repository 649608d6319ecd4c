//! Workflow and agent document parsing (Kubernetes-style YAML; JSON parses
//! through the same path).
//!
//! The format is open-extension: extra fields are tolerated but known fields
//! are validated. Unknown pattern types produce a validation error, never a
//! silent fallback. The deprecated `pattern:` key is accepted with a warning;
//! if both `pattern:` and `type:` are present and disagree the document is
//! rejected.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use serde_yaml::Value;

use crate::agent::{AgentConfig, AgentDefinition};
use crate::segmented::SegmentBudgets;

use super::{
    AgentRef, EventDrivenSpec, MergeStrategy, PatternSpec, Stage, SwarmStrategy, TaskSpec,
    Workflow, WorkflowConfig, WorkflowError, WorkflowSpec,
};

pub const API_VERSION: &str = "loom/v1";

/// Parse result: the workflow plus non-fatal findings.
#[derive(Debug)]
pub struct ParsedWorkflow {
    pub workflow: Workflow,
    pub warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DocHeader {
    #[serde(rename = "apiVersion")]
    api_version: String,
    kind: String,
    metadata: MetadataDoc,
    spec: Value,
}

#[derive(Debug, Deserialize)]
struct MetadataDoc {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    labels: HashMap<String, String>,
}

/// Fields a referring document may state alongside `path:`; explicitly
/// present fields override the loaded file.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AgentOverrides {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub tools: Option<Vec<String>>,
    #[serde(default)]
    pub subscriptions: Option<Vec<String>>,
    #[serde(default)]
    pub memory: Option<SegmentBudgets>,
    #[serde(default)]
    pub config: Option<AgentConfigDoc>,
}

impl AgentOverrides {
    fn apply(&self, mut base: AgentDefinition) -> AgentDefinition {
        if let Some(name) = &self.name {
            base.name = name.clone();
        }
        if let Some(prompt) = &self.system_prompt {
            base.system_prompt = prompt.clone();
        }
        if let Some(tools) = &self.tools {
            base.tools = tools.clone();
        }
        if let Some(subs) = &self.subscriptions {
            base.subscriptions = subs.clone();
        }
        if let Some(memory) = &self.memory {
            base.memory = memory.clone();
        }
        if let Some(config) = &self.config {
            base.config = config.apply(base.config);
        }
        base
    }
}

/// Document shape of agent runtime config; durations as seconds.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AgentConfigDoc {
    #[serde(default)]
    pub max_turns: Option<u32>,
    #[serde(default)]
    pub max_tool_executions: Option<u32>,
    #[serde(default)]
    pub enable_self_correction: Option<bool>,
    #[serde(default)]
    pub turn_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub llm_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub tool_concurrency: Option<usize>,
}

impl AgentConfigDoc {
    fn apply(&self, mut config: AgentConfig) -> AgentConfig {
        if let Some(v) = self.max_turns {
            config.max_turns = v;
        }
        if let Some(v) = self.max_tool_executions {
            config.max_tool_executions = v;
        }
        if let Some(v) = self.enable_self_correction {
            config.enable_self_correction = v;
        }
        if let Some(v) = self.turn_timeout_seconds {
            config.turn_timeout = Some(Duration::from_secs(v));
        }
        if let Some(v) = self.llm_timeout_seconds {
            config.llm_timeout = Some(Duration::from_secs(v));
        }
        if let Some(v) = self.tool_concurrency {
            config.tool_concurrency = v;
        }
        config
    }
}

fn doc_err(message: impl Into<String>) -> WorkflowError {
    WorkflowError::Document(message.into())
}

fn validation_err(message: impl Into<String>) -> WorkflowError {
    WorkflowError::Validation(message.into())
}

fn get<'a>(map: &'a Value, key: &str) -> Option<&'a Value> {
    map.get(key)
}

fn get_str(map: &Value, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

fn get_u64(map: &Value, key: &str) -> Option<u64> {
    map.get(key).and_then(Value::as_u64)
}

fn get_f64(map: &Value, key: &str) -> Option<f64> {
    map.get(key).and_then(Value::as_f64)
}

fn get_bool(map: &Value, key: &str) -> Option<bool> {
    map.get(key).and_then(Value::as_bool)
}

fn get_seq<'a>(map: &'a Value, key: &str) -> Option<&'a Vec<Value>> {
    map.get(key).and_then(Value::as_sequence)
}

/// Parses a workflow document from YAML (or JSON) text.
pub fn parse_workflow_str(text: &str) -> Result<ParsedWorkflow, WorkflowError> {
    let doc: DocHeader = serde_yaml::from_str(text).map_err(|e| doc_err(e.to_string()))?;
    if doc.kind != "Workflow" {
        return Err(validation_err(format!(
            "expected kind Workflow, got '{}'",
            doc.kind
        )));
    }
    let mut warnings = Vec::new();
    if doc.api_version != API_VERSION {
        warnings.push(format!(
            "apiVersion '{}' differs from '{}'",
            doc.api_version, API_VERSION
        ));
    }
    let spec = &doc.spec;
    if !spec.is_mapping() {
        return Err(validation_err("spec must be a mapping"));
    }

    let workflow_spec = if let Some(pattern_type) = pattern_type_of(spec, &mut warnings)? {
        WorkflowSpec::Pattern(parse_pattern(&pattern_type, spec)?)
    } else if get(spec, "entrypoint").is_some() {
        WorkflowSpec::EventDriven(parse_event_driven(spec)?)
    } else {
        return Err(validation_err(
            "spec needs either a pattern 'type' or an event-driven 'entrypoint'",
        ));
    };

    let workflow = Workflow {
        id: uuid::Uuid::new_v4().to_string(),
        name: doc.metadata.name,
        description: doc.metadata.description,
        labels: doc.metadata.labels,
        spec: workflow_spec,
        config: parse_workflow_config(spec),
    };
    Ok(ParsedWorkflow { workflow, warnings })
}

/// Resolves the pattern type from `type:` / deprecated `pattern:`.
fn pattern_type_of(spec: &Value, warnings: &mut Vec<String>) -> Result<Option<String>, WorkflowError> {
    let type_key = get_str(spec, "type");
    let pattern_key = get_str(spec, "pattern");
    match (type_key, pattern_key) {
        (Some(t), Some(p)) if t != p => Err(validation_err(format!(
            "'type' ({}) and deprecated 'pattern' ({}) disagree",
            t, p
        ))),
        (Some(t), Some(_)) => {
            warnings.push("'pattern' is deprecated; prefer 'type'".to_string());
            Ok(Some(t))
        }
        (Some(t), None) => Ok(Some(t)),
        (None, Some(p)) => {
            warnings.push("'pattern' is deprecated; prefer 'type'".to_string());
            Ok(Some(p))
        }
        (None, None) => Ok(None),
    }
}

fn parse_workflow_config(spec: &Value) -> WorkflowConfig {
    // Knobs may sit under `config:` or flat in the spec; nested wins.
    let source = get(spec, "config").filter(|v| v.is_mapping()).unwrap_or(spec);
    let mut config = WorkflowConfig::default();
    if let Some(secs) = get_u64(source, "timeout_seconds") {
        config.timeout = Some(Duration::from_secs(secs));
    }
    if let Some(turns) = get_u64(source, "max_workflow_turns") {
        config.max_workflow_turns = turns as u32;
    }
    if let Some(full) = get_bool(source, "pass_full_history") {
        config.pass_full_history = full;
    }
    if let Some(policy) = get_str(source, "failure") {
        if let Ok(parsed) = policy.parse() {
            config.failure = Some(parsed);
        }
    }
    config
}

fn parse_pattern(pattern_type: &str, spec: &Value) -> Result<PatternSpec, WorkflowError> {
    match pattern_type {
        "pipeline" => parse_pipeline(spec),
        "fork-join" | "fork_join" => parse_fork_join(spec),
        "parallel" => parse_parallel(spec),
        "debate" => parse_debate(spec),
        "swarm" => parse_swarm(spec),
        "conditional" => parse_conditional(spec),
        "iterative" => parse_iterative(spec),
        // Open extension tolerates unknown *fields*, never unknown types.
        other => Err(validation_err(format!("unknown pattern type '{}'", other))),
    }
}

fn parse_agent_ref(value: &Value) -> Result<AgentRef, WorkflowError> {
    if let Some(id) = value.as_str() {
        return Ok(AgentRef::Registry(id.to_string()));
    }
    if !value.is_mapping() {
        return Err(validation_err("agent reference must be a string or mapping"));
    }
    if let Some(path) = get_str(value, "path") {
        let overrides: AgentOverrides =
            serde_yaml::from_value(value.clone()).map_err(|e| doc_err(e.to_string()))?;
        return Ok(AgentRef::Path {
            path: PathBuf::from(path),
            overrides: Box::new(overrides),
        });
    }
    let name = get_str(value, "name")
        .ok_or_else(|| validation_err("inline agent needs a 'name'"))?;
    let mut definition = AgentDefinition::new(name, get_str(value, "system_prompt").unwrap_or_default());
    if let Some(tools) = get_seq(value, "tools") {
        definition.tools = tools
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }
    if let Some(subs) = get_seq(value, "subscriptions") {
        definition.subscriptions = subs
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }
    if let Some(memory) = get(value, "memory") {
        definition.memory =
            serde_yaml::from_value(memory.clone()).map_err(|e| doc_err(e.to_string()))?;
    }
    if let Some(config) = get(value, "config") {
        let doc: AgentConfigDoc =
            serde_yaml::from_value(config.clone()).map_err(|e| doc_err(e.to_string()))?;
        definition.config = doc.apply(definition.config);
    }
    Ok(AgentRef::Inline(Box::new(definition)))
}

fn parse_pipeline(spec: &Value) -> Result<PatternSpec, WorkflowError> {
    let stages = get_seq(spec, "stages")
        .ok_or_else(|| validation_err("pipeline needs 'stages'"))?;
    let mut parsed = Vec::with_capacity(stages.len());
    for (i, stage) in stages.iter().enumerate() {
        let agent_value = get(stage, "agent")
            .ok_or_else(|| validation_err(format!("stage {} needs an 'agent'", i)))?;
        let agent = parse_agent_ref(agent_value)?;
        parsed.push(Stage {
            name: get_str(stage, "name").unwrap_or_else(|| format!("stage-{}", i + 1)),
            agent,
            prompt: get_str(stage, "prompt"),
            non_fatal: get_bool(stage, "non_fatal").unwrap_or(false),
        });
    }
    Ok(PatternSpec::Pipeline { stages: parsed })
}

fn parse_agent_list(spec: &Value, key: &str) -> Result<Vec<AgentRef>, WorkflowError> {
    let seq = get_seq(spec, key)
        .ok_or_else(|| validation_err(format!("missing '{}' list", key)))?;
    seq.iter().map(parse_agent_ref).collect()
}

fn parse_fork_join(spec: &Value) -> Result<PatternSpec, WorkflowError> {
    let agents = parse_agent_list(spec, "agents")?;
    let merge = get_str(spec, "merge_strategy")
        .or_else(|| get_str(spec, "merge"))
        .unwrap_or_else(|| "concatenate".to_string());
    let merge = MergeStrategy::from_str(&merge).map_err(validation_err)?;
    Ok(PatternSpec::ForkJoin { agents, merge })
}

fn parse_parallel(spec: &Value) -> Result<PatternSpec, WorkflowError> {
    let tasks = get_seq(spec, "tasks")
        .ok_or_else(|| validation_err("parallel needs 'tasks'"))?;
    let mut parsed = Vec::with_capacity(tasks.len());
    for (i, task) in tasks.iter().enumerate() {
        let agent_value = get(task, "agent")
            .ok_or_else(|| validation_err(format!("task {} needs an 'agent'", i)))?;
        parsed.push(TaskSpec {
            name: get_str(task, "name").unwrap_or_else(|| format!("task-{}", i + 1)),
            agent: parse_agent_ref(agent_value)?,
            prompt: get_str(task, "prompt")
                .ok_or_else(|| validation_err(format!("task {} needs a 'prompt'", i)))?,
        });
    }
    let merge = get_str(spec, "merge_strategy")
        .or_else(|| get_str(spec, "merge"))
        .unwrap_or_else(|| "concatenate".to_string());
    let merge = MergeStrategy::from_str(&merge).map_err(validation_err)?;
    Ok(PatternSpec::Parallel {
        tasks: parsed,
        merge,
    })
}

fn parse_debate(spec: &Value) -> Result<PatternSpec, WorkflowError> {
    let debaters = parse_agent_list(spec, "debaters")?;
    let moderator_value = get(spec, "moderator")
        .ok_or_else(|| validation_err("debate needs a 'moderator'"))?;
    Ok(PatternSpec::Debate {
        debaters,
        moderator: parse_agent_ref(moderator_value)?,
        rounds: get_u64(spec, "rounds").unwrap_or(1) as u32,
    })
}

fn parse_swarm(spec: &Value) -> Result<PatternSpec, WorkflowError> {
    let voters = parse_agent_list(spec, "voters")?;
    let judge = match get(spec, "judge") {
        Some(value) => Some(parse_agent_ref(value)?),
        None => None,
    };
    let strategy = get_str(spec, "strategy").unwrap_or_else(|| "majority".to_string());
    let strategy = SwarmStrategy::from_str(&strategy).map_err(validation_err)?;
    Ok(PatternSpec::Swarm {
        voters,
        judge,
        strategy,
        confidence_threshold: get_f64(spec, "confidence_threshold").unwrap_or(0.0),
        share_votes: get_bool(spec, "share_votes").unwrap_or(false),
    })
}

fn parse_conditional(spec: &Value) -> Result<PatternSpec, WorkflowError> {
    let classifier_value = get(spec, "classifier")
        .ok_or_else(|| validation_err("conditional needs a 'classifier'"))?;
    let branches_value = get(spec, "branches")
        .and_then(Value::as_mapping)
        .ok_or_else(|| validation_err("conditional needs a 'branches' mapping"))?;

    let mut branches = BTreeMap::new();
    for (label, value) in branches_value {
        let label = label
            .as_str()
            .ok_or_else(|| validation_err("branch labels must be strings"))?
            .to_string();
        // The contract allows nested sub-workflows here; this implementation
        // supports single-agent branches and rejects workflow documents.
        if value.get("kind").and_then(Value::as_str) == Some("Workflow")
            || value.get("spec").is_some()
        {
            return Err(validation_err(format!(
                "branch '{}' is a nested workflow; only single-agent branches are supported",
                label
            )));
        }
        branches.insert(label, parse_agent_ref(value)?);
    }
    Ok(PatternSpec::Conditional {
        classifier: parse_agent_ref(classifier_value)?,
        branches,
    })
}

fn parse_iterative(spec: &Value) -> Result<PatternSpec, WorkflowError> {
    let body_value = get(spec, "body")
        .or_else(|| get(spec, "agent"))
        .ok_or_else(|| validation_err("iterative needs a 'body' agent"))?;
    Ok(PatternSpec::Iterative {
        body: parse_agent_ref(body_value)?,
        max_iterations: get_u64(spec, "max_iterations").unwrap_or(3) as u32,
        restart_if_contains: get_str(spec, "restart_if_contains"),
    })
}

fn parse_event_driven(spec: &Value) -> Result<EventDrivenSpec, WorkflowError> {
    let entrypoint = get_str(spec, "entrypoint")
        .ok_or_else(|| validation_err("event-driven spec needs 'entrypoint'"))?;
    let agents = parse_agent_list(spec, "agents")?;
    Ok(EventDrivenSpec {
        entrypoint,
        agents,
        communication: get_str(spec, "communication"),
    })
}

/// Parses an agent document (kind: Agent) into a definition.
pub fn parse_agent_str(text: &str) -> Result<AgentDefinition, WorkflowError> {
    let doc: DocHeader = serde_yaml::from_str(text).map_err(|e| doc_err(e.to_string()))?;
    if doc.kind != "Agent" {
        return Err(validation_err(format!(
            "expected kind Agent, got '{}'",
            doc.kind
        )));
    }
    let spec = &doc.spec;
    let mut definition = AgentDefinition::new(
        doc.metadata.name,
        get_str(spec, "system_prompt").unwrap_or_default(),
    );
    if let Some(tools) = get_seq(spec, "tools") {
        definition.tools = tools
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }
    if let Some(subs) = get_seq(spec, "subscriptions") {
        definition.subscriptions = subs
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }
    if let Some(memory) = get(spec, "memory") {
        definition.memory =
            serde_yaml::from_value(memory.clone()).map_err(|e| doc_err(e.to_string()))?;
    }
    if let Some(config) = get(spec, "config") {
        let doc: AgentConfigDoc =
            serde_yaml::from_value(config.clone()).map_err(|e| doc_err(e.to_string()))?;
        definition.config = doc.apply(definition.config);
    }
    Ok(definition)
}

/// Resolves an agent reference to a concrete definition.
///
/// Relative paths resolve against `base_dir` (the containing document's
/// directory); fields present in the referring document override the loaded
/// file.
pub fn resolve_agent_ref(
    agent_ref: &AgentRef,
    base_dir: &Path,
    registry: &HashMap<String, AgentDefinition>,
) -> Result<AgentDefinition, WorkflowError> {
    match agent_ref {
        AgentRef::Inline(def) => Ok(def.as_ref().clone()),
        AgentRef::Registry(id) => registry
            .get(id)
            .cloned()
            .ok_or_else(|| WorkflowError::AgentNotFound(id.clone())),
        AgentRef::Path { path, overrides } => {
            let full = if path.is_absolute() {
                path.clone()
            } else {
                base_dir.join(path)
            };
            let text = std::fs::read_to_string(&full)
                .map_err(|e| doc_err(format!("cannot read {}: {}", full.display(), e)))?;
            let base = parse_agent_str(&text)?;
            Ok(overrides.apply(base))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIPELINE_DOC: &str = r#"
apiVersion: loom/v1
kind: Workflow
metadata:
  name: shout-then-reverse
spec:
  type: pipeline
  config:
    timeout_seconds: 30
    pass_full_history: true
  stages:
    - name: shout
      agent:
        name: shouter
        system_prompt: Echo the input uppercased
    - name: reverse
      agent: reverser
      prompt: "Reverse: {{previous}}"
      non_fatal: true
"#;

    /// **Scenario**: a pipeline document parses stages, inline and registry
    /// agents, prompts, and config knobs.
    #[test]
    fn parses_pipeline_document() {
        let parsed = parse_workflow_str(PIPELINE_DOC).unwrap();
        assert!(parsed.warnings.is_empty());
        let workflow = parsed.workflow;
        assert_eq!(workflow.name, "shout-then-reverse");
        assert_eq!(workflow.config.timeout, Some(Duration::from_secs(30)));
        assert!(workflow.config.pass_full_history);

        let WorkflowSpec::Pattern(PatternSpec::Pipeline { stages }) = &workflow.spec else {
            panic!("expected pipeline");
        };
        assert_eq!(stages.len(), 2);
        assert!(matches!(stages[0].agent, AgentRef::Inline(_)));
        assert!(matches!(stages[1].agent, AgentRef::Registry(_)));
        assert_eq!(stages[1].prompt.as_deref(), Some("Reverse: {{previous}}"));
        assert!(stages[1].non_fatal);
    }

    /// **Scenario**: the deprecated `pattern:` key parses with a warning.
    #[test]
    fn deprecated_pattern_key_warns() {
        let doc = r#"
apiVersion: loom/v1
kind: Workflow
metadata: { name: legacy }
spec:
  pattern: fork-join
  agents: [a, b]
  merge_strategy: concatenate
"#;
        let parsed = parse_workflow_str(doc).unwrap();
        assert_eq!(parsed.warnings.len(), 1);
        assert!(parsed.warnings[0].contains("deprecated"));
    }

    /// **Scenario**: disagreeing `type:` and `pattern:` is a hard error.
    #[test]
    fn disagreeing_type_keys_rejected() {
        let doc = r#"
apiVersion: loom/v1
kind: Workflow
metadata: { name: confused }
spec:
  type: pipeline
  pattern: debate
  stages: []
"#;
        let err = parse_workflow_str(doc).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert!(err.to_string().contains("disagree"));
    }

    /// **Scenario**: unknown pattern types are a validation error, not a fallback.
    #[test]
    fn unknown_pattern_type_rejected() {
        let doc = r#"
apiVersion: loom/v1
kind: Workflow
metadata: { name: nope }
spec:
  type: roundtable
"#;
        let err = parse_workflow_str(doc).unwrap_err();
        assert!(err.to_string().contains("unknown pattern type"));
    }

    /// **Scenario**: extra fields are tolerated (open extension).
    #[test]
    fn extra_fields_tolerated() {
        let doc = r#"
apiVersion: loom/v1
kind: Workflow
metadata: { name: extra }
spec:
  type: iterative
  body: { name: worker, system_prompt: Work. }
  max_iterations: 5
  some_future_field: { nested: true }
"#;
        let parsed = parse_workflow_str(doc).unwrap();
        let WorkflowSpec::Pattern(PatternSpec::Iterative { max_iterations, .. }) =
            &parsed.workflow.spec
        else {
            panic!("expected iterative");
        };
        assert_eq!(*max_iterations, 5);
    }

    /// **Scenario**: a nested workflow in a conditional branch is rejected
    /// with a message naming the branch.
    #[test]
    fn nested_workflow_branch_rejected() {
        let doc = r#"
apiVersion: loom/v1
kind: Workflow
metadata: { name: router }
spec:
  type: conditional
  classifier: { name: classify, system_prompt: Pick a label. }
  branches:
    simple: { name: worker, system_prompt: Work. }
    complex:
      kind: Workflow
      spec: { type: pipeline, stages: [] }
"#;
        let err = parse_workflow_str(doc).unwrap_err();
        assert!(err.to_string().contains("complex"));
        assert!(err.to_string().contains("nested workflow"));
    }

    /// **Scenario**: event-driven specs parse entrypoint, agents, and
    /// communication metadata.
    #[test]
    fn parses_event_driven_document() {
        let doc = r#"
apiVersion: loom/v1
kind: Workflow
metadata: { name: chatroom }
spec:
  entrypoint: host
  communication: peer-to-peer-pub-sub
  max_workflow_turns: 12
  agents:
    - name: host
      system_prompt: Kick things off.
      subscriptions: [chat.replies]
    - name: guest
      system_prompt: Reply to chat.
      subscriptions: [chat.room]
"#;
        let parsed = parse_workflow_str(doc).unwrap();
        let WorkflowSpec::EventDriven(spec) = &parsed.workflow.spec else {
            panic!("expected event-driven");
        };
        assert_eq!(spec.entrypoint, "host");
        assert_eq!(spec.agents.len(), 2);
        assert_eq!(spec.communication.as_deref(), Some("peer-to-peer-pub-sub"));
        assert_eq!(parsed.workflow.config.max_workflow_turns, 12);
    }

    /// **Scenario**: agent documents parse and path refs resolve with
    /// referring-document overrides winning.
    #[test]
    fn agent_path_resolution_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("critic.yaml"),
            r#"
apiVersion: loom/v1
kind: Agent
metadata: { name: critic }
spec:
  system_prompt: Critique harshly.
  tools: [search]
  config: { max_turns: 7 }
"#,
        )
        .unwrap();

        let base = parse_agent_str(
            &std::fs::read_to_string(dir.path().join("critic.yaml")).unwrap(),
        )
        .unwrap();
        assert_eq!(base.config.max_turns, 7);
        assert_eq!(base.tools, vec!["search"]);

        let agent_ref = AgentRef::Path {
            path: PathBuf::from("critic.yaml"),
            overrides: Box::new(AgentOverrides {
                system_prompt: Some("Critique gently.".to_string()),
                ..Default::default()
            }),
        };
        let resolved = resolve_agent_ref(&agent_ref, dir.path(), &HashMap::new()).unwrap();
        assert_eq!(resolved.name, "critic");
        assert_eq!(resolved.system_prompt, "Critique gently.");
        assert_eq!(resolved.tools, vec!["search"]);
    }

    #[test]
    fn registry_resolution_reports_missing_agent() {
        let err = resolve_agent_ref(
            &AgentRef::Registry("ghost".to_string()),
            Path::new("."),
            &HashMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::AgentNotFound(_)));
    }
}
