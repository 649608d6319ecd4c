//! Workflow-boundary failure shapes.
//!
//! Subsystems carry their own `thiserror` enums; everything that crosses the
//! workflow boundary is converted into a [`Terminal`] value with a
//! [`FailureKind`]. No error type leaks past the orchestrator.

use serde::{Deserialize, Serialize};

/// Classification of a failure, driving the propagation policy:
/// transient errors retry locally, backend errors surface to the agent,
/// budget exhaustion surfaces to the workflow as non-fatal, fatal aborts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    NotFound,
    BudgetExceeded,
    Transient,
    Backend,
    Cancelled,
    Fatal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::NotFound => "not_found",
            FailureKind::BudgetExceeded => "budget_exceeded",
            FailureKind::Transient => "transient",
            FailureKind::Backend => "backend",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Fatal => "fatal",
        }
    }
}

/// Final status of a run or stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Completed,
    Partial,
    Failed,
}

/// Machine-readable terminal produced for every failure mode.
///
/// **Interaction**: Pattern engines and the agent runtime construct these;
/// the orchestrator attaches them to `WorkflowResult` and progress events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Terminal {
    pub status: TerminalStatus,
    pub kind: FailureKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    /// Where in the workflow the failure happened (stage, agent, tool).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<String>,
}

impl Terminal {
    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            status: TerminalStatus::Failed,
            kind,
            message: message.into(),
            cause: None,
            span: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_span(mut self, span: impl Into<String>) -> Self {
        self.span = Some(span.into());
        self
    }
}

impl std::fmt::Display for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)?;
        if let Some(span) = &self.span {
            write!(f, " (at {})", span)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_display_includes_kind_and_span() {
        let t = Terminal::failed(FailureKind::BudgetExceeded, "turn budget exhausted")
            .with_span("stage:draft");
        let s = t.to_string();
        assert!(s.contains("budget_exceeded"));
        assert!(s.contains("stage:draft"));
    }

    #[test]
    fn kind_serializes_snake_case() {
        let v = serde_json::to_value(FailureKind::NotFound).unwrap();
        assert_eq!(v, "not_found");
    }
}
