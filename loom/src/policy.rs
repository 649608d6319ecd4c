//! Per-message-type routing rules: inline value vs content-addressed reference.
//!
//! The fabric consults [`PolicyManager::decide`] before every payload it
//! carries. Auto-promotion is strict greater-than: a payload exactly at the
//! threshold stays inline.

use std::time::Duration;

use dashmap::DashMap;

use crate::payload::{
    MSG_ACK, MSG_CONTROL, MSG_GENERAL, MSG_SESSION_STATE, MSG_STATUS, MSG_TOOL_RESULT,
    MSG_WORKFLOW_CONTEXT,
};

/// How payloads of one message type are routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoutingMode {
    AlwaysValue,
    AlwaysReference,
    /// Reference iff payload size strictly exceeds the rule's threshold.
    AutoPromote,
}

/// Outcome of one routing decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoutingDecision {
    Value,
    Reference,
}

/// Routing rule for one message type.
#[derive(Clone, Debug)]
pub struct PolicyRule {
    pub mode: RoutingMode,
    pub size_threshold: usize,
    /// TTL applied to blobs this rule sends to the reference store.
    pub ttl: Option<Duration>,
}

impl PolicyRule {
    pub fn always_value() -> Self {
        Self {
            mode: RoutingMode::AlwaysValue,
            size_threshold: 0,
            ttl: None,
        }
    }

    pub fn always_reference() -> Self {
        Self {
            mode: RoutingMode::AlwaysReference,
            size_threshold: 0,
            ttl: None,
        }
    }

    pub fn auto_promote(size_threshold: usize) -> Self {
        Self {
            mode: RoutingMode::AutoPromote,
            size_threshold,
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Auto-promote threshold applied to `tool_result` and `general` by default.
pub const DEFAULT_AUTO_PROMOTE_THRESHOLD: usize = 10 * 1024;

/// Mapping from message type to routing rule.
///
/// **Interaction**: Shared by the fabric and the tool executor (large tool
/// results consult the `tool_result` rule). Rules are replaceable at runtime.
pub struct PolicyManager {
    rules: DashMap<String, PolicyRule>,
    default_rule: PolicyRule,
}

impl PolicyManager {
    /// Policy with the default bindings: session state and workflow context
    /// always by reference; tool results and general traffic auto-promoted at
    /// 10 KiB; control/ack/status always inline.
    pub fn new() -> Self {
        let rules = DashMap::new();
        rules.insert(MSG_SESSION_STATE.to_string(), PolicyRule::always_reference());
        rules.insert(
            MSG_WORKFLOW_CONTEXT.to_string(),
            PolicyRule::always_reference(),
        );
        rules.insert(
            MSG_TOOL_RESULT.to_string(),
            PolicyRule::auto_promote(DEFAULT_AUTO_PROMOTE_THRESHOLD),
        );
        rules.insert(
            MSG_GENERAL.to_string(),
            PolicyRule::auto_promote(DEFAULT_AUTO_PROMOTE_THRESHOLD),
        );
        rules.insert(MSG_CONTROL.to_string(), PolicyRule::always_value());
        rules.insert(MSG_ACK.to_string(), PolicyRule::always_value());
        rules.insert(MSG_STATUS.to_string(), PolicyRule::always_value());
        Self {
            rules,
            default_rule: PolicyRule::auto_promote(DEFAULT_AUTO_PROMOTE_THRESHOLD),
        }
    }

    /// Replaces (or installs) the rule for a message type.
    pub fn set_rule(&self, message_type: impl Into<String>, rule: PolicyRule) {
        self.rules.insert(message_type.into(), rule);
    }

    /// The rule that would govern a message type (default rule for unknown types).
    pub fn rule(&self, message_type: &str) -> PolicyRule {
        self.rules
            .get(message_type)
            .map(|r| r.clone())
            .unwrap_or_else(|| self.default_rule.clone())
    }

    /// Routes one payload: VALUE or REFERENCE.
    pub fn decide(&self, message_type: &str, payload_size: usize) -> RoutingDecision {
        let rule = self.rule(message_type);
        match rule.mode {
            RoutingMode::AlwaysValue => RoutingDecision::Value,
            RoutingMode::AlwaysReference => RoutingDecision::Reference,
            RoutingMode::AutoPromote => {
                if payload_size > rule.size_threshold {
                    RoutingDecision::Reference
                } else {
                    RoutingDecision::Value
                }
            }
        }
    }
}

impl Default for PolicyManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: default bindings route each well-known type as specified.
    #[test]
    fn default_bindings() {
        let policy = PolicyManager::new();
        assert_eq!(
            policy.decide(MSG_SESSION_STATE, 1),
            RoutingDecision::Reference
        );
        assert_eq!(
            policy.decide(MSG_WORKFLOW_CONTEXT, 1),
            RoutingDecision::Reference
        );
        assert_eq!(policy.decide(MSG_CONTROL, 1 << 30), RoutingDecision::Value);
        assert_eq!(policy.decide(MSG_ACK, 1 << 30), RoutingDecision::Value);
        assert_eq!(policy.decide(MSG_STATUS, 1 << 30), RoutingDecision::Value);
    }

    /// **Scenario**: exactly at the auto-promote threshold stays VALUE; one
    /// byte over becomes REFERENCE.
    #[test]
    fn auto_promote_is_strict_greater_than() {
        let policy = PolicyManager::new();
        assert_eq!(
            policy.decide(MSG_TOOL_RESULT, DEFAULT_AUTO_PROMOTE_THRESHOLD),
            RoutingDecision::Value
        );
        assert_eq!(
            policy.decide(MSG_TOOL_RESULT, DEFAULT_AUTO_PROMOTE_THRESHOLD + 1),
            RoutingDecision::Reference
        );
    }

    /// **Scenario**: unknown message types fall back to the general rule.
    #[test]
    fn unknown_type_uses_default_rule() {
        let policy = PolicyManager::new();
        assert_eq!(policy.decide("telemetry", 1), RoutingDecision::Value);
        assert_eq!(
            policy.decide("telemetry", DEFAULT_AUTO_PROMOTE_THRESHOLD + 1),
            RoutingDecision::Reference
        );
    }

    /// **Scenario**: set_rule replaces routing at runtime.
    #[test]
    fn set_rule_overrides() {
        let policy = PolicyManager::new();
        policy.set_rule(MSG_TOOL_RESULT, PolicyRule::always_reference());
        assert_eq!(policy.decide(MSG_TOOL_RESULT, 1), RoutingDecision::Reference);
    }
}
