//! Double-brace variable interpolation for prompt templates.
//!
//! `{{user_query}}`, `{{previous}}`, `{{history}}`, plus any caller-supplied
//! variables. Unresolved placeholders are a validation error before
//! execution, not a runtime surprise.

use std::collections::HashMap;

use super::WorkflowError;

/// Placeholder names appearing in a template, in order of first appearance.
pub fn find_placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else { break };
        let name = after[..end].trim().to_string();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
        rest = &after[end + 2..];
    }
    names
}

/// Substitutes every `{{name}}` from `vars`; fails on the first unresolved name.
pub fn interpolate(
    template: &str,
    vars: &HashMap<String, String>,
) -> Result<String, WorkflowError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            // A dangling "{{" is literal text.
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let name = after[..end].trim();
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => return Err(WorkflowError::UnresolvedPlaceholder(name.to_string())),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_known_placeholders() {
        let out = interpolate(
            "Reverse: {{previous}} (asked: {{user_query}})",
            &vars(&[("previous", "HELLO"), ("user_query", "hello")]),
        )
        .unwrap();
        assert_eq!(out, "Reverse: HELLO (asked: hello)");
    }

    #[test]
    fn unresolved_placeholder_is_an_error() {
        let err = interpolate("{{missing}}", &vars(&[])).unwrap_err();
        assert!(matches!(err, WorkflowError::UnresolvedPlaceholder(name) if name == "missing"));
    }

    #[test]
    fn finds_placeholders_in_order_without_duplicates() {
        let names = find_placeholders("{{a}} then {{b}} then {{a}}");
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn dangling_braces_are_literal() {
        let out = interpolate("open {{ and stop", &vars(&[])).unwrap();
        assert_eq!(out, "open {{ and stop");
    }

    #[test]
    fn whitespace_inside_braces_is_tolerated() {
        let out = interpolate("{{ previous }}", &vars(&[("previous", "x")])).unwrap();
        assert_eq!(out, "x");
    }
}
