//! Topic patterns for bus subscriptions.
//!
//! Topics are dotted segments (`workflow.step.1`). A pattern segment is a
//! literal, `*` (exactly one segment), or `**` (one or more remaining
//! segments, terminates the match).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("empty topic pattern")]
    Empty,
    #[error("empty segment in pattern: {0}")]
    EmptySegment(String),
    #[error("'**' must be the last segment: {0}")]
    TailNotLast(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*`: matches exactly one segment.
    Any,
    /// `**`: matches one or more remaining segments.
    Tail,
}

/// Parsed subscription pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicPattern {
    segments: Vec<Segment>,
    source: String,
}

impl TopicPattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Err(PatternError::Empty);
        }
        let mut segments = Vec::new();
        let parts: Vec<&str> = pattern.split('.').collect();
        for (i, part) in parts.iter().enumerate() {
            let seg = match *part {
                "" => return Err(PatternError::EmptySegment(pattern.to_string())),
                "*" => Segment::Any,
                "**" => {
                    if i != parts.len() - 1 {
                        return Err(PatternError::TailNotLast(pattern.to_string()));
                    }
                    Segment::Tail
                }
                literal => Segment::Literal(literal.to_string()),
            };
            segments.push(seg);
        }
        Ok(Self {
            segments,
            source: pattern.to_string(),
        })
    }

    /// Linear segment-by-segment comparison: `*` matches one segment and
    /// advances; `**` matches all remaining segments and terminates success.
    pub fn matches(&self, topic: &str) -> bool {
        let topic_segs: Vec<&str> = topic.split('.').collect();
        let mut ti = 0;
        for seg in &self.segments {
            match seg {
                Segment::Tail => {
                    // One or more remaining segments required.
                    return ti < topic_segs.len();
                }
                Segment::Any => {
                    if ti >= topic_segs.len() {
                        return false;
                    }
                    ti += 1;
                }
                Segment::Literal(lit) => {
                    if topic_segs.get(ti) != Some(&lit.as_str()) {
                        return false;
                    }
                    ti += 1;
                }
            }
        }
        ti == topic_segs.len()
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, topic: &str) -> bool {
        TopicPattern::parse(pattern).unwrap().matches(topic)
    }

    #[test]
    fn literal_patterns_match_exactly() {
        assert!(matches("workflow.step.1", "workflow.step.1"));
        assert!(!matches("workflow.step.1", "workflow.step.2"));
        assert!(!matches("workflow.step", "workflow.step.1"));
    }

    #[test]
    fn star_matches_exactly_one_segment() {
        assert!(matches("workflow.*.done", "workflow.step.done"));
        assert!(!matches("workflow.*.done", "workflow.done"));
        assert!(!matches("workflow.*", "workflow.a.b"));
    }

    #[test]
    fn double_star_matches_one_or_more_remaining() {
        assert!(matches("workflow.**", "workflow.a"));
        assert!(matches("workflow.**", "workflow.a.b.c"));
        assert!(!matches("workflow.**", "workflow"));
        assert!(matches("**", "anything.at.all"));
    }

    #[test]
    fn parse_rejects_malformed_patterns() {
        assert!(matches!(TopicPattern::parse(""), Err(PatternError::Empty)));
        assert!(matches!(
            TopicPattern::parse("a..b"),
            Err(PatternError::EmptySegment(_))
        ));
        assert!(matches!(
            TopicPattern::parse("a.**.b"),
            Err(PatternError::TailNotLast(_))
        ));
    }
}
