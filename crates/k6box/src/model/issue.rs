use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Syntax,
    Import,
    Security,
    System,
    Environment,
    Performance,
    Network,
    Parameter,
}

/// Ranked severity. Declaration order is the ranking: `None < Low < ... < Critical`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Highest severity among `issues`, or `None` when there are none.
    pub fn max_of<'a>(issues: impl IntoIterator<Item = &'a ValidationIssue>) -> Self {
        issues
            .into_iter()
            .map(|issue| issue.severity)
            .max()
            .unwrap_or_default()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finding from static script analysis, output analysis or a gate error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub severity: Severity,
    pub message: String,
    pub suggestion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl ValidationIssue {
    pub fn new(
        issue_type: IssueType,
        severity: Severity,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            issue_type,
            severity,
            message: message.into(),
            suggestion: suggestion.into(),
            line: None,
        }
    }

    #[must_use]
    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_order_is_total() {
        assert!(Severity::None < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn max_of_empty_is_none() {
        assert_eq!(Severity::max_of(&Vec::new()), Severity::None);
    }

    #[test]
    fn max_of_picks_highest() {
        let issues = vec![
            ValidationIssue::new(IssueType::Syntax, Severity::Low, "a", "b"),
            ValidationIssue::new(IssueType::Import, Severity::High, "c", "d"),
            ValidationIssue::new(IssueType::Network, Severity::Medium, "e", "f"),
        ];
        assert_eq!(Severity::max_of(&issues), Severity::High);
    }
}
