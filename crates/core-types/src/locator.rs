//! Structured locators and the strategy kinds that produce them

use std::fmt;

use serde::{Deserialize, Serialize};

/// Locator strategy enumeration
///
/// Declared from most to least resilient; the derived ordering is the
/// strategy priority used for tie-breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Dedicated test/automation identifier attribute
    TestId,

    /// ARIA role plus computed accessible name
    RoleName,

    /// Stable visible text content
    Text,

    /// Minimal structural path anchored on a stable ancestor
    AnchoredPath,

    /// Absolute structural path from the document root
    AbsolutePath,
}

impl StrategyKind {
    /// Get strategy name as string
    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::TestId => "test-id",
            StrategyKind::RoleName => "role-name",
            StrategyKind::Text => "text",
            StrategyKind::AnchoredPath => "anchored-path",
            StrategyKind::AbsolutePath => "absolute-path",
        }
    }

    /// Lower is more resilient.
    pub fn priority(&self) -> u8 {
        *self as u8
    }

    /// Stability estimate before any verification has happened.
    pub fn prior_stability(&self) -> f64 {
        match self {
            StrategyKind::TestId => 0.95,
            StrategyKind::RoleName => 0.85,
            StrategyKind::Text => 0.70,
            StrategyKind::AnchoredPath => 0.55,
            StrategyKind::AbsolutePath => 0.30,
        }
    }

    /// Get all strategies in resilience order
    pub fn resilience_order() -> [StrategyKind; 5] {
        [
            StrategyKind::TestId,
            StrategyKind::RoleName,
            StrategyKind::Text,
            StrategyKind::AnchoredPath,
            StrategyKind::AbsolutePath,
        ]
    }
}

/// Attribute equality constraint on a path step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeMatch {
    pub name: String,
    pub value: String,
}

/// One hop of a structural path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathStep {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<AttributeMatch>,
    /// 1-based position among same-tag siblings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nth_of_type: Option<usize>,
}

impl PathStep {
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            id: None,
            attributes: Vec::new(),
            nth_of_type: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(AttributeMatch {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_nth(mut self, nth: usize) -> Self {
        self.nth_of_type = Some(nth);
        self
    }

    fn css(&self) -> String {
        let mut out = self.tag.clone();
        if let Some(id) = &self.id {
            out.push('#');
            out.push_str(id);
        }
        for attr in &self.attributes {
            out.push_str(&format!("[{}=\"{}\"]", attr.name, escape(&attr.value)));
        }
        if let Some(nth) = self.nth_of_type {
            out.push_str(&format!(":nth-of-type({nth})"));
        }
        out
    }
}

/// A way of finding an element again, independent of any driver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Locator {
    TestId { attribute: String, value: String },
    Role { role: String, name: String },
    Text { text: String },
    /// `anchored == false` means the first step is a document root.
    Path { anchored: bool, steps: Vec<PathStep> },
}

impl Locator {
    /// Rendered expression handed to code generation.
    pub fn expression(&self) -> String {
        match self {
            Locator::TestId { attribute, value } => {
                format!("[{}=\"{}\"]", attribute, escape(value))
            }
            Locator::Role { role, name } => format!("role={}[name=\"{}\"]", role, escape(name)),
            Locator::Text { text } => format!("text=\"{}\"", escape(text)),
            Locator::Path { steps, .. } => steps
                .iter()
                .map(PathStep::css)
                .collect::<Vec<_>>()
                .join(" > "),
        }
    }

    /// Semantic locators are preferred over structural ones on ties.
    pub fn is_semantic(&self) -> bool {
        !matches!(self, Locator::Path { .. })
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression())
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_order() {
        let order = StrategyKind::resilience_order();
        assert_eq!(order[0], StrategyKind::TestId);
        assert_eq!(order[4], StrategyKind::AbsolutePath);
        assert!(StrategyKind::TestId < StrategyKind::RoleName);
        assert!(StrategyKind::RoleName.prior_stability() > StrategyKind::Text.prior_stability());
    }

    #[test]
    fn test_expressions() {
        let test_id = Locator::TestId {
            attribute: "data-testid".into(),
            value: "login-submit".into(),
        };
        assert_eq!(test_id.expression(), "[data-testid=\"login-submit\"]");

        let role = Locator::Role {
            role: "button".into(),
            name: "Sign In".into(),
        };
        assert_eq!(role.expression(), "role=button[name=\"Sign In\"]");

        let path = Locator::Path {
            anchored: true,
            steps: vec![
                PathStep::tag("form").with_id("login"),
                PathStep::tag("input").with_attribute("name", "username"),
            ],
        };
        assert_eq!(path.expression(), "form#login > input[name=\"username\"]");
        assert!(!path.is_semantic());
    }

    #[test]
    fn test_text_quotes_are_escaped() {
        let text = Locator::Text {
            text: "Say \"hi\"".into(),
        };
        assert_eq!(text.expression(), "text=\"Say \\\"hi\\\"\"");
    }
}
