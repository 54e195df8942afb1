//! Persisted crawl schema handed to the code generator.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::OutputLanguage;
use crate::model::{InteractiveElement, LocatorCandidate, VerificationStatus};
use crate::Fingerprint;

pub const SCHEMA_VERSION: &str = "1.0";

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    Completed,
    BudgetExhausted,
    Aborted,
    Cancelled,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Completed => "completed",
            EndReason::BudgetExhausted => "budget-exhausted",
            EndReason::Aborted => "aborted",
            EndReason::Cancelled => "cancelled",
        }
    }

    /// Anything but a natural completion leaves the map partial.
    pub fn is_truncated(&self) -> bool {
        !matches!(self, EndReason::Completed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlCounters {
    pub states_discovered: usize,
    pub actions_executed: usize,
    pub actions_failed: usize,
    pub guardrail_rejections: usize,
    pub oracle_timeouts: usize,
    pub backtracks: usize,
    pub depth_clipped: usize,
    pub elements_verified: usize,
    pub elements_unverifiable: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    pub session_id: String,
    pub base_url: String,
    pub language: OutputLanguage,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub end_reason: EndReason,
    pub truncated: bool,
    pub counters: CrawlCounters,
}

/// A verified element as consumed by code generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaElement {
    pub index: usize,
    pub name: String,
    pub role: String,
    pub tag: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub section: String,
    /// Ranked, best first; the first entry is always verified
    pub candidates: Vec<LocatorCandidate>,
}

impl SchemaElement {
    /// Only verified elements make it into the hand-off.
    pub fn from_verified(element: &InteractiveElement) -> Option<Self> {
        if element.status != VerificationStatus::Verified {
            return None;
        }
        Some(Self {
            index: element.index,
            name: element.name.clone(),
            role: element.role.clone(),
            tag: element.tag.clone(),
            label: element.label.clone(),
            section: element.section.clone(),
            candidates: element.candidates.clone(),
        })
    }

    pub fn best(&self) -> Option<&LocatorCandidate> {
        self.candidates.first()
    }
}

/// Element whose candidates all failed verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedElement {
    pub index: usize,
    pub name: String,
    pub role: String,
    pub tag: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<LocatorCandidate>,
}

impl FlaggedElement {
    pub fn from_element(element: &InteractiveElement, reason: impl Into<String>) -> Self {
        Self {
            index: element.index,
            name: element.name.clone(),
            role: element.role.clone(),
            tag: element.tag.clone(),
            reason: reason.into(),
            candidates: element.candidates.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageActionStep {
    /// `fill` or `click`
    pub action: String,
    pub element: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

/// Higher-level method inferred from a group of elements, e.g. `login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageAction {
    pub name: String,
    pub params: Vec<String>,
    pub steps: Vec<PageActionStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    pub url: String,
    pub route: String,
    pub page_name: String,
    #[serde(default)]
    pub title: String,
    pub depth: u32,
    pub visits: u32,
    pub elements: Vec<SchemaElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unverifiable: Vec<FlaggedElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<PageAction>,
}

impl StateEntry {
    /// Copy handed to code generation: flagged elements keep their names but
    /// lose their failed candidates.
    pub fn page_model(&self) -> StateEntry {
        let mut model = self.clone();
        for flagged in &mut model.unverifiable {
            flagged.candidates.clear();
        }
        model
    }
}

/// Versioned, language-agnostic map of every state a session discovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlSchema {
    pub schema_version: String,
    pub metadata: SchemaMetadata,
    pub states: BTreeMap<Fingerprint, StateEntry>,
}

impl CrawlSchema {
    pub fn new(metadata: SchemaMetadata) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            metadata,
            states: BTreeMap::new(),
        }
    }

    pub fn finish(&mut self, reason: EndReason) {
        self.metadata.end_reason = reason;
        self.metadata.truncated = reason.is_truncated();
        self.metadata.finished_at = Some(Utc::now());
    }

    pub fn element_count(&self) -> usize {
        self.states.values().map(|s| s.elements.len()).sum()
    }

    pub fn unverifiable_count(&self) -> usize {
        self.states.values().map(|s| s.unverifiable.len()).sum()
    }

    /// Mean stability of each element's best candidate.
    pub fn average_confidence(&self) -> Option<f64> {
        let scores: Vec<f64> = self
            .states
            .values()
            .flat_map(|s| s.elements.iter())
            .filter_map(|e| e.best().map(|c| c.stability))
            .collect();
        if scores.is_empty() {
            return None;
        }
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::{Locator, StrategyKind};
    use pretty_assertions::assert_eq;

    fn metadata() -> SchemaMetadata {
        SchemaMetadata {
            session_id: "s-1".into(),
            base_url: "https://example.com".into(),
            language: OutputLanguage::Java,
            started_at: Utc::now(),
            finished_at: None,
            end_reason: EndReason::Completed,
            truncated: false,
            counters: CrawlCounters::default(),
        }
    }

    fn element(status: VerificationStatus) -> InteractiveElement {
        let mut el = InteractiveElement::new(0, 7, "button", "button");
        el.name = "signInButton".into();
        let mut candidate = LocatorCandidate::new(
            StrategyKind::RoleName,
            Locator::Role {
                role: "button".into(),
                name: "Sign In".into(),
            },
            0.9,
        );
        candidate.verified = status == VerificationStatus::Verified;
        el.candidates.push(candidate);
        el.status = status;
        el
    }

    #[test]
    fn only_verified_elements_are_handed_off() {
        assert!(SchemaElement::from_verified(&element(VerificationStatus::Verified)).is_some());
        assert!(SchemaElement::from_verified(&element(VerificationStatus::Unverifiable)).is_none());
        assert!(SchemaElement::from_verified(&element(VerificationStatus::Pending)).is_none());
    }

    #[test]
    fn finish_marks_truncation() {
        let mut schema = CrawlSchema::new(metadata());
        schema.finish(EndReason::BudgetExhausted);
        assert!(schema.metadata.truncated);
        assert!(schema.metadata.finished_at.is_some());
        schema.finish(EndReason::Completed);
        assert!(!schema.metadata.truncated);
    }

    #[test]
    fn json_carries_version_and_kebab_reasons() {
        let mut schema = CrawlSchema::new(metadata());
        schema.states.insert(
            Fingerprint("abc".into()),
            StateEntry {
                url: "https://example.com/".into(),
                route: "https://example.com".into(),
                page_name: "HomePage".into(),
                title: "Home".into(),
                depth: 0,
                visits: 1,
                elements: vec![SchemaElement::from_verified(&element(VerificationStatus::Verified)).unwrap()],
                unverifiable: Vec::new(),
                actions: Vec::new(),
            },
        );
        schema.finish(EndReason::BudgetExhausted);
        let json = schema.to_json_pretty().unwrap();
        assert!(json.contains("\"schema_version\": \"1.0\""));
        assert!(json.contains("\"budget-exhausted\""));
        assert!(json.contains("\"role-name\""));
        let back = CrawlSchema::from_json(&json).unwrap();
        assert_eq!(back.element_count(), 1);
        assert_eq!(back.average_confidence(), Some(0.9));
    }
}
