//! Page, element, candidate and action model.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::CrawlError;
use crate::locator::{Locator, StrategyKind};
use crate::Fingerprint;

/// Element bounding box in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Distance between the two centres.
    pub fn center_distance(&self, other: &BoundingBox) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    /// Coordinates snapped to a grid, used to keep observations compact.
    pub fn snapped(&self, grid: f64) -> BoundingBox {
        let snap = |v: f64| (v / grid).round() * grid;
        BoundingBox::new(snap(self.x), snap(self.y), snap(self.width), snap(self.height))
    }
}

/// Reference to an element by its index in the current observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementRef(pub u32);

impl ElementRef {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// One proposed way of locating an element, with its confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatorCandidate {
    pub strategy: StrategyKind,
    pub locator: Locator,
    pub expression: String,
    /// Stability estimate in [0, 1]
    pub stability: f64,
    pub verified: bool,
    #[serde(default)]
    pub passes: u32,
    #[serde(default)]
    pub failures: u32,
}

impl LocatorCandidate {
    pub fn new(strategy: StrategyKind, locator: Locator, stability: f64) -> Self {
        let expression = locator.expression();
        Self {
            strategy,
            locator,
            expression,
            stability: stability.clamp(0.0, 1.0),
            verified: false,
            passes: 0,
            failures: 0,
        }
    }

    /// Whether this candidate has ever failed verification.
    pub fn has_failed(&self) -> bool {
        self.failures > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    Pending,
    Verified,
    Unverifiable,
}

/// An interactive element discovered in a page state.
///
/// The index is assigned by the compactor and never changes. The candidate
/// list only ever grows or gets re-ranked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractiveElement {
    pub index: usize,
    /// Driver node handle the element was observed as.
    #[serde(skip)]
    pub node_id: usize,
    pub role: String,
    pub tag: String,
    /// Semantic camelCase name, e.g. `signInButton`
    pub name: String,
    pub label: String,
    pub section: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,
    pub candidates: Vec<LocatorCandidate>,
    pub status: VerificationStatus,
}

impl InteractiveElement {
    pub fn new(index: usize, node_id: usize, role: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            index,
            node_id,
            role: role.into(),
            tag: tag.into(),
            name: String::new(),
            label: String::new(),
            section: String::new(),
            bounds: None,
            candidates: Vec::new(),
            status: VerificationStatus::Pending,
        }
    }

    pub fn top_candidate(&self) -> Option<&LocatorCandidate> {
        self.candidates.first()
    }

    pub fn is_verified(&self) -> bool {
        self.status == VerificationStatus::Verified
    }

    pub fn append_candidates(&mut self, candidates: impl IntoIterator<Item = LocatorCandidate>) {
        self.candidates.extend(candidates);
    }

    /// Replace the ranking with a re-ordered list of the same candidates.
    pub fn rerank(&mut self, ranked: Vec<LocatorCandidate>) {
        debug_assert_eq!(ranked.len(), self.candidates.len());
        self.candidates = ranked;
    }

    pub fn verified_candidates(&self) -> impl Iterator<Item = &LocatorCandidate> {
        self.candidates.iter().filter(|c| c.verified)
    }
}

/// Supported action types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Click,
    Fill,
    Navigate,
    Extract,
    Stop,
}

impl ActionType {
    pub fn name(&self) -> &'static str {
        match self {
            ActionType::Click => "click",
            ActionType::Fill => "fill",
            ActionType::Navigate => "navigate",
            ActionType::Extract => "extract",
            ActionType::Stop => "stop",
        }
    }

    pub fn needs_target(&self) -> bool {
        matches!(self, ActionType::Click | ActionType::Fill | ActionType::Extract)
    }
}

/// A single action proposed by the reasoning oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDecision {
    pub action: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ElementRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Fill value; `$username` / `$password` are substituted at execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub rationale: String,
}

impl ActionDecision {
    fn with(action: ActionType, rationale: impl Into<String>) -> Self {
        Self {
            action,
            target: None,
            url: None,
            value: None,
            rationale: rationale.into(),
        }
    }

    pub fn click(index: u32, rationale: impl Into<String>) -> Self {
        Self {
            target: Some(ElementRef(index)),
            ..Self::with(ActionType::Click, rationale)
        }
    }

    pub fn fill(index: u32, value: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            target: Some(ElementRef(index)),
            value: Some(value.into()),
            ..Self::with(ActionType::Fill, rationale)
        }
    }

    pub fn navigate(url: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::with(ActionType::Navigate, rationale)
        }
    }

    pub fn extract(index: u32, rationale: impl Into<String>) -> Self {
        Self {
            target: Some(ElementRef(index)),
            ..Self::with(ActionType::Extract, rationale)
        }
    }

    pub fn stop(rationale: impl Into<String>) -> Self {
        Self::with(ActionType::Stop, rationale)
    }

    /// Identity used to detect re-issued actions.
    pub fn key(&self) -> ActionKey {
        let key = match (self.action, self.target, &self.url) {
            (ActionType::Navigate, _, Some(url)) => format!("navigate:{url}"),
            (action, Some(target), _) => format!("{}#{}", action.name(), target.0),
            (action, None, _) => action.name().to_string(),
        };
        ActionKey(key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionKey(pub String);

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionOutcome {
    Succeeded,
    Failed { reason: String },
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Succeeded)
    }
}

/// An executed action, appended to the session history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// 1-based position in the history
    pub step: u32,
    /// State the action was issued from
    pub state: Fingerprint,
    pub decision: ActionDecision,
    pub outcome: ActionOutcome,
    /// Filled in by the next observation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resulting: Option<Fingerprint>,
}

/// Append-only action history bounded by the total action budget.
#[derive(Debug, Clone, Default)]
pub struct ActionHistory {
    records: Vec<ActionRecord>,
    capacity: usize,
}

impl ActionHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn executed(&self) -> usize {
        self.records.len()
    }

    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.records.len())
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Append a record; refuses to grow past the budget.
    pub fn push(
        &mut self,
        state: Fingerprint,
        decision: ActionDecision,
        outcome: ActionOutcome,
    ) -> Result<usize, CrawlError> {
        if self.is_exhausted() {
            return Err(CrawlError::guardrail(format!(
                "total action budget of {} exhausted",
                self.capacity
            )));
        }
        let step = self.records.len() as u32 + 1;
        self.records.push(ActionRecord {
            step,
            state,
            decision,
            outcome,
            resulting: None,
        });
        Ok(self.records.len() - 1)
    }

    /// Fill in the resulting fingerprint of the latest record, once.
    pub fn resolve_last(&mut self, resulting: &Fingerprint) -> Option<usize> {
        let last = self.records.last_mut()?;
        if last.resulting.is_some() {
            return None;
        }
        last.resulting = Some(resulting.clone());
        Some(self.records.len() - 1)
    }

    pub fn last(&self) -> Option<&ActionRecord> {
        self.records.last()
    }

    pub fn recent(&self, window: usize) -> &[ActionRecord] {
        let start = self.records.len().saturating_sub(window);
        &self.records[start..]
    }

    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ActionRecord> {
        self.records
    }
}
