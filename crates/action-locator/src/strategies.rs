//! Locator synthesis strategies
//!
//! Five strategies in descending resilience:
//! 1. TestId - dedicated automation attribute
//! 2. RoleName - ARIA role plus computed accessible name
//! 3. Text - short stable text content
//! 4. AnchoredPath - minimal path from the nearest stable ancestor
//! 5. AbsolutePath - full path from the document root
//!
//! Strategies only propose. Whether a locator really finds the element is
//! decided by the verifier against the live page.

use autopom_core_types::volatile::is_volatile_token;
use autopom_core_types::{
    CrawlConfig, InteractiveElement, Locator, LocatorCandidate, PathStep, StrategyKind,
};
use perceiver_structural::{
    accessible_name, dedupe_names, implicit_role, name_hints, semantic_name, DomNode, Observed,
    RawPage,
};
use tracing::{debug, warn};

use crate::ranking;

const LANDMARK_TAGS: &[&str] = &["form", "main", "nav", "header", "footer", "aside", "dialog"];

/// Own attributes that make a path step specific without being volatile.
const STABLE_OWN_ATTRIBUTES: &[&str] = &["name", "type"];

/// Everything a strategy may look at for one node.
pub struct SynthesisContext<'a> {
    pub page: &'a RawPage,
    pub node: &'a DomNode,
    pub role: String,
    pub accessible_name: Option<String>,
}

impl<'a> SynthesisContext<'a> {
    pub fn new(page: &'a RawPage, node: &'a DomNode) -> Self {
        Self {
            page,
            node,
            role: implicit_role(node),
            accessible_name: accessible_name(page, node),
        }
    }
}

/// Strategy trait for locator synthesis
pub trait Strategy: Send + Sync {
    /// Propose a locator for the context node, if this strategy applies
    fn propose(&self, ctx: &SynthesisContext<'_>) -> Option<Locator>;

    /// Get strategy type
    fn strategy_type(&self) -> StrategyKind;

    /// Get strategy name
    fn name(&self) -> &'static str {
        self.strategy_type().name()
    }
}

/// Dedicated test/automation id attribute
pub struct TestIdStrategy {
    attributes: Vec<String>,
}

impl TestIdStrategy {
    pub fn new(attributes: Vec<String>) -> Self {
        Self { attributes }
    }
}

impl Strategy for TestIdStrategy {
    fn propose(&self, ctx: &SynthesisContext<'_>) -> Option<Locator> {
        self.attributes.iter().find_map(|attribute| {
            ctx.node
                .attr(attribute)
                .filter(|value| !is_volatile_token(value))
                .map(|value| Locator::TestId {
                    attribute: attribute.clone(),
                    value: value.to_string(),
                })
        })
    }

    fn strategy_type(&self) -> StrategyKind {
        StrategyKind::TestId
    }
}

/// ARIA role + accessible name
pub struct RoleNameStrategy;

impl Strategy for RoleNameStrategy {
    fn propose(&self, ctx: &SynthesisContext<'_>) -> Option<Locator> {
        if ctx.role == "generic" {
            return None;
        }
        let name = ctx.accessible_name.as_ref()?;
        if is_volatile_token(name) {
            return None;
        }
        Some(Locator::Role {
            role: ctx.role.clone(),
            name: name.clone(),
        })
    }

    fn strategy_type(&self) -> StrategyKind {
        StrategyKind::RoleName
    }
}

/// Stable visible text
pub struct TextStrategy {
    max_chars: usize,
}

impl Default for TextStrategy {
    fn default() -> Self {
        Self { max_chars: 50 }
    }
}

impl Strategy for TextStrategy {
    fn propose(&self, ctx: &SynthesisContext<'_>) -> Option<Locator> {
        if ctx.node.tag == "input" {
            return None;
        }
        let text = ctx.page.text_content(ctx.node);
        if text.is_empty() || text.chars().count() > self.max_chars || is_volatile_token(&text) {
            return None;
        }
        Some(Locator::Text { text })
    }

    fn strategy_type(&self) -> StrategyKind {
        StrategyKind::Text
    }
}

/// Minimal path anchored on the nearest stable ancestor
///
/// Anchors are ancestors with a stable id or test id, or landmark containers.
pub struct AnchoredPathStrategy {
    test_id_attributes: Vec<String>,
}

impl AnchoredPathStrategy {
    pub fn new(test_id_attributes: Vec<String>) -> Self {
        Self { test_id_attributes }
    }

    fn anchor_step(&self, node: &DomNode) -> Option<PathStep> {
        if let Some(id) = node.attr("id").filter(|id| !is_volatile_token(id)) {
            return Some(PathStep::tag(&node.tag).with_id(id));
        }
        if let Some((attribute, value)) = self.test_id_attributes.iter().find_map(|a| {
            node.attr(a)
                .filter(|v| !is_volatile_token(v))
                .map(|v| (a.clone(), v.to_string()))
        }) {
            return Some(PathStep::tag(&node.tag).with_attribute(attribute, value));
        }
        if LANDMARK_TAGS.contains(&node.tag.as_str()) {
            return Some(PathStep::tag(&node.tag));
        }
        None
    }
}

impl Strategy for AnchoredPathStrategy {
    fn propose(&self, ctx: &SynthesisContext<'_>) -> Option<Locator> {
        let ancestors: Vec<&DomNode> = ctx.page.ancestors(ctx.node).collect();
        let (anchor_at, anchor) = ancestors
            .iter()
            .enumerate()
            .find_map(|(i, n)| self.anchor_step(n).map(|step| (i, step)))?;

        let mut steps = vec![anchor];
        for node in ancestors[..anchor_at].iter().rev() {
            let step = PathStep::tag(&node.tag);
            steps.push(match ctx.page.nth_of_type(node) {
                Some(nth) => step.with_nth(nth),
                None => step,
            });
        }

        let node = ctx.node;
        let mut target = PathStep::tag(&node.tag);
        if let Some(id) = node.attr("id").filter(|id| !is_volatile_token(id)) {
            target = target.with_id(id);
        }
        for attribute in STABLE_OWN_ATTRIBUTES {
            if let Some(value) = node.attr(attribute).filter(|v| !is_volatile_token(v)) {
                target = target.with_attribute(*attribute, value);
            }
        }
        if target.id.is_none() && target.attributes.is_empty() {
            if let Some(nth) = ctx.page.nth_of_type(node) {
                target = target.with_nth(nth);
            }
        }
        steps.push(target);
        Some(Locator::Path {
            anchored: true,
            steps,
        })
    }

    fn strategy_type(&self) -> StrategyKind {
        StrategyKind::AnchoredPath
    }
}

/// Absolute structural path, last resort
pub struct AbsolutePathStrategy;

impl Strategy for AbsolutePathStrategy {
    fn propose(&self, ctx: &SynthesisContext<'_>) -> Option<Locator> {
        let mut chain: Vec<&DomNode> = std::iter::once(ctx.node)
            .chain(ctx.page.ancestors(ctx.node))
            .collect();
        chain.reverse();
        let steps = chain
            .into_iter()
            .map(|node| match ctx.page.nth_of_type(node) {
                Some(nth) => PathStep::tag(&node.tag).with_nth(nth),
                None => PathStep::tag(&node.tag),
            })
            .collect();
        Some(Locator::Path {
            anchored: false,
            steps,
        })
    }

    fn strategy_type(&self) -> StrategyKind {
        StrategyKind::AbsolutePath
    }
}

/// Longer expressions are slightly less trusted.
pub fn length_penalty(expression: &str) -> f64 {
    (expression.chars().count() as f64 * 0.001).min(0.05)
}

/// Runs every strategy over a node and ranks the proposals.
pub struct LocatorEngine {
    strategies: Vec<Box<dyn Strategy>>,
    test_id_attributes: Vec<String>,
}

impl LocatorEngine {
    pub fn new(test_id_attributes: Vec<String>) -> Self {
        let strategies: Vec<Box<dyn Strategy>> = vec![
            Box::new(TestIdStrategy::new(test_id_attributes.clone())),
            Box::new(RoleNameStrategy),
            Box::new(TextStrategy::default()),
            Box::new(AnchoredPathStrategy::new(test_id_attributes.clone())),
            Box::new(AbsolutePathStrategy),
        ];
        Self {
            strategies,
            test_id_attributes,
        }
    }

    pub fn from_config(config: &CrawlConfig) -> Self {
        Self::new(config.test_id_attributes.clone())
    }

    /// Candidate locators for `node`, best first.
    pub fn synthesize(&self, page: &RawPage, node: &DomNode) -> Vec<LocatorCandidate> {
        let ctx = SynthesisContext::new(page, node);
        let mut candidates: Vec<LocatorCandidate> = Vec::new();
        for strategy in &self.strategies {
            let Some(locator) = strategy.propose(&ctx) else {
                continue;
            };
            let expression = locator.expression();
            if candidates.iter().any(|c| c.expression == expression) {
                continue;
            }
            let stability = strategy.strategy_type().prior_stability() - length_penalty(&expression);
            debug!(strategy = strategy.name(), %expression, stability, "candidate proposed");
            candidates.push(LocatorCandidate::new(strategy.strategy_type(), locator, stability));
        }
        ranking::rank(&candidates)
    }

    /// Build named elements with candidates for every compacted node.
    pub fn discover(&self, observed: &Observed) -> Vec<InteractiveElement> {
        let mut elements = Vec::with_capacity(observed.compact.elements.len());
        for compact in &observed.compact.elements {
            let Some(node) = observed.raw.node(compact.node_id) else {
                warn!(node_id = compact.node_id, "compacted node missing from snapshot");
                continue;
            };
            let hints = name_hints(&observed.raw, node, &self.test_id_attributes);
            let mut element =
                InteractiveElement::new(compact.index as usize, node.id, &compact.role, &compact.tag);
            element.name = semantic_name(&hints, &compact.role);
            element.label = compact.label.clone();
            element.section = compact.section.clone();
            element.bounds = node.bounds;
            element.append_candidates(self.synthesize(&observed.raw, node));
            elements.push(element);
        }

        let mut names: Vec<String> = elements.iter().map(|e| e.name.clone()).collect();
        dedupe_names(&mut names);
        for (element, name) in elements.iter_mut().zip(names) {
            element.name = name;
        }
        elements
    }
}
