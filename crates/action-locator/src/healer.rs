//! Same-cycle verification and self-healing of candidate locators
//!
//! Every candidate of a freshly discovered element is probed against the
//! live page. A candidate passes only if it resolves to exactly one node and
//! that node is the one the element was observed as. Scores move by an
//! exponential-moving-average rule and the candidate list is re-ranked so a
//! failed candidate can never stay ahead of one that passed.

use autopom_core_types::{InteractiveElement, LocatorCandidate, StrategyKind, VerificationStatus};
use futures::stream::{self, StreamExt, TryStreamExt};
use perceiver_structural::{BrowserBackend, ResolvedNode};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::LocatorError;
use crate::ranking;

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Pass: `s + gain * (1 - s)`
    pub pass_gain: f64,
    /// Fail: `s * decay`
    pub fail_decay: f64,
    /// Max centre distance for a positional match, in pixels
    pub position_tolerance: f64,
    /// Elements verified concurrently
    pub concurrency: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            pass_gain: 0.3,
            fail_decay: 0.4,
            position_tolerance: 4.0,
            concurrency: 4,
        }
    }
}

/// Outcome of probing one candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateCheck {
    pub strategy: StrategyKind,
    pub expression: String,
    pub matches: usize,
    pub same_element: bool,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    pub element: usize,
    pub name: String,
    pub status: VerificationStatus,
    pub checks: Vec<CandidateCheck>,
    /// The top candidate changed because the previous one failed
    pub healed: bool,
}

impl VerificationReport {
    pub fn passed(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.checks.len() - self.passed()
    }
}

pub struct SelfHealingVerifier {
    config: VerifierConfig,
}

impl Default for SelfHealingVerifier {
    fn default() -> Self {
        Self::new(VerifierConfig::default())
    }
}

impl SelfHealingVerifier {
    pub fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Updated stability after one check.
    pub fn score(&self, stability: f64, passed: bool) -> f64 {
        let next = if passed {
            stability + self.config.pass_gain * (1.0 - stability)
        } else {
            stability * self.config.fail_decay
        };
        next.clamp(0.0, 1.0)
    }

    fn is_origin(&self, element: &InteractiveElement, node: &ResolvedNode) -> bool {
        if node.node_id == element.node_id {
            return true;
        }
        match (&element.bounds, &node.bounds) {
            (Some(origin), Some(found)) if node.tag == element.tag => {
                origin.center_distance(found) <= self.config.position_tolerance
            }
            _ => false,
        }
    }

    /// Probe every candidate of `element` and re-rank them.
    ///
    /// Only a fatal backend error is returned; anything else counts as a
    /// failed check.
    pub async fn verify(
        &self,
        mut element: InteractiveElement,
        backend: &dyn BrowserBackend,
    ) -> Result<(InteractiveElement, VerificationReport), LocatorError> {
        let previous_top = element.top_candidate().map(|c| c.expression.clone());
        let mut checks = Vec::with_capacity(element.candidates.len());
        let mut updated: Vec<LocatorCandidate> = Vec::with_capacity(element.candidates.len());

        for candidate in &element.candidates {
            let (resolved, probe_error) = match backend.resolve(&candidate.locator).await {
                Ok(nodes) => (nodes, None),
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => (Vec::new(), Some(err.to_string())),
            };
            let same_element = resolved.len() == 1 && self.is_origin(&element, &resolved[0]);
            let passed = same_element;

            let mut next = candidate.clone();
            next.stability = self.score(candidate.stability, passed);
            next.verified = passed;
            if passed {
                next.passes += 1;
            } else {
                next.failures += 1;
            }
            debug!(
                element = %element.name,
                strategy = candidate.strategy.name(),
                expression = %candidate.expression,
                matches = resolved.len(),
                passed,
                stability = next.stability,
                "candidate checked"
            );
            checks.push(CandidateCheck {
                strategy: candidate.strategy,
                expression: candidate.expression.clone(),
                matches: resolved.len(),
                same_element,
                passed,
                probe_error,
            });
            updated.push(next);
        }

        element.rerank(ranking::rank(&updated));
        element.status = if element.verified_candidates().next().is_some() {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Unverifiable
        };

        let new_top = element.top_candidate().map(|c| c.expression.clone());
        let healed = element.is_verified() && previous_top.is_some() && previous_top != new_top;
        match element.status {
            VerificationStatus::Unverifiable => warn!(
                element = %element.name,
                candidates = element.candidates.len(),
                "no candidate verified; element flagged unverifiable"
            ),
            _ if healed => info!(
                element = %element.name,
                from = previous_top.as_deref().unwrap_or_default(),
                to = new_top.as_deref().unwrap_or_default(),
                "locator healed"
            ),
            _ => {}
        }

        let report = VerificationReport {
            element: element.index,
            name: element.name.clone(),
            status: element.status,
            checks,
            healed,
        };
        Ok((element, report))
    }

    /// Verify several elements concurrently; results keep input order.
    pub async fn verify_all(
        &self,
        elements: Vec<InteractiveElement>,
        backend: &dyn BrowserBackend,
    ) -> Result<Vec<(InteractiveElement, VerificationReport)>, LocatorError> {
        let limit = self.config.concurrency.max(1);
        stream::iter(elements.into_iter().map(|element| self.verify(element, backend)))
            .buffered(limit)
            .try_collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::LocatorEngine;
    use async_trait::async_trait;
    use autopom_core_types::{BoundingBox, Locator};
    use perceiver_structural::{
        compact, locate, ActOutcome, BackendError, Command, CompactorOptions, DomNode, RawPage,
    };

    /// Serves probes from a "live" page that may differ from the snapshot.
    struct LivePage {
        live: RawPage,
        disconnected: bool,
        detached: bool,
    }

    #[async_trait]
    impl BrowserBackend for LivePage {
        async fn observe(&self) -> Result<RawPage, BackendError> {
            Ok(self.live.clone())
        }

        async fn act(&self, command: Command) -> Result<ActOutcome, BackendError> {
            Err(BackendError::Unsupported(command.name().to_string()))
        }

        async fn navigate(&self, url: &str) -> Result<(), BackendError> {
            Err(BackendError::Unsupported(url.to_string()))
        }

        async fn resolve(&self, locator: &Locator) -> Result<Vec<ResolvedNode>, BackendError> {
            if self.disconnected {
                return Err(BackendError::Disconnected("socket closed".into()));
            }
            if self.detached {
                return Err(BackendError::Detached("frame reloaded".into()));
            }
            Ok(locate::resolve(&self.live, locator))
        }
    }

    fn login_snapshot() -> RawPage {
        RawPage {
            url: "https://example.com/login".into(),
            title: "Login".into(),
            nodes: vec![
                DomNode::new(0, None, "body"),
                DomNode::new(1, Some(0), "form").with_attr("id", "login"),
                DomNode::new(2, Some(1), "input")
                    .with_attr("name", "username")
                    .with_attr("aria-label", "Username")
                    .with_bounds(BoundingBox::new(10.0, 10.0, 200.0, 30.0)),
                DomNode::new(3, Some(1), "button")
                    .with_attr("type", "submit")
                    .with_attr("data-testid", "login-submit")
                    .with_text("Sign In")
                    .with_bounds(BoundingBox::new(10.0, 50.0, 80.0, 30.0)),
            ],
            screenshot: None,
        }
    }

    /// Same page, but the test id never made it into the live DOM.
    fn live_without_test_id() -> RawPage {
        let mut page = login_snapshot();
        page.nodes[3].attributes.remove("data-testid");
        page
    }

    fn elements(snapshot: RawPage) -> Vec<InteractiveElement> {
        let observed = compact(snapshot, &CompactorOptions::default());
        LocatorEngine::new(vec!["data-testid".into()]).discover(&observed)
    }

    #[tokio::test]
    async fn missing_test_id_is_demoted_and_role_promoted() {
        let backend = LivePage {
            live: live_without_test_id(),
            disconnected: false,
            detached: false,
        };
        let verifier = SelfHealingVerifier::default();
        let button = elements(login_snapshot()).remove(1);
        assert_eq!(button.top_candidate().unwrap().strategy, StrategyKind::TestId);

        let (button, report) = verifier.verify(button, &backend).await.unwrap();
        assert_eq!(report.status, VerificationStatus::Verified);
        assert!(report.healed);
        let top = button.top_candidate().unwrap();
        assert_eq!(top.strategy, StrategyKind::RoleName);
        assert!(top.verified);
        let demoted = button
            .candidates
            .iter()
            .find(|c| c.strategy == StrategyKind::TestId)
            .unwrap();
        assert!(!demoted.verified);
        assert_eq!(demoted.failures, 1);
        assert!(demoted.stability < 0.4);
        // failed candidates rank behind every passing one
        let first_failed = button.candidates.iter().position(|c| !c.verified).unwrap();
        assert!(button.candidates[first_failed..].iter().all(|c| !c.verified));
    }

    #[tokio::test]
    async fn verified_top_candidate_resolves_to_the_origin() {
        let live = login_snapshot();
        let backend = LivePage {
            live: live.clone(),
            disconnected: false,
            detached: false,
        };
        let verifier = SelfHealingVerifier::default();
        let results = verifier
            .verify_all(elements(login_snapshot()), &backend)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        for (element, report) in &results {
            assert_eq!(report.status, VerificationStatus::Verified);
            let top = element.top_candidate().unwrap();
            let found = locate::resolve(&live, &top.locator);
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].node_id, element.node_id);
        }
        // input order is preserved
        assert_eq!(results[0].0.index, 0);
        assert_eq!(results[1].0.index, 1);
    }

    #[tokio::test]
    async fn vanished_element_is_flagged_unverifiable() {
        let mut live = login_snapshot();
        // every locator now matches nothing: the whole form is gone
        live.nodes.truncate(1);
        let backend = LivePage {
            live,
            disconnected: false,
            detached: false,
        };
        let verifier = SelfHealingVerifier::default();
        let (element, report) = verifier
            .verify(elements(login_snapshot()).remove(0), &backend)
            .await
            .unwrap();
        assert_eq!(element.status, VerificationStatus::Unverifiable);
        assert_eq!(report.passed(), 0);
        assert!(!report.healed);
        assert!(element.candidates.iter().all(|c| c.failures == 1));
    }

    #[tokio::test]
    async fn resolve_errors_short_of_a_disconnect_only_fail_the_check() {
        let backend = LivePage {
            live: login_snapshot(),
            disconnected: false,
            detached: true,
        };
        let verifier = SelfHealingVerifier::default();
        let results = verifier
            .verify_all(elements(login_snapshot()), &backend)
            .await
            .unwrap();
        assert!(!results.is_empty());
        for (element, report) in results {
            assert_eq!(element.status, VerificationStatus::Unverifiable);
            assert!(report.checks.iter().all(|c| c.probe_error.is_some()));
        }
    }

    #[tokio::test]
    async fn disconnect_is_fatal() {
        let backend = LivePage {
            live: login_snapshot(),
            disconnected: true,
            detached: false,
        };
        let verifier = SelfHealingVerifier::default();
        let err = verifier
            .verify_all(elements(login_snapshot()), &backend)
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn scoring_rule() {
        let verifier = SelfHealingVerifier::default();
        assert!((verifier.score(0.5, true) - 0.65).abs() < 1e-9);
        assert!((verifier.score(0.5, false) - 0.2).abs() < 1e-9);
        assert!(verifier.score(0.99, true) <= 1.0);
    }
}
