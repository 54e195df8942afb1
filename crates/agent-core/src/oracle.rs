//! Reasoning oracle contract and the oracles shipped with the crate.
//!
//! The loop calls [`ReasoningOracle::decide`] once per cycle under a timeout
//! and validates whatever comes back; nothing here is trusted to be
//! deterministic or safe.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use autopom_core_types::{
    ActionDecision, ActionRecord, PASSWORD_PLACEHOLDER, USERNAME_PLACEHOLDER,
};
use parking_lot::Mutex;
use perceiver_structural::{CompactElement, CompactObservation};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::AgentError;

#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    async fn decide(
        &self,
        observation: &CompactObservation,
        history: &[ActionRecord],
        goal_hint: Option<&str>,
    ) -> Result<ActionDecision, AgentError>;
}

/// Payload an external oracle receives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleRequest {
    pub observation: CompactObservation,
    pub history: Vec<ActionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_hint: Option<String>,
}

/// Replays a fixed list of decisions, then stops.
pub struct ScriptedOracle {
    script: Mutex<VecDeque<ActionDecision>>,
    delay: Option<Duration>,
}

impl ScriptedOracle {
    pub fn new(script: impl IntoIterator<Item = ActionDecision>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            delay: None,
        }
    }

    /// Sleep before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl ReasoningOracle for ScriptedOracle {
    async fn decide(
        &self,
        _observation: &CompactObservation,
        _history: &[ActionRecord],
        _goal_hint: Option<&str>,
    ) -> Result<ActionDecision, AgentError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().pop_front();
        Ok(next.unwrap_or_else(|| ActionDecision::stop("script exhausted")))
    }
}

#[derive(Debug, Default)]
struct Frontier {
    /// Route -> (last URL seen there, untried action keys)
    pending: BTreeMap<String, (String, BTreeSet<String>)>,
    tried: BTreeSet<String>,
    filled: BTreeSet<String>,
}

/// Deterministic breadth-first explorer for offline runs.
///
/// Fills every text field of a page once, then clicks each link and button
/// it has not tried yet. When the current page is exhausted it navigates to
/// the first route, in sort order, that still has untried elements, and stops
/// when none is left.
#[derive(Debug)]
pub struct ExplorerOracle {
    frontier: Mutex<Frontier>,
    fill_value: String,
}

impl Default for ExplorerOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl ExplorerOracle {
    pub fn new() -> Self {
        Self {
            frontier: Mutex::new(Frontier::default()),
            fill_value: "autopom".to_string(),
        }
    }

    pub fn with_fill_value(mut self, value: impl Into<String>) -> Self {
        self.fill_value = value.into();
        self
    }

    fn click_key(observation: &CompactObservation, element: &CompactElement) -> String {
        let target = element.href.as_deref().unwrap_or(&element.label);
        format!("{}|{}|{}|{}", observation.route, element.tag, element.role, target)
    }

    fn fill_value_for(&self, element: &CompactElement) -> String {
        let label = element.label.to_ascii_lowercase();
        if element.input_type.as_deref() == Some("password") {
            PASSWORD_PLACEHOLDER.to_string()
        } else if label.contains("user") || label.contains("email") || label.contains("login") {
            USERNAME_PLACEHOLDER.to_string()
        } else {
            self.fill_value.clone()
        }
    }
}

fn is_fillable(element: &CompactElement) -> bool {
    matches!(element.role.as_str(), "textbox" | "searchbox")
}

fn is_clickable(element: &CompactElement) -> bool {
    matches!(element.role.as_str(), "link" | "button" | "tab" | "menuitem")
}

#[async_trait]
impl ReasoningOracle for ExplorerOracle {
    async fn decide(
        &self,
        observation: &CompactObservation,
        _history: &[ActionRecord],
        _goal_hint: Option<&str>,
    ) -> Result<ActionDecision, AgentError> {
        let mut frontier = self.frontier.lock();

        for element in observation.elements.iter().filter(|e| is_fillable(e)) {
            let key = format!("{}|fill|{}", observation.route, element.index);
            if frontier.filled.insert(key) {
                return Ok(ActionDecision::fill(
                    element.index,
                    self.fill_value_for(element),
                    format!("fill {}", element.label),
                ));
            }
        }

        let untried: Vec<(&CompactElement, String)> = observation
            .elements
            .iter()
            .filter(|e| is_clickable(e))
            .map(|e| (e, Self::click_key(observation, e)))
            .filter(|(_, key)| !frontier.tried.contains(key))
            .collect();

        if let Some((element, key)) = untried.first() {
            frontier.tried.insert(key.clone());
            let rest: BTreeSet<String> = untried[1..].iter().map(|(_, k)| k.clone()).collect();
            frontier
                .pending
                .insert(observation.route.clone(), (observation.url.clone(), rest));
            debug!(route = %observation.route, label = %element.label, "explorer clicking");
            return Ok(ActionDecision::click(
                element.index,
                format!("explore {}", element.label),
            ));
        }

        frontier.pending.remove(&observation.route);
        let Frontier { pending, tried, .. } = &mut *frontier;
        pending.retain(|_, (_, keys)| {
            keys.retain(|k| !tried.contains(k));
            !keys.is_empty()
        });
        match pending.values().next() {
            Some((url, _)) => Ok(ActionDecision::navigate(
                url.clone(),
                "return to a page with untried elements",
            )),
            None => Ok(ActionDecision::stop("nothing left to explore")),
        }
    }
}

/// Posts an [`OracleRequest`] as JSON and expects an [`ActionDecision`] back.
pub struct HttpOracle {
    client: Client,
    endpoint: String,
}

impl HttpOracle {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, AgentError> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(AgentError::invalid_request("missing oracle endpoint"));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| {
                AgentError::invalid_request(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ReasoningOracle for HttpOracle {
    async fn decide(
        &self,
        observation: &CompactObservation,
        history: &[ActionRecord],
        goal_hint: Option<&str>,
    ) -> Result<ActionDecision, AgentError> {
        let body = OracleRequest {
            observation: observation.clone(),
            history: history.to_vec(),
            goal_hint: goal_hint.map(str::to_string),
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| AgentError::oracle(format!("oracle request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            warn!(target: "oracle", %status, body = %text, "oracle returned an error status");
            return Err(AgentError::oracle(format!("oracle returned {status}: {text}")));
        }

        response
            .json::<ActionDecision>()
            .await
            .map_err(|err| AgentError::invalid_request(format!("oracle response invalid: {err}")))
    }
}
