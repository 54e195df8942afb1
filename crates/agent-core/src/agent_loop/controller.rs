//! Crawl loop controller: the observe-think-act state machine.
//!
//! One controller drives one browser context strictly sequentially. All
//! guardrail and dedup decisions are made here, deterministically; the oracle
//! only proposes. The fingerprint index, the action history and the path
//! stack are owned by the running loop and handed back in the result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use action_locator::{LocatorEngine, SelfHealingVerifier, VerifierConfig};
use autopom_core_types::{
    ActionDecision, ActionHistory, ActionOutcome, ActionRecord, ActionType, CrawlConfig, CrawlCounters,
    CrawlError, EndReason,
};
use autopom_state_center::{
    fingerprint, Arrival, FingerprintIndex, Registration, RoutePolicy, StateId,
};
use perceiver_structural::{
    observe, BackendError, BrowserBackend, Command, CompactObservation, CompactorOptions,
    Observed,
};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::config::AgentLoopConfig;
use super::types::{Backtrack, CurrentState, Entry, LoopPhase, PendingRetry};
use crate::guardrails::{DecisionContext, Guardrails};
use crate::oracle::ReasoningOracle;

/// Result of one crawl loop execution.
#[derive(Debug)]
pub struct AgentLoopResult {
    pub end_reason: EndReason,
    /// Set when the loop aborted
    pub error: Option<CrawlError>,
    pub index: FingerprintIndex,
    pub history: Vec<ActionRecord>,
    pub counters: CrawlCounters,
    /// Phase transitions taken
    pub cycles: u64,
    pub total_time_ms: u64,
}

impl AgentLoopResult {
    pub fn is_success(&self) -> bool {
        self.end_reason == EndReason::Completed
    }

    pub fn is_aborted(&self) -> bool {
        self.end_reason == EndReason::Aborted
    }
}

/// Internal state of the crawl loop.
struct LoopState {
    index: FingerprintIndex,
    history: ActionHistory,
    counters: CrawlCounters,
    /// States from the root to the current one
    path: Vec<StateId>,
    current: Option<CurrentState>,
    entry: Entry,
    retry: Option<PendingRetry>,
    consecutive_failures: u32,
    consecutive_rejections: u32,
    /// A state was not registered because of `max_depth`
    clipped: bool,
    cycles: u64,
}

impl LoopState {
    fn new(crawl: &CrawlConfig) -> Self {
        Self {
            index: FingerprintIndex::new(crawl.max_revisits),
            history: ActionHistory::with_capacity(crawl.max_total_actions),
            counters: CrawlCounters::default(),
            path: Vec::new(),
            current: None,
            entry: Entry::Start,
            retry: None,
            consecutive_failures: 0,
            consecutive_rejections: 0,
            clipped: false,
            cycles: 0,
        }
    }

    fn depth_of(&self, id: StateId) -> u32 {
        self.index.get(id).map(|s| s.depth).unwrap_or_default()
    }

    /// Abandon the unresolved action that led away from `from`.
    fn abandon_last(&mut self, from: StateId) {
        let Some(fingerprint) = self.index.get(from).map(|s| s.fingerprint.clone()) else {
            return;
        };
        let key = match self.history.last() {
            Some(last) if last.resulting.is_none() && last.state == fingerprint => last.decision.key(),
            _ => return,
        };
        debug!(state = %fingerprint, action = %key, "abandoning action");
        if let Err(err) = self.index.abandon(from, key) {
            warn!(error = %err, "could not abandon action");
        }
        self.retry = None;
    }
}

/// Controller for the crawl loop.
pub struct AgentLoopController {
    config: AgentLoopConfig,
    crawl: Arc<CrawlConfig>,
    backend: Arc<dyn BrowserBackend>,
    oracle: Arc<dyn ReasoningOracle>,
    engine: LocatorEngine,
    verifier: SelfHealingVerifier,
    guardrails: Guardrails,
    policy: RoutePolicy,
    compactor: CompactorOptions,
    cancel: CancellationToken,
}

impl AgentLoopController {
    pub fn new(
        config: AgentLoopConfig,
        crawl: Arc<CrawlConfig>,
        backend: Arc<dyn BrowserBackend>,
        oracle: Arc<dyn ReasoningOracle>,
    ) -> Self {
        let verifier = SelfHealingVerifier::new(VerifierConfig {
            concurrency: config.verification_concurrency,
            ..VerifierConfig::default()
        });
        let compactor = CompactorOptions {
            max_elements: config.max_elements,
            max_label_chars: config.max_element_text_length,
            ..CompactorOptions::default()
        };
        Self {
            engine: LocatorEngine::from_config(&crawl),
            guardrails: Guardrails::from_config(&crawl),
            policy: RoutePolicy::from_config(&crawl),
            verifier,
            compactor,
            config,
            crawl,
            backend,
            oracle,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned stop signal.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request a stop; honoured at the next observation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn config(&self) -> &AgentLoopConfig {
        &self.config
    }

    pub fn crawl_config(&self) -> &CrawlConfig {
        &self.crawl
    }

    /// Run the loop until a terminal phase.
    pub async fn run(&self) -> AgentLoopResult {
        let started = Instant::now();
        let mut state = LoopState::new(&self.crawl);
        let mut phase = LoopPhase::Observe;
        info!(base_url = %self.crawl.base_url, "crawl loop started");

        let (end_reason, error) = loop {
            state.cycles += 1;
            debug!(phase = phase.name(), cycle = state.cycles, "loop phase");
            phase = match phase {
                LoopPhase::Observe => self.observe(&mut state).await,
                LoopPhase::Think => self.think(&mut state).await,
                LoopPhase::Act(decision) => self.act(&mut state, decision).await,
                LoopPhase::Backtrack(kind) => self.backtrack(&mut state, kind).await,
                LoopPhase::Done(reason) => break (reason, None),
                LoopPhase::Aborted(err) => break (EndReason::Aborted, Some(err)),
            };
        };

        state.counters.actions_executed = state.history.executed();
        let total_time_ms = started.elapsed().as_millis() as u64;
        match &error {
            Some(err) => warn!(error = %err, states = state.index.len(), "crawl loop aborted"),
            None => info!(
                end_reason = end_reason.as_str(),
                states = state.index.len(),
                actions = state.history.executed(),
                "crawl loop finished"
            ),
        }
        AgentLoopResult {
            end_reason,
            error,
            index: state.index,
            history: state.history.into_records(),
            counters: state.counters,
            cycles: state.cycles,
            total_time_ms,
        }
    }

    async fn observe_page(&self) -> Result<Observed, CrawlError> {
        match observe(self.backend.as_ref(), &self.compactor).await {
            Ok(observed) => Ok(observed),
            Err(err) => {
                let err = CrawlError::from(err);
                if err.is_fatal() {
                    return Err(err);
                }
                debug!(error = %err, "observation failed; retrying once");
                observe(self.backend.as_ref(), &self.compactor)
                    .await
                    .map_err(CrawlError::from)
            }
        }
    }

    /// Where to go when the page just reached is not accepted.
    fn reject_arrival(&self, state: &mut LoopState, err: CrawlError) -> LoopPhase {
        match state.entry {
            Entry::Start => LoopPhase::Aborted(err),
            Entry::After { from } => {
                state.abandon_last(from);
                LoopPhase::Backtrack(Backtrack::Return)
            }
            Entry::Backtracked { .. } => LoopPhase::Backtrack(Backtrack::Retreat),
        }
    }

    fn on_allowed_domain(&self, url: &str) -> bool {
        Url::parse(url)
            .map(|u| self.guardrails.is_allowed_url(&u))
            .unwrap_or(false)
    }

    async fn observe(&self, state: &mut LoopState) -> LoopPhase {
        if self.cancel.is_cancelled() {
            info!("stop signal received");
            return LoopPhase::Done(EndReason::Cancelled);
        }

        let observed = match self.observe_page().await {
            Ok(observed) => observed,
            Err(err) if err.is_fatal() => return LoopPhase::Aborted(err),
            Err(err) => {
                warn!(error = %err, "observation failed twice; backtracking");
                return self.reject_arrival(state, err);
            }
        };

        if !self.on_allowed_domain(&observed.compact.url) {
            state.counters.guardrail_rejections += 1;
            warn!(url = %observed.compact.url, "page left the allowed domains");
            let err = CrawlError::guardrail(format!("{} is outside the allowlist", observed.compact.url));
            return self.reject_arrival(state, err);
        }

        let (fingerprint, route) = fingerprint(&observed.compact, &self.policy);
        let depth = match state.entry {
            Entry::Start => 0,
            Entry::After { from } => state.depth_of(from) + 1,
            Entry::Backtracked { to } => state.depth_of(to),
        };
        let arrival = Arrival {
            url: observed.compact.url.clone(),
            route,
            title: observed.compact.title.clone(),
            depth,
        };

        let id = match state.index.lookup(&fingerprint) {
            Some(known) => match state.entry {
                Entry::After { from } if from != known => {
                    match state.index.register(fingerprint.clone(), arrival) {
                        Registration::RevisitBudgetExceeded { visits, .. } => {
                            info!(fingerprint = %fingerprint, visits, "revisit budget exceeded");
                            let err = CrawlError::guardrail(format!("state {fingerprint} revisited {visits} times"));
                            return self.reject_arrival(state, err);
                        }
                        registration => registration.id(),
                    }
                }
                _ => known,
            },
            None if depth > self.crawl.max_depth => {
                state.counters.depth_clipped += 1;
                state.clipped = true;
                info!(fingerprint = %fingerprint, depth, max_depth = self.crawl.max_depth, "state beyond max depth");
                let err = CrawlError::guardrail(format!("depth {depth} exceeds {}", self.crawl.max_depth));
                return self.reject_arrival(state, err);
            }
            None => {
                let id = state.index.register(fingerprint.clone(), arrival).id();
                state.counters.states_discovered += 1;
                if let Err(err) = self.enrich(state, id, &observed).await {
                    return LoopPhase::Aborted(err);
                }
                id
            }
        };

        if let Entry::After { .. } = state.entry {
            state.history.resolve_last(&fingerprint);
        }
        match state.path.iter().position(|&s| s == id) {
            Some(pos) => state.path.truncate(pos + 1),
            None => state.path.push(id),
        }
        if state.retry.as_ref().is_some_and(|r| r.state != id) {
            state.retry = None;
        }
        state.current = Some(CurrentState {
            id,
            fingerprint,
            observed,
        });
        LoopPhase::Think
    }

    /// Synthesize and verify locators for a new state, in this cycle.
    async fn enrich(&self, state: &mut LoopState, id: StateId, observed: &Observed) -> Result<(), CrawlError> {
        let discovered = self.engine.discover(observed);
        let elements: Vec<_> = self
            .verifier
            .verify_all(discovered, self.backend.as_ref())
            .await
            .map_err(CrawlError::from)?
            .into_iter()
            .map(|(element, _)| element)
            .collect();

        let verified = elements.iter().filter(|e| e.is_verified()).count();
        let unverifiable = elements.len() - verified;
        state.counters.elements_verified += verified;
        state.counters.elements_unverifiable += unverifiable;
        info!(
            state = id,
            elements = elements.len(),
            verified,
            unverifiable,
            "state enriched"
        );
        if let Err(err) = state.index.enrich(id, elements) {
            warn!(error = %err, "enrichment skipped");
        }
        Ok(())
    }

    /// Count a recoverable failed execution or oracle call.
    ///
    /// Too many in a row give up on the current state, never on the session.
    fn on_failure(&self, state: &mut LoopState, from: StateId, err: CrawlError) -> LoopPhase {
        if err.is_fatal() {
            return LoopPhase::Aborted(err);
        }
        state.consecutive_failures += 1;
        warn!(
            error = %err,
            consecutive = state.consecutive_failures,
            "cycle failed"
        );
        if state.consecutive_failures >= self.config.max_consecutive_failures {
            info!(state = from, failures = state.consecutive_failures, "leaving a failing state");
            state.consecutive_failures = 0;
            return LoopPhase::Backtrack(Backtrack::Retreat);
        }
        state.entry = Entry::After { from };
        LoopPhase::Observe
    }

    fn on_rejection(&self, state: &mut LoopState, decision: &ActionDecision, err: CrawlError) -> LoopPhase {
        state.counters.guardrail_rejections += 1;
        state.consecutive_rejections += 1;
        warn!(
            action = %decision.key(),
            reason = %err,
            consecutive = state.consecutive_rejections,
            "decision rejected"
        );
        if state.consecutive_rejections >= self.config.max_consecutive_rejections {
            state.consecutive_rejections = 0;
            return LoopPhase::Backtrack(Backtrack::Retreat);
        }
        LoopPhase::Think
    }

    async fn think(&self, state: &mut LoopState) -> LoopPhase {
        let Some(current) = state.current.as_ref() else {
            return LoopPhase::Observe;
        };
        let id = current.id;
        if state.history.is_exhausted() {
            info!(actions = state.history.executed(), "total action budget exhausted");
            return LoopPhase::Done(EndReason::BudgetExhausted);
        }
        let executed = state.index.get(id).map(|s| s.actions_executed).unwrap_or_default();
        if executed >= self.crawl.max_actions_per_state {
            debug!(state = id, executed, "per-state budget spent");
            return LoopPhase::Backtrack(Backtrack::Retreat);
        }
        if let Some(retry) = state.retry.as_ref().filter(|r| r.state == id) {
            debug!(action = %retry.decision.key(), failures = retry.failures, "retrying action");
            return LoopPhase::Act(retry.decision.clone());
        }

        let budget = Duration::from_millis(self.config.oracle_timeout_ms);
        let answer = timeout(
            budget,
            self.oracle.decide(
                &current.observed.compact,
                state.history.recent(self.config.history_window),
                self.crawl.goal_hint.as_deref(),
            ),
        )
        .await;
        let decision = match answer {
            Ok(Ok(decision)) => decision,
            Ok(Err(err)) => {
                let err = CrawlError::from(err);
                if err.is_fatal() {
                    return LoopPhase::Aborted(err);
                }
                return self.on_failure(state, id, err);
            }
            Err(_) => {
                state.counters.oracle_timeouts += 1;
                return self.on_failure(state, id, CrawlError::OracleTimeout(self.config.oracle_timeout_ms));
            }
        };

        if decision.action == ActionType::Stop {
            info!(rationale = %decision.rationale, "oracle stopped the crawl");
            return LoopPhase::Done(EndReason::Completed);
        }

        let verdict = match state.index.get(id) {
            Some(page) => self.guardrails.check(
                &decision,
                &DecisionContext {
                    observation: &current.observed.compact,
                    state: page,
                    last: state.history.last(),
                },
            ),
            None => Err(CrawlError::guardrail(format!("unknown state {id}"))),
        };
        match verdict {
            Ok(()) => {
                state.consecutive_rejections = 0;
                LoopPhase::Act(decision)
            }
            Err(err) => self.on_rejection(state, &decision, err),
        }
    }

    /// Turn a validated decision into a backend command.
    fn command_for(&self, decision: &ActionDecision, observation: &CompactObservation) -> Result<Command, CrawlError> {
        let node = || {
            decision
                .target
                .and_then(|t| observation.element(t.0))
                .map(|e| e.node_id)
                .ok_or_else(|| CrawlError::guardrail(format!("{} has no target", decision.key())))
        };
        match decision.action {
            ActionType::Click => Ok(Command::Click { node: node()? }),
            ActionType::Extract => Ok(Command::Extract { node: node()? }),
            ActionType::Fill => {
                let raw = decision.value.as_deref().unwrap_or_default();
                Ok(Command::Fill {
                    node: node()?,
                    value: self.crawl.credentials.substitute(raw)?,
                })
            }
            ActionType::Navigate => {
                let raw = decision.url.as_deref().unwrap_or_default();
                let url = Url::parse(&observation.url)
                    .and_then(|base| base.join(raw))
                    .map_err(|err| CrawlError::guardrail(format!("unusable url '{raw}': {err}")))?;
                Ok(Command::Navigate { url: url.into() })
            }
            ActionType::Stop => Err(CrawlError::guardrail("stop is not executable")),
        }
    }

    async fn act(&self, state: &mut LoopState, decision: ActionDecision) -> LoopPhase {
        let Some(current) = state.current.as_ref() else {
            return LoopPhase::Observe;
        };
        let id = current.id;
        let origin = current.fingerprint.clone();
        if state.history.is_exhausted() {
            return LoopPhase::Done(EndReason::BudgetExhausted);
        }
        let command = match self.command_for(&decision, &current.observed.compact) {
            Ok(command) => command,
            Err(err) => {
                state.retry = None;
                return self.on_rejection(state, &decision, err);
            }
        };

        let key = decision.key();
        let limit = Duration::from_millis(self.config.action_timeout_ms);
        let result = match timeout(limit, self.backend.act(command)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::NavigationTimeout(format!(
                "no response after {}ms",
                self.config.action_timeout_ms
            ))),
        };

        let outcome = match &result {
            Ok(_) => ActionOutcome::Succeeded,
            Err(err) => ActionOutcome::Failed {
                reason: err.to_string(),
            },
        };
        let position = match state.history.push(origin, decision.clone(), outcome) {
            Ok(position) => position,
            Err(err) => {
                warn!(error = %err, "history refused the action");
                return LoopPhase::Done(EndReason::BudgetExhausted);
            }
        };
        if let Err(err) = state.index.record_action(id, position) {
            warn!(error = %err, "could not record action");
        }
        state.counters.actions_executed = state.history.executed();

        match result {
            Ok(done) => {
                state.consecutive_failures = 0;
                state.retry = None;
                info!(
                    step = position + 1,
                    action = %key,
                    url = %done.url,
                    navigated = done.navigated,
                    "action executed"
                );
                if let Some(text) = done.extracted {
                    debug!(action = %key, chars = text.len(), "extracted text");
                }
                state.entry = Entry::After { from: id };
                LoopPhase::Observe
            }
            Err(err) => {
                state.counters.actions_failed += 1;
                let crawl_err = err.into_execution_error(decision.action.name());
                if crawl_err.is_fatal() {
                    return LoopPhase::Aborted(crawl_err);
                }
                let failures = state
                    .retry
                    .as_ref()
                    .filter(|r| r.state == id && r.decision.key() == key)
                    .map_or(0, |r| r.failures)
                    + 1;
                if failures <= self.config.action_retry_budget {
                    state.retry = Some(PendingRetry {
                        state: id,
                        decision,
                        failures,
                    });
                } else {
                    info!(action = %key, failures, "action abandoned");
                    state.retry = None;
                    if let Err(err) = state.index.abandon(id, key) {
                        warn!(error = %err, "could not abandon action");
                    }
                }
                self.on_failure(state, id, crawl_err)
            }
        }
    }

    async fn backtrack(&self, state: &mut LoopState, kind: Backtrack) -> LoopPhase {
        state.counters.backtracks += 1;
        state.retry = None;
        state.current = None;
        if kind == Backtrack::Retreat {
            state.path.pop();
        }

        let limit = Duration::from_millis(self.config.action_timeout_ms);
        while let Some(&target) = state.path.last() {
            let Some(url) = state.index.get(target).map(|s| s.url.clone()) else {
                state.path.pop();
                continue;
            };
            match timeout(limit, self.backend.navigate(&url)).await {
                Ok(Ok(())) => {
                    debug!(state = target, url = %url, "backtracked");
                    state.entry = Entry::Backtracked { to: target };
                    return LoopPhase::Observe;
                }
                Ok(Err(err)) if err.is_fatal() => {
                    return LoopPhase::Aborted(err.into_execution_error("navigate"));
                }
                Ok(Err(err)) => {
                    warn!(url = %url, error = %err, "backtrack target unreachable");
                    state.path.pop();
                }
                Err(_) => {
                    warn!(url = %url, "backtrack timed out");
                    state.path.pop();
                }
            }
        }

        let reason = if state.clipped {
            EndReason::BudgetExhausted
        } else {
            EndReason::Completed
        };
        info!(end_reason = reason.as_str(), "no state left to backtrack to");
        LoopPhase::Done(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::ScriptedOracle;
    use async_trait::async_trait;
    use autopom_core_types::{BoundingBox, Locator};
    use parking_lot::Mutex;
    use perceiver_structural::{locate, ActOutcome, DomNode, RawPage, ResolvedNode};
    use std::collections::BTreeMap;

    /// Pages of plain links keyed by URL.
    struct Site {
        pages: BTreeMap<String, RawPage>,
        current: Mutex<String>,
        visited: Mutex<Vec<String>>,
        stale_clicks: Mutex<u32>,
        disconnect_on_act: bool,
    }

    impl Site {
        fn new(pages: Vec<RawPage>) -> Self {
            let start = pages[0].url.clone();
            Self {
                pages: pages.into_iter().map(|p| (p.url.clone(), p)).collect(),
                current: Mutex::new(start.clone()),
                visited: Mutex::new(vec![start]),
                stale_clicks: Mutex::new(0),
                disconnect_on_act: false,
            }
        }

        fn go(&self, url: &str) -> Result<(), BackendError> {
            self.visited.lock().push(url.to_string());
            if !self.pages.contains_key(url) {
                return Err(BackendError::NavigationTimeout(url.to_string()));
            }
            *self.current.lock() = url.to_string();
            Ok(())
        }

        fn page(&self) -> Result<RawPage, BackendError> {
            let url = self.current.lock().clone();
            self.pages
                .get(&url)
                .cloned()
                .ok_or(BackendError::Detached(url))
        }
    }

    fn links(url: &str, targets: &[(&str, &str)]) -> RawPage {
        let mut nodes = vec![DomNode::new(0, None, "body"), DomNode::new(1, Some(0), "nav")];
        for (i, (text, href)) in targets.iter().enumerate() {
            nodes.push(
                DomNode::new(i + 2, Some(1), "a")
                    .with_attr("href", *href)
                    .with_text(*text)
                    .with_bounds(BoundingBox::new(10.0, 40.0 * i as f64, 80.0, 20.0)),
            );
        }
        RawPage {
            url: url.into(),
            title: url.into(),
            nodes,
            screenshot: None,
        }
    }

    #[async_trait]
    impl BrowserBackend for Site {
        async fn observe(&self) -> Result<RawPage, BackendError> {
            self.page()
        }

        async fn act(&self, command: Command) -> Result<ActOutcome, BackendError> {
            if self.disconnect_on_act {
                return Err(BackendError::Disconnected("browser closed".into()));
            }
            let page = self.page()?;
            let target = match &command {
                Command::Click { node } => {
                    let mut stale = self.stale_clicks.lock();
                    if *stale > 0 {
                        *stale -= 1;
                        return Err(BackendError::StaleElement(format!("node {node}")));
                    }
                    page.node(*node).and_then(|n| n.attr("href")).map(str::to_string)
                }
                Command::Navigate { url } => Some(url.clone()),
                Command::Fill { .. } | Command::Extract { .. } => None,
            };
            if let Some(url) = &target {
                self.go(url)?;
            }
            Ok(ActOutcome {
                url: self.current.lock().clone(),
                navigated: target.is_some(),
                extracted: None,
            })
        }

        async fn navigate(&self, url: &str) -> Result<(), BackendError> {
            self.go(url)
        }

        async fn resolve(&self, locator: &Locator) -> Result<Vec<ResolvedNode>, BackendError> {
            Ok(locate::resolve(&self.page()?, locator))
        }
    }

    fn two_pages() -> Vec<RawPage> {
        vec![
            links("https://site.test/", &[("About", "https://site.test/about")]),
            links("https://site.test/about", &[("Home", "https://site.test/")]),
        ]
    }

    fn controller(site: Site, crawl: CrawlConfig, script: Vec<ActionDecision>) -> (Arc<Site>, AgentLoopController) {
        let site = Arc::new(site);
        let controller = AgentLoopController::new(
            AgentLoopConfig::minimal(),
            Arc::new(crawl),
            site.clone(),
            Arc::new(ScriptedOracle::new(script)),
        );
        (site, controller)
    }

    fn crawl() -> CrawlConfig {
        CrawlConfig::new("https://site.test/")
    }

    #[tokio::test]
    async fn discovers_a_new_state_and_resolves_the_edge() {
        let (_, controller) = controller(Site::new(two_pages()), crawl(), vec![ActionDecision::click(0, "about")]);
        let result = controller.run().await;

        assert_eq!(result.end_reason, EndReason::Completed);
        assert_eq!(result.index.len(), 2);
        assert_eq!(result.history.len(), 1);
        let about = &result.index.states()[1];
        assert_eq!(result.history[0].resulting.as_ref(), Some(&about.fingerprint));
        assert_eq!(about.depth, 1);
        assert_eq!(result.counters.states_discovered, 2);
        assert!(about.elements.iter().all(|e| e.is_verified()));
    }

    #[tokio::test]
    async fn history_never_exceeds_the_total_budget() {
        let script = (0..10).map(|_| ActionDecision::click(0, "ping-pong")).collect();
        let (_, controller) = controller(Site::new(two_pages()), crawl().with_max_total_actions(3), script);
        let result = controller.run().await;

        assert_eq!(result.end_reason, EndReason::BudgetExhausted);
        assert_eq!(result.history.len(), 3);
        assert_eq!(result.index.len(), 2);
        assert_eq!(result.index.states()[0].visits, 2);
    }

    #[tokio::test]
    async fn out_of_domain_decisions_never_reach_the_browser() {
        let pages = vec![links("https://site.test/", &[("Partner", "https://evil.test/")])];
        let script = vec![
            ActionDecision::navigate("https://evil.test/phish", "leave"),
            ActionDecision::click(0, "partner link"),
        ];
        let (site, controller) = controller(Site::new(pages), crawl(), script);
        let result = controller.run().await;

        assert_eq!(result.end_reason, EndReason::Completed);
        assert_eq!(result.counters.guardrail_rejections, 2);
        assert!(result.history.is_empty());
        assert!(site.visited.lock().iter().all(|u| !u.contains("evil")));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_oracle_timeouts_leave_the_state_without_aborting() {
        let site = Arc::new(Site::new(two_pages()));
        let oracle = ScriptedOracle::new(Vec::<ActionDecision>::new()).with_delay(Duration::from_secs(5));
        let controller = AgentLoopController::new(
            AgentLoopConfig::minimal(),
            Arc::new(crawl()),
            site,
            Arc::new(oracle),
        );
        let result = controller.run().await;

        assert_eq!(result.end_reason, EndReason::Completed);
        assert_eq!(result.counters.oracle_timeouts, 3);
        assert_eq!(result.counters.backtracks, 1);
        assert!(result.error.is_none());
        assert_eq!(result.index.len(), 1);
    }

    #[tokio::test]
    async fn always_stale_clicks_end_the_crawl_without_aborting() {
        let pages = vec![
            links(
                "https://site.test/",
                &[
                    ("A", "https://site.test/a"),
                    ("B", "https://site.test/b"),
                    ("C", "https://site.test/c"),
                ],
            ),
            links("https://site.test/a", &[]),
            links("https://site.test/b", &[]),
            links("https://site.test/c", &[]),
        ];
        let site = Site::new(pages);
        *site.stale_clicks.lock() = 1_000;
        let script = vec![
            ActionDecision::click(0, "a"),
            ActionDecision::click(1, "b"),
            ActionDecision::click(2, "c"),
        ];
        let (_, controller) = controller(site, crawl(), script);
        let result = controller.run().await;

        assert_ne!(result.end_reason, EndReason::Aborted);
        assert!(result.error.is_none());
        assert!(result.counters.actions_failed >= 3);
        assert_eq!(result.index.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_before_the_first_observation() {
        let (_, controller) = controller(Site::new(two_pages()), crawl(), Vec::new());
        controller.cancel();
        let result = controller.run().await;
        assert_eq!(result.end_reason, EndReason::Cancelled);
        assert!(result.index.is_empty());
    }

    #[tokio::test]
    async fn disconnect_aborts_with_the_attempt_recorded() {
        let mut site = Site::new(two_pages());
        site.disconnect_on_act = true;
        let (_, controller) = controller(site, crawl(), vec![ActionDecision::click(0, "about")]);
        let result = controller.run().await;

        assert!(result.is_aborted());
        assert!(result.error.as_ref().unwrap().is_fatal());
        assert_eq!(result.history.len(), 1);
        assert!(!result.history[0].outcome.is_success());
    }

    #[tokio::test]
    async fn states_beyond_max_depth_are_clipped() {
        let config = crawl().with_max_depth(0).with_max_actions_per_state(1);
        let (site, controller) = controller(Site::new(two_pages()), config, vec![ActionDecision::click(0, "about")]);
        let result = controller.run().await;

        assert_eq!(result.end_reason, EndReason::BudgetExhausted);
        assert_eq!(result.counters.depth_clipped, 1);
        assert_eq!(result.index.len(), 1);
        assert!(result.index.states()[0].is_abandoned(&ActionDecision::click(0, "").key()));
        // returned to the root before giving up
        assert_eq!(site.visited.lock().last().map(String::as_str), Some("https://site.test/"));
    }

    #[tokio::test]
    async fn recoverable_failure_is_retried_without_asking_the_oracle() {
        let site = Site::new(two_pages());
        *site.stale_clicks.lock() = 1;
        let (_, controller) = controller(site, crawl(), vec![ActionDecision::click(0, "about")]);
        let result = controller.run().await;

        assert_eq!(result.end_reason, EndReason::Completed);
        assert_eq!(result.history.len(), 2);
        assert!(!result.history[0].outcome.is_success());
        assert!(result.history[1].outcome.is_success());
        assert_eq!(result.history[0].decision, result.history[1].decision);
        assert_eq!(result.index.len(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_abandon_the_action() {
        let site = Site::new(two_pages());
        *site.stale_clicks.lock() = 5;
        let script = vec![ActionDecision::click(0, "about"), ActionDecision::click(0, "again")];
        let (_, controller) = controller(site, crawl(), script);
        let result = controller.run().await;

        assert_eq!(result.end_reason, EndReason::Completed);
        assert_eq!(result.history.len(), 2);
        assert_eq!(result.counters.actions_failed, 2);
        assert_eq!(result.counters.guardrail_rejections, 1);
        assert!(result.index.states()[0].is_abandoned(&ActionDecision::click(0, "").key()));
    }
}
