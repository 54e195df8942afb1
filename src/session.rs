//! Crawl sessions.
//!
//! A [`CrawlSession`] owns one browser context from start to teardown: it
//! opens the base URL, runs the crawl loop and turns the fingerprint index
//! into a [`CrawlSchema`]. Sessions share nothing, so several can run side
//! by side with [`run_sessions`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use agent_core::{AgentLoopConfig, AgentLoopController, ReasoningOracle};
use autopom_core_types::{
    CrawlConfig, CrawlCounters, CrawlError, CrawlSchema, EndReason, Fingerprint, FlaggedElement,
    SchemaElement, SchemaMetadata, SessionId, StateEntry, VerificationStatus,
};
use autopom_state_center::{FingerprintIndex, PageState};
use chrono::Utc;
use perceiver_structural::{dedupe_names, page_name, BrowserBackend};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};
use url::Url;

use crate::actions::infer_page_actions;
use crate::config::AppConfig;

const UNVERIFIABLE_REASON: &str = "no candidate resolved uniquely to the element";

/// A session that stopped on a fatal error. The partial map is kept.
#[derive(Debug, Error)]
#[error("crawl session aborted: {source}")]
pub struct SessionAborted {
    pub schema: CrawlSchema,
    #[source]
    pub source: CrawlError,
}

impl SessionAborted {
    fn new(mut schema: CrawlSchema, source: CrawlError) -> Self {
        schema.finish(EndReason::Aborted);
        Self { schema, source }
    }
}

pub struct CrawlSession {
    crawl: Arc<CrawlConfig>,
    agent: AgentLoopConfig,
    backend: Arc<dyn BrowserBackend>,
    oracle: Arc<dyn ReasoningOracle>,
    cancel: CancellationToken,
}

impl CrawlSession {
    pub fn new(
        crawl: CrawlConfig,
        agent: AgentLoopConfig,
        backend: Arc<dyn BrowserBackend>,
        oracle: Arc<dyn ReasoningOracle>,
    ) -> Self {
        Self {
            crawl: Arc::new(crawl),
            agent,
            backend,
            oracle,
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_app_config(
        config: &AppConfig,
        backend: Arc<dyn BrowserBackend>,
        oracle: Arc<dyn ReasoningOracle>,
    ) -> Self {
        Self::new(config.crawl.clone(), config.agent.clone(), backend, oracle)
    }

    /// Use an externally owned stop signal.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn crawl_config(&self) -> &CrawlConfig {
        &self.crawl
    }

    fn metadata(&self, session_id: &SessionId) -> SchemaMetadata {
        SchemaMetadata {
            session_id: session_id.to_string(),
            base_url: self.crawl.base_url.clone(),
            language: self.crawl.language,
            started_at: Utc::now(),
            finished_at: None,
            end_reason: EndReason::Completed,
            truncated: false,
            counters: CrawlCounters::default(),
        }
    }

    /// Crawl until the loop ends and return the map.
    pub async fn run(&self) -> Result<CrawlSchema, SessionAborted> {
        let session_id = SessionId::new();
        let span = info_span!("crawl_session", session = %session_id, base_url = %self.crawl.base_url);
        self.run_inner(session_id).instrument(span).await
    }

    async fn run_inner(&self, session_id: SessionId) -> Result<CrawlSchema, SessionAborted> {
        let mut schema = CrawlSchema::new(self.metadata(&session_id));

        if let Err(err) = self.crawl.validate() {
            error!(error = %err, "refusing to start");
            return Err(SessionAborted::new(schema, err));
        }

        if !self.crawl.mode.is_attach() {
            let timeout = Duration::from_millis(self.agent.action_timeout_ms);
            let opened = tokio::time::timeout(timeout, self.backend.navigate(&self.crawl.base_url)).await;
            let failure = match opened {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err.to_string()),
                Err(_) => Some(format!("no response within {}ms", self.agent.action_timeout_ms)),
            };
            if let Some(reason) = failure {
                error!(reason = %reason, "cannot open the base url");
                let err = CrawlError::fatal(format!("cannot open {}: {reason}", self.crawl.base_url));
                return Err(SessionAborted::new(schema, err));
            }
        }

        let controller = AgentLoopController::new(
            self.agent.clone(),
            self.crawl.clone(),
            self.backend.clone(),
            self.oracle.clone(),
        )
        .with_cancellation(self.cancel.clone());
        let result = controller.run().await;

        schema.states = state_entries(&result.index);
        schema.metadata.counters = result.counters.clone();
        info!(
            end_reason = result.end_reason.as_str(),
            states = schema.states.len(),
            elements = schema.element_count(),
            actions = result.history.len(),
            elapsed_ms = result.total_time_ms,
            "crawl session finished"
        );

        if result.end_reason == EndReason::Aborted {
            let source = result
                .error
                .unwrap_or_else(|| CrawlError::fatal("crawl loop aborted"));
            return Err(SessionAborted::new(schema, source));
        }
        schema.finish(result.end_reason);
        Ok(schema)
    }
}

/// Route part a page is named after; hash routes count as paths.
fn naming_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => match parsed.fragment() {
            Some(fragment) if parsed.path() == "/" && fragment.starts_with('/') => fragment.to_string(),
            _ => parsed.path().to_string(),
        },
        Err(_) => url.to_string(),
    }
}

fn state_entry(state: &PageState, page_name: String) -> StateEntry {
    let elements: Vec<SchemaElement> = state
        .elements
        .iter()
        .filter_map(SchemaElement::from_verified)
        .collect();
    let unverifiable = state
        .elements
        .iter()
        .filter(|e| e.status == VerificationStatus::Unverifiable)
        .map(|e| FlaggedElement::from_element(e, UNVERIFIABLE_REASON))
        .collect();
    let actions = infer_page_actions(&elements);
    StateEntry {
        url: state.url.clone(),
        route: state.route.clone(),
        page_name,
        title: state.title.clone(),
        depth: state.depth,
        visits: state.visits,
        elements,
        unverifiable,
        actions,
    }
}

/// Schema entries for every discovered state, keyed by fingerprint.
pub fn state_entries(index: &FingerprintIndex) -> BTreeMap<Fingerprint, StateEntry> {
    let mut names: Vec<String> = index
        .states()
        .iter()
        .map(|s| page_name(&naming_path(&s.url)))
        .collect();
    dedupe_names(&mut names);
    index
        .states()
        .iter()
        .zip(names)
        .map(|(state, name)| (state.fingerprint.clone(), state_entry(state, name)))
        .collect()
}

/// Run independent sessions concurrently, one task each.
pub async fn run_sessions(sessions: Vec<CrawlSession>) -> Vec<Result<CrawlSchema, SessionAborted>> {
    let mut fallbacks = Vec::with_capacity(sessions.len());
    let mut handles = Vec::with_capacity(sessions.len());
    for session in sessions {
        fallbacks.push(session.metadata(&SessionId::new()));
        handles.push(tokio::spawn(async move { session.run().await }));
    }

    futures::future::join_all(handles)
        .await
        .into_iter()
        .zip(fallbacks)
        .map(|(joined, metadata)| match joined {
            Ok(result) => result,
            Err(err) => Err(SessionAborted::new(
                CrawlSchema::new(metadata),
                CrawlError::fatal(format!("session task failed: {err}")),
            )),
        })
        .collect()
}
