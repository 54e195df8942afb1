//! Hard constraints on oracle decisions.
//!
//! Every check here is deterministic and runs before an action reaches the
//! browser. The oracle never gets to relax any of them.

use autopom_core_types::{ActionDecision, ActionRecord, ActionType, CrawlConfig, CrawlError};
use autopom_state_center::PageState;
use perceiver_structural::CompactObservation;
use url::Url;

/// What a decision is checked against.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    pub observation: &'a CompactObservation,
    pub state: &'a PageState,
    /// Latest history record, if any
    pub last: Option<&'a ActionRecord>,
}

#[derive(Debug, Clone)]
pub struct Guardrails {
    allowed_domains: Vec<String>,
    max_actions_per_state: usize,
}

impl Guardrails {
    pub fn new<I, S>(allowed_domains: I, max_actions_per_state: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_domains: allowed_domains
                .into_iter()
                .filter_map(|d| normalize_domain(d.as_ref()))
                .collect(),
            max_actions_per_state,
        }
    }

    pub fn from_config(config: &CrawlConfig) -> Self {
        Self::new(config.effective_allowed_domains(), config.max_actions_per_state)
    }

    pub fn allowed_domains(&self) -> &[String] {
        &self.allowed_domains
    }

    /// Host equal to, or a subdomain of, an allowlisted domain.
    pub fn is_allowed_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        self.allowed_domains.iter().any(|domain| {
            host == domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// An absolute http(s) URL on an allowlisted host.
    pub fn is_allowed_url(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https")
            && url.host_str().is_some_and(|host| self.is_allowed_host(host))
    }

    /// Validate one decision. `Stop` always passes.
    pub fn check(&self, decision: &ActionDecision, ctx: &DecisionContext<'_>) -> Result<(), CrawlError> {
        if decision.action == ActionType::Stop {
            return Ok(());
        }
        if ctx.state.actions_executed >= self.max_actions_per_state {
            return Err(CrawlError::guardrail(format!(
                "per-state budget of {} actions spent",
                self.max_actions_per_state
            )));
        }

        let key = decision.key();
        if ctx.state.is_abandoned(&key) {
            return Err(CrawlError::guardrail(format!("action {key} was abandoned")));
        }
        if let Some(last) = ctx.last {
            let same_state = last.state == ctx.state.fingerprint;
            if same_state && !last.outcome.is_success() && last.decision.key() == key {
                return Err(CrawlError::guardrail(format!("action {key} just failed")));
            }
        }

        let target = if decision.action.needs_target() {
            let Some(target) = decision.target else {
                return Err(CrawlError::guardrail(format!(
                    "{} needs a target element",
                    decision.action.name()
                )));
            };
            let Some(element) = ctx.observation.element(target.0) else {
                return Err(CrawlError::guardrail(format!(
                    "element {} is not in the current observation",
                    target.0
                )));
            };
            Some(element)
        } else {
            None
        };

        match decision.action {
            ActionType::Navigate => {
                let Some(raw) = decision.url.as_deref().filter(|u| !u.trim().is_empty()) else {
                    return Err(CrawlError::guardrail("navigate needs a url"));
                };
                let url = resolve_url(&ctx.observation.url, raw)?;
                if !self.is_allowed_url(&url) {
                    return Err(CrawlError::guardrail(format!(
                        "navigation to {url} leaves the allowed domains"
                    )));
                }
            }
            ActionType::Click => {
                if let Some(href) = target.and_then(|e| e.href.as_deref()) {
                    self.check_link(&ctx.observation.url, href)?;
                }
            }
            ActionType::Fill => {
                if decision.value.as_deref().map_or(true, str::is_empty) {
                    return Err(CrawlError::guardrail("fill needs a value"));
                }
            }
            ActionType::Extract | ActionType::Stop => {}
        }
        Ok(())
    }

    fn check_link(&self, page_url: &str, href: &str) -> Result<(), CrawlError> {
        let url = resolve_url(page_url, href)?;
        match url.scheme() {
            // script links stay on the page
            "javascript" => Ok(()),
            "http" | "https" if self.is_allowed_url(&url) => Ok(()),
            _ => Err(CrawlError::guardrail(format!(
                "link to {url} leaves the allowed domains"
            ))),
        }
    }
}

fn resolve_url(page_url: &str, raw: &str) -> Result<Url, CrawlError> {
    let joined = match Url::parse(page_url) {
        Ok(base) => base.join(raw.trim()),
        Err(_) => Url::parse(raw.trim()),
    };
    joined.map_err(|err| CrawlError::guardrail(format!("unusable url '{raw}': {err}")))
}

/// Lowercase host of a domain or URL, without a leading `www.`.
pub fn normalize_domain(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let host = if trimmed.contains("://") {
        Url::parse(trimmed)
            .ok()
            .and_then(|parsed| parsed.host_str().map(|host| host.to_ascii_lowercase()))?
    } else {
        trimmed.trim_end_matches('/').to_ascii_lowercase()
    };
    Some(host.trim_start_matches("www.").to_string())
}
