//! Crawl error taxonomy

use thiserror::Error;

/// Failures the crawl loop distinguishes.
///
/// Everything except [`CrawlError::SessionFatal`] is absorbed by the decision
/// loop and turned into a state transition; only a fatal error ends a session
/// with an error.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CrawlError {
    /// Page unreachable or detached while compacting it
    #[error("observation failed: {0}")]
    ObservationFailure(String),

    /// Stale element, navigation timeout, oracle timeout
    #[error("action '{action}' failed: {reason}")]
    ActionExecutionFailure { action: String, reason: String },

    /// Proposed action breaks a domain, depth or budget constraint
    #[error("guardrail violation: {0}")]
    GuardrailViolation(String),

    /// No candidate locator verified for an element
    #[error("no locator verified for element {element}")]
    VerificationExhaustion { element: String },

    /// Reasoning oracle did not answer in time
    #[error("oracle timed out after {0}ms")]
    OracleTimeout(u64),

    /// Browser backend disconnected or crashed
    #[error("session fatal: {0}")]
    SessionFatal(String),

    /// Configuration rejected before the session started
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CrawlError {
    pub fn observation(message: impl Into<String>) -> Self {
        Self::ObservationFailure(message.into())
    }

    pub fn execution(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ActionExecutionFailure {
            action: action.into(),
            reason: reason.into(),
        }
    }

    pub fn guardrail(message: impl Into<String>) -> Self {
        Self::GuardrailViolation(message.into())
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::SessionFatal(message.into())
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Only fatal errors surface to the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CrawlError::SessionFatal(_))
    }

    /// Oracle timeouts are handled exactly like failed executions.
    pub fn counts_as_execution_failure(&self) -> bool {
        matches!(
            self,
            CrawlError::ActionExecutionFailure { .. } | CrawlError::OracleTimeout(_)
        )
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            CrawlError::SessionFatal(_) | CrawlError::InvalidConfig(_) => 3,
            CrawlError::ObservationFailure(_)
            | CrawlError::ActionExecutionFailure { .. }
            | CrawlError::OracleTimeout(_) => 2,
            CrawlError::VerificationExhaustion { .. } => 1,
            CrawlError::GuardrailViolation(_) => 0,
        }
    }
}

pub type CrawlResult<T> = Result<T, CrawlError>;
