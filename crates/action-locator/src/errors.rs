//! Error types for the locator pipeline

use autopom_core_types::CrawlError;
use perceiver_structural::BackendError;
use thiserror::Error;

/// Locator error enumeration
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// Probe against the live page failed
    #[error("probe failed: {0}")]
    Probe(#[from] BackendError),

    /// Element handle no longer present in the snapshot
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl LocatorError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, LocatorError::Probe(err) if !err.is_fatal())
    }

    /// A lost backend ends the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LocatorError::Probe(err) if err.is_fatal())
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            LocatorError::Probe(err) if err.is_fatal() => 3,
            LocatorError::Internal(_) => 3,
            LocatorError::Probe(_) => 2,
            LocatorError::ElementNotFound(_) => 1,
        }
    }
}

impl From<LocatorError> for CrawlError {
    fn from(err: LocatorError) -> Self {
        if err.is_fatal() {
            CrawlError::fatal(err.to_string())
        } else {
            CrawlError::VerificationExhaustion {
                element: err.to_string(),
            }
        }
    }
}
