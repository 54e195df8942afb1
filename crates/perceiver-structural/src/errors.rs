use autopom_core_types::CrawlError;
use thiserror::Error;

/// Errors reported by a browser backend.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BackendError {
    #[error("page detached: {0}")]
    Detached(String),
    #[error("navigation timed out: {0}")]
    NavigationTimeout(String),
    #[error("stale element: {0}")]
    StaleElement(String),
    #[error("browser disconnected: {0}")]
    Disconnected(String),
    #[error("unsupported command: {0}")]
    Unsupported(String),
    #[error("backend error: {0}")]
    Other(String),
}

impl BackendError {
    /// A lost browser cannot be recovered from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BackendError::Disconnected(_))
    }

    /// Map a failure while executing `action` into the crawl taxonomy.
    pub fn into_execution_error(self, action: &str) -> CrawlError {
        if self.is_fatal() {
            CrawlError::fatal(self.to_string())
        } else {
            CrawlError::execution(action, self.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum PerceiverError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("page has no content: {0}")]
    EmptyPage(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl PerceiverError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<PerceiverError> for CrawlError {
    fn from(err: PerceiverError) -> Self {
        match err {
            PerceiverError::Backend(inner) if inner.is_fatal() => CrawlError::fatal(inner.to_string()),
            other => CrawlError::observation(other.to_string()),
        }
    }
}
