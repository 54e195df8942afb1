use autopom_core_types::CrawlError;
use thiserror::Error;

/// Errors emitted by the agent-core crate.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Raised when an oracle request or response is malformed.
    #[error("invalid oracle exchange: {0}")]
    InvalidRequest(String),

    /// Raised when the oracle could not be reached or refused to answer.
    #[error("oracle unavailable: {0}")]
    Oracle(String),

    /// Raised when the loop cannot be assembled from its configuration.
    #[error("invalid loop configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Crawl(#[from] CrawlError),
}

impl AgentError {
    /// Helper for malformed requests and responses.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Helper for transport failures.
    pub fn oracle(message: impl Into<String>) -> Self {
        Self::Oracle(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<AgentError> for CrawlError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Crawl(inner) => inner,
            AgentError::Config(message) => CrawlError::invalid_config(message),
            other => CrawlError::execution("decide", other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oracle_failures_count_as_execution_failures() {
        let crawl: CrawlError = AgentError::oracle("connection refused").into();
        assert!(crawl.counts_as_execution_failure());
        let crawl: CrawlError = AgentError::from(CrawlError::fatal("gone")).into();
        assert!(crawl.is_fatal());
    }
}
