//! Configuration for the crawl loop.

use serde::{Deserialize, Serialize};

/// Configuration for the observe-think-act crawl loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentLoopConfig {
    /// Timeout for one oracle decision in milliseconds.
    /// Default: 30000
    pub oracle_timeout_ms: u64,

    /// Timeout per action execution in milliseconds.
    /// Default: 15000
    pub action_timeout_ms: u64,

    /// Times a recoverable failure is retried before the action is abandoned.
    /// Default: 1
    pub action_retry_budget: u32,

    /// Consecutive failures before aborting the loop.
    /// Default: 5
    pub max_consecutive_failures: u32,

    /// Consecutive guardrail rejections before backtracking.
    /// Default: 3
    pub max_consecutive_rejections: u32,

    /// History records shown to the oracle.
    /// Default: 10
    pub history_window: usize,

    /// Elements verified concurrently in one observation.
    /// Default: 4
    pub verification_concurrency: usize,

    /// Maximum number of elements in a compact observation.
    /// Default: 120
    pub max_elements: usize,

    /// Maximum label length per element.
    /// Default: 80
    pub max_element_text_length: usize,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            oracle_timeout_ms: 30_000,
            action_timeout_ms: 15_000,
            action_retry_budget: 1,
            max_consecutive_failures: 5,
            max_consecutive_rejections: 3,
            history_window: 10,
            verification_concurrency: 4,
            max_elements: 120,
            max_element_text_length: 80,
        }
    }
}

impl AgentLoopConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a minimal config for testing.
    pub fn minimal() -> Self {
        Self {
            oracle_timeout_ms: 1_000,
            action_timeout_ms: 1_000,
            action_retry_budget: 1,
            max_consecutive_failures: 3,
            max_consecutive_rejections: 2,
            history_window: 5,
            verification_concurrency: 2,
            max_elements: 60,
            max_element_text_length: 50,
        }
    }

    /// Create a config for slow remote oracles.
    pub fn patient() -> Self {
        Self {
            oracle_timeout_ms: 120_000,
            action_timeout_ms: 30_000,
            action_retry_budget: 2,
            ..Self::default()
        }
    }

    /// Builder: set oracle timeout.
    pub fn oracle_timeout(mut self, ms: u64) -> Self {
        self.oracle_timeout_ms = ms;
        self
    }

    /// Builder: set action timeout.
    pub fn action_timeout(mut self, ms: u64) -> Self {
        self.action_timeout_ms = ms;
        self
    }

    /// Builder: set retry budget.
    pub fn retries(mut self, budget: u32) -> Self {
        self.action_retry_budget = budget;
        self
    }

    /// Builder: set consecutive failure limit.
    pub fn failures(mut self, limit: u32) -> Self {
        self.max_consecutive_failures = limit;
        self
    }

    /// Builder: set consecutive rejection limit.
    pub fn rejections(mut self, limit: u32) -> Self {
        self.max_consecutive_rejections = limit;
        self
    }

    /// Builder: set max elements.
    pub fn elements(mut self, count: usize) -> Self {
        self.max_elements = count;
        self
    }

    /// Builder: set verification concurrency.
    pub fn concurrency(mut self, count: usize) -> Self {
        self.verification_concurrency = count;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AgentLoopConfig::default();
        assert_eq!(config.history_window, 10);
        assert_eq!(config.verification_concurrency, 4);
        assert_eq!(config.max_elements, 120);
    }

    #[test]
    fn test_builder() {
        let config = AgentLoopConfig::new()
            .oracle_timeout(500)
            .retries(0)
            .rejections(1);

        assert_eq!(config.oracle_timeout_ms, 500);
        assert_eq!(config.action_retry_budget, 0);
        assert_eq!(config.max_consecutive_rejections, 1);
    }

    #[test]
    fn test_partial_input_keeps_defaults() {
        let config: AgentLoopConfig =
            serde_json::from_str(r#"{"oracle_timeout_ms": 250}"#).unwrap();
        assert_eq!(config.oracle_timeout_ms, 250);
        assert_eq!(config.action_timeout_ms, 15_000);
    }
}
