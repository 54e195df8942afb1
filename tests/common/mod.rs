#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use agent_core::{AgentLoopConfig, ExplorerOracle};
use autopom::{CrawlSession, FixtureBackend};
use autopom_core_types::{CrawlConfig, Credentials};

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(name)
}

pub fn fixture(name: &str) -> Arc<FixtureBackend> {
    let raw = std::fs::read_to_string(fixture_path(name)).expect("fixture file");
    Arc::new(FixtureBackend::from_yaml_str(&raw).expect("valid fixture"))
}

/// Loop tuning for offline runs: generous limits, short timeouts.
pub fn agent_config() -> AgentLoopConfig {
    AgentLoopConfig::default().oracle_timeout(2_000).action_timeout(2_000)
}

pub fn crawl_config(backend: &FixtureBackend) -> CrawlConfig {
    CrawlConfig::new(backend.start_url())
}

pub fn login_credentials() -> Credentials {
    Credentials::new("alice", "s3cret")
}

pub fn explorer_session(backend: Arc<FixtureBackend>, crawl: CrawlConfig) -> CrawlSession {
    CrawlSession::new(crawl, agent_config(), backend, Arc::new(ExplorerOracle::new()))
}
