//! AutoPOM
//!
//! Autonomous crawl-and-map engine: explores a web application with a
//! reasoning oracle in the loop, fingerprints every state it reaches and
//! hands off a schema of verified, self-healed element locators.

pub mod actions;
pub mod cli;
pub mod config;
pub mod fixture;
pub mod persistence;
pub mod report;
pub mod session;

pub use config::AppConfig;
pub use fixture::{FixtureBackend, FixtureError, SiteSpec};
pub use session::{run_sessions, CrawlSession, SessionAborted};
