//! Shared primitives for the AutoPOM crawl engine.
//!
//! Every other crate in the workspace speaks in these types: the crawl
//! configuration, the page/element/locator model, the action history, the
//! persisted [`CrawlSchema`] and the [`CrawlError`] taxonomy.

pub mod config;
pub mod errors;
pub mod locator;
pub mod model;
pub mod schema;
pub mod volatile;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use config::{
    BrowserMode, Credentials, CrawlConfig, OutputLanguage, PASSWORD_PLACEHOLDER,
    USERNAME_PLACEHOLDER,
};
pub use errors::{CrawlError, CrawlResult};
pub use locator::{AttributeMatch, Locator, PathStep, StrategyKind};
pub use model::{
    ActionDecision, ActionHistory, ActionKey, ActionOutcome, ActionRecord, ActionType,
    BoundingBox, ElementRef, InteractiveElement, LocatorCandidate, VerificationStatus,
};
pub use schema::{
    CrawlCounters, CrawlSchema, EndReason, FlaggedElement, PageAction, PageActionStep,
    SchemaElement, SchemaMetadata, StateEntry, SCHEMA_VERSION,
};

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic identity of an application state.
///
/// Produced by the fingerprint index from the normalized route and the
/// structural skeleton of the page; never from volatile attributes.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
