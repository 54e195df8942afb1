use std::sync::Arc;

use async_trait::async_trait;
use autopom_core_types::Locator;

use crate::errors::BackendError;
use crate::model::{ActOutcome, Command, RawPage, ResolvedNode};

/// Browser automation driver as seen by the crawl engine.
///
/// One session drives one backend strictly sequentially, but the verifier
/// may issue several `resolve` probes concurrently; implementations must
/// keep those read-only.
#[async_trait]
pub trait BrowserBackend: Send + Sync {
    /// Snapshot the current page.
    async fn observe(&self) -> Result<RawPage, BackendError>;

    async fn act(&self, command: Command) -> Result<ActOutcome, BackendError>;

    async fn navigate(&self, url: &str) -> Result<(), BackendError>;

    /// Evaluate a locator against the live page without side effects.
    async fn resolve(&self, locator: &Locator) -> Result<Vec<ResolvedNode>, BackendError>;
}

#[async_trait]
impl<T> BrowserBackend for Arc<T>
where
    T: BrowserBackend + ?Sized,
{
    async fn observe(&self) -> Result<RawPage, BackendError> {
        (**self).observe().await
    }

    async fn act(&self, command: Command) -> Result<ActOutcome, BackendError> {
        (**self).act(command).await
    }

    async fn navigate(&self, url: &str) -> Result<(), BackendError> {
        (**self).navigate(url).await
    }

    async fn resolve(&self, locator: &Locator) -> Result<Vec<ResolvedNode>, BackendError> {
        (**self).resolve(locator).await
    }
}
