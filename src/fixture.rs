//! Offline browser backend driven by a YAML site description.
//!
//! Each page is a nested node tree. The backend lays nodes out on a simple
//! grid so every element has bounds, answers locator probes through
//! [`perceiver_structural::locate`], and can inject the failures a real
//! browser produces: attributes that vanish after the snapshot, stale
//! clicks, unreachable routes and a dropped connection.
//!
//! ```yaml
//! start: https://shop.test/login
//! pages:
//!   - url: https://shop.test/login
//!     title: Login
//!     nodes:
//!       - tag: form
//!         attrs: { id: login }
//!         children:
//!           - tag: input
//!             attrs: { data-testid: user-field, aria-label: Username }
//!             stale_attrs: [data-testid]
//!           - tag: button
//!             text: Sign In
//!             goto: https://shop.test/home
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use autopom_core_types::{BoundingBox, Locator};
use parking_lot::Mutex;
use perceiver_structural::{
    locate, ActOutcome, BackendError, BrowserBackend, Command, DomNode, NodeId, RawPage,
    ResolvedNode,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

const ROW_HEIGHT: f64 = 32.0;
const INDENT: f64 = 16.0;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to read fixture {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid fixture yaml: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid fixture: {0}")]
    Invalid(String),
}

/// Site description as written in YAML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteSpec {
    /// Defaults to the first page
    #[serde(default)]
    pub start: Option<String>,
    pub pages: Vec<PageSpec>,
    /// Commands accepted before the browser goes away
    #[serde(default)]
    pub disconnect_after: Option<u32>,
    /// Clicks that fail as stale before clicks start working
    #[serde(default)]
    pub stale_clicks: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageSpec {
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// Navigation to this page always times out
    #[serde(default)]
    pub unreachable: bool,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSpec {
    pub tag: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    /// Page a click on this node leads to
    #[serde(default)]
    pub goto: Option<String>,
    /// Attributes present in snapshots but gone when a locator probes the page
    #[serde(default)]
    pub stale_attrs: Vec<String>,
    #[serde(default)]
    pub children: Vec<NodeSpec>,
}

/// A value typed into a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilledValue {
    pub url: String,
    pub node: NodeId,
    pub value: String,
}

#[derive(Debug, Clone)]
struct FixturePage {
    snapshot: RawPage,
    probe: RawPage,
    targets: BTreeMap<NodeId, String>,
    unreachable: bool,
}

#[derive(Debug)]
struct Session {
    current: String,
    visited: Vec<String>,
    commands: u32,
    stale_clicks: u32,
    disconnected: bool,
    fills: Vec<FilledValue>,
}

#[derive(Debug)]
pub struct FixtureBackend {
    pages: BTreeMap<String, FixturePage>,
    start: String,
    disconnect_after: Option<u32>,
    session: Mutex<Session>,
}

impl FixtureBackend {
    pub fn from_spec(spec: SiteSpec) -> Result<Self, FixtureError> {
        let first = spec
            .pages
            .first()
            .map(|p| canonical(&p.url))
            .ok_or_else(|| FixtureError::Invalid("fixture has no pages".into()))?;
        let start = spec.start.as_deref().map(canonical).unwrap_or(first);

        let mut pages = BTreeMap::new();
        for page in &spec.pages {
            let url = canonical(&page.url);
            if pages.insert(url.clone(), build_page(&url, page)).is_some() {
                return Err(FixtureError::Invalid(format!("page {url} defined twice")));
            }
        }
        if !pages.contains_key(&start) {
            return Err(FixtureError::Invalid(format!("start page {start} is not defined")));
        }

        Ok(Self {
            pages,
            disconnect_after: spec.disconnect_after,
            session: Mutex::new(Session {
                current: start.clone(),
                visited: Vec::new(),
                commands: 0,
                stale_clicks: spec.stale_clicks,
                disconnected: false,
                fills: Vec::new(),
            }),
            start,
        })
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, FixtureError> {
        Self::from_spec(serde_yaml::from_str(raw)?)
    }

    pub async fn load(path: &Path) -> Result<Self, FixtureError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| FixtureError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_yaml_str(&raw)
    }

    pub fn start_url(&self) -> &str {
        &self.start
    }

    pub fn current_url(&self) -> String {
        self.session.lock().current.clone()
    }

    /// Every URL navigation was attempted to, in order.
    pub fn visited(&self) -> Vec<String> {
        self.session.lock().visited.clone()
    }

    pub fn fills(&self) -> Vec<FilledValue> {
        self.session.lock().fills.clone()
    }

    fn page(&self, session: &Session) -> Result<&FixturePage, BackendError> {
        self.pages
            .get(&session.current)
            .ok_or_else(|| BackendError::Detached(session.current.clone()))
    }

    fn ensure_connected(session: &Session) -> Result<(), BackendError> {
        if session.disconnected {
            return Err(BackendError::Disconnected("fixture browser closed".into()));
        }
        Ok(())
    }

    fn go(&self, session: &mut Session, url: &str) -> Result<(), BackendError> {
        let url = canonical(url);
        session.visited.push(url.clone());
        match self.pages.get(&url) {
            Some(page) if !page.unreachable => {
                debug!(url = %url, "fixture navigated");
                session.current = url;
                Ok(())
            }
            _ => Err(BackendError::NavigationTimeout(url)),
        }
    }

    fn click(&self, session: &mut Session, node: NodeId) -> Result<Option<String>, BackendError> {
        let page = self.page(session)?;
        let Some(dom) = page.snapshot.node(node) else {
            return Err(BackendError::StaleElement(format!("node {node} is gone")));
        };
        if session.stale_clicks > 0 {
            session.stale_clicks -= 1;
            return Err(BackendError::StaleElement(format!("node {node} re-rendered")));
        }
        if let Some(target) = page.targets.get(&node) {
            return Ok(Some(target.clone()));
        }
        let href = dom.attr("href").filter(|_| dom.tag == "a");
        let target = href
            .and_then(|href| Url::parse(&session.current).ok()?.join(href).ok())
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .map(|url| url.to_string())
            .filter(|url| *url != session.current);
        Ok(target)
    }
}

#[async_trait]
impl BrowserBackend for FixtureBackend {
    async fn observe(&self) -> Result<RawPage, BackendError> {
        let session = self.session.lock();
        Self::ensure_connected(&session)?;
        Ok(self.page(&session)?.snapshot.clone())
    }

    async fn act(&self, command: Command) -> Result<ActOutcome, BackendError> {
        let mut session = self.session.lock();
        Self::ensure_connected(&session)?;
        session.commands += 1;
        if self.disconnect_after.is_some_and(|limit| session.commands > limit) {
            warn!(commands = session.commands, "fixture browser disconnecting");
            session.disconnected = true;
            return Err(BackendError::Disconnected("fixture browser closed".into()));
        }

        let mut extracted = None;
        let target = match &command {
            Command::Click { node } => self.click(&mut session, *node)?,
            Command::Navigate { url } => Some(url.clone()),
            Command::Fill { node, value } => {
                let page = self.page(&session)?;
                let Some(dom) = page.snapshot.node(*node) else {
                    return Err(BackendError::StaleElement(format!("node {node} is gone")));
                };
                if !is_editable(dom) {
                    return Err(BackendError::Unsupported(format!("cannot fill <{}>", dom.tag)));
                }
                let filled = FilledValue {
                    url: session.current.clone(),
                    node: *node,
                    value: value.clone(),
                };
                session.fills.push(filled);
                None
            }
            Command::Extract { node } => {
                let page = self.page(&session)?;
                let Some(dom) = page.snapshot.node(*node) else {
                    return Err(BackendError::StaleElement(format!("node {node} is gone")));
                };
                extracted = Some(page.snapshot.text_content(dom));
                None
            }
        };

        let navigated = target.is_some();
        if let Some(url) = target {
            self.go(&mut session, &url)?;
        }
        Ok(ActOutcome {
            url: session.current.clone(),
            navigated,
            extracted,
        })
    }

    async fn navigate(&self, url: &str) -> Result<(), BackendError> {
        let mut session = self.session.lock();
        Self::ensure_connected(&session)?;
        self.go(&mut session, url)
    }

    async fn resolve(&self, locator: &Locator) -> Result<Vec<ResolvedNode>, BackendError> {
        let session = self.session.lock();
        Self::ensure_connected(&session)?;
        Ok(locate::resolve(&self.page(&session)?.probe, locator))
    }
}

fn is_editable(node: &DomNode) -> bool {
    matches!(node.tag.as_str(), "input" | "textarea" | "select")
        || node.attr("contenteditable").is_some_and(|v| v != "false")
}

fn canonical(url: &str) -> String {
    Url::parse(url.trim())
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.trim().to_string())
}

struct Builder<'a> {
    url: &'a str,
    nodes: Vec<DomNode>,
    stale: Vec<(NodeId, Vec<String>)>,
    targets: BTreeMap<NodeId, String>,
}

impl Builder<'_> {
    fn push(&mut self, spec: &NodeSpec, parent: NodeId, depth: usize) {
        let id = self.nodes.len();
        let mut node = DomNode::new(id, Some(parent), spec.tag.as_str()).with_text(spec.text.as_str());
        for (name, value) in &spec.attrs {
            node = node.with_attr(name.as_str(), value.as_str());
        }
        if let Some(role) = &spec.role {
            node = node.with_attr("role", role.as_str());
        }
        node.visible = !spec.hidden;
        node.bounds = Some(BoundingBox::new(
            INDENT * depth as f64,
            ROW_HEIGHT * id as f64,
            240.0 - INDENT * depth as f64,
            ROW_HEIGHT - 8.0,
        ));
        if !spec.stale_attrs.is_empty() {
            self.stale.push((id, spec.stale_attrs.clone()));
        }
        if let Some(goto) = &spec.goto {
            let target = Url::parse(self.url)
                .and_then(|base| base.join(goto))
                .map(|u| u.to_string())
                .unwrap_or_else(|_| canonical(goto));
            self.targets.insert(id, target);
        }
        self.nodes.push(node);
        for child in &spec.children {
            self.push(child, id, depth + 1);
        }
    }
}

fn build_page(url: &str, spec: &PageSpec) -> FixturePage {
    let mut builder = Builder {
        url,
        nodes: vec![DomNode::new(0, None, "body")],
        stale: Vec::new(),
        targets: BTreeMap::new(),
    };
    for node in &spec.nodes {
        builder.push(node, 0, 1);
    }
    let title = if spec.title.is_empty() { url.to_string() } else { spec.title.clone() };

    let snapshot = RawPage {
        url: url.to_string(),
        title,
        nodes: builder.nodes,
        screenshot: None,
    };
    let mut probe = snapshot.clone();
    for (id, attrs) in &builder.stale {
        if let Some(node) = probe.nodes.get_mut(*id) {
            for attr in attrs {
                node.attributes.remove(attr);
            }
        }
    }
    FixturePage {
        snapshot,
        probe,
        targets: builder.targets,
        unreachable: spec.unreachable,
    }
}
