//! Context compaction.
//!
//! Turns a raw page snapshot into the small, indexed observation the
//! reasoning oracle sees. Only visible interactive nodes survive; text is
//! truncated and positions are snapped so the observation stays cheap.

use autopom_core_types::volatile::is_volatile_token;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::errors::PerceiverError;
use crate::model::{DomNode, NodeId, RawPage};
use crate::naming::{accessible_name, icon_intent, implicit_role};
use crate::ports::BrowserBackend;

const INTERACTIVE_TAGS: &[&str] = &["a", "button", "input", "select", "textarea", "summary"];

const INTERACTIVE_ATTRIBUTES: &[&str] = &["onclick", "tabindex", "contenteditable"];

const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "link",
    "checkbox",
    "radio",
    "textbox",
    "combobox",
    "listbox",
    "option",
    "menuitem",
    "tab",
    "switch",
    "slider",
    "spinbutton",
    "searchbox",
];

/// Landmark tags and the section name they open.
const LANDMARK_TAGS: &[&str] = &["form", "main", "nav", "header", "footer", "aside", "dialog"];

#[derive(Debug, Clone)]
pub struct CompactorOptions {
    pub max_elements: usize,
    pub max_label_chars: usize,
    /// Grid positions are snapped to, in pixels
    pub grid: f64,
}

impl Default for CompactorOptions {
    fn default() -> Self {
        Self {
            max_elements: 120,
            max_label_chars: 80,
            grid: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactElement {
    pub index: u32,
    #[serde(skip)]
    pub node_id: NodeId,
    pub role: String,
    pub tag: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<(i64, i64)>,
    /// Landmark section, e.g. `form:login` or `nav`
    pub section: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_hint: Option<String>,
}

impl CompactElement {
    /// Landmark kind without its qualifier.
    pub fn section_kind(&self) -> &str {
        section_kind(&self.section)
    }
}

pub fn section_kind(section: &str) -> &str {
    section.split(':').next().unwrap_or(section)
}

/// The oracle-facing view of one page state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactObservation {
    /// URL path, as shown to the oracle
    pub route: String,
    pub url: String,
    pub title: String,
    pub landmarks: Vec<String>,
    pub elements: Vec<CompactElement>,
}

impl CompactObservation {
    pub fn element(&self, index: u32) -> Option<&CompactElement> {
        self.elements.get(index as usize).filter(|e| e.index == index)
    }
}

/// A compact observation plus the raw page it was taken from.
#[derive(Debug, Clone)]
pub struct Observed {
    pub raw: RawPage,
    pub compact: CompactObservation,
}

/// Snapshot the backend's current page and compact it.
pub async fn observe(
    backend: &dyn BrowserBackend,
    options: &CompactorOptions,
) -> Result<Observed, PerceiverError> {
    let raw = backend.observe().await?;
    if raw.nodes.is_empty() {
        return Err(PerceiverError::EmptyPage(raw.url));
    }
    Ok(compact(raw, options))
}

/// Pure compaction of a snapshot.
pub fn compact(raw: RawPage, options: &CompactorOptions) -> Observed {
    let base = Url::parse(&raw.url).ok();
    let route = base
        .as_ref()
        .map(|u| u.path().to_string())
        .unwrap_or_else(|| raw.url.clone());

    let mut landmarks = Vec::new();
    for node in &raw.nodes {
        if landmark_kind(node).is_some() && !hidden_in_tree(&raw, node) {
            let section = section_name(node);
            if !landmarks.contains(&section) {
                landmarks.push(section);
            }
        }
    }

    let mut elements = Vec::new();
    let mut dropped = 0usize;
    for node in raw.nodes.iter().filter(|n| is_interactive(n)) {
        if hidden_in_tree(&raw, node) {
            continue;
        }
        if elements.len() >= options.max_elements {
            dropped += 1;
            continue;
        }
        let label = accessible_name(&raw, node).unwrap_or_default();
        let visual_hint = icon_intent(&label).map(str::to_string);
        let href = match (node.tag.as_str(), node.attr("href"), &base) {
            ("a", Some(href), Some(base)) => base.join(href).ok().map(|u| u.to_string()),
            ("a", Some(href), None) => Some(href.to_string()),
            _ => None,
        };
        elements.push(CompactElement {
            index: elements.len() as u32,
            node_id: node.id,
            role: implicit_role(node),
            tag: node.tag.clone(),
            label: truncate(&label, options.max_label_chars),
            input_type: node.input_type(),
            position: node.bounds.map(|b| {
                let snapped = b.snapped(options.grid);
                (snapped.x as i64, snapped.y as i64)
            }),
            section: enclosing_section(&raw, node),
            href,
            visual_hint,
        });
    }
    if dropped > 0 {
        debug!(url = %raw.url, dropped, "element cap reached");
    }

    let compact = CompactObservation {
        route,
        url: raw.url.clone(),
        title: raw.title.clone(),
        landmarks,
        elements,
    };
    Observed { raw, compact }
}

pub fn is_interactive(node: &DomNode) -> bool {
    if INTERACTIVE_TAGS.contains(&node.tag.as_str()) {
        return node.tag != "a" || node.has_attr("href") || node.has_attr("onclick");
    }
    if INTERACTIVE_ATTRIBUTES.iter().any(|a| {
        node.attributes
            .get(*a)
            .is_some_and(|v| !(*a == "tabindex" && v.trim() == "-1") && v != "false")
    }) {
        return true;
    }
    node.attr("role")
        .map(|r| INTERACTIVE_ROLES.contains(&r.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Hidden itself or under a hidden ancestor.
pub fn hidden_in_tree(page: &RawPage, node: &DomNode) -> bool {
    node.is_hidden() || page.ancestors(node).any(DomNode::is_hidden)
}

fn landmark_kind(node: &DomNode) -> Option<&'static str> {
    if let Some(tag) = LANDMARK_TAGS.iter().find(|t| **t == node.tag) {
        return Some(*tag);
    }
    match node.attr("role") {
        Some("form") => Some("form"),
        Some("main") => Some("main"),
        Some("navigation") => Some("nav"),
        Some("banner") => Some("header"),
        Some("contentinfo") => Some("footer"),
        Some("complementary") => Some("aside"),
        Some("dialog") | Some("alertdialog") => Some("dialog"),
        _ => None,
    }
}

/// `kind` or `kind:qualifier` when the landmark carries a stable id or name.
fn section_name(node: &DomNode) -> String {
    let kind = landmark_kind(node).unwrap_or("body");
    let qualifier = ["id", "name", "aria-label"]
        .iter()
        .filter_map(|a| node.attr(a))
        .find(|v| !is_volatile_token(v));
    match qualifier {
        Some(q) => format!("{kind}:{}", q.trim()),
        None => kind.to_string(),
    }
}

/// Section of the nearest landmark ancestor, or `body`.
pub fn enclosing_section(page: &RawPage, node: &DomNode) -> String {
    page.ancestors(node)
        .find(|a| landmark_kind(a).is_some())
        .map(section_name)
        .unwrap_or_else(|| "body".to_string())
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}
