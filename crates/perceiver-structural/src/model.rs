use std::collections::BTreeMap;

use autopom_core_types::BoundingBox;
use serde::{Deserialize, Serialize};

/// Driver handle of a DOM node.
pub type NodeId = usize;

/// One DOM node as reported by the browser backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomNode {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Own text, excluding descendants
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl DomNode {
    pub fn new(id: NodeId, parent: Option<NodeId>, tag: impl Into<String>) -> Self {
        Self {
            id,
            parent,
            tag: tag.into().to_ascii_lowercase(),
            attributes: BTreeMap::new(),
            text: String::new(),
            bounds: None,
            visible: true,
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn input_type(&self) -> Option<String> {
        match self.tag.as_str() {
            "input" => Some(
                self.attr("type")
                    .unwrap_or("text")
                    .to_ascii_lowercase(),
            ),
            _ => None,
        }
    }

    /// Hidden by attribute or layout.
    pub fn is_hidden(&self) -> bool {
        !self.visible
            || self.has_attr("hidden")
            || self.attr("aria-hidden") == Some("true")
            || self.input_type().as_deref() == Some("hidden")
    }
}

/// Raw page snapshot, nodes in document order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPage {
    pub url: String,
    #[serde(default)]
    pub title: String,
    pub nodes: Vec<DomNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<Vec<u8>>,
}

impl RawPage {
    pub fn node(&self, id: NodeId) -> Option<&DomNode> {
        // Backends usually number nodes in document order.
        match self.nodes.get(id) {
            Some(node) if node.id == id => Some(node),
            _ => self.nodes.iter().find(|n| n.id == id),
        }
    }

    pub fn parent(&self, node: &DomNode) -> Option<&DomNode> {
        node.parent.and_then(|id| self.node(id))
    }

    /// Ancestors from the direct parent up to the root.
    pub fn ancestors<'a>(&'a self, node: &'a DomNode) -> impl Iterator<Item = &'a DomNode> + 'a {
        std::iter::successors(self.parent(node), move |n| self.parent(n))
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &DomNode> {
        self.nodes.iter().filter(move |n| n.parent == Some(id))
    }

    pub fn is_descendant_of(&self, node: &DomNode, ancestor: NodeId) -> bool {
        self.ancestors(node).any(|a| a.id == ancestor)
    }

    /// Own text plus all descendant text, whitespace collapsed.
    pub fn text_content(&self, node: &DomNode) -> String {
        let mut parts = Vec::new();
        if !node.text.trim().is_empty() {
            parts.push(node.text.trim().to_string());
        }
        for other in &self.nodes {
            if other.id != node.id && !other.text.trim().is_empty() && self.is_descendant_of(other, node.id) {
                parts.push(other.text.trim().to_string());
            }
        }
        collapse_whitespace(&parts.join(" "))
    }

    /// 1-based index among siblings with the same tag, if there is more than one.
    pub fn nth_of_type(&self, node: &DomNode) -> Option<usize> {
        let siblings: Vec<&DomNode> = self
            .nodes
            .iter()
            .filter(|n| n.parent == node.parent && n.tag == node.tag)
            .collect();
        if siblings.len() < 2 {
            return None;
        }
        siblings.iter().position(|n| n.id == node.id).map(|p| p + 1)
    }

    pub fn find_by_attr(&self, name: &str, value: &str) -> impl Iterator<Item = &DomNode> {
        let (name, value) = (name.to_string(), value.to_string());
        self.nodes
            .iter()
            .filter(move |n| n.attr(&name) == Some(value.as_str()))
    }
}

pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Node matched by a locator probe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedNode {
    pub node_id: NodeId,
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,
}

/// Low-level command executed by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Click { node: NodeId },
    Fill { node: NodeId, value: String },
    Navigate { url: String },
    Extract { node: NodeId },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Click { .. } => "click",
            Command::Fill { .. } => "fill",
            Command::Navigate { .. } => "navigate",
            Command::Extract { .. } => "extract",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActOutcome {
    /// URL after the command settled
    pub url: String,
    pub navigated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted: Option<String>,
}
