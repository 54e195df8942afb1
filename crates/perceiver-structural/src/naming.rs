//! Semantic naming of elements and pages.
//!
//! Everything here is a pure function of the page snapshot. Name hints are
//! collected from enumerated sources in a fixed rank order; turning them into
//! an identifier is a separate step so the ranking can be tested alone.

use autopom_core_types::volatile::is_volatile_token;
use serde::{Deserialize, Serialize};

use crate::model::{collapse_whitespace, DomNode, RawPage};

/// Where a name hint came from, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NameSource {
    AriaLabel,
    LabelFor,
    AriaLabelledBy,
    Text,
    Placeholder,
    Title,
    NameAttribute,
    TestId,
    IconGlyph,
}

impl NameSource {
    /// Sources that make up the computed accessible name.
    pub fn is_accessible(&self) -> bool {
        matches!(
            self,
            NameSource::AriaLabel
                | NameSource::LabelFor
                | NameSource::AriaLabelledBy
                | NameSource::Text
                | NameSource::Placeholder
                | NameSource::Title
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameHint {
    pub source: NameSource,
    pub value: String,
}

/// Collect ranked name hints for `node`.
pub fn name_hints(page: &RawPage, node: &DomNode, test_id_attributes: &[String]) -> Vec<NameHint> {
    let mut hints = Vec::new();
    let mut push = |source: NameSource, value: &str| {
        let value = collapse_whitespace(value);
        if !value.is_empty() {
            hints.push(NameHint { source, value });
        }
    };

    if let Some(label) = node.attr("aria-label") {
        push(NameSource::AriaLabel, label);
    }
    if let Some(label) = label_for(page, node) {
        push(NameSource::LabelFor, &label);
    }
    if let Some(ids) = node.attr("aria-labelledby") {
        let text = ids
            .split_whitespace()
            .filter_map(|id| page.find_by_attr("id", id).next())
            .map(|n| page.text_content(n))
            .collect::<Vec<_>>()
            .join(" ");
        push(NameSource::AriaLabelledBy, &text);
    }
    match node.input_type().as_deref() {
        Some("submit" | "button" | "reset") => {
            if let Some(value) = node.attr("value") {
                push(NameSource::Text, value);
            }
        }
        Some(_) => {}
        None => push(NameSource::Text, &page.text_content(node)),
    }
    if let Some(placeholder) = node.attr("placeholder") {
        push(NameSource::Placeholder, placeholder);
    }
    if let Some(title) = node.attr("title").or_else(|| node.attr("alt")) {
        push(NameSource::Title, title);
    }
    if let Some(name) = node.attr("name").filter(|v| !is_volatile_token(v)) {
        push(NameSource::NameAttribute, name);
    }
    if let Some(test_id) = test_id_attributes
        .iter()
        .filter_map(|attr| node.attr(attr))
        .find(|v| !is_volatile_token(v))
    {
        push(NameSource::TestId, test_id);
    }
    if let Some(intent) = icon_class_intent(node) {
        push(NameSource::IconGlyph, intent);
    }
    hints
}

/// Computed accessible name: the best hint from an accessible source.
pub fn accessible_name(page: &RawPage, node: &DomNode) -> Option<String> {
    name_hints(page, node, &[])
        .into_iter()
        .find(|h| h.source.is_accessible())
        .map(|h| h.value)
}

fn label_for(page: &RawPage, node: &DomNode) -> Option<String> {
    if let Some(id) = node.attr("id") {
        if let Some(label) = page
            .nodes
            .iter()
            .find(|n| n.tag == "label" && n.attr("for") == Some(id))
        {
            return Some(page.text_content(label));
        }
    }
    page.ancestors(node)
        .find(|a| a.tag == "label")
        .map(|label| page.text_content(label))
}

/// Intent of a glyph or icon word, if it is one.
pub fn icon_intent(value: &str) -> Option<&'static str> {
    match value.trim().to_lowercase().as_str() {
        "x" | "×" | "✕" | "✖" | "close" | "dismiss" => Some("closeModal"),
        "☰" | "≡" | "menu" | "hamburger" => Some("openMenu"),
        "🔍" | "🔎" | "search" => Some("search"),
        _ => None,
    }
}

fn icon_class_intent(node: &DomNode) -> Option<&'static str> {
    let tokens = node
        .attr("class")
        .into_iter()
        .chain(node.attr("data-icon"))
        .flat_map(|v| v.split(|c: char| c.is_whitespace() || c == '-' || c == '_'));
    for token in tokens {
        if let Some(intent) = icon_intent(token) {
            return Some(intent);
        }
    }
    None
}

/// Role from the `role` attribute or the tag's implicit semantics.
pub fn implicit_role(node: &DomNode) -> String {
    if let Some(role) = node.attr("role").and_then(|r| r.split_whitespace().next()) {
        let role = role.to_ascii_lowercase();
        if role != "none" && role != "presentation" {
            return role;
        }
    }
    let role = match node.tag.as_str() {
        "a" if node.has_attr("href") => "link",
        "button" | "summary" => "button",
        "select" if node.has_attr("multiple") => "listbox",
        "select" => "combobox",
        "textarea" => "textbox",
        "option" => "option",
        "input" => match node.input_type().as_deref() {
            Some("checkbox") => "checkbox",
            Some("radio") => "radio",
            Some("submit" | "button" | "reset" | "image") => "button",
            Some("search") => "searchbox",
            Some("number") => "spinbutton",
            Some("range") => "slider",
            _ => "textbox",
        },
        _ if node.attr("contenteditable").is_some_and(|v| v != "false") => "textbox",
        _ => "generic",
    };
    role.to_string()
}

pub fn role_suffix(role: &str) -> &'static str {
    match role {
        "button" | "menuitem" | "tab" | "switch" => "Button",
        "link" => "Link",
        "textbox" | "searchbox" | "spinbutton" => "Input",
        "combobox" | "listbox" => "Select",
        "checkbox" => "Checkbox",
        "radio" => "Radio",
        "option" => "Option",
        "slider" => "Slider",
        _ => "Element",
    }
}

/// camelCase identifier with a role suffix, e.g. `signInButton`.
pub fn semantic_name(hints: &[NameHint], role: &str) -> String {
    for hint in hints {
        if let Some(intent) = icon_intent(&hint.value) {
            return format!("{intent}Button");
        }
        if hint.source == NameSource::IconGlyph {
            return format!("{}Button", hint.value);
        }
        let base = camel_case(&hint.value, 4);
        if base.is_empty() {
            continue;
        }
        let suffix = role_suffix(role);
        let base = if base.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            format!("el{base}")
        } else {
            base
        };
        if base.to_lowercase().ends_with(&suffix.to_lowercase()) {
            return base;
        }
        return format!("{base}{suffix}");
    }
    format!("unnamed{}", role_suffix(role))
}

/// Append numeric suffixes to repeated names, in order.
pub fn dedupe_names(names: &mut [String]) {
    let mut seen = std::collections::HashMap::<String, usize>::new();
    for name in names.iter_mut() {
        let count = seen.entry(name.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            name.push_str(&count.to_string());
        }
    }
}

/// Page object class name for a route path: `/` is `HomePage`.
pub fn page_name(path: &str) -> String {
    let words: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty() && !s.starts_with(':'))
        .flat_map(|s| s.split(|c: char| !c.is_ascii_alphanumeric()))
        .filter(|w| !w.is_empty())
        .map(capitalize)
        .collect();
    if words.is_empty() {
        return "HomePage".to_string();
    }
    let mut name = words.concat();
    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        name.insert_str(0, "Page");
    }
    if !name.ends_with("Page") {
        name.push_str("Page");
    }
    name
}

fn camel_case(value: &str, max_words: usize) -> String {
    let words: Vec<&str> = value
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .take(max_words)
        .collect();
    let mut out = String::new();
    for (i, word) in words.iter().enumerate() {
        if i == 0 {
            out.push_str(&word.to_ascii_lowercase());
        } else {
            out.push_str(&capitalize(word));
        }
    }
    out
}

fn capitalize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
