//! Locator evaluation against a page snapshot.
//!
//! Backends that hold a DOM in memory use this to answer `resolve` probes.
//! Role and text queries skip hidden nodes; attribute and path queries do not.

use autopom_core_types::{Locator, PathStep};

use crate::compactor::{hidden_in_tree, is_interactive};
use crate::model::{collapse_whitespace, DomNode, RawPage, ResolvedNode};
use crate::naming::{accessible_name, implicit_role};

/// Nodes matched by `locator`, in document order.
pub fn evaluate<'a>(page: &'a RawPage, locator: &Locator) -> Vec<&'a DomNode> {
    match locator {
        Locator::TestId { attribute, value } => page
            .nodes
            .iter()
            .filter(|n| n.attributes.get(attribute) == Some(value))
            .collect(),
        Locator::Role { role, name } => page
            .nodes
            .iter()
            .filter(|n| !hidden_in_tree(page, n) && implicit_role(n) == *role)
            .filter(|n| accessible_name(page, n).as_deref() == Some(name.as_str()))
            .collect(),
        Locator::Text { text } => by_text(page, text),
        Locator::Path { anchored, steps } => by_path(page, *anchored, steps),
    }
}

pub fn resolve(page: &RawPage, locator: &Locator) -> Vec<ResolvedNode> {
    evaluate(page, locator)
        .into_iter()
        .map(|n| ResolvedNode {
            node_id: n.id,
            tag: n.tag.clone(),
            bounds: n.bounds,
        })
        .collect()
}

/// Deepest element carrying the text, preferring an interactive container.
fn by_text<'a>(page: &'a RawPage, text: &str) -> Vec<&'a DomNode> {
    let wanted = collapse_whitespace(text);
    let matching: Vec<&DomNode> = page
        .nodes
        .iter()
        .filter(|n| !hidden_in_tree(page, n) && page.text_content(n) == wanted)
        .collect();
    let is_match = |id: usize| matching.iter().any(|m| m.id == id);

    matching
        .iter()
        .copied()
        .filter(|n| {
            let interactive_ancestor = page
                .ancestors(n)
                .any(|a| is_match(a.id) && is_interactive(a));
            if interactive_ancestor {
                return false;
            }
            if is_interactive(n) {
                return true;
            }
            !matching
                .iter()
                .any(|m| m.id != n.id && page.is_descendant_of(m, n.id))
        })
        .collect()
}

fn by_path<'a>(page: &'a RawPage, anchored: bool, steps: &[PathStep]) -> Vec<&'a DomNode> {
    let Some((first, rest)) = steps.split_first() else {
        return Vec::new();
    };
    let mut current: Vec<&DomNode> = page
        .nodes
        .iter()
        .filter(|n| (anchored || n.parent.is_none()) && step_matches(page, n, first))
        .collect();
    for step in rest {
        current = page
            .nodes
            .iter()
            .filter(|n| {
                n.parent
                    .is_some_and(|p| current.iter().any(|c| c.id == p))
                    && step_matches(page, n, step)
            })
            .collect();
        if current.is_empty() {
            break;
        }
    }
    current
}

fn step_matches(page: &RawPage, node: &DomNode, step: &PathStep) -> bool {
    if node.tag != step.tag {
        return false;
    }
    if let Some(id) = &step.id {
        if node.attributes.get("id") != Some(id) {
            return false;
        }
    }
    if !step
        .attributes
        .iter()
        .all(|a| node.attributes.get(&a.name) == Some(&a.value))
    {
        return false;
    }
    match step.nth_of_type {
        Some(nth) => page.nth_of_type(node).unwrap_or(1) == nth,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DomNode;

    fn page() -> RawPage {
        RawPage {
            url: "https://example.com/login".into(),
            title: "Login".into(),
            nodes: vec![
                DomNode::new(0, None, "body"),
                DomNode::new(1, Some(0), "form").with_attr("id", "login"),
                DomNode::new(2, Some(1), "input")
                    .with_attr("name", "username")
                    .with_attr("aria-label", "Username"),
                DomNode::new(3, Some(1), "button")
                    .with_attr("type", "submit"),
                DomNode::new(4, Some(3), "span").with_text("Sign In"),
                DomNode::new(5, Some(0), "div"),
                DomNode::new(6, Some(5), "p").with_text("Sign In"),
                DomNode::new(7, Some(0), "div"),
                DomNode::new(8, Some(7), "button")
                    .with_attr("data-testid", "cancel")
                    .with_text("Cancel"),
            ],
            screenshot: None,
        }
    }

    fn ids(nodes: Vec<&DomNode>) -> Vec<usize> {
        nodes.into_iter().map(|n| n.id).collect()
    }

    #[test]
    fn role_and_test_id() {
        let page = page();
        let role = Locator::Role {
            role: "button".into(),
            name: "Sign In".into(),
        };
        assert_eq!(ids(evaluate(&page, &role)), vec![3]);
        let test_id = Locator::TestId {
            attribute: "data-testid".into(),
            value: "cancel".into(),
        };
        assert_eq!(ids(evaluate(&page, &test_id)), vec![8]);
    }

    #[test]
    fn text_prefers_interactive_container() {
        let page = page();
        let text = Locator::Text {
            text: "Sign In".into(),
        };
        // the button and the unrelated paragraph
        assert_eq!(ids(evaluate(&page, &text)), vec![3, 6]);
    }

    #[test]
    fn paths() {
        let page = page();
        let anchored = Locator::Path {
            anchored: true,
            steps: vec![
                PathStep::tag("form").with_id("login"),
                PathStep::tag("input").with_attribute("name", "username"),
            ],
        };
        assert_eq!(ids(evaluate(&page, &anchored)), vec![2]);

        let absolute = Locator::Path {
            anchored: false,
            steps: vec![
                PathStep::tag("body"),
                PathStep::tag("div").with_nth(2),
                PathStep::tag("button"),
            ],
        };
        assert_eq!(ids(evaluate(&page, &absolute)), vec![8]);

        let not_rooted = Locator::Path {
            anchored: false,
            steps: vec![PathStep::tag("form")],
        };
        assert!(evaluate(&page, &not_rooted).is_empty());
    }
}
