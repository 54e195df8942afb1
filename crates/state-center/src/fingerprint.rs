//! Deterministic state identity.
//!
//! A fingerprint is the SHA-256 of the normalized route and the structural
//! skeleton of the compact observation. Route normalization:
//!
//! * scheme, lowercase host without a leading `www.`, explicit port, path
//! * the fragment is dropped, so hash-routed views collapse onto one route
//! * tracking keys (`utm_*`, `gclid`, `fbclid`) are always dropped; other query
//!   keys survive only when listed as significant, sorted
//! * volatile path segments become `:num`, `:uuid`, `:hex` or `:id`
//! * no trailing slash
//!
//! The skeleton is `tag|role|input-type|section-kind` per element in document
//! order. Labels, text, ids, classes and positions never reach the hash.

use autopom_core_types::volatile::segment_placeholder;
use autopom_core_types::{CrawlConfig, Fingerprint};
use perceiver_structural::CompactObservation;
use sha2::{Digest, Sha256};
use url::Url;

/// Hex characters kept from the digest.
pub const FINGERPRINT_LEN: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutePolicy {
    significant_query_keys: Vec<String>,
}

impl RoutePolicy {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            significant_query_keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &CrawlConfig) -> Self {
        Self::new(config.significant_query_keys.iter().cloned())
    }

    fn keeps(&self, key: &str) -> bool {
        !is_tracking_key(key) && self.significant_query_keys.iter().any(|k| k == key)
    }
}

fn is_tracking_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || key == "gclid" || key == "fbclid"
}

/// Normalize a URL into a route identifier.
pub fn normalize_route(raw: &str, policy: &RoutePolicy) -> String {
    let Ok(url) = Url::parse(raw.trim()) else {
        return raw.trim().trim_end_matches('/').to_string();
    };

    let mut out = String::from(url.scheme());
    if let Some(host) = url.host_str() {
        out.push_str("://");
        let host = host.to_ascii_lowercase();
        out.push_str(host.strip_prefix("www.").unwrap_or(&host));
        if let Some(port) = url.port() {
            out.push_str(&format!(":{port}"));
        }
    } else {
        out.push(':');
    }

    let segments: Vec<String> = url
        .path_segments()
        .map(|segs| {
            segs.filter(|s| !s.is_empty())
                .map(|s| segment_placeholder(s).map(str::to_string).unwrap_or_else(|| s.to_string()))
                .collect()
        })
        .unwrap_or_default();
    for segment in &segments {
        out.push('/');
        out.push_str(segment);
    }

    let mut query: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| policy.keeps(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    query.sort();
    if !query.is_empty() {
        let joined = query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        out.push('?');
        out.push_str(&joined);
    }
    out
}

/// Structural skeleton lines for an observation.
pub fn structural_signature(observation: &CompactObservation) -> Vec<String> {
    observation
        .elements
        .iter()
        .map(|e| {
            format!(
                "{}|{}|{}|{}",
                e.tag,
                e.role,
                e.input_type.as_deref().unwrap_or(""),
                e.section_kind()
            )
        })
        .collect()
}

/// Hash a normalized route and its skeleton.
pub fn fingerprint_parts(route: &str, skeleton: &[String]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(route.as_bytes());
    for line in skeleton {
        hasher.update(b"\n");
        hasher.update(line.as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    Fingerprint(digest[..FINGERPRINT_LEN].to_string())
}

/// Fingerprint of a compact observation, with the route it was computed from.
pub fn fingerprint(observation: &CompactObservation, policy: &RoutePolicy) -> (Fingerprint, String) {
    let route = normalize_route(&observation.url, policy);
    let fp = fingerprint_parts(&route, &structural_signature(observation));
    (fp, route)
}

#[cfg(test)]
mod tests {
    use super::*;
    use perceiver_structural::CompactElement;
    use pretty_assertions::assert_eq;

    fn element(index: u32, tag: &str, role: &str, label: &str, section: &str) -> CompactElement {
        CompactElement {
            index,
            node_id: index as usize,
            role: role.into(),
            tag: tag.into(),
            label: label.into(),
            input_type: (tag == "input").then(|| "text".to_string()),
            position: Some((0, index as i64 * 40)),
            section: section.into(),
            href: None,
            visual_hint: None,
        }
    }

    fn observation(url: &str, labels: [&str; 2]) -> CompactObservation {
        CompactObservation {
            route: String::new(),
            url: url.into(),
            title: "t".into(),
            landmarks: vec!["form".into()],
            elements: vec![
                element(0, "input", "textbox", labels[0], "form:login"),
                element(1, "button", "button", labels[1], "form:login"),
            ],
        }
    }

    #[test]
    fn routes_are_normalized() {
        let policy = RoutePolicy::new(["page"]);
        assert_eq!(
            normalize_route("https://WWW.Example.com/orders/12345/?utm_source=x&page=2&sort=asc#top", &policy),
            "https://example.com/orders/:num?page=2"
        );
        assert_eq!(
            normalize_route("https://example.com/u/550e8400-e29b-41d4-a716-446655440000/", &policy),
            "https://example.com/u/:uuid"
        );
        assert_eq!(normalize_route("https://example.com/", &policy), "https://example.com");
        assert_eq!(normalize_route("http://localhost:8080/a", &policy), "http://localhost:8080/a");
        assert_eq!(
            normalize_route("https://example.com/?page=1&gclid=abc", &RoutePolicy::new(["gclid", "page"])),
            "https://example.com?page=1"
        );
    }

    #[test]
    fn hash_routes_collapse() {
        let policy = RoutePolicy::default();
        let (a, _) = fingerprint(&observation("https://app.test/#/inbox", ["Search", "Go"]), &policy);
        let (b, _) = fingerprint(&observation("https://app.test/#/archive", ["Find", "Run"]), &policy);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), FINGERPRINT_LEN);
    }

    #[test]
    fn labels_and_positions_do_not_matter_but_structure_does() {
        let policy = RoutePolicy::default();
        let base = observation("https://app.test/login", ["User", "Sign in"]);
        let mut moved = observation("https://app.test/login", ["Username", "Log in"]);
        moved.elements[1].position = Some((300, 300));
        moved.elements[1].section = "form:signin".into();
        assert_eq!(fingerprint(&base, &policy).0, fingerprint(&moved, &policy).0);

        let mut extra = base.clone();
        extra.elements.push(element(2, "a", "link", "Help", "body"));
        assert_ne!(fingerprint(&base, &policy).0, fingerprint(&extra, &policy).0);

        let other_route = observation("https://app.test/register", ["User", "Sign in"]);
        assert_ne!(fingerprint(&base, &policy).0, fingerprint(&other_route, &policy).0);
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let skeleton = vec!["a|link||nav".to_string()];
        assert_eq!(
            fingerprint_parts("https://x.test", &skeleton),
            fingerprint_parts("https://x.test", &skeleton)
        );
    }
}
