//! Classification of unstable DOM tokens.
//!
//! Generated class names, framework ids and hashed path segments change
//! between builds or renders. Both the fingerprint normalization and the
//! locator engine consult this module so they agree on what is volatile.

use once_cell::sync::Lazy;
use regex::Regex;

static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("valid uuid regex")
});
static HEX_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[0-9a-f]{8,}$").expect("valid hex regex"));
static GENERATED_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(css-|sc-|jsx-|emotion-|ember\d|mui-|:r|react-select-\d|__|ng-tns-|svelte-)")
        .expect("valid prefix regex")
});
static HASH_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[-_][A-Za-z0-9]{5,}$").expect("valid suffix regex")
});

/// Placeholder a volatile route segment is replaced with.
pub fn segment_placeholder(segment: &str) -> Option<&'static str> {
    if segment.is_empty() {
        return None;
    }
    if segment.chars().all(|c| c.is_ascii_digit()) {
        return Some(":num");
    }
    if UUID.is_match(segment) {
        return Some(":uuid");
    }
    if HEX_RUN.is_match(segment) && segment.chars().any(|c| c.is_ascii_digit()) {
        return Some(":hex");
    }
    if is_volatile_token(segment) {
        return Some(":id");
    }
    None
}

/// Whether an attribute value, class token or id looks machine-generated.
pub fn is_volatile_token(token: &str) -> bool {
    let token = token.trim();
    if token.is_empty() {
        return false;
    }
    if UUID.is_match(token) || GENERATED_PREFIX.is_match(token) {
        return true;
    }
    if HEX_RUN.is_match(token) && token.chars().any(|c| c.is_ascii_digit()) {
        return true;
    }
    let digits = token.chars().filter(|c| c.is_ascii_digit()).count();
    let letters = token.chars().filter(|c| c.is_ascii_alphabetic()).count();
    if digits >= 3 && letters > 0 {
        return true;
    }
    if token.len() > 32 && !token.contains(['-', '_', ' ']) {
        return true;
    }
    // `btn-x8f7a`, `Header_title__3xYz9`
    if let Some(found) = HASH_SUFFIX.find(token) {
        let suffix = &token[found.start() + 1..];
        let has_digit = suffix.chars().any(|c| c.is_ascii_digit());
        let mixed_case = suffix.chars().any(|c| c.is_ascii_uppercase())
            && suffix.chars().any(|c| c.is_ascii_lowercase());
        if has_digit || mixed_case {
            return true;
        }
    }
    false
}
