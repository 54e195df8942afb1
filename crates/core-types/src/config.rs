//! Crawl configuration
//!
//! A [`CrawlConfig`] is built once, validated, and then shared read-only for
//! the lifetime of a session.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::CrawlError;

pub const USERNAME_PLACEHOLDER: &str = "$username";
pub const PASSWORD_PLACEHOLDER: &str = "$password";

/// Target language of the downstream code generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputLanguage {
    Java,
    #[serde(alias = "js")]
    Javascript,
    #[default]
    #[serde(alias = "ts")]
    Typescript,
}

impl OutputLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputLanguage::Java => "java",
            OutputLanguage::Javascript => "javascript",
            OutputLanguage::Typescript => "typescript",
        }
    }
}

impl fmt::Display for OutputLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputLanguage {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "java" => Ok(OutputLanguage::Java),
            "javascript" | "js" => Ok(OutputLanguage::Javascript),
            "typescript" | "ts" => Ok(OutputLanguage::Typescript),
            other => Err(CrawlError::invalid_config(format!(
                "unsupported output language '{other}'"
            ))),
        }
    }
}

/// How the browser context is obtained.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrowserMode {
    /// Launch a fresh context and navigate to the base URL
    #[default]
    Autonomous,
    /// Attach to an already running browser; the current page is the start state
    Attach { endpoint: String },
}

impl BrowserMode {
    pub fn is_attach(&self) -> bool {
        matches!(self, BrowserMode::Attach { .. })
    }
}

/// Opaque login credentials. Never serialized, never logged.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    username: Option<String>,
    password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Read credentials from the named environment variables.
    pub fn from_env(username_var: &str, password_var: &str) -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            username: read(username_var),
            password: read(password_var),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Substitute a credential placeholder; other values pass through.
    pub fn substitute(&self, value: &str) -> Result<String, CrawlError> {
        let (slot, name) = match value {
            USERNAME_PLACEHOLDER => (&self.username, "username"),
            PASSWORD_PLACEHOLDER => (&self.password, "password"),
            _ => return Ok(value.to_string()),
        };
        slot.clone()
            .ok_or_else(|| CrawlError::guardrail(format!("no {name} credential configured")))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Immutable crawl parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub base_url: String,
    /// Empty means "the base URL host"
    pub allowed_domains: Vec<String>,
    pub max_depth: u32,
    pub max_total_actions: usize,
    pub max_actions_per_state: usize,
    pub max_revisits: u32,
    pub language: OutputLanguage,
    pub mode: BrowserMode,
    pub test_id_attributes: Vec<String>,
    /// Query keys that distinguish states; all others are ignored
    pub significant_query_keys: Vec<String>,
    pub goal_hint: Option<String>,
    #[serde(skip)]
    pub credentials: Credentials,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost/".to_string(),
            allowed_domains: Vec::new(),
            max_depth: 3,
            max_total_actions: 80,
            max_actions_per_state: 12,
            max_revisits: 3,
            language: OutputLanguage::default(),
            mode: BrowserMode::default(),
            test_id_attributes: ["data-testid", "data-test", "data-qa", "data-cy"]
                .into_iter()
                .map(String::from)
                .collect(),
            significant_query_keys: Vec::new(),
            goal_hint: None,
            credentials: Credentials::default(),
        }
    }
}

impl CrawlConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_max_total_actions(mut self, actions: usize) -> Self {
        self.max_total_actions = actions;
        self
    }

    pub fn with_max_actions_per_state(mut self, actions: usize) -> Self {
        self.max_actions_per_state = actions;
        self
    }

    pub fn with_max_revisits(mut self, revisits: u32) -> Self {
        self.max_revisits = revisits;
        self
    }

    pub fn with_allowed_domain(mut self, domain: impl Into<String>) -> Self {
        self.allowed_domains.push(domain.into());
        self
    }

    pub fn with_language(mut self, language: OutputLanguage) -> Self {
        self.language = language;
        self
    }

    pub fn with_mode(mut self, mode: BrowserMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_goal_hint(mut self, hint: impl Into<String>) -> Self {
        self.goal_hint = Some(hint.into());
        self
    }

    pub fn with_significant_query_key(mut self, key: impl Into<String>) -> Self {
        self.significant_query_keys.push(key.into());
        self
    }

    pub fn base(&self) -> Result<Url, CrawlError> {
        Url::parse(&self.base_url).map_err(|e| {
            CrawlError::invalid_config(format!("base_url '{}' is not a URL: {e}", self.base_url))
        })
    }

    /// Allowlist with the base host filled in when none was configured.
    pub fn effective_allowed_domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self
            .allowed_domains
            .iter()
            .map(|d| d.trim().trim_start_matches("www.").to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        if domains.is_empty() {
            if let Some(host) = self.base().ok().and_then(|u| u.host_str().map(str::to_string)) {
                domains.push(host.trim_start_matches("www.").to_ascii_lowercase());
            }
        }
        domains
    }

    pub fn validate(&self) -> Result<(), CrawlError> {
        let base = self.base()?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(CrawlError::invalid_config(format!(
                "base_url must be http(s), got '{}'",
                base.scheme()
            )));
        }
        if self.max_total_actions == 0 {
            return Err(CrawlError::invalid_config("max_total_actions must be > 0"));
        }
        if self.max_actions_per_state == 0 {
            return Err(CrawlError::invalid_config("max_actions_per_state must be > 0"));
        }
        if self.effective_allowed_domains().is_empty() {
            return Err(CrawlError::invalid_config("domain allowlist is empty"));
        }
        if let BrowserMode::Attach { endpoint } = &self.mode {
            if endpoint.trim().is_empty() {
                return Err(CrawlError::invalid_config("attach mode needs an endpoint"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = CrawlConfig::new("https://www.example.com/app");
        config.validate().unwrap();
        assert_eq!(config.effective_allowed_domains(), vec!["example.com"]);
        assert_eq!(config.max_depth, 3);
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(CrawlConfig::new("not a url").validate().is_err());
        assert!(CrawlConfig::new("ftp://example.com").validate().is_err());
        assert!(CrawlConfig::new("https://example.com")
            .with_max_total_actions(0)
            .validate()
            .is_err());
        let attach = CrawlConfig::new("https://example.com").with_mode(BrowserMode::Attach {
            endpoint: " ".into(),
        });
        assert!(attach.validate().is_err());
    }

    #[test]
    fn language_aliases() {
        assert_eq!("ts".parse::<OutputLanguage>().unwrap(), OutputLanguage::Typescript);
        assert_eq!("JS".parse::<OutputLanguage>().unwrap(), OutputLanguage::Javascript);
        assert!("cobol".parse::<OutputLanguage>().is_err());
        let parsed: CrawlConfig = serde_yaml::from_str("base_url: https://a.test\nlanguage: js\n").unwrap();
        assert_eq!(parsed.language, OutputLanguage::Javascript);
    }

    #[test]
    fn credentials_are_redacted_and_not_serialized() {
        let config = CrawlConfig::new("https://example.com")
            .with_credentials(Credentials::new("alice", "hunter2"));
        let debug = format!("{:?}", config.credentials);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn placeholders_substitute() {
        let creds = Credentials::new("alice", "hunter2");
        assert_eq!(creds.substitute("$password").unwrap(), "hunter2");
        assert_eq!(creds.substitute("plain").unwrap(), "plain");
        assert!(Credentials::default().substitute("$username").is_err());
    }
}
