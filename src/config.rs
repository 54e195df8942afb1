//! Application configuration
//!
//! One YAML document carries the crawl parameters, the loop tuning and the
//! output directory. Environment variables override the file; credentials
//! only ever come from the environment.

use std::path::PathBuf;
use std::str::FromStr;

use agent_core::AgentLoopConfig;
use anyhow::{Context, Result};
use autopom_core_types::{Credentials, CrawlConfig, OutputLanguage};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const ENV_BASE_URL: &str = "AUTOPOM_BASE_URL";
pub const ENV_MAX_DEPTH: &str = "AUTOPOM_MAX_DEPTH";
pub const ENV_MAX_ACTIONS: &str = "AUTOPOM_MAX_ACTIONS";
pub const ENV_LANGUAGE: &str = "AUTOPOM_LANGUAGE";

/// Names of the environment variables holding the login credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialSource {
    pub username_env: String,
    pub password_env: String,
}

impl Default for CredentialSource {
    fn default() -> Self {
        Self {
            username_env: "AUTOPOM_USERNAME".to_string(),
            password_env: "AUTOPOM_PASSWORD".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub crawl: CrawlConfig,
    pub agent: AgentLoopConfig,
    pub output_dir: PathBuf,
    pub credentials: CredentialSource,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            crawl: CrawlConfig::default(),
            agent: AgentLoopConfig::default(),
            output_dir: PathBuf::from("autopom-output"),
            credentials: CredentialSource::default(),
        }
    }
}

impl AppConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).context("Failed to parse config file")
    }

    /// Apply `AUTOPOM_*` overrides and read the credentials.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())?;
        self.crawl.credentials =
            Credentials::from_env(&self.credentials.username_env, &self.credentials.password_env);
        Ok(())
    }

    /// Same as [`AppConfig::apply_env_overrides`] with an explicit variable
    /// lookup, minus the credentials.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(url) = read(ENV_BASE_URL) {
            debug!(base_url = %url, "base url from environment");
            self.crawl.base_url = url;
        }
        if let Some(depth) = read(ENV_MAX_DEPTH) {
            self.crawl.max_depth = depth
                .parse()
                .with_context(|| format!("{ENV_MAX_DEPTH} must be a number, got '{depth}'"))?;
        }
        if let Some(actions) = read(ENV_MAX_ACTIONS) {
            self.crawl.max_total_actions = actions
                .parse()
                .with_context(|| format!("{ENV_MAX_ACTIONS} must be a number, got '{actions}'"))?;
        }
        if let Some(language) = read(ENV_LANGUAGE) {
            self.crawl.language = OutputLanguage::from_str(&language)
                .with_context(|| format!("invalid {ENV_LANGUAGE}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.crawl.validate().context("Invalid crawl configuration")?;
        if self.agent.history_window == 0 {
            anyhow::bail!("agent.history_window must be > 0");
        }
        if self.agent.verification_concurrency == 0 {
            anyhow::bail!("agent.verification_concurrency must be > 0");
        }
        Ok(())
    }

    /// YAML rendering with credentials reduced to whether they are set.
    pub fn to_redacted_yaml(&self) -> Result<String> {
        let mut out = serde_yaml::to_string(self).context("Failed to render configuration")?;
        let status = |set: bool| if set { "<redacted>" } else { "<unset>" };
        out.push_str(&format!(
            "# {}: {}\n# {}: {}\n",
            self.credentials.username_env,
            status(self.crawl.credentials.username().is_some()),
            self.credentials.password_env,
            status(self.crawl.credentials.password().is_some()),
        ));
        Ok(out)
    }
}
