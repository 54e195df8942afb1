use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use agent_core::{ExplorerOracle, HttpOracle, ReasoningOracle, ScriptedOracle};
use anyhow::{Context, Result};
use autopom_core_types::{ActionDecision, CrawlSchema, OutputLanguage};
use clap::Args;
use serde::Serialize;
use tokio::fs;
use tracing::{info, warn};

use super::context::CliContext;
use super::output::OutputFormat;
use crate::config::AppConfig;
use crate::fixture::FixtureBackend;
use crate::persistence::{write_artifacts, ArtifactPaths};
use crate::session::CrawlSession;

#[derive(Args, Clone, Debug)]
pub struct CrawlArgs {
    /// Site fixture to crawl (YAML)
    #[arg(long, value_name = "FILE")]
    pub site: PathBuf,

    /// Replay oracle decisions from a YAML list instead of exploring
    #[arg(long, value_name = "FILE", conflicts_with = "oracle_url")]
    pub script: Option<PathBuf>,

    /// Ask an HTTP reasoning oracle for every decision
    #[arg(long, value_name = "URL")]
    pub oracle_url: Option<String>,

    /// Output directory (defaults to the configured one)
    #[arg(long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Result format
    #[arg(long, value_enum, default_value = "human")]
    pub format: OutputFormat,

    /// Start URL (defaults to the fixture's start page)
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Maximum discovery depth
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Total action budget
    #[arg(long)]
    pub max_actions: Option<usize>,

    /// Target language of the generated page objects
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Free-text hint passed to the oracle
    #[arg(long)]
    pub goal: Option<String>,
}

impl CrawlArgs {
    fn apply(&self, config: &mut AppConfig, backend: &FixtureBackend) -> Result<()> {
        config.crawl.base_url = self
            .base_url
            .clone()
            .unwrap_or_else(|| backend.start_url().to_string());
        if let Some(depth) = self.max_depth {
            config.crawl.max_depth = depth;
        }
        if let Some(actions) = self.max_actions {
            config.crawl.max_total_actions = actions;
        }
        if let Some(language) = &self.language {
            config.crawl.language =
                OutputLanguage::from_str(language).context("Invalid --language")?;
        }
        if let Some(goal) = &self.goal {
            config.crawl.goal_hint = Some(goal.clone());
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct CrawlSummary<'a> {
    session_id: &'a str,
    base_url: &'a str,
    end_reason: &'static str,
    truncated: bool,
    states: usize,
    elements: usize,
    unverifiable: usize,
    actions_executed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    artifacts: &'a ArtifactPaths,
}

pub async fn load_script(path: &Path) -> Result<Vec<ActionDecision>> {
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("Invalid script {}", path.display()))
}

async fn build_oracle(args: &CrawlArgs, config: &AppConfig) -> Result<Arc<dyn ReasoningOracle>> {
    if let Some(path) = &args.script {
        let script = load_script(path).await?;
        info!(decisions = script.len(), "using scripted oracle");
        return Ok(Arc::new(ScriptedOracle::new(script)));
    }
    if let Some(url) = &args.oracle_url {
        info!(endpoint = %url, "using http oracle");
        let timeout = Duration::from_millis(config.agent.oracle_timeout_ms);
        return Ok(Arc::new(HttpOracle::new(url.clone(), timeout)?));
    }
    info!("using explorer oracle");
    Ok(Arc::new(ExplorerOracle::new()))
}

pub async fn cmd_crawl(args: CrawlArgs, ctx: &CliContext) -> Result<()> {
    let backend = FixtureBackend::load(&args.site)
        .await
        .with_context(|| format!("Failed to load site fixture {}", args.site.display()))?;
    let mut config = ctx.config().clone();
    args.apply(&mut config, &backend)?;
    config.validate()?;

    let oracle = build_oracle(&args, &config).await?;
    let session = CrawlSession::from_app_config(&config, Arc::new(backend), oracle);

    let token = session.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current action");
            token.cancel();
        }
    });
    let outcome = session.run().await;
    interrupt.abort();

    let (schema, failure) = match outcome {
        Ok(schema) => (schema, None),
        Err(aborted) => (aborted.schema, Some(aborted.source)),
    };
    let artifacts = write_artifacts(&schema, &config.output_dir).await?;
    print_result(&schema, &artifacts, failure.as_ref().map(ToString::to_string), args.format)?;

    match failure {
        Some(err) => Err(anyhow::Error::new(err).context("Crawl session aborted; partial schema written")),
        None => Ok(()),
    }
}

fn print_result(
    schema: &CrawlSchema,
    artifacts: &ArtifactPaths,
    error: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let meta = &schema.metadata;
    let summary = CrawlSummary {
        session_id: &meta.session_id,
        base_url: &meta.base_url,
        end_reason: meta.end_reason.as_str(),
        truncated: meta.truncated,
        states: schema.states.len(),
        elements: schema.element_count(),
        unverifiable: schema.unverifiable_count(),
        actions_executed: meta.counters.actions_executed,
        error,
        artifacts,
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&summary)?),
        OutputFormat::Human => {
            println!("Crawl {} ({})", summary.end_reason, summary.base_url);
            println!("- States: {}", summary.states);
            println!("- Elements: {} verified, {} unverifiable", summary.elements, summary.unverifiable);
            println!("- Actions executed: {}", summary.actions_executed);
            if let Some(err) = &summary.error {
                println!("- Error: {err}");
            }
            println!("Schema: {}", artifacts.schema.display());
            println!("Report: {}", artifacts.summary.display());
        }
    }
    Ok(())
}
