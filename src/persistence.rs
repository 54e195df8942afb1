//! Writing and reading crawl artifacts.
//!
//! Layout under the output directory:
//!
//! * `crawl_schema.json`: the whole [`CrawlSchema`]
//! * `models_json/<PageName>.json`: one [`StateEntry::page_model`] per file

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use autopom_core_types::{CrawlSchema, StateEntry};
use serde::Serialize;
use tokio::fs;
use tracing::info;

use crate::report::write_summary;

pub const SCHEMA_FILE: &str = "crawl_schema.json";
pub const MODELS_DIR: &str = "models_json";

pub async fn write_schema(schema: &CrawlSchema, output_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let path = output_dir.join(SCHEMA_FILE);
    let json = schema.to_json_pretty().context("Failed to serialize crawl schema")?;
    fs::write(&path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), states = schema.states.len(), "crawl schema written");
    Ok(path)
}

pub async fn read_schema(path: &Path) -> Result<CrawlSchema> {
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    CrawlSchema::from_json(&raw).with_context(|| format!("Invalid crawl schema in {}", path.display()))
}

/// One file per state, named after the page.
pub async fn write_page_models(schema: &CrawlSchema, output_dir: &Path) -> Result<Vec<PathBuf>> {
    let dir = output_dir.join(MODELS_DIR);
    fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut written = Vec::new();
    for entry in schema.states.values() {
        let path = dir.join(format!("{}.json", entry.page_name));
        let json = serde_json::to_string_pretty::<StateEntry>(&entry.page_model())
            .with_context(|| format!("Failed to serialize {}", entry.page_name))?;
        fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

/// Where [`write_artifacts`] put things.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactPaths {
    pub schema: PathBuf,
    pub models: Vec<PathBuf>,
    pub summary: PathBuf,
}

/// Schema, per-page models and the markdown summary.
pub async fn write_artifacts(schema: &CrawlSchema, output_dir: &Path) -> Result<ArtifactPaths> {
    Ok(ArtifactPaths {
        schema: write_schema(schema, output_dir).await?,
        models: write_page_models(schema, output_dir).await?,
        summary: write_summary(schema, output_dir).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopom_core_types::{
        CrawlCounters, EndReason, Fingerprint, FlaggedElement, Locator, LocatorCandidate,
        OutputLanguage, SchemaMetadata, StrategyKind,
    };
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn schema() -> CrawlSchema {
        let mut schema = CrawlSchema::new(SchemaMetadata {
            session_id: "s-1".into(),
            base_url: "https://shop.test/".into(),
            language: OutputLanguage::Typescript,
            started_at: Utc::now(),
            finished_at: None,
            end_reason: EndReason::Completed,
            truncated: false,
            counters: CrawlCounters::default(),
        });
        schema.states.insert(
            Fingerprint("abc".into()),
            StateEntry {
                url: "https://shop.test/login".into(),
                route: "https://shop.test/login".into(),
                page_name: "LoginPage".into(),
                title: "Login".into(),
                depth: 0,
                visits: 1,
                elements: Vec::new(),
                unverifiable: Vec::new(),
                actions: Vec::new(),
            },
        );
        schema.finish(EndReason::Completed);
        schema
    }

    #[tokio::test]
    async fn schema_survives_a_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let schema = schema();
        let path = write_schema(&schema, dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join(SCHEMA_FILE));
        assert_eq!(read_schema(&path).await.unwrap(), schema);
    }

    #[tokio::test]
    async fn page_models_are_named_after_pages() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_page_models(&schema(), dir.path()).await.unwrap();
        assert_eq!(written, vec![dir.path().join(MODELS_DIR).join("LoginPage.json")]);
        let raw = std::fs::read_to_string(&written[0]).unwrap();
        assert!(raw.contains("\"page_name\": \"LoginPage\""));
    }

    #[tokio::test]
    async fn page_models_carry_no_selectors_for_flagged_elements() {
        let dir = tempfile::tempdir().unwrap();
        let mut schema = schema();
        let entry = schema.states.values_mut().next().unwrap();
        entry.unverifiable.push(FlaggedElement {
            index: 3,
            name: "promoBanner".into(),
            role: "link".into(),
            tag: "a".into(),
            reason: "no candidate resolved uniquely to the element".into(),
            candidates: vec![LocatorCandidate::new(
                StrategyKind::Text,
                Locator::Text { text: "Spring sale".into() },
                0.2,
            )],
        });

        let written = write_page_models(&schema, dir.path()).await.unwrap();
        let raw = std::fs::read_to_string(&written[0]).unwrap();
        assert!(raw.contains("promoBanner"));
        assert!(!raw.contains("Spring sale"));

        let full = write_schema(&schema, dir.path()).await.unwrap();
        assert_eq!(read_schema(&full).await.unwrap(), schema);
    }

    #[tokio::test]
    async fn all_artifacts_land_under_the_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_artifacts(&schema(), &dir.path().join("run")).await.unwrap();
        assert!(paths.schema.exists());
        assert!(paths.summary.exists());
        assert_eq!(paths.models.len(), 1);
    }
}
