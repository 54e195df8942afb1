//! End-to-end crawls against the bundled site fixtures.

mod common;

use std::sync::Arc;

use agent_core::ScriptedOracle;
use autopom::persistence::write_artifacts;
use autopom::CrawlSession;
use autopom_core_types::{CrawlSchema, EndReason, SchemaElement, StateEntry, StrategyKind};
use pretty_assertions::assert_eq;

use common::{agent_config, crawl_config, explorer_session, fixture, login_credentials};

fn state<'a>(schema: &'a CrawlSchema, page_name: &str) -> &'a StateEntry {
    schema
        .states
        .values()
        .find(|s| s.page_name == page_name)
        .unwrap_or_else(|| panic!("no state named {page_name}"))
}

fn element<'a>(state: &'a StateEntry, name: &str) -> &'a SchemaElement {
    state
        .elements
        .iter()
        .find(|e| e.name == name)
        .unwrap_or_else(|| panic!("no element named {name} on {}", state.page_name))
}

#[tokio::test]
async fn login_form_heals_a_vanished_test_id() {
    let backend = fixture("login.yaml");
    let crawl = crawl_config(&backend).with_credentials(login_credentials());
    let schema = explorer_session(backend.clone(), crawl).run().await.unwrap();

    let login = state(&schema, "LoginPage");
    let username = element(login, "usernameInput");
    let best = username.best().unwrap();
    assert_eq!(best.strategy, StrategyKind::RoleName);
    assert!(best.verified);

    let test_id = username
        .candidates
        .iter()
        .find(|c| c.strategy == StrategyKind::TestId)
        .expect("test id candidate kept for the record");
    assert!(!test_id.verified);
    assert!(test_id.failures >= 1);
    assert!(test_id.stability < best.stability);

    // untouched fields keep their test id on top
    let password = element(login, "passwordInput");
    assert_eq!(password.best().unwrap().strategy, StrategyKind::TestId);
    assert!(password.best().unwrap().verified);
}

#[tokio::test]
async fn login_page_gets_a_login_action() {
    let backend = fixture("login.yaml");
    let crawl = crawl_config(&backend).with_credentials(login_credentials());
    let schema = explorer_session(backend, crawl).run().await.unwrap();

    let login = state(&schema, "LoginPage");
    assert_eq!(login.actions.len(), 1);
    assert_eq!(login.actions[0].name, "login");
    assert_eq!(login.actions[0].params, vec!["username", "password"]);
    assert_eq!(login.actions[0].steps.last().unwrap().element, "signInButton");

    let settings = state(&schema, "SettingsPage");
    assert_eq!(settings.actions[0].name, "submitProfile");
}

#[tokio::test]
async fn credentials_reach_the_browser_but_not_the_schema() {
    let backend = fixture("login.yaml");
    let crawl = crawl_config(&backend).with_credentials(login_credentials());
    let schema = explorer_session(backend.clone(), crawl).run().await.unwrap();

    let typed: Vec<String> = backend.fills().into_iter().map(|f| f.value).collect();
    assert!(typed.contains(&"alice".to_string()));
    assert!(typed.contains(&"s3cret".to_string()));

    let json = schema.to_json_pretty().unwrap();
    assert!(!json.contains("s3cret"));
    assert!(!json.contains("alice"));
}

#[tokio::test]
async fn hidden_and_unlinked_pages_stay_unmapped() {
    let backend = fixture("login.yaml");
    let crawl = crawl_config(&backend).with_credentials(login_credentials());
    let schema = explorer_session(backend.clone(), crawl).run().await.unwrap();

    assert_eq!(schema.metadata.end_reason, EndReason::Completed);
    let mut names: Vec<&str> = schema.states.values().map(|s| s.page_name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["DashboardPage", "LoginPage", "OrdersPage", "SettingsPage"]);
    assert!(backend.visited().iter().all(|u| !u.contains("/admin")));
    let dashboard = state(&schema, "DashboardPage");
    assert!(dashboard.elements.iter().all(|e| e.label != "Admin"));
}

#[tokio::test]
async fn hash_routes_with_one_skeleton_are_one_state() {
    let backend = fixture("spa.yaml");
    let schema = explorer_session(backend.clone(), crawl_config(&backend))
        .run()
        .await
        .unwrap();

    assert_eq!(schema.states.len(), 1);
    assert_eq!(schema.metadata.counters.states_discovered, 1);
    assert!(backend.visited().iter().any(|u| u.ends_with("#/about")));
    let only = schema.states.values().next().unwrap();
    assert_eq!(only.visits, 1);
    assert_eq!(only.elements.len(), 2);
}

#[tokio::test]
async fn out_of_domain_targets_are_never_visited() {
    let backend = fixture("shop.yaml");
    let schema = explorer_session(backend.clone(), crawl_config(&backend))
        .run()
        .await
        .unwrap();

    assert!(backend.visited().iter().all(|u| !u.contains("partner.test")));
    assert!(schema.metadata.counters.guardrail_rejections >= 2);
    assert!(schema.states.values().all(|s| s.url.starts_with("https://shop.test/")));
}

#[tokio::test]
async fn scripted_oracle_cannot_navigate_off_domain() {
    let backend = fixture("shop.yaml");
    let raw = std::fs::read_to_string(common::fixture_path("shop-script.yaml")).unwrap();
    let script: Vec<autopom_core_types::ActionDecision> = serde_yaml::from_str(&raw).unwrap();
    let session = CrawlSession::new(
        crawl_config(&backend),
        agent_config(),
        backend.clone(),
        Arc::new(ScriptedOracle::new(script)),
    );
    let schema = session.run().await.unwrap();

    assert_eq!(schema.metadata.end_reason, EndReason::Completed);
    assert_eq!(schema.metadata.counters.guardrail_rejections, 1);
    assert!(backend.visited().iter().all(|u| !u.contains("partner.test")));
}

#[tokio::test]
async fn numeric_routes_collapse_and_flaky_clicks_recover() {
    let backend = fixture("shop.yaml");
    let schema = explorer_session(backend.clone(), crawl_config(&backend))
        .run()
        .await
        .unwrap();

    let product_states: Vec<&StateEntry> = schema
        .states
        .values()
        .filter(|s| s.route.contains("/products/"))
        .collect();
    assert_eq!(product_states.len(), 1);
    assert_eq!(product_states[0].route, "https://shop.test/products/:num");
    assert!(schema.metadata.counters.actions_failed >= 1);
    assert!(schema.states.values().any(|s| s.page_name == "CartPage"));
    assert!(schema.states.values().all(|s| !s.route.ends_with("/careers")));
}

#[tokio::test]
async fn recrawling_the_same_site_gives_the_same_map() {
    let first = {
        let backend = fixture("shop.yaml");
        explorer_session(backend.clone(), crawl_config(&backend)).run().await.unwrap()
    };
    let second = {
        let backend = fixture("shop.yaml");
        explorer_session(backend.clone(), crawl_config(&backend)).run().await.unwrap()
    };

    assert_ne!(first.metadata.session_id, second.metadata.session_id);
    assert_eq!(first.metadata.counters, second.metadata.counters);
    assert_eq!(first.states, second.states);
}

#[tokio::test]
async fn artifacts_are_written_for_a_crawl() {
    let backend = fixture("shop.yaml");
    let schema = explorer_session(backend.clone(), crawl_config(&backend))
        .run()
        .await
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let paths = write_artifacts(&schema, dir.path()).await.unwrap();

    let stored = autopom::persistence::read_schema(&paths.schema).await.unwrap();
    assert_eq!(stored.states, schema.states);
    assert_eq!(paths.models.len(), schema.states.len());
    let summary = std::fs::read_to_string(&paths.summary).unwrap();
    assert!(summary.contains(&format!("- Pages modeled: {}", schema.states.len())));
}
