//! End-to-end runs over a scripted transport.

use async_trait::async_trait;
use package_health::client::{build_client, CacheStore, RawResponse, Transport, TransportError};
use package_health::config::{ClientMode, EngineConfig};
use package_health::{Grade, Orchestrator, PackageRef, RepositoryManifest};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BASE: &str = "https://meta.test/v3alpha";

// ============================================================================
// Scripted transport
// ============================================================================

#[derive(Default)]
struct ScriptedTransport {
    responses: Mutex<HashMap<String, RawResponse>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    fn respond(&self, url: String, status: u16, body: &str) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url, RawResponse::new(status, body));
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(&self, url: &str) -> Result<RawResponse, TransportError> {
        self.calls.lock().unwrap().push(url.to_string());
        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| RawResponse::new(404, "")))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
        self.answer(url)
    }

    async fn post_json(&self, url: &str, _body: &str) -> Result<RawResponse, TransportError> {
        self.answer(url)
    }
}

// ============================================================================
// Fixtures
// ============================================================================

const EXPRESS: &str = r#"{
    "packageKey": {"system": "NPM", "name": "express"},
    "versions": [
        {"versionKey": {"system": "NPM", "name": "express", "version": "4.17.0"}},
        {"versionKey": {"system": "NPM", "name": "express", "version": "4.18.2"}, "isDefault": true}
    ],
    "dependentCount": 120
}"#;

const EXPRESS_4_17: &str = r#"{
    "versionKey": {"system": "NPM", "name": "express", "version": "4.17.0"},
    "licenses": ["MIT"],
    "advisoryKeys": [{"id": "GHSA-rv95-896h-c2vc"}]
}"#;

fn engine_config(mode: ClientMode) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.client.base_url = BASE.to_string();
    config.client.mode = mode;
    config.client.requests_per_second = 0;
    config.client.retry.max_retries = 0;
    config
}

fn orchestrator(transport: Arc<ScriptedTransport>, config: &EngineConfig) -> Orchestrator {
    let cache = Arc::new(CacheStore::new(Duration::from_secs(3600)));
    let client = build_client(&config.client, transport, cache.clone());
    Orchestrator::new(client, config).with_cache(cache)
}

fn package_url(name: &str) -> String {
    format!("{BASE}/systems/NPM/packages/{name}")
}

fn version_url(name: &str, version: &str) -> String {
    format!("{BASE}/systems/NPM/packages/{name}/versions/{version}")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_sequential_run_scores_and_surfaces_failures() {
    let transport = Arc::new(ScriptedTransport::default());
    transport
        .respond(package_url("express"), 200, EXPRESS)
        .respond(version_url("express", "4.17.0"), 200, EXPRESS_4_17)
        .respond(package_url("broken"), 200, "{not json");

    let config = engine_config(ClientMode::Sequential);
    let report = orchestrator(transport.clone(), &config)
        .analyze_packages(&[
            PackageRef::new("npm", "express", "4.17.0"),
            PackageRef::new("npm", "ghost", "1.0.0"),
            PackageRef::new("npm", "broken", "1.0.0"),
        ])
        .await;

    assert_eq!(report.packages.len(), 3);
    assert_eq!(report.summary.analyzed, 1);
    assert_eq!(report.summary.failed, 2);

    let express = report.packages[0].health.as_ref().unwrap();
    assert_eq!(express.components.scorecard, 50);
    assert_eq!(express.components.maintenance, 50);
    assert_eq!(express.components.security, 75);
    assert_eq!(express.components.freshness, 75);
    assert_eq!(express.components.popularity, 60);
    // 15 + 12.5 + 18.75 + 7.5 + 6 = 59.75
    assert_eq!(express.health_score, 60);
    assert_eq!(express.health_grade, Grade::Fair);
    assert!(express.is_outdated);
    assert_eq!(express.advisories, vec!["GHSA-rv95-896h-c2vc"]);

    assert_eq!(
        report.packages[1].error.as_deref(),
        Some("package not found in metadata service")
    );
    assert!(report.packages[2]
        .error
        .as_deref()
        .unwrap()
        .starts_with("Malformed response"));

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["summary"]["total_packages"], 3);
    assert!(json["packages"][1].get("health_grade").is_none());
    assert_eq!(json["metadata"]["client_mode"], "sequential");
}

#[tokio::test]
async fn test_second_run_is_served_from_cache() {
    let transport = Arc::new(ScriptedTransport::default());
    transport
        .respond(package_url("express"), 200, EXPRESS)
        .respond(version_url("express", "4.17.0"), 200, EXPRESS_4_17);
    let config = engine_config(ClientMode::Sequential);
    let orchestrator = orchestrator(transport.clone(), &config);
    let packages = [
        PackageRef::new("npm", "express", "4.17.0"),
        PackageRef::new("npm", "ghost", "1.0.0"),
    ];

    let first = orchestrator.analyze_packages(&packages).await;
    let calls_after_first = transport.calls().len();
    assert_eq!(calls_after_first, 3);

    let second = orchestrator.analyze_packages(&packages).await;
    assert_eq!(transport.calls().len(), calls_after_first);
    assert_eq!(first.packages, second.packages);

    let cache = second.metadata.stats.cache.unwrap();
    assert_eq!(cache.hits, 3);
}

#[tokio::test]
async fn test_batch_mode_issues_grouped_requests() {
    let transport = Arc::new(ScriptedTransport::default());
    transport
        .respond(
            format!("{BASE}/packagebatch"),
            200,
            &format!(
                r#"{{"responses": [
                    {{"request": {{"packageKey": {{"system": "NPM", "name": "express"}}}}, "package": {EXPRESS}}},
                    {{"request": {{"packageKey": {{"system": "NPM", "name": "ghost"}}}}, "package": null}}
                ]}}"#
            ),
        )
        .respond(
            format!("{BASE}/versionbatch"),
            200,
            &format!(
                r#"{{"responses": [
                    {{"request": {{"versionKey": {{"system": "NPM", "name": "express", "version": "4.17.0"}}}}, "version": {EXPRESS_4_17}}}
                ]}}"#
            ),
        );

    let config = engine_config(ClientMode::Batch);
    let report = orchestrator(transport.clone(), &config)
        .analyze_packages(&[
            PackageRef::new("npm", "express", "4.17.0"),
            PackageRef::new("npm", "ghost", "1.0.0"),
        ])
        .await;

    assert_eq!(
        transport.calls(),
        vec![format!("{BASE}/packagebatch"), format!("{BASE}/versionbatch")]
    );
    assert_eq!(report.metadata.client_mode, "batch");
    assert_eq!(report.packages[0].health.as_ref().unwrap().components.security, 75);
    assert!(report.packages[1].is_failed());
}

#[tokio::test]
async fn test_batch_failure_falls_back_to_per_package_requests() {
    let transport = Arc::new(ScriptedTransport::default());
    transport
        .respond(format!("{BASE}/packagebatch"), 503, "")
        .respond(format!("{BASE}/versionbatch"), 503, "")
        .respond(package_url("express"), 200, EXPRESS)
        .respond(version_url("express", "4.17.0"), 200, EXPRESS_4_17);

    let config = engine_config(ClientMode::Batch);
    let report = orchestrator(transport.clone(), &config)
        .analyze_packages(&[PackageRef::new("npm", "express", "4.17.0")])
        .await;

    assert_eq!(report.summary.analyzed, 1);
    assert!(transport.calls().contains(&package_url("express")));
}

#[tokio::test]
async fn test_repository_run_reports_inconsistencies() {
    let transport = Arc::new(ScriptedTransport::default());
    transport
        .respond(package_url("express"), 200, EXPRESS)
        .respond(version_url("express", "4.17.0"), 200, EXPRESS_4_17)
        .respond(
            version_url("express", "4.18.2"),
            200,
            r#"{"versionKey": {"system": "NPM", "name": "express", "version": "4.18.2"}}"#,
        );

    let manifest = |repo: &str, version: &str| RepositoryManifest {
        repository: repo.to_string(),
        packages: vec![PackageRef::new("npm", "express", version)],
    };
    let config = engine_config(ClientMode::Sequential);
    let report = orchestrator(transport.clone(), &config)
        .analyze_repositories(&[
            manifest("org/web", "4.18.2"),
            manifest("org/api", "4.18.2"),
            manifest("org/admin", "4.17.0"),
        ])
        .await;

    assert_eq!(report.packages.len(), 3);
    assert_eq!(report.summary.total_packages, 3);
    assert_eq!(report.summary.unique_packages, 2);
    assert_eq!(report.summary.inconsistencies, 1);
    assert_eq!(
        transport
            .calls()
            .iter()
            .filter(|url| **url == version_url("express", "4.18.2"))
            .count(),
        1
    );

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["packages"][1]["repository"], "org/api");
    assert_eq!(json["packages"][2]["version"], "4.17.0");

    let found = &report.version_inconsistencies[0];
    assert_eq!(found.package, "express");
    assert_eq!(found.recommended_version, "4.18.2");
    assert_eq!(found.outlier_versions, vec!["4.17.0"]);
    assert_eq!(found.affected_repositories, 1);
    assert_eq!(found.estimated_effort_hours, 2);
}
