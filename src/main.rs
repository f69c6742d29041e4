//! package-health: composite health, deprecation and version-consistency
//! report for third-party packages.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use package_health::{
    build_http_client, CacheStore, ClientMode, EngineConfig, Orchestrator, PackageRef,
    RepositoryManifest,
};

#[derive(Parser, Debug)]
#[command(name = "package-health", version, about = "Package health aggregation engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a package list or a set of repository manifests
    Analyze {
        /// JSON input: an array of packages, or {"repositories": [...]}
        #[arg(long, short = 'i')]
        input: PathBuf,

        /// TOML configuration file
        #[arg(long, short = 'c', env = "PACKAGE_HEALTH_CONFIG")]
        config: Option<PathBuf>,

        /// Write the report here instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Use grouped batch requests
        #[arg(long)]
        batch: bool,

        /// Packages analyzed in parallel
        #[arg(long)]
        concurrency: Option<usize>,

        /// Persist the response cache in this directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnalysisInput {
    Packages(Vec<PackageRef>),
    Repositories { repositories: Vec<RepositoryManifest> },
}

fn load_config(explicit: Option<&Path>) -> Result<EngineConfig> {
    if let Some(path) = explicit {
        return EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()));
    }
    match EngineConfig::default_path().filter(|p| p.exists()) {
        Some(path) => EngineConfig::load(&path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the report.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("package_health=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Analyze {
            input,
            config,
            output,
            batch,
            concurrency,
            cache_dir,
        } => {
            let mut config = load_config(config.as_deref())?;
            if batch {
                config.client.mode = ClientMode::Batch;
            }
            if let Some(concurrency) = concurrency {
                config.orchestrator.concurrency = concurrency;
            }
            if cache_dir.is_some() {
                config.cache.directory = cache_dir;
            }
            config.validate()?;

            let raw = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let parsed: AnalysisInput = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", input.display()))?;

            let cache = Arc::new(CacheStore::from_config(&config.cache));
            let client = build_http_client(&config.client, cache.clone())?;
            let orchestrator = Orchestrator::new(client, &config).with_cache(cache);

            let report = match parsed {
                AnalysisInput::Packages(packages) => orchestrator.analyze_packages(&packages).await,
                AnalysisInput::Repositories { repositories } => {
                    orchestrator.analyze_repositories(&repositories).await
                }
            };

            let json = report.to_json()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(path = %path.display(), "Report written");
                }
                None => println!("{json}"),
            }
        }
    }
    Ok(())
}
