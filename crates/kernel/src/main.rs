//! Keystone site bootstrapper.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use keystone_kernel::cli::Args;
use keystone_kernel::module::PackageCatalog;
use keystone_kernel::{Bootstrap, OverrideSource, Outcome, SiteConfig};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let args = Args::parse();
    let base = read_site_file(&args.config)?;

    let mut config = SiteConfig::resolve(base, OverrideSource::ProjectFile)
        .context("failed to resolve site configuration")?;
    config.apply_env()?;
    info!(site = %config.short_name, modules = config.modules.len(), "configuration loaded");

    let outcome = Bootstrap::new(config, args.invocation())
        .packages(packages())
        .build()
        .await?
        .go()
        .await?;

    match outcome {
        Outcome::Generated(id) => info!(generation = %id, "done"),
        Outcome::TaskCompleted(name) => info!(task = %name, "done"),
        Outcome::Served => info!("server stopped"),
    }
    Ok(())
}

/// Read the site file; `root` defaults to the directory holding it.
fn read_site_file(path: &Path) -> Result<toml::Table> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut table: toml::Table =
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))?;

    if !table.contains_key("root") {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let dir = dir
            .canonicalize()
            .with_context(|| format!("failed to resolve {}", dir.display()))?;
        table.insert(
            "root".to_string(),
            toml::Value::String(dir.to_string_lossy().into_owned()),
        );
    }
    Ok(table)
}

/// Packages compiled into this binary.
fn packages() -> PackageCatalog {
    let mut catalog = PackageCatalog::new();
    catalog.register("keystone-blog", keystone_blog::factory());
    catalog.register_with_requires(
        "keystone-comments",
        keystone_comments::factory(),
        ["keystone-blog"],
    );
    catalog
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
