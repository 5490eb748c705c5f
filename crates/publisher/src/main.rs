//! DataForge Publisher
//!
//! Command-line entry point for the publication pipeline:
//! - `publish <id> <doi|minid> <user>`
//! - `version <id> <user>` / `copy <id> <user>`
//! - `delete <id>`
//! - `manifest <id>`
//! - `resolve-doi <doi>` / `resolve-minid <minid>`
//! - `migrate`

use anyhow::{bail, Context};
use dataforge_common::{
    config::AppConfig, db::DbPool, metrics::register_metrics, storage::LocalStorage,
    MetadataPolicy, OwnershipAccess, Repository, ResourceStore, VERSION,
};
use dataforge_publisher::{
    lineage::Lineage,
    manifest::{self, ManifestBuilder},
    resolve::{resolve_doi, resolve_minid},
    PublishType, Publisher, Services,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: publisher <publish|version|copy|delete|manifest|resolve-doi|resolve-minid|migrate> [args...]";

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn arg<'a>(args: &'a [String], idx: usize, name: &str) -> anyhow::Result<&'a str> {
    args.get(idx)
        .map(String::as_str)
        .with_context(|| format!("missing <{}>\n{}", name, USAGE))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Arc::new(AppConfig::load().context("Failed to load configuration")?);
    init_tracing(&config);
    register_metrics();

    info!("Starting DataForge Publisher v{}", VERSION);

    let args: Vec<String> = std::env::args().collect();
    let command = arg(&args, 1, "command")?;

    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    if command == "migrate" {
        db.migrate().await?;
        println!("Migrations applied");
        return Ok(());
    }
    let store: Arc<dyn ResourceStore> = match command {
        "resolve-doi" | "resolve-minid" => Arc::new(Repository::with_replica_reads(db)),
        _ => Arc::new(Repository::new(db)),
    };

    let services = Services {
        store: store.clone(),
        storage: Arc::new(LocalStorage::new(config.storage.root.clone())),
        access: Arc::new(OwnershipAccess::new()),
        policy: Arc::new(MetadataPolicy::from_config(&config.publication)),
        config: config.clone(),
    };

    let result = run(command, &args, services).await;
    if let Err(e) = &result {
        error!(error = %e, command = %command, "Command failed");
    }
    result
}

async fn run(command: &str, args: &[String], services: Services) -> anyhow::Result<()> {
    match command {
        "publish" => {
            let short_id = arg(args, 2, "id")?;
            let publish_type: PublishType = arg(args, 3, "doi|minid")?.parse()?;
            let username = arg(args, 4, "user")?;

            let publisher = Publisher::from_config(services)?;
            let resource = publisher.publish(username, short_id, publish_type).await?;
            println!(
                "Published {} as {}",
                resource.short_id,
                resource.persistent_identifier().unwrap_or_default()
            );
        }
        "version" => {
            let lineage = Lineage::new(services);
            let version = lineage
                .version_resource(arg(args, 2, "id")?, arg(args, 3, "user")?)
                .await?;
            println!("{}", version.short_id);
        }
        "copy" => {
            let lineage = Lineage::new(services);
            let copy = lineage
                .copy_resource_as(arg(args, 2, "id")?, arg(args, 3, "user")?)
                .await?;
            println!("{}", copy.short_id);
        }
        "delete" => {
            let deleted = Lineage::new(services)
                .delete_resource(arg(args, 2, "id")?)
                .await?;
            println!("Deleted {}", deleted);
        }
        "manifest" => {
            let entries = ManifestBuilder::new(services)
                .build_for(arg(args, 2, "id")?)
                .await?;
            println!("{}", manifest::to_json(&entries)?);
        }
        "resolve-doi" => {
            println!("{}", resolve_doi(services.store.as_ref(), arg(args, 2, "doi")?).await?);
        }
        "resolve-minid" => {
            println!(
                "{}",
                resolve_minid(services.store.as_ref(), arg(args, 2, "minid")?).await?
            );
        }
        other => bail!("unknown command {}\n{}", other, USAGE),
    }
    Ok(())
}
