use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info};

use catalog_sync::app::scheduled_import_use_case::ScheduledImportError;
use catalog_sync::bootstrap::AppServices;
use catalog_sync::config::Config;
use catalog_sync::domain::ProductPatch;
use catalog_sync::{logging, metrics, scheduler};

#[derive(Parser)]
#[command(name = "catalog_sync")]
#[command(about = "Keeps a local product catalog in sync with the external food catalog dump")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one import, unless the last one is still inside the cooldown
    Import,
    /// Keep importing on the configured interval until Ctrl-C
    Schedule,
    /// Show the most recent import run
    LastImport,
    /// Inspect or edit locally stored products
    Product {
        #[command(subcommand)]
        command: ProductCommands,
    },
}

#[derive(Subcommand)]
enum ProductCommands {
    /// Show one product by code
    Find { code: String },
    /// List a page of products
    List {
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        skip: i64,
        /// Page size: 10, 30 or 50
        #[arg(long, default_value_t = 10)]
        take: u64,
    },
    /// Merge a JSON patch into a stored product
    Update {
        code: String,
        /// e.g. '{"status":"published","product_name":"Oat drink"}'
        #[arg(long)]
        patch: String,
    },
    /// Move a product to the trash
    Delete { code: String },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    logging::init_logging(&config.logging.log_dir);
    metrics::init_metrics(config.metrics.listen_addr);

    let services = AppServices::from_config(&config)?;

    match cli.command {
        Commands::Import => {
            println!("🔄 Running product import...");
            match services.scheduled_import.execute().await {
                Ok(report) if report.is_success => {
                    println!("✅ Imported {} new products", report.quantity_imported_products);
                    println!("   Runtime: {:.1} ms", report.runtime_in_milliseconds);
                }
                Ok(report) => {
                    println!("❌ Import failed and was recorded in the history");
                    if let Some(failure) = &report.failure {
                        println!("   - {}", failure);
                    }
                }
                Err(ScheduledImportError::TooSoon { time_left_ms }) => {
                    info!("Import gated by cooldown");
                    println!("⏳ Last import is too recent, next run allowed in {} s", time_left_ms / 1000);
                }
                Err(e) => {
                    error!("Import failed: {}", e);
                    return Err(e.into());
                }
            }
        }
        Commands::Schedule => {
            println!(
                "🚀 Scheduling product imports every {} s (Ctrl-C to stop)...",
                config.import.schedule_interval_secs
            );
            scheduler::run_schedule(
                services.scheduled_import.clone(),
                config.schedule_interval(),
                scheduler::ctrl_c(),
            )
            .await;
        }
        Commands::LastImport => match services.last_import.execute().await? {
            Some(record) => print_json(&record)?,
            None => println!("No import has run yet"),
        },
        Commands::Product { command } => match command {
            ProductCommands::Find { code } => print_json(&services.find_product.execute(&code).await?)?,
            ProductCommands::List { skip, take } => print_json(&services.list_products.execute(skip, take).await?)?,
            ProductCommands::Update { code, patch } => {
                let patch: ProductPatch = serde_json::from_str(&patch).context("parsing --patch as JSON")?;
                print_json(&services.update_product.execute(&code, patch).await?)?
            }
            ProductCommands::Delete { code } => print_json(&services.delete_product.execute(&code).await?)?,
        },
    }

    Ok(())
}
