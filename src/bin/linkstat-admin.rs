use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use linkstat::analytics::ExportSubject;
use linkstat::app::Services;
use linkstat::config::Config;
use linkstat::storage;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "linkstat-admin")]
#[command(about = "Linkstat link and stats management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the CSV stats export for a link
    Export {
        /// Short key of the link
        key: String,
        /// First day, YYYY-MM-DD
        #[arg(long)]
        from: String,
        /// Last day, YYYY-MM-DD
        #[arg(long)]
        to: String,
        /// Output directory (defaults to EXPORT_DIR)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Print the stats report for a link as JSON
    Stats {
        key: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        /// minute, hour, day, week, month or year
        #[arg(long, default_value = "day")]
        unit: String,
    },
    /// List short links, newest first
    List {
        #[arg(long, default_value_t = 50)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
        /// Comma-separated tags a link must all carry
        #[arg(long)]
        tags: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    if let Commands::Export { dir: Some(dir), .. } = &cli.command {
        config.analytics.export_dir = dir.clone();
    }

    let backend = storage::connect(&config.database).await?;
    let services = Services::new(&config, backend);

    match cli.command {
        Commands::Export { key, from, to, .. } => {
            let link = services.links.resolve(&key).await?;
            let subject = ExportSubject {
                shorten_id: link.id,
                short_url: config.links.short_url(&key),
                key,
                title: link.title,
                long_url: link.original_url,
            };
            let path = services
                .analytics
                .export_stats_report(&subject, &from, &to)
                .await?;
            println!("✓ Export written to {}", path.display());
        }
        Commands::Stats {
            key,
            from,
            to,
            unit,
        } => {
            let link = services.links.resolve(&key).await?;
            let report = services
                .analytics
                .stats_report(link.id, &from, &to, &unit)
                .await?;
            let json =
                serde_json::to_string_pretty(&report).context("failed to serialize report")?;
            println!("{json}");
        }
        Commands::List {
            limit,
            offset,
            tags,
        } => {
            let links = services
                .links
                .list(Some(limit), Some(offset), tags.as_deref())
                .await?;
            if links.is_empty() {
                println!("No short links found.");
            } else {
                println!(
                    "{:<10} {:<8} {:<30} {:<20} {}",
                    "Key", "Active", "Title", "Tags", "URL"
                );
                println!("{}", "-".repeat(100));
                for link in links {
                    println!(
                        "{:<10} {:<8} {:<30} {:<20} {}",
                        link.key(),
                        link.is_active,
                        link.title,
                        link.tags.join(","),
                        link.original_url
                    );
                }
            }
        }
    }

    Ok(())
}
