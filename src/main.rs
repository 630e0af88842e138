//! edge-provision
//!
//! Provisions a TLS-secured CloudFront endpoint from a deployment file:
//! ACM certificate validated through Route 53, the distribution, and the
//! alias record pointing the domain at it.
//!
//! # Usage
//! ```bash
//! edge-provision provision
//! edge-provision --config site.json zones
//! edge-provision records example.com
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use serde::Serialize;
use serde_json::json;

use edge_provision::config::{DEFAULT_CONFIG_FILE, DeploymentConfig, environment};
use edge_provision::distribution::Distribution;
use edge_provision::dns::HostedZone;
use edge_provision::issuance::Certificate;
use edge_provision::{ClientProvider, Pipeline};

#[derive(Parser)]
#[command(name = "edge-provision")]
#[command(about = "Provision CloudFront endpoints with ACM certificates and Route 53 records", long_about = None)]
#[command(version)]
struct Cli {
    /// Deployment file
    #[arg(long, short, env = "EDGE_PROVISION_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and print the report
    Provision,

    /// List hosted zones
    Zones,

    /// List record sets of a hosted zone
    Records {
        /// Zone name or name prefix (e.g., example.com)
        zone: String,
    },

    /// List ACM certificates
    Certificates,

    /// List CloudFront distributions
    Distributions,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let clients = ClientProvider::from_env().await;

    tokio::select! {
        result = run(cli, clients) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("[main] interrupted; changes already submitted stay applied, run again to resume");
            bail!("interrupted")
        }
    }
}

async fn run(cli: Cli, clients: ClientProvider) -> Result<()> {
    match cli.command {
        Commands::Provision => {
            let config = DeploymentConfig::load(&cli.config)
                .with_context(|| format!("loading {}", cli.config.display()))?;
            let env = environment();
            let request = config.to_request(env.as_deref())?;
            info!(
                "[main] provisioning {} for {}",
                request.primary_domain,
                config.deployment_name(env.as_deref())
            );

            match Pipeline::new(clients).run(&request).await {
                Ok(report) => {
                    info!("[main] done with {} write(s)", report.writes());
                    print_json(&report)
                }
                Err(err) => {
                    error!("[main] stopped at {}: {}", err.stage, err.source);
                    Err(err.into())
                }
            }
        }
        Commands::Zones => {
            let zones = HostedZone::list(clients.dns()).await?;
            let rows: Vec<_> = zones
                .iter()
                .map(|zone| {
                    json!({
                        "id": zone.id(),
                        "name": zone.name(),
                        "record_count": zone.record_count(),
                    })
                })
                .collect();
            print_json(&rows)
        }
        Commands::Records { zone } => {
            let Some(found) = HostedZone::find(clients.dns(), &zone).await? else {
                bail!("no hosted zone matches {zone}");
            };
            print_json(&found.get_records().await?)
        }
        Commands::Certificates => print_json(&Certificate::list(clients.certificates()).await?),
        Commands::Distributions => {
            print_json(&Distribution::list(clients.distributions()).await?)
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
