//! Dask dashboard proxy.
//!
//! Serves `{prefix}/{cluster_id}/{path}` by looking the cluster up in a
//! registry and relaying to its dashboard.
//!
//! ```text
//!     Client ──▶ listener ──▶ http server ──▶ resolver ──▶ registry
//!                                 │               │
//!                                 │               ▼
//!                                 │         backend target
//!                                 ▼               │
//!                    forward (HTTP) / websocket ◀─┘
//!                                 │
//!                                 ▼
//!                          dashboard backend
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use dashboard_proxy::config::loader::load_config;
use dashboard_proxy::config::ProxyConfig;
use dashboard_proxy::lifecycle::{signals, startup, Shutdown};
use dashboard_proxy::observability::logging;
use dashboard_proxy::resolver::{RequestContext, Resolver};

#[derive(Parser)]
#[command(name = "dashboard-proxy")]
#[command(about = "Reverse proxy for per-cluster Dask dashboards", long_about = None)]
struct Cli {
    /// Configuration file (TOML). Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the proxy (default)
    Serve,
    /// Validate the configuration and exit
    Check,
    /// Resolve a cluster id against the configured registry and print the target
    Resolve {
        cluster_id: String,

        /// Scheme of the hypothetical inbound request
        #[arg(long, default_value = "http")]
        scheme: String,

        /// Host of the hypothetical inbound request
        #[arg(long, default_value = "localhost")]
        host: String,
    },
}

fn read_config(path: Option<&Path>) -> Result<ProxyConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(load_config(path)?),
        None => Ok(ProxyConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = read_config(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            logging::init_logging(&config.observability)?;
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "dashboard-proxy starting");
            tracing::info!(
                bind_address = %config.listener.bind_address,
                route_prefix = %config.listener.route_prefix,
                registry = ?config.registry.kind,
                request_timeout_secs = config.timeouts.request_secs,
                "Configuration loaded"
            );

            let shutdown = Shutdown::new();
            signals::spawn_signal_handler(shutdown.clone());
            startup::run(config, cli.config.as_deref(), shutdown).await?;

            tracing::info!("Shutdown complete");
        }
        Commands::Check => {
            println!(
                "configuration ok: {} static cluster(s), prefix {}",
                config.clusters.len(),
                config.listener.route_prefix
            );
        }
        Commands::Resolve {
            cluster_id,
            scheme,
            host,
        } => {
            let handle = startup::build_registry(&config)?;
            let resolver = Resolver::new(handle.registry, config.resolver);
            let target = resolver
                .resolve(&cluster_id, &RequestContext::new(scheme, host))
                .await?;

            let summary = serde_json::json!({
                "cluster_id": cluster_id,
                "endpoint": target.endpoint.as_str(),
                "host": target.host,
                "port": target.port,
                "base_path": target.base_path,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
