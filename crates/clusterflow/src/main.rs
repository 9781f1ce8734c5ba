mod commands;
mod output;

use clap::{Parser, Subcommand};
use clusterflow_core::{CredentialStore, FsPathStore, PathStore};
use colored::Colorize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clusterflow")]
#[command(about = "Plan, secure and tear down cluster infrastructure", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// State store location (path or file:// URL)
    #[arg(long, global = true, env = clusterflow_config::STATE_STORE_ENV)]
    state: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a cluster configuration
    #[command(subcommand)]
    Create(CreateCommands),
    /// Delete a cluster
    #[command(subcommand)]
    Delete(DeleteCommands),
    /// Fill in missing network defaults and zone subnets
    Assign {
        /// Cluster name
        #[arg(long, env = clusterflow_config::CLUSTER_NAME_ENV)]
        name: Option<String>,
    },
    /// Manage cluster secrets
    #[command(subcommand)]
    Secrets(SecretsCommands),
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum CreateCommands {
    /// Create a cluster configuration in the state store
    Cluster {
        /// Cluster name
        #[arg(long, env = clusterflow_config::CLUSTER_NAME_ENV)]
        name: Option<String>,
        /// Zones to run in (comma separated)
        #[arg(long, value_delimiter = ',')]
        zones: Vec<String>,
        /// Cloud provider
        #[arg(long, default_value = "aws")]
        cloud: String,
        /// Network range for the cluster (default 172.20.0.0/16)
        #[arg(long)]
        network_cidr: Option<String>,
        /// Existing network (VPC) to share
        #[arg(long)]
        network_id: Option<String>,
        #[arg(long)]
        kubernetes_version: Option<String>,
    },
}

#[derive(Subcommand)]
enum DeleteCommands {
    /// Delete a cluster's cloud resources and configuration
    Cluster {
        /// Cluster name
        #[arg(long, env = clusterflow_config::CLUSTER_NAME_ENV)]
        name: Option<String>,
        /// Delete without confirmation
        #[arg(short = 'y', long)]
        yes: bool,
        /// Delete a cluster that has no configuration in the state store
        #[arg(long)]
        external: bool,
        /// Cloud region
        #[arg(long)]
        region: Option<String>,
    },
}

#[derive(Subcommand)]
enum SecretsCommands {
    /// List secret ids
    List {
        #[arg(long, env = clusterflow_config::CLUSTER_NAME_ENV)]
        name: Option<String>,
    },
    /// Print a secret
    Get {
        id: String,
        #[arg(long, env = clusterflow_config::CLUSTER_NAME_ENV)]
        name: Option<String>,
    },
    /// Print a secret, generating it if it does not exist
    Create {
        id: String,
        #[arg(long, env = clusterflow_config::CLUSTER_NAME_ENV)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Logs go to stderr; `RUST_LOG` overrides the level picked by `-v`
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = cli.state.as_deref();
    let mut stdout = std::io::stdout();

    match cli.command {
        Commands::Version => {
            println!("clusterflow {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Create(CreateCommands::Cluster {
            name,
            zones,
            cloud,
            network_cidr,
            network_id,
            kubernetes_version,
        }) => {
            let name = commands::require_name(name)?;
            let state = commands::open_state(open_store(state)?, &name)?;
            let options = commands::create::CreateOptions {
                cloud,
                zones,
                network_cidr,
                network_id,
                kubernetes_version,
            };
            commands::create::handle(&mut stdout, &state, &name, options).await?;
        }
        Commands::Delete(DeleteCommands::Cluster {
            name,
            yes,
            external,
            region,
        }) => {
            let args = commands::delete::DeleteClusterArgs {
                name,
                yes,
                external,
                region,
            };
            commands::delete::handle(open_store(state)?, args, shutdown_token()).await?;
        }
        Commands::Assign { name } => {
            let name = commands::require_name(name)?;
            let state = commands::open_state(open_store(state)?, &name)?;
            commands::assign::handle(&mut stdout, &state).await?;
        }
        Commands::Secrets(cmd) => match cmd {
            SecretsCommands::List { name } => {
                let secrets = open_secrets(state, name)?;
                commands::secrets::handle_list(&mut stdout, &secrets).await?;
            }
            SecretsCommands::Get { id, name } => {
                let secrets = open_secrets(state, name)?;
                commands::secrets::handle_get(&mut stdout, &secrets, &id).await?;
            }
            SecretsCommands::Create { id, name } => {
                let secrets = open_secrets(state, name)?;
                commands::secrets::handle_create(&mut stdout, &secrets, &id).await?;
            }
        },
    }

    Ok(())
}

/// Resolves the state store root; only commands that need it call this
fn open_store(state: Option<&str>) -> anyhow::Result<Arc<dyn PathStore>> {
    let state_dir = clusterflow_config::resolve_state_dir(state)?;
    tracing::debug!("Using state store {}", state_dir.display());
    Ok(Arc::new(FsPathStore::new(&state_dir)))
}

fn open_secrets(state: Option<&str>, name: Option<String>) -> anyhow::Result<CredentialStore> {
    let name = commands::require_name(name)?;
    Ok(commands::open_state(open_store(state)?, &name)?.secrets())
}

/// Cancelled on Ctrl-C so an in-flight teardown stops between deletions
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; stopping after in-flight deletions");
            child.cancel();
        }
    });
    token
}
