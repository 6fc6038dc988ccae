mod errors;

use std::path::PathBuf;

use bitcoin::Amount;
use clap::{Parser, Subcommand, ValueEnum};
use relay::{
    RelayService,
    config::{ProviderConfig, RelayConfig, RelayConfigBuilder, parse_network},
    start_service::{create_oracle, open_store, start_service},
    wallet::BuildRequest,
};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::CliError;

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Build, relay and observe UTXO wallet transactions.")]
#[command(version)]
struct Cli {
    /// Config file, or a directory holding config.yaml
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProviderKind {
    Esplora,
    Insight,
    Mock,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write a config file with default settings
    Setup {
        #[arg(short, long)]
        output: Option<String>,
        #[arg(short, long, default_value = "bitcoin")]
        network: String,
        #[arg(short, long, value_enum, default_value = "esplora")]
        provider: ProviderKind,
        /// Provider base url, required for insight
        #[arg(short, long)]
        url: Option<String>,
        #[arg(short, long)]
        database_directory: Option<PathBuf>,
    },
    /// Run the relay with its periodic timers and metrics endpoint
    Run {
        #[arg(short, long)]
        log_file: Option<String>,
        #[arg(short, long)]
        metrics_port: Option<u16>,
    },
    ValidateAddress {
        address: String,
    },
    /// Print the unsigned signable context of a spend
    Build {
        #[arg(long)]
        operation_id: Option<Uuid>,
        from: String,
        to: String,
        amount_sats: u64,
        /// Take the fee out of the amount
        #[arg(long)]
        include_fee: bool,
    },
    Broadcast {
        operation_id: Uuid,
        signed_tx_hex: String,
    },
    Status {
        operation_id: Uuid,
    },
    DeleteBroadcast {
        operation_id: Uuid,
    },
    Observe {
        address: String,
    },
    Unobserve {
        address: String,
    },
    Balances {
        #[arg(short, long, default_value_t = 100)]
        page_size: usize,
        #[arg(long)]
        continuation: Option<String>,
    },
    /// Run one broadcast reconciliation cycle
    Reconcile,
    /// Run one balance sweep
    Sweep,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Setup {
            output,
            network,
            provider,
            url,
            database_directory,
        } => {
            let config = setup_config(
                output.or(cli.config),
                &network,
                provider,
                url,
                database_directory,
            )?;
            println!(
                "Config has been saved to {}. Edit it to tune fees and intervals.",
                config.config_file_path.display()
            );
        }
        Commands::Run {
            log_file,
            metrics_port,
        } => {
            let config = load_config(cli.config)?;
            start_service(config, log_file.map(PathBuf::from), metrics_port).await?;
        }
        command => run_admin_command(cli.config, command).await?,
    }

    Ok(())
}

fn load_config(path: Option<String>) -> Result<RelayConfig, CliError> {
    RelayConfig::get_config(path).map_err(|e| CliError::Config(e.to_string()))
}

fn setup_config(
    output: Option<String>,
    network: &str,
    provider: ProviderKind,
    url: Option<String>,
    database_directory: Option<PathBuf>,
) -> Result<RelayConfig, CliError> {
    let network = parse_network(network).map_err(|e| CliError::InvalidArgument(e.to_string()))?;
    let provider = match (provider, url) {
        (ProviderKind::Esplora, url) => ProviderConfig::Esplora { url },
        (ProviderKind::Insight, Some(url)) => ProviderConfig::Insight { url },
        (ProviderKind::Insight, None) => {
            return Err(CliError::InvalidArgument(
                "--url is required for the insight provider".to_string(),
            ));
        }
        (ProviderKind::Mock, _) => ProviderConfig::Mock,
    };

    let path = RelayConfig::get_config_file_path(output)
        .map_err(|e| CliError::Config(e.to_string()))?;
    if path.is_dir() {
        return Err(CliError::InvalidArgument(format!(
            "The path {} is a directory",
            path.display()
        )));
    }

    let mut builder = RelayConfigBuilder::new()
        .config_file_path(path)
        .network(network)
        .provider(provider);
    if let Some(dir) = database_directory {
        builder = builder.database_directory(dir);
    }

    let config = builder.build()?;
    config.save_to_file()?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    println!("{json}");
    Ok(())
}

/// Commands that act on the store directly. They need exclusive access to the
/// database, so they cannot run next to `run` on the same directory.
async fn run_admin_command(config_path: Option<String>, command: Commands) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let service = RelayService::new(&config, open_store(&config)?, create_oracle(&config)?);

    match command {
        Commands::ValidateAddress { address } => {
            let valid = service.is_valid_address(&address);
            println!("{address} is {}a valid {} address", if valid { "" } else { "not " }, config.network);
        }
        Commands::Build {
            operation_id,
            from,
            to,
            amount_sats,
            include_fee,
        } => {
            let request = BuildRequest {
                operation_id: operation_id.unwrap_or_else(Uuid::new_v4),
                asset_id: service.asset.id.clone(),
                from_address: from,
                to_address: to,
                amount: Amount::from_sat(amount_sats),
                include_fee,
            };
            println!("{}", service.build_transaction(&request).await?);
        }
        Commands::Broadcast {
            operation_id,
            signed_tx_hex,
        } => {
            service.broadcast(operation_id, signed_tx_hex.trim()).await?;
            print_json(&service.get_broadcast(operation_id)?)?;
        }
        Commands::Status { operation_id } => match service.get_broadcast(operation_id)? {
            Some(record) => print_json(&record)?,
            None => println!("No broadcast for operation {operation_id}"),
        },
        Commands::DeleteBroadcast { operation_id } => {
            if service.delete_broadcast(operation_id)? {
                println!("Deleted broadcast of operation {operation_id}");
            } else {
                println!("No broadcast for operation {operation_id}");
            }
        }
        Commands::Observe { address } => {
            service.register_observed_address(&address)?;
            println!("Observing {address}");
        }
        Commands::Unobserve { address } => {
            if service.unregister_observed_address(&address)? {
                println!("Stopped observing {address}");
            } else {
                println!("{address} was not observed");
            }
        }
        Commands::Balances {
            page_size,
            continuation,
        } => {
            print_json(&service.list_positive_balances(page_size, continuation.as_deref())?)?;
        }
        Commands::Reconcile => {
            let summary = service.reconcile_broadcasts().await?;
            println!(
                "Checked {} broadcasts: {} completed, {} removed, {} failed",
                summary.checked, summary.completed, summary.removed, summary.failed
            );
        }
        Commands::Sweep => {
            let summary = service.sweep_balances().await?;
            println!(
                "Refreshed {} addresses, {} failed",
                summary.refreshed, summary.failed
            );
        }
        Commands::Setup { .. } | Commands::Run { .. } => {}
    }

    Ok(())
}
