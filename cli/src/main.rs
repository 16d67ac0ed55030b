//! `aiagent-payments` CLI - a thin operator front end over the Access &
//! Billing Core: wires a storage backend and a payment provider together
//! and drives the core's plan/subscription/usage operations.

#![forbid(unsafe_code)]

mod commands;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use aiagent_payments_sdk::config::{Config, Network};
use aiagent_payments_sdk::core::PaymentManager;
use aiagent_payments_sdk::provider::usdt::UsdtProvider;
use aiagent_payments_sdk::provider::{MockProvider, PaymentProvider};
use aiagent_payments_sdk::storage::{FileStorage, MemoryStorage, SqlStorage, StorageBackend};

#[derive(Parser, Debug)]
#[command(
    name = "aiagent-payments",
    version,
    about = "Command-line interface for the AI agent payments SDK",
    author = "aiagent-payments"
)]
struct Cli {
    /// Storage backend
    #[arg(long, value_enum, default_value = "memory")]
    storage: StorageKind,

    /// Path used by the file and sql backends (file: a directory; sql: a sqlite URL)
    #[arg(long)]
    storage_path: Option<String>,

    /// Payment provider
    #[arg(long, value_enum, default_value = "mock")]
    payment_provider: ProviderKind,

    /// Network for the crypto provider
    #[arg(long, value_enum, default_value = "sepolia")]
    network: NetworkArg,

    /// Output format
    #[arg(long, value_enum, default_value = "human")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StorageKind {
    Memory,
    File,
    Sql,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProviderKind {
    Mock,
    Stripe,
    Paypal,
    Crypto,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum NetworkArg {
    Mainnet,
    Sepolia,
}

impl From<NetworkArg> for Network {
    fn from(value: NetworkArg) -> Self {
        match value {
            NetworkArg::Mainnet => Self::Mainnet,
            NetworkArg::Sepolia => Self::Sepolia,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration and print a readiness report
    Setup,

    /// List active payment plans from the configured storage
    Plans,

    /// Subscribe a user to a plan via the core
    Subscribe {
        /// User identifier
        user: String,
        /// Plan identifier
        plan: String,
    },

    /// Print a user's active subscription and recent usage
    Status {
        /// User identifier
        user: String,
    },
}

async fn build_storage(cli: &Cli) -> Result<Arc<dyn StorageBackend>> {
    match cli.storage {
        StorageKind::Memory => Ok(Arc::new(MemoryStorage::new())),
        StorageKind::File => {
            let path = cli
                .storage_path
                .as_deref()
                .ok_or_else(|| anyhow!("--storage-path is required for the file backend"))?;
            Ok(Arc::new(
                FileStorage::new(path).context("failed to open file storage")?,
            ))
        }
        StorageKind::Sql => {
            let url = cli
                .storage_path
                .as_deref()
                .ok_or_else(|| anyhow!("--storage-path is required for the sql backend"))?;
            Ok(Arc::new(
                SqlStorage::connect(url).await.context("failed to open sql storage")?,
            ))
        }
    }
}

async fn build_provider(cli: &Cli, storage: Arc<dyn StorageBackend>) -> Result<Arc<dyn PaymentProvider>> {
    match cli.payment_provider {
        ProviderKind::Mock => Ok(Arc::new(MockProvider::new())),
        ProviderKind::Stripe | ProviderKind::Paypal => Err(anyhow!(
            "the {:?} provider is not implemented in this build; use mock or crypto",
            cli.payment_provider
        )),
        ProviderKind::Crypto => {
            let config = Config::from_env().context("failed to load configuration")?;
            let project_id = config.infura_project_id.clone().unwrap_or_default();
            let wallet_address = config
                .wallet_address
                .clone()
                .ok_or_else(|| anyhow!("WALLET_ADDRESS must be set to use the crypto provider"))?;
            let provider = UsdtProvider::connect(
                cli.network.into(),
                &project_id,
                config.has_dummy_project_id(),
                &wallet_address,
                storage,
                None,
                None,
                config.is_dev_mode(),
            )
            .await
            .context("failed to connect the crypto provider")?;
            Ok(Arc::new(provider))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| {
            let level = std::env::var("AIAgentPayments_LogLevel").unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::EnvFilter::new(level)
        }))
        .init();

    let cli = Cli::parse();
    let output_format = cli.output;

    let result = run_command(&cli).await;

    match result {
        Ok(output) => match output_format {
            OutputFormat::Human => println!("{output}"),
            OutputFormat::Json => {
                let json_output = serde_json::json!({ "success": true, "data": output });
                println!("{}", serde_json::to_string_pretty(&json_output)?);
            }
        },
        Err(e) => {
            match output_format {
                OutputFormat::Human => eprintln!("Error: {e}"),
                OutputFormat::Json => {
                    let json_output = serde_json::json!({ "success": false, "error": e.to_string() });
                    println!("{}", serde_json::to_string_pretty(&json_output)?);
                }
            }
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn run_command(cli: &Cli) -> Result<String> {
    match &cli.command {
        Commands::Setup => commands::execute_setup(cli).await,
        Commands::Plans => {
            let storage = build_storage(cli).await?;
            let provider = build_provider(cli, Arc::clone(&storage)).await?;
            let manager = PaymentManager::new(storage, provider);
            commands::execute_plans(&manager).await
        }
        Commands::Subscribe { user, plan } => {
            let storage = build_storage(cli).await?;
            let provider = build_provider(cli, Arc::clone(&storage)).await?;
            let manager = PaymentManager::new(storage, provider);
            commands::execute_subscribe(&manager, user, plan).await
        }
        Commands::Status { user } => {
            let storage = build_storage(cli).await?;
            let provider = build_provider(cli, Arc::clone(&storage)).await?;
            let manager = PaymentManager::new(storage, provider);
            commands::execute_status(&manager, user).await
        }
    }
}

impl Cli {
    fn storage_label(&self) -> &'static str {
        match self.storage {
            StorageKind::Memory => "memory",
            StorageKind::File => "file",
            StorageKind::Sql => "sql",
        }
    }

    fn provider_label(&self) -> &'static str {
        match self.payment_provider {
            ProviderKind::Mock => "mock",
            ProviderKind::Stripe => "stripe",
            ProviderKind::Paypal => "paypal",
            ProviderKind::Crypto => "crypto",
        }
    }
}
