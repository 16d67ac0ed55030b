//! `setup` - validate configuration and print a readiness report.

use anyhow::Result;

use aiagent_payments_sdk::config::Config;

use crate::{Cli, ProviderKind, StorageKind};

pub async fn execute(cli: &Cli) -> Result<String> {
    let mut lines = vec![format!("storage backend: {}", cli.storage_label())];

    match cli.storage {
        StorageKind::Memory => lines.push("  ok: memory storage requires no configuration".to_string()),
        StorageKind::File => match &cli.storage_path {
            Some(path) => lines.push(format!("  ok: data directory {path}")),
            None => lines.push("  missing: --storage-path is required for the file backend".to_string()),
        },
        StorageKind::Sql => match &cli.storage_path {
            Some(url) => lines.push(format!("  ok: sqlite url {url}")),
            None => lines.push("  missing: --storage-path is required for the sql backend".to_string()),
        },
    }

    lines.push(format!("payment provider: {}", cli.provider_label()));
    match cli.payment_provider {
        ProviderKind::Mock => lines.push("  ok: mock provider requires no configuration".to_string()),
        ProviderKind::Stripe | ProviderKind::Paypal => {
            lines.push("  unavailable: provider is not implemented in this build".to_string());
        }
        ProviderKind::Crypto => {
            let config = Config::from_env()?;
            lines.push(format!("  network: {:?}", cli.network));
            if config.has_dummy_project_id() && !config.is_dev_mode() {
                lines.push("  missing: INFURA_PROJECT_ID must be set outside dev mode".to_string());
            } else {
                lines.push("  ok: INFURA_PROJECT_ID is set".to_string());
            }
            match &config.wallet_address {
                Some(addr) => lines.push(format!("  ok: WALLET_ADDRESS {addr}")),
                None => lines.push("  missing: WALLET_ADDRESS must be set".to_string()),
            }
            if config.is_dev_mode() {
                lines.push("  note: running in dev mode, production invariants are relaxed".to_string());
            }
        }
    }

    Ok(lines.join("\n"))
}
