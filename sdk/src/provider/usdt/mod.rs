//! USDT (ERC-20, Ethereum) on-chain payment provider: startup/contract
//! binding, the placeholder-reservation protocol, payment creation, and the
//! Transfer-event verification scan.

mod cache;
mod contract;
mod network;
mod scan;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::Network;
use crate::error::{AiAgentPaymentsError, Result};
use crate::models::{validate_json_serializable, PaymentTransaction, TransactionStatus};
use crate::storage::StorageBackend;
use crate::utils::generate_id;

use self::cache::{RateLimitTracker, TxCache, TxLock};
use self::contract::IErc20;
use self::network::{config_for, NetworkConfig};
use self::scan::{scan_for_transfer, ScanCounters, ScanRequest};

use super::{validate_against_capabilities, Capabilities, CheckoutSession, PaymentProvider, RefundInfo};

/// HTTP JSON-RPC transport, the only transport this provider speaks.
pub type HttpProvider = RootProvider;

const MAX_RESERVATION_ATTEMPTS: u32 = 10;
const MAX_PERSIST_ATTEMPTS: u32 = 3;
const PAYMENT_TIMEOUT_MINUTES: i64 = 30;
const USDT_PRICE: f64 = 1.0;
const USDT_DECIMALS: u32 = 6;

fn rpc_url_for(network: Network, project_id: &str) -> String {
    match network {
        Network::Mainnet => format!("https://mainnet.infura.io/v3/{project_id}"),
        Network::Sepolia => format!("https://sepolia.infura.io/v3/{project_id}"),
    }
}

fn parse_wallet_address(raw: &str) -> Result<Address> {
    let has_mixed_case = raw.chars().any(|c| c.is_ascii_uppercase()) && raw.chars().any(|c| c.is_ascii_lowercase());
    if has_mixed_case {
        Address::parse_checksummed(raw, None)
            .map_err(|e| AiAgentPaymentsError::configuration(format!("invalid checksummed wallet address: {e}")))
    } else {
        Address::from_str(raw).map_err(|e| AiAgentPaymentsError::configuration(format!("invalid wallet address: {e}")))
    }
}

/// Convert a requested fiat-equivalent `amount` into USDT, then into integer
/// wei, verifying the round trip stays within 10⁻⁶ USDT of the original.
///
/// # Errors
/// Returns a `Validation` error if the amount rounds to zero wei or the
/// round trip does not reconcile.
fn amount_to_wei(amount: Decimal) -> Result<(Decimal, u64)> {
    let usdt_amount = (amount / Decimal::try_from(USDT_PRICE).unwrap_or(Decimal::ONE)).round_dp(6);
    let scale = Decimal::from(10u64.pow(USDT_DECIMALS));
    let wei_decimal = (usdt_amount * scale).floor();
    let wei: u64 = wei_decimal
        .to_string()
        .parse()
        .map_err(|_| AiAgentPaymentsError::validation("computed USDT wei amount overflowed u64"))?;
    if wei == 0 {
        return Err(AiAgentPaymentsError::validation(
            "amount rounds to zero USDT and cannot be paid on-chain",
        ));
    }
    let reconstructed = Decimal::from(wei) / scale;
    if (reconstructed - usdt_amount).abs() >= Decimal::new(1, 6) {
        return Err(AiAgentPaymentsError::validation(
            "USDT amount did not reconcile after wei conversion",
        ));
    }
    Ok((usdt_amount, wei))
}

/// Production-readiness report surfaced by [`UsdtProvider::is_production_ready`].
#[derive(Debug, Clone)]
pub struct ProductionReadiness {
    pub non_dummy_project_id: bool,
    pub transactional_storage: bool,
    pub non_deprecated_network: bool,
}

impl ProductionReadiness {
    #[must_use]
    pub fn all_satisfied(&self) -> bool {
        self.non_dummy_project_id && self.transactional_storage && self.non_deprecated_network
    }
}

/// Confirmations-required, the fixed +5 safety margin, and whether the
/// canonical-chain re-check is enabled (always true).
#[derive(Debug, Clone, Copy)]
pub struct ReorgProtectionInfo {
    pub confirmations_required: u64,
    pub safety_margin: u64,
    pub canonical_chain_check_enabled: bool,
}

/// USDT ERC-20 payment provider: verifies payments by scanning on-chain
/// `Transfer` events destined to the configured wallet.
pub struct UsdtProvider<P: Provider + Send + Sync + 'static = HttpProvider> {
    provider: P,
    storage: Arc<dyn StorageBackend>,
    network: Network,
    network_config: NetworkConfig,
    wallet_address: Address,
    contract_address: Address,
    contract_symbol: String,
    contract_name: String,
    confirmations_required: u64,
    max_gas_price_gwei: u64,
    dev_mode: bool,
    dummy_project_id: bool,
    cache: Mutex<TxCache>,
    lock: TxLock,
    rate_limiter: RateLimitTracker,
}

impl UsdtProvider<HttpProvider> {
    /// Run the startup sequence: validate and checksum the wallet address,
    /// resolve network config, open the RPC session and verify `chain_id`,
    /// bind the USDT contract and sanity-check its metadata, and validate
    /// storage capabilities against the production/dev-mode requirement.
    ///
    /// # Errors
    /// Returns a `Configuration` error for a malformed wallet address, a
    /// `chain_id` mismatch, a dummy Infura project id in production, or
    /// non-transactional storage in production.
    pub async fn connect(
        network: Network,
        infura_project_id: &str,
        dummy_project_id: bool,
        wallet_address: &str,
        storage: Arc<dyn StorageBackend>,
        confirmations_override: Option<u64>,
        max_gas_price_override: Option<u64>,
        dev_mode: bool,
    ) -> Result<Self> {
        let wallet = parse_wallet_address(wallet_address)?;
        let network_config = config_for(network);

        if !dev_mode && dummy_project_id {
            return Err(AiAgentPaymentsError::configuration(
                "a real Infura project id is required outside of dev mode",
            ));
        }

        let url = url::Url::parse(&rpc_url_for(network, infura_project_id))
            .map_err(|e| AiAgentPaymentsError::configuration(format!("invalid RPC url: {e}")))?;
        let provider = ProviderBuilder::new().on_http(url);

        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| AiAgentPaymentsError::provider(format!("failed to reach RPC endpoint: {e}")))?;
        if chain_id != network_config.chain_id {
            return Err(AiAgentPaymentsError::configuration(format!(
                "chain_id mismatch: RPC endpoint reports {chain_id}, expected {}",
                network_config.chain_id
            )));
        }

        let contract_address = Address::from_str(network_config.contract_address)
            .map_err(|e| AiAgentPaymentsError::configuration(format!("invalid contract address constant: {e}")))?;
        let contract = IErc20::new(contract_address, &provider);
        let decimals = contract
            .decimals()
            .call()
            .await
            .map_err(|e| AiAgentPaymentsError::provider(format!("failed to read token decimals: {e}")))?;
        let symbol = contract
            .symbol()
            .call()
            .await
            .map_err(|e| AiAgentPaymentsError::provider(format!("failed to read token symbol: {e}")))?;
        let name = contract
            .name()
            .call()
            .await
            .map_err(|e| AiAgentPaymentsError::provider(format!("failed to read token name: {e}")))?;
        if decimals != 6 {
            tracing::warn!(component = "usdt_provider", decimals, "USDT contract reports unexpected decimals");
        }
        if !matches!(symbol.as_str(), "USDT" | "TETHER") {
            tracing::warn!(component = "usdt_provider", %symbol, "USDT contract reports an unexpected symbol");
        }

        let caps = storage.capabilities();
        if !dev_mode && !caps.supports_transactions {
            return Err(AiAgentPaymentsError::configuration(
                "production mode requires a transactional storage backend",
            ));
        }

        Ok(Self {
            provider,
            storage,
            network,
            network_config,
            wallet_address: wallet,
            contract_address,
            contract_symbol: symbol,
            contract_name: name,
            confirmations_required: confirmations_override.unwrap_or(network_config.confirmations_required),
            max_gas_price_gwei: max_gas_price_override.unwrap_or(network_config.max_gas_price_gwei),
            dev_mode,
            dummy_project_id,
            cache: Mutex::new(TxCache::default()),
            lock: TxLock::new(),
            rate_limiter: RateLimitTracker::new(),
        })
    }
}

impl<P: Provider + Send + Sync + 'static> UsdtProvider<P> {
    /// Reserve a fresh transaction id, protecting against two concurrent
    /// `process_payment` calls colliding on the same UUID.
    ///
    /// # Errors
    /// Returns a `Provider` error if no free id is found within 10 attempts.
    async fn reserve_transaction_id(&self) -> Result<String> {
        for _ in 0..MAX_RESERVATION_ATTEMPTS {
            let id = generate_id(Some("usdt_tx"));
            if self.storage.get_transaction(&id).await?.is_some() {
                continue;
            }
            {
                let mut cache = self.cache.lock().await;
                if cache.contains(&id) {
                    continue;
                }
                cache.reserve(id.clone());
            }
            if self.storage.get_transaction(&id).await?.is_some() {
                self.cache.lock().await.remove(&id);
                continue;
            }
            return Ok(id);
        }
        Err(AiAgentPaymentsError::provider(
            "exhausted attempts reserving a unique transaction id",
        ))
    }

    async fn cleanup_reservation(&self, id: &str) {
        self.cache.lock().await.remove(id);
    }

    /// The raw save-or-update step, with no locking or transaction scope of
    /// its own; callers are responsible for both.
    async fn persist_write(&self, transaction: &PaymentTransaction) -> Result<()> {
        self.storage
            .save_transaction(transaction)
            .await
            .or_else(|_| self.storage.update_transaction(transaction))
    }

    /// Persist `transaction` inside a fresh begin/commit (or rollback)
    /// storage scope guarded by the transaction-scope lock. Only for
    /// callers that are not already holding that lock/scope themselves; see
    /// [`Self::persist_in_scope_holding`] for the nested case.
    async fn persist_in_scope(&self, transaction: &PaymentTransaction) -> Result<()> {
        let _guard = self.lock.acquire().await?;
        let supports_tx = self.storage.capabilities().supports_transactions;
        if supports_tx {
            self.storage.begin_transaction().await?;
        }
        match self.persist_write(transaction).await {
            Ok(()) => {
                if supports_tx {
                    self.storage.commit().await?;
                }
                Ok(())
            }
            Err(err) => {
                if supports_tx {
                    let _ = self.storage.rollback().await;
                }
                Err(err)
            }
        }
    }

    /// Persist `transaction` reusing a scope the caller already holds: no
    /// lock is acquired (the `ScopeToken` is proof one is already held by
    /// the caller) and no nested `begin_transaction` is issued (the caller's
    /// outer scope, e.g. `verify_payment`'s, commits or rolls back once at
    /// the end). Used by `verify_payment_inner` and `mark_transfer_as_used`.
    async fn persist_in_scope_holding(&self, transaction: &PaymentTransaction, _scope: &cache::ScopeToken) -> Result<()> {
        self.persist_write(transaction).await
    }

    async fn persist_with_retry(&self, transaction: &PaymentTransaction) -> Result<PaymentTransaction> {
        let mut last_err = None;
        for _ in 0..MAX_PERSIST_ATTEMPTS {
            match self.persist_in_scope(transaction).await {
                Ok(()) => match self.storage.get_transaction(&transaction.id).await? {
                    Some(persisted)
                        if persisted.id == transaction.id
                            && persisted.user_id == transaction.user_id
                            && persisted.amount == transaction.amount
                            && persisted.status == transaction.status =>
                    {
                        return Ok(persisted);
                    }
                    _ => last_err = Some(AiAgentPaymentsError::storage("read-back did not match the written transaction")),
                },
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| AiAgentPaymentsError::storage("failed to persist transaction")))
    }

    /// Same retry/read-back discipline as [`Self::persist_with_retry`], but
    /// for callers already inside a held scope (see
    /// [`Self::persist_in_scope_holding`]).
    async fn persist_with_retry_in_scope(
        &self,
        transaction: &PaymentTransaction,
        scope: &cache::ScopeToken,
    ) -> Result<PaymentTransaction> {
        let mut last_err = None;
        for _ in 0..MAX_PERSIST_ATTEMPTS {
            match self.persist_in_scope_holding(transaction, scope).await {
                Ok(()) => match self.storage.get_transaction(&transaction.id).await? {
                    Some(persisted)
                        if persisted.id == transaction.id
                            && persisted.user_id == transaction.user_id
                            && persisted.amount == transaction.amount
                            && persisted.status == transaction.status =>
                    {
                        return Ok(persisted);
                    }
                    _ => last_err = Some(AiAgentPaymentsError::storage("read-back did not match the written transaction")),
                },
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| AiAgentPaymentsError::storage("failed to persist transaction")))
    }

    /// Build the PaymentTransaction for `process_payment`: price conversion,
    /// wei amount, and the full metadata block described in the algorithm.
    async fn build_pending_transaction(
        &self,
        id: String,
        user_id: &str,
        amount: Decimal,
        currency: &str,
        sender_address: Address,
    ) -> Result<PaymentTransaction> {
        let (usdt_amount, wei) = amount_to_wei(amount)?;
        let head = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| AiAgentPaymentsError::provider(format!("failed to read head block: {e}")))?;
        let gas_price_wei = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| AiAgentPaymentsError::provider(format!("failed to read gas price: {e}")))?;
        let gas_price_gwei = gas_price_wei as f64 / 1_000_000_000.0;
        let now = Utc::now();
        let timeout_at = now + ChronoDuration::minutes(PAYMENT_TIMEOUT_MINUTES);

        let mut transaction = PaymentTransaction::new(user_id, amount, currency, "usdt_erc20");
        transaction.id = id;
        let metadata = &mut transaction.metadata;
        metadata.insert("crypto_type".to_string(), Value::from("USDT"));
        metadata.insert("network".to_string(), Value::from(format!("{:?}", self.network).to_lowercase()));
        metadata.insert("wallet_address".to_string(), Value::from(format!("{:#x}", self.wallet_address)));
        metadata.insert("usdt_price".to_string(), Value::from(USDT_PRICE));
        metadata.insert("usdt_amount".to_string(), Value::from(usdt_amount.to_string()));
        metadata.insert("usdt_amount_wei".to_string(), Value::from(wei.to_string()));
        metadata.insert(
            "contract_address".to_string(),
            Value::from(format!("{:#x}", self.contract_address)),
        );
        metadata.insert("contract_symbol".to_string(), Value::from(self.contract_symbol.clone()));
        metadata.insert("contract_name".to_string(), Value::from(self.contract_name.clone()));
        metadata.insert(
            "confirmations_required".to_string(),
            Value::from(self.confirmations_required),
        );
        metadata.insert("created_block".to_string(), Value::from(head));
        metadata.insert("gas_price_at_creation_gwei".to_string(), Value::from(gas_price_gwei));
        metadata.insert("timeout_at".to_string(), Value::from(timeout_at.to_rfc3339()));
        metadata.insert("timeout_minutes".to_string(), Value::from(PAYMENT_TIMEOUT_MINUTES));
        metadata.insert("timeout_validated".to_string(), Value::from(true));
        metadata.insert("sender_address".to_string(), Value::from(format!("{:#x}", sender_address)));
        Ok(transaction)
    }

    async fn mark_transfer_as_used(
        &self,
        transaction_id: &str,
        tx_hash: &str,
        amount_wei: &str,
        scope: &cache::ScopeToken,
    ) -> Result<()> {
        let Some(mut transaction) = self.storage.get_transaction(transaction_id).await? else {
            return Err(AiAgentPaymentsError::storage("cannot mark transfer used: transaction vanished"));
        };
        transaction
            .metadata
            .insert("confirmed_tx_hash".to_string(), Value::from(tx_hash.to_string()));
        transaction
            .metadata
            .insert("actual_amount_wei".to_string(), Value::from(amount_wei.to_string()));
        transaction.metadata.insert("marked_as_used".to_string(), Value::from(true));
        transaction
            .metadata
            .insert("mark_timestamp".to_string(), Value::from(Utc::now().to_rfc3339()));
        let persisted = self.persist_with_retry_in_scope(&transaction, scope).await?;
        if persisted.metadata.get("marked_as_used").and_then(Value::as_bool) != Some(true) {
            return Err(AiAgentPaymentsError::storage(
                "transfer-used metadata was not preserved after persisting",
            ));
        }
        Ok(())
    }

    /// Current lock-contention counter and its hourly reset timestamp.
    pub async fn lock_statistics(&self) -> (u64, DateTime<Utc>) {
        self.lock.statistics().await
    }

    /// Current rate-limit-error counter and its hourly reset timestamp.
    pub async fn rate_limit_statistics(&self) -> (u64, DateTime<Utc>) {
        self.rate_limiter.statistics().await
    }

    /// Confirmations-required, the +5 safety margin, and that the
    /// canonical-chain re-check is enabled (it always is).
    #[must_use]
    pub fn reorg_protection_info(&self) -> ReorgProtectionInfo {
        ReorgProtectionInfo {
            confirmations_required: self.confirmations_required,
            safety_margin: 5,
            canonical_chain_check_enabled: true,
        }
    }

    /// Which production-mode preconditions currently hold.
    #[must_use]
    pub fn is_production_ready(&self) -> ProductionReadiness {
        ProductionReadiness {
            non_dummy_project_id: !self.dummy_project_id,
            transactional_storage: self.storage.capabilities().supports_transactions,
            non_deprecated_network: true,
        }
    }
}

#[async_trait]
impl<P: Provider + Send + Sync + 'static> PaymentProvider for UsdtProvider<P> {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_refunds: true,
            supports_webhooks: false,
            supports_partial_refunds: false,
            supports_subscriptions: false,
            supports_metadata: true,
            supported_currencies: vec!["USDT".to_string(), "USD".to_string()],
            min_amount: Decimal::new(1, 6),
            max_amount: Decimal::new(1_000_000, 0),
        }
    }

    async fn process_payment(
        &self,
        user_id: &str,
        amount: Decimal,
        currency: &str,
        metadata: Option<HashMap<String, Value>>,
    ) -> Result<PaymentTransaction> {
        validate_against_capabilities(&self.capabilities(), amount, currency)?;
        let metadata = metadata.unwrap_or_default();
        for value in metadata.values() {
            validate_json_serializable(value, 0)?;
        }
        let sender_raw = metadata
            .get("sender_address")
            .and_then(Value::as_str)
            .ok_or_else(|| AiAgentPaymentsError::validation("metadata.sender_address is required"))?;
        let sender_address = parse_wallet_address(sender_raw)?;

        let id = self.reserve_transaction_id().await?;
        let built = match self.build_pending_transaction(id.clone(), user_id, amount, currency, sender_address).await {
            Ok(tx) => tx,
            Err(err) => {
                self.cleanup_reservation(&id).await;
                return Err(err);
            }
        };
        self.cache.lock().await.insert(id.clone(), built.clone());

        match self.persist_with_retry(&built).await {
            Ok(persisted) => Ok(persisted),
            Err(err) => {
                if self.dev_mode {
                    let mut degraded = built;
                    degraded.metadata.insert("storage_failed".to_string(), Value::from(true));
                    Ok(degraded)
                } else {
                    self.cleanup_reservation(&id).await;
                    Err(err)
                }
            }
        }
    }

    async fn verify_payment(&self, transaction_id: &str) -> Result<bool> {
        let guard = self.lock.acquire().await?;
        let supports_tx = self.storage.capabilities().supports_transactions;
        if supports_tx {
            self.storage.begin_transaction().await?;
        }

        let result = self.verify_payment_inner(transaction_id, &guard.token).await;

        match &result {
            Ok(_) if supports_tx => {
                self.storage.commit().await?;
            }
            Err(_) if supports_tx => {
                let _ = self.storage.rollback().await;
            }
            _ => {}
        }
        result
    }

    async fn refund_payment(&self, transaction_id: &str, amount: Option<Decimal>) -> Result<RefundInfo> {
        let Some(transaction) = self.storage.get_transaction(transaction_id).await? else {
            return Err(AiAgentPaymentsError::payment_failed(format!("unknown transaction {transaction_id}")));
        };
        if transaction.status != TransactionStatus::Completed {
            return Err(AiAgentPaymentsError::payment_failed(
                "only completed USDT transactions can be refunded, and only off-chain/advisory",
            ));
        }
        let refund_amount = amount.unwrap_or(transaction.amount);
        let payer = transaction
            .metadata
            .get("sender_address")
            .and_then(Value::as_str)
            .unwrap_or("unknown sender");
        Ok(RefundInfo {
            transaction_id: transaction_id.to_string(),
            amount: refund_amount,
            instructions: format!(
                "USDT refunds are not automated on-chain. Manually send {refund_amount} USDT from wallet {:#x} back to {payer} on {:?} and record the resulting tx hash.",
                self.wallet_address, self.network
            ),
        })
    }

    async fn get_payment_status(&self, transaction_id: &str) -> Result<String> {
        self.storage
            .get_transaction(transaction_id)
            .await?
            .map(|tx| format!("{:?}", tx.status).to_lowercase())
            .ok_or_else(|| AiAgentPaymentsError::payment_failed(format!("unknown transaction {transaction_id}")))
    }

    fn verify_webhook_signature(&self, _payload: &str, _headers: &HashMap<String, String>) -> bool {
        false
    }

    async fn create_checkout_session(&self, user_id: &str, amount: Decimal, currency: &str) -> Result<CheckoutSession> {
        validate_against_capabilities(&self.capabilities(), amount, currency)?;
        let session_id = generate_id(Some("usdt_session"));
        Ok(CheckoutSession {
            checkout_url: format!(
                "usdt:{:#x}?amount={amount}&currency={currency}&user={user_id}&session={session_id}",
                self.wallet_address
            ),
            session_id,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        let head = self.provider.get_block_number().await.map_err(|e| {
            AiAgentPaymentsError::provider(format!("health check: RPC connectivity failed: {e}"))
        })?;
        if head == 0 {
            return Ok(false);
        }
        let contract = IErc20::new(self.contract_address, &self.provider);
        contract
            .decimals()
            .call()
            .await
            .map_err(|e| AiAgentPaymentsError::provider(format!("health check: decimals() failed: {e}")))?;
        contract
            .balanceOf(self.wallet_address)
            .call()
            .await
            .map_err(|e| AiAgentPaymentsError::provider(format!("health check: balanceOf() failed: {e}")))?;
        let gas_price_wei = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| AiAgentPaymentsError::provider(format!("health check: gas price read failed: {e}")))?;
        let gas_price_gwei = gas_price_wei as f64 / 1_000_000_000.0;
        if gas_price_gwei > self.max_gas_price_gwei as f64 {
            tracing::warn!(component = "usdt_provider", gas_price_gwei, "gas price exceeds configured ceiling");
        }
        if !self.dev_mode && !self.is_production_ready().all_satisfied() {
            return Ok(false);
        }

        let scratch = PaymentTransaction::new("health_check", Decimal::ZERO, "USD", "usdt_erc20");
        self.storage.save_transaction(&scratch).await?;
        let read_back = self.storage.get_transaction(&scratch.id).await?;
        self.storage.delete_transaction(&scratch.id).await?;
        Ok(read_back.is_some())
    }
}

impl<P: Provider + Send + Sync + 'static> UsdtProvider<P> {
    async fn verify_payment_inner(&self, transaction_id: &str, scope: &cache::ScopeToken) -> Result<bool> {
        let Some(mut transaction) = self.storage.get_transaction(transaction_id).await? else {
            return Ok(false);
        };
        if transaction.status == TransactionStatus::Completed {
            return Ok(true);
        }

        let wei_str = transaction.metadata.get("usdt_amount_wei").and_then(Value::as_str).map(str::to_string);
        let contract_str = transaction.metadata.get("contract_address").and_then(Value::as_str).map(str::to_string);
        let timeout_str = transaction.metadata.get("timeout_at").and_then(Value::as_str).map(str::to_string);

        let (Some(wei_str), Some(contract_str)) = (wei_str, contract_str) else {
            transaction.set_status(TransactionStatus::Failed, Utc::now())?;
            transaction
                .metadata
                .insert("failure_reason".to_string(), Value::from("missing required verification metadata"));
            self.persist_with_retry_in_scope(&transaction, scope).await?;
            return Ok(false);
        };

        if !contract_str.eq_ignore_ascii_case(&format!("{:#x}", self.contract_address)) {
            transaction.set_status(TransactionStatus::Failed, Utc::now())?;
            transaction
                .metadata
                .insert("failure_reason".to_string(), Value::from("contract address mismatch"));
            self.persist_with_retry_in_scope(&transaction, scope).await?;
            return Ok(false);
        }

        let timeout_at = timeout_str
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| transaction.created_at + ChronoDuration::minutes(PAYMENT_TIMEOUT_MINUTES));
        if Utc::now() > timeout_at {
            transaction.set_status(TransactionStatus::Failed, Utc::now())?;
            transaction
                .metadata
                .insert("failure_reason".to_string(), Value::from("timed out"));
            self.persist_with_retry_in_scope(&transaction, scope).await?;
            return Ok(false);
        }

        let expected_wei = U256::from_str(&wei_str)
            .map_err(|_| AiAgentPaymentsError::storage("stored usdt_amount_wei is not a valid integer"))?;
        let sender_str = transaction
            .metadata
            .get("sender_address")
            .and_then(Value::as_str)
            .ok_or_else(|| AiAgentPaymentsError::storage("transaction is missing sender_address metadata"))?;
        let sender_address = parse_wallet_address(sender_str)?;

        let completed = self.storage.list_transactions(None, Some("completed"), None).await?;

        let mut counters = ScanCounters::default();
        let request = ScanRequest {
            contract_address: self.contract_address,
            wallet_address: self.wallet_address,
            sender_address,
            expected_amount_wei: expected_wei,
            created_at: transaction.created_at,
            network: &self.network_config,
            max_gas_price_gwei: self.max_gas_price_gwei,
            completed_transactions: &completed,
            rate_limiter: &self.rate_limiter,
            confirmations_required: self.confirmations_required,
            _scope: scope,
        };
        let outcome = scan_for_transfer(&self.provider, &request, &mut counters).await?;

        for (key, value) in counters.as_metadata() {
            transaction.metadata.insert(key, value);
        }

        let Some(matched) = outcome else {
            self.persist_with_retry_in_scope(&transaction, scope).await.ok();
            return Ok(false);
        };

        transaction
            .metadata
            .insert("confirmed_tx_hash".to_string(), Value::from(matched.confirmed_tx_hash.clone()));
        transaction
            .metadata
            .insert("confirmed_block".to_string(), Value::from(matched.confirmed_block));
        transaction
            .metadata
            .insert("confirmations".to_string(), Value::from(matched.confirmations));
        transaction
            .metadata
            .insert("safety_margin_applied".to_string(), Value::from(matched.safety_margin_applied));
        transaction
            .metadata
            .insert("effective_confirmations".to_string(), Value::from(matched.effective_confirmations));
        transaction
            .metadata
            .insert("from_address".to_string(), Value::from(matched.from_address.clone()));
        transaction
            .metadata
            .insert("actual_amount_wei".to_string(), Value::from(matched.actual_amount_wei.clone()));
        transaction
            .metadata
            .insert("actual_amount_usdt".to_string(), Value::from(matched.actual_amount_usdt.clone()));
        transaction
            .metadata
            .insert("verification_method".to_string(), Value::from("transfer_event"));
        transaction
            .metadata
            .insert("canonical_chain_verified".to_string(), Value::from(true));
        transaction.metadata.insert("block_hash_verified".to_string(), Value::from(true));
        transaction
            .metadata
            .insert("reorg_protection_applied".to_string(), Value::from(true));
        transaction
            .metadata
            .insert("receipt_validation_applied".to_string(), Value::from(true));
        transaction.metadata.insert("receipt_status".to_string(), Value::from(1));
        transaction.metadata.insert("gas_used".to_string(), Value::from(matched.gas_used));
        transaction.metadata.insert("gas_limit".to_string(), Value::from(matched.gas_limit));

        transaction.set_status(TransactionStatus::Completed, Utc::now())?;
        self.persist_with_retry_in_scope(&transaction, scope).await?;
        self.mark_transfer_as_used(&transaction.id, &matched.confirmed_tx_hash, &matched.actual_amount_wei, scope)
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_to_wei_round_trips() {
        let (usdt, wei) = amount_to_wei(Decimal::new(500, 2)).unwrap();
        assert_eq!(usdt, Decimal::new(5, 0));
        assert_eq!(wei, 5_000_000);
    }

    #[test]
    fn amount_to_wei_rejects_zero() {
        assert!(amount_to_wei(Decimal::ZERO).is_err());
    }

    #[test]
    fn wallet_address_checksum_validation() {
        assert!(parse_wallet_address("0xdAC17F958D2ee523a2206206994597C13D831ec7").is_ok());
        assert!(parse_wallet_address("not-an-address").is_err());
    }

    #[test]
    fn reorg_protection_info_reports_fixed_margin() {
        let info = ReorgProtectionInfo {
            confirmations_required: 24,
            safety_margin: 5,
            canonical_chain_check_enabled: true,
        };
        assert_eq!(info.safety_margin, 5);
        assert!(info.canonical_chain_check_enabled);
    }
}
