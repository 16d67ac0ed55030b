//! The Transfer-event scan: finds an on-chain ERC-20 transfer matching a
//! pending transaction and runs it through the seven ordered gates.

use std::collections::HashMap;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use alloy_provider::Provider;
use alloy_rpc_types_eth::{BlockNumberOrTag, Filter, Log};
use alloy_sol_types::SolEvent;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::Result;
use crate::models::{PaymentTransaction, TransactionStatus};

use super::cache::{RateLimitTracker, ScopeToken};
use super::contract::IErc20;
use super::network::NetworkConfig;

const BATCH_SIZE: u64 = 100;
const MAX_LOOKBACK_BLOCKS: u64 = 1000;
const MAX_EVENTS_SCANNED: u64 = 1000;
const CONFIRMATION_SAFETY_MARGIN: u64 = 5;
const AMOUNT_TOLERANCE_BPS: u64 = 10; // 0.1% == 10 basis points out of 10_000
const MAX_RATE_LIMIT_ERRORS_PER_SCAN: u32 = 3;

/// Outcome of a completed, gate-passing scan: the fields merged into the
/// transaction's metadata before it is marked completed.
#[derive(Debug, Clone)]
pub struct ScanMatch {
    pub confirmed_tx_hash: String,
    pub confirmed_block: u64,
    pub confirmations: u64,
    pub safety_margin_applied: u64,
    pub effective_confirmations: u64,
    pub from_address: String,
    pub actual_amount_wei: String,
    pub actual_amount_usdt: String,
    pub gas_used: u64,
    pub gas_limit: u64,
}

/// Per-scan counters folded into the transaction metadata regardless of
/// outcome, so a failed or abandoned scan still leaves a diagnostic trail.
#[derive(Debug, Clone, Default)]
pub struct ScanCounters {
    pub events_processed: u64,
    pub blocks_scanned: u64,
    pub gas_price_skips: u64,
    pub total_transactions_scanned: u64,
    pub rate_limit_errors: u64,
}

impl ScanCounters {
    #[must_use]
    pub fn as_metadata(&self) -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert("events_processed".to_string(), Value::from(self.events_processed));
        map.insert("blocks_scanned".to_string(), Value::from(self.blocks_scanned));
        map.insert("gas_price_skips".to_string(), Value::from(self.gas_price_skips));
        map.insert(
            "total_transactions_scanned".to_string(),
            Value::from(self.total_transactions_scanned),
        );
        map.insert("rate_limit_errors".to_string(), Value::from(self.rate_limit_errors));
        map
    }
}

/// Local tracker for a remote filter id, so it can be uninstalled on every
/// exit path even if the creation call itself failed partway through.
struct FilterTracker {
    pending: Vec<U256>,
}

impl FilterTracker {
    fn new() -> Self {
        Self { pending: Vec::new() }
    }

    fn register(&mut self, local: U256) {
        self.pending.push(local);
    }

    fn resolve(&mut self, local: U256) {
        self.pending.retain(|id| *id != local);
    }
}

/// Estimate seconds-per-block from the last 10 blocks, clamped to [1, 60];
/// falls back to the network's configured block time on any RPC failure.
async fn estimate_seconds_per_block<P: Provider>(provider: &P, head: u64, fallback: u64) -> u64 {
    let sample_from = head.saturating_sub(9);
    let mut timestamps = Vec::new();
    for block_number in sample_from..=head {
        match provider
            .get_block_by_number(BlockNumberOrTag::Number(block_number))
            .await
        {
            Ok(Some(block)) => timestamps.push(block.header.timestamp),
            _ => return fallback,
        }
    }
    if timestamps.len() < 2 {
        return fallback;
    }
    let deltas: Vec<i64> = timestamps
        .windows(2)
        .map(|pair| i64::try_from(pair[1]).unwrap_or(0) - i64::try_from(pair[0]).unwrap_or(0))
        .collect();
    let avg = deltas.iter().sum::<i64>() / i64::try_from(deltas.len()).unwrap_or(1);
    avg.clamp(1, 60) as u64
}

/// Compute the `[from_block, to_block]` window: roughly `created_at - 5
/// minutes` through the current head, capped at 1000 blocks of lookback.
async fn block_window<P: Provider>(
    provider: &P,
    created_at: DateTime<Utc>,
    network: &NetworkConfig,
) -> Result<(u64, u64)> {
    let head = provider
        .get_block_number()
        .await
        .map_err(|e| crate::error::AiAgentPaymentsError::provider(format!("failed to fetch head block: {e}")))?;
    let seconds_per_block = estimate_seconds_per_block(provider, head, network.block_time_secs).await;
    let lookback_seconds = (Utc::now() - created_at).num_seconds().max(300) as u64 + 300;
    let blocks_back = (lookback_seconds / seconds_per_block.max(1)).min(MAX_LOOKBACK_BLOCKS);
    Ok((head.saturating_sub(blocks_back), head))
}

/// Arguments needed to run one complete Transfer-event scan.
pub struct ScanRequest<'a> {
    pub contract_address: Address,
    pub wallet_address: Address,
    pub sender_address: Address,
    pub expected_amount_wei: U256,
    pub created_at: DateTime<Utc>,
    pub network: &'a NetworkConfig,
    pub max_gas_price_gwei: u64,
    /// Transactions already marked `completed`, consulted for the
    /// uniqueness gate. Supplied by the caller, which holds the transaction
    /// scope lock for the duration of the scan.
    pub completed_transactions: &'a [PaymentTransaction],
    pub rate_limiter: &'a RateLimitTracker,
    /// Confirmations required before a transfer is accepted, resolved from
    /// the provider's `confirmations_override` (falling back to the
    /// network default) rather than the network default alone.
    pub confirmations_required: u64,
    /// Proof the caller already holds the transaction-scope lock.
    pub _scope: &'a ScopeToken,
}

/// Run the Transfer-event scan. Returns `Some(ScanMatch)` on a fully
/// gate-passing event, `None` if the window was exhausted (or the scan was
/// abandoned) without a match. `counters` is always populated so the caller
/// can persist a diagnostic trail regardless of outcome.
pub async fn scan_for_transfer<P: Provider>(
    provider: &P,
    request: &ScanRequest<'_>,
    counters: &mut ScanCounters,
) -> Result<Option<ScanMatch>> {
    let (from_block, to_block) = block_window(provider, request.created_at, request.network).await?;
    let contract = IErc20::new(request.contract_address, provider);

    let mut rate_limit_errors_this_scan: u32 = 0;
    let mut batch_start = from_block;
    let mut gas_ceiling_gwei = request.max_gas_price_gwei;

    while batch_start <= to_block {
        let batch_end = (batch_start + BATCH_SIZE - 1).min(to_block);
        counters.blocks_scanned += batch_end - batch_start + 1;

        let filter = Filter::new()
            .address(request.contract_address)
            .event(IErc20::Transfer::SIGNATURE)
            .topic2(request.wallet_address.into_word())
            .from_block(batch_start)
            .to_block(batch_end);

        let mut tracker = FilterTracker::new();
        let local_id = U256::from(batch_start);
        tracker.register(local_id);

        let logs = match provider.get_logs(&filter).await {
            Ok(logs) => {
                tracker.resolve(local_id);
                rate_limit_errors_this_scan = 0;
                logs
            }
            Err(err) => {
                tracker.resolve(local_id);
                let message = err.to_string();
                if message.contains("429") || message.to_lowercase().contains("rate limit") {
                    rate_limit_errors_this_scan += 1;
                    counters.rate_limit_errors += 1;
                    request.rate_limiter.record_rate_limit_error().await;
                    if rate_limit_errors_this_scan > MAX_RATE_LIMIT_ERRORS_PER_SCAN {
                        return Ok(None);
                    }
                    let backoff_secs = 2u64.saturating_pow(rate_limit_errors_this_scan);
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    continue;
                }
                return Err(crate::error::AiAgentPaymentsError::provider(format!(
                    "log fetch failed: {message}"
                )));
            }
        };

        counters.total_transactions_scanned += logs.len() as u64;
        if counters.total_transactions_scanned > MAX_EVENTS_SCANNED {
            return Ok(None);
        }

        for log in &logs {
            counters.events_processed += 1;
            if let Some(matched) = evaluate_event(
                provider,
                &contract,
                log,
                request,
                &mut gas_ceiling_gwei,
                counters,
            )
            .await?
            {
                return Ok(Some(matched));
            }
        }

        batch_start = batch_end + 1;
    }

    Ok(None)
}

#[allow(clippy::too_many_lines)]
async fn evaluate_event<P: Provider>(
    provider: &P,
    contract: &IErc20::IErc20Instance<&P>,
    log: &Log,
    request: &ScanRequest<'_>,
    gas_ceiling_gwei: &mut u64,
    counters: &mut ScanCounters,
) -> Result<Option<ScanMatch>> {
    let Ok(event) = IErc20::Transfer::decode_log(&log.inner, true) else {
        return Ok(None);
    };
    let event = event.data;
    let Some(tx_hash) = log.transaction_hash else {
        return Ok(None);
    };
    let Some(block_number) = log.block_number else {
        return Ok(None);
    };
    let Some(block_hash) = log.block_hash else {
        return Ok(None);
    };

    // Gate 1: sender match.
    if event.from != request.sender_address {
        return Ok(None);
    }

    // Gate 2: gas-price sanity, with ceiling relaxation past a 50% skip rate.
    let Ok(Some(tx)) = provider.get_transaction_by_hash(tx_hash).await else {
        return Ok(None);
    };
    let gas_price_gwei = u64::try_from(tx.gas_price().unwrap_or(0) / 1_000_000_000).unwrap_or(u64::MAX);
    if gas_price_gwei > *gas_ceiling_gwei {
        counters.gas_price_skips += 1;
        if counters.events_processed >= 10 && counters.gas_price_skips * 2 > counters.events_processed {
            *gas_ceiling_gwei = (request.max_gas_price_gwei as f64 * 1.5) as u64;
        }
        return Ok(None);
    }

    // Gate 3: uniqueness against already-completed transactions.
    let tx_hash_str = format!("{tx_hash:#x}");
    let value_str = event.value.to_string();
    let already_used = request.completed_transactions.iter().any(|completed| {
        completed.status == TransactionStatus::Completed
            && completed.metadata.get("confirmed_tx_hash").and_then(Value::as_str) == Some(tx_hash_str.as_str())
            && completed.metadata.get("actual_amount_wei").and_then(Value::as_str) == Some(value_str.as_str())
    });
    if already_used {
        return Ok(None);
    }

    // Gate 4: amount match within 0.1% tolerance.
    let expected = request.expected_amount_wei;
    let diff = if event.value > expected {
        event.value - expected
    } else {
        expected - event.value
    };
    let tolerance = expected * U256::from(AMOUNT_TOLERANCE_BPS) / U256::from(10_000u64);
    if diff > tolerance {
        return Ok(None);
    }

    // Gate 5: receipt success.
    let Ok(Some(receipt)) = provider.get_transaction_receipt(tx_hash).await else {
        return Ok(None);
    };
    if !receipt.status() {
        return Ok(None);
    }
    if receipt.gas_used == tx.gas_limit() {
        tracing::warn!(
            component = "usdt_provider",
            event = "possible_out_of_gas",
            tx_hash = %tx_hash_str,
            "gasUsed equals gasLimit, which can indicate an out-of-gas transaction"
        );
    }

    // Gate 6: confirmations with safety margin.
    let head = provider
        .get_block_number()
        .await
        .map_err(|e| crate::error::AiAgentPaymentsError::provider(format!("failed to fetch head block: {e}")))?;
    let confirmations = head.saturating_sub(block_number);
    let effective_confirmations = request.confirmations_required + CONFIRMATION_SAFETY_MARGIN;
    if confirmations < effective_confirmations {
        return Ok(None);
    }

    // Gate 7: canonical-chain check.
    let Ok(Some(canonical_block)) = provider.get_block_by_number(BlockNumberOrTag::Number(block_number)).await else {
        return Ok(None);
    };
    if canonical_block.header.hash != block_hash {
        return Ok(None);
    }

    let actual_amount_usdt = {
        let wei = event.value;
        let whole = wei / U256::from(1_000_000u64);
        let frac = wei % U256::from(1_000_000u64);
        format!("{whole}.{frac:06}")
    };

    Ok(Some(ScanMatch {
        confirmed_tx_hash: tx_hash_str,
        confirmed_block: block_number,
        confirmations,
        safety_margin_applied: CONFIRMATION_SAFETY_MARGIN,
        effective_confirmations,
        from_address: format!("{:#x}", event.from),
        actual_amount_wei: value_str,
        actual_amount_usdt,
        gas_used: receipt.gas_used,
        gas_limit: tx.gas_limit(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_counters_fill_metadata_map() {
        let counters = ScanCounters {
            events_processed: 3,
            blocks_scanned: 400,
            gas_price_skips: 1,
            total_transactions_scanned: 3,
            rate_limit_errors: 0,
        };
        let metadata = counters.as_metadata();
        assert_eq!(metadata.get("blocks_scanned").and_then(Value::as_u64), Some(400));
    }
}
