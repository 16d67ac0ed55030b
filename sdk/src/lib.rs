//! Access control, billing, and on-chain USDT payment verification for AI
//! agent products.
//!
//! This crate provides:
//!
//! - A payment-plan catalog and subscription lifecycle (pay-per-use,
//!   subscription, freemium).
//! - Usage accounting and an access-decision engine (`check_access`).
//! - Pluggable storage (in-memory, file, SQLite).
//! - A uniform `PaymentProvider` contract, with a deterministic mock fixture
//!   and a USDT (ERC-20, Ethereum) on-chain provider.
//!
//! # Example Usage
//!
//! ```no_run
//! use aiagent_payments_sdk::core::PaymentManager;
//! use aiagent_payments_sdk::models::{PaymentPlan, PaymentType};
//! use aiagent_payments_sdk::provider::MockProvider;
//! use aiagent_payments_sdk::storage::MemoryStorage;
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! # async fn run() -> aiagent_payments_sdk::error::Result<()> {
//! let manager = PaymentManager::new(Arc::new(MemoryStorage::new()), Arc::new(MockProvider::new()));
//! let mut plan = PaymentPlan::new("Free", PaymentType::Freemium, Decimal::ZERO, "USD");
//! plan.features.push("search".to_string());
//! plan.free_requests = 100;
//! manager.create_payment_plan(plan).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod provider;
pub mod redact;
pub mod retry;
pub mod storage;
pub mod utils;
pub mod validation;

pub use config::{Config, Network};
pub use core::PaymentManager;
pub use error::{AiAgentPaymentsError, Result};
pub use models::{
    BillingPeriod, PaymentPlan, PaymentTransaction, PaymentType, Subscription, SubscriptionStatus,
    TransactionStatus, UsageRecord,
};
pub use provider::{Capabilities, CheckoutSession, MockProvider, PaymentProvider, RefundInfo};
pub use retry::{retry_async, RetryPolicy};
pub use storage::{FileStorage, MemoryStorage, SqlStorage, StorageBackend, StorageCapabilities, StorageStatus};
