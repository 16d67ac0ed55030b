//! `subscribe <user> <plan>` - subscribe a user to a plan via the core.

use anyhow::Result;

use aiagent_payments_sdk::core::PaymentManager;

pub async fn execute(manager: &PaymentManager, user: &str, plan: &str) -> Result<String> {
    let subscription = manager.subscribe_user(user, plan).await?;
    Ok(format!(
        "subscribed {user} to {plan} (subscription {}, status {:?})",
        subscription.id, subscription.status
    ))
}
