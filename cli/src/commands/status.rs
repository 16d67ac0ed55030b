//! `status <user>` - print the user's active subscription and recent usage.

use anyhow::Result;

use aiagent_payments_sdk::core::PaymentManager;

pub async fn execute(manager: &PaymentManager, user: &str) -> Result<String> {
    let mut lines = Vec::new();

    match manager.get_user_subscription(user).await? {
        Some(subscription) => lines.push(format!(
            "subscription: {} plan={} status={:?} usage_count={}",
            subscription.id, subscription.plan_id, subscription.status, subscription.usage_count
        )),
        None => lines.push("subscription: none".to_string()),
    }

    let usage = manager.get_user_usage(user).await?;
    lines.push(format!("usage records: {}", usage.len()));
    for record in usage.iter().rev().take(10) {
        lines.push(format!(
            "  {} feature={} cost={}",
            record.timestamp,
            record.feature,
            record.cost.map_or_else(|| "-".to_string(), |c| c.to_string())
        ));
    }

    Ok(lines.join("\n"))
}
