//! `plans` - list active payment plans from the configured storage.

use anyhow::Result;

use aiagent_payments_sdk::core::PaymentManager;

pub async fn execute(manager: &PaymentManager) -> Result<String> {
    let plans = manager.list_payment_plans().await?;
    if plans.is_empty() {
        return Ok("no payment plans found".to_string());
    }

    let mut lines = Vec::with_capacity(plans.len());
    for plan in plans {
        lines.push(format!(
            "{:<24} {:<12} {:<8} {} {}",
            plan.id, plan.name, format!("{:?}", plan.payment_type), plan.price, plan.currency
        ));
    }
    Ok(lines.join("\n"))
}
