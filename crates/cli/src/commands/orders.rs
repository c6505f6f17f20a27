//! Order listing and status changes.

use corner_shop_core::{OrderId, OrderStatus};
use corner_shop_store::AppState;
use corner_shop_store::db::OrderRepository;
use corner_shop_store::services::orders::evaluate;
use corner_shop_store::services::{LogNotifier, OrderError, OrderLifecycle};

use super::CliError;

/// Log orders, newest first.
pub async fn list(state: &AppState, status: Option<OrderStatus>) {
    let repo = OrderRepository::new(state.collections());
    let orders = match status {
        Some(status) => repo.list_by_status(status).await,
        None => repo.list_all().await,
    };

    tracing::info!(count = orders.len(), "Orders");
    for order in &orders {
        tracing::info!(
            id = %order.id,
            status = %order.status,
            total = %order.total,
            customer = %order.customer.email,
            created_at = %order.created_at.format("%Y-%m-%d %H:%M"),
            "Order"
        );
    }
}

/// Change the status of an order.
///
/// Notifications go to the log; the CLI has no delivery service.
///
/// # Errors
///
/// Returns `CliError::ConfirmationRequired` if the change is unusual and
/// `confirmed` is false, or `CliError::Order` if the order does not exist,
/// moved to another status after it was read, or could not be saved.
pub async fn set_status(
    state: &AppState,
    id: &OrderId,
    status: OrderStatus,
    confirmed: bool,
) -> Result<(), CliError> {
    let notifier = LogNotifier;
    let lifecycle = OrderLifecycle::new(state.collections(), &notifier);

    let order = lifecycle
        .get(id)
        .await
        .ok_or_else(|| OrderError::NotFound(id.clone()))?;

    let transition = evaluate(order.status, status);
    if transition.needs_confirmation() && !confirmed {
        return Err(CliError::ConfirmationRequired(format!(
            "{} -> {status} is a {transition:?} change; rerun with --yes to apply it",
            order.status
        )));
    }

    let change = lifecycle.change_status_from(id, order.status, status).await?;
    tracing::info!(
        id = %change.order.id,
        previous = %change.previous,
        current = %change.current,
        notification = ?change.notification,
        "Order updated"
    );
    Ok(())
}
