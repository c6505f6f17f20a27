//! Order placement and the status lifecycle.
//!
//! # State machine
//!
//! ```text
//! Pending -> Processing -> Shipped -> Delivered
//!    |           |            |
//!    +-----------+------------+--> Cancelled
//! ```
//!
//! No change is ever refused. [`evaluate`] classifies a requested change so
//! callers can ask a human to confirm the unusual ones (reopening, cancelling
//! an order already in fulfilment, leaving a terminal state).
//!
//! Entering `Processing`, `Shipped`, `Delivered` or `Cancelled` notifies the
//! customer. Notification failures are logged and never undo the change.

use serde_json::json;
use thiserror::Error;
use tracing::instrument;

use corner_shop_core::{Email, OrderId, OrderStatus};

use super::notifier::{Notification, Notifier, Template, send_best_effort};
use crate::db::{Collections, OrderRepository, RepositoryError};
use crate::models::{NewOrder, Order};

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order not found: {0}")]
    NotFound(OrderId),

    #[error("invalid order: {0}")]
    Validation(String),

    #[error("order status changed to {actual} while expecting {expected}")]
    StatusChanged {
        expected: OrderStatus,
        actual: OrderStatus,
    },

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for OrderError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Validation(message) => Self::Validation(message),
            other => Self::Repository(other),
        }
    }
}

/// Classification of a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Same status; nothing happens.
    Unchanged,
    /// Further along the main sequence.
    Forward,
    /// Back to `Pending` from `Processing`, `Shipped` or `Delivered`.
    Reopen,
    /// `Pending` to `Cancelled`.
    Cancel,
    /// `Processing` or `Shipped` to `Cancelled`; implies a refund.
    CancelInFlight,
    /// Anything else: backwards within fulfilment, or out of a terminal
    /// state.
    Override,
}

impl Transition {
    /// Whether a human should confirm this change before it is requested.
    #[must_use]
    pub const fn needs_confirmation(self) -> bool {
        matches!(self, Self::Reopen | Self::CancelInFlight | Self::Override)
    }
}

/// Classify a change from `old` to `new`.
#[must_use]
pub const fn evaluate(old: OrderStatus, new: OrderStatus) -> Transition {
    use OrderStatus::{Cancelled, Delivered, Pending, Processing, Shipped};

    match (old, new) {
        (Pending, Pending)
        | (Processing, Processing)
        | (Shipped, Shipped)
        | (Delivered, Delivered)
        | (Cancelled, Cancelled) => Transition::Unchanged,
        (Pending, Cancelled) => Transition::Cancel,
        (Processing | Shipped, Cancelled) => Transition::CancelInFlight,
        (Processing | Shipped | Delivered, Pending) => Transition::Reopen,
        (Pending, Processing | Shipped | Delivered)
        | (Processing, Shipped | Delivered)
        | (Shipped, Delivered) => Transition::Forward,
        _ => Transition::Override,
    }
}

/// Whether a change from `old` to `new` notifies the customer.
#[must_use]
pub fn should_notify(old: OrderStatus, new: OrderStatus) -> bool {
    old != new && status_template(new).is_some()
}

/// Notification template announcing entry into `status`.
#[must_use]
pub const fn status_template(status: OrderStatus) -> Option<Template> {
    match status {
        OrderStatus::Pending => None,
        OrderStatus::Processing => Some(Template::OrderProcessing),
        OrderStatus::Shipped => Some(Template::OrderShipped),
        OrderStatus::Delivered => Some(Template::OrderDelivered),
        OrderStatus::Cancelled => Some(Template::OrderCancelled),
    }
}

/// Outcome of the customer notification for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// The change does not notify.
    NotRequired,
    Sent,
    /// The send failed and was logged.
    Failed,
}

/// Result of [`OrderLifecycle::change_status`].
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub order: Order,
    pub previous: OrderStatus,
    pub current: OrderStatus,
    pub transition: Transition,
    pub notification: NotificationOutcome,
}

/// Order placement and status changes with customer notifications.
pub struct OrderLifecycle<'a, N> {
    orders: OrderRepository<'a>,
    notifier: &'a N,
}

impl<'a, N: Notifier> OrderLifecycle<'a, N> {
    /// Create a lifecycle manager.
    #[must_use]
    pub const fn new(collections: &'a Collections, notifier: &'a N) -> Self {
        Self {
            orders: OrderRepository::new(collections),
            notifier,
        }
    }

    /// Store a new order with status `Pending` and send the order received
    /// notification.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` if the order has no items, an item
    /// has zero quantity, or the customer name or email is missing.
    /// Returns `OrderError::Repository` if the order could not be stored.
    #[instrument(skip_all, fields(customer = %input.customer.email))]
    pub async fn place_order(&self, input: NewOrder) -> Result<Order, OrderError> {
        validate_new_order(&input)?;

        let order = self.orders.create(input.into_order()).await?;
        tracing::info!(order_id = %order.id, total = %order.total, "Order placed");

        send_best_effort(self.notifier, order_notification(Template::OrderReceived, &order, None))
            .await;

        Ok(order)
    }

    /// Move an order to `status` and notify the customer when the new status
    /// calls for it.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order does not exist.
    /// Returns `OrderError::Repository` if the change could not be saved; no
    /// notification is sent in that case.
    pub async fn change_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<StatusChange, OrderError> {
        self.apply_status(id, None, status).await
    }

    /// Like [`change_status`](Self::change_status), but only if the order
    /// still has status `expected` when the change is written.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::StatusChanged` if the order is no longer in
    /// `expected`; nothing is written and no notification is sent.
    /// Otherwise as [`change_status`](Self::change_status).
    pub async fn change_status_from(
        &self,
        id: &OrderId,
        expected: OrderStatus,
        status: OrderStatus,
    ) -> Result<StatusChange, OrderError> {
        self.apply_status(id, Some(expected), status).await
    }

    #[instrument(skip(self, id), fields(order_id = %id))]
    async fn apply_status(
        &self,
        id: &OrderId,
        expected: Option<OrderStatus>,
        status: OrderStatus,
    ) -> Result<StatusChange, OrderError> {
        let (previous, order) = match self.orders.set_status(id, expected, status).await {
            Ok(updated) => updated,
            Err(RepositoryError::NotFound) => return Err(OrderError::NotFound(id.clone())),
            Err(RepositoryError::Conflict(message)) => {
                let Some(expected) = expected else {
                    return Err(RepositoryError::Conflict(message).into());
                };
                let Some(current) = self.orders.get_by_id(id).await else {
                    return Err(OrderError::NotFound(id.clone()));
                };
                tracing::warn!(%expected, actual = %current.status, "Order status changed concurrently");
                return Err(OrderError::StatusChanged {
                    expected,
                    actual: current.status,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let transition = evaluate(previous, status);
        if transition.needs_confirmation() {
            tracing::warn!(%previous, current = %status, ?transition, "Unusual order status change");
        } else if transition != Transition::Unchanged {
            tracing::info!(%previous, current = %status, "Order status changed");
        }

        let notification = match status_template(status) {
            Some(template) if should_notify(previous, status) => {
                let sent = send_best_effort(
                    self.notifier,
                    order_notification(template, &order, Some(previous)),
                )
                .await;
                if sent {
                    NotificationOutcome::Sent
                } else {
                    NotificationOutcome::Failed
                }
            }
            _ => NotificationOutcome::NotRequired,
        };

        Ok(StatusChange {
            order,
            previous,
            current: status,
            transition,
            notification,
        })
    }

    /// Get an order by id.
    pub async fn get(&self, id: &OrderId) -> Option<Order> {
        self.orders.get_by_id(id).await
    }

    /// Orders placed with `email`, newest first.
    pub async fn orders_for_customer(&self, email: &Email) -> Vec<Order> {
        self.orders.list_for_customer(email.as_str()).await
    }
}

fn validate_new_order(input: &NewOrder) -> Result<(), OrderError> {
    if input.customer.name.trim().is_empty() {
        return Err(OrderError::Validation("customer name is required".to_owned()));
    }
    Email::parse(&input.customer.email)
        .map_err(|e| OrderError::Validation(format!("customer email: {e}")))?;
    if input.items.is_empty() {
        return Err(OrderError::Validation("order has no items".to_owned()));
    }
    if let Some(item) = input.items.iter().find(|item| item.quantity == 0) {
        return Err(OrderError::Validation(format!(
            "item {} has zero quantity",
            item.product_id
        )));
    }
    Ok(())
}

fn order_notification(
    template: Template,
    order: &Order,
    previous: Option<OrderStatus>,
) -> Notification {
    Notification {
        template,
        to: order.customer.email.trim().to_owned(),
        data: json!({
            "orderId": order.id,
            "customerName": order.customer.name,
            "status": order.status,
            "previousStatus": previous,
            "total": order.total,
            "paymentMethod": order.payment_method,
            "items": order.items,
            "shippingAddress": order.shipping_address,
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use corner_shop_core::{Price, ProductId};
    use serde_json::json;

    use super::*;
    use crate::db::tests::local_collections;
    use crate::models::{AddressSnapshot, CustomerSnapshot, OrderItem};
    use crate::services::notifier::testing::RecordingNotifier;

    fn new_order() -> NewOrder {
        NewOrder {
            customer: CustomerSnapshot {
                name: "Ada Obi".to_owned(),
                email: "ada@example.com".to_owned(),
                phone: "08030000000".to_owned(),
            },
            shipping_address: AddressSnapshot {
                address: "1 Marina".to_owned(),
                city: "Ikeja".to_owned(),
                state: "Lagos".to_owned(),
            },
            items: vec![OrderItem {
                product_id: ProductId::new("PRD-1"),
                name: "Mango Jam".to_owned(),
                price: Price::from_units(1500),
                quantity: 2,
            }],
            total: Price::from_units(4500),
            payment_method: "card".to_owned(),
        }
    }

    #[test]
    fn test_evaluate_classification() {
        use OrderStatus::{Cancelled, Delivered, Pending, Processing, Shipped};

        assert_eq!(evaluate(Pending, Pending), Transition::Unchanged);
        assert_eq!(evaluate(Pending, Processing), Transition::Forward);
        assert_eq!(evaluate(Pending, Delivered), Transition::Forward);
        assert_eq!(evaluate(Shipped, Delivered), Transition::Forward);
        assert_eq!(evaluate(Processing, Pending), Transition::Reopen);
        assert_eq!(evaluate(Delivered, Pending), Transition::Reopen);
        assert_eq!(evaluate(Pending, Cancelled), Transition::Cancel);
        assert_eq!(evaluate(Processing, Cancelled), Transition::CancelInFlight);
        assert_eq!(evaluate(Shipped, Cancelled), Transition::CancelInFlight);
        assert_eq!(evaluate(Delivered, Cancelled), Transition::Override);
        assert_eq!(evaluate(Cancelled, Processing), Transition::Override);
        assert_eq!(evaluate(Cancelled, Pending), Transition::Override);
        assert_eq!(evaluate(Shipped, Processing), Transition::Override);

        assert!(!Transition::Forward.needs_confirmation());
        assert!(!Transition::Cancel.needs_confirmation());
        assert!(Transition::Reopen.needs_confirmation());
        assert!(Transition::CancelInFlight.needs_confirmation());
    }

    #[test]
    fn test_should_notify() {
        use OrderStatus::{Cancelled, Delivered, Pending, Processing, Shipped};

        assert!(should_notify(Pending, Processing));
        assert!(should_notify(Processing, Shipped));
        assert!(should_notify(Shipped, Delivered));
        assert!(should_notify(Pending, Cancelled));
        assert!(!should_notify(Processing, Pending));
        for status in OrderStatus::ALL {
            assert!(!should_notify(status, status));
        }
    }

    #[tokio::test]
    async fn test_pending_to_processing_notifies_once() {
        let (_dir, collections) = local_collections();
        let notifier = RecordingNotifier::default();
        let lifecycle = OrderLifecycle::new(&collections, &notifier);
        let order = lifecycle.place_order(new_order()).await.unwrap();

        let change = lifecycle
            .change_status(&order.id, OrderStatus::Processing)
            .await
            .unwrap();

        assert_eq!(change.previous, OrderStatus::Pending);
        assert_eq!(change.current, OrderStatus::Processing);
        assert_eq!(change.transition, Transition::Forward);
        assert_eq!(change.notification, NotificationOutcome::Sent);

        let sent = notifier.sent();
        let status_mails: Vec<_> = sent
            .iter()
            .filter(|n| n.template == Template::OrderProcessing)
            .collect();
        assert_eq!(status_mails.len(), 1);
        assert_eq!(status_mails[0].to, "ada@example.com");
        assert_eq!(status_mails[0].data["previousStatus"], json!("pending"));
        assert_eq!(status_mails[0].data["status"], json!("processing"));
    }

    #[tokio::test]
    async fn test_same_status_does_not_notify() {
        let (_dir, collections) = local_collections();
        let notifier = RecordingNotifier::default();
        let lifecycle = OrderLifecycle::new(&collections, &notifier);
        let order = lifecycle.place_order(new_order()).await.unwrap();
        let before = notifier.sent().len();

        let change = lifecycle
            .change_status(&order.id, OrderStatus::Pending)
            .await
            .unwrap();

        assert_eq!(change.transition, Transition::Unchanged);
        assert_eq!(change.notification, NotificationOutcome::NotRequired);
        assert_eq!(notifier.sent().len(), before);
    }

    #[tokio::test]
    async fn test_notifier_failure_keeps_change() {
        let (_dir, collections) = local_collections();
        let notifier = RecordingNotifier::failing();
        let lifecycle = OrderLifecycle::new(&collections, &notifier);
        let order = lifecycle.place_order(new_order()).await.unwrap();

        let change = lifecycle
            .change_status(&order.id, OrderStatus::Shipped)
            .await
            .unwrap();

        assert_eq!(change.notification, NotificationOutcome::Failed);
        assert_eq!(
            lifecycle.get(&order.id).await.unwrap().status,
            OrderStatus::Shipped
        );
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let (_dir, collections) = local_collections();
        let notifier = RecordingNotifier::default();
        let lifecycle = OrderLifecycle::new(&collections, &notifier);

        let err = lifecycle
            .change_status(&OrderId::new("ORD-NONE"), OrderStatus::Shipped)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::NotFound(id) if id.as_str() == "ORD-NONE"));
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_place_order_validates_and_notifies() {
        let (_dir, collections) = local_collections();
        let notifier = RecordingNotifier::default();
        let lifecycle = OrderLifecycle::new(&collections, &notifier);

        let mut empty = new_order();
        empty.items.clear();
        assert!(matches!(
            lifecycle.place_order(empty).await,
            Err(OrderError::Validation(_))
        ));

        let mut zero = new_order();
        zero.items[0].quantity = 0;
        assert!(matches!(
            lifecycle.place_order(zero).await,
            Err(OrderError::Validation(_))
        ));

        let order = lifecycle.place_order(new_order()).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total, Price::from_units(4500));
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(notifier.sent()[0].template, Template::OrderReceived);

        let email = Email::parse("ADA@example.com").unwrap();
        assert_eq!(lifecycle.orders_for_customer(&email).await.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_status_changes_are_serialized() {
        let (_dir, collections) = local_collections();
        let notifier = RecordingNotifier::default();
        let lifecycle = OrderLifecycle::new(&collections, &notifier);
        let first = lifecycle.place_order(new_order()).await.unwrap();
        let second = lifecycle.place_order(new_order()).await.unwrap();

        let (a, b) = tokio::join!(
            lifecycle.change_status(&first.id, OrderStatus::Shipped),
            lifecycle.change_status(&second.id, OrderStatus::Cancelled),
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(lifecycle.get(&first.id).await.unwrap().status, OrderStatus::Shipped);
        assert_eq!(
            lifecycle.get(&second.id).await.unwrap().status,
            OrderStatus::Cancelled
        );
    }

    fn stored_order(id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "customer": {"name": "Ada Obi", "email": "ada@example.com", "phone": "08030000000"},
            "shippingAddress": {"address": "1 Marina", "city": "Ikeja", "state": "Lagos"},
            "items": [{"productId": "PRD-1", "name": "Mango Jam", "price": "1500", "quantity": 2}],
            "total": "4500",
            "paymentMethod": "card",
            "status": "pending",
            "createdAt": "2026-01-05T10:00:00Z",
            "updatedAt": "2026-01-05T10:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_status_change_keeps_other_orders_as_stored() {
        let (dir, collections) = local_collections();
        let mut target = stored_order("ORD-A");
        target["paymentReference"] = json!("PSK-001");
        let mut sibling = stored_order("ORD-B");
        sibling["paymentReference"] = json!("PSK-123");
        let mut broken = stored_order("ORD-C");
        broken.as_object_mut().unwrap().remove("shippingAddress");
        let path = dir.path().join("orders.json");
        std::fs::write(
            &path,
            serde_json::to_string(&json!([target, sibling, broken])).unwrap(),
        )
        .unwrap();

        let notifier = RecordingNotifier::default();
        let lifecycle = OrderLifecycle::new(&collections, &notifier);
        let change = lifecycle
            .change_status(&OrderId::new("ORD-A"), OrderStatus::Processing)
            .await
            .unwrap();
        assert_eq!(change.previous, OrderStatus::Pending);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let raw = raw.as_array().unwrap();
        assert_eq!(raw.len(), 3);
        assert_eq!(raw[0]["status"], "processing");
        assert_eq!(raw[0]["paymentReference"], "PSK-001");
        assert_eq!(raw[1], sibling);
        assert_eq!(raw[2], broken);
    }

    #[tokio::test]
    async fn test_change_from_stale_status_writes_nothing() {
        let (_dir, collections) = local_collections();
        let notifier = RecordingNotifier::default();
        let lifecycle = OrderLifecycle::new(&collections, &notifier);
        let order = lifecycle.place_order(new_order()).await.unwrap();

        // Someone ships the order after the caller read it as pending.
        lifecycle
            .change_status(&order.id, OrderStatus::Shipped)
            .await
            .unwrap();
        let sent = notifier.sent().len();

        let err = lifecycle
            .change_status_from(&order.id, OrderStatus::Pending, OrderStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::StatusChanged {
                expected: OrderStatus::Pending,
                actual: OrderStatus::Shipped,
            }
        ));
        assert_eq!(lifecycle.get(&order.id).await.unwrap().status, OrderStatus::Shipped);
        assert_eq!(notifier.sent().len(), sent);

        let change = lifecycle
            .change_status_from(&order.id, OrderStatus::Shipped, OrderStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(change.previous, OrderStatus::Shipped);
        assert_eq!(change.current, OrderStatus::Delivered);
    }
}
