//! Order repository.

use chrono::Utc;

use corner_shop_core::{OrderId, OrderStatus};

use super::{Collections, RepositoryError};
use crate::models::Order;

/// Repository for orders.
pub struct OrderRepository<'a> {
    collections: &'a Collections,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(collections: &'a Collections) -> Self {
        Self { collections }
    }

    /// Every order, newest first.
    pub async fn list_all(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.collections.list_all().await;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }

    /// Orders with a given status, newest first.
    pub async fn list_by_status(&self, status: OrderStatus) -> Vec<Order> {
        let mut orders = self.list_all().await;
        orders.retain(|o| o.status == status);
        orders
    }

    /// Orders placed with `email` (trimmed, case-insensitive), newest first.
    pub async fn list_for_customer(&self, email: &str) -> Vec<Order> {
        let email = email.trim();
        let mut orders = self.list_all().await;
        orders.retain(|o| o.customer.email.trim().eq_ignore_ascii_case(email));
        orders
    }

    /// Get an order by id.
    pub async fn get_by_id(&self, id: &OrderId) -> Option<Order> {
        self.collections.get_by_id(id.as_str()).await
    }

    /// Store a new order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the id is taken.
    /// Returns `RepositoryError::Store` if the orders could not be saved.
    pub async fn create(&self, order: Order) -> Result<Order, RepositoryError> {
        self.collections.append(order).await
    }

    /// Set an order's status and return `(previous status, updated order)`.
    ///
    /// With `expected` set, the change only applies if the order still has
    /// that status when the write lock is held. Setting the status an order
    /// already has writes nothing.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    /// Returns `RepositoryError::Conflict` if the order's status is not
    /// `expected`.
    /// Returns `RepositoryError::Store` if the orders could not be saved.
    pub async fn set_status(
        &self,
        id: &OrderId,
        expected: Option<OrderStatus>,
        status: OrderStatus,
    ) -> Result<(OrderStatus, Order), RepositoryError> {
        self.collections
            .update_list(|orders: &mut Vec<Order>| {
                let order = orders
                    .iter_mut()
                    .find(|o| &o.id == id)
                    .ok_or(RepositoryError::NotFound)?;

                let previous = order.status;
                if let Some(expected) = expected
                    && previous != expected
                {
                    return Err(RepositoryError::Conflict(format!(
                        "order is {previous}, expected {expected}"
                    )));
                }
                if previous != status {
                    order.status = status;
                    order.updated_at = Utc::now();
                }
                Ok((previous, order.clone()))
            })
            .await
    }

    /// Delete an order. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the orders could not be saved.
    pub async fn delete(&self, id: &OrderId) -> Result<bool, RepositoryError> {
        self.collections.remove_by_id::<Order>(id.as_str()).await
    }
}
