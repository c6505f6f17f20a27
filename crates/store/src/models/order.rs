//! Orders with frozen customer, address and item snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use corner_shop_core::{OrderId, OrderStatus, Price, ProductId};

use super::timestamped_record;
use crate::backend::Collection;

/// A placed order.
///
/// `customer`, `shipping_address` and `items` are copies taken when the order
/// was placed and are never joined against live users or products. `total`
/// is stored as supplied and never recomputed from the items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub customer: CustomerSnapshot,
    pub shipping_address: AddressSnapshot,
    pub items: Vec<OrderItem>,
    pub total: Price,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

timestamped_record!(Order, Collection::Orders);

/// Customer contact details as entered at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSnapshot {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

/// Delivery address as entered at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressSnapshot {
    pub address: String,
    pub city: String,
    pub state: String,
}

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub name: String,
    /// Unit price at the time of purchase.
    pub price: Price,
    pub quantity: u32,
}

impl OrderItem {
    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.price.times(self.quantity)
    }
}

/// Input for placing an order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub customer: CustomerSnapshot,
    pub shipping_address: AddressSnapshot,
    pub items: Vec<OrderItem>,
    pub total: Price,
    pub payment_method: String,
}

impl NewOrder {
    /// Build the stored order under a fresh id with status pending.
    #[must_use]
    pub fn into_order(self) -> Order {
        Order {
            id: OrderId::generate(),
            customer: self.customer,
            shipping_address: self.shipping_address,
            items: self.items,
            total: self.total,
            payment_method: self.payment_method,
            status: OrderStatus::Pending,
            created_at: DateTime::default(),
            updated_at: DateTime::default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_stored_shape() {
        let order: Order = serde_json::from_value(json!({
            "id": "ORD-1",
            "customer": {"name": "Ada", "email": "ada@example.com", "phone": "0803"},
            "shippingAddress": {"address": "1 Marina", "city": "Ikeja", "state": "Lagos"},
            "items": [{"productId": "PRD-1", "name": "Jam", "price": "1500", "quantity": 2}],
            "total": "3000",
            "paymentMethod": "card",
            "status": "shipped"
        }))
        .unwrap();

        assert_eq!(order.status, OrderStatus::Shipped);
        assert_eq!(order.items[0].line_total(), Price::from_units(3000));

        let value = serde_json::to_value(&order).unwrap();
        assert_eq!(value["shippingAddress"]["city"], json!("Ikeja"));
        assert_eq!(value["items"][0]["productId"], json!("PRD-1"));
    }

    #[test]
    fn test_total_is_kept_as_supplied() {
        let order = NewOrder {
            customer: CustomerSnapshot {
                name: "Ada".to_owned(),
                email: "ada@example.com".to_owned(),
                phone: String::new(),
            },
            shipping_address: AddressSnapshot {
                address: "1 Marina".to_owned(),
                city: "Ikeja".to_owned(),
                state: "Lagos".to_owned(),
            },
            items: vec![OrderItem {
                product_id: ProductId::new("PRD-1"),
                name: "Jam".to_owned(),
                price: Price::from_units(1500),
                quantity: 2,
            }],
            total: Price::from_units(4500),
            payment_method: "transfer".to_owned(),
        }
        .into_order();

        assert_eq!(order.total, Price::from_units(4500));
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.id.as_str().starts_with("ORD-"));
    }
}
