//! Catalog products.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use corner_shop_core::{Price, ProductId};

use super::timestamped_record;
use crate::backend::Collection;

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
    /// Struck-through "was" price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_price: Option<Price>,
    #[serde(default)]
    pub description: String,
    /// Public image URL.
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    /// Inactive products are hidden from the storefront.
    #[serde(default = "default_active")]
    pub active: bool,
    /// Position in the full catalog; unordered products sort last.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    /// Position within each category.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub category_order: BTreeMap<String, u32>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

const fn default_active() -> bool {
    true
}

timestamped_record!(Product, Collection::Products);

impl Product {
    /// Whether the product is listed in `category` (case-insensitive).
    #[must_use]
    pub fn in_category(&self, category: &str) -> bool {
        let category = category.trim();
        self.categories
            .iter()
            .any(|c| c.trim().eq_ignore_ascii_case(category))
    }

    /// Position within `category`, if one was assigned.
    #[must_use]
    pub fn position_in(&self, category: &str) -> Option<u32> {
        let category = category.trim();
        self.category_order
            .iter()
            .find(|(name, _)| name.trim().eq_ignore_ascii_case(category))
            .map(|(_, position)| *position)
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub price: Price,
    #[serde(default)]
    pub old_price: Option<Price>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl NewProduct {
    /// Build the stored product under a fresh id.
    #[must_use]
    pub fn into_product(self) -> Product {
        Product {
            id: ProductId::generate(),
            name: self.name.trim().to_owned(),
            price: self.price,
            old_price: self.old_price,
            description: self.description,
            image: self.image,
            categories: self
                .categories
                .into_iter()
                .map(|c| c.trim().to_owned())
                .filter(|c| !c.is_empty())
                .collect(),
            active: self.active,
            order: None,
            category_order: BTreeMap::new(),
            created_at: DateTime::default(),
            updated_at: DateTime::default(),
        }
    }
}
