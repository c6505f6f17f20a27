//! Product repository.

use std::cmp::Ordering;

use chrono::Utc;

use corner_shop_core::ProductId;

use super::{Collections, Record, RepositoryError};
use crate::models::{NewProduct, Product};

/// Repository for catalog products.
pub struct ProductRepository<'a> {
    collections: &'a Collections,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(collections: &'a Collections) -> Self {
        Self { collections }
    }

    /// Every product, in stored order.
    pub async fn list_all(&self) -> Vec<Product> {
        self.collections.list_all().await
    }

    /// Active products sorted by their catalog position. Products without a
    /// position come last, oldest first.
    pub async fn list_active(&self) -> Vec<Product> {
        let mut products: Vec<Product> = self
            .list_all()
            .await
            .into_iter()
            .filter(|p| p.active)
            .collect();
        products.sort_by(|a, b| by_position(a.order, b.order).then(a.created_at.cmp(&b.created_at)));
        products
    }

    /// Active products in `category`, sorted by their position in that
    /// category, then by catalog position.
    pub async fn list_by_category(&self, category: &str) -> Vec<Product> {
        let mut products: Vec<Product> = self
            .list_all()
            .await
            .into_iter()
            .filter(|p| p.active && p.in_category(category))
            .collect();
        products.sort_by(|a, b| {
            by_position(a.position_in(category), b.position_in(category))
                .then(by_position(a.order, b.order))
                .then(a.created_at.cmp(&b.created_at))
        });
        products
    }

    /// Get a product by id.
    pub async fn get_by_id(&self, id: &ProductId) -> Option<Product> {
        self.collections.get_by_id(id.as_str()).await
    }

    /// Create a product at the end of the catalog.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Validation` if the name is empty.
    /// Returns `RepositoryError::Store` if the catalog could not be saved.
    pub async fn create(&self, input: NewProduct) -> Result<Product, RepositoryError> {
        let mut product = input.into_product();
        if product.name.is_empty() {
            return Err(RepositoryError::Validation("product name is required".to_owned()));
        }

        self.collections
            .update_list(move |products: &mut Vec<Product>| {
                let next = products
                    .iter()
                    .filter_map(|p| p.order)
                    .max()
                    .map_or(0, |max| max.saturating_add(1));
                product.order = Some(next);
                let now = Utc::now();
                product.set_timestamps(now, now);
                products.push(product.clone());
                Ok(product)
            })
            .await
    }

    /// Replace a stored product. Returns `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the catalog could not be saved.
    pub async fn update(&self, product: Product) -> Result<Option<Product>, RepositoryError> {
        let id = product.id.clone();
        self.collections.replace_by_id(id.as_str(), product).await
    }

    /// Delete a product. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the catalog could not be saved.
    pub async fn delete(&self, id: &ProductId) -> Result<bool, RepositoryError> {
        self.collections.remove_by_id::<Product>(id.as_str()).await
    }

    /// Assign catalog positions `0..` in the order of `ids`. Products not
    /// listed keep their position.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if an id does not exist (nothing
    /// is written). Returns `RepositoryError::Store` if the catalog could not
    /// be saved.
    pub async fn reorder(&self, ids: &[ProductId]) -> Result<(), RepositoryError> {
        self.collections
            .update_list(|products: &mut Vec<Product>| {
                assign_positions(products, ids, |product, position| {
                    product.order = Some(position);
                })
            })
            .await
    }

    /// Assign positions within `category` in the order of `ids`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if an id does not exist (nothing
    /// is written). Returns `RepositoryError::Store` if the catalog could not
    /// be saved.
    pub async fn reorder_category(
        &self,
        category: &str,
        ids: &[ProductId],
    ) -> Result<(), RepositoryError> {
        let category = category.trim().to_owned();
        self.collections
            .update_list(|products: &mut Vec<Product>| {
                assign_positions(products, ids, |product, position| {
                    product.category_order.insert(category.clone(), position);
                })
            })
            .await
    }
}

/// Positions ascending, missing positions last.
fn by_position(a: Option<u32>, b: Option<u32>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn assign_positions<F>(products: &mut [Product], ids: &[ProductId], mut set: F) -> Result<(), RepositoryError>
where
    F: FnMut(&mut Product, u32),
{
    if let Some(missing) = ids.iter().find(|id| !products.iter().any(|p| &p.id == *id)) {
        tracing::debug!(product_id = %missing, "Reorder references unknown product");
        return Err(RepositoryError::NotFound);
    }

    let now = Utc::now();
    for (position, id) in (0_u32..).zip(ids) {
        if let Some(product) = products.iter_mut().find(|p| &p.id == id) {
            set(product, position);
            product.updated_at = now;
        }
    }
    Ok(())
}
