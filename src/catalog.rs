//! # Catalog/Cart Service
//!
//! Cache-aside accessors over a [`CatalogStore`]. Reads go through
//! [`get_or_load`]; writes hit the database first and then drop every cache
//! key the write made stale.
//!
//! There is a window between the database commit and the invalidation in
//! which a concurrent reader can repopulate a key with the old value. The
//! next write to the same entity invalidates it again.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use crate::cache::{get_or_load, keys, CacheStore, USER_TTL};
use crate::db::{CartItem, Category, NewProduct, Product, ShopUser};
use crate::errors::ShopError;
use crate::images;
use crate::store::CatalogStore;

pub struct Catalog {
    store: Arc<dyn CatalogStore>,
    cache: Arc<dyn CacheStore>,
}

impl Catalog {
    pub fn new(store: Arc<dyn CatalogStore>, cache: Arc<dyn CacheStore>) -> Self {
        Self { store, cache }
    }

    async fn invalidate(&self, keys: Vec<String>) -> Result<()> {
        if let Err(e) = self.cache.invalidate(&keys).await {
            error!(keys = ?keys, error = %e, "Cache invalidation failed");
            return Err(e).context("Failed to invalidate cache");
        }
        Ok(())
    }

    // Users

    /// Return the registered user, inserting them on first contact
    pub async fn ensure_user(
        &self,
        telegram_id: i64,
        name: &str,
        username: Option<&str>,
    ) -> Result<ShopUser> {
        let store = self.store.as_ref();
        get_or_load(
            self.cache.as_ref(),
            &keys::user(telegram_id),
            Some(USER_TTL),
            || async move {
                let (user, created) = store.register_user(telegram_id, name, username).await?;
                if created {
                    info!(telegram_id, user_id = user.id, "User registered on first contact");
                }
                Ok(user)
            },
        )
        .await
    }

    // Categories

    pub async fn categories(&self) -> Result<Vec<Category>> {
        let store = self.store.as_ref();
        get_or_load(self.cache.as_ref(), keys::CATEGORIES, None, || {
            store.list_categories()
        })
        .await
    }

    pub async fn category_by_name(&self, name: &str) -> Result<Option<Category>> {
        let store = self.store.as_ref();
        get_or_load(
            self.cache.as_ref(),
            &keys::category_by_name(name),
            None,
            || store.get_category_by_name(name),
        )
        .await
    }

    pub async fn create_category(&self, name: &str) -> Result<Category> {
        let category = self.store.create_category(name).await?;
        self.invalidate(vec![
            keys::CATEGORIES.to_string(),
            keys::category_by_name(name),
        ])
        .await?;
        Ok(category)
    }

    pub async fn rename_category(&self, category_id: i64, name: &str) -> Result<Category> {
        let old = self
            .store
            .get_category(category_id)
            .await?
            .ok_or_else(|| ShopError::NotFound(format!("category {category_id}")))?;

        let renamed = self
            .store
            .rename_category(category_id, name)
            .await?
            .ok_or_else(|| ShopError::NotFound(format!("category {category_id}")))?;

        self.invalidate(vec![
            keys::CATEGORIES.to_string(),
            keys::category_by_name(&old.name),
            keys::category_by_name(name),
        ])
        .await?;

        info!(category_id, old_name = %old.name, new_name = %name, "Category renamed");
        Ok(renamed)
    }

    /// Delete a category together with its products and their photos
    pub async fn delete_category(&self, category_id: i64) -> Result<Category> {
        let category = self
            .store
            .get_category(category_id)
            .await?
            .ok_or_else(|| ShopError::NotFound(format!("category {category_id}")))?;

        for product in self.store.list_products(category_id).await? {
            self.delete_product(product.id).await?;
        }

        if !self.store.delete_category(category_id).await? {
            return Err(ShopError::NotFound(format!("category {category_id}")).into());
        }

        self.invalidate(vec![
            keys::CATEGORIES.to_string(),
            keys::category_by_name(&category.name),
            keys::products_of_category(category_id),
        ])
        .await?;

        info!(category_id, "Category deleted");
        Ok(category)
    }

    // Products

    pub async fn products(&self, category_id: i64) -> Result<Vec<Product>> {
        let store = self.store.as_ref();
        get_or_load(
            self.cache.as_ref(),
            &keys::products_of_category(category_id),
            None,
            || store.list_products(category_id),
        )
        .await
    }

    pub async fn product(&self, product_id: i64) -> Result<Option<Product>> {
        let store = self.store.as_ref();
        get_or_load(
            self.cache.as_ref(),
            &keys::product(product_id),
            None,
            || store.get_product(product_id),
        )
        .await
    }

    pub async fn create_product(&self, product: &NewProduct) -> Result<Product> {
        let created = self.store.create_product(product).await?;
        self.invalidate(vec![
            keys::products_of_category(created.category_id),
            keys::product(created.id),
        ])
        .await?;
        Ok(created)
    }

    /// Delete a product and, best effort, its photo
    pub async fn delete_product(&self, product_id: i64) -> Result<Product> {
        let holders = self.store.cart_holders_of_product(product_id).await?;

        let product = self
            .store
            .delete_product(product_id)
            .await?
            .ok_or_else(|| ShopError::NotFound(format!("product {product_id}")))?;

        images::remove_photo(Path::new(&product.photo_path)).await;

        let mut stale = vec![
            keys::products_of_category(product.category_id),
            keys::product(product.id),
        ];
        stale.extend(holders.into_iter().map(keys::cart));
        self.invalidate(stale).await?;

        info!(product_id, category_id = product.category_id, "Product deleted");
        Ok(product)
    }

    // Cart

    pub async fn cart(&self, user_id: i64) -> Result<Vec<CartItem>> {
        let store = self.store.as_ref();
        get_or_load(self.cache.as_ref(), &keys::cart(user_id), None, || {
            store.get_cart(user_id)
        })
        .await
    }

    /// Add one unit and return the new quantity
    pub async fn add_to_cart(&self, user_id: i64, product_id: i64) -> Result<i32> {
        let quantity = self.store.add_to_cart(user_id, product_id).await?;
        self.invalidate(vec![keys::cart(user_id)]).await?;
        Ok(quantity)
    }

    pub async fn remove_from_cart(&self, user_id: i64, product_id: i64) -> Result<bool> {
        let removed = self.store.remove_from_cart(user_id, product_id).await?;
        self.invalidate(vec![keys::cart(user_id)]).await?;
        Ok(removed)
    }

    pub async fn clear_cart(&self, user_id: i64) -> Result<u64> {
        let removed = self.store.clear_cart(user_id).await?;
        self.invalidate(vec![keys::cart(user_id)]).await?;
        Ok(removed)
    }
}
