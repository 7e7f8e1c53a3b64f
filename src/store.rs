//! # Catalog Store
//!
//! [`CatalogStore`] is the persistence seam under [`crate::catalog::Catalog`].
//! [`PgStore`] is the PostgreSQL backend used by the bot; [`MemoryStore`]
//! keeps the same tables in process and enforces the same constraints, so the
//! catalog service can be exercised without a database.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPool;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::db::{self, CartItem, Category, NewProduct, Product, ShopUser, DEFAULT_PHONE};
use crate::dialogue::MAX_PRICE;

/// Row-level operations the catalog service needs
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert the user unless the telegram id is known; `true` when created
    async fn register_user(
        &self,
        telegram_id: i64,
        name: &str,
        username: Option<&str>,
    ) -> Result<(ShopUser, bool)>;

    async fn list_categories(&self) -> Result<Vec<Category>>;
    async fn get_category(&self, category_id: i64) -> Result<Option<Category>>;
    async fn get_category_by_name(&self, name: &str) -> Result<Option<Category>>;
    async fn create_category(&self, name: &str) -> Result<Category>;
    async fn rename_category(&self, category_id: i64, name: &str) -> Result<Option<Category>>;
    /// Fails while products still reference the category
    async fn delete_category(&self, category_id: i64) -> Result<bool>;

    async fn list_products(&self, category_id: i64) -> Result<Vec<Product>>;
    async fn get_product(&self, product_id: i64) -> Result<Option<Product>>;
    async fn create_product(&self, product: &NewProduct) -> Result<Product>;
    /// Removes the product and every cart line pointing to it
    async fn delete_product(&self, product_id: i64) -> Result<Option<Product>>;

    /// Add one unit and return the new quantity
    async fn add_to_cart(&self, user_id: i64, product_id: i64) -> Result<i32>;
    async fn get_cart(&self, user_id: i64) -> Result<Vec<CartItem>>;
    async fn cart_holders_of_product(&self, product_id: i64) -> Result<Vec<i64>>;
    async fn remove_from_cart(&self, user_id: i64, product_id: i64) -> Result<bool>;
    async fn clear_cart(&self, user_id: i64) -> Result<u64>;
}

/// PostgreSQL backend, a thin shim over [`crate::db`]
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn register_user(
        &self,
        telegram_id: i64,
        name: &str,
        username: Option<&str>,
    ) -> Result<(ShopUser, bool)> {
        db::register_user(&self.pool, telegram_id, name, username).await
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        db::list_categories(&self.pool).await
    }

    async fn get_category(&self, category_id: i64) -> Result<Option<Category>> {
        db::get_category(&self.pool, category_id).await
    }

    async fn get_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        db::get_category_by_name(&self.pool, name).await
    }

    async fn create_category(&self, name: &str) -> Result<Category> {
        db::create_category(&self.pool, name).await
    }

    async fn rename_category(&self, category_id: i64, name: &str) -> Result<Option<Category>> {
        db::rename_category(&self.pool, category_id, name).await
    }

    async fn delete_category(&self, category_id: i64) -> Result<bool> {
        db::delete_category(&self.pool, category_id).await
    }

    async fn list_products(&self, category_id: i64) -> Result<Vec<Product>> {
        db::list_products(&self.pool, category_id).await
    }

    async fn get_product(&self, product_id: i64) -> Result<Option<Product>> {
        db::get_product(&self.pool, product_id).await
    }

    async fn create_product(&self, product: &NewProduct) -> Result<Product> {
        db::create_product(&self.pool, product).await
    }

    async fn delete_product(&self, product_id: i64) -> Result<Option<Product>> {
        db::delete_product(&self.pool, product_id).await
    }

    async fn add_to_cart(&self, user_id: i64, product_id: i64) -> Result<i32> {
        db::add_to_cart(&self.pool, user_id, product_id).await
    }

    async fn get_cart(&self, user_id: i64) -> Result<Vec<CartItem>> {
        db::get_cart(&self.pool, user_id).await
    }

    async fn cart_holders_of_product(&self, product_id: i64) -> Result<Vec<i64>> {
        db::cart_holders_of_product(&self.pool, product_id).await
    }

    async fn remove_from_cart(&self, user_id: i64, product_id: i64) -> Result<bool> {
        db::remove_from_cart(&self.pool, user_id, product_id).await
    }

    async fn clear_cart(&self, user_id: i64) -> Result<u64> {
        db::clear_cart(&self.pool, user_id).await
    }
}

#[derive(Debug, Clone)]
struct CartRow {
    user_id: i64,
    product_id: i64,
    quantity: i32,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, ShopUser>,
    categories: BTreeMap<i64, Category>,
    products: BTreeMap<i64, Product>,
    cart: BTreeMap<i64, CartRow>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process backend with the foreign keys, checks and cascades of the
/// PostgreSQL schema
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered users
    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn register_user(
        &self,
        telegram_id: i64,
        name: &str,
        username: Option<&str>,
    ) -> Result<(ShopUser, bool)> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.users.values().find(|u| u.telegram_id == telegram_id) {
            return Ok((existing.clone(), false));
        }

        let now = Utc::now();
        let user = ShopUser {
            id: tables.next_id(),
            telegram_id,
            name: name.to_string(),
            username: username.map(str::to_string),
            phone: DEFAULT_PHONE.to_string(),
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        info!(telegram_id, user_id = user.id, "Registered new user");
        Ok((user, true))
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        Ok(self.tables.read().await.categories.values().cloned().collect())
    }

    async fn get_category(&self, category_id: i64) -> Result<Option<Category>> {
        Ok(self.tables.read().await.categories.get(&category_id).cloned())
    }

    async fn get_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        let tables = self.tables.read().await;
        Ok(tables.categories.values().find(|c| c.name == name).cloned())
    }

    async fn create_category(&self, name: &str) -> Result<Category> {
        let mut tables = self.tables.write().await;
        let category = Category {
            id: tables.next_id(),
            name: name.to_string(),
        };
        tables.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn rename_category(&self, category_id: i64, name: &str) -> Result<Option<Category>> {
        let mut tables = self.tables.write().await;
        Ok(tables.categories.get_mut(&category_id).map(|category| {
            category.name = name.to_string();
            category.clone()
        }))
    }

    async fn delete_category(&self, category_id: i64) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.products.values().any(|p| p.category_id == category_id) {
            return Err(anyhow!("Category {category_id} is still referenced by products"));
        }
        Ok(tables.categories.remove(&category_id).is_some())
    }

    async fn list_products(&self, category_id: i64) -> Result<Vec<Product>> {
        let tables = self.tables.read().await;
        Ok(tables
            .products
            .values()
            .filter(|p| p.category_id == category_id)
            .cloned()
            .collect())
    }

    async fn get_product(&self, product_id: i64) -> Result<Option<Product>> {
        Ok(self.tables.read().await.products.get(&product_id).cloned())
    }

    async fn create_product(&self, product: &NewProduct) -> Result<Product> {
        let mut tables = self.tables.write().await;
        if !tables.categories.contains_key(&product.category_id) {
            return Err(anyhow!("Category {} does not exist", product.category_id));
        }
        if product.price <= 0 || product.price > MAX_PRICE {
            return Err(anyhow!("Price {} is out of range", product.price));
        }

        let created = Product {
            id: tables.next_id(),
            name: product.name.clone(),
            description: product.description.clone(),
            price: product.price,
            category_id: product.category_id,
            photo_path: product.photo_path.clone(),
        };
        tables.products.insert(created.id, created.clone());
        Ok(created)
    }

    async fn delete_product(&self, product_id: i64) -> Result<Option<Product>> {
        let mut tables = self.tables.write().await;
        let removed = tables.products.remove(&product_id);
        if removed.is_some() {
            tables.cart.retain(|_, row| row.product_id != product_id);
        }
        Ok(removed)
    }

    async fn add_to_cart(&self, user_id: i64, product_id: i64) -> Result<i32> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user_id) {
            return Err(anyhow!("User {user_id} does not exist"));
        }
        if !tables.products.contains_key(&product_id) {
            return Err(anyhow!("Product {product_id} does not exist"));
        }

        let existing = tables
            .cart
            .values_mut()
            .find(|row| row.user_id == user_id && row.product_id == product_id);
        let quantity = match existing {
            Some(row) => {
                row.quantity += 1;
                row.quantity
            }
            None => {
                let id = tables.next_id();
                tables.cart.insert(
                    id,
                    CartRow {
                        user_id,
                        product_id,
                        quantity: 1,
                    },
                );
                1
            }
        };

        debug!(user_id, product_id, quantity, "Cart updated");
        Ok(quantity)
    }

    async fn get_cart(&self, user_id: i64) -> Result<Vec<CartItem>> {
        let tables = self.tables.read().await;
        Ok(tables
            .cart
            .iter()
            .filter(|(_, row)| row.user_id == user_id)
            .filter_map(|(id, row)| {
                tables.products.get(&row.product_id).map(|product| CartItem {
                    id: *id,
                    user_id: row.user_id,
                    product_id: row.product_id,
                    quantity: row.quantity,
                    product_name: product.name.clone(),
                    price: product.price,
                })
            })
            .collect())
    }

    async fn cart_holders_of_product(&self, product_id: i64) -> Result<Vec<i64>> {
        let tables = self.tables.read().await;
        let mut holders: Vec<i64> = tables
            .cart
            .values()
            .filter(|row| row.product_id == product_id)
            .map(|row| row.user_id)
            .collect();
        holders.sort_unstable();
        holders.dedup();
        Ok(holders)
    }

    async fn remove_from_cart(&self, user_id: i64, product_id: i64) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.cart.len();
        tables
            .cart
            .retain(|_, row| !(row.user_id == user_id && row.product_id == product_id));
        Ok(tables.cart.len() < before)
    }

    async fn clear_cart(&self, user_id: i64) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.cart.len();
        tables.cart.retain(|_, row| row.user_id != user_id);
        Ok((before - tables.cart.len()) as u64)
    }
}
