//! Relational store for users, the catalog and carts (PostgreSQL via sqlx).
//!
//! These functions talk to the database only. Caching lives one layer up in
//! [`crate::catalog`].

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use tracing::{debug, info};

use crate::errors::ShopError;

/// Phone value stored for users who never shared a contact
pub const DEFAULT_PHONE: &str = "not specified";

/// A registered bot user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ShopUser {
    pub id: i64,
    pub telegram_id: i64,
    pub name: String,
    pub username: Option<String>,
    pub phone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// Price in whole roubles
    pub price: i64,
    pub category_id: i64,
    pub photo_path: String,
}

/// Fields collected by the admin "add product" flow
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: i64,
    pub category_id: i64,
    pub photo_path: String,
}

/// A cart row joined with the product it points to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CartItem {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub product_name: String,
    pub price: i64,
}

impl CartItem {
    pub fn line_total(&self) -> Result<i64, ShopError> {
        self.price
            .checked_mul(i64::from(self.quantity))
            .ok_or(ShopError::AmountOverflow)
    }
}

/// Sum of all cart lines in roubles
pub fn cart_total(items: &[CartItem]) -> Result<i64, ShopError> {
    items.iter().try_fold(0i64, |total, item| {
        total
            .checked_add(item.line_total()?)
            .ok_or(ShopError::AmountOverflow)
    })
}

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id BIGSERIAL PRIMARY KEY,
            telegram_id BIGINT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            username TEXT,
            phone VARCHAR(16) NOT NULL DEFAULT 'not specified',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create users table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS categories (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create categories table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS products (
            id BIGSERIAL PRIMARY KEY,
            name VARCHAR(150) NOT NULL,
            description TEXT NOT NULL,
            price BIGINT NOT NULL CHECK (price > 0 AND price <= 1000000),
            category_id BIGINT NOT NULL REFERENCES categories(id),
            photo_path TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create products table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS cart (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            product_id BIGINT NOT NULL REFERENCES products(id) ON DELETE CASCADE,
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (user_id, product_id)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create cart table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_products_category_id ON products(category_id)")
        .execute(pool)
        .await
        .context("Failed to create products category index")?;

    info!("Database schema initialized successfully");
    Ok(())
}

// Users

pub async fn get_user_by_telegram_id(pool: &PgPool, telegram_id: i64) -> Result<Option<ShopUser>> {
    sqlx::query_as::<_, ShopUser>(
        "SELECT id, telegram_id, name, username, phone, created_at, updated_at
         FROM users WHERE telegram_id = $1",
    )
    .bind(telegram_id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch user by telegram id")
}

/// Insert the user unless a row with this telegram id exists.
///
/// Returns the stored row and whether this call created it.
pub async fn register_user(
    pool: &PgPool,
    telegram_id: i64,
    name: &str,
    username: Option<&str>,
) -> Result<(ShopUser, bool)> {
    let inserted = sqlx::query_as::<_, ShopUser>(
        "INSERT INTO users (telegram_id, name, username, phone)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (telegram_id) DO NOTHING
         RETURNING id, telegram_id, name, username, phone, created_at, updated_at",
    )
    .bind(telegram_id)
    .bind(name)
    .bind(username)
    .bind(DEFAULT_PHONE)
    .fetch_optional(pool)
    .await
    .context("Failed to insert user")?;

    if let Some(user) = inserted {
        info!(telegram_id, user_id = user.id, "Registered new user");
        return Ok((user, true));
    }

    let existing = get_user_by_telegram_id(pool, telegram_id)
        .await?
        .with_context(|| format!("User {telegram_id} vanished after conflicting insert"))?;
    Ok((existing, false))
}

// Categories

pub async fn list_categories(pool: &PgPool) -> Result<Vec<Category>> {
    sqlx::query_as::<_, Category>("SELECT id, name FROM categories ORDER BY id")
        .fetch_all(pool)
        .await
        .context("Failed to list categories")
}

pub async fn get_category(pool: &PgPool, category_id: i64) -> Result<Option<Category>> {
    sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE id = $1")
        .bind(category_id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch category")
}

pub async fn get_category_by_name(pool: &PgPool, name: &str) -> Result<Option<Category>> {
    sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE name = $1 ORDER BY id LIMIT 1")
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch category by name")
}

pub async fn create_category(pool: &PgPool, name: &str) -> Result<Category> {
    let category = sqlx::query_as::<_, Category>(
        "INSERT INTO categories (name) VALUES ($1) RETURNING id, name",
    )
    .bind(name)
    .fetch_one(pool)
    .await
    .context("Failed to insert category")?;

    info!(category_id = category.id, "Category created");
    Ok(category)
}

pub async fn rename_category(pool: &PgPool, category_id: i64, name: &str) -> Result<Option<Category>> {
    sqlx::query_as::<_, Category>(
        "UPDATE categories SET name = $1, updated_at = NOW() WHERE id = $2 RETURNING id, name",
    )
    .bind(name)
    .bind(category_id)
    .fetch_optional(pool)
    .await
    .context("Failed to rename category")
}

pub async fn delete_category(pool: &PgPool, category_id: i64) -> Result<bool> {
    let rows_affected = sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(category_id)
        .execute(pool)
        .await
        .context("Failed to delete category")?
        .rows_affected();

    Ok(rows_affected > 0)
}

// Products

pub async fn list_products(pool: &PgPool, category_id: i64) -> Result<Vec<Product>> {
    sqlx::query_as::<_, Product>(
        "SELECT id, name, description, price, category_id, photo_path
         FROM products WHERE category_id = $1 ORDER BY id",
    )
    .bind(category_id)
    .fetch_all(pool)
    .await
    .context("Failed to list products")
}

pub async fn get_product(pool: &PgPool, product_id: i64) -> Result<Option<Product>> {
    sqlx::query_as::<_, Product>(
        "SELECT id, name, description, price, category_id, photo_path
         FROM products WHERE id = $1",
    )
    .bind(product_id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch product")
}

pub async fn create_product(pool: &PgPool, product: &NewProduct) -> Result<Product> {
    let created = sqlx::query_as::<_, Product>(
        "INSERT INTO products (name, description, price, category_id, photo_path)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id, name, description, price, category_id, photo_path",
    )
    .bind(&product.name)
    .bind(&product.description)
    .bind(product.price)
    .bind(product.category_id)
    .bind(&product.photo_path)
    .fetch_one(pool)
    .await
    .context("Failed to insert product")?;

    info!(product_id = created.id, category_id = created.category_id, "Product created");
    Ok(created)
}

/// Delete a product and return the deleted row
pub async fn delete_product(pool: &PgPool, product_id: i64) -> Result<Option<Product>> {
    sqlx::query_as::<_, Product>(
        "DELETE FROM products WHERE id = $1
         RETURNING id, name, description, price, category_id, photo_path",
    )
    .bind(product_id)
    .fetch_optional(pool)
    .await
    .context("Failed to delete product")
}

// Cart

/// Add one unit of a product to the user's cart and return the new quantity
pub async fn add_to_cart(pool: &PgPool, user_id: i64, product_id: i64) -> Result<i32> {
    let quantity: i32 = sqlx::query_scalar(
        "INSERT INTO cart (user_id, product_id, quantity)
         VALUES ($1, $2, 1)
         ON CONFLICT (user_id, product_id)
         DO UPDATE SET quantity = cart.quantity + 1, updated_at = NOW()
         RETURNING quantity",
    )
    .bind(user_id)
    .bind(product_id)
    .fetch_one(pool)
    .await
    .context("Failed to add product to cart")?;

    debug!(user_id, product_id, quantity, "Cart updated");
    Ok(quantity)
}

pub async fn get_cart(pool: &PgPool, user_id: i64) -> Result<Vec<CartItem>> {
    sqlx::query_as::<_, CartItem>(
        "SELECT c.id, c.user_id, c.product_id, c.quantity,
                p.name AS product_name, p.price
         FROM cart c
         JOIN products p ON p.id = c.product_id
         WHERE c.user_id = $1
         ORDER BY c.id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to fetch cart")
}

/// Ids of users whose cart holds the product
pub async fn cart_holders_of_product(pool: &PgPool, product_id: i64) -> Result<Vec<i64>> {
    sqlx::query_scalar("SELECT DISTINCT user_id FROM cart WHERE product_id = $1")
        .bind(product_id)
        .fetch_all(pool)
        .await
        .context("Failed to fetch cart holders of product")
}

pub async fn remove_from_cart(pool: &PgPool, user_id: i64, product_id: i64) -> Result<bool> {
    let rows_affected = sqlx::query("DELETE FROM cart WHERE user_id = $1 AND product_id = $2")
        .bind(user_id)
        .bind(product_id)
        .execute(pool)
        .await
        .context("Failed to remove product from cart")?
        .rows_affected();

    Ok(rows_affected > 0)
}

pub async fn clear_cart(pool: &PgPool, user_id: i64) -> Result<u64> {
    let rows_affected = sqlx::query("DELETE FROM cart WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to clear cart")?
        .rows_affected();

    Ok(rows_affected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(product_id: i64, price: i64, quantity: i32) -> CartItem {
        CartItem {
            id: product_id,
            user_id: 1,
            product_id,
            quantity,
            product_name: format!("product {product_id}"),
            price,
        }
    }

    #[test]
    fn test_cart_total() {
        assert_eq!(cart_total(&[]), Ok(0));
        assert_eq!(cart_total(&[item(1, 350, 2)]), Ok(700));
        assert_eq!(cart_total(&[item(1, 350, 2), item(2, 120, 3)]), Ok(1060));
    }

    #[test]
    fn test_cart_total_overflow_is_an_error() {
        let huge = item(1, 9_000_000_000_000_000_000, 2);
        assert_eq!(huge.line_total(), Err(ShopError::AmountOverflow));
        assert_eq!(cart_total(&[huge]), Err(ShopError::AmountOverflow));

        let half = item(1, i64::MAX / 2 + 1, 1);
        assert_eq!(
            cart_total(&[half.clone(), item(2, i64::MAX / 2 + 1, 1)]),
            Err(ShopError::AmountOverflow)
        );
        assert_eq!(half.line_total(), Ok(i64::MAX / 2 + 1));
    }
}
