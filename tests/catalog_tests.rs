use anyhow::{Context, Result};
use pizzeria_bot::cache::{keys, CacheStore, MemoryCache};
use pizzeria_bot::catalog::Catalog;
use pizzeria_bot::db::{self, NewProduct, Product};
use pizzeria_bot::errors::ShopError;
use pizzeria_bot::store::MemoryStore;
use std::sync::Arc;

struct Fixture {
    catalog: Catalog,
    store: Arc<MemoryStore>,
    cache: Arc<MemoryCache>,
}

fn setup_catalog() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryCache::new());
    let catalog = Catalog::new(store.clone(), cache.clone());
    Fixture {
        catalog,
        store,
        cache,
    }
}

async fn add_product(catalog: &Catalog, category_id: i64, name: &str, price: i64) -> Result<Product> {
    catalog
        .create_product(&NewProduct {
            name: name.to_string(),
            description: "House recipe".to_string(),
            price,
            category_id,
            photo_path: format!("images/{name}-missing.jpg"),
        })
        .await
}

#[tokio::test]
async fn test_first_contact_then_cart_total() -> Result<()> {
    let Fixture { catalog, .. } = setup_catalog();
    let user = catalog.ensure_user(920_001, "Dmitry", Some("dima")).await?;
    let again = catalog.ensure_user(920_001, "Dmitry", Some("dima")).await?;
    assert_eq!(user.id, again.id);

    let pizza = catalog.create_category("Pizza").await?;
    let margherita = add_product(&catalog, pizza.id, "Margherita", 350).await?;

    catalog.add_to_cart(user.id, margherita.id).await?;
    assert_eq!(catalog.add_to_cart(user.id, margherita.id).await?, 2);

    let cart = catalog.cart(user.id).await?;
    assert_eq!(cart.len(), 1);
    assert_eq!(cart[0].quantity, 2);
    assert_eq!(db::cart_total(&cart)?, 700);

    assert_eq!(catalog.clear_cart(user.id).await?, 1);
    assert!(catalog.cart(user.id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_ensure_user_registers_once() -> Result<()> {
    let Fixture {
        catalog,
        store,
        cache,
    } = setup_catalog();

    for _ in 0..3 {
        catalog.ensure_user(920_002, "Alice", None).await?;
    }
    assert_eq!(store.user_count().await, 1);

    // A cold cache falls back to the store without inserting twice
    cache.invalidate(&[keys::user(920_002)]).await?;
    let user = catalog.ensure_user(920_002, "Alice", None).await?;
    assert_eq!(user.telegram_id, 920_002);
    assert_eq!(store.user_count().await, 1);

    catalog.ensure_user(920_003, "Bob", None).await?;
    assert_eq!(store.user_count().await, 2);
    Ok(())
}

#[tokio::test]
async fn test_deleted_category_invalidates_cached_list() -> Result<()> {
    let Fixture { catalog, .. } = setup_catalog();
    let category = catalog.create_category("Seasonal").await?;
    let product = add_product(&catalog, category.id, "Pumpkin", 400).await?;

    // Warm the cache
    assert!(catalog.categories().await?.iter().any(|c| c.id == category.id));
    assert_eq!(catalog.products(category.id).await?.len(), 1);
    assert!(catalog.product(product.id).await?.is_some());

    let deleted = catalog.delete_category(category.id).await?;
    assert_eq!(deleted.name, "Seasonal");

    assert!(catalog.categories().await?.iter().all(|c| c.id != category.id));
    assert!(catalog.products(category.id).await?.is_empty());
    assert!(catalog.product(product.id).await?.is_none());
    assert!(catalog.category_by_name("Seasonal").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_rename_category_refreshes_name_lookup() -> Result<()> {
    let Fixture { catalog, .. } = setup_catalog();
    let category = catalog.create_category("Snacks").await?;
    assert!(catalog.category_by_name("Snacks").await?.is_some());
    assert!(catalog.category_by_name("Starters").await?.is_none());

    catalog.rename_category(category.id, "Starters").await?;

    assert!(catalog.category_by_name("Snacks").await?.is_none());
    let found = catalog
        .category_by_name("Starters")
        .await?
        .context("renamed category should be found")?;
    assert_eq!(found.id, category.id);
    assert_eq!(catalog.categories().await?[0].name, "Starters");

    Ok(())
}

#[tokio::test]
async fn test_deleted_product_invalidates_holder_carts() -> Result<()> {
    let Fixture { catalog, .. } = setup_catalog();
    let alice = catalog.ensure_user(920_004, "Alice", None).await?;
    let bob = catalog.ensure_user(920_005, "Bob", None).await?;
    let category = catalog.create_category("Drinks").await?;
    let cola = add_product(&catalog, category.id, "Cola", 150).await?;
    let juice = add_product(&catalog, category.id, "Juice", 180).await?;

    catalog.add_to_cart(alice.id, cola.id).await?;
    catalog.add_to_cart(bob.id, cola.id).await?;
    catalog.add_to_cart(bob.id, juice.id).await?;

    // Warm the cart caches
    assert!(catalog.cart(alice.id).await?.iter().any(|i| i.product_id == cola.id));
    assert!(catalog.cart(bob.id).await?.iter().any(|i| i.product_id == cola.id));

    catalog.delete_product(cola.id).await?;

    assert!(catalog.cart(alice.id).await?.is_empty());
    let bob_cart = catalog.cart(bob.id).await?;
    assert!(bob_cart.iter().all(|i| i.product_id != cola.id));
    assert!(bob_cart.iter().any(|i| i.product_id == juice.id));

    Ok(())
}

#[tokio::test]
async fn test_remove_from_cart_is_per_user() -> Result<()> {
    let Fixture { catalog, .. } = setup_catalog();
    let alice = catalog.ensure_user(920_006, "Alice", None).await?;
    let bob = catalog.ensure_user(920_007, "Bob", None).await?;
    let category = catalog.create_category("Pizza").await?;
    let pepperoni = add_product(&catalog, category.id, "Pepperoni", 450).await?;

    catalog.add_to_cart(alice.id, pepperoni.id).await?;
    catalog.add_to_cart(bob.id, pepperoni.id).await?;

    // Warm both carts
    catalog.cart(alice.id).await?;
    catalog.cart(bob.id).await?;

    assert!(catalog.remove_from_cart(alice.id, pepperoni.id).await?);
    assert!(!catalog.remove_from_cart(alice.id, pepperoni.id).await?);

    assert!(catalog.cart(alice.id).await?.is_empty());
    assert!(catalog.cart(bob.id).await?.iter().any(|i| i.product_id == pepperoni.id));

    Ok(())
}

#[tokio::test]
async fn test_missing_entities_are_not_found() -> Result<()> {
    let Fixture { catalog, .. } = setup_catalog();

    let err = catalog.delete_product(i64::MAX).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<ShopError>(), Some(ShopError::NotFound(_))));

    let err = catalog.rename_category(i64::MAX, "Nothing").await.unwrap_err();
    assert!(matches!(err.downcast_ref::<ShopError>(), Some(ShopError::NotFound(_))));

    let err = catalog.delete_category(i64::MAX).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<ShopError>(), Some(ShopError::NotFound(_))));

    Ok(())
}
