use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::env;
use std::sync::Arc;
use teloxide::dispatching::dialogue::serializer::Json;
use teloxide::dispatching::dialogue::{ErasedStorage, InMemStorage, RedisStorage, Storage};
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pizzeria_bot::bot;
use pizzeria_bot::cache::{CacheStore, MemoryCache, RedisCache};
use pizzeria_bot::catalog::Catalog;
use pizzeria_bot::config::BotConfig;
use pizzeria_bot::db;
use pizzeria_bot::dialogue::State;
use pizzeria_bot::localization::init_localization;
use pizzeria_bot::store::PgStore;
use pizzeria_bot::throttle::Throttle;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing();
    info!("Starting pizzeria bot");

    init_localization()?;
    let config = BotConfig::from_env()?;
    info!(
        admins = config.admin_ids.len(),
        images_dir = %config.images_dir.display(),
        redis = config.redis_url.is_some(),
        "Configuration loaded"
    );

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    db::init_database_schema(&pool).await?;

    tokio::fs::create_dir_all(&config.images_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.images_dir.display()))?;

    let (cache, storage) = match &config.redis_url {
        Some(url) => {
            let cache: Arc<dyn CacheStore> = Arc::new(RedisCache::connect(url).await?);
            let storage: Arc<ErasedStorage<State>> = RedisStorage::open(url.as_str(), Json)
                .await
                .context("Failed to open Redis dialogue storage")?
                .erase();
            info!("Using Redis for the cache and dialogue storage");
            (cache, storage)
        }
        None => {
            let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
            let storage: Arc<ErasedStorage<State>> = InMemStorage::<State>::new().erase();
            info!("REDIS_URL not set, using in-memory cache and dialogue storage");
            (cache, storage)
        }
    };

    let catalog = Arc::new(Catalog::new(Arc::new(PgStore::new(pool)), cache));
    let throttle = Throttle::new(config.throttle_cooldown);
    let bot = Bot::new(config.bot_token.clone());
    let config = Arc::new(config);

    info!("Bot initialized, starting dispatcher");

    Dispatcher::builder(bot, bot::schema())
        .dependencies(dptree::deps![catalog, config, throttle, storage])
        .error_handler(LoggingErrorHandler::with_custom_text(
            "An error has occurred in the dispatcher",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
