//! # Bot Configuration Module
//!
//! Reads the bot settings from the environment (after `.env` has been loaded).

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_IMAGES_DIR: &str = "images";
pub const DEFAULT_THROTTLE_COOLDOWN_MS: u64 = 1000;

/// Runtime configuration of the storefront bot
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub bot_token: String,
    /// Telegram ids allowed to use the admin flows
    pub admin_ids: Vec<u64>,
    pub payment_provider_token: String,
    pub database_url: String,
    /// Enables the Redis cache and dialogue storage when set
    pub redis_url: Option<String>,
    pub images_dir: PathBuf,
    pub throttle_cooldown: Duration,
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        let bot_token = env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN must be set")?;
        let admin_ids =
            parse_admin_ids(&env::var("ADMIN_IDS").context("ADMIN_IDS must be set")?)?;
        let payment_provider_token = env::var("PAYMENT_PROVIDER_TOKEN")
            .context("PAYMENT_PROVIDER_TOKEN must be set")?;
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let redis_url = env::var("REDIS_URL").ok().filter(|url| !url.trim().is_empty());
        let images_dir = env::var("IMAGES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_IMAGES_DIR));
        let cooldown_ms = match env::var("THROTTLE_COOLDOWN_MS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("THROTTLE_COOLDOWN_MS is not a number: {raw}"))?,
            Err(_) => DEFAULT_THROTTLE_COOLDOWN_MS,
        };

        Ok(Self {
            bot_token,
            admin_ids,
            payment_provider_token,
            database_url,
            redis_url,
            images_dir,
            throttle_cooldown: Duration::from_millis(cooldown_ms),
        })
    }

    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

/// Parse a comma separated list of Telegram user ids
pub fn parse_admin_ids(raw: &str) -> Result<Vec<u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u64>()
                .with_context(|| format!("Invalid admin id: {part}"))
        })
        .collect()
}
