//! Product photo storage: download from Telegram, validate, save, delete.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use teloxide::prelude::*;
use teloxide::types::FileId;
use tracing::{debug, info, warn};

use crate::errors::ShopError;

/// Detect the format of an uploaded photo and reject anything but JPEG/PNG
pub fn validate_photo(bytes: &[u8]) -> Result<image::ImageFormat, ShopError> {
    if bytes.len() < 8 {
        return Err(ShopError::InvalidImage(format!(
            "need at least 8 bytes to detect the format, got {}",
            bytes.len()
        )));
    }

    match image::guess_format(bytes) {
        Ok(format @ (image::ImageFormat::Jpeg | image::ImageFormat::Png)) => {
            debug!(format = ?format, "Detected supported photo format");
            Ok(format)
        }
        Ok(format) => Err(ShopError::InvalidImage(format!(
            "unsupported format {format:?}, only JPEG and PNG are accepted"
        ))),
        Err(e) => Err(ShopError::InvalidImage(e.to_string())),
    }
}

/// Path of the stored photo for a Telegram file unique id
pub fn photo_path(images_dir: &Path, file_unique_id: &str) -> PathBuf {
    images_dir.join(format!("{file_unique_id}.jpg"))
}

pub async fn download_file(bot: &Bot, file_id: FileId) -> Result<Vec<u8>> {
    let file = bot.get_file(file_id).await?;
    let url = format!(
        "https://api.telegram.org/file/bot{}/{}",
        bot.token(),
        file.path
    );

    let response = reqwest::get(&url)
        .await
        .context("Failed to download photo")?
        .error_for_status()
        .context("Telegram refused the photo download")?;
    let bytes = response.bytes().await?;

    Ok(bytes.to_vec())
}

/// Write a validated photo into the images directory
pub async fn save_photo(images_dir: &Path, file_unique_id: &str, bytes: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(images_dir)
        .await
        .with_context(|| format!("Failed to create {}", images_dir.display()))?;

    let path = photo_path(images_dir, file_unique_id);
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!(path = %path.display(), size = bytes.len(), "Product photo saved");
    Ok(path)
}

/// Fail with [`ShopError::ImageMissing`] when the photo is gone from disk
pub async fn ensure_photo_exists(path: &Path) -> Result<(), ShopError> {
    match tokio::fs::try_exists(path).await {
        Ok(true) => Ok(()),
        _ => Err(ShopError::ImageMissing(path.to_path_buf())),
    }
}

/// Best-effort removal of a product photo. Failures are logged only.
pub async fn remove_photo(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            info!(path = %path.display(), "Product photo removed");
            true
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove product photo");
            false
        }
    }
}
