//! # Shop Error Types Module
//!
//! Domain errors the handlers need to tell apart. Everything else travels as
//! a plain `anyhow::Error` and ends up as the generic "an error occurred" text.

use std::path::PathBuf;

/// Errors raised by the catalog, cart and conversation layers
#[derive(Debug, Clone, PartialEq)]
pub enum ShopError {
    /// A catalog entity (category, product, user) is missing
    NotFound(String),
    /// The image file of a product is gone from disk
    ImageMissing(PathBuf),
    /// An uploaded photo is not a JPEG or PNG
    InvalidImage(String),
    /// The user's cart has no items
    EmptyCart,
    /// A cart or invoice sum does not fit the integer it is computed in
    AmountOverflow,
}

impl ShopError {
    /// Localization key of the message shown to the user for this error
    pub fn message_key(&self) -> &'static str {
        match self {
            ShopError::ImageMissing(_) => "error-image-missing",
            ShopError::EmptyCart => "cart-empty",
            ShopError::InvalidImage(_) => "admin-invalid-photo",
            ShopError::NotFound(_) | ShopError::AmountOverflow => "error-generic",
        }
    }
}

impl std::fmt::Display for ShopError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShopError::NotFound(what) => write!(f, "Not found: {what}"),
            ShopError::ImageMissing(path) => write!(f, "Image missing: {}", path.display()),
            ShopError::InvalidImage(msg) => write!(f, "Invalid image: {msg}"),
            ShopError::EmptyCart => write!(f, "Cart is empty"),
            ShopError::AmountOverflow => write!(f, "Amount overflows"),
        }
    }
}

impl std::error::Error for ShopError {}
