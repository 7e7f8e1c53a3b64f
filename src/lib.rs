//! # Pizzeria Telegram Bot
//!
//! A Telegram storefront for a pizzeria: customers browse the catalog, fill
//! a cart and check out with delivery and payment options; administrators
//! manage categories and products from the chat.

pub mod bot;
pub mod cache;
pub mod callbacks;
pub mod catalog;
pub mod config;
pub mod db;
pub mod dialogue;
pub mod errors;
pub mod images;
pub mod localization;
pub mod store;
pub mod throttle;
