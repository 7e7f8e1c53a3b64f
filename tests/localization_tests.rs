//! # Localization Tests
//!
//! This module contains unit tests for the localization functionality,
//! testing message retrieval and formatting with various edge cases.

use pizzeria_bot::localization::LocalizationManager;
use std::collections::BTreeSet;

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_localization() -> LocalizationManager {
        // Create a new localization manager for each test
        LocalizationManager::new().expect("Failed to create localization manager")
    }

    fn message_ids(source: &str) -> BTreeSet<String> {
        source
            .lines()
            .filter(|line| !line.starts_with([' ', '#', '\t']))
            .filter_map(|line| line.split_once(" ="))
            .map(|(id, _)| id.trim().to_string())
            .collect()
    }

    #[test]
    fn test_get_message_existing_key() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("button-menu", "en", None);
        assert!(!message.is_empty());
        assert!(message.contains("Menu"));
    }

    #[test]
    fn test_get_message_nonexistent_key() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("nonexistent-key", "en", None);
        assert!(message.starts_with("Missing translation:"));
    }

    #[test]
    fn test_get_message_unsupported_language() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("button-menu", "unsupported", None);
        // Should fall back to English
        assert_eq!(message, manager.get_message_in_language("button-menu", "en", None));
    }

    #[test]
    fn test_get_message_with_args() {
        let manager = setup_localization();

        let args = [("name", "Margherita"), ("quantity", "2")];
        let message = manager.get_message_in_language("added-to-cart", "en", Some(&args));
        assert!(message.contains("Margherita"));
        assert!(message.contains('2'));
        // Bidi isolation marks would show up in Telegram
        assert!(!message.contains('\u{2068}'));
    }

    #[test]
    fn test_get_message_missing_args() {
        let manager = setup_localization();

        // Missing arguments are reported but still produce text
        let message = manager.get_message_in_language("welcome", "en", None);
        assert!(!message.is_empty());
    }

    #[test]
    fn test_russian_localization() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("button-menu", "ru", None);
        assert!(!message.is_empty());
        let english_message = manager.get_message_in_language("button-menu", "en", None);
        assert_ne!(message, english_message);
    }

    #[test]
    fn test_languages_share_keys() {
        let english = message_ids(include_str!("../locales/en/main.ftl"));
        let russian = message_ids(include_str!("../locales/ru/main.ftl"));

        assert!(!english.is_empty());
        assert_eq!(english, russian);
    }

    #[test]
    fn test_language_resolution() {
        let manager = setup_localization();

        assert_eq!(manager.supported_languages(), vec!["en", "ru"]);
        assert_eq!(manager.resolve_language(Some("ru")), "ru");
        assert_eq!(manager.resolve_language(Some("ru-RU")), "ru");
        assert_eq!(manager.resolve_language(Some("en-US")), "en");
        assert_eq!(manager.resolve_language(None), "en"); // Default to English
        assert_eq!(manager.resolve_language(Some("de")), "en"); // Fallback to English
    }

    #[test]
    fn test_convenience_functions() {
        // Initialize the global localization manager for this test
        pizzeria_bot::localization::init_localization()
            .expect("Failed to initialize localization");

        let message = pizzeria_bot::localization::t_lang("cart-empty", Some("en"));
        assert!(!message.is_empty());

        let args = vec![("total", "700")];
        let message_with_args =
            pizzeria_bot::localization::t_args_lang("cart-total", &args, Some("en-GB"));
        assert!(message_with_args.contains("700"));
    }
}
