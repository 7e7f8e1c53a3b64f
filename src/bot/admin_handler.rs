//! Admin Handler module: category and product management
//!
//! Every entry point here sits behind the administrator filter in
//! [`super::schema`]. Multi-step inputs are kept in [`AdminStep`]; invalid
//! input re-prompts without leaving the current step.

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{InputFile, PhotoSize};
use tracing::{debug, info, warn};

use crate::callbacks::AdminAction;
use crate::catalog::Catalog;
use crate::config::BotConfig;
use crate::db::{NewProduct, ShopUser};
use crate::dialogue::{
    load_state, reset_state, save_state, validate_category_name, validate_description,
    validate_price, validate_product_name, AdminStep, InputError, ShopDialogue, State,
};
use crate::images;
use crate::localization::{t_args_lang, t_lang};

use super::ui_builder::{
    admin_back_keyboard, admin_category_section_keyboard, admin_home_keyboard,
    admin_product_section_keyboard, categories_keyboard, format_category_list,
    format_product_list, products_keyboard,
};
use super::{answer_callback, report_errors, show_text};

fn admin_greeting(user: &ShopUser, language_code: Option<&str>) -> String {
    t_args_lang("admin-welcome", &[("name", &user.name)], language_code)
}

fn input_error_text(error: InputError, language_code: Option<&str>) -> String {
    match error {
        InputError::Empty => t_lang("input-empty", language_code),
        InputError::TooLong { max_chars } => t_args_lang(
            "input-too-long",
            &[("max", &max_chars.to_string())],
            language_code,
        ),
        InputError::NotAPositiveNumber => t_lang("input-not-positive-number", language_code),
        InputError::TooLarge { max } => t_args_lang(
            "input-too-large",
            &[("max", &max.to_string())],
            language_code,
        ),
    }
}

/// Handle `/admin`
pub async fn admin_home(
    bot: Bot,
    msg: Message,
    dialogue: ShopDialogue,
    user: ShopUser,
) -> Result<()> {
    let language_code = msg.from.as_ref().and_then(|u| u.language_code.as_deref());
    info!(user_id = user.id, "Admin panel opened");

    report_errors(&bot, &dialogue, language_code, async {
        reset_state(&dialogue).await?;
        bot.send_message(msg.chat.id, admin_greeting(&user, language_code))
            .reply_markup(admin_home_keyboard(language_code))
            .await?;
        Ok(())
    })
    .await
}

/// Handle administrator buttons
pub async fn on_callback(
    bot: Bot,
    q: CallbackQuery,
    action: AdminAction,
    dialogue: ShopDialogue,
    catalog: Arc<Catalog>,
    user: ShopUser,
) -> Result<()> {
    let language_code = q.from.language_code.as_deref();
    debug!(user_id = %q.from.id, action = %action, "Admin callback");

    let outcome = report_errors(
        &bot,
        &dialogue,
        language_code,
        dispatch(&bot, &q, action, &dialogue, &catalog, &user),
    )
    .await;

    answer_callback(&bot, &q, outcome).await
}

/// Whether the conversation is at the step a picker button belongs to
async fn at_step(dialogue: &ShopDialogue, expected: impl Fn(&AdminStep) -> bool) -> Result<bool> {
    Ok(matches!(load_state(dialogue).await?, State::Admin(step) if expected(&step)))
}

async fn dispatch(
    bot: &Bot,
    q: &CallbackQuery,
    action: AdminAction,
    dialogue: &ShopDialogue,
    catalog: &Catalog,
    user: &ShopUser,
) -> Result<Option<String>> {
    let language_code = q.from.language_code.as_deref();
    let expired = || -> Result<Option<String>> {
        Ok(Some(t_lang("session-expired", language_code)))
    };

    match action {
        AdminAction::Home => {
            reset_state(dialogue).await?;
            show_text(
                bot,
                q,
                admin_greeting(user, language_code),
                admin_home_keyboard(language_code),
            )
            .await?;
        }
        AdminAction::CategorySection => {
            show_text(
                bot,
                q,
                t_lang("admin-choose-action", language_code),
                admin_category_section_keyboard(language_code),
            )
            .await?;
        }
        AdminAction::ProductSection => {
            show_text(
                bot,
                q,
                t_lang("admin-choose-action", language_code),
                admin_product_section_keyboard(language_code),
            )
            .await?;
        }
        AdminAction::ListCategories => {
            let categories = catalog.categories().await?;
            if categories.is_empty() {
                return Ok(Some(t_lang("admin-no-categories", language_code)));
            }
            show_text(
                bot,
                q,
                format_category_list(&categories, language_code),
                admin_back_keyboard(language_code),
            )
            .await?;
        }
        AdminAction::NewCategory => {
            save_state(dialogue, State::Admin(AdminStep::AddCategoryName)).await?;
            show_text(
                bot,
                q,
                t_lang("admin-enter-category-name", language_code),
                admin_back_keyboard(language_code),
            )
            .await?;
        }
        AdminAction::ChangeCategory
        | AdminAction::DeleteCategory
        | AdminAction::ListProducts
        | AdminAction::NewProduct
        | AdminAction::DeleteProduct => {
            let categories = catalog.categories().await?;
            if categories.is_empty() {
                return Ok(Some(t_lang("admin-no-categories", language_code)));
            }

            let (step, prompt, keyboard) = match action {
                AdminAction::ChangeCategory => (
                    Some(AdminStep::ChangeCategoryPick),
                    "admin-pick-category-change",
                    categories_keyboard(&categories, AdminAction::ChangeCategoryPick),
                ),
                AdminAction::DeleteCategory => (
                    Some(AdminStep::DeleteCategoryPick),
                    "admin-pick-category-delete",
                    categories_keyboard(&categories, AdminAction::DeleteCategoryPick),
                ),
                AdminAction::NewProduct => (
                    Some(AdminStep::AddProductCategory),
                    "admin-pick-category-new-product",
                    categories_keyboard(&categories, AdminAction::NewProductCategory),
                ),
                AdminAction::DeleteProduct => (
                    Some(AdminStep::DeleteProductCategory),
                    "admin-pick-category-of-product",
                    categories_keyboard(&categories, AdminAction::DeleteProductCategory),
                ),
                _ => (
                    None,
                    "admin-pick-category-list",
                    categories_keyboard(&categories, AdminAction::ListProductsOf),
                ),
            };

            match step {
                Some(step) => save_state(dialogue, State::Admin(step)).await?,
                None => reset_state(dialogue).await?,
            }
            show_text(bot, q, t_lang(prompt, language_code), keyboard).await?;
        }
        AdminAction::ChangeCategoryPick(category_id) => {
            if !at_step(dialogue, |s| *s == AdminStep::ChangeCategoryPick).await? {
                return expired();
            }
            save_state(dialogue, State::Admin(AdminStep::ChangeCategoryName { category_id }))
                .await?;
            show_text(
                bot,
                q,
                t_lang("admin-enter-new-category-name", language_code),
                admin_back_keyboard(language_code),
            )
            .await?;
        }
        AdminAction::DeleteCategoryPick(category_id) => {
            if !at_step(dialogue, |s| *s == AdminStep::DeleteCategoryPick).await? {
                return expired();
            }
            let category = catalog.delete_category(category_id).await?;
            reset_state(dialogue).await?;
            info!(user_id = user.id, category_id, name = %category.name, "Category deleted by admin");

            show_text(
                bot,
                q,
                t_args_lang("admin-category-deleted", &[("name", &category.name)], language_code),
                admin_back_keyboard(language_code),
            )
            .await?;
        }
        AdminAction::ListProductsOf(category_id) => {
            let products = catalog.products(category_id).await?;
            if products.is_empty() {
                return Ok(Some(t_lang("admin-no-products", language_code)));
            }
            show_text(
                bot,
                q,
                format_product_list(&products, language_code),
                admin_back_keyboard(language_code),
            )
            .await?;
        }
        AdminAction::NewProductCategory(category_id) => {
            if !at_step(dialogue, |s| *s == AdminStep::AddProductCategory).await? {
                return expired();
            }
            save_state(dialogue, State::Admin(AdminStep::AddProductName { category_id })).await?;
            show_text(
                bot,
                q,
                t_lang("admin-enter-product-name", language_code),
                admin_back_keyboard(language_code),
            )
            .await?;
        }
        AdminAction::DeleteProductCategory(category_id) => {
            if !at_step(dialogue, |s| *s == AdminStep::DeleteProductCategory).await? {
                return expired();
            }
            let products = catalog.products(category_id).await?;
            if products.is_empty() {
                return Ok(Some(t_lang("admin-no-products", language_code)));
            }
            save_state(dialogue, State::Admin(AdminStep::DeleteProductPick { category_id })).await?;
            show_text(
                bot,
                q,
                t_lang("admin-pick-product-delete", language_code),
                products_keyboard(&products, AdminAction::DeleteProductPick),
            )
            .await?;
        }
        AdminAction::DeleteProductPick(product_id) => {
            if !at_step(dialogue, |s| matches!(s, AdminStep::DeleteProductPick { .. })).await? {
                return expired();
            }
            let product = catalog.delete_product(product_id).await?;
            reset_state(dialogue).await?;
            info!(user_id = user.id, product_id, name = %product.name, "Product deleted by admin");

            show_text(
                bot,
                q,
                t_args_lang("admin-product-deleted", &[("name", &product.name)], language_code),
                admin_back_keyboard(language_code),
            )
            .await?;
        }
    }

    Ok(None)
}

/// Text and photo input for the admin steps
pub async fn on_message(
    bot: Bot,
    msg: Message,
    step: AdminStep,
    dialogue: ShopDialogue,
    catalog: Arc<Catalog>,
    config: Arc<BotConfig>,
) -> Result<()> {
    let language_code = msg.from.as_ref().and_then(|u| u.language_code.as_deref());

    report_errors(&bot, &dialogue, language_code, async {
        handle_message(&bot, &msg, step, &dialogue, &catalog, &config, language_code).await
    })
    .await
}

async fn handle_message(
    bot: &Bot,
    msg: &Message,
    step: AdminStep,
    dialogue: &ShopDialogue,
    catalog: &Catalog,
    config: &BotConfig,
    language_code: Option<&str>,
) -> Result<()> {
    let chat_id = msg.chat.id;
    let text = msg.text().unwrap_or_default();

    // Re-prompt on invalid input, staying at the current step
    macro_rules! valid_or_reprompt {
        ($validated:expr) => {
            match $validated {
                Ok(value) => value,
                Err(e) => {
                    debug!(chat_id = %chat_id, error = ?e, "Rejected admin input");
                    bot.send_message(chat_id, input_error_text(e, language_code))
                        .await?;
                    return Ok(());
                }
            }
        };
    }

    match step {
        AdminStep::AddCategoryName => {
            let name = valid_or_reprompt!(validate_category_name(text));
            if catalog.category_by_name(&name).await?.is_some() {
                bot.send_message(chat_id, t_lang("admin-category-exists", language_code))
                    .await?;
                return Ok(());
            }

            let category = catalog.create_category(&name).await?;
            reset_state(dialogue).await?;
            info!(category_id = category.id, name = %category.name, "Category created");

            bot.send_message(
                chat_id,
                t_args_lang("admin-category-added", &[("name", &category.name)], language_code),
            )
            .reply_markup(admin_back_keyboard(language_code))
            .await?;
        }
        AdminStep::ChangeCategoryName { category_id } => {
            let name = valid_or_reprompt!(validate_category_name(text));
            if let Some(existing) = catalog.category_by_name(&name).await? {
                if existing.id != category_id {
                    bot.send_message(chat_id, t_lang("admin-category-exists", language_code))
                        .await?;
                    return Ok(());
                }
            }

            let category = catalog.rename_category(category_id, &name).await?;
            reset_state(dialogue).await?;

            bot.send_message(
                chat_id,
                t_args_lang("admin-category-renamed", &[("name", &category.name)], language_code),
            )
            .reply_markup(admin_back_keyboard(language_code))
            .await?;
        }
        AdminStep::AddProductName { category_id } => {
            let name = valid_or_reprompt!(validate_product_name(text));
            save_state(
                dialogue,
                State::Admin(AdminStep::AddProductDescription { category_id, name }),
            )
            .await?;
            bot.send_message(chat_id, t_lang("admin-enter-product-description", language_code))
                .await?;
        }
        AdminStep::AddProductDescription { category_id, name } => {
            let description = valid_or_reprompt!(validate_description(text));
            save_state(
                dialogue,
                State::Admin(AdminStep::AddProductPrice {
                    category_id,
                    name,
                    description,
                }),
            )
            .await?;
            bot.send_message(chat_id, t_lang("admin-enter-product-price", language_code))
                .await?;
        }
        AdminStep::AddProductPrice {
            category_id,
            name,
            description,
        } => {
            let price = valid_or_reprompt!(validate_price(text));
            save_state(
                dialogue,
                State::Admin(AdminStep::AddProductPhoto {
                    category_id,
                    name,
                    description,
                    price,
                }),
            )
            .await?;
            bot.send_message(chat_id, t_lang("admin-send-product-photo", language_code))
                .await?;
        }
        AdminStep::AddProductPhoto {
            category_id,
            name,
            description,
            price,
        } => {
            // Telegram lists sizes ascending; the last one is the largest
            let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) else {
                bot.send_message(chat_id, t_lang("admin-send-product-photo", language_code))
                    .await?;
                return Ok(());
            };

            let product = NewProduct {
                name,
                description,
                price,
                category_id,
                photo_path: String::new(),
            };
            add_product(bot, chat_id, photo, product, dialogue, catalog, config, language_code)
                .await?;
        }
        AdminStep::ChangeCategoryPick
        | AdminStep::DeleteCategoryPick
        | AdminStep::AddProductCategory
        | AdminStep::DeleteProductCategory
        | AdminStep::DeleteProductPick { .. } => {
            bot.send_message(chat_id, t_lang("use-buttons", language_code))
                .await?;
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn add_product(
    bot: &Bot,
    chat_id: ChatId,
    photo: &PhotoSize,
    mut product: NewProduct,
    dialogue: &ShopDialogue,
    catalog: &Catalog,
    config: &BotConfig,
    language_code: Option<&str>,
) -> Result<()> {
    bot.send_message(chat_id, t_lang("admin-creating-product", language_code))
        .await?;

    let bytes = images::download_file(bot, photo.file.id.clone()).await?;
    if let Err(e) = images::validate_photo(&bytes) {
        warn!(chat_id = %chat_id, error = %e, "Uploaded product photo rejected");
        bot.send_message(chat_id, t_lang(e.message_key(), language_code))
            .await?;
        return Ok(());
    }

    let path = images::save_photo(&config.images_dir, &photo.file.unique_id.0, &bytes).await?;
    product.photo_path = path.to_string_lossy().into_owned();

    let created = match catalog.create_product(&product).await {
        Ok(created) => created,
        Err(e) => {
            images::remove_photo(&path).await;
            return Err(e);
        }
    };
    reset_state(dialogue).await?;
    info!(
        product_id = created.id,
        category_id = created.category_id,
        name = %created.name,
        price = created.price,
        "Product created"
    );

    bot.send_photo(chat_id, InputFile::file(&path))
        .caption(t_args_lang(
            "admin-product-added",
            &[
                ("name", &created.name),
                ("description", &created.description),
                ("price", &created.price.to_string()),
            ],
            language_code,
        ))
        .reply_markup(admin_back_keyboard(language_code))
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ShopError;

    #[test]
    fn test_input_error_text_mentions_limit() {
        let text = input_error_text(InputError::TooLong { max_chars: 15 }, None);
        assert!(text.contains("15"));
        assert!(!text.starts_with("Missing translation"));

        let text = input_error_text(InputError::TooLarge { max: 1_000_000 }, None);
        assert!(text.contains("1000000"));
        assert!(!text.starts_with("Missing translation"));
    }

    #[test]
    fn test_invalid_photo_maps_to_its_own_message() {
        let err = images::validate_photo(b"GIF89a\x01\x00\x01\x00").unwrap_err();
        assert_eq!(err.message_key(), "admin-invalid-photo");
        assert!(matches!(err, ShopError::InvalidImage(_)));
    }
}
