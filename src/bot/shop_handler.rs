//! Shop Handler module: main menu, catalog browsing and the cart

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, InputFile, InputMedia, InputMediaPhoto};
use tracing::{debug, info, warn};

use crate::callbacks::ShopAction;
use crate::catalog::Catalog;
use crate::config::BotConfig;
use crate::db::{cart_total, Product, ShopUser};
use crate::dialogue::{load_state, reset_state, save_state, ShopDialogue, ShopStep, State};
use crate::errors::ShopError;
use crate::images::ensure_photo_exists;
use crate::localization::{t_args_lang, t_lang};

use super::ui_builder::{
    back_to_main_keyboard, cart_keyboard, cart_remove_keyboard, format_cart,
    format_product_caption, main_menu_keyboard, menu_categories_keyboard, products_pagination,
};
use super::{answer_callback, checkout_handler, report_errors, show_text};

fn greeting(user: &ShopUser, language_code: Option<&str>) -> String {
    t_args_lang("welcome", &[("name", &user.name)], language_code)
}

/// Handle `/start`: drop any conversation and show the main menu
pub async fn start(bot: Bot, msg: Message, dialogue: ShopDialogue, user: ShopUser) -> Result<()> {
    let language_code = msg.from.as_ref().and_then(|u| u.language_code.as_deref());

    report_errors(&bot, &dialogue, language_code, async {
        reset_state(&dialogue).await?;
        bot.send_message(msg.chat.id, greeting(&user, language_code))
            .reply_markup(main_menu_keyboard(language_code))
            .await?;
        Ok(())
    })
    .await
}

/// Messages nobody else wanted
pub async fn fallback(bot: Bot, msg: Message) -> Result<()> {
    let language_code = msg.from.as_ref().and_then(|u| u.language_code.as_deref());
    debug!(chat_id = %msg.chat.id, "Unhandled message outside of any conversation");

    bot.send_message(msg.chat.id, t_lang("unknown-input", language_code))
        .reply_markup(main_menu_keyboard(language_code))
        .await?;
    Ok(())
}

/// Handle customer buttons
pub async fn on_callback(
    bot: Bot,
    q: CallbackQuery,
    action: ShopAction,
    dialogue: ShopDialogue,
    catalog: Arc<Catalog>,
    config: Arc<BotConfig>,
    user: ShopUser,
) -> Result<()> {
    let language_code = q.from.language_code.as_deref();
    debug!(user_id = %q.from.id, action = %action, "Shop callback");

    let outcome = report_errors(
        &bot,
        &dialogue,
        language_code,
        dispatch(&bot, &q, action, &dialogue, &catalog, &config, &user),
    )
    .await;

    answer_callback(&bot, &q, outcome).await
}

/// Run the action; the returned text, if any, is shown as a callback notice
async fn dispatch(
    bot: &Bot,
    q: &CallbackQuery,
    action: ShopAction,
    dialogue: &ShopDialogue,
    catalog: &Catalog,
    config: &BotConfig,
    user: &ShopUser,
) -> Result<Option<String>> {
    let language_code = q.from.language_code.as_deref();

    if let Some(event) = action.checkout_event() {
        return checkout_handler::apply_callback(bot, q, event, dialogue, catalog, config, user)
            .await;
    }

    match action {
        ShopAction::ToMain => {
            reset_state(dialogue).await?;
            show_text(bot, q, greeting(user, language_code), main_menu_keyboard(language_code))
                .await?;
        }
        ShopAction::Menu => {
            let categories = catalog.categories().await?;
            if categories.is_empty() {
                show_text(
                    bot,
                    q,
                    t_lang("catalog-empty", language_code),
                    back_to_main_keyboard(language_code),
                )
                .await?;
            } else {
                show_text(
                    bot,
                    q,
                    t_lang("choose-category", language_code),
                    menu_categories_keyboard(&categories, language_code),
                )
                .await?;
            }
        }
        ShopAction::OurAddresses => {
            show_text(
                bot,
                q,
                t_lang("our-addresses", language_code),
                back_to_main_keyboard(language_code),
            )
            .await?;
        }
        ShopAction::AboutUs => {
            show_text(
                bot,
                q,
                t_lang("about-us", language_code),
                back_to_main_keyboard(language_code),
            )
            .await?;
        }
        ShopAction::Category(category_id) => {
            open_category(bot, q, category_id, dialogue, catalog).await?;
        }
        ShopAction::Page(page) => return turn_page(bot, q, page, dialogue).await,
        ShopAction::AddToCart(product_id) => {
            let product = catalog
                .product(product_id)
                .await?
                .ok_or_else(|| ShopError::NotFound(format!("product {product_id}")))?;
            let quantity = catalog.add_to_cart(user.id, product_id).await?;
            info!(user_id = user.id, product_id, quantity, "Product added to cart");

            // A checkout in progress was priced without this item
            if let State::Shop(step) = load_state(dialogue).await? {
                if step.is_checkout() {
                    debug!(user_id = user.id, "Checkout abandoned by adding to cart");
                    reset_state(dialogue).await?;
                }
            }

            return Ok(Some(t_args_lang(
                "added-to-cart",
                &[("name", &product.name), ("quantity", &quantity.to_string())],
                language_code,
            )));
        }
        ShopAction::Cart | ShopAction::BackToCart | ShopAction::CancelOrder => {
            let (text, keyboard) = open_cart(dialogue, catalog, user, language_code).await?;
            show_text(bot, q, text, keyboard).await?;
            if action == ShopAction::CancelOrder {
                return Ok(Some(t_lang("order-cancelled", language_code)));
            }
        }
        ShopAction::ChooseRemove => {
            let items = catalog.cart(user.id).await?;
            if items.is_empty() {
                let (text, keyboard) = open_cart(dialogue, catalog, user, language_code).await?;
                show_text(bot, q, text, keyboard).await?;
            } else {
                show_text(
                    bot,
                    q,
                    t_lang("cart-choose-remove", language_code),
                    cart_remove_keyboard(&items, language_code),
                )
                .await?;
            }
        }
        ShopAction::RemoveFromCart(product_id) => {
            let removed = catalog.remove_from_cart(user.id, product_id).await?;
            debug!(user_id = user.id, product_id, removed, "Cart item removal");

            let (text, keyboard) = open_cart(dialogue, catalog, user, language_code).await?;
            show_text(bot, q, text, keyboard).await?;
            return Ok(Some(t_lang("cart-item-removed", language_code)));
        }
        ShopAction::GoToPay
        | ShopAction::Delivery(_)
        | ShopAction::Payment(_)
        | ShopAction::AddressManual
        | ShopAction::AddressLocation
        | ShopAction::ConfirmOrder => {
            warn!(action = %action, "Checkout button fell through to the shop handler");
        }
    }

    Ok(None)
}

/// Cart summary plus keyboard. A non-empty cart moves the conversation to
/// the cart review; an empty one ends it.
pub(crate) async fn open_cart(
    dialogue: &ShopDialogue,
    catalog: &Catalog,
    user: &ShopUser,
    language_code: Option<&str>,
) -> Result<(String, InlineKeyboardMarkup)> {
    let items = catalog.cart(user.id).await?;

    if items.is_empty() {
        reset_state(dialogue).await?;
        return Ok((
            t_lang("cart-empty", language_code),
            back_to_main_keyboard(language_code),
        ));
    }

    let total = cart_total(&items)?;
    let text = format_cart(&items, language_code)?;
    save_state(dialogue, State::Shop(ShopStep::CartReview { total })).await?;

    Ok((text, cart_keyboard(language_code)))
}

async fn open_category(
    bot: &Bot,
    q: &CallbackQuery,
    category_id: i64,
    dialogue: &ShopDialogue,
    catalog: &Catalog,
) -> Result<()> {
    let language_code = q.from.language_code.as_deref();
    let products = catalog.products(category_id).await?;

    let Some(first) = products.first() else {
        reset_state(dialogue).await?;
        show_text(
            bot,
            q,
            t_lang("category-empty", language_code),
            back_to_main_keyboard(language_code),
        )
        .await?;
        return Ok(());
    };

    ensure_photo_exists(Path::new(&first.photo_path)).await?;

    let chat_id = dialogue.chat_id();
    bot.send_photo(chat_id, InputFile::file(&first.photo_path))
        .caption(format_product_caption(first, language_code))
        .reply_markup(products_pagination(&products, 0, language_code))
        .await?;

    if let Some(message) = q.regular_message() {
        if let Err(e) = bot.delete_message(message.chat.id, message.id).await {
            debug!(chat_id = %message.chat.id, error = %e, "Could not delete category picker");
        }
    }

    save_state(
        dialogue,
        State::Shop(ShopStep::Browsing {
            category_id,
            products,
            page: 0,
        }),
    )
    .await
}

async fn turn_page(
    bot: &Bot,
    q: &CallbackQuery,
    page: usize,
    dialogue: &ShopDialogue,
) -> Result<Option<String>> {
    let language_code = q.from.language_code.as_deref();

    let State::Shop(ShopStep::Browsing {
        category_id,
        products,
        ..
    }) = load_state(dialogue).await?
    else {
        return Ok(Some(t_lang("session-expired", language_code)));
    };

    let Some(product) = products.get(page) else {
        return Ok(None);
    };
    let Some(message) = q.regular_message() else {
        return Ok(None);
    };

    ensure_photo_exists(Path::new(&product.photo_path)).await?;
    bot.edit_message_media(message.chat.id, message.id, product_media(product, language_code))
        .reply_markup(products_pagination(&products, page, language_code))
        .await?;

    save_state(
        dialogue,
        State::Shop(ShopStep::Browsing {
            category_id,
            products,
            page,
        }),
    )
    .await?;
    Ok(None)
}

fn product_media(product: &Product, language_code: Option<&str>) -> InputMedia {
    InputMedia::Photo(
        InputMediaPhoto::new(InputFile::file(&product.photo_path))
            .caption(format_product_caption(product, language_code)),
    )
}
