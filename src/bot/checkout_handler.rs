//! Checkout Handler module: delivery, payment and address steps, invoices,
//! pre-checkout answers and payment acknowledgments

use anyhow::{Context, Result};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardMarkup, KeyboardMarkup, KeyboardRemove, LabeledPrice, PreCheckoutQuery,
};
use tracing::{debug, error, info, warn};

use crate::catalog::Catalog;
use crate::config::BotConfig;
use crate::db::{cart_total, ShopUser};
use crate::dialogue::{
    load_state, reset_state, save_state, CheckoutEvent, InvalidTransition, OrderDraft,
    ShopDialogue, ShopStep, State, Transition,
};
use crate::localization::{t_args_lang, t_lang};

use super::shop_handler::open_cart;
use super::ui_builder::{
    address_options_keyboard, checkout_cancel_keyboard, confirm_order_keyboard,
    delivery_method_keyboard, format_order_confirmation, location_request_keyboard,
    main_menu_keyboard, payment_method_keyboard,
};
use super::{report_errors, show_text};

pub const INVOICE_CURRENCY: &str = "RUB";

/// Invoice payload identifying the paying Telegram user
pub fn invoice_payload(telegram_id: u64) -> String {
    format!("order_{telegram_id}")
}

/// Only invoices this bot issued to the same user are accepted
pub fn is_valid_payload(payload: &str, telegram_id: u64) -> bool {
    payload == invoice_payload(telegram_id)
}

/// The paid amount covers everything currently in the cart
pub fn payment_covers_cart(paid_minor_units: u32, cart_total: i64) -> bool {
    cart_total
        .checked_mul(100)
        .is_some_and(|due| i64::from(paid_minor_units) >= due)
}

/// What the user sees when a checkout step is entered
enum Prompt {
    Inline(String, InlineKeyboardMarkup),
    Reply(String, KeyboardMarkup),
    Invoice(OrderDraft),
}

fn prompt_for(step: &ShopStep, language_code: Option<&str>) -> Prompt {
    match step {
        ShopStep::DeliveryMethod { .. } => Prompt::Inline(
            t_lang("choose-delivery", language_code),
            delivery_method_keyboard(language_code),
        ),
        ShopStep::PaymentMethod { delivery, .. } => Prompt::Inline(
            t_lang("choose-payment", language_code),
            payment_method_keyboard(*delivery, language_code),
        ),
        ShopStep::AddressOption { .. } => Prompt::Inline(
            t_lang("choose-address-option", language_code),
            address_options_keyboard(language_code),
        ),
        ShopStep::EnterAddress { .. } => Prompt::Inline(
            t_lang("enter-address", language_code),
            checkout_cancel_keyboard(language_code),
        ),
        ShopStep::ShareLocation { .. } => Prompt::Reply(
            t_lang("share-location", language_code),
            location_request_keyboard(language_code),
        ),
        ShopStep::Confirmation { order } => Prompt::Inline(
            format_order_confirmation(order, language_code),
            confirm_order_keyboard(language_code),
        ),
        ShopStep::AwaitingPayment { order } => Prompt::Invoice(order.clone()),
        ShopStep::Browsing { .. } | ShopStep::CartReview { .. } => Prompt::Inline(
            t_lang("use-buttons", language_code),
            checkout_cancel_keyboard(language_code),
        ),
    }
}

async fn send_invoice(
    bot: &Bot,
    chat_id: ChatId,
    order: &OrderDraft,
    config: &BotConfig,
    user: &ShopUser,
    language_code: Option<&str>,
) -> Result<()> {
    let amount = u32::try_from(order.amount_minor_units()?)
        .with_context(|| format!("Order total {} does not fit an invoice", order.total))?;
    let payload = invoice_payload(user.telegram_id as u64);

    bot.send_invoice(
        chat_id,
        t_lang("invoice-title", language_code),
        t_lang("invoice-description", language_code),
        payload.clone(),
        INVOICE_CURRENCY.to_string(),
        vec![LabeledPrice::new(t_lang("invoice-label", language_code), amount)],
    )
    .provider_token(config.payment_provider_token.clone())
    .start_parameter("pay_order")
    .await?;

    info!(user_id = user.id, total = order.total, payload = %payload, "Invoice sent");
    Ok(())
}

/// Send the prompt of `step` as new messages
async fn send_prompt(
    bot: &Bot,
    chat_id: ChatId,
    step: &ShopStep,
    config: &BotConfig,
    user: &ShopUser,
    language_code: Option<&str>,
) -> Result<()> {
    match prompt_for(step, language_code) {
        Prompt::Inline(text, keyboard) => {
            bot.send_message(chat_id, text).reply_markup(keyboard).await?;
        }
        Prompt::Reply(text, keyboard) => {
            bot.send_message(chat_id, text).reply_markup(keyboard).await?;
        }
        Prompt::Invoice(order) => {
            send_invoice(bot, chat_id, &order, config, user, language_code).await?;
        }
    }
    Ok(())
}

/// Cash order confirmed: end the conversation and empty the cart
async fn place_cash_order(
    bot: &Bot,
    chat_id: ChatId,
    order: &OrderDraft,
    dialogue: &ShopDialogue,
    catalog: &Catalog,
    user: &ShopUser,
    language_code: Option<&str>,
) -> Result<()> {
    reset_state(dialogue).await?;
    catalog.clear_cart(user.id).await?;
    info!(user_id = user.id, total = order.total, delivery = ?order.delivery, "Cash order placed");

    bot.send_message(
        chat_id,
        t_args_lang(
            "order-placed-cash",
            &[("total", &order.total.to_string())],
            language_code,
        ),
    )
    .reply_markup(main_menu_keyboard(language_code))
    .await?;
    Ok(())
}

/// Apply a checkout button press to the current step
pub async fn apply_callback(
    bot: &Bot,
    q: &CallbackQuery,
    event: CheckoutEvent,
    dialogue: &ShopDialogue,
    catalog: &Catalog,
    config: &BotConfig,
    user: &ShopUser,
) -> Result<Option<String>> {
    let language_code = q.from.language_code.as_deref();
    let chat_id = dialogue.chat_id();

    let State::Shop(step) = load_state(dialogue).await? else {
        return Ok(Some(t_lang("session-expired", language_code)));
    };

    let current_total = cart_total(&catalog.cart(user.id).await?)?;
    if step.is_stale(current_total) {
        info!(
            user_id = user.id,
            step_total = ?step.cart_total(),
            current_total,
            "Cart changed during checkout, back to the cart"
        );
        let (text, keyboard) = open_cart(dialogue, catalog, user, language_code).await?;
        show_text(bot, q, text, keyboard).await?;
        return Ok(Some(t_lang("cart-changed", language_code)));
    }

    match step.advance(event.clone()) {
        Err(InvalidTransition) => {
            debug!(user_id = user.id, event = ?event, "Checkout event not valid for current step");
            Ok(Some(t_lang("action-unavailable", language_code)))
        }
        Ok(Transition::Next(next)) => {
            save_state(dialogue, State::Shop(next.clone())).await?;
            match prompt_for(&next, language_code) {
                Prompt::Inline(text, keyboard) => show_text(bot, q, text, keyboard).await?,
                Prompt::Reply(text, keyboard) => {
                    bot.send_message(chat_id, text).reply_markup(keyboard).await?;
                }
                Prompt::Invoice(order) => {
                    send_invoice(bot, chat_id, &order, config, user, language_code).await?;
                    return Ok(Some(t_lang("going-to-payment", language_code)));
                }
            }
            Ok(None)
        }
        Ok(Transition::OrderPlaced(order)) => {
            place_cash_order(bot, chat_id, &order, dialogue, catalog, user, language_code).await?;
            Ok(None)
        }
    }
}

/// Text and location messages sent during checkout
pub async fn on_message(
    bot: Bot,
    msg: Message,
    step: ShopStep,
    dialogue: ShopDialogue,
    catalog: Arc<Catalog>,
    config: Arc<BotConfig>,
    user: ShopUser,
) -> Result<()> {
    let language_code = msg.from.as_ref().and_then(|u| u.language_code.as_deref());

    report_errors(&bot, &dialogue, language_code, async {
        handle_message(&bot, &msg, step, &dialogue, &catalog, &config, &user, language_code).await
    })
    .await
}

#[allow(clippy::too_many_arguments)]
async fn handle_message(
    bot: &Bot,
    msg: &Message,
    step: ShopStep,
    dialogue: &ShopDialogue,
    catalog: &Catalog,
    config: &BotConfig,
    user: &ShopUser,
    language_code: Option<&str>,
) -> Result<()> {
    let chat_id = msg.chat.id;

    // The reply keyboard of the location step has a plain-text cancel button
    if matches!(step, ShopStep::ShareLocation { .. })
        && msg.text() == Some(t_lang("button-cancel", language_code).as_str())
    {
        bot.send_message(chat_id, t_lang("order-cancelled", language_code))
            .reply_markup(KeyboardRemove::new())
            .await?;
        let (text, keyboard) = open_cart(dialogue, catalog, user, language_code).await?;
        bot.send_message(chat_id, text).reply_markup(keyboard).await?;
        return Ok(());
    }

    let event = if let Some(location) = msg.location() {
        CheckoutEvent::Location {
            latitude: location.latitude,
            longitude: location.longitude,
        }
    } else if let Some(text) = msg.text() {
        CheckoutEvent::AddressText(text.to_string())
    } else {
        send_prompt(bot, chat_id, &step, config, user, language_code).await?;
        return Ok(());
    };

    let was_sharing_location = matches!(step, ShopStep::ShareLocation { .. });

    match step.clone().advance(event) {
        Err(InvalidTransition) => {
            debug!(user_id = user.id, step = ?step, "Message not expected at this checkout step");
            if matches!(step, ShopStep::EnterAddress { .. } | ShopStep::ShareLocation { .. }) {
                bot.send_message(chat_id, t_lang("address-invalid", language_code))
                    .await?;
            }
            send_prompt(bot, chat_id, &step, config, user, language_code).await
        }
        Ok(Transition::Next(next)) => {
            save_state(dialogue, State::Shop(next.clone())).await?;
            if was_sharing_location {
                bot.send_message(chat_id, t_lang("location-received", language_code))
                    .reply_markup(KeyboardRemove::new())
                    .await?;
            }
            send_prompt(bot, chat_id, &next, config, user, language_code).await
        }
        Ok(Transition::OrderPlaced(order)) => {
            warn!(user_id = user.id, "Order placed from a message, expected a button");
            place_cash_order(bot, chat_id, &order, dialogue, catalog, user, language_code).await
        }
    }
}

/// Approve invoices issued by this bot, reject anything else
pub async fn pre_checkout(bot: Bot, query: PreCheckoutQuery) -> Result<()> {
    let language_code = query.from.language_code.as_deref();

    if is_valid_payload(&query.invoice_payload, query.from.id.0) {
        bot.answer_pre_checkout_query(query.id.clone(), true).await?;
        info!(
            user_id = %query.from.id,
            payload = %query.invoice_payload,
            amount = query.total_amount,
            "Pre-checkout query approved"
        );
    } else {
        bot.answer_pre_checkout_query(query.id.clone(), false)
            .error_message(t_lang("payment-rejected", language_code))
            .await?;
        warn!(
            user_id = %query.from.id,
            payload = %query.invoice_payload,
            "Pre-checkout query rejected: unknown payload"
        );
    }
    Ok(())
}

/// Payment went through: acknowledge, empty the cart if the payment covers
/// it, end the conversation
pub async fn successful_payment(
    bot: Bot,
    msg: Message,
    dialogue: ShopDialogue,
    catalog: Arc<Catalog>,
    user: ShopUser,
) -> Result<()> {
    let language_code = msg.from.as_ref().and_then(|u| u.language_code.as_deref());

    let Some(payment) = msg.successful_payment() else {
        return reset_state(&dialogue).await;
    };
    info!(
        user_id = user.id,
        amount = payment.total_amount,
        currency = %payment.currency,
        charge_id = ?payment.telegram_payment_charge_id,
        "Payment received"
    );

    bot.send_message(msg.chat.id, t_lang("payment-success", language_code))
        .reply_markup(main_menu_keyboard(language_code))
        .await?;

    // The cart may have grown after the invoice was issued
    let covered = match catalog.cart(user.id).await {
        Ok(items) => cart_total(&items)
            .is_ok_and(|total| payment_covers_cart(payment.total_amount, total)),
        Err(e) => {
            error!(user_id = user.id, error = %e, "Failed to read cart after payment");
            false
        }
    };

    if covered {
        if let Err(e) = catalog.clear_cart(user.id).await {
            error!(user_id = user.id, error = %e, "Failed to empty cart after payment");
        }
    } else {
        warn!(
            user_id = user.id,
            paid = payment.total_amount,
            "Payment does not cover the current cart, keeping it"
        );
        bot.send_message(msg.chat.id, t_lang("payment-cart-kept", language_code))
            .await?;
    }
    reset_state(&dialogue).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::{DeliveryMethod, PaymentMethod};

    #[test]
    fn test_invoice_payload_is_bound_to_user() {
        assert_eq!(invoice_payload(42), "order_42");
        assert!(is_valid_payload("order_42", 42));
        assert!(!is_valid_payload("order_43", 42));
        assert!(!is_valid_payload("subscription:42", 42));
    }

    #[test]
    fn test_payment_covers_cart() {
        assert!(payment_covers_cart(70_000, 700));
        assert!(payment_covers_cart(70_000, 0));
        // An item added after the invoice was issued
        assert!(!payment_covers_cart(70_000, 1_050));
        assert!(!payment_covers_cart(u32::MAX, i64::MAX));
    }

    #[test]
    fn test_prompt_for_awaiting_payment_is_an_invoice() {
        let order = OrderDraft {
            total: 700,
            delivery: DeliveryMethod::Pickup,
            payment: PaymentMethod::Online,
            address: None,
        };
        assert!(matches!(
            prompt_for(&ShopStep::AwaitingPayment { order }, None),
            Prompt::Invoice(draft) if draft.total == 700
        ));
        assert!(matches!(
            prompt_for(&ShopStep::ShareLocation {
                order: OrderDraft {
                    total: 700,
                    delivery: DeliveryMethod::Delivery,
                    payment: PaymentMethod::Cash,
                    address: None,
                }
            }, None),
            Prompt::Reply(..)
        ));
    }
}
