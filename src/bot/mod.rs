//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `middleware`: Logging, flood control and user registration for every update
//! - `shop_handler`: Main menu, catalog browsing and the cart
//! - `checkout_handler`: Delivery/payment/address steps, invoices and payments
//! - `admin_handler`: Category and product management for administrators
//! - `ui_builder`: Creates keyboards and formats messages

pub mod admin_handler;
pub mod checkout_handler;
pub mod middleware;
pub mod shop_handler;
pub mod ui_builder;

use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use teloxide::dispatching::dialogue::{self, ErasedStorage};
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::InlineKeyboardMarkup;
use teloxide::utils::command::BotCommands;
use teloxide::{ApiError, RequestError};
use tracing::{debug, warn};

use crate::callbacks::{AdminAction, ShopAction};
use crate::config::BotConfig;
use crate::db::ShopUser;
use crate::dialogue::{AdminStep, ShopDialogue, ShopStep, State};
use crate::errors::ShopError;
use crate::localization::t_lang;

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "open the main menu")]
    Start,
    #[command(description = "open the admin panel")]
    Admin,
}

fn is_admin(user: ShopUser, config: Arc<BotConfig>) -> bool {
    u64::try_from(user.telegram_id).is_ok_and(|id| config.is_admin(id))
}

fn admin_step(state: State) -> Option<AdminStep> {
    match state {
        State::Admin(step) => Some(step),
        _ => None,
    }
}

fn shop_step(state: State) -> Option<ShopStep> {
    match state {
        State::Shop(step) => Some(step),
        _ => None,
    }
}

/// The whole update handler tree
///
/// Dependencies expected in the dispatcher: `Arc<Catalog>`, `Arc<BotConfig>`,
/// `Throttle` and `Arc<ErasedStorage<State>>`.
pub fn schema() -> UpdateHandler<anyhow::Error> {
    let commands = teloxide::filter_command::<Command, _>()
        .branch(dptree::case![Command::Start].endpoint(shop_handler::start))
        .branch(
            dptree::case![Command::Admin]
                .filter(is_admin)
                .endpoint(admin_handler::admin_home),
        );

    let messages = Update::filter_message()
        .branch(
            dptree::filter(|msg: Message| msg.successful_payment().is_some())
                .endpoint(checkout_handler::successful_payment),
        )
        .branch(commands)
        .branch(
            dptree::filter_map(admin_step)
                .filter(is_admin)
                .endpoint(admin_handler::on_message),
        )
        .branch(dptree::filter_map(shop_step).endpoint(checkout_handler::on_message))
        .branch(dptree::endpoint(shop_handler::fallback));

    let callbacks = Update::filter_callback_query()
        .branch(
            dptree::filter_map(|q: CallbackQuery| q.data?.parse::<AdminAction>().ok())
                .filter(is_admin)
                .endpoint(admin_handler::on_callback),
        )
        .branch(
            dptree::filter_map(|q: CallbackQuery| q.data?.parse::<ShopAction>().ok())
                .endpoint(shop_handler::on_callback),
        );

    dptree::entry()
        .inspect(middleware::log_update)
        .filter_async(middleware::throttle)
        .filter_map_async(middleware::ensure_user)
        // Pre-checkout queries carry no chat, so they cannot enter a dialogue
        .branch(Update::filter_pre_checkout_query().endpoint(checkout_handler::pre_checkout))
        .branch(
            dialogue::enter::<Update, ErasedStorage<State>, State, _>()
                .branch(messages)
                .branch(callbacks),
        )
}

/// Run a handler body; on failure clear the conversation, tell the user and re-raise
pub async fn report_errors<T, F>(
    bot: &Bot,
    dialogue: &ShopDialogue,
    language_code: Option<&str>,
    work: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let error = match work.await {
        Ok(value) => return Ok(value),
        Err(error) => error,
    };

    if let Err(e) = dialogue.exit().await {
        warn!(chat_id = %dialogue.chat_id(), error = %e, "Failed to reset dialogue after error");
    }

    let key = error
        .downcast_ref::<ShopError>()
        .map(ShopError::message_key)
        .unwrap_or("error-generic");

    if let Err(e) = bot
        .send_message(dialogue.chat_id(), t_lang(key, language_code))
        .await
    {
        warn!(chat_id = %dialogue.chat_id(), error = %e, "Failed to report error to user");
    }

    Err(error)
}

/// Answer the pressed button whatever the handler outcome, then pass the
/// outcome on. A successful outcome's text is shown as the callback notice.
pub async fn answer_callback(
    bot: &Bot,
    q: &CallbackQuery,
    outcome: Result<Option<String>>,
) -> Result<()> {
    let mut answer = bot.answer_callback_query(q.id.clone());
    if let Ok(Some(text)) = &outcome {
        answer = answer.text(text.clone());
    }

    match (outcome, answer.await) {
        (Err(error), Err(e)) => {
            warn!(user_id = %q.from.id, error = %e, "Failed to answer callback query");
            Err(error)
        }
        (Err(error), Ok(_)) => Err(error),
        (Ok(_), Err(e)) => Err(e.into()),
        (Ok(_), Ok(_)) => Ok(()),
    }
}

/// Replace the text of the message a button was pressed on, or send a new one
/// when that message cannot be edited (photos, inaccessible messages)
pub async fn show_text(
    bot: &Bot,
    q: &CallbackQuery,
    text: String,
    keyboard: InlineKeyboardMarkup,
) -> Result<()> {
    match q.regular_message() {
        Some(message) if message.text().is_some() => {
            match bot
                .edit_message_text(message.chat.id, message.id, text)
                .reply_markup(keyboard)
                .await
            {
                Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Some(message) => {
            if let Err(e) = bot.delete_message(message.chat.id, message.id).await {
                debug!(chat_id = %message.chat.id, error = %e, "Could not delete previous message");
            }
            bot.send_message(message.chat.id, text)
                .reply_markup(keyboard)
                .await?;
        }
        None => {
            bot.send_message(ChatId::from(q.from.id), text)
                .reply_markup(keyboard)
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn callback_query() -> CallbackQuery {
        serde_json::from_value(serde_json::json!({
            "id": "4382bfdwdsb323b2d9",
            "from": {"id": 42, "is_bot": false, "first_name": "Anna", "language_code": "en"},
            "chat_instance": "-5823112409932",
            "data": "cart"
        }))
        .expect("valid callback query")
    }

    async fn answering_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex("(?i)/bot[^/]+/answerCallbackQuery$"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true, "result": true})),
            )
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    fn mock_bot(server: &MockServer) -> Bot {
        Bot::new("test_token_12345:ABCDEF").set_api_url(server.uri().parse().expect("mock server url"))
    }

    #[tokio::test]
    async fn test_failed_callback_is_still_answered() {
        let server = answering_server().await;
        let bot = mock_bot(&server);

        let result = answer_callback(
            &bot,
            &callback_query(),
            Err(ShopError::NotFound("product 7".to_string()).into()),
        )
        .await;

        let error = result.expect_err("handler error must propagate");
        assert!(matches!(error.downcast_ref::<ShopError>(), Some(ShopError::NotFound(_))));
        server.verify().await;
    }

    #[tokio::test]
    async fn test_callback_notice_is_sent_with_answer() {
        let server = answering_server().await;
        let bot = mock_bot(&server);

        answer_callback(&bot, &callback_query(), Ok(Some("Added to cart".to_string())))
            .await
            .expect("answer should succeed");

        let requests = server.received_requests().await.expect("request recording enabled");
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("4382bfdwdsb323b2d9"));
        assert!(body.contains("Added to cart"));
    }

    #[test]
    fn test_commands_parse() {
        assert!(matches!(Command::parse("/start", "pizzeria_bot"), Ok(Command::Start)));
        assert!(matches!(Command::parse("/admin", "pizzeria_bot"), Ok(Command::Admin)));
        assert!(Command::parse("/orders", "pizzeria_bot").is_err());
    }

    #[test]
    fn test_step_extractors() {
        assert!(admin_step(State::Idle).is_none());
        assert!(shop_step(State::Admin(AdminStep::AddCategoryName)).is_none());
        assert!(shop_step(State::Shop(ShopStep::CartReview { total: 700 })).is_some());
    }
}
