//! Pre-handler steps run on every update: logging, flood control and lazy
//! user registration. They are plugged into the handler tree in that order
//! by [`super::schema`].

use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{CallbackQueryId, UpdateKind};
use tracing::{debug, error, info, warn};

use crate::catalog::Catalog;
use crate::db::ShopUser;
use crate::localization::t_lang;
use crate::throttle::Throttle;

/// Short description of what the update carries
fn payload(update: &Update) -> (&'static str, Option<&str>) {
    match &update.kind {
        UpdateKind::Message(msg) if msg.successful_payment().is_some() => {
            ("successful_payment", None)
        }
        UpdateKind::Message(msg) if msg.location().is_some() => ("location", None),
        UpdateKind::Message(msg) if msg.photo().is_some() => ("photo", msg.caption()),
        UpdateKind::Message(msg) => ("message", msg.text()),
        UpdateKind::CallbackQuery(q) => ("callback_query", q.data.as_deref()),
        UpdateKind::PreCheckoutQuery(q) => ("pre_checkout_query", Some(q.invoice_payload.as_str())),
        _ => ("other", None),
    }
}

pub fn log_update(update: Update) {
    let (kind, data) = payload(&update);
    match update.from() {
        Some(user) => info!(user_id = %user.id, kind, data = data.unwrap_or(""), "Incoming update"),
        None => info!(kind, "Incoming update without sender"),
    }
}

/// Payment notifications must always get through
fn is_exempt(update: &Update) -> bool {
    match &update.kind {
        UpdateKind::PreCheckoutQuery(_) => true,
        UpdateKind::Message(msg) => msg.successful_payment().is_some(),
        _ => false,
    }
}

/// Where the flood warning for a rejected update is delivered
#[derive(Debug, Clone, PartialEq)]
enum FloodNotice {
    Answer(CallbackQueryId),
    Message(ChatId),
    Silent,
}

fn flood_notice(update: &Update) -> FloodNotice {
    match &update.kind {
        UpdateKind::CallbackQuery(q) => FloodNotice::Answer(q.id.clone()),
        UpdateKind::Message(msg) => FloodNotice::Message(msg.chat.id),
        _ => FloodNotice::Silent,
    }
}

/// Let the update through unless its sender is inside the cooldown window
pub async fn throttle(bot: Bot, update: Update, throttle: Throttle) -> bool {
    if is_exempt(&update) {
        return true;
    }

    let Some(user) = update.from() else {
        return true;
    };

    if throttle.allow(user.id.0).await {
        return true;
    }

    debug!(user_id = %user.id, cooldown_ms = throttle.cooldown().as_millis() as u64, "Update throttled");
    let notice = t_lang("flood-warning", user.language_code.as_deref());

    let sent = match flood_notice(&update) {
        FloodNotice::Answer(id) => bot.answer_callback_query(id).text(notice).await.map(|_| ()),
        FloodNotice::Message(chat_id) => bot.send_message(chat_id, notice).await.map(|_| ()),
        FloodNotice::Silent => Ok(()),
    };
    if let Err(e) = sent {
        warn!(user_id = %user.id, error = %e, "Failed to send flood warning");
    }

    false
}

/// Resolve the sender to a registered [`ShopUser`], registering on first contact
pub async fn ensure_user(update: Update, catalog: Arc<Catalog>) -> Option<ShopUser> {
    let user = update.from()?;

    match catalog
        .ensure_user(user.id.0 as i64, &user.full_name(), user.username.as_deref())
        .await
    {
        Ok(shop_user) => Some(shop_user),
        Err(e) => {
            error!(user_id = %user.id, error = %e, "Failed to register user, dropping update");
            None
        }
    }
}
