//! Turning handler renders into Telegram messages

use teloxide::prelude::*;
use teloxide::types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, MessageId, WebAppInfo};

use crate::core::error::AppResult;
use crate::routing::{ButtonSource, Keyboard, Render, RenderMode};

/// Inline markup for `keyboard`; callback buttons carry `<identifier>,<args>`.
pub fn to_markup(keyboard: &Keyboard, identifier_len: usize) -> AppResult<InlineKeyboardMarkup> {
    let mut rows = Vec::with_capacity(keyboard.rows().len());
    for row in keyboard.rows() {
        let mut buttons = Vec::with_capacity(row.len());
        for button in row {
            let caption = button.caption().to_string();
            let rendered = match button.source() {
                ButtonSource::Url(url) => InlineKeyboardButton::url(caption, url.clone()),
                ButtonSource::WebApp(url) => InlineKeyboardButton::web_app(caption, WebAppInfo { url: url.clone() }),
                ButtonSource::Goto(_) | ButtonSource::Route(_) | ButtonSource::Handler(_) => {
                    let data = button.callback_data_with_len(identifier_len)?.unwrap_or_default();
                    InlineKeyboardButton::callback(caption, data)
                }
            };
            buttons.push(rendered);
        }
        rows.push(buttons);
    }
    Ok(InlineKeyboardMarkup::new(rows))
}

/// Sends every render to `chat_id` in order.
///
/// `Edit` renders replace `origin` when there is one; a failed edit (the
/// message is too old, or unchanged) falls back to sending a new message.
pub async fn deliver(
    bot: &Bot,
    chat_id: ChatId,
    origin: Option<MessageId>,
    renders: &[Render],
    identifier_len: usize,
) -> AppResult<()> {
    for render in renders {
        if render.text.is_empty() {
            log::warn!("Skipping a render with empty text for chat {}", chat_id);
            continue;
        }
        let markup = render
            .keyboard
            .as_ref()
            .filter(|keyboard| !keyboard.is_empty())
            .map(|keyboard| to_markup(keyboard, identifier_len))
            .transpose()?;

        if let (RenderMode::Edit, Some(message_id)) = (render.mode, origin) {
            let mut request = bot.edit_message_text(chat_id, message_id, render.text.clone());
            if let Some(markup) = markup.clone() {
                request = request.reply_markup(markup);
            }
            match request.await {
                Ok(_) => continue,
                Err(e) => log::debug!(
                    "Edit of message {} in chat {} failed, sending instead: {}",
                    message_id.0,
                    chat_id,
                    e
                ),
            }
        }

        let mut request = bot.send_message(chat_id, render.text.clone());
        if let Some(markup) = markup {
            request = request.reply_markup(markup);
        }
        request.await?;
    }
    Ok(())
}
