//! Dispatcher schema and delivery loop
//!
//! Callback queries and messages are converted to [`InboundAction`]s, routed
//! through [`Application::dispatch`], and the resulting renders are sent back.

use std::net::SocketAddr;
use std::sync::Arc;

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, Message};
use teloxide::update_listeners::{webhooks, Polling};
use tokio_util::sync::CancellationToken;

use super::application::{Application, Dispatch};
use super::jobs::spawn_jobs;
use super::render::deliver;
use crate::core::error::{AppError, AppResult};
use crate::routing::{HandlerError, InboundAction, InboundMessage, MessageKind};

/// Transport-independent view of a Telegram message.
pub fn inbound_message(msg: &Message) -> InboundMessage {
    let kind = if msg.text().is_some() {
        MessageKind::Text
    } else if msg.photo().is_some() {
        MessageKind::Photo
    } else if msg.document().is_some() {
        MessageKind::Document
    } else if msg.voice().is_some() {
        MessageKind::Voice
    } else {
        MessageKind::Other
    };
    InboundMessage {
        text: msg.text().map(str::to_string),
        caption: msg.caption().map(str::to_string),
        kind,
    }
}

/// Creates the handler tree for the dispatcher.
pub fn schema(app: Arc<Application>) -> UpdateHandler<HandlerError> {
    dptree::entry()
        .branch(callback_handler(Arc::clone(&app)))
        .branch(message_handler(app))
}

fn callback_handler(app: Arc<Application>) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
        let app = Arc::clone(&app);
        async move { on_callback(app, bot, q).await }
    })
}

fn message_handler(app: Arc<Application>) -> UpdateHandler<HandlerError> {
    Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
        let app = Arc::clone(&app);
        async move { on_message(app, bot, msg).await }
    })
}

async fn on_callback(app: Arc<Application>, bot: Bot, q: CallbackQuery) -> Result<(), HandlerError> {
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        log::debug!("Failed to answer callback query {:?}: {}", q.id, e);
    }

    let (Some(data), Some(message)) = (q.data.clone(), q.message.as_ref()) else {
        return Ok(());
    };
    let chat_id = message.chat().id;
    let user_id = i64::try_from(q.from.id.0).ok();

    let dispatch = app.dispatch(chat_id.0, user_id, InboundAction::callback(data)).await?;
    if let Dispatch::Handled(outcome) = dispatch {
        deliver(
            &bot,
            chat_id,
            Some(message.id()),
            &outcome.renders,
            app.table().identifier_len(),
        )
        .await?;
    }
    Ok(())
}

async fn on_message(app: Arc<Application>, bot: Bot, msg: Message) -> Result<(), HandlerError> {
    let user_id = msg.from.as_ref().and_then(|u| i64::try_from(u.id.0).ok());
    let action = InboundAction::Message(inbound_message(&msg));

    let dispatch = app.dispatch(msg.chat.id.0, user_id, action).await?;
    if let Dispatch::Handled(outcome) = dispatch {
        deliver(&bot, msg.chat.id, None, &outcome.renders, app.table().identifier_len()).await?;
    }
    Ok(())
}

/// Runs the dispatcher until Ctrl-C, with the application's jobs alongside.
pub async fn run(app: Arc<Application>, bot: Bot) -> AppResult<()> {
    let settings = app.settings().clone();
    let shutdown = CancellationToken::new();
    let job_handles = spawn_jobs(app.jobs(), bot.clone(), shutdown.clone());

    let mut dispatcher = Dispatcher::builder(bot.clone(), schema(Arc::clone(&app)))
        .enable_ctrlc_handler()
        .build();
    let error_handler = LoggingErrorHandler::with_custom_text("An error from the update listener");

    if settings.use_webhook {
        let url = settings.webhook_url.clone().ok_or(AppError::WebhookUrlMissing)?;
        let address = SocketAddr::new(settings.webhook_listen, settings.webhook_port);
        log::info!(
            "Starting '{}' in webhook mode on {}{} ({})",
            app.name(),
            address,
            settings.webhook_url_path,
            url
        );
        let options = webhooks::Options::new(address, url).path(settings.webhook_url_path.clone());
        let listener = webhooks::axum(bot.clone(), options).await?;
        dispatcher.dispatch_with_listener(listener, error_handler).await;
    } else {
        log::info!("Starting '{}' in long polling mode", app.name());
        let listener = Polling::builder(bot.clone()).drop_pending_updates().build();
        dispatcher.dispatch_with_listener(listener, error_handler).await;
    }

    log::info!("Dispatcher stopped, shutting down jobs");
    shutdown.cancel();
    for handle in job_handles {
        if let Err(e) = handle.await {
            log::warn!("Job task ended abnormally: {}", e);
        }
    }
    Ok(())
}
