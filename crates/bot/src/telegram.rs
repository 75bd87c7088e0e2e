// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Telegram glue: the [`ChatTransport`] implementation and the inbound
//! long-polling loop.
//!
//! Everything here is deliberately thin. Outbound messages try MarkdownV2
//! first and retry as plain text when Telegram rejects the entities — a
//! rendering failure never drops a message. Inbound, only forum-topic
//! messages from allowlisted users reach the command router; everyone else
//! is ignored without a reply.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{MessageId, MessageKind, ParseMode, ThreadId};
use teloxide::{ApiError, RequestError};
use tracing::{debug, info};

use crate::chat::{ChatTransport, TransportFuture};
use crate::commands::CommandRouter;

/// One transient-network retry per operation.
const SEND_RETRIES: usize = 1;

pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

/// Whether the failure is Telegram rejecting our markup (retry as plain)
/// rather than something structural.
fn is_parse_error(err: &RequestError) -> bool {
    match err {
        RequestError::Api(ApiError::CantParseEntities(_)) => true,
        RequestError::Api(ApiError::Unknown(s)) => s.contains("can't parse entities"),
        _ => false,
    }
}

fn is_transient(err: &RequestError) -> bool {
    matches!(err, RequestError::Network(_) | RequestError::Io(_))
}

impl ChatTransport for TelegramTransport {
    fn send(&self, chat_id: i64, topic_id: i32, text: String) -> TransportFuture<'_, i32> {
        Box::pin(async move {
            let mut attempts = 0;
            let mut markdown = true;
            loop {
                let mut req = self
                    .bot
                    .send_message(ChatId(chat_id), text.clone())
                    .message_thread_id(ThreadId(MessageId(topic_id)));
                if markdown {
                    req = req.parse_mode(ParseMode::MarkdownV2);
                }
                match req.await {
                    Ok(message) => return Ok(message.id.0),
                    Err(e) if markdown && is_parse_error(&e) => {
                        debug!("markdown rejected, retrying plain");
                        markdown = false;
                    }
                    Err(e) if is_transient(&e) && attempts < SEND_RETRIES => {
                        attempts += 1;
                        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        })
    }

    fn edit(&self, chat_id: i64, message_id: i32, text: String) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let mut markdown = true;
            loop {
                let mut req = self
                    .bot
                    .edit_message_text(ChatId(chat_id), MessageId(message_id), text.clone());
                if markdown {
                    req = req.parse_mode(ParseMode::MarkdownV2);
                }
                match req.await {
                    Ok(_) => return Ok(()),
                    Err(e) if markdown && is_parse_error(&e) => {
                        debug!("markdown rejected on edit, retrying plain");
                        markdown = false;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        })
    }

    fn delete(&self, chat_id: i64, message_id: i32) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.bot.delete_message(ChatId(chat_id), MessageId(message_id)).await?;
            Ok(())
        })
    }
}

/// Numeric-ID allowlist. Everyone else is rejected silently.
pub fn is_allowed(allowed: &[u64], user_id: u64) -> bool {
    allowed.contains(&user_id)
}

/// Drive the long-polling dispatcher until the process shuts down.
pub async fn run_dispatcher(bot: Bot, router: Arc<CommandRouter>, allowed: Vec<u64>) {
    info!("starting Telegram long-polling dispatcher");
    let allowed = Arc::new(allowed);

    let handler = Update::filter_message().endpoint(
        |msg: Message, router: Arc<CommandRouter>, allowed: Arc<Vec<u64>>| async move {
            handle_update(msg, router, allowed).await;
            respond(())
        },
    );

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![router, allowed])
        .default_handler(|_upd| async {})
        .build()
        .dispatch()
        .await;
}

async fn handle_update(msg: Message, router: Arc<CommandRouter>, allowed: Arc<Vec<u64>>) {
    // Bots never drive the bridge.
    let Some(from) = msg.from.as_ref() else {
        return;
    };
    if from.is_bot || !is_allowed(&allowed, from.id.0) {
        return;
    }

    // Topic mode only: a message outside a forum topic has nowhere to bind.
    let Some(thread_id) = msg.thread_id else {
        return;
    };
    let user_id = from.id.0;
    let chat_id = msg.chat.id.0;
    let topic_id = thread_id.0 .0;

    if matches!(msg.kind, MessageKind::ForumTopicClosed(_)) {
        debug!(user_id, topic_id, "topic closed");
        router.topic_closed(user_id, topic_id).await;
        return;
    }

    let Some(text) = msg.text() else {
        return;
    };
    if text.trim().is_empty() {
        return;
    }

    router.handle_message(user_id, chat_id, topic_id, text).await;
}

#[cfg(test)]
#[path = "telegram_tests.rs"]
mod tests;
