//!  Farewatch Fare Monitor
//!
//!  Copyright (C) 2026  Mamy Ratsimbazafy
//!
//!  This program is free software: you can redistribute it and/or modify
//!  it under the terms of the GNU Affero General Public License as published by
//!  the Free Software Foundation, either version 3 of the License, or
//!  (at your option) any later version.
//!
//!  This program is distributed in the hope that it will be useful,
//!  but WITHOUT ANY WARRANTY; without even the implied warranty of
//!  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//!  GNU Affero General Public License for more details.
//!
//!  You should have received a copy of the GNU Affero General Public License
//!  along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! # Notifier Clients
//!
//! Delivery of a formatted message to the chat, or to stdout for dry runs.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::config::TelegramTarget;
use crate::error::{NotificationDeliveryError, body_preview};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotificationDeliveryError>;
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct TelegramReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Interpret a `sendMessage` reply. Telegram may answer 200 with `ok: false`.
pub fn interpret_telegram_response(status: u16, body: &str) -> Result<(), NotificationDeliveryError> {
    if !(200..300).contains(&status) {
        return Err(NotificationDeliveryError::Status {
            status,
            body: body_preview(body),
        });
    }

    match serde_json::from_str::<TelegramReply>(body) {
        Ok(reply) if reply.ok => Ok(()),
        Ok(reply) => Err(NotificationDeliveryError::Rejected(
            reply.description.unwrap_or_else(|| "ok=false".to_string()),
        )),
        Err(e) => Err(NotificationDeliveryError::Rejected(format!(
            "unreadable reply: {}",
            e
        ))),
    }
}

pub struct TelegramNotifier {
    client: Arc<wreq::Client>,
    api_base: String,
    target: TelegramTarget,
}

impl TelegramNotifier {
    pub fn new(client: Arc<wreq::Client>, api_base: &str, target: TelegramTarget) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            target,
        }
    }

    // Contains the bot token: never log it.
    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.target.bot_token)
    }

    fn transport_error(&self, e: wreq::Error) -> NotificationDeliveryError {
        NotificationDeliveryError::Transport(redact(&e.to_string(), &self.target.bot_token))
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), NotificationDeliveryError> {
        let start = std::time::Instant::now();
        tracing::debug!(
            "[send] POST {}/bot<redacted>/sendMessage ({} chars)",
            self.api_base,
            text.chars().count()
        );

        let payload = SendMessage {
            chat_id: &self.target.chat_id,
            text,
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(self.send_message_url())
            .json(&payload)
            .send()
            .await
            // wreq errors may echo the URL, which carries the token.
            .map_err(|e| self.transport_error(e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;

        interpret_telegram_response(status, &body)?;
        tracing::info!("📨 Notification delivered in {:?}", start.elapsed());
        Ok(())
    }
}

fn redact(message: &str, secret: &str) -> String {
    if secret.is_empty() {
        message.to_string()
    } else {
        message.replace(secret, "<redacted>")
    }
}

/// Prints messages to stdout instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(&self, text: &str) -> Result<(), NotificationDeliveryError> {
        let mut stdout = tokio::io::stdout();
        let mut out = String::with_capacity(text.len() + 1);
        out.push_str(text);
        out.push('\n');
        stdout
            .write_all(out.as_bytes())
            .await
            .map_err(|e| NotificationDeliveryError::Output(e.to_string()))?;
        stdout
            .flush()
            .await
            .map_err(|e| NotificationDeliveryError::Output(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_ok() {
        assert!(interpret_telegram_response(200, r#"{"ok":true,"result":{}}"#).is_ok());
    }

    #[test]
    fn test_interpret_ok_false_is_rejected() {
        let err = interpret_telegram_response(
            200,
            r#"{"ok":false,"description":"Bad Request: chat not found"}"#,
        )
        .unwrap_err();
        match err {
            NotificationDeliveryError::Rejected(msg) => assert!(msg.contains("chat not found")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_interpret_http_error() {
        let err = interpret_telegram_response(401, r#"{"ok":false}"#).unwrap_err();
        assert!(matches!(err, NotificationDeliveryError::Status { status: 401, .. }));
    }

    #[test]
    fn test_interpret_garbage_body() {
        assert!(interpret_telegram_response(200, "<html>").is_err());
    }

    #[test]
    fn test_payload_shape() {
        let payload = SendMessage {
            chat_id: "-100123",
            text: "hello",
            disable_web_page_preview: true,
        };
        let json: serde_json::Value = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["chat_id"], "-100123");
        assert_eq!(json["text"], "hello");
        assert_eq!(json["disable_web_page_preview"], true);
    }

    #[test]
    fn test_redact_hides_token() {
        let msg = redact(
            "error sending request for url (https://x/bot123:ABC/sendMessage)",
            "123:ABC",
        );
        assert!(!msg.contains("123:ABC"));
        assert!(msg.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_console_notifier_succeeds() {
        assert!(ConsoleNotifier.send("dry run").await.is_ok());
    }
}
