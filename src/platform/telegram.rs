use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::InputFile;
use tracing::debug;

use crate::config::Config;

/// Outbound side of the chat platform
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;
    async fn send_photo(&self, chat_id: i64, png: Vec<u8>, caption: &str) -> Result<()>;
}

/// Telegram Bot API client with a fixed per-request timeout
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(config: &Config) -> Result<Self> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(config.http_timeout())
            .build()
            .context("Failed to build Telegram HTTP client")?;

        let mut bot = Bot::with_client(&config.telegram.bot_token, client);
        if let Some(api_url) = &config.telegram.api_url {
            let url: reqwest::Url = api_url
                .parse()
                .with_context(|| format!("Invalid Telegram API URL: {}", api_url))?;
            bot = bot.set_api_url(url);
        }

        Ok(Self { bot })
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        debug!("sendMessage to chat {}", chat_id);
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .context("Failed to send message")?;
        Ok(())
    }

    async fn send_photo(&self, chat_id: i64, png: Vec<u8>, caption: &str) -> Result<()> {
        debug!("sendPhoto to chat {} ({} bytes)", chat_id, png.len());
        let photo = InputFile::memory(png).file_name("status.png");
        self.bot
            .send_photo(ChatId(chat_id), photo)
            .caption(caption)
            .await
            .context("Failed to send photo")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sent_message(chat_id: i64) -> serde_json::Value {
        serde_json::json!({
            "ok": true,
            "result": {
                "message_id": 42,
                "from": {
                    "id": 987654321,
                    "is_bot": true,
                    "first_name": "TestBot"
                },
                "chat": {
                    "id": chat_id,
                    "type": "private"
                },
                "date": 1735992000,
                "text": "✅ Test reply received!"
            }
        })
    }

    fn messenger_for(server: &MockServer) -> TelegramMessenger {
        let mut config = Config::default();
        config.telegram.bot_token = "test_token_12345:ABCDEF".to_string();
        config.telegram.api_url = Some(server.uri());
        TelegramMessenger::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_send_text_hits_send_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex("/bot[^/]+/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sent_message(123456789)))
            .expect(1)
            .mount(&server)
            .await;

        let messenger = messenger_for(&server);
        messenger
            .send_text(123456789, "✅ Test reply received!")
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["chat_id"], 123456789);
        assert_eq!(body["text"], "✅ Test reply received!");
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex("/bot[^/]+/sendMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let messenger = messenger_for(&server);
        assert!(messenger.send_text(1, "hello").await.is_err());
    }

    #[test]
    fn test_invalid_api_url_is_rejected() {
        let mut config = Config::default();
        config.telegram.api_url = Some("not a url".to_string());
        assert!(TelegramMessenger::new(&config).is_err());
    }
}
