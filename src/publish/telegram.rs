// src/publish/telegram.rs
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{format, Publisher};
use crate::error::DeliveryError;
use crate::transform::{PayloadKind, PublishPayload};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
/// Telegram rejects photo captions above this many characters.
const CAPTION_LIMIT: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum BotApiError {
    /// Transport failure. The URL is stripped because it embeds the bot token.
    #[error("bot api request failed: {0}")]
    Http(reqwest::Error),
    #[error("bot api {method} rejected: {description}")]
    Rejected { method: String, description: String },
}

impl From<reqwest::Error> for BotApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.without_url())
    }
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Thin Telegram Bot API client shared by the source and the publisher.
#[derive(Clone)]
pub struct BotApi {
    base: String,
    client: Client,
    timeout: Duration,
}

impl BotApi {
    pub fn new(token: &str) -> Self {
        Self {
            base: format!("{DEFAULT_API_BASE}/bot{token}"),
            client: Client::new(),
            timeout: Duration::from_secs(15),
        }
    }

    /// Point at a self-hosted Bot API server (or a test double).
    pub fn with_base_url(mut self, base_url: &str, token: &str) -> Self {
        self.base = format!("{}/bot{token}", base_url.trim_end_matches('/'));
        self
    }

    pub async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, BotApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call_with_timeout(method, body, self.timeout).await
    }

    pub async fn call_with_timeout<B, T>(
        &self,
        method: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T, BotApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let rsp: ApiResponse<T> = self
            .client
            .post(format!("{}/{method}", self.base))
            .timeout(timeout)
            .json(body)
            .send()
            .await?
            .json()
            .await?;
        match (rsp.ok, rsp.result) {
            (true, Some(r)) => Ok(r),
            _ => Err(BotApiError::Rejected {
                method: method.to_string(),
                description: rsp.description.unwrap_or_else(|| "no description".into()),
            }),
        }
    }
}

#[derive(Serialize)]
struct LinkPreview {
    is_disabled: bool,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    link_preview_options: LinkPreview,
}

#[derive(Serialize)]
struct SendPhoto<'a> {
    chat_id: &'a str,
    photo: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<&'a str>,
    parse_mode: &'static str,
}

#[derive(Serialize)]
struct SendDocument<'a> {
    chat_id: &'a str,
    document: &'a str,
    caption: &'a str,
    parse_mode: &'static str,
}

/// Publishes into one target chat via the Bot API. Exactly one attempt per payload.
#[derive(Clone)]
pub struct BotApiPublisher {
    api: BotApi,
    chat_id: String,
    news_signature: String,
    proxy_signature: String,
}

impl BotApiPublisher {
    pub fn new(api: BotApi, chat_id: impl Into<String>) -> Self {
        Self {
            api,
            chat_id: chat_id.into(),
            news_signature: String::new(),
            proxy_signature: String::new(),
        }
    }

    pub fn with_signatures(mut self, news: impl Into<String>, proxy: impl Into<String>) -> Self {
        self.news_signature = news.into();
        self.proxy_signature = proxy.into();
        self
    }

    async fn send_text(&self, text: &str) -> Result<(), DeliveryError> {
        let body = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
            link_preview_options: LinkPreview { is_disabled: true },
        };
        self.api
            .call::<_, serde_json::Value>("sendMessage", &body)
            .await
            .map(|_| ())
            .map_err(|e| DeliveryError::new(e.to_string()))
    }

    async fn send_photo(&self, photo: &str, caption: Option<&str>) -> Result<(), DeliveryError> {
        let body = SendPhoto {
            chat_id: &self.chat_id,
            photo,
            caption,
            parse_mode: "HTML",
        };
        self.api
            .call::<_, serde_json::Value>("sendPhoto", &body)
            .await
            .map(|_| ())
            .map_err(|e| DeliveryError::new(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Publisher for BotApiPublisher {
    async fn deliver(&self, payload: &PublishPayload) -> Result<(), DeliveryError> {
        match &payload.kind {
            PayloadKind::NewsItem { text, media: None } => {
                self.send_text(&format::format_news(text, &self.news_signature))
                    .await
            }
            PayloadKind::NewsItem {
                text,
                media: Some(media),
            } => {
                let formatted = format::format_news(text, &self.news_signature);
                if formatted.chars().count() <= CAPTION_LIMIT {
                    self.send_photo(&media.0, Some(formatted.as_str())).await
                } else {
                    self.send_photo(&media.0, None).await?;
                    self.send_text(&formatted).await
                }
            }
            PayloadKind::ProxyText { config } => {
                self.send_text(&format::format_proxy(config, &self.proxy_signature))
                    .await
            }
            PayloadKind::ProxyFile { file, display_name } => {
                let caption = format::format_proxy_file(display_name, &self.proxy_signature);
                let body = SendDocument {
                    chat_id: &self.chat_id,
                    document: &file.id,
                    caption: &caption,
                    parse_mode: "HTML",
                };
                self.api
                    .call::<_, serde_json::Value>("sendDocument", &body)
                    .await
                    .map(|_| ())
                    .map_err(|e| DeliveryError::new(e.to_string()))
            }
        }
    }
}
