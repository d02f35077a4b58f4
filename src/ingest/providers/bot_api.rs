// src/ingest/providers/bot_api.rs
//! Live channel posts via Bot API long polling. The bot must be a member of
//! every monitored channel. History is not exposed by the Bot API.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use crate::error::SourceError;
use crate::ingest::types::{FileRef, MediaRef, MessageStream, RawMessage, SourceClient};
use crate::publish::telegram::BotApi;

const LONG_POLL_SECS: u64 = 30;
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    channel_post: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    date: i64,
    chat: Chat,
    text: Option<String>,
    caption: Option<String>,
    photo: Option<Vec<PhotoSize>>,
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    username: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PhotoSize {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct Document {
    file_id: String,
    file_name: Option<String>,
    file_size: Option<u64>,
}

#[derive(Serialize)]
struct GetUpdates<'a> {
    offset: i64,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

impl Message {
    fn into_raw(self) -> Option<RawMessage> {
        let channel = self.chat.username.or(self.chat.title)?;
        let observed_at: DateTime<Utc> = Utc
            .timestamp_opt(self.date, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Some(RawMessage {
            channel,
            text: self.text.or(self.caption).unwrap_or_default(),
            // Sizes are ascending; the last one is the original.
            media: self
                .photo
                .and_then(|p| p.into_iter().last())
                .map(|p| MediaRef(p.file_id)),
            document: self.document.map(|d| FileRef {
                file_name: d.file_name.unwrap_or_else(|| d.file_id.clone()),
                id: d.file_id,
                size: d.file_size,
            }),
            seq_id: self.message_id,
            observed_at,
        })
    }
}

struct PollState {
    api: BotApi,
    offset: i64,
    buffer: VecDeque<RawMessage>,
    wanted: HashSet<String>,
}

pub struct BotApiSource {
    api: BotApi,
}

impl BotApiSource {
    pub fn new(api: BotApi) -> Self {
        Self { api }
    }
}

async fn poll_once(st: &mut PollState) -> Result<(), SourceError> {
    let body = GetUpdates {
        offset: st.offset,
        timeout: LONG_POLL_SECS,
        allowed_updates: &["channel_post"],
    };
    let updates: Vec<Update> = st
        .api
        .call_with_timeout("getUpdates", &body, Duration::from_secs(LONG_POLL_SECS + 10))
        .await
        .map_err(|e| SourceError::unavailable("bot_api", e.to_string()))?;
    for u in updates {
        st.offset = st.offset.max(u.update_id + 1);
        let Some(raw) = u.channel_post.and_then(Message::into_raw) else {
            continue;
        };
        if st.wanted.contains(&raw.channel.to_ascii_lowercase()) {
            st.buffer.push_back(raw);
        }
    }
    Ok(())
}

#[async_trait]
impl SourceClient for BotApiSource {
    async fn iterate_history(
        &self,
        channel: &str,
        _since: DateTime<Utc>,
    ) -> Result<MessageStream, SourceError> {
        Err(SourceError::unavailable(
            channel,
            "channel history is not available over the Bot API",
        ))
    }

    async fn subscribe(&self, channels: &[String]) -> Result<MessageStream, SourceError> {
        let state = PollState {
            api: self.api.clone(),
            offset: 0,
            buffer: VecDeque::new(),
            wanted: channels.iter().map(|c| c.to_ascii_lowercase()).collect(),
        };
        let s = stream::unfold(state, |mut st| async move {
            loop {
                if let Some(m) = st.buffer.pop_front() {
                    return Some((Ok(m), st));
                }
                if let Err(e) = poll_once(&mut st).await {
                    tokio::time::sleep(ERROR_BACKOFF).await;
                    return Some((Err(e), st));
                }
            }
        });
        Ok(s.boxed())
    }

    fn name(&self) -> &'static str {
        "bot_api"
    }
}
