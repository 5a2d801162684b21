//! LINE Messaging API client
//!
//! Only the two calls the bot needs: sending a reply and downloading the
//! content of an inbound image message.

use crate::config::LineConfig;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// LINE accepts at most this many messages per reply
pub const MAX_REPLY_MESSAGES: usize = 5;

/// LINE API errors
#[derive(Debug, Error)]
pub enum LineError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LINE API returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Reply has {0} messages, LINE allows at most 5")]
    TooManyMessages(usize),

    #[error("Reply has no messages")]
    EmptyReply,

    #[error("Message content is empty")]
    EmptyContent,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound message object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "originalContentUrl")]
        original_content_url: String,
        #[serde(rename = "previewImageUrl")]
        preview_image_url: String,
    },
}

impl Message {
    /// Text message
    pub fn text(text: impl Into<String>) -> Self {
        Message::Text { text: text.into() }
    }

    /// Image message using the same URL for preview and original
    pub fn image(url: impl Into<String>) -> Self {
        let url = url.into();
        Message::Image {
            original_content_url: url.clone(),
            preview_image_url: url,
        }
    }
}

/// Body of `POST /v2/bot/message/reply`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRequest {
    pub reply_token: String,
    pub messages: Vec<Message>,
}

/// LINE Messaging API client
#[derive(Clone)]
pub struct LineClient {
    http: reqwest::Client,
    access_token: String,
    api_base: String,
    data_api_base: String,
}

impl LineClient {
    /// Create a client from configuration
    pub fn new(config: &LineConfig) -> Result<Self, LineError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            access_token: config.access_token.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            data_api_base: config.data_api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Send a reply to the event that issued `reply_token`
    pub async fn reply(&self, reply_token: &str, messages: Vec<Message>) -> Result<(), LineError> {
        if messages.is_empty() {
            return Err(LineError::EmptyReply);
        }
        if messages.len() > MAX_REPLY_MESSAGES {
            return Err(LineError::TooManyMessages(messages.len()));
        }

        let url = format!("{}/v2/bot/message/reply", self.api_base);
        let count = messages.len();
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&ReplyRequest {
                reply_token: reply_token.to_string(),
                messages,
            })
            .send()
            .await?;

        check_status(response).await?;
        debug!(messages = count, "Reply sent");
        Ok(())
    }

    /// Stream the content of message `message_id` into `sink`
    ///
    /// Returns the number of bytes written. Empty content is an error.
    pub async fn download_content<W: AsyncWrite + Unpin>(
        &self,
        message_id: &str,
        sink: &mut W,
    ) -> Result<u64, LineError> {
        let url = format!("{}/v2/bot/message/{}/content", self.data_api_base, message_id);
        let response = self.http.get(&url).bearer_auth(&self.access_token).send().await?;
        let response = check_status(response).await?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;

        if written == 0 {
            return Err(LineError::EmptyContent);
        }
        debug!(message_id, bytes = written, "Message content downloaded");
        Ok(written)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LineError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LineError::Api { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_wire_format() {
        let text = serde_json::to_value(Message::text("hi")).unwrap();
        assert_eq!(text, json!({"type": "text", "text": "hi"}));

        let image = serde_json::to_value(Message::image("https://bot.example.com/static/a.jpg")).unwrap();
        assert_eq!(
            image,
            json!({
                "type": "image",
                "originalContentUrl": "https://bot.example.com/static/a.jpg",
                "previewImageUrl": "https://bot.example.com/static/a.jpg",
            })
        );
    }

    #[test]
    fn test_reply_request_wire_format() {
        let request = ReplyRequest {
            reply_token: "token".to_string(),
            messages: vec![Message::text("a")],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["replyToken"], "token");
        assert_eq!(value["messages"][0]["text"], "a");
    }

    async fn spawn_content_host() -> String {
        use axum::{extract::Path, http::StatusCode, routing::get, Router};

        let app = Router::new().route(
            "/v2/bot/message/:id/content",
            get(|Path(id): Path<String>| async move {
                match id.as_str() {
                    "photo" => (StatusCode::OK, vec![7u8; 4096]),
                    "blank" => (StatusCode::OK, Vec::new()),
                    _ => (StatusCode::NOT_FOUND, b"{\"message\":\"Not found\"}".to_vec()),
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_download_content_streams_into_async_file() {
        let client = LineClient::new(&LineConfig {
            data_api_base: spawn_content_host().await,
            ..Default::default()
        })
        .unwrap();

        let staged = tempfile::NamedTempFile::new().unwrap();
        let mut out = tokio::fs::File::from_std(staged.as_file().try_clone().unwrap());
        let written = client.download_content("photo", &mut out).await.unwrap();
        drop(out);
        assert_eq!(written, 4096);
        assert_eq!(std::fs::read(staged.path()).unwrap(), vec![7u8; 4096]);

        let mut sink = Vec::new();
        assert!(matches!(
            client.download_content("blank", &mut sink).await,
            Err(LineError::EmptyContent)
        ));
        assert!(matches!(
            client.download_content("gone", &mut sink).await,
            Err(LineError::Api { status, .. }) if status == reqwest::StatusCode::NOT_FOUND
        ));
    }

    #[tokio::test]
    async fn test_reply_rejects_bad_message_counts() {
        let client = LineClient::new(&LineConfig::default()).unwrap();

        assert!(matches!(client.reply("t", vec![]).await, Err(LineError::EmptyReply)));

        let six = vec![Message::text("x"); 6];
        assert!(matches!(client.reply("t", six).await, Err(LineError::TooManyMessages(6))));
    }
}
