use std::fmt;

use teloxide::prelude::*;
use teloxide::types::{InputFile, Recipient};
use teloxide::RequestError;
use thiserror::Error;
use tracing::{debug, info};

use crate::imaging::ImagePayload;

pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";

/// Token value shipped in fresh configs; treated as "not configured".
pub const PLACEHOLDER_TOKEN: &str = "YOUR_BOT_TOKEN";

/// Telegram rejects inline photos above this size.
pub const PHOTO_SIZE_CAP: u64 = 10 * 1024 * 1024;

const REDACTED: &str = "<redacted>";

/// Which Bot API upload endpoint a payload goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    /// Inline, compressed by Telegram (`sendPhoto`).
    Photo,
    /// Generic file attachment, sent untouched (`sendDocument`).
    Document,
}

impl UploadMode {
    /// Photo unless the payload exceeds the inline photo cap.
    pub fn for_size(len: u64, photo_cap: u64) -> Self {
        if len > photo_cap {
            UploadMode::Document
        } else {
            UploadMode::Photo
        }
    }

    pub fn method(self) -> &'static str {
        match self {
            UploadMode::Photo => "sendPhoto",
            UploadMode::Document => "sendDocument",
        }
    }
}

impl fmt::Display for UploadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadMode::Photo => write!(f, "photo"),
            UploadMode::Document => write!(f, "document"),
        }
    }
}

/// Upload failure. Messages never contain the bot token.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Telegram bot token is not configured")]
    MissingToken,
    #[error("invalid Telegram API URL: {0}")]
    InvalidApiUrl(String),
    #[error("Telegram API error: {0}")]
    Api(String),
    #[error("request to Telegram failed: {0}")]
    Request(String),
}

impl SendError {
    fn from_request(err: RequestError, token: &str) -> Self {
        match err {
            RequestError::Api(api) => SendError::Api(redact(&api.to_string(), token)),
            other => SendError::Request(redact(&other.to_string(), token)),
        }
    }
}

/// Replace every occurrence of `token` in `text`.
fn redact(text: &str, token: &str) -> String {
    if token.is_empty() {
        return text.to_string();
    }
    text.replace(token, REDACTED)
}

/// Numeric chat ids go out as `ChatId`; anything else is a channel username.
pub fn recipient(chat_id: &str) -> Recipient {
    let chat_id = chat_id.trim();
    match chat_id.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) if chat_id.starts_with('@') => Recipient::ChannelUsername(chat_id.to_string()),
        Err(_) => Recipient::ChannelUsername(format!("@{}", chat_id)),
    }
}

/// Bot API upload client for one bot token.
#[derive(Clone)]
pub struct TelegramClient {
    bot: Bot,
    token: String,
}

impl TelegramClient {
    pub fn new(http: reqwest::Client, base_url: &str, token: &str) -> Result<Self, SendError> {
        let token = token.trim().to_string();
        let api_url = reqwest::Url::parse(base_url)
            .map_err(|e| SendError::InvalidApiUrl(format!("{}: {}", base_url, e)))?;
        let bot = Bot::with_client(token.clone(), http).set_api_url(api_url);
        Ok(Self { bot, token })
    }

    pub fn is_configured(&self) -> bool {
        !self.token.is_empty() && self.token != PLACEHOLDER_TOKEN
    }

    /// Upload one payload to `chat_id`.
    pub async fn send(
        &self,
        chat_id: &str,
        payload: ImagePayload,
        mode: UploadMode,
    ) -> Result<(), SendError> {
        if !self.is_configured() {
            return Err(SendError::MissingToken);
        }

        let file_name = payload.file_name.clone();
        debug!(
            "Uploading {} ({} bytes) to chat {} via {}",
            file_name,
            payload.len(),
            chat_id,
            mode.method()
        );

        let file = InputFile::memory(payload.bytes).file_name(file_name.clone());
        let to = recipient(chat_id);
        let result = match mode {
            UploadMode::Photo => self.bot.send_photo(to, file).await,
            UploadMode::Document => self.bot.send_document(to, file).await,
        };
        let message = result.map_err(|e| SendError::from_request(e, &self.token))?;
        debug!("Telegram accepted {} as message {}", file_name, message.id.0);

        info!(
            "File '{}' sent to Telegram (chat {}) as {}",
            file_name,
            chat_id,
            mode.method()
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Minimal `sendPhoto`/`sendDocument` success body.
    pub(crate) fn message_response() -> serde_json::Value {
        json!({
            "ok": true,
            "result": {
                "message_id": 1,
                "date": 1700000000,
                "chat": {"id": 111, "type": "private", "first_name": "Test"},
                "from": {"id": 42, "is_bot": true, "first_name": "tgsender"},
                "text": "ok"
            }
        })
    }

    fn payload() -> ImagePayload {
        ImagePayload::new(vec![1, 2, 3, 4], "0001-somelora_resized.jpg")
    }

    fn client(base_url: &str, token: &str) -> TelegramClient {
        TelegramClient::new(reqwest::Client::new(), base_url, token).unwrap()
    }

    #[test]
    fn test_upload_mode_for_size() {
        assert_eq!(UploadMode::for_size(100, PHOTO_SIZE_CAP), UploadMode::Photo);
        assert_eq!(
            UploadMode::for_size(PHOTO_SIZE_CAP, PHOTO_SIZE_CAP),
            UploadMode::Photo
        );
        assert_eq!(
            UploadMode::for_size(PHOTO_SIZE_CAP + 1, PHOTO_SIZE_CAP),
            UploadMode::Document
        );
    }

    #[test]
    fn test_placeholder_token_is_not_configured() {
        assert!(!client(DEFAULT_API_BASE_URL, PLACEHOLDER_TOKEN).is_configured());
        assert!(!client(DEFAULT_API_BASE_URL, "  ").is_configured());
        assert!(client(DEFAULT_API_BASE_URL, "123:abc").is_configured());
    }

    #[test]
    fn test_invalid_api_url() {
        let result = TelegramClient::new(reqwest::Client::new(), "not a url", "123:abc");
        assert!(matches!(result, Err(SendError::InvalidApiUrl(_))));
    }

    #[test]
    fn test_recipient_from_chat_id() {
        assert!(matches!(recipient("111"), Recipient::Id(ChatId(111))));
        assert!(matches!(
            recipient(" -1001234567890 "),
            Recipient::Id(ChatId(-1001234567890))
        ));
        match recipient("@my_channel") {
            Recipient::ChannelUsername(name) => assert_eq!(name, "@my_channel"),
            other => panic!("unexpected recipient: {other:?}"),
        }
        match recipient("my_channel") {
            Recipient::ChannelUsername(name) => assert_eq!(name, "@my_channel"),
            other => panic!("unexpected recipient: {other:?}"),
        }
    }

    #[test]
    fn test_redact_token() {
        assert_eq!(
            redact("url (http://x/bot1:SECRET/sendPhoto)", "1:SECRET"),
            "url (http://x/bot<redacted>/sendPhoto)"
        );
        assert_eq!(redact("no token here", ""), "no token here");
    }

    #[tokio::test]
    async fn test_send_photo_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"(?i)^/bot123:abc/sendphoto$"))
            .and(body_string_contains("name=\"chat_id\""))
            .and(body_string_contains("name=\"photo\""))
            .and(body_string_contains("0001-somelora_resized.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_json(message_response()))
            .expect(1)
            .mount(&server)
            .await;

        client(&server.uri(), "123:abc")
            .send("111", payload(), UploadMode::Photo)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_document_uses_document_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"(?i)^/bot123:abc/senddocument$"))
            .and(body_string_contains("name=\"document\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(message_response()))
            .expect(1)
            .mount(&server)
            .await;

        client(&server.uri(), "123:abc")
            .send("-100222", payload(), UploadMode::Document)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_reports_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let err = client(&server.uri(), "123:abc")
            .send("999", payload(), UploadMode::Photo)
            .await
            .unwrap_err();
        match err {
            SendError::Api(description) => assert!(description.contains("chat not found")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_send_reports_unparseable_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let err = client(&server.uri(), "123:abc")
            .send("111", payload(), UploadMode::Photo)
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Request(_)));
    }

    #[tokio::test]
    async fn test_network_error_does_not_leak_token() {
        let err = client("http://127.0.0.1:1", "123456:SECRET_TOKEN")
            .send("111", payload(), UploadMode::Photo)
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Request(_)));

        let logged = format!("Error sending x to chat 111: {}", err);
        assert!(!logged.contains("SECRET_TOKEN"), "{logged}");
        assert!(!format!("{err:?}").contains("SECRET_TOKEN"));
    }

    #[tokio::test]
    async fn test_unconfigured_token_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client(&server.uri(), PLACEHOLDER_TOKEN)
            .send("111", payload(), UploadMode::Photo)
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::MissingToken));
    }
}
