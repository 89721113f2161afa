use crate::error::Error;
use crate::notify::Channel;
use crate::settings::ChannelKind;
use serde_json::{json, Map, Value};
use std::time::Duration;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const DISCORD_MAX_CONTENT: usize = 2000;

pub(super) fn client() -> Result<reqwest::Client, Error> {
    Ok(reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?)
}

/// Posts JSON to a chat service webhook.
///
/// Besides plain `https://` (or `http://`) webhook URLs, the short service URLs popularised by
/// Apprise are accepted and translated to the service's API endpoint:
///
/// | kind     | short form                  |
/// |----------|-----------------------------|
/// | discord  | `discord://id/token`        |
/// | slack    | `slack://A/B/C`             |
/// | telegram | `tgram://bot_token/chat_id` |
/// | pushover | `pover://user@token`        |
/// | gchat    | `gchat://space/key/token`   |
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    kind: ChannelKind,
    endpoint: String,
    fields: Map<String, Value>,
    client: reqwest::Client,
}

impl WebhookChannel {
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedNotificationUrl`] when `url` is neither a web URL nor the
    /// short form for `kind`.
    pub fn new(kind: ChannelKind, url: &str, client: reqwest::Client) -> Result<Self, Error> {
        let (endpoint, fields) = translate(kind, url)?;
        Ok(Self {
            kind,
            endpoint,
            fields,
            client,
        })
    }

    fn payload(&self, subject: &str, body: &str) -> Value {
        let mut payload = self.fields.clone();
        let text = format!("{subject}\n\n{body}");
        match self.kind {
            ChannelKind::Discord => {
                payload.insert("content".into(), truncate(&text, DISCORD_MAX_CONTENT).into());
            }
            ChannelKind::Pushover => {
                payload.insert("title".into(), subject.into());
                payload.insert("message".into(), body.into());
            }
            _ => {
                payload.insert("text".into(), text.into());
            }
        }
        Value::Object(payload)
    }
}

#[async_trait::async_trait]
impl Channel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(&self, subject: &str, body: &str) -> Result<(), Error> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&self.payload(subject, body))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(Error::Notification(format!("{} answered {status}: {text}", self.kind)))
        }
    }
}

fn translate(kind: ChannelKind, url: &str) -> Result<(String, Map<String, Value>), Error> {
    let unsupported = || Error::UnsupportedNotificationUrl(kind.as_str());
    let (scheme, rest) = url.split_once("://").ok_or_else(unsupported)?;
    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
    let mut fields = Map::new();

    let endpoint = match (kind, scheme.to_ascii_lowercase().as_str(), &segments[..]) {
        (_, "https" | "http", _) => url.to_string(),
        (ChannelKind::Discord, "discord", [id, token]) => {
            format!("https://discord.com/api/webhooks/{id}/{token}")
        }
        (ChannelKind::Slack, "slack", [a, b, c]) => {
            format!("https://hooks.slack.com/services/{a}/{b}/{c}")
        }
        (ChannelKind::Telegram, "tgram", [token, chat_id]) => {
            fields.insert("chat_id".into(), json!(chat_id));
            format!("https://api.telegram.org/bot{token}/sendMessage")
        }
        (ChannelKind::Pushover, "pover", [credentials]) => {
            let (user, token) = credentials.split_once('@').ok_or_else(unsupported)?;
            fields.insert("user".into(), json!(user));
            fields.insert("token".into(), json!(token));
            "https://api.pushover.net/1/messages.json".to_string()
        }
        (ChannelKind::GChat, "gchat", [space, key, token]) => format!(
            "https://chat.googleapis.com/v1/spaces/{space}/messages?key={}&token={}",
            urlencoding::encode(key),
            urlencoding::encode(token)
        ),
        _ => return Err(unsupported()),
    };
    Ok((endpoint, fields))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
