//! Outbound notifications.
//!
//! A [`Notifier`] fans a subject and body out to every configured [`Channel`]: e-mail through
//! [SMTP][smtp::SmtpChannel] and chat services through [webhooks][webhook::WebhookChannel].
//! Delivery is best-effort: a send succeeds when at least one channel accepts the message, and
//! individual channel failures are only logged.

use crate::error::Error;
use crate::settings::{ChannelKind, DomainNotifications, NotificationSettings};
use std::sync::Arc;

pub mod smtp;
pub mod webhook;

pub use smtp::SmtpChannel;
pub use webhook::WebhookChannel;

const TEST_SUBJECT: &str = "Test Notification";
const TEST_BODY: &str = "This is a test notification from Domain Manager.\n\nIf you received this, your notification settings are correct.";

pub type DynChannel = Arc<dyn Channel + Send + Sync>;

/// A single destination for notifications.
#[async_trait::async_trait]
pub trait Channel {
    fn kind(&self) -> ChannelKind;

    /// Deliver one message.
    async fn send(&self, subject: &str, body: &str) -> Result<(), Error>;
}

/// Result of a [`Notifier::send`], suitable for showing to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub success: bool,
    pub message: String,
}

impl SendOutcome {
    fn new(success: bool, message: impl Into<String>) -> Self {
        Self {
            success,
            message: message.into(),
        }
    }
}

#[derive(Default)]
pub struct Notifier {
    channels: Vec<DynChannel>,
}

impl Notifier {
    /// A notifier that drops everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// A notifier over explicit channels. With no channels it behaves as [`Notifier::disabled`].
    pub fn new(channels: Vec<DynChannel>) -> Self {
        Self { channels }
    }

    /// Build the channels described by the notification settings. Channels that are
    /// misconfigured are logged and left out.
    pub fn from_settings(settings: &NotificationSettings) -> Self {
        if !settings.enabled {
            tracing::info!("notifications are globally disabled");
            return Self::disabled();
        }
        tracing::info!("initializing notification services...");

        let mut channels: Vec<DynChannel> = vec![];
        if let Some(smtp) = settings.smtp.as_ref().filter(|smtp| smtp.enabled) {
            match SmtpChannel::new(smtp) {
                Ok(channel) => {
                    tracing::info!("SMTP notifier added for {}", smtp.host);
                    channels.push(Arc::new(channel));
                }
                Err(err) => tracing::error!("failed to add SMTP notifier: {err}"),
            }
        }

        let client = match webhook::client() {
            Ok(client) => Some(client),
            Err(err) => {
                tracing::error!("failed to build webhook client: {err}");
                None
            }
        };
        for kind in ChannelKind::URL_CHANNELS {
            let Some(config) = settings.url_channel(kind).filter(|c| c.enabled) else {
                continue;
            };
            let url = config.url.as_deref().map(str::trim).unwrap_or_default();
            if url.is_empty() {
                tracing::warn!("{kind} is enabled but its URL is not set");
                continue;
            }
            let Some(client) = client.clone() else {
                continue;
            };
            match WebhookChannel::new(kind, url, client) {
                Ok(channel) => {
                    tracing::info!("{kind} notifier added");
                    channels.push(Arc::new(channel));
                }
                Err(err) => tracing::error!("failed to add {kind} notifier: {err}"),
            }
        }

        if channels.is_empty() {
            tracing::warn!(
                "notifications are enabled, but no valid notifiers were successfully configured"
            );
        }
        Self::new(channels)
    }

    /// Like [`Notifier::from_settings`], but every enabled channel only logs what it would send.
    pub fn demo(settings: &NotificationSettings) -> Self {
        if !settings.enabled {
            return Self::disabled();
        }
        let mut channels: Vec<DynChannel> = vec![];
        if settings.smtp.as_ref().is_some_and(|smtp| smtp.enabled) {
            channels.push(Arc::new(LogChannel(ChannelKind::Smtp)));
        }
        for kind in ChannelKind::URL_CHANNELS {
            if settings.url_channel(kind).is_some_and(|c| c.enabled) {
                channels.push(Arc::new(LogChannel(kind)));
            }
        }
        Self::new(channels)
    }

    /// Whether any channel is configured.
    pub fn enabled(&self) -> bool {
        !self.channels.is_empty()
    }

    /// Send to every channel, or only the channels a domain asked for when `filter` is given.
    pub async fn send(
        &self,
        subject: &str,
        body: &str,
        filter: Option<&DomainNotifications>,
    ) -> SendOutcome {
        if !self.enabled() {
            return SendOutcome::new(true, "Notifications are disabled.");
        }

        let selected: Vec<&DynChannel> = self
            .channels
            .iter()
            .filter(|channel| filter.map_or(true, |f| f.allows(channel.kind())))
            .collect();
        if selected.is_empty() {
            tracing::info!("no notification channel selected for '{subject}'");
            return SendOutcome::new(true, "No notification channel selected.");
        }

        let mut delivered = 0;
        for channel in selected {
            match channel.send(subject, body).await {
                Ok(()) => delivered += 1,
                Err(err) => tracing::error!("{} notification failed: {err}", channel.kind()),
            }
        }

        if delivered > 0 {
            tracing::info!("notification sent successfully to {delivered} service(s)");
            SendOutcome::new(true, "Notification sent.")
        } else {
            tracing::error!("all notification services failed");
            SendOutcome::new(false, "All notification services failed.")
        }
    }

    pub async fn send_test(&self) -> SendOutcome {
        tracing::info!("sending test notification...");
        self.send(TEST_SUBJECT, TEST_BODY, None).await
    }
}

/// Stands in for a real channel in demo mode.
struct LogChannel(ChannelKind);

#[async_trait::async_trait]
impl Channel for LogChannel {
    fn kind(&self) -> ChannelKind {
        self.0
    }

    async fn send(&self, subject: &str, _body: &str) -> Result<(), Error> {
        tracing::info!("DEMO MODE: {} notification '{subject}' not sent", self.0);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::settings::{SmtpSettings, UrlChannelSettings};
    use std::sync::Mutex;

    /// Records what it is asked to send.
    pub(crate) struct Recorder {
        kind: ChannelKind,
        fail: bool,
        pub(crate) sent: Mutex<Vec<(String, String)>>,
    }

    impl Recorder {
        pub(crate) fn new(kind: ChannelKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                fail: false,
                sent: Mutex::default(),
            })
        }

        pub(crate) fn failing(kind: ChannelKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                fail: true,
                sent: Mutex::default(),
            })
        }

        pub(crate) fn subjects(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
        }
    }

    #[async_trait::async_trait]
    impl Channel for Recorder {
        fn kind(&self) -> ChannelKind {
            self.kind
        }

        async fn send(&self, subject: &str, body: &str) -> Result<(), Error> {
            self.sent
                .lock()
                .unwrap()
                .push((subject.to_string(), body.to_string()));
            if self.fail {
                Err(Error::Notification("refused".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn disabled_sends_succeed_silently() {
        let outcome = Notifier::disabled().send("s", "b", None).await;
        assert_eq!(outcome, SendOutcome::new(true, "Notifications are disabled."));
    }

    #[tokio::test]
    async fn one_successful_channel_is_enough() {
        let ok = Recorder::new(ChannelKind::Discord);
        let broken = Recorder::failing(ChannelKind::Smtp);
        let notifier = Notifier::new(vec![broken.clone() as DynChannel, ok.clone()]);
        assert!(notifier.send_test().await.success);
        assert_eq!(ok.subjects(), vec!["Test Notification"]);
        assert_eq!(broken.subjects(), vec!["Test Notification"]);

        let notifier = Notifier::new(vec![broken as DynChannel]);
        assert_eq!(
            notifier.send("s", "b", None).await,
            SendOutcome::new(false, "All notification services failed.")
        );
    }

    #[tokio::test]
    async fn domain_channel_filter() {
        let discord = Recorder::new(ChannelKind::Discord);
        let smtp = Recorder::new(ChannelKind::Smtp);
        let notifier = Notifier::new(vec![discord.clone() as DynChannel, smtp.clone()]);

        let only_email = DomainNotifications::Channels(vec!["SMTP".into()]);
        notifier.send("a", "b", Some(&only_email)).await;
        notifier
            .send("c", "d", Some(&DomainNotifications::Flag(true)))
            .await;
        assert_eq!(smtp.subjects(), vec!["a", "c"]);
        assert_eq!(discord.subjects(), vec!["c"]);
    }

    #[test]
    fn from_settings_skips_unusable_channels() {
        let mut settings = NotificationSettings {
            enabled: true,
            discord: Some(UrlChannelSettings {
                enabled: true,
                url: Some(String::new()),
            }),
            slack: Some(UrlChannelSettings {
                enabled: true,
                url: Some("ftp://nope".into()),
            }),
            telegram: Some(UrlChannelSettings {
                enabled: false,
                url: Some("tgram://123:abc/456".into()),
            }),
            smtp: Some(SmtpSettings {
                enabled: true,
                host: String::new(),
                ..SmtpSettings::default()
            }),
            ..NotificationSettings::default()
        };
        assert!(!Notifier::from_settings(&settings).enabled());

        settings.gchat = Some(UrlChannelSettings {
            enabled: true,
            url: Some("gchat://space/key/token".into()),
        });
        assert!(Notifier::from_settings(&settings).enabled());

        settings.enabled = false;
        assert!(!Notifier::from_settings(&settings).enabled());
    }

    #[tokio::test]
    async fn demo_channels_only_log() {
        let settings = crate::settings::Settings::demo();
        let notifier = Notifier::demo(&settings.notifications);
        assert_eq!(notifier.channels.len(), 2);
        assert_eq!(
            notifier.send_test().await,
            SendOutcome::new(true, "Notification sent.")
        );
    }
}
