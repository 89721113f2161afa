//! User-editable settings (`settings.json`).
//!
//! Settings are loaded once at startup and replaced through the
//! [settings API][crate::api#apisettings-get-put]. Secrets supplied through the environment
//! ([`EnvSecrets`]) are overlaid on top of whatever was loaded or saved, and are never written
//! back to disk unless the user typed them in themselves.

use crate::config::{Config, EnvSecrets};
use crate::error::Error;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// Placeholder returned in place of secrets by [`Settings::redacted`].
pub const REDACTED: &str = "********";

const FALLBACK_CONTACT_EMAIL: &str = "admin@example.com";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Smtp,
    Discord,
    Slack,
    Telegram,
    MsTeams,
    Pushover,
    GChat,
}

impl ChannelKind {
    pub const URL_CHANNELS: [ChannelKind; 6] = [
        ChannelKind::Discord,
        ChannelKind::Slack,
        ChannelKind::Telegram,
        ChannelKind::MsTeams,
        ChannelKind::Pushover,
        ChannelKind::GChat,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Smtp => "smtp",
            ChannelKind::Discord => "discord",
            ChannelKind::Slack => "slack",
            ChannelKind::Telegram => "telegram",
            ChannelKind::MsTeams => "msteams",
            ChannelKind::Pushover => "pushover",
            ChannelKind::GChat => "gchat",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CertManagement {
    pub enabled: bool,
    pub check_time: String,
}

impl Default for CertManagement {
    fn default() -> Self {
        Self {
            enabled: true,
            check_time: "02:30".into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct SslSettings {
    pub enabled: bool,
    pub wildcard: bool,
}

/// Per-domain alerting: either a plain flag, or a list of channel names that both enables
/// alerts (when non-empty) and restricts them to the listed channels.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum DomainNotifications {
    Flag(bool),
    Channels(Vec<String>),
}

impl Default for DomainNotifications {
    fn default() -> Self {
        DomainNotifications::Flag(true)
    }
}

impl DomainNotifications {
    pub fn enabled(&self) -> bool {
        match self {
            DomainNotifications::Flag(enabled) => *enabled,
            DomainNotifications::Channels(channels) => !channels.is_empty(),
        }
    }

    pub fn allows(&self, kind: ChannelKind) -> bool {
        match self {
            DomainNotifications::Flag(enabled) => *enabled,
            DomainNotifications::Channels(channels) => channels
                .iter()
                .any(|c| c.trim().eq_ignore_ascii_case(kind.as_str())),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DomainSettings {
    pub name: String,
    #[serde(default)]
    pub ddns: bool,
    #[serde(default)]
    pub ssl: SslSettings,
    #[serde(default)]
    pub notifications: DomainNotifications,
    #[serde(default = "default_true")]
    pub auto_update: bool,
}

#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SmtpSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub from_email: String,
    pub to_email: String,
    pub user: Option<String>,
    pub pass: Option<String>,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: 587,
            from_email: String::new(),
            to_email: String::new(),
            user: None,
            pass: None,
        }
    }
}

#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct UrlChannelSettings {
    pub enabled: bool,
    pub url: Option<String>,
}

#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub smtp: Option<SmtpSettings>,
    pub discord: Option<UrlChannelSettings>,
    pub slack: Option<UrlChannelSettings>,
    pub telegram: Option<UrlChannelSettings>,
    pub msteams: Option<UrlChannelSettings>,
    pub pushover: Option<UrlChannelSettings>,
    pub gchat: Option<UrlChannelSettings>,
}

impl NotificationSettings {
    pub fn url_channel(&self, kind: ChannelKind) -> Option<&UrlChannelSettings> {
        match kind {
            ChannelKind::Smtp => None,
            ChannelKind::Discord => self.discord.as_ref(),
            ChannelKind::Slack => self.slack.as_ref(),
            ChannelKind::Telegram => self.telegram.as_ref(),
            ChannelKind::MsTeams => self.msteams.as_ref(),
            ChannelKind::Pushover => self.pushover.as_ref(),
            ChannelKind::GChat => self.gchat.as_ref(),
        }
    }

    fn url_channel_slot(&mut self, kind: ChannelKind) -> Option<&mut Option<UrlChannelSettings>> {
        match kind {
            ChannelKind::Smtp => None,
            ChannelKind::Discord => Some(&mut self.discord),
            ChannelKind::Slack => Some(&mut self.slack),
            ChannelKind::Telegram => Some(&mut self.telegram),
            ChannelKind::MsTeams => Some(&mut self.msteams),
            ChannelKind::Pushover => Some(&mut self.pushover),
            ChannelKind::GChat => Some(&mut self.gchat),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub timezone: String,
    pub ip_check_interval: String,
    pub log_retention: String,
    pub cert_management: CertManagement,
    pub domains: Vec<DomainSettings>,
    pub notifications: NotificationSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timezone: "UTC".into(),
            ip_check_interval: "5m".into(),
            log_retention: "3 months".into(),
            cert_management: CertManagement::default(),
            domains: vec![],
            notifications: NotificationSettings::default(),
        }
    }
}

impl Settings {
    /// Editable starting point for demo mode.
    pub fn demo() -> Self {
        let demo_domain = |name: &str, ssl: bool, wildcard: bool, channels: &[&str]| DomainSettings {
            name: name.into(),
            ddns: true,
            ssl: SslSettings {
                enabled: ssl,
                wildcard,
            },
            notifications: DomainNotifications::Channels(
                channels.iter().map(ToString::to_string).collect(),
            ),
            auto_update: true,
        };
        Self {
            timezone: "America/New_York".into(),
            domains: vec![
                demo_domain("demo-server.com", true, true, &["discord", "smtp"]),
                demo_domain("backup-server.org", true, true, &["discord", "smtp"]),
                demo_domain("test-server.xyz", false, false, &["discord", "smtp"]),
                demo_domain("my-blog.net", true, false, &[]),
            ],
            notifications: NotificationSettings {
                enabled: true,
                discord: Some(UrlChannelSettings {
                    enabled: true,
                    url: Some("https://discord.com/api/webhooks/fake".into()),
                }),
                smtp: Some(SmtpSettings {
                    enabled: true,
                    host: "smtp.demo.mail".into(),
                    port: 587,
                    from_email: "admin@demo.com".into(),
                    to_email: "user@demo.com".into(),
                    user: Some("demo".into()),
                    pass: Some("demo".into()),
                }),
                ..NotificationSettings::default()
            },
            ..Settings::default()
        }
    }

    /// The configured timezone, or UTC when the name is unknown.
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or_else(|_| {
            tracing::warn!("unknown timezone '{}', defaulting to UTC", self.timezone);
            Tz::UTC
        })
    }

    pub fn domain(&self, name: &str) -> Option<&DomainSettings> {
        self.domains.iter().find(|d| d.name == name)
    }

    /// Whether state changes for `domain` should be announced: notifications must be enabled
    /// both globally and for the domain.
    pub fn send_alerts(&self, domain: &DomainSettings) -> bool {
        self.notifications.enabled && domain.notifications.enabled()
    }

    /// The ACME account contact address: the first SMTP recipient if any.
    pub fn contact_email(&self) -> String {
        self.notifications
            .smtp
            .as_ref()
            .and_then(|smtp| smtp.to_email.split(',').map(str::trim).find(|e| !e.is_empty()))
            .unwrap_or(FALLBACK_CONTACT_EMAIL)
            .to_string()
    }

    /// Check that every domain is a valid, unique hostname.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDomainName`] or [`Error::DuplicateDomain`].
    pub fn validate(&self) -> Result<(), Error> {
        let mut seen = HashSet::new();
        for domain in &self.domains {
            if !valid_hostname(&domain.name) {
                return Err(Error::InvalidDomainName(domain.name.clone()));
            }
            if !seen.insert(domain.name.to_lowercase()) {
                return Err(Error::DuplicateDomain(domain.name.clone()));
            }
        }
        Ok(())
    }

    pub fn overlay_secrets(&mut self, secrets: &EnvSecrets) {
        if let Some(user) = &secrets.smtp_user {
            self.notifications.smtp.get_or_insert_with(SmtpSettings::default).user = Some(user.clone());
        }
        if let Some(pass) = &secrets.smtp_pass {
            self.notifications.smtp.get_or_insert_with(SmtpSettings::default).pass = Some(pass.clone());
        }
        for (kind, url) in &secrets.channel_urls {
            if let Some(slot) = self.notifications.url_channel_slot(*kind) {
                let channel = slot.get_or_insert_with(UrlChannelSettings::default);
                channel.url = Some(url.clone());
                channel.enabled = true;
            }
        }
    }

    /// A copy safe to hand to clients: passwords and channel URLs are replaced by
    /// [`REDACTED`].
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let Some(smtp) = copy.notifications.smtp.as_mut() {
            if smtp.pass.is_some() {
                smtp.pass = Some(REDACTED.into());
            }
        }
        for kind in ChannelKind::URL_CHANNELS {
            if let Some(Some(channel)) = copy.notifications.url_channel_slot(kind) {
                if channel.url.is_some() {
                    channel.url = Some(REDACTED.into());
                }
            }
        }
        copy
    }

    /// Replace [`REDACTED`] placeholders echoed back by a client with the values from `stored`.
    fn restore_redacted(&mut self, stored: &Settings) {
        if let Some(smtp) = self.notifications.smtp.as_mut() {
            if smtp.pass.as_deref() == Some(REDACTED) {
                smtp.pass = stored.notifications.smtp.as_ref().and_then(|s| s.pass.clone());
            }
        }
        for kind in ChannelKind::URL_CHANNELS {
            let previous = stored
                .notifications
                .url_channel(kind)
                .and_then(|c| c.url.clone());
            if let Some(Some(channel)) = self.notifications.url_channel_slot(kind) {
                if channel.url.as_deref() == Some(REDACTED) {
                    channel.url = previous;
                }
            }
        }
    }

    /// Undo [`Settings::overlay_secrets`] on settings a client sent back: values equal to an
    /// environment secret revert to what `stored` holds, so they never reach the settings file.
    fn strip_env_secrets(&mut self, secrets: &EnvSecrets, stored: &Settings) {
        let stored_smtp = stored.notifications.smtp.as_ref();
        if let Some(smtp) = self.notifications.smtp.as_mut() {
            if secrets.smtp_user.is_some() && smtp.user == secrets.smtp_user {
                smtp.user = stored_smtp.and_then(|s| s.user.clone());
            }
            if secrets.smtp_pass.is_some() && smtp.pass == secrets.smtp_pass {
                smtp.pass = stored_smtp.and_then(|s| s.pass.clone());
            }
        }
        for (kind, url) in &secrets.channel_urls {
            let previous = stored.notifications.url_channel(*kind).and_then(|c| c.url.clone());
            if let Some(Some(channel)) = self.notifications.url_channel_slot(*kind) {
                if channel.url.as_ref() == Some(url) {
                    channel.url = previous;
                }
            }
        }
    }
}

fn valid_hostname(name: &str) -> bool {
    let name = name.strip_suffix('.').unwrap_or(name);
    !name.is_empty()
        && name.len() <= 253
        && name.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

pub type SharedSettings = Arc<SettingsStore>;

struct Inner {
    /// Settings as loaded/saved, without environment secrets.
    stored: Settings,
    /// `stored` with [`EnvSecrets`] overlaid. This is what the rest of the app sees.
    effective: Settings,
}

/// Holds the live [`Settings`]. Backed by a JSON file, or by memory only in demo mode.
pub struct SettingsStore {
    path: Option<PathBuf>,
    secrets: EnvSecrets,
    inner: RwLock<Inner>,
}

impl SettingsStore {
    /// Load settings for the given runtime configuration. Never fails: a missing or corrupt
    /// settings file yields the defaults.
    pub async fn load(config: &Config) -> Self {
        if config.demo_mode() {
            tracing::info!("DEMO MODE ENABLED (via PROVIDER=demo)");
            return Self::in_memory(Settings::demo(), config.secrets.clone());
        }

        let path = config.paths.settings_file();
        let stored = match tokio::fs::read(&path).await {
            Ok(contents) => serde_json::from_slice(&contents).unwrap_or_else(|err| {
                tracing::error!("error parsing {}: {err}. Loading defaults.", path.display());
                Settings::default()
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Settings::default(),
            Err(err) => {
                tracing::error!("error reading {}: {err}. Loading defaults.", path.display());
                Settings::default()
            }
        };
        Self::new(Some(path), stored, config.secrets.clone())
    }

    /// A store that never touches the disk.
    pub fn in_memory(settings: Settings, secrets: EnvSecrets) -> Self {
        Self::new(None, settings, secrets)
    }

    fn new(path: Option<PathBuf>, stored: Settings, secrets: EnvSecrets) -> Self {
        let mut effective = stored.clone();
        effective.overlay_secrets(&secrets);
        Self {
            path,
            secrets,
            inner: RwLock::new(Inner { stored, effective }),
        }
    }

    pub async fn snapshot(&self) -> Settings {
        self.inner.read().await.effective.clone()
    }

    /// Validate and apply new settings, writing them to disk unless in demo mode. Returns the
    /// effective settings.
    ///
    /// # Errors
    ///
    /// Returns a validation error from [`Settings::validate`], [`Error::InvalidJSON`] if the
    /// settings can't be serialized or [`Error::IO`] if the file can't be written. On error the
    /// previous settings stay active.
    pub async fn save(&self, mut new_settings: Settings) -> Result<Settings, Error> {
        new_settings.validate()?;
        let mut inner = self.inner.write().await;
        new_settings.restore_redacted(&inner.stored);
        new_settings.strip_env_secrets(&self.secrets, &inner.stored);

        match &self.path {
            None => tracing::info!("DEMO MODE: updating in-memory settings only"),
            Some(path) => {
                let data = serde_json::to_string_pretty(&new_settings)?;
                let mut output_file = File::create(path).await?;
                output_file.write_all(data.as_bytes()).await?;
                output_file.flush().await?;
            }
        }

        let mut effective = new_settings.clone();
        effective.overlay_secrets(&self.secrets);
        inner.stored = new_settings;
        inner.effective = effective.clone();
        Ok(effective)
    }
}
