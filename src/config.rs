use crate::error::Error;
use crate::settings::ChannelKind;
use chrono::{NaiveDate, Utc};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub type Shared = Arc<Config>;
pub type SharedConfig = Shared;

const DEFAULT_CONFIG_DIR: &str = "/config";
const DEFAULT_CERTS_DIR: &str = "/certs";
const DEFAULT_LOGS_DIR: &str = "/logs";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_API_TIMEOUT_SECS: u64 = 600;

/// Application log files are `<logs>/domaincrab.YYYY-MM-DD.log`, one per UTC day.
pub const LOG_FILE_PREFIX: &str = "domaincrab";
pub const LOG_FILE_SUFFIX: &str = "log";
/// Rotated application log files kept on disk, the current one included.
pub const MAX_LOG_FILES: usize = 5;

pub const DEFAULT_IP_PROVIDERS: [&str; 3] = [
    "https://api.ipify.org",
    "https://icanhazip.com",
    "https://ipinfo.io/ip",
];

/// Environment variables whose value is a notification channel URL. A set variable both
/// provides the URL and force-enables the channel.
pub const ENV_CHANNEL_URLS: [(&str, ChannelKind); 6] = [
    ("DISCORD_WEBHOOK_URL", ChannelKind::Discord),
    ("SLACK_WEBHOOK_URL", ChannelKind::Slack),
    ("TELEGRAM_URL", ChannelKind::Telegram),
    ("MSTEAMS_WEBHOOK_URL", ChannelKind::MsTeams),
    ("PUSHOVER_URL", ChannelKind::Pushover),
    ("GCHAT_WEBHOOK_URL", ChannelKind::GChat),
];

/// The DNS provider selected with the `PROVIDER` environment variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Route53,
    Rfc2136,
    Demo,
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" => Err(Error::MissingProvider),
            "route53" => Ok(Provider::Route53),
            "rfc2136" => Ok(Provider::Rfc2136),
            "demo" => Ok(Provider::Demo),
            other => Err(Error::UnknownProvider(other.to_string())),
        }
    }
}

/// The three mounted volumes.
#[derive(Debug, Clone)]
pub struct Paths {
    pub config_dir: PathBuf,
    pub certs_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl Paths {
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    pub fn state_file(&self) -> PathBuf {
        self.config_dir.join("app_state.json")
    }

    pub fn prefs_file(&self) -> PathBuf {
        self.config_dir.join("ui_prefs.json")
    }

    /// The application log file being written today.
    pub fn log_file(&self) -> PathBuf {
        self.log_file_on(Utc::now().date_naive())
    }

    pub fn log_file_on(&self, day: NaiveDate) -> PathBuf {
        self.logs_dir.join(format!(
            "{LOG_FILE_PREFIX}.{}.{LOG_FILE_SUFFIX}",
            day.format("%Y-%m-%d")
        ))
    }
}

#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"********")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Rfc2136Config {
    pub server: SocketAddr,
    pub zones: Vec<String>,
    pub credentials: PathBuf,
}

/// Secrets that only ever come from the environment and are overlaid onto the
/// [`Settings`][crate::settings::Settings] after every load or save.
#[derive(Debug, Clone, Default)]
pub struct EnvSecrets {
    pub smtp_user: Option<String>,
    pub smtp_pass: Option<String>,
    pub channel_urls: Vec<(ChannelKind, String)>,
}

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: Provider,
    pub paths: Paths,
    pub bind_addr: SocketAddr,
    pub api_timeout: Duration,
    pub aws: Option<AwsCredentials>,
    pub rfc2136: Option<Rfc2136Config>,
    pub certbot_bin: String,
    pub ip_providers: Vec<String>,
    pub run_as: Option<String>,
    pub secrets: EnvSecrets,
}

impl Config {
    /// Build a [`Config`] from the process environment.
    ///
    /// # Errors
    ///
    /// See [`Config::from_lookup`].
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a [`Config`] from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingProvider`] or [`Error::UnknownProvider`] for a bad `PROVIDER`,
    /// [`Error::MissingCredentials`] when the chosen provider lacks its credentials and
    /// [`Error::InvalidEnv`] when an address or number can't be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider: Provider = var("PROVIDER").unwrap_or_default().parse()?;

        let paths = Paths {
            config_dir: var("CONFIG_DIR").unwrap_or(DEFAULT_CONFIG_DIR.into()).into(),
            certs_dir: var("CERTS_DIR").unwrap_or(DEFAULT_CERTS_DIR.into()).into(),
            logs_dir: var("LOGS_DIR").unwrap_or(DEFAULT_LOGS_DIR.into()).into(),
        };

        let bind = var("BIND_ADDR").unwrap_or(DEFAULT_BIND_ADDR.into());
        let bind_addr = bind.parse().map_err(|_| Error::InvalidEnv {
            name: "BIND_ADDR",
            value: bind.clone(),
        })?;

        let api_timeout = match var("API_TIMEOUT_SECS") {
            None => Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
            Some(raw) => Duration::from_secs(raw.trim().parse().map_err(|_| Error::InvalidEnv {
                name: "API_TIMEOUT_SECS",
                value: raw.clone(),
            })?),
        };

        let aws = match provider {
            Provider::Route53 => Some(AwsCredentials {
                access_key_id: var("AWS_ACCESS_KEY_ID")
                    .or_else(|| var("USERNAME"))
                    .ok_or(Error::MissingCredentials("AWS_ACCESS_KEY_ID"))?,
                secret_access_key: var("AWS_SECRET_ACCESS_KEY")
                    .or_else(|| var("PASSWORD"))
                    .ok_or(Error::MissingCredentials("AWS_SECRET_ACCESS_KEY"))?,
            }),
            _ => None,
        };

        let rfc2136 = match provider {
            Provider::Rfc2136 => {
                let raw = var("RFC2136_SERVER").ok_or(Error::MissingCredentials("RFC2136_SERVER"))?;
                let server = raw.parse().map_err(|_| Error::InvalidEnv {
                    name: "RFC2136_SERVER",
                    value: raw.clone(),
                })?;
                Some(Rfc2136Config {
                    server,
                    zones: split_list(var("RFC2136_ZONES").as_deref()),
                    credentials: var("RFC2136_CREDENTIALS")
                        .map_or_else(|| paths.config_dir.join("rfc2136.ini"), PathBuf::from),
                })
            }
            _ => None,
        };

        let ip_providers = match split_list(var("IP_PROVIDERS").as_deref()) {
            providers if providers.is_empty() => {
                DEFAULT_IP_PROVIDERS.iter().map(ToString::to_string).collect()
            }
            providers => providers,
        };

        let secrets = EnvSecrets {
            smtp_user: var("SMTP_USER"),
            smtp_pass: var("SMTP_PASS"),
            channel_urls: ENV_CHANNEL_URLS
                .iter()
                .filter_map(|(key, kind)| var(key).map(|url| (*kind, url)))
                .collect(),
        };

        Ok(Config {
            provider,
            paths,
            bind_addr,
            api_timeout,
            aws,
            rfc2136,
            certbot_bin: var("CERTBOT_BIN").unwrap_or("certbot".into()),
            ip_providers,
            run_as: var("RUN_AS_USER"),
            secrets,
        })
    }

    pub fn demo_mode(&self) -> bool {
        self.provider == Provider::Demo
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(ToString::to_string)
            .collect()
    })
    .unwrap_or_default()
}
