//! DNS providers for reading and upserting `A` records.
//!
//! # Providers
//!
//! ## `route53`
//!
//! Talks to the [Route 53 REST API][route53-api] directly, signing requests with
//! [AWS Signature Version 4][sigv4]. Credentials come from `AWS_ACCESS_KEY_ID` and
//! `AWS_SECRET_ACCESS_KEY` (or `USERNAME` and `PASSWORD`). The hosted zone for a domain is the
//! longest zone whose name is the domain or a parent of it.
//!
//! Certificates are issued with certbot's `--dns-route53` plugin.
//!
//! ## `rfc2136`
//!
//! Sends [RFC-2136][RFC-2136] dynamic updates to the server in `RFC2136_SERVER`. Updates are
//! not signed: restrict which networks may update the zone on the server side. The zone for a
//! domain is the longest match among `RFC2136_ZONES`, or the domain itself.
//!
//! Certificates are issued with certbot's `--dns-rfc2136` plugin and the credentials file in
//! `RFC2136_CREDENTIALS`.
//!
//! ## `demo`
//!
//! Records live in memory. Nothing leaves the process.
//!
//! [route53-api]: https://docs.aws.amazon.com/Route53/latest/APIReference/Welcome.html
//! [sigv4]: https://docs.aws.amazon.com/IAM/latest/UserGuide/reference_aws-signing.html
//! [RFC-2136]: https://www.rfc-editor.org/rfc/rfc2136

use crate::config::{Config, Provider};
use crate::error::Error;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

pub mod demo;
pub mod rfc2136;
pub mod route53;
mod sigv4;

pub use demo::DemoProvider;
pub use rfc2136::Rfc2136Provider;
pub use route53::Route53Provider;

/// TTL used for every upserted record.
pub const RECORD_TTL: u32 = 300;

/// The current value of a domain's `A` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ARecord {
    Address(Ipv4Addr),
    /// An alias to another name. DDNS never updates these.
    Alias(String),
}

impl fmt::Display for ARecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ARecord::Address(ip) => write!(f, "{ip}"),
            ARecord::Alias(target) => write!(f, "ALIAS: {target}"),
        }
    }
}

#[allow(clippy::module_name_repetitions)]
pub type DynDnsProvider = Arc<dyn DnsProvider + Send + Sync>;

#[async_trait::async_trait]
pub trait DnsProvider {
    /// Check that the provider is reachable and the credentials work.
    async fn verify(&self) -> Result<(), Error>;

    /// Look up the `A` record for `domain`, `None` if there isn't one.
    async fn get_a_record(&self, domain: &str) -> Result<Option<ARecord>, Error>;

    /// Create or replace the `A` record for `domain`.
    async fn update_a_record(&self, domain: &str, ip: Ipv4Addr) -> Result<(), Error>;

    /// The certbot DNS-01 plugin arguments for this provider.
    fn certbot_args(&self) -> Vec<String>;
}

/// Build the provider selected by `config`.
///
/// # Errors
///
/// Returns [`Error::MissingCredentials`] if the provider's settings are absent, or
/// [`Error::Http`] if an HTTP client can't be built.
pub fn from_config(config: &Config) -> Result<DynDnsProvider, Error> {
    Ok(match config.provider {
        Provider::Route53 => {
            let credentials = config
                .aws
                .clone()
                .ok_or(Error::MissingCredentials("AWS_ACCESS_KEY_ID"))?;
            Arc::new(Route53Provider::new(credentials)?)
        }
        Provider::Rfc2136 => {
            let rfc2136 = config
                .rfc2136
                .clone()
                .ok_or(Error::MissingCredentials("RFC2136_SERVER"))?;
            Arc::new(Rfc2136Provider::new(rfc2136))
        }
        Provider::Demo => Arc::new(DemoProvider::default()),
    })
}

/// Pick the zone for `domain`: the longest zone that equals it or is a parent of it on a label
/// boundary. Trailing dots and case are ignored.
pub fn find_zone<'a, I>(domain: &str, zones: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let domain = normalize(domain);
    zones
        .into_iter()
        .filter(|zone| {
            let zone = normalize(zone);
            !zone.is_empty()
                && (domain == zone
                    || domain
                        .strip_suffix(&zone)
                        .is_some_and(|rest| rest.ends_with('.')))
        })
        .max_by_key(|zone| normalize(zone).len())
}

fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}
