//! Error types.

use axum::extract::rejection::JsonRejection;
use trust_dns_client::error::ClientError;
use trust_dns_client::op::ResponseCode;
use trust_dns_proto::error::ProtoError;

/// Error enumerates the possible domaincrab error states.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned at startup when the `PROVIDER` environment variable is unset or empty.
    #[error("the PROVIDER environment variable is missing")]
    MissingProvider,

    /// Returned at startup when `PROVIDER` names a DNS provider we don't support.
    #[error("unknown DNS provider \"{0}\" (expected route53, rfc2136 or demo)")]
    UnknownProvider(String),

    /// Returned at startup when a provider is selected without the credentials it needs.
    #[error("missing credential: {0}")]
    MissingCredentials(&'static str),

    /// Returned when a runtime setting from the environment can't be parsed.
    #[error("invalid value for {name}: \"{value}\"")]
    InvalidEnv { name: &'static str, value: String },

    /// Returned when [`Settings`][crate::settings::Settings] mention a domain that isn't a
    /// syntactically valid hostname. Domain names end up in file paths and certbot arguments.
    #[error("invalid domain name: \"{0}\"")]
    InvalidDomainName(String),

    /// Returned when the same domain is configured twice.
    #[error("domain \"{0}\" is configured more than once")]
    DuplicateDomain(String),

    /// Returned by manual triggers naming a domain that isn't configured.
    #[error("domain \"{0}\" is not configured")]
    UnknownDomain(String),

    /// Returned by a forced IP update for a domain with DDNS turned off.
    #[error("DDNS is not enabled for \"{0}\"")]
    DdnsDisabled(String),

    /// Returned by a forced IP update before any public IP has been observed.
    #[error("the public IP is unknown")]
    PublicIpUnknown,

    /// Returned when no hosted zone or configured zone contains the domain.
    #[error("no DNS zone found for \"{0}\"")]
    NoZone(String),

    /// Returned when the Route 53 API answers with a non-success status.
    #[error("route 53 request failed ({status}): {body}")]
    Route53 { status: u16, body: String },

    /// Returned when a dynamic update is refused by an RFC 2136 server.
    #[error("DNS update for \"{0}\" refused: {1}")]
    DnsUpdateRefused(String, ResponseCode),

    /// Returned when certbot exits unsuccessfully. Holds its stderr.
    #[error("{0}")]
    Certbot(String),

    /// Returned when a certificate file can't be parsed.
    #[error("unreadable certificate: {0}")]
    Certificate(String),

    /// Returned when a notification channel is misconfigured or fails to deliver.
    #[error("notification failed: {0}")]
    Notification(String),

    /// Returned when a notification channel URL uses a scheme we can't translate.
    #[error("unsupported notification URL for {0}")]
    UnsupportedNotificationUrl(&'static str),

    /// Returned when the dashboard is asked to sort by a column it doesn't have.
    #[error("unknown sort key \"{0}\"")]
    UnknownSortKey(String),

    /// Returned for a dropdown click that is neither `toggle`, `inside` nor `outside`.
    #[error("unknown click target \"{0}\"")]
    UnknownClickTarget(String),

    /// Returned when clients send invalid JSON to the settings API.
    #[error(transparent)]
    JsonExtractorRejection(#[from] JsonRejection),

    /// Returned when a generic IO error occurs.
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),

    /// Returned when processing JSON from disk fails due to invalid JSON content.
    #[error("invalid JSON")]
    InvalidJSON(#[from] serde_json::Error),

    /// Returned when a Route 53 response body isn't the XML we expect.
    #[error("invalid XML response")]
    InvalidXML(#[from] quick_xml::DeError),

    /// Returned when an outbound HTTP request fails.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Returned when the RFC 2136 client fails.
    #[error("DNS client error: {0}")]
    DnsClient(#[from] ClientError),

    /// Returned when a generic DNS protocol error occurs.
    #[error("DNS error")]
    DnsProto(#[from] ProtoError),

    /// Returned when the job scheduler can't be created or a job can't be registered.
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// Returned when dropping privileges at startup fails.
    #[error("privilege drop failed: {0}")]
    Privileges(String),

    /// Returned when the rotating application log file can't be opened.
    #[error("log file setup failed: {0}")]
    LogFile(#[from] tracing_appender::rolling::InitError),

    /// Returned when the tracing subscriber can't be installed.
    #[error("logging setup failed: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),
}
