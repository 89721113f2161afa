//! Public IPv4 address discovery.

use crate::error::Error;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

pub type DynPublicIpSource = Arc<dyn PublicIpSource + Send + Sync>;

#[async_trait::async_trait]
pub trait PublicIpSource {
    /// The host's public IPv4 address, or `None` if it can't be determined.
    async fn public_ip(&self) -> Option<Ipv4Addr>;
}

/// Asks a list of "what is my IP" services in order until one answers with an IPv4 address.
#[derive(Debug, Clone)]
pub struct HttpIpLookup {
    client: reqwest::Client,
    providers: Vec<String>,
}

impl HttpIpLookup {
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client can't be built.
    pub fn new(providers: Vec<String>) -> Result<Self, Error> {
        let client = reqwest::Client::builder().timeout(LOOKUP_TIMEOUT).build()?;
        Ok(Self { client, providers })
    }

    async fn ask(&self, provider: &str) -> Result<Ipv4Addr, String> {
        let response = self
            .client
            .get(provider)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| err.to_string())?;
        let body = response.text().await.map_err(|err| err.to_string())?;
        parse_ip(&body).ok_or_else(|| format!("not an IPv4 address: {:?}", body.trim()))
    }
}

fn parse_ip(body: &str) -> Option<Ipv4Addr> {
    body.trim().parse().ok()
}

#[async_trait::async_trait]
impl PublicIpSource for HttpIpLookup {
    async fn public_ip(&self) -> Option<Ipv4Addr> {
        for provider in &self.providers {
            match self.ask(provider).await {
                Ok(ip) => {
                    tracing::info!("public IP retrieved from {provider}: {ip}");
                    return Some(ip);
                }
                Err(err) => tracing::warn!("failed to get IP from {provider}: {err}"),
            }
        }
        tracing::error!("all public IP providers failed");
        None
    }
}

/// A fixed answer, for demo mode and tests.
#[derive(Debug, Default)]
pub struct StaticIp(pub std::sync::Mutex<Option<Ipv4Addr>>);

impl StaticIp {
    pub fn new(ip: Option<Ipv4Addr>) -> Self {
        Self(std::sync::Mutex::new(ip))
    }

    pub fn set(&self, ip: Option<Ipv4Addr>) {
        *self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = ip;
    }
}

#[async_trait::async_trait]
impl PublicIpSource for StaticIp {
    async fn public_ip(&self) -> Option<Ipv4Addr> {
        *self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    #[test]
    fn parses_trimmed_ipv4_only() {
        assert_eq!(parse_ip("203.0.113.5\n"), Some(Ipv4Addr::new(203, 0, 113, 5)));
        assert_eq!(parse_ip("2001:db8::1\n"), None);
        assert_eq!(parse_ip("<html>"), None);
    }

    #[tokio::test]
    async fn falls_through_failing_providers() {
        let router = Router::new()
            .route("/broken", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
            .route("/v6", get(|| async { "2001:db8::1\n" }))
            .route("/ok", get(|| async { "198.51.100.23\n" }));
        let addr = serve(router).await;
        let lookup = HttpIpLookup::new(vec![
            format!("http://{addr}/broken"),
            format!("http://{addr}/v6"),
            format!("http://{addr}/ok"),
        ])
        .unwrap();
        assert_eq!(lookup.public_ip().await, Some(Ipv4Addr::new(198, 51, 100, 23)));
    }

    #[tokio::test]
    async fn all_providers_failing() {
        let router = Router::new().route("/broken", get(|| async { StatusCode::NOT_FOUND }));
        let addr = serve(router).await;
        let lookup = HttpIpLookup::new(vec![format!("http://{addr}/broken")]).unwrap();
        assert_eq!(lookup.public_ip().await, None);
    }
}
