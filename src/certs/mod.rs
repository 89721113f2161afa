//! Let's Encrypt certificate lifecycle.
//!
//! Certificates are issued and renewed by [certbot] using a DNS-01 plugin matching the
//! configured [DNS provider][crate::dns]. Each domain gets its own certbot configuration, work
//! and log directory under the certificates volume:
//!
//! ```text
//! /certs/example.com/
//! ├── live/example.com/fullchain.pem   <- read for the expiry date
//! ├── letsencrypt.log                  <- pruned by the log retention job
//! └── ...
//! ```
//!
//! Other containers mount the same volume to pick up the certificates.
//!
//! [certbot]: https://certbot.eff.org

use crate::error::Error;
use std::sync::Arc;

pub mod certbot;
pub mod monitor;
pub mod retention;

pub use certbot::{Certbot, DemoIssuer};
pub use monitor::CertificateMonitor;
pub use retention::Retention;

/// Certbot output that means a certificate was actually renewed.
const RENEWAL_MARKERS: [&str; 2] = ["Congratulations, all renewals succeeded", "Renewed"];

#[allow(clippy::module_name_repetitions)]
pub type DynCertIssuer = Arc<dyn CertIssuer + Send + Sync>;

/// Issues and renews certificates. Successful calls return the tool's output, failures carry
/// its error output in [`Error::Certbot`].
#[async_trait::async_trait]
pub trait CertIssuer {
    /// Obtain a new certificate for `domain`, and `*.domain` when `wildcard` is set.
    async fn create(&self, domain: &str, wildcard: bool, email: &str) -> Result<String, Error>;

    /// Renew the certificates of `domain` that are due. A dry run only simulates the renewal.
    async fn renew(&self, domain: &str, dry_run: bool) -> Result<String, Error>;
}

/// Whether renewal output reports a certificate that was actually renewed.
pub fn renewed(output: &str) -> bool {
    RENEWAL_MARKERS.iter().any(|marker| output.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renewal_markers() {
        assert!(renewed(
            "Congratulations, all renewals succeeded: \n  /certs/a/live/a/fullchain.pem (success)"
        ));
        assert!(renewed("Renewed certificate for example.com"));
        assert!(!renewed(
            "Congratulations, all simulated renewals succeeded: \n  /certs/a (success)"
        ));
        assert!(!renewed("The following certificates are not due for renewal yet:"));
    }
}
