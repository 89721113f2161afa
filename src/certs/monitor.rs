use crate::error::Error;
use chrono::{DateTime, TimeZone, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use x509_parser::pem::parse_x509_pem;

/// Reads certificate expiry dates from certbot's `live` directory.
#[derive(Debug, Clone)]
pub struct CertificateMonitor {
    certs_dir: PathBuf,
}

impl CertificateMonitor {
    pub fn new(certs_dir: impl AsRef<Path>) -> Self {
        Self {
            certs_dir: certs_dir.as_ref().to_path_buf(),
        }
    }

    /// `<certs>/<domain>/live/<domain>/fullchain.pem`
    pub fn cert_path(&self, domain: &str) -> PathBuf {
        self.certs_dir
            .join(domain)
            .join("live")
            .join(domain)
            .join("fullchain.pem")
    }

    /// The `notAfter` date of the domain's certificate, `None` if it is missing or unreadable.
    pub async fn expiration(&self, domain: &str) -> Option<DateTime<Utc>> {
        let path = self.cert_path(domain);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::info!("[{domain}] certificate file not found at {}", path.display());
                return None;
            }
            Err(err) => {
                tracing::error!("[{domain}] error reading certificate file {}: {err}", path.display());
                return None;
            }
        };
        match not_after(&data) {
            Ok(expiry) => Some(expiry),
            Err(err) => {
                tracing::error!("[{domain}] error parsing certificate file {}: {err}", path.display());
                None
            }
        }
    }
}

/// The `notAfter` date of the first certificate in a PEM bundle.
///
/// # Errors
///
/// Returns [`Error::Certificate`] if the data isn't a PEM encoded X.509 certificate.
pub fn not_after(pem_data: &[u8]) -> Result<DateTime<Utc>, Error> {
    let (_, pem) =
        parse_x509_pem(pem_data).map_err(|err| Error::Certificate(format!("invalid PEM: {err}")))?;
    let cert = pem
        .parse_x509()
        .map_err(|err| Error::Certificate(format!("invalid certificate: {err}")))?;
    let timestamp = cert.validity().not_after.timestamp();
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .ok_or_else(|| Error::Certificate(format!("expiry out of range: {timestamp}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// A self-signed PEM certificate for `domain` expiring on the given day.
    pub(crate) fn pem_expiring(domain: &str, year: i32, month: u8, day: u8) -> String {
        let mut params = rcgen::CertificateParams::new(vec![domain.to_string()]).unwrap();
        params.not_before = rcgen::date_time_ymd(2020, 1, 1);
        params.not_after = rcgen::date_time_ymd(year, month, day);
        let key = rcgen::KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().pem()
    }

    /// Write a certificate where certbot would put it.
    pub(crate) fn install_cert(certs_dir: &Path, domain: &str, pem: &str) {
        let monitor = CertificateMonitor::new(certs_dir);
        let path = monitor.cert_path(domain);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, pem).unwrap();
    }

    #[test]
    fn reads_not_after() {
        let pem = pem_expiring("example.com", 2031, 7, 4);
        assert_eq!(
            not_after(pem.as_bytes()).unwrap(),
            Utc.with_ymd_and_hms(2031, 7, 4, 0, 0, 0).unwrap()
        );
        assert!(matches!(
            not_after(b"-----BEGIN NONSENSE-----"),
            Err(Error::Certificate(_))
        ));
    }

    #[tokio::test]
    async fn missing_and_corrupt_certificates() {
        let dir = TempDir::new().unwrap();
        let monitor = CertificateMonitor::new(dir.path());
        assert_eq!(monitor.expiration("example.com").await, None);

        install_cert(dir.path(), "example.com", "not a certificate");
        assert_eq!(monitor.expiration("example.com").await, None);

        install_cert(
            dir.path(),
            "example.com",
            &pem_expiring("example.com", 2030, 1, 15),
        );
        assert_eq!(
            monitor.expiration("example.com").await,
            Some(Utc.with_ymd_and_hms(2030, 1, 15, 0, 0, 0).unwrap())
        );
    }
}
