use crate::certs::CertIssuer;
use crate::error::Error;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Runs the certbot CLI. Arguments are passed directly, no shell is involved.
#[derive(Debug, Clone)]
pub struct Certbot {
    bin: String,
    certs_dir: PathBuf,
    plugin_args: Vec<String>,
}

impl Certbot {
    pub fn new(bin: impl Into<String>, certs_dir: impl AsRef<Path>, plugin_args: Vec<String>) -> Self {
        Self {
            bin: bin.into(),
            certs_dir: certs_dir.as_ref().to_path_buf(),
            plugin_args,
        }
    }

    fn dir_args(&self, domain: &str) -> Vec<String> {
        let dir = self.certs_dir.join(domain).display().to_string();
        vec![
            "--config-dir".into(),
            dir.clone(),
            "--work-dir".into(),
            dir.clone(),
            "--logs-dir".into(),
            dir,
        ]
    }

    fn create_args(&self, domain: &str, wildcard: bool, email: &str) -> Vec<String> {
        let mut args = vec!["certonly".to_string()];
        args.extend(self.dir_args(domain));
        args.extend(self.plugin_args.iter().cloned());
        args.extend(
            [
                "--agree-tos",
                "--email",
                email,
                "--no-eff-email",
                "--non-interactive",
                "-d",
                domain,
            ]
            .map(String::from),
        );
        if wildcard {
            args.extend(["-d".to_string(), format!("*.{domain}")]);
        }
        args
    }

    fn renew_args(&self, domain: &str, dry_run: bool) -> Vec<String> {
        let mut args = vec!["renew".to_string()];
        args.extend(self.dir_args(domain));
        args.extend(self.plugin_args.iter().cloned());
        if dry_run {
            args.push("--dry-run".into());
        }
        args
    }

    async fn run(&self, args: Vec<String>) -> Result<String, Error> {
        let output = Command::new(&self.bin)
            .args(&args)
            .output()
            .await
            .map_err(|err| Error::Certbot(format!("failed to run {}: {err}", self.bin)))?;
        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            tracing::info!("certbot command successful. stdout: {stdout}");
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            tracing::error!("certbot command failed ({}). stderr: {stderr}", output.status);
            Err(Error::Certbot(stderr))
        }
    }
}

#[async_trait::async_trait]
impl CertIssuer for Certbot {
    async fn create(&self, domain: &str, wildcard: bool, email: &str) -> Result<String, Error> {
        tracing::info!("[{domain}] attempting to create certificate (wildcard: {wildcard})");
        self.run(self.create_args(domain, wildcard, email)).await
    }

    async fn renew(&self, domain: &str, dry_run: bool) -> Result<String, Error> {
        if dry_run {
            tracing::info!("[{domain}] running 'certbot renew' check (DRY RUN)...");
        } else {
            tracing::info!("[{domain}] running 'certbot renew' check...");
        }
        self.run(self.renew_args(domain, dry_run)).await
    }
}

/// Issuer used in demo mode: reports success without doing anything.
#[derive(Debug, Default, Clone)]
pub struct DemoIssuer;

#[async_trait::async_trait]
impl CertIssuer for DemoIssuer {
    async fn create(&self, domain: &str, _wildcard: bool, _email: &str) -> Result<String, Error> {
        tracing::info!("[{domain}] DEMO MODE: skipping certificate creation");
        Ok("DEMO MODE: no certificate was requested.".into())
    }

    async fn renew(&self, domain: &str, _dry_run: bool) -> Result<String, Error> {
        tracing::info!("[{domain}] DEMO MODE: skipping renewal");
        Ok("DEMO MODE: no renewals were attempted.".into())
    }
}
