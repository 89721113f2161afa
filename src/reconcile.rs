//! The jobs that keep DNS records and certificates in line with reality.
//!
//! A [`Reconciler`] owns every collaborator a job needs and is shared between the scheduler and
//! the HTTP API. All jobs, scheduled or triggered by hand, take the same run lock, so at most
//! one of them touches the DNS provider, certbot or the state at a time.

use crate::certs::{self, retention, CertificateMonitor, DynCertIssuer, Retention};
use crate::dns::{ARecord, DynDnsProvider};
use crate::error::Error;
use crate::notify::{Notifier, SendOutcome};
use crate::public_ip::DynPublicIpSource;
use crate::settings::{DomainSettings, NotificationSettings, Settings, SharedSettings};
use crate::state_store::{AppState, DynStateStore};
use chrono::{DateTime, Utc};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

pub type SharedReconciler = Arc<Reconciler>;

/// Everything a [`Reconciler`] works with.
pub struct Services {
    pub settings: SharedSettings,
    pub state: DynStateStore,
    pub ip_source: DynPublicIpSource,
    pub dns: DynDnsProvider,
    pub issuer: DynCertIssuer,
    pub monitor: CertificateMonitor,
    pub certs_dir: PathBuf,
    /// Notifications are logged instead of sent.
    pub demo: bool,
}

/// Outcome of [`Reconciler::create_certificate`] when certbot itself succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertCreation {
    /// The new certificate was found; it expires at the given time.
    Created(DateTime<Utc>),
    /// Certbot reported success but no certificate file appeared.
    Missing,
}

pub struct Reconciler {
    settings: SharedSettings,
    state: DynStateStore,
    ip_source: DynPublicIpSource,
    dns: DynDnsProvider,
    issuer: DynCertIssuer,
    monitor: CertificateMonitor,
    certs_dir: PathBuf,
    demo: bool,
    notifier: RwLock<Notifier>,
    run_lock: Mutex<()>,
}

fn build_notifier(settings: &NotificationSettings, demo: bool) -> Notifier {
    if demo {
        Notifier::demo(settings)
    } else {
        Notifier::from_settings(settings)
    }
}

impl Reconciler {
    pub async fn new(services: Services) -> Self {
        let settings = services.settings.snapshot().await;
        let notifier = build_notifier(&settings.notifications, services.demo);
        Self {
            settings: services.settings,
            state: services.state,
            ip_source: services.ip_source,
            dns: services.dns,
            issuer: services.issuer,
            monitor: services.monitor,
            certs_dir: services.certs_dir,
            demo: services.demo,
            notifier: RwLock::new(notifier),
            run_lock: Mutex::new(()),
        }
    }

    /// Replace the notifier, e.g. with one over explicit channels.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = RwLock::new(notifier);
        self
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    /// Rebuild the notification channels from the current settings.
    pub async fn reload_notifier(&self) {
        let settings = self.settings.snapshot().await;
        *self.notifier.write().await = build_notifier(&settings.notifications, self.demo);
    }

    /// A copy of the current state.
    pub async fn state(&self) -> AppState {
        self.state.read().await.state().clone()
    }

    async fn persist(&self) {
        if let Err(err) = self.state.read().await.persist().await {
            tracing::error!("error saving state: {err}");
        }
    }

    async fn notify(&self, subject: &str, body: &str, domain: Option<&DomainSettings>) {
        self.notifier
            .read()
            .await
            .send(subject, body, domain.map(|d| &d.notifications))
            .await;
    }

    /// Compare every DDNS domain's `A` record with the current public IP, and update or report
    /// the ones that differ.
    pub async fn run_ddns_update(&self) {
        let _running = self.run_lock.lock().await;
        tracing::info!("running DDNS update check...");
        let settings = self.settings.snapshot().await;

        let new_ip = self.ip_source.public_ip().await;
        let previous_ip = {
            let mut store = self.state.write().await;
            let state = store.state_mut();
            state.last_ip_check_time = Some(Utc::now());
            state.public_ip
        };

        let Some(public_ip) = new_ip else {
            tracing::error!("DDNS update skipped: could not determine public IP");
            if previous_ip.is_some() && settings.notifications.enabled {
                self.notify(
                    "DDNS IP Check FAILED",
                    "Failed to retrieve the container's public IP address. All IP providers failed.",
                    None,
                )
                .await;
            }
            self.state.write().await.state_mut().public_ip = None;
            self.persist().await;
            return;
        };

        if previous_ip == Some(public_ip) {
            tracing::info!("public IP ({public_ip}) has not changed");
        } else {
            let old = previous_ip.map_or_else(|| "None".to_string(), |ip| ip.to_string());
            tracing::info!("public IP has changed! New IP: {public_ip} (Old: {old})");
            self.state.write().await.state_mut().public_ip = Some(public_ip);
        }

        for domain in &settings.domains {
            self.state.write().await.state_mut().domain_mut(&domain.name);
            if domain.ddns {
                self.sync_domain(&settings, domain, public_ip).await;
            }
        }
        self.persist().await;
    }

    async fn sync_domain(&self, settings: &Settings, domain: &DomainSettings, public_ip: Ipv4Addr) {
        let name = domain.name.as_str();
        let record = self.dns.get_a_record(name).await.unwrap_or_else(|err| {
            tracing::error!("[{name}] error fetching A record: {err}");
            None
        });
        {
            let mut store = self.state.write().await;
            let entry = store.state_mut().domain_mut(name);
            entry.recorded_ip = record.as_ref().map(ToString::to_string);
            entry.last_update_time = Some(Utc::now());
        }

        let recorded = match record {
            Some(ARecord::Alias(_)) => {
                tracing::warn!("[{name}] skipping update, domain is an ALIAS record");
                return;
            }
            Some(ARecord::Address(ip)) => Some(ip),
            None => None,
        };
        if recorded == Some(public_ip) {
            tracing::info!("[{name}] IPs match ({public_ip}). No update needed.");
            return;
        }

        let recorded = recorded.map_or_else(|| "N/A".to_string(), |ip| ip.to_string());
        tracing::info!("[{name}] IP mismatch. Recorded: {recorded}, Public: {public_ip}.");
        let send_alerts = settings.send_alerts(domain);

        if !domain.auto_update {
            tracing::info!("[{name}] auto-update is disabled. IP was not updated.");
            if send_alerts {
                let body = format!(
                    "An IP mismatch was detected for {name}, but auto-update is disabled.\n\n\
                     Please update the IP manually.\n\n\
                     Public IP: {public_ip}\nRecorded IP: {recorded}"
                );
                self.notify(&format!("DDNS IP Mismatch DETECTED for {name}"), &body, Some(domain))
                    .await;
            }
            return;
        }

        tracing::info!("[{name}] auto-update enabled. Updating...");
        match self.dns.update_a_record(name, public_ip).await {
            Ok(()) => {
                tracing::info!("[{name}] successfully updated to {public_ip}");
                self.state
                    .write()
                    .await
                    .state_mut()
                    .domain_mut(name)
                    .recorded_ip = Some(public_ip.to_string());
                if send_alerts {
                    let body = format!(
                        "The IP address for {name} has been successfully updated.\n\n\
                         New IP: {public_ip}\nOld IP: {recorded}"
                    );
                    self.notify(&format!("DDNS IP Updated for {name}"), &body, Some(domain))
                        .await;
                }
            }
            Err(err) => {
                tracing::error!("[{name}] failed to update A record: {err}");
                if send_alerts {
                    let body = format!(
                        "The IP address update for {name} failed. \
                         Please check the application logs and DNS provider permissions."
                    );
                    self.notify(&format!("DDNS IP Update FAILED for {name}"), &body, Some(domain))
                        .await;
                }
            }
        }
    }

    /// Run certbot's renewal check for every SSL domain that has a certificate. Domains with
    /// auto-update off only get a dry run.
    pub async fn run_ssl_check(&self) {
        let _running = self.run_lock.lock().await;
        tracing::info!("running SSL renewal checks...");
        let settings = self.settings.snapshot().await;

        for domain in settings.domains.iter().filter(|d| d.ssl.enabled) {
            let name = domain.name.as_str();
            if self.monitor.expiration(name).await.is_none() {
                tracing::info!("[{name}] skipping renewal check, certificate is missing");
                continue;
            }

            tracing::info!(
                "[{name}] checking for SSL renewal (auto-update: {})...",
                domain.auto_update
            );
            let send_alerts = settings.send_alerts(domain);
            match self.issuer.renew(name, !domain.auto_update).await {
                Err(err) => {
                    tracing::error!("[{name}] certbot renewal check FAILED. Output: {err}");
                    if send_alerts {
                        let body = format!(
                            "The daily 'certbot renew' command failed. See logs for details.\n\nOutput:\n{err}"
                        );
                        self.notify(
                            &format!("SSL Certificate Renewal FAILED for {name}"),
                            &body,
                            Some(domain),
                        )
                        .await;
                    }
                }
                Ok(output) => {
                    tracing::info!("[{name}] certbot renewal check completed");
                    if certs::renewed(&output) {
                        self.state
                            .write()
                            .await
                            .state_mut()
                            .domain_mut(name)
                            .ssl_last_renew = Some(Utc::now());
                        if send_alerts {
                            let body = format!(
                                "SSL certificate for {name} was successfully renewed.\n\nOutput:\n{output}"
                            );
                            self.notify("SSL Certificate Renewed Successfully", &body, Some(domain))
                                .await;
                        }
                    }
                }
            }

            tracing::info!("[{name}] re-checking SSL expiration date after renewal");
            let expiry = self.monitor.expiration(name).await;
            self.state
                .write()
                .await
                .state_mut()
                .domain_mut(name)
                .ssl_expiration = expiry;
        }
        self.persist().await;
    }

    /// Delete old certbot logs according to the retention setting. Returns how many files
    /// were deleted.
    pub async fn run_log_cleanup(&self) -> usize {
        let _running = self.run_lock.lock().await;
        let settings = self.settings.snapshot().await;
        tracing::info!(
            "running log cleanup with retention '{}'...",
            settings.log_retention
        );
        let tz = settings.tz();
        let cutoff = Retention::parse(&settings.log_retention).cutoff(&Utc::now().with_timezone(&tz));
        tracing::info!(
            "deleting certbot logs older than {}",
            cutoff.with_timezone(&tz).format("%Y-%m-%d")
        );
        let names: Vec<&str> = settings.domains.iter().map(|d| d.name.as_str()).collect();
        let deleted = retention::cleanup_logs(
            &self.certs_dir,
            names,
            cutoff,
        )
        .await;
        tracing::info!("log cleanup complete. Deleted {deleted} file(s).");
        deleted
    }

    /// Fill in certificate expiry dates that aren't known yet.
    pub async fn initial_setup(&self) {
        let _running = self.run_lock.lock().await;
        tracing::info!("running initial setup... checking for missing SSL certs");
        let settings = self.settings.snapshot().await;

        for domain in settings.domains.iter().filter(|d| d.ssl.enabled) {
            let name = domain.name.as_str();
            let known = self
                .state
                .read()
                .await
                .state()
                .domain(name)
                .is_some_and(|d| d.ssl_expiration.is_some());
            if known {
                continue;
            }
            let expiry = self.monitor.expiration(name).await;
            match expiry {
                Some(expiry) => tracing::info!(
                    "[{name}] found existing certificate. Expires: {}",
                    expiry.format("%Y-%m-%d")
                ),
                None => tracing::warn!("[{name}] certificate not found. It must be created manually."),
            }
            self.state
                .write()
                .await
                .state_mut()
                .domain_mut(name)
                .ssl_expiration = expiry;
        }
        tracing::info!("initial setup complete");
        self.persist().await;
    }

    /// Request a new certificate for a configured domain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownDomain`] if the domain isn't configured, or the issuer's error if
    /// certbot fails.
    pub async fn create_certificate(&self, name: &str) -> Result<CertCreation, Error> {
        let _running = self.run_lock.lock().await;
        let settings = self.settings.snapshot().await;
        let Some(domain) = settings.domain(name) else {
            tracing::error!("[{name}] manual create failed. Domain not found in settings.");
            return Err(Error::UnknownDomain(name.to_string()));
        };
        let send_alerts = settings.send_alerts(domain);

        let result = self
            .issuer
            .create(name, domain.ssl.wildcard, &settings.contact_email())
            .await;
        if let Err(err) = result {
            tracing::error!("[{name}] certbot command failed: {err}");
            if send_alerts {
                let body = format!(
                    "A manual attempt to create an SSL certificate failed.\n\nError:\n{err}"
                );
                self.notify(
                    &format!("SSL Certificate Creation FAILED for {name}"),
                    &body,
                    Some(domain),
                )
                .await;
            }
            return Err(err);
        }

        tracing::info!("[{name}] certbot command ran. Re-checking for cert file...");
        let outcome = match self.monitor.expiration(name).await {
            Some(expiry) => {
                tracing::info!("[{name}] new cert found! Expires: {expiry}");
                self.state
                    .write()
                    .await
                    .state_mut()
                    .domain_mut(name)
                    .ssl_expiration = Some(expiry);
                if send_alerts {
                    let body = format!(
                        "A new SSL certificate was successfully created for {name}.\n\nIt expires on: {}",
                        expiry.format("%Y-%m-%d")
                    );
                    self.notify(&format!("SSL Certificate Created for {name}"), &body, Some(domain))
                        .await;
                }
                CertCreation::Created(expiry)
            }
            None => {
                tracing::error!("[{name}] certbot command succeeded, but cert file is still not found!");
                if send_alerts {
                    let body = format!(
                        "Certbot reported success, but the new certificate file could not be found. \
                         Please check the logs for {name}."
                    );
                    self.notify(
                        &format!("SSL Certificate Creation WARNING for {name}"),
                        &body,
                        Some(domain),
                    )
                    .await;
                }
                CertCreation::Missing
            }
        };
        self.persist().await;
        Ok(outcome)
    }

    /// Look up a configured domain's `A` record and store it, without changing anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownDomain`] if the domain isn't configured, or the provider's error.
    pub async fn refresh_recorded_ip(&self, name: &str) -> Result<Option<ARecord>, Error> {
        let _running = self.run_lock.lock().await;
        tracing::info!("[{name}] manual refresh of recorded IP triggered");
        if self.settings.snapshot().await.domain(name).is_none() {
            return Err(Error::UnknownDomain(name.to_string()));
        }
        let record = self.dns.get_a_record(name).await?;
        self.state
            .write()
            .await
            .state_mut()
            .domain_mut(name)
            .recorded_ip = record.as_ref().map(ToString::to_string);
        self.persist().await;
        Ok(record)
    }

    /// Point a DDNS domain at the last observed public IP, even if auto-update is off.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownDomain`], [`Error::DdnsDisabled`] or [`Error::PublicIpUnknown`]
    /// when the update can't be attempted, or the provider's error when it fails.
    pub async fn force_update_ip(&self, name: &str) -> Result<Ipv4Addr, Error> {
        let _running = self.run_lock.lock().await;
        tracing::info!("[{name}] manual FORCE update triggered");
        let settings = self.settings.snapshot().await;
        let domain = settings
            .domain(name)
            .ok_or_else(|| Error::UnknownDomain(name.to_string()))?;
        if !domain.ddns {
            return Err(Error::DdnsDisabled(name.to_string()));
        }

        let (public_ip, old_ip) = {
            let store = self.state.read().await;
            let state = store.state();
            let old_ip = state
                .domain(name)
                .and_then(|d| d.recorded_ip.clone())
                .unwrap_or_else(|| "N/A".to_string());
            (state.public_ip, old_ip)
        };
        let public_ip = public_ip.ok_or(Error::PublicIpUnknown)?;
        let send_alerts = settings.send_alerts(domain);

        tracing::info!("[{name}] forcing update to {public_ip}...");
        match self.dns.update_a_record(name, public_ip).await {
            Ok(()) => {
                {
                    let mut store = self.state.write().await;
                    let entry = store.state_mut().domain_mut(name);
                    entry.recorded_ip = Some(public_ip.to_string());
                    entry.last_update_time = Some(Utc::now());
                }
                self.persist().await;
                if send_alerts {
                    let body = format!(
                        "The IP address for {name} has been manually updated.\n\n\
                         New IP: {public_ip}\nOld IP: {old_ip}"
                    );
                    self.notify(
                        &format!("DDNS IP Manually Updated for {name}"),
                        &body,
                        Some(domain),
                    )
                    .await;
                }
                Ok(public_ip)
            }
            Err(err) => {
                tracing::error!("[{name}] forced update failed: {err}");
                if send_alerts {
                    let body = format!(
                        "A manual IP address update for {name} failed. \
                         Please check the application logs and DNS provider permissions."
                    );
                    self.notify(
                        &format!("DDNS IP Manual Update FAILED for {name}"),
                        &body,
                        Some(domain),
                    )
                    .await;
                }
                Err(err)
            }
        }
    }

    pub async fn send_test_notification(&self) -> SendOutcome {
        tracing::info!("manual test notification triggered");
        self.notifier.read().await.send_test().await
    }
}
