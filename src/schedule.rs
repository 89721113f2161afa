//! In-process job scheduling.
//!
//! Jobs are cron expressions evaluated in the user's timezone, so a daily 02:30 renewal check
//! stays at 02:30 local time across DST changes. The schedule is built once at startup;
//! changing the interval settings takes effect on the next restart.

use crate::error::Error;
use crate::reconcile::SharedReconciler;
use crate::settings::Settings;
use chrono::{DateTime, NaiveTime, Timelike};
use chrono_tz::Tz;
use std::collections::HashMap;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

const DEFAULT_CHECK_TIME: &str = "0 30 2 * * *";
const LOG_CLEANUP: &str = "0 30 3 * * *";

/// Shown by the dashboard for jobs that aren't registered.
pub const NOT_SCHEDULED: &str = "Not scheduled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Ddns,
    SslRenewal,
    LogCleanup,
}

/// How often the public IP is compared with the DNS records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpCheckInterval {
    FiveMinutes,
    TenMinutes,
    Hourly,
    Daily,
    Disabled,
}

impl IpCheckInterval {
    /// Parse an `ip_check_interval` setting. Unknown values fall back to five minutes.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "5m" => IpCheckInterval::FiveMinutes,
            "10m" => IpCheckInterval::TenMinutes,
            "60m" => IpCheckInterval::Hourly,
            "24h" => IpCheckInterval::Daily,
            "disabled" => IpCheckInterval::Disabled,
            other => {
                tracing::warn!("invalid ip_check_interval value: '{other}'. Defaulting to 5 minutes.");
                IpCheckInterval::FiveMinutes
            }
        }
    }

    pub fn cron(self) -> Option<&'static str> {
        match self {
            IpCheckInterval::FiveMinutes => Some("0 */5 * * * *"),
            IpCheckInterval::TenMinutes => Some("0 */10 * * * *"),
            IpCheckInterval::Hourly => Some("0 0 * * * *"),
            IpCheckInterval::Daily => Some("0 0 0 * * *"),
            IpCheckInterval::Disabled => None,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            IpCheckInterval::FiveMinutes => "every 5 minutes (at :00, :05...)",
            IpCheckInterval::TenMinutes => "every 10 minutes (at :00, :10...)",
            IpCheckInterval::Hourly => "every hour (at :00)",
            IpCheckInterval::Daily => "daily at 00:00",
            IpCheckInterval::Disabled => "disabled",
        }
    }
}

/// A daily cron expression for an `HH:MM` time. Invalid times fall back to 02:30.
pub fn daily_at(time: &str) -> String {
    match NaiveTime::parse_from_str(time.trim(), "%H:%M") {
        Ok(t) => format!("0 {} {} * * *", t.minute(), t.hour()),
        Err(_) => {
            tracing::warn!("invalid check_time '{time}'. Defaulting to 02:30.");
            DEFAULT_CHECK_TIME.to_string()
        }
    }
}

/// The jobs to register for `settings`, as cron expressions.
pub fn plan(settings: &Settings) -> Vec<(JobKind, String)> {
    let mut jobs = vec![];
    if let Some(cron) = IpCheckInterval::parse(&settings.ip_check_interval).cron() {
        jobs.push((JobKind::Ddns, cron.to_string()));
    }
    if settings.cert_management.enabled {
        jobs.push((
            JobKind::SslRenewal,
            daily_at(&settings.cert_management.check_time),
        ));
    }
    jobs.push((JobKind::LogCleanup, LOG_CLEANUP.to_string()));
    jobs
}

async fn run_job(kind: JobKind, reconciler: SharedReconciler) {
    match kind {
        JobKind::Ddns => reconciler.run_ddns_update().await,
        JobKind::SslRenewal => reconciler.run_ssl_check().await,
        JobKind::LogCleanup => {
            reconciler.run_log_cleanup().await;
        }
    }
}

pub struct Scheduler {
    scheduler: JobScheduler,
    tz: Tz,
    jobs: HashMap<JobKind, Uuid>,
}

impl Scheduler {
    /// Register the jobs for `settings` and start running them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Scheduler`] if the scheduler can't be started or a job is rejected.
    pub async fn start(reconciler: SharedReconciler, settings: &Settings) -> Result<Self, Error> {
        let scheduler_error = |err: tokio_cron_scheduler::JobSchedulerError| {
            Error::Scheduler(err.to_string())
        };
        let scheduler = JobScheduler::new().await.map_err(scheduler_error)?;
        let tz = settings.tz();

        let mut jobs = HashMap::new();
        for (kind, cron) in plan(settings) {
            let reconciler = reconciler.clone();
            let job = Job::new_async_tz(cron.as_str(), tz, move |_uuid, _lock| {
                let reconciler = reconciler.clone();
                Box::pin(async move { run_job(kind, reconciler).await })
            })
            .map_err(scheduler_error)?;
            jobs.insert(kind, scheduler.add(job).await.map_err(scheduler_error)?);
        }
        scheduler.start().await.map_err(scheduler_error)?;

        let interval = IpCheckInterval::parse(&settings.ip_check_interval);
        let ssl = if settings.cert_management.enabled {
            format!("SSL check at {} {tz}", settings.cert_management.check_time)
        } else {
            "SSL check disabled".to_string()
        };
        tracing::info!(
            "scheduler jobs registered. DDNS check: {}. {ssl}.",
            interval.describe()
        );

        Ok(Self {
            scheduler,
            tz,
            jobs,
        })
    }

    /// When `kind` runs next, in the user's timezone.
    pub async fn next_run(&self, kind: JobKind) -> Option<DateTime<Tz>> {
        let id = *self.jobs.get(&kind)?;
        let mut scheduler = self.scheduler.clone();
        match scheduler.next_tick_for_job(id).await {
            Ok(next) => next.map(|t| t.with_timezone(&self.tz)),
            Err(err) => {
                tracing::error!("error getting next run time for {kind:?}: {err}");
                None
            }
        }
    }

    /// [`Scheduler::next_run`] formatted for display.
    pub async fn next_run_display(&self, kind: JobKind) -> String {
        self.next_run(kind).await.map_or_else(
            || NOT_SCHEDULED.to_string(),
            |t| t.format("%Y-%m-%d %H:%M:%S %Z").to_string(),
        )
    }

    pub async fn shutdown(&self) {
        let mut scheduler = self.scheduler.clone();
        if let Err(err) = scheduler.shutdown().await {
            tracing::warn!("scheduler shutdown: {err}");
        }
    }
}

/// The slow work done once after the jobs are registered: read certificate expiry dates, then
/// check the public IP unless DDNS checks are disabled.
pub async fn run_startup_jobs(reconciler: SharedReconciler) {
    reconciler.initial_setup().await;
    let interval = reconciler.settings().snapshot().await.ip_check_interval;
    if IpCheckInterval::parse(&interval) == IpCheckInterval::Disabled {
        return;
    }
    tracing::info!("running initial DDNS check...");
    reconciler.run_ddns_update().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::ARecord;
    use crate::reconcile::tests::{domain, fixture, PUBLIC_IP};
    use crate::settings::CertManagement;
    use std::sync::Arc;

    #[test]
    fn intervals() {
        assert_eq!(IpCheckInterval::parse("5m").cron(), Some("0 */5 * * * *"));
        assert_eq!(IpCheckInterval::parse("10m").cron(), Some("0 */10 * * * *"));
        assert_eq!(IpCheckInterval::parse("60m").cron(), Some("0 0 * * * *"));
        assert_eq!(IpCheckInterval::parse("24h").cron(), Some("0 0 0 * * *"));
        assert_eq!(IpCheckInterval::parse("disabled").cron(), None);
        assert_eq!(IpCheckInterval::parse("7m"), IpCheckInterval::FiveMinutes);
    }

    #[test]
    fn check_times() {
        assert_eq!(daily_at("02:30"), "0 30 2 * * *");
        assert_eq!(daily_at("23:05"), "0 5 23 * * *");
        assert_eq!(daily_at("25:00"), "0 30 2 * * *");
        assert_eq!(daily_at("noon"), "0 30 2 * * *");
    }

    #[test]
    fn plans() {
        let defaults = plan(&Settings::default());
        assert_eq!(
            defaults,
            vec![
                (JobKind::Ddns, "0 */5 * * * *".to_string()),
                (JobKind::SslRenewal, "0 30 2 * * *".to_string()),
                (JobKind::LogCleanup, "0 30 3 * * *".to_string()),
            ]
        );

        let quiet = Settings {
            ip_check_interval: "disabled".into(),
            cert_management: CertManagement {
                enabled: false,
                check_time: "04:00".into(),
            },
            ..Settings::default()
        };
        assert_eq!(
            plan(&quiet),
            vec![(JobKind::LogCleanup, "0 30 3 * * *".to_string())]
        );
    }

    #[tokio::test]
    async fn next_runs_follow_registration() {
        let f = fixture(vec![domain("a.example.com", true, true)], vec![]).await;
        let settings = Settings {
            timezone: "Europe/Berlin".into(),
            cert_management: CertManagement {
                enabled: false,
                check_time: "02:30".into(),
            },
            ..Settings::default()
        };
        let scheduler = Scheduler::start(Arc::new(f.reconciler), &settings)
            .await
            .unwrap();

        let next = scheduler.next_run(JobKind::LogCleanup).await.unwrap();
        assert_eq!(next.timezone(), chrono_tz::Europe::Berlin);
        assert_eq!(next.format("%H:%M:%S").to_string(), "03:30:00");
        assert!(next > chrono::Utc::now());
        assert_eq!(
            scheduler.next_run_display(JobKind::SslRenewal).await,
            NOT_SCHEDULED
        );
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn startup_jobs_check_ip_unless_disabled() {
        let f = fixture(vec![domain("a.example.com", true, true)], vec![]).await;
        let dns = f.dns.clone();
        run_startup_jobs(Arc::new(f.reconciler)).await;
        assert_eq!(dns.record("a.example.com"), Some(ARecord::Address(PUBLIC_IP)));

        let f = fixture(vec![domain("a.example.com", true, true)], vec![]).await;
        let mut settings = f.reconciler.settings().snapshot().await;
        settings.ip_check_interval = "disabled".into();
        f.reconciler.settings().save(settings).await.unwrap();
        let dns = f.dns.clone();
        run_startup_jobs(Arc::new(f.reconciler)).await;
        assert_eq!(dns.record("a.example.com"), None);
    }
}
