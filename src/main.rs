use anyhow::Result;
use domaincrab::bootstrap::{self, Identity};
use domaincrab::certs::{Certbot, CertificateMonitor, DemoIssuer, DynCertIssuer};
use domaincrab::dashboard::{FilePreferences, Ui};
use domaincrab::public_ip::{DynPublicIpSource, HttpIpLookup, StaticIp};
use domaincrab::reconcile::{Reconciler, Services};
use domaincrab::schedule::{self, Scheduler};
use domaincrab::settings::SettingsStore;
use domaincrab::state_store::FileStateStore;
use domaincrab::{api, dns, logging, Config};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::RwLock;

/// The public IP reported in demo mode (TEST-NET-3).
const DEMO_PUBLIC_IP: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 10);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(Config::from_env()?);
    let identity = bootstrap::prepare(&config)?;

    let settings = Arc::new(SettingsStore::load(&config).await);
    let initial = settings.snapshot().await;
    let logging = logging::init(&config.paths.logs_dir, initial.tz())?;
    match identity {
        Identity::Dropped(user) => tracing::info!("running as {user}"),
        Identity::NotRoot => tracing::warn!("RUN_AS_USER is set but not running as root, ignoring"),
        Identity::Unchanged => {}
    }
    tracing::info!("log timezone: {}", logging.timezone.get());

    let dns = dns::from_config(&config)?;
    dns.verify().await?;
    tracing::info!("DNS provider {:?} ready", config.provider);

    let issuer: DynCertIssuer = if config.demo_mode() {
        Arc::new(DemoIssuer)
    } else {
        Arc::new(Certbot::new(
            config.certbot_bin.clone(),
            &config.paths.certs_dir,
            dns.certbot_args(),
        ))
    };
    let ip_source: DynPublicIpSource = if config.demo_mode() {
        Arc::new(StaticIp::new(Some(DEMO_PUBLIC_IP)))
    } else {
        Arc::new(HttpIpLookup::new(config.ip_providers.clone())?)
    };

    let state = FileStateStore::try_from_file(config.paths.state_file()).await?;
    let reconciler = Arc::new(
        Reconciler::new(Services {
            settings,
            state: Arc::new(RwLock::new(state)),
            ip_source,
            dns,
            issuer,
            monitor: CertificateMonitor::new(&config.paths.certs_dir),
            certs_dir: config.paths.certs_dir.clone(),
            demo: config.demo_mode(),
        })
        .await,
    );

    let scheduler = Arc::new(Scheduler::start(reconciler.clone(), &initial).await?);
    tokio::spawn(schedule::run_startup_jobs(reconciler.clone()));

    let prefs = FilePreferences::load(config.paths.prefs_file()).await;
    let ui = Arc::new(Ui::load(Arc::new(RwLock::new(prefs))).await);

    tracing::info!("API listening on {}", &config.bind_addr);
    let api_server = api::new(api::AppState {
        config: config.clone(),
        reconciler,
        scheduler: scheduler.clone(),
        ui,
        log_timezone: logging.timezone.clone(),
    });
    let api_handle = tokio::spawn(api_server);

    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("quitting from signal");
        },
        Ok(api_res) = api_handle => {
            if let Err(err) = api_res {
                return Err(err.into())
            }
        }
    }
    scheduler.shutdown().await;
    tracing::info!("goodbye");
    Ok(())
}
