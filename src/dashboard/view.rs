use crate::dashboard::ui::{Flash, SortDirection, SortKey, SortState, Theme, UiView};
use crate::settings::Settings;
use crate::state_store::AppState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::net::Ipv4Addr;

/// Certificate column of a domain row. The variant order is the ascending sort order.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(tag = "status", content = "expires", rename_all = "snake_case")]
pub enum CertStatus {
    /// SSL is enabled but no certificate was found.
    Missing,
    /// SSL is not enabled for the domain.
    NotApplicable,
    Expires(DateTime<Utc>),
}

impl CertStatus {
    pub fn label(&self) -> String {
        match self {
            CertStatus::Missing => "Missing".into(),
            CertStatus::NotApplicable => "N/A".into(),
            CertStatus::Expires(at) => at.format("%Y-%m-%d").to_string(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DomainRow {
    pub name: String,
    pub ddns: bool,
    pub auto_update: bool,
    pub ssl: bool,
    pub wildcard: bool,
    pub notifications: bool,
    pub recorded_ip: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
    pub cert: CertStatus,
    pub ssl_last_renew: Option<DateTime<Utc>>,
    pub expanded: bool,
}

/// Ordering of the IP column: unknown first, then addresses numerically, then anything else
/// (aliases) by text.
fn ip_rank(recorded: Option<&str>) -> (u8, Option<Ipv4Addr>, Option<&str>) {
    match recorded {
        None => (0, None, None),
        Some(text) => match text.parse::<Ipv4Addr>() {
            Ok(ip) => (1, Some(ip), None),
            Err(_) => (2, None, Some(text)),
        },
    }
}

fn compare(a: &DomainRow, b: &DomainRow, key: SortKey) -> Ordering {
    let primary = match key {
        SortKey::Domain => Ordering::Equal,
        SortKey::Ip => ip_rank(a.recorded_ip.as_deref()).cmp(&ip_rank(b.recorded_ip.as_deref())),
        SortKey::Updated => a.last_update.cmp(&b.last_update),
        SortKey::Expiration => a.cert.cmp(&b.cert),
    };
    primary.then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
}

/// Sort rows in place. Descending is the exact reverse of ascending.
pub fn sort_rows(rows: &mut [DomainRow], sort: SortState) {
    rows.sort_by(|a, b| {
        let ordering = compare(a, b, sort.key);
        match sort.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

/// Everything the dashboard shows.
#[derive(Serialize, Debug, Clone)]
pub struct Dashboard {
    pub public_ip: String,
    pub last_ip_check: Option<DateTime<Utc>>,
    pub next_ddns_run: String,
    pub next_ssl_run: String,
    pub timezone: String,
    pub demo: bool,
    pub theme: Theme,
    pub sort: Option<SortState>,
    pub menu_open: bool,
    pub domains: Vec<DomainRow>,
    pub flashes: Vec<Flash>,
}

/// Scheduler information shown on the dashboard.
#[derive(Debug, Clone)]
pub struct NextRuns {
    pub ddns: String,
    pub ssl: String,
}

impl Dashboard {
    pub fn build(
        settings: &Settings,
        state: &AppState,
        ui: UiView,
        next_runs: NextRuns,
        flashes: Vec<Flash>,
    ) -> Self {
        let mut domains: Vec<DomainRow> = settings
            .domains
            .iter()
            .map(|domain| {
                let observed = state.domain(&domain.name);
                let cert = if !domain.ssl.enabled {
                    CertStatus::NotApplicable
                } else {
                    observed
                        .and_then(|s| s.ssl_expiration)
                        .map_or(CertStatus::Missing, CertStatus::Expires)
                };
                DomainRow {
                    name: domain.name.clone(),
                    ddns: domain.ddns,
                    auto_update: domain.auto_update,
                    ssl: domain.ssl.enabled,
                    wildcard: domain.ssl.wildcard,
                    notifications: domain.notifications.enabled(),
                    recorded_ip: observed.and_then(|s| s.recorded_ip.clone()),
                    last_update: observed.and_then(|s| s.last_update_time),
                    cert,
                    ssl_last_renew: observed.and_then(|s| s.ssl_last_renew),
                    expanded: ui.expanded.contains(&domain.name),
                }
            })
            .collect();
        if let Some(sort) = ui.sort {
            sort_rows(&mut domains, sort);
        }

        Self {
            public_ip: state
                .public_ip
                .map_or_else(|| "N/A".to_string(), |ip| ip.to_string()),
            last_ip_check: state.last_ip_check_time,
            next_ddns_run: next_runs.ddns,
            next_ssl_run: next_runs.ssl,
            timezone: settings.timezone.clone(),
            demo: false,
            theme: ui.theme,
            sort: ui.sort,
            menu_open: ui.menu_open,
            domains,
            flashes,
        }
    }

    /// The page shown when the dashboard data couldn't be gathered.
    pub fn fallback(theme: Theme, flashes: Vec<Flash>) -> Self {
        Self {
            public_ip: "Error".into(),
            last_ip_check: None,
            next_ddns_run: "Error".into(),
            next_ssl_run: "Error".into(),
            timezone: "UTC".into(),
            demo: false,
            theme,
            sort: None,
            menu_open: false,
            domains: vec![],
            flashes,
        }
    }
}
