use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct DomainState {
    /// The `A` record value last seen at the DNS provider: a dotted IPv4 address, or
    /// `ALIAS: <target>` for alias records.
    pub recorded_ip: Option<String>,
    pub last_update_time: Option<DateTime<Utc>>,
    pub ssl_expiration: Option<DateTime<Utc>>,
    pub ssl_last_renew: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AppState {
    pub public_ip: Option<Ipv4Addr>,
    pub last_ip_check_time: Option<DateTime<Utc>>,
    pub domain_states: BTreeMap<String, DomainState>,
}

impl AppState {
    /// The state entry for `domain`, created empty if missing.
    pub fn domain_mut(&mut self, domain: &str) -> &mut DomainState {
        self.domain_states.entry(domain.to_string()).or_default()
    }

    pub fn domain(&self, domain: &str) -> Option<&DomainState> {
        self.domain_states.get(domain)
    }
}
