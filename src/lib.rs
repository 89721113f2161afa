//! Domain Crab
//!
//! A self-hosted manager for a handful of domains: keeps their DNS `A` records pointed at the
//! host's dynamic public IPv4 address ([DDNS][crate::reconcile]), issues and renews
//! [Let's Encrypt] certificates for them through [certbot] with a [DNS-01] challenge, and tells
//! you about it over e-mail or chat webhooks.
//!
//! Route 53 and [RFC-2136][RFC-2136] DNS servers are supported, plus a `demo` provider that keeps
//! everything in memory. A small web dashboard shows what is going on and lets you trigger any
//! job by hand.
//!
//! [Let's Encrypt]: https://letsencrypt.org
//! [certbot]: https://certbot.eff.org
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
//! [RFC-2136]: https://www.rfc-editor.org/rfc/rfc2136
//!
#![warn(clippy::pedantic)]

pub mod api;
pub mod bootstrap;
pub mod certs;
pub mod config;
pub mod dashboard;
pub mod dns;
pub mod error;
pub mod logging;
pub mod notify;
pub mod public_ip;
pub mod reconcile;
pub mod schedule;
pub mod settings;
pub mod state_store;
#[cfg(test)]
mod test_support;

pub use api::new as new_http;
pub use config::{Config, Shared};
pub use reconcile::Reconciler;
pub use settings::{Settings, SettingsStore};
