use crate::dns::{ARecord, DnsProvider};
use crate::error::Error;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Mutex;

/// In-memory records for demo mode and tests.
#[derive(Debug, Default)]
pub struct DemoProvider {
    records: Mutex<HashMap<String, ARecord>>,
}

impl DemoProvider {
    pub fn with_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = (String, ARecord)>,
    {
        Self {
            records: Mutex::new(records.into_iter().collect()),
        }
    }

    pub fn record(&self, domain: &str) -> Option<ARecord> {
        self.lock().get(domain).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ARecord>> {
        // A poisoned map of records is still a map of records.
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl DnsProvider for DemoProvider {
    async fn verify(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn get_a_record(&self, domain: &str) -> Result<Option<ARecord>, Error> {
        Ok(self.record(domain))
    }

    async fn update_a_record(&self, domain: &str, ip: Ipv4Addr) -> Result<(), Error> {
        tracing::info!("[{domain}] DEMO MODE: recording A {ip} in memory");
        self.lock().insert(domain.to_string(), ARecord::Address(ip));
        Ok(())
    }

    fn certbot_args(&self) -> Vec<String> {
        vec![]
    }
}
