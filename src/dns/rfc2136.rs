use crate::config::Rfc2136Config;
use crate::dns::{find_zone, ARecord, DnsProvider, RECORD_TTL};
use crate::error::Error;
use std::net::Ipv4Addr;
use std::str::FromStr;
use tokio::net::UdpSocket;
use trust_dns_client::client::{AsyncClient, ClientHandle};
use trust_dns_client::op::{update_message, Message, ResponseCode, UpdateMessage};
use trust_dns_client::rr::{DNSClass, Name, RData, Record, RecordType};
use trust_dns_client::udp::UdpClientStream;
use trust_dns_proto::xfer::{DnsHandle, FirstAnswer};

/// Dynamic updates against an RFC 2136 capable authoritative server.
#[derive(Debug, Clone)]
pub struct Rfc2136Provider {
    config: Rfc2136Config,
}

impl Rfc2136Provider {
    pub fn new(config: Rfc2136Config) -> Self {
        Self { config }
    }

    async fn client(&self) -> Result<AsyncClient, Error> {
        let stream = UdpClientStream::<UdpSocket>::new(self.config.server);
        let (client, background) = AsyncClient::connect(stream).await?;
        tokio::spawn(background);
        Ok(client)
    }

    fn zone_for(&self, domain: &str) -> String {
        find_zone(domain, self.config.zones.iter().map(String::as_str))
            .unwrap_or(domain)
            .to_string()
    }
}

/// One UPDATE that deletes the `A` rrset of `name` and adds `ip`. The server applies the whole
/// update section or none of it.
fn replace_a_message(zone: Name, name: Name, ip: Ipv4Addr) -> Message {
    let existing = Record::with(name.clone(), RecordType::A, 0);
    let mut message = update_message::delete_rrset(existing, zone, false);
    message.add_update(Record::from_rdata(name, RECORD_TTL, RData::A(ip)));
    message
}

fn fqdn(name: &str) -> Result<Name, Error> {
    Ok(Name::from_str(&format!("{}.", name.trim_end_matches('.')))?)
}

fn check(domain: &str, code: ResponseCode) -> Result<(), Error> {
    match code {
        ResponseCode::NoError => Ok(()),
        code => Err(Error::DnsUpdateRefused(domain.to_string(), code)),
    }
}

#[async_trait::async_trait]
impl DnsProvider for Rfc2136Provider {
    async fn verify(&self) -> Result<(), Error> {
        let mut client = self.client().await?;
        for zone in &self.config.zones {
            let response = client
                .query(fqdn(zone)?, DNSClass::IN, RecordType::SOA)
                .await?;
            check(zone, response.response_code())?;
        }
        tracing::info!("RFC 2136 server {} reachable", self.config.server);
        Ok(())
    }

    async fn get_a_record(&self, domain: &str) -> Result<Option<ARecord>, Error> {
        let mut client = self.client().await?;
        let response = client
            .query(fqdn(domain)?, DNSClass::IN, RecordType::A)
            .await?;
        if response.response_code() == ResponseCode::NXDomain {
            tracing::info!("[{domain}] no 'A' record found");
            return Ok(None);
        }
        check(domain, response.response_code())?;
        let address = response.answers().iter().find_map(|record| match record.data() {
            Some(RData::A(ip)) => Some(*ip),
            _ => None,
        });
        if address.is_none() {
            tracing::info!("[{domain}] no 'A' record found");
        }
        Ok(address.map(ARecord::Address))
    }

    async fn update_a_record(&self, domain: &str, ip: Ipv4Addr) -> Result<(), Error> {
        let zone = fqdn(&self.zone_for(domain))?;
        let name = fqdn(domain)?;
        let mut client = self.client().await?;
        let response = client
            .send(replace_a_message(zone, name, ip))
            .first_answer()
            .await?;
        check(domain, response.response_code())
    }

    fn certbot_args(&self) -> Vec<String> {
        vec![
            "--dns-rfc2136".into(),
            "--dns-rfc2136-credentials".into(),
            self.config.credentials.display().to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use trust_dns_client::op::{MessageType, OpCode};

    fn provider_at(server: SocketAddr, zones: &[&str]) -> Rfc2136Provider {
        Rfc2136Provider::new(Rfc2136Config {
            server,
            zones: zones.iter().map(ToString::to_string).collect(),
            credentials: PathBuf::from("/config/rfc2136.ini"),
        })
    }

    fn provider(zones: &[&str]) -> Rfc2136Provider {
        provider_at("127.0.0.1:53".parse().unwrap(), zones)
    }

    type Received = Arc<Mutex<Vec<Message>>>;

    /// A UDP name server holding at most one `A` record. Updates are answered with `update_code`
    /// and applied only when it is `NoError`.
    async fn name_server(record: Option<Ipv4Addr>, update_code: ResponseCode) -> (SocketAddr, Received) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let received = Received::default();
        let log = received.clone();
        tokio::spawn(async move {
            let mut record = record;
            let mut buf = [0u8; 4096];
            loop {
                let (len, peer) = socket.recv_from(&mut buf).await.unwrap();
                let request = Message::from_vec(&buf[..len]).unwrap();
                let mut response = Message::new();
                response
                    .set_id(request.id())
                    .set_message_type(MessageType::Response)
                    .set_op_code(request.op_code())
                    .add_queries(request.queries().to_vec());
                match request.op_code() {
                    OpCode::Update => {
                        response.set_response_code(update_code);
                        if update_code == ResponseCode::NoError {
                            // The update section travels in the authority section.
                            for update in request.name_servers() {
                                match update.data() {
                                    Some(RData::A(ip)) => record = Some(*ip),
                                    _ => record = None,
                                }
                            }
                        }
                    }
                    _ => {
                        let query = &request.queries()[0];
                        match (query.query_type(), record) {
                            (RecordType::A, Some(ip)) => {
                                response.add_answer(Record::from_rdata(
                                    query.name().clone(),
                                    300,
                                    RData::A(ip),
                                ));
                            }
                            (RecordType::A, None) => {
                                response.set_response_code(ResponseCode::NXDomain);
                            }
                            _ => {}
                        }
                    }
                }
                log.lock().unwrap().push(request);
                socket
                    .send_to(&response.to_vec().unwrap(), peer)
                    .await
                    .unwrap();
            }
        });
        (addr, received)
    }

    #[tokio::test]
    async fn verifies_and_reads_records() {
        let (addr, _) = name_server(Some(Ipv4Addr::new(198, 51, 100, 1)), ResponseCode::NoError).await;
        let dns = provider_at(addr, &["example.com"]);
        dns.verify().await.unwrap();
        assert_eq!(
            dns.get_a_record("home.example.com").await.unwrap(),
            Some(ARecord::Address(Ipv4Addr::new(198, 51, 100, 1)))
        );

        let (addr, _) = name_server(None, ResponseCode::NoError).await;
        assert_eq!(
            provider_at(addr, &[]).get_a_record("home.example.com").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn replaces_the_record_in_one_update() {
        let (addr, received) =
            name_server(Some(Ipv4Addr::new(198, 51, 100, 1)), ResponseCode::NoError).await;
        let dns = provider_at(addr, &["example.com"]);
        let ip = Ipv4Addr::new(203, 0, 113, 7);
        dns.update_a_record("home.example.com", ip).await.unwrap();

        let updates: Vec<Message> = received
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.op_code() == OpCode::Update)
            .cloned()
            .collect();
        assert_eq!(updates.len(), 1);
        let update = &updates[0];
        assert_eq!(update.queries()[0].name().to_string(), "example.com.");
        let records = update.name_servers();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].dns_class(), DNSClass::ANY);
        assert_eq!(records[0].record_type(), RecordType::A);
        assert_eq!(records[1].data(), Some(&RData::A(ip)));
        assert_eq!(
            dns.get_a_record("home.example.com").await.unwrap(),
            Some(ARecord::Address(ip))
        );
    }

    #[tokio::test]
    async fn refused_update_keeps_the_old_record() {
        let old = Ipv4Addr::new(198, 51, 100, 1);
        let (addr, _) = name_server(Some(old), ResponseCode::Refused).await;
        let dns = provider_at(addr, &["example.com"]);
        assert!(matches!(
            dns.update_a_record("home.example.com", Ipv4Addr::new(203, 0, 113, 7)).await,
            Err(Error::DnsUpdateRefused(d, ResponseCode::Refused)) if d == "home.example.com"
        ));
        assert_eq!(
            dns.get_a_record("home.example.com").await.unwrap(),
            Some(ARecord::Address(old))
        );
    }

    #[test]
    fn zone_defaults_to_domain() {
        assert_eq!(provider(&[]).zone_for("home.example.com"), "home.example.com");
        assert_eq!(
            provider(&["example.com", "example.org"]).zone_for("home.example.com"),
            "example.com"
        );
    }

    #[test]
    fn names_are_fully_qualified() {
        assert!(fqdn("example.com").unwrap().is_fqdn());
        assert_eq!(fqdn("example.com.").unwrap().to_string(), "example.com.");
    }

    #[test]
    fn certbot_plugin() {
        assert_eq!(
            provider(&[]).certbot_args(),
            vec![
                "--dns-rfc2136",
                "--dns-rfc2136-credentials",
                "/config/rfc2136.ini"
            ]
        );
    }

    #[test]
    fn refused_updates() {
        assert!(check("example.com", ResponseCode::NoError).is_ok());
        assert!(matches!(
            check("example.com", ResponseCode::Refused),
            Err(Error::DnsUpdateRefused(_, ResponseCode::Refused))
        ));
    }
}
