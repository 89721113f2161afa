use crate::config::AwsCredentials;
use crate::dns::sigv4::{self, UnsignedRequest};
use crate::dns::{find_zone, ARecord, DnsProvider, RECORD_TTL};
use crate::error::Error;
use chrono::Utc;
use quick_xml::escape::escape;
use reqwest::header::AUTHORIZATION;
use reqwest::Method;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://route53.amazonaws.com";
const API_VERSION: &str = "2013-04-01";
const REGION: &str = "us-east-1";
const SERVICE: &str = "route53";
const XMLNS: &str = "https://route53.amazonaws.com/doc/2013-04-01/";

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct ListHostedZonesResponse {
    #[serde(default)]
    hosted_zones: HostedZones,
    #[serde(default)]
    is_truncated: bool,
    next_marker: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct HostedZones {
    #[serde(rename = "HostedZone", default)]
    zones: Vec<HostedZone>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
struct HostedZone {
    id: String,
    name: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct ListResourceRecordSetsResponse {
    #[serde(default)]
    resource_record_sets: ResourceRecordSets,
}

#[derive(Deserialize, Debug, Default)]
struct ResourceRecordSets {
    #[serde(rename = "ResourceRecordSet", default)]
    sets: Vec<ResourceRecordSet>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct ResourceRecordSet {
    name: String,
    #[serde(rename = "Type")]
    record_type: String,
    resource_records: Option<ResourceRecords>,
    alias_target: Option<AliasTarget>,
}

#[derive(Deserialize, Debug)]
struct ResourceRecords {
    #[serde(rename = "ResourceRecord", default)]
    records: Vec<ResourceRecord>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct ResourceRecord {
    value: String,
}

#[derive(Deserialize, Debug)]
struct AliasTarget {
    #[serde(rename = "DNSName")]
    dns_name: String,
}

/// Route 53 over its REST API.
#[derive(Debug, Clone)]
pub struct Route53Provider {
    credentials: AwsCredentials,
    client: reqwest::Client,
    endpoint: String,
}

impl Route53Provider {
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client can't be built.
    pub fn new(credentials: AwsCredentials) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            credentials,
            client,
            endpoint: DEFAULT_ENDPOINT.into(),
        })
    }

    /// Send requests to `endpoint` (scheme, host and port, no trailing slash) instead of AWS.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<String>,
    ) -> Result<String, Error> {
        let host = self
            .endpoint
            .split_once("://")
            .map_or(self.endpoint.as_str(), |(_, host)| host);
        let payload = body.unwrap_or_default();
        let signature = sigv4::sign(
            &self.credentials,
            REGION,
            SERVICE,
            &UnsignedRequest {
                method: method.as_str(),
                host,
                path,
                query,
                headers: &[],
                payload: payload.as_bytes(),
            },
            Utc::now(),
        );

        let mut url = format!("{}{path}", self.endpoint);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&sigv4::canonical_query(query));
        }

        let mut builder = self
            .client
            .request(method, url)
            .header("x-amz-date", signature.amz_date)
            .header(AUTHORIZATION, signature.authorization);
        if !payload.is_empty() {
            builder = builder.header("content-type", "text/xml").body(payload);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::Route53 {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }

    async fn hosted_zones(&self) -> Result<Vec<HostedZone>, Error> {
        let path = format!("/{API_VERSION}/hostedzone");
        let mut zones = vec![];
        let mut marker: Option<String> = None;
        loop {
            let query: Vec<(&str, &str)> = match &marker {
                Some(m) => vec![("marker", m.as_str())],
                None => vec![],
            };
            let page: ListHostedZonesResponse =
                quick_xml::de::from_str(&self.request(Method::GET, &path, &query, None).await?)?;
            zones.extend(page.hosted_zones.zones);
            match (page.is_truncated, page.next_marker) {
                (true, Some(next)) => marker = Some(next),
                _ => return Ok(zones),
            }
        }
    }

    async fn zone_id(&self, domain: &str) -> Result<String, Error> {
        let zones = self.hosted_zones().await?;
        let name = find_zone(domain, zones.iter().map(|z| z.name.as_str()))
            .ok_or_else(|| Error::NoZone(domain.to_string()))?;
        // NB: find_zone returns one of the names we passed in.
        let zone = zones.iter().find(|z| z.name == name).ok_or_else(|| Error::NoZone(domain.to_string()))?;
        Ok(zone
            .id
            .strip_prefix("/hostedzone/")
            .unwrap_or(&zone.id)
            .to_string())
    }
}

fn record_from_response(domain: &str, xml: &str) -> Result<Option<ARecord>, Error> {
    let response: ListResourceRecordSetsResponse = quick_xml::de::from_str(xml)?;
    let Some(set) = response.resource_record_sets.sets.into_iter().next() else {
        tracing::info!("[{domain}] no 'A' record found");
        return Ok(None);
    };
    if !set.name.eq_ignore_ascii_case(&format!("{domain}.")) || set.record_type != "A" {
        tracing::info!("[{domain}] no 'A' record found");
        return Ok(None);
    }
    if let Some(alias) = set.alias_target {
        tracing::warn!("[{domain}] is an ALIAS record, DDNS cannot update it");
        return Ok(Some(ARecord::Alias(alias.dns_name)));
    }
    match set.resource_records.and_then(|r| r.records.into_iter().next()) {
        Some(record) => match record.value.trim().parse() {
            Ok(ip) => Ok(Some(ARecord::Address(ip))),
            Err(_) => {
                tracing::warn!("[{domain}] 'A' record has a non-IPv4 value: {}", record.value);
                Ok(None)
            }
        },
        None => {
            tracing::warn!("[{domain}] record has neither values nor an alias target");
            Ok(None)
        }
    }
}

fn upsert_request(domain: &str, ip: Ipv4Addr) -> String {
    let domain = escape(domain);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ChangeResourceRecordSetsRequest xmlns="{XMLNS}">
  <ChangeBatch>
    <Comment>Domain Manager DDNS update to {ip}</Comment>
    <Changes>
      <Change>
        <Action>UPSERT</Action>
        <ResourceRecordSet>
          <Name>{domain}</Name>
          <Type>A</Type>
          <TTL>{RECORD_TTL}</TTL>
          <ResourceRecords>
            <ResourceRecord>
              <Value>{ip}</Value>
            </ResourceRecord>
          </ResourceRecords>
        </ResourceRecordSet>
      </Change>
    </Changes>
  </ChangeBatch>
</ChangeResourceRecordSetsRequest>"#
    )
}

#[async_trait::async_trait]
impl DnsProvider for Route53Provider {
    async fn verify(&self) -> Result<(), Error> {
        let path = format!("/{API_VERSION}/hostedzone");
        self.request(Method::GET, &path, &[("maxitems", "1")], None)
            .await?;
        tracing::info!("route 53 client initialized");
        Ok(())
    }

    async fn get_a_record(&self, domain: &str) -> Result<Option<ARecord>, Error> {
        let zone_id = self.zone_id(domain).await?;
        let path = format!("/{API_VERSION}/hostedzone/{zone_id}/rrset");
        let xml = self
            .request(
                Method::GET,
                &path,
                &[("name", domain), ("type", "A"), ("maxitems", "1")],
                None,
            )
            .await?;
        record_from_response(domain, &xml)
    }

    async fn update_a_record(&self, domain: &str, ip: Ipv4Addr) -> Result<(), Error> {
        let zone_id = self.zone_id(domain).await?;
        let path = format!("/{API_VERSION}/hostedzone/{zone_id}/rrset/");
        self.request(Method::POST, &path, &[], Some(upsert_request(domain, ip)))
            .await?;
        Ok(())
    }

    fn certbot_args(&self) -> Vec<String> {
        vec!["--dns-route53".into()]
    }
}
