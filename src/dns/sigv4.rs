//! AWS Signature Version 4 request signing.
//!
//! Only what the Route 53 client needs: header-based signing of requests with a fully
//! buffered payload.

use crate::config::AwsCredentials;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use lazy_static::lazy_static;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

lazy_static! {
    static ref EMPTY_PAYLOAD_HASH: String = hex::encode(Sha256::digest(b""));
}

pub(super) struct UnsignedRequest<'a> {
    pub method: &'a str,
    pub host: &'a str,
    pub path: &'a str,
    pub query: &'a [(&'a str, &'a str)],
    /// Extra headers to sign. `host` and `x-amz-date` are always added.
    pub headers: &'a [(&'a str, &'a str)],
    pub payload: &'a [u8],
}

#[derive(Debug)]
pub(super) struct Signature {
    pub amz_date: String,
    pub authorization: String,
}

pub(super) fn sign(
    credentials: &AwsCredentials,
    region: &str,
    service: &str,
    request: &UnsignedRequest<'_>,
    now: DateTime<Utc>,
) -> Signature {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    let (canonical, signed_headers) = canonical_request(request, &amz_date);
    let scope = format!("{date}/{region}/{service}/aws4_request");
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical.as_bytes()))
    );
    let key = signing_key(&credentials.secret_access_key, &date, region, service);
    let signature = hex::encode(hmac(&key, &string_to_sign));

    Signature {
        authorization: format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            credentials.access_key_id
        ),
        amz_date,
    }
}

/// The canonical request and its signed header list.
fn canonical_request(request: &UnsignedRequest<'_>, amz_date: &str) -> (String, String) {
    let mut headers: Vec<(String, String)> = request
        .headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_string()))
        .chain([
            ("host".to_string(), request.host.to_string()),
            ("x-amz-date".to_string(), amz_date.to_string()),
        ])
        .collect();
    headers.sort();
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let payload_hash = if request.payload.is_empty() {
        EMPTY_PAYLOAD_HASH.clone()
    } else {
        hex::encode(Sha256::digest(request.payload))
    };

    let path = canonical_path(request.path);
    let query = canonical_query(request.query);
    let canonical = [
        request.method,
        path.as_str(),
        query.as_str(),
        canonical_headers.as_str(),
        signed_headers.as_str(),
        payload_hash.as_str(),
    ]
    .join("\n");
    (canonical, signed_headers)
}

fn signing_key(secret_access_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    [region, service, "aws4_request"].iter().fold(
        hmac(format!("AWS4{secret_access_key}").as_bytes(), date),
        |key, part| hmac(&key, part),
    )
}

fn hmac(key: &[u8], data: &str) -> Vec<u8> {
    // NB: HMAC accepts keys of any length, new_from_slice can't fail.
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC key of any length");
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

fn canonical_path(path: &str) -> String {
    if path.is_empty() {
        return "/".into();
    }
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

pub(super) fn canonical_query(query: &[(&str, &str)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (urlencoding::encode(k).into_owned(), urlencoding::encode(v).into_owned()))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}
