//! Request signing.
//!
//! HMAC-SHA256 over a canonical rendering of the request, SigV4-shaped:
//! the signature is a pure function of the request, the four credential
//! fields and the clock. Verification lives on the server; the only
//! contract here is that a well-formed request comes back with
//! authentication headers attached.

use crate::transport::HttpRequest;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SCOPE_SUFFIX: &str = "aws4_request";

/// The four credential fields the signer is parameterized by.
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    pub access_key: &'a str,
    pub secret: &'a str,
    pub service: &'a str,
    pub region: &'a str,
}

/// Attaches `x-amz-date` and `Authorization` headers computed over the
/// request's method, path, headers and body.
pub fn sign(request: &mut HttpRequest, credentials: &Credentials<'_>, now: DateTime<Utc>) {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    request.headers.push(("x-amz-date".into(), amz_date.clone()));

    let mut canonical_headers: Vec<(String, String)> = request
        .headers
        .iter()
        .map(|(n, v)| (n.to_lowercase(), v.trim().to_string()))
        .collect();
    canonical_headers.sort();
    let signed_headers = canonical_headers
        .iter()
        .map(|(n, _)| n.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let mut canonical_request = String::new();
    canonical_request.push_str("POST\n");
    canonical_request.push_str(&request.path);
    canonical_request.push_str("\n\n"); // no query string
    for (name, value) in &canonical_headers {
        canonical_request.push_str(name);
        canonical_request.push(':');
        canonical_request.push_str(value);
        canonical_request.push('\n');
    }
    canonical_request.push('\n');
    canonical_request.push_str(&signed_headers);
    canonical_request.push('\n');
    canonical_request.push_str(&hex_sha256(&request.body));

    let scope = format!(
        "{date}/{}/{}/{SCOPE_SUFFIX}",
        credentials.region, credentials.service
    );
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex_sha256(canonical_request.as_bytes())
    );

    let key = signing_key(credentials, &date);
    let signature = hex::encode(hmac_bytes(&key, string_to_sign.as_bytes()));

    let authorization = format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
        credentials.access_key
    );
    request.headers.push(("authorization".into(), authorization));
}

fn signing_key(credentials: &Credentials<'_>, date: &str) -> Vec<u8> {
    let k_date = hmac_bytes(
        format!("AWS4{}", credentials.secret).as_bytes(),
        date.as_bytes(),
    );
    let k_region = hmac_bytes(&k_date, credentials.region.as_bytes());
    let k_service = hmac_bytes(&k_region, credentials.service.as_bytes());
    hmac_bytes(&k_service, SCOPE_SUFFIX.as_bytes())
}

fn hmac_bytes(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::TimeZone;

    fn request() -> HttpRequest {
        HttpRequest {
            host: "db.example.com".into(),
            port: 443,
            path: "/".into(),
            headers: vec![
                ("host".into(), "db.example.com".into()),
                ("x-nano-op".into(), "datomic.client.protocol/status".into()),
            ],
            body: Bytes::from_static(b"\x81\xa2~:t\x01"),
        }
    }

    fn credentials() -> Credentials<'static> {
        Credentials {
            access_key: "AK",
            secret: "SECRET",
            service: "peer-server",
            region: "none",
        }
    }

    #[test]
    fn test_sign_attaches_headers() {
        let mut req = request();
        let now = Utc.with_ymd_and_hms(2023, 5, 1, 12, 0, 0).unwrap();
        sign(&mut req, &credentials(), now);
        assert_eq!(req.header("x-amz-date"), Some("20230501T120000Z"));
        let auth = req.header("authorization").unwrap();
        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AK/20230501/none/peer-server/aws4_request"));
        assert!(auth.contains("SignedHeaders=host;x-amz-date;x-nano-op"));
        assert!(auth.contains("Signature="));
    }

    #[test]
    fn test_signature_is_deterministic() {
        let now = Utc.with_ymd_and_hms(2023, 5, 1, 12, 0, 0).unwrap();
        let mut a = request();
        let mut b = request();
        sign(&mut a, &credentials(), now);
        sign(&mut b, &credentials(), now);
        assert_eq!(a.header("authorization"), b.header("authorization"));
    }

    #[test]
    fn test_signature_depends_on_secret_and_body() {
        let now = Utc.with_ymd_and_hms(2023, 5, 1, 12, 0, 0).unwrap();
        let mut a = request();
        sign(&mut a, &credentials(), now);

        let mut b = request();
        let other = Credentials {
            secret: "OTHER",
            ..credentials()
        };
        sign(&mut b, &other, now);
        assert_ne!(a.header("authorization"), b.header("authorization"));

        let mut c = request();
        c.body = Bytes::from_static(b"different");
        sign(&mut c, &credentials(), now);
        assert_ne!(a.header("authorization"), c.header("authorization"));
    }
}
