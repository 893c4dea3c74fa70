//! AWS Signature Version 4 header signing.
//!
//! Uploads stream with an unknown length, so every request declares
//! `UNSIGNED-PAYLOAD` instead of a body digest; the signature then covers
//! method, path, query and the signing headers only.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

pub(crate) const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";
const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

// The characters SigV4 leaves unencoded: unreserved per RFC 3986.
const SIGV4_ENCODE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

pub(crate) fn uri_encode(value: &str, keep_slashes: bool) -> String {
    if keep_slashes {
        value.split('/').map(|seg| uri_encode(seg, false)).collect::<Vec<_>>().join("/")
    } else {
        utf8_percent_encode(value, SIGV4_ENCODE).to_string()
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        use std::fmt::Write;
        let _ = write!(out, "{:02x}", b);
        out
    })
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// The headers to attach to one signed request.
pub(crate) struct SignedHeaders {
    pub authorization: String,
    pub amz_date: String,
    pub content_sha256: &'static str,
}

#[derive(Clone)]
pub(crate) struct Signer {
    access_key: String,
    secret_key: SecretString,
    region: String,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("access_key", &self.access_key)
            .field("region", &self.region)
            .finish()
    }
}

impl Signer {
    pub fn new(access_key: String, secret_key: SecretString, region: String) -> Self {
        let region = if region.is_empty() { "us-east-1".to_string() } else { region };
        Signer {
            access_key,
            secret_key,
            region,
        }
    }

    /// Signs one request. `path` is the absolute, already-encoded URI path;
    /// `query` are the raw (unencoded) query pairs.
    pub fn sign(&self, method: &str, host: &str, path: &str, query: &[(String, String)], now: DateTime<Utc>) -> SignedHeaders {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{}/{}/s3/aws4_request", date, self.region);

        let mut pairs: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| (uri_encode(k, false), uri_encode(v, false)))
            .collect();
        pairs.sort();
        let canonical_query = pairs.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join("&");

        let canonical_headers = format!("host:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n", host, UNSIGNED_PAYLOAD, amz_date);
        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, path, canonical_query, canonical_headers, SIGNED_HEADERS, UNSIGNED_PAYLOAD
        );

        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            scope,
            hex(&Sha256::digest(canonical_request.as_bytes()))
        );

        let k_date = hmac(format!("AWS4{}", self.secret_key.expose_secret()).as_bytes(), date.as_bytes());
        let k_region = hmac(&k_date, self.region.as_bytes());
        let k_service = hmac(&k_region, b"s3");
        let k_signing = hmac(&k_service, b"aws4_request");
        let signature = hex(&hmac(&k_signing, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.access_key, scope, SIGNED_HEADERS, signature
        );

        SignedHeaders {
            authorization,
            amz_date,
            content_sha256: UNSIGNED_PAYLOAD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn signer() -> Signer {
        Signer::new("AKIDEXAMPLE".to_string(), SecretString::from("secret".to_string()), "eu-west-1".to_string())
    }

    #[test]
    fn uri_encoding_keeps_unreserved_and_slashes() {
        assert_eq!(uri_encode("tenants/alice/hello world.txt", true), "tenants/alice/hello%20world.txt");
        assert_eq!(uri_encode("a+b=c", false), "a%2Bb%3Dc");
        assert_eq!(uri_encode("safe-._~chars", false), "safe-._~chars");
    }

    #[test]
    fn signature_is_deterministic_and_scoped() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        let headers = signer().sign("GET", "minio.local:9000", "/b/key", &[], now);

        assert_eq!(headers.amz_date, "20260314T092653Z");
        assert!(headers.authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20260314/eu-west-1/s3/aws4_request"));
        assert!(headers.authorization.contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date"));

        // Same inputs, same signature; different path, different signature.
        let again = signer().sign("GET", "minio.local:9000", "/b/key", &[], now);
        assert_eq!(headers.authorization, again.authorization);
        let other = signer().sign("GET", "minio.local:9000", "/b/other", &[], now);
        assert_ne!(headers.authorization, other.authorization);
    }

    #[test]
    fn query_pairs_are_sorted_into_the_signature() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        let q1 = vec![("prefix".to_string(), "a/".to_string()), ("list-type".to_string(), "2".to_string())];
        let q2 = vec![("list-type".to_string(), "2".to_string()), ("prefix".to_string(), "a/".to_string())];
        let h1 = signer().sign("GET", "h", "/b", &q1, now);
        let h2 = signer().sign("GET", "h", "/b", &q2, now);
        assert_eq!(h1.authorization, h2.authorization);
    }

    #[test]
    fn empty_region_defaults() {
        let signer = Signer::new("k".into(), SecretString::from("s".to_string()), String::new());
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let headers = signer.sign("GET", "h", "/", &[], now);
        assert!(headers.authorization.contains("/us-east-1/s3/aws4_request"));
    }
}
