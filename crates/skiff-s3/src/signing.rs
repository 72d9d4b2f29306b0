//! AWS Signature Version 4.
//!
//! The four canonical steps — canonical request, string to sign, signing
//! key derivation, signature — implemented directly over `hmac`/`sha2`.
//! Reference: <https://docs.aws.amazon.com/general/latest/gr/sigv4_signing.html>

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// SHA-256 of an empty payload.
pub const EMPTY_PAYLOAD_HASH: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

#[derive(Debug, Clone)]
pub struct SigV4Signer {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub service: String,
}

impl SigV4Signer {
    pub fn new(access_key_id: &str, secret_access_key: &str, region: &str) -> Self {
        Self {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            region: region.to_string(),
            service: "s3".to_string(),
        }
    }

    /// Produce the headers for a signed request. `payload_hash` is the hex
    /// SHA-256 of the body (S3 requires it even for streamed bodies).
    pub fn sign(
        &self,
        method: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
        payload_hash: &str,
        timestamp: DateTime<Utc>,
    ) -> BTreeMap<String, String> {
        let date_stamp = timestamp.format("%Y%m%d").to_string();
        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();

        let mut signed_headers = headers.clone();
        signed_headers.insert("x-amz-date".to_string(), amz_date.clone());
        signed_headers.insert("x-amz-content-sha256".to_string(), payload_hash.to_string());

        let (canonical_uri, canonical_querystring) = parse_url_components(url);
        let canonical_headers: String = signed_headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k.to_lowercase(), v.trim()))
            .collect();
        let signed_header_names = signed_header_names(&signed_headers);

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method,
            canonical_uri,
            canonical_querystring,
            canonical_headers,
            signed_header_names,
            payload_hash
        );

        let credential_scope =
            format!("{}/{}/{}/aws4_request", date_stamp, self.region, self.service);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            credential_scope,
            sha256_hex(canonical_request.as_bytes())
        );

        let signing_key = self.derive_signing_key(&date_stamp);
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.access_key_id, credential_scope, signed_header_names, signature
        );
        signed_headers.insert("authorization".to_string(), authorization);
        signed_headers
    }

    /// kSecret = "AWS4"+secret; kDate; kRegion; kService; kSigning.
    fn derive_signing_key(&self, date_stamp: &str) -> Vec<u8> {
        let k_secret = format!("AWS4{}", self.secret_access_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        hmac_sha256(&k_service, b"aws4_request")
    }
}

fn signed_header_names(headers: &BTreeMap<String, String>) -> String {
    let mut names: Vec<String> = headers.keys().map(|k| k.to_lowercase()).collect();
    names.sort();
    names.join(";")
}

// ── Helper functions ────────────────────────────────────────────────────

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Split a URL into (canonical_uri, canonical_querystring) with the query
/// parameters sorted as SigV4 requires.
fn parse_url_components(url: &str) -> (String, String) {
    match url::Url::parse(url) {
        Ok(parsed) => {
            // The path is already percent-encoded on the wire; the
            // canonical URI must match it byte-for-byte, not re-encode it.
            let path = if parsed.path().is_empty() {
                "/".to_string()
            } else {
                parsed.path().to_string()
            };

            let mut query_params: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            query_params.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

            let query_string = query_params
                .iter()
                .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
                .collect::<Vec<_>>()
                .join("&");

            (path, query_string)
        }
        Err(_) => ("/".to_string(), String::new()),
    }
}

/// URI-encode per the SigV4 rules: everything except unreserved characters.
pub fn uri_encode(input: &str) -> String {
    use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
    const SIGV4_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
        .remove(b'-')
        .remove(b'_')
        .remove(b'.')
        .remove(b'~');
    utf8_percent_encode(input, SIGV4_ENCODE_SET).to_string()
}

/// Encode a URL path, preserving forward slashes.
pub fn uri_encode_path(path: &str) -> String {
    path.split('/')
        .map(uri_encode)
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_signer() -> SigV4Signer {
        SigV4Signer::new(
            "AKIDEXAMPLE",
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "us-east-1",
        )
    }

    #[test]
    fn sha256_empty() {
        assert_eq!(sha256_hex(b""), EMPTY_PAYLOAD_HASH);
    }

    #[test]
    fn sha256_known_value() {
        assert_eq!(
            sha256_hex(b"test"),
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }

    #[test]
    fn signing_key_is_hmac_sized() {
        assert_eq!(test_signer().derive_signing_key("20150830").len(), 32);
    }

    #[test]
    fn uri_encoding() {
        assert_eq!(uri_encode("hello world"), "hello%20world");
        assert_eq!(uri_encode("abcABC123-_.~"), "abcABC123-_.~");
        assert_eq!(uri_encode("key=value"), "key%3Dvalue");
        assert_eq!(uri_encode_path("/a b/c"), "/a%20b/c");
    }

    #[test]
    fn query_params_sorted() {
        let (_, query) = parse_url_components("https://example.com/?Z=1&A=2&M=3");
        assert_eq!(query, "A=2&M=3&Z=1");
    }

    #[test]
    fn encoded_path_is_not_reencoded() {
        let (path, _) = parse_url_components("https://b.s3.amazonaws.com/dir/my%20file.txt");
        assert_eq!(path, "/dir/my%20file.txt");
    }

    #[test]
    fn sign_adds_required_headers() {
        let signer = test_signer();
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), "s3.us-east-1.amazonaws.com".to_string());

        let ts = Utc::now();
        let signed = signer.sign(
            "GET",
            "https://s3.us-east-1.amazonaws.com/bucket/key",
            &headers,
            EMPTY_PAYLOAD_HASH,
            ts,
        );
        assert!(signed.contains_key("x-amz-date"));
        assert!(signed.contains_key("x-amz-content-sha256"));
        let auth = &signed["authorization"];
        assert!(auth.starts_with("AWS4-HMAC-SHA256"));
        assert!(auth.contains("Credential=AKIDEXAMPLE/"));
        assert!(auth.contains("SignedHeaders="));
        assert!(auth.contains("Signature="));
    }

    #[test]
    fn signature_deterministic_for_fixed_timestamp() {
        // From the AWS SigV4 test-suite setup (get-vanilla).
        let signer = test_signer();
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), "example.amazonaws.com".to_string());

        let ts = chrono::NaiveDate::from_ymd_opt(2015, 8, 30)
            .unwrap()
            .and_hms_opt(12, 36, 0)
            .unwrap()
            .and_utc();

        let a = signer.sign("GET", "https://example.amazonaws.com/", &headers, EMPTY_PAYLOAD_HASH, ts);
        let b = signer.sign("GET", "https://example.amazonaws.com/", &headers, EMPTY_PAYLOAD_HASH, ts);
        assert_eq!(a["authorization"], b["authorization"]);
        assert!(a["authorization"]
            .contains("Credential=AKIDEXAMPLE/20150830/us-east-1/s3/aws4_request"));
    }
}
