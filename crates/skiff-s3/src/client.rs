//! Signed HTTP plumbing shared by every S3 operation.

use crate::error::{S3Error, S3Result};
use crate::signing::{sha256_hex, uri_encode, uri_encode_path, SigV4Signer};
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Config {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default = "default_region")]
    pub region: String,
    pub bucket: String,
    /// Custom endpoint (MinIO, LocalStack, …). Switches to path-style
    /// addressing.
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// S3 REST client. Cheap to clone; concurrent part uploads clone it freely.
#[derive(Debug, Clone)]
pub struct S3Client {
    http: reqwest::Client,
    signer: SigV4Signer,
    pub config: S3Config,
}

pub(crate) struct S3Response {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl S3Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl S3Client {
    pub fn new(config: S3Config) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(8)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let signer = SigV4Signer::new(
            &config.access_key_id,
            &config.secret_access_key,
            &config.region,
        );
        Self { http, signer, config }
    }

    /// Base URL addressing the bucket. Virtual-hosted against AWS proper,
    /// path-style whenever a custom endpoint is configured.
    pub fn bucket_url(&self) -> String {
        match self.config.endpoint {
            Some(ref endpoint) => {
                format!("{}/{}", endpoint.trim_end_matches('/'), self.config.bucket)
            }
            None => format!(
                "https://{}.s3.{}.amazonaws.com",
                self.config.bucket, self.config.region
            ),
        }
    }

    /// Full URL for an object key plus query parameters.
    pub fn object_url(&self, key: &str, query: &BTreeMap<String, String>) -> String {
        let mut url = format!("{}/{}", self.bucket_url(), uri_encode_path(key));
        if !query.is_empty() {
            let qs = query
                .iter()
                .map(|(k, v)| {
                    if v.is_empty() {
                        uri_encode(k)
                    } else {
                        format!("{}={}", uri_encode(k), uri_encode(v))
                    }
                })
                .collect::<Vec<_>>()
                .join("&");
            url.push('?');
            url.push_str(&qs);
        }
        url
    }

    fn host_of(url: &str) -> S3Result<String> {
        let parsed =
            url::Url::parse(url).map_err(|e| S3Error::parse(format!("Bad URL '{}': {}", url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| S3Error::parse(format!("No host in '{}'", url)))?;
        Ok(match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        })
    }

    /// Execute one signed request with a buffered body and response.
    pub(crate) async fn request(
        &self,
        method: &str,
        url: &str,
        extra_headers: BTreeMap<String, String>,
        body: Bytes,
    ) -> S3Result<S3Response> {
        let response = self.send(method, url, extra_headers, body).await?;
        let status = response.status().as_u16();
        let headers = header_map(&response);
        let body = response.bytes().await?;

        if (200..300).contains(&status) {
            Ok(S3Response { status, headers, body })
        } else {
            Err(error_from_response(status, &body, method))
        }
    }

    /// Execute a signed request and hand back the streaming response
    /// (used by downloads so the body never sits in memory).
    pub(crate) async fn request_stream(
        &self,
        method: &str,
        url: &str,
        extra_headers: BTreeMap<String, String>,
    ) -> S3Result<reqwest::Response> {
        let response = self.send(method, url, extra_headers, Bytes::new()).await?;
        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            Ok(response)
        } else {
            let body = response.bytes().await.unwrap_or_default();
            Err(error_from_response(status, &body, method))
        }
    }

    async fn send(
        &self,
        method: &str,
        url: &str,
        mut headers: BTreeMap<String, String>,
        body: Bytes,
    ) -> S3Result<reqwest::Response> {
        headers.insert("host".to_string(), Self::host_of(url)?);
        let payload_hash = sha256_hex(&body);
        let signed = self.signer.sign(method, url, &headers, &payload_hash, Utc::now());

        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|e| S3Error::parse(e.to_string()))?;
        let mut request = self.http.request(method, url);
        for (k, v) in &signed {
            if k != "host" {
                request = request.header(k, v);
            }
        }
        if !body.is_empty() {
            request = request.body(body);
        }
        Ok(request.send().await?)
    }
}

fn header_map(response: &reqwest::Response) -> BTreeMap<String, String> {
    response
        .headers()
        .iter()
        .filter_map(|(k, v)| {
            v.to_str()
                .ok()
                .map(|v| (k.as_str().to_lowercase(), v.to_string()))
        })
        .collect()
}

/// Turn a non-2xx response into an `S3Error`, parsing the XML error body
/// when one exists (HEAD replies have none).
fn error_from_response(status: u16, body: &[u8], method: &str) -> S3Error {
    let text = String::from_utf8_lossy(body);
    let code = xml_text(&text, "Code");
    let message = xml_text(&text, "Message");
    match (code, message) {
        (Some(code), message) => S3Error {
            code,
            message: message.unwrap_or_else(|| text.into_owned()),
            status,
        },
        (None, _) => {
            let code = match status {
                403 => "AccessDenied",
                404 => "NotFound",
                _ => "HttpError",
            };
            S3Error::new(code, format!("{} returned HTTP {}", method, status), status)
        }
    }
}

// ── Minimal XML extraction ──────────────────────────────────────────────
//
// S3's list/error/multipart XML is flat enough that tag scanning beats a
// parser dependency.

pub(crate) fn xml_text(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(xml_unescape(&xml[start..end]))
}

pub(crate) fn xml_blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut blocks = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let inner_start = start + open.len();
        match rest[inner_start..].find(&close) {
            Some(len) => {
                blocks.push(&rest[inner_start..inner_start + len]);
                rest = &rest[inner_start + len + close.len()..];
            }
            None => break,
        }
    }
    blocks
}

pub(crate) fn xml_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

pub(crate) fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
