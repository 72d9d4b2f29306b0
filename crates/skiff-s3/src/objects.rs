//! Object operations: listing, stat synthesis, range downloads and
//! multipart uploads.

use crate::client::{xml_blocks, xml_escape, xml_text, S3Client};
use crate::error::{S3Error, S3Result};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use log::{debug, warn};
use skiff_core::types::{DirectoryEntry, RemoteStat};
use skiff_core::{paths, CancelToken, ProgressFn};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Multipart part size. S3's minimum for every part but the last.
pub const PART_SIZE: u64 = 5 * 1024 * 1024;
/// Parts in flight per upload.
pub const PART_CONCURRENCY: usize = 4;

impl S3Client {
    // ─── Connect probe ───────────────────────────────────────────

    /// HeadBucket: confirms the bucket exists and the credentials may use it.
    pub async fn head_bucket(&self) -> S3Result<()> {
        let url = format!("{}/", self.bucket_url());
        self.request("HEAD", &url, BTreeMap::new(), Bytes::new())
            .await?;
        Ok(())
    }

    // ─── Listing ─────────────────────────────────────────────────

    /// ListObjectsV2 with `delimiter=/`: common prefixes come back as
    /// directories, objects as files. Paginates until exhausted.
    pub async fn list_dir(&self, path: &str) -> S3Result<Vec<DirectoryEntry>> {
        let prefix = paths::prefix_key(path);
        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut query = BTreeMap::new();
            query.insert("list-type".to_string(), "2".to_string());
            query.insert("delimiter".to_string(), "/".to_string());
            if !prefix.is_empty() {
                query.insert("prefix".to_string(), prefix.clone());
            }
            if let Some(ref token) = continuation {
                query.insert("continuation-token".to_string(), token.clone());
            }

            let url = self.object_url("", &query);
            let response = self
                .request("GET", &url, BTreeMap::new(), Bytes::new())
                .await?;
            let body = response.text();

            for block in xml_blocks(&body, "CommonPrefixes") {
                if let Some(full) = xml_text(block, "Prefix") {
                    let name = full
                        .trim_start_matches(&prefix)
                        .trim_end_matches('/')
                        .to_string();
                    if !name.is_empty() {
                        entries.push(DirectoryEntry {
                            name,
                            is_dir: true,
                            size: 0,
                            modified: None,
                        });
                    }
                }
            }

            for block in xml_blocks(&body, "Contents") {
                let Some(key) = xml_text(block, "Key") else { continue };
                // The zero-byte marker object for the listed prefix itself.
                if key == prefix {
                    continue;
                }
                let name = key.trim_start_matches(&prefix).to_string();
                if name.is_empty() || name.contains('/') {
                    continue;
                }
                entries.push(DirectoryEntry {
                    name,
                    is_dir: false,
                    size: xml_text(block, "Size")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0),
                    modified: xml_text(block, "LastModified").and_then(|v| parse_iso8601(&v)),
                });
            }

            let truncated = xml_text(&body, "IsTruncated")
                .map(|v| v == "true")
                .unwrap_or(false);
            continuation = xml_text(&body, "NextContinuationToken");
            if !truncated || continuation.is_none() {
                break;
            }
        }

        Ok(entries)
    }

    // ─── Stat ────────────────────────────────────────────────────

    /// HeadObject, with the directory synthesis rule: a missing key whose
    /// prefix has children is a directory.
    pub async fn stat_path(&self, path: &str) -> S3Result<RemoteStat> {
        let key = paths::object_key(path);
        if key.is_empty() {
            return Ok(RemoteStat::dir(0));
        }

        let url = self.object_url(&key, &BTreeMap::new());
        match self.request("HEAD", &url, BTreeMap::new(), Bytes::new()).await {
            Ok(response) => {
                let size = response
                    .header("content-length")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                let mtime = response
                    .header("last-modified")
                    .and_then(parse_http_date)
                    .unwrap_or(0);
                Ok(RemoteStat::file(size, mtime))
            }
            Err(e) if e.is_not_found() => {
                if self.prefix_has_children(&key).await? {
                    Ok(RemoteStat::dir(0))
                } else {
                    Err(e)
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn prefix_has_children(&self, key: &str) -> S3Result<bool> {
        let mut query = BTreeMap::new();
        query.insert("list-type".to_string(), "2".to_string());
        query.insert("prefix".to_string(), format!("{}/", key));
        query.insert("max-keys".to_string(), "1".to_string());
        let url = self.object_url("", &query);
        let response = self
            .request("GET", &url, BTreeMap::new(), Bytes::new())
            .await?;
        let count = xml_text(&response.text(), "KeyCount")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0);
        Ok(count > 0)
    }

    // ─── Download ────────────────────────────────────────────────

    /// GET an object into a local file, resuming at `offset` via a
    /// `Range: bytes=offset-` read and local append.
    pub async fn get_to_file(
        &self,
        path: &str,
        local_path: &str,
        offset: u64,
        progress: &ProgressFn,
        cancel: &CancelToken,
    ) -> S3Result<u64> {
        let key = paths::object_key(path);
        let url = self.object_url(&key, &BTreeMap::new());

        let mut headers = BTreeMap::new();
        if offset > 0 {
            headers.insert("range".to_string(), format!("bytes={}-", offset));
        }
        let mut response = self.request_stream("GET", &url, headers).await?;
        let total = offset + response.content_length().unwrap_or(0);

        let mut local_file = if offset > 0 {
            std::fs::OpenOptions::new().append(true).open(local_path)?
        } else {
            if let Some(parent) = std::path::Path::new(local_path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::File::create(local_path)?
        };

        debug!("s3: GET {} (offset {})", key, offset);

        let mut transferred = offset;
        while let Some(chunk) = response.chunk().await? {
            if cancel.is_cancelled() {
                return Err(S3Error::cancelled());
            }
            local_file.write_all(&chunk)?;
            transferred += chunk.len() as u64;
            progress(transferred, chunk.len() as u64, total);
        }
        local_file.flush()?;
        Ok(transferred - offset)
    }

    // ─── Upload (multipart) ──────────────────────────────────────

    /// Upload a local file as one multipart upload: 5 MiB parts, four in
    /// flight. There is no resume; callers passing an offset get a restart
    /// from zero and the progress stream reflects that.
    pub async fn put_file(
        &self,
        local_path: &str,
        path: &str,
        progress: &ProgressFn,
        cancel: &CancelToken,
    ) -> S3Result<u64> {
        let key = paths::object_key(path);
        let total = std::fs::metadata(local_path)?.len();
        if total == 0 {
            self.put_bytes(path, &[]).await?;
            progress(0, 0, 0);
            return Ok(0);
        }

        let upload_id = self.create_multipart(&key).await?;
        debug!("s3: multipart {} started ({} bytes)", key, total);

        let part_count = total.div_ceil(PART_SIZE);
        let done = Arc::new(AtomicU64::new(0));

        let results: Vec<S3Result<(u32, String)>> = stream::iter(0..part_count)
            .map(|index| {
                let client = self.clone();
                let key = key.clone();
                let upload_id = upload_id.clone();
                let local_path = local_path.to_string();
                let cancel = cancel.clone();
                let progress = progress.clone();
                let done = done.clone();
                async move {
                    if cancel.is_cancelled() {
                        return Err(S3Error::cancelled());
                    }
                    let part_number = (index + 1) as u32;
                    let start = index * PART_SIZE;
                    let len = PART_SIZE.min(total - start);
                    let body = read_part(&local_path, start, len).await?;
                    let etag = client
                        .upload_part(&key, &upload_id, part_number, body)
                        .await?;
                    let cumulative = done.fetch_add(len, Ordering::SeqCst) + len;
                    progress(cumulative, len, total);
                    Ok((part_number, etag))
                }
            })
            .buffer_unordered(PART_CONCURRENCY)
            .collect()
            .await;

        let mut parts = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(part) => parts.push(part),
                Err(e) => {
                    // Never leave server-side multipart state behind.
                    if let Err(abort_err) = self.abort_multipart(&key, &upload_id).await {
                        warn!("s3: abort of multipart {} failed: {}", upload_id, abort_err);
                    }
                    return Err(if cancel.is_cancelled() { S3Error::cancelled() } else { e });
                }
            }
        }

        parts.sort_by_key(|(number, _)| *number);
        self.complete_multipart(&key, &upload_id, &parts).await?;
        Ok(total)
    }

    async fn create_multipart(&self, key: &str) -> S3Result<String> {
        let mut query = BTreeMap::new();
        query.insert("uploads".to_string(), String::new());
        let url = self.object_url(key, &query);
        let response = self
            .request("POST", &url, BTreeMap::new(), Bytes::new())
            .await?;
        xml_text(&response.text(), "UploadId")
            .ok_or_else(|| S3Error::parse("No UploadId in CreateMultipartUpload response"))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> S3Result<String> {
        let mut query = BTreeMap::new();
        query.insert("partNumber".to_string(), part_number.to_string());
        query.insert("uploadId".to_string(), upload_id.to_string());
        let url = self.object_url(key, &query);
        let response = self.request("PUT", &url, BTreeMap::new(), body).await?;
        Ok(response.header("etag").unwrap_or_default().to_string())
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[(u32, String)],
    ) -> S3Result<()> {
        let mut xml = String::from("<CompleteMultipartUpload>");
        for (number, etag) in parts {
            xml.push_str(&format!(
                "<Part><PartNumber>{}</PartNumber><ETag>{}</ETag></Part>",
                number,
                xml_escape(etag)
            ));
        }
        xml.push_str("</CompleteMultipartUpload>");

        let mut query = BTreeMap::new();
        query.insert("uploadId".to_string(), upload_id.to_string());
        let url = self.object_url(key, &query);
        let response = self
            .request("POST", &url, BTreeMap::new(), Bytes::from(xml))
            .await?;
        // S3 reports some failures inside a 200 body.
        let body = response.text();
        if let Some(code) = xml_text(&body, "Code") {
            let message = xml_text(&body, "Message").unwrap_or_default();
            return Err(S3Error::new(&code, message, response.status));
        }
        Ok(())
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> S3Result<()> {
        let mut query = BTreeMap::new();
        query.insert("uploadId".to_string(), upload_id.to_string());
        let url = self.object_url(key, &query);
        self.request("DELETE", &url, BTreeMap::new(), Bytes::new())
            .await?;
        Ok(())
    }

    // ─── Small-object helpers ────────────────────────────────────

    /// Whole-object read into memory, capped at `max_bytes`.
    pub async fn get_bytes(&self, path: &str, max_bytes: u64) -> S3Result<Vec<u8>> {
        let key = paths::object_key(path);
        let url = self.object_url(&key, &BTreeMap::new());
        let mut response = self.request_stream("GET", &url, BTreeMap::new()).await?;

        let mut out = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            out.extend_from_slice(&chunk);
            if out.len() as u64 > max_bytes {
                return Err(S3Error::new(
                    "EntityTooLarge",
                    format!("Object exceeds the {} byte cap", max_bytes),
                    200,
                ));
            }
        }
        Ok(out)
    }

    /// Materialise a "directory" as a zero-byte prefix-marker object.
    pub async fn create_dir_marker(&self, path: &str) -> S3Result<()> {
        let key = paths::prefix_key(path);
        let url = self.object_url(&key, &BTreeMap::new());
        self.request("PUT", &url, BTreeMap::new(), Bytes::new())
            .await?;
        Ok(())
    }

    /// Single-request PutObject, for small writes from editors.
    pub async fn put_bytes(&self, path: &str, bytes: &[u8]) -> S3Result<()> {
        let key = paths::object_key(path);
        let url = self.object_url(&key, &BTreeMap::new());
        self.request("PUT", &url, BTreeMap::new(), Bytes::copy_from_slice(bytes))
            .await?;
        Ok(())
    }

    pub async fn delete_object(&self, path: &str) -> S3Result<()> {
        let key = paths::object_key(path);
        let url = self.object_url(&key, &BTreeMap::new());
        self.request("DELETE", &url, BTreeMap::new(), Bytes::new())
            .await?;
        Ok(())
    }

    /// Delete every object under a prefix (a "directory"), plus its marker.
    pub async fn delete_prefix(&self, path: &str) -> S3Result<()> {
        let prefix = paths::prefix_key(path);
        loop {
            let mut query = BTreeMap::new();
            query.insert("list-type".to_string(), "2".to_string());
            query.insert("prefix".to_string(), prefix.clone());
            let url = self.object_url("", &query);
            let response = self
                .request("GET", &url, BTreeMap::new(), Bytes::new())
                .await?;
            let body = response.text();

            let keys: Vec<String> = xml_blocks(&body, "Contents")
                .iter()
                .filter_map(|block| xml_text(block, "Key"))
                .collect();
            if keys.is_empty() {
                break;
            }
            for key in keys {
                self.delete_object(&format!("/{}", key)).await?;
            }
            let truncated = xml_text(&body, "IsTruncated")
                .map(|v| v == "true")
                .unwrap_or(false);
            if !truncated {
                break;
            }
        }
        Ok(())
    }

    /// Server-side copy, the building block for rename.
    pub async fn copy_object(&self, from: &str, to: &str) -> S3Result<()> {
        let to_key = paths::object_key(to);
        let url = self.object_url(&to_key, &BTreeMap::new());
        let mut headers = BTreeMap::new();
        headers.insert(
            "x-amz-copy-source".to_string(),
            format!(
                "/{}/{}",
                self.config.bucket,
                crate::signing::uri_encode_path(&paths::object_key(from))
            ),
        );
        self.request("PUT", &url, headers, Bytes::new()).await?;
        Ok(())
    }

    pub async fn rename_object(&self, from: &str, to: &str) -> S3Result<()> {
        self.copy_object(from, to).await?;
        self.delete_object(from).await
    }
}

async fn read_part(local_path: &str, start: u64, len: u64) -> S3Result<Bytes> {
    let mut file = tokio::fs::File::open(local_path).await?;
    file.seek(std::io::SeekFrom::Start(start)).await?;
    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf).await?;
    Ok(Bytes::from(buf))
}

/// `2024-01-15T10:30:00.000Z` from list XML.
fn parse_iso8601(value: &str) -> Option<u64> {
    chrono::DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.timestamp().max(0) as u64)
}

/// `Mon, 15 Jan 2024 10:30:00 GMT` from HEAD replies.
fn parse_http_date(value: &str) -> Option<u64> {
    chrono::DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.timestamp().max(0) as u64)
}
