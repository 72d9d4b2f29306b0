//! Directory comparison.
//!
//! First-level children only: sub-directory recursion is an explicit
//! future extension, so directories are skipped entirely. Modification
//! times compare with a ±1 second tolerance (FAT and FTP servers round);
//! a time tie with differing sizes counts as newer-local.

use crate::remote::RemoteDispatcherState;
use skiff_core::types::{DirectoryEntry, SyncDiff, SyncStatus};
use skiff_core::{paths, RemoteError, RemoteResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

/// Mtime slack, in seconds, inside which two sides count as simultaneous.
const MTIME_TOLERANCE: u64 = 1;

pub struct SyncEngine {
    dispatcher: RemoteDispatcherState,
}

pub type SyncEngineState = Arc<SyncEngine>;

#[derive(Debug, Clone)]
pub(crate) struct LocalEntry {
    pub name: String,
    pub size: u64,
    pub mtime: u64,
}

impl SyncEngine {
    pub fn new(dispatcher: RemoteDispatcherState) -> Arc<Self> {
        Arc::new(Self { dispatcher })
    }

    /// Diff the first-level files of a local and a remote directory.
    pub async fn compare(
        &self,
        local_dir: &str,
        remote_dir: &str,
    ) -> RemoteResult<Vec<SyncDiff>> {
        let locals = list_local_files(local_dir).map_err(RemoteError::from)?;
        let remotes = self.dispatcher.list(remote_dir).await?;
        Ok(classify(&locals, &remotes, local_dir, remote_dir))
    }
}

fn list_local_files(dir: &str) -> std::io::Result<Vec<LocalEntry>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            continue;
        }
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        entries.push(LocalEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            size: meta.len(),
            mtime,
        });
    }
    Ok(entries)
}

/// Pure classification over both listings.
pub(crate) fn classify(
    locals: &[LocalEntry],
    remotes: &[DirectoryEntry],
    local_dir: &str,
    remote_dir: &str,
) -> Vec<SyncDiff> {
    let remote_by_name: HashMap<&str, &DirectoryEntry> = remotes
        .iter()
        .filter(|e| !e.is_dir)
        .map(|e| (e.name.as_str(), e))
        .collect();

    let mut diffs = Vec::new();

    for local in locals {
        let local_path = std::path::Path::new(local_dir)
            .join(&local.name)
            .to_string_lossy()
            .into_owned();
        let remote_path = paths::join(remote_dir, &local.name);

        match remote_by_name.get(local.name.as_str()) {
            None => diffs.push(SyncDiff {
                name: local.name.clone(),
                local_path,
                remote_path,
                status: SyncStatus::OnlyLocal,
                local_size: Some(local.size),
                remote_size: None,
                local_mtime: Some(local.mtime),
                remote_mtime: None,
            }),
            Some(remote) => {
                let remote_mtime = remote.modified.unwrap_or(0);
                let status = if local.mtime.abs_diff(remote_mtime) <= MTIME_TOLERANCE {
                    if local.size == remote.size {
                        SyncStatus::Same
                    } else {
                        SyncStatus::NewerLocal
                    }
                } else if local.mtime > remote_mtime {
                    SyncStatus::NewerLocal
                } else {
                    SyncStatus::NewerRemote
                };
                diffs.push(SyncDiff {
                    name: local.name.clone(),
                    local_path,
                    remote_path,
                    status,
                    local_size: Some(local.size),
                    remote_size: Some(remote.size),
                    local_mtime: Some(local.mtime),
                    remote_mtime: remote.modified,
                });
            }
        }
    }

    let local_names: HashMap<&str, ()> =
        locals.iter().map(|e| (e.name.as_str(), ())).collect();
    for remote in remotes.iter().filter(|e| !e.is_dir) {
        if !local_names.contains_key(remote.name.as_str()) {
            diffs.push(SyncDiff {
                name: remote.name.clone(),
                local_path: std::path::Path::new(local_dir)
                    .join(&remote.name)
                    .to_string_lossy()
                    .into_owned(),
                remote_path: paths::join(remote_dir, &remote.name),
                status: SyncStatus::OnlyRemote,
                local_size: None,
                remote_size: Some(remote.size),
                local_mtime: None,
                remote_mtime: remote.modified,
            });
        }
    }

    diffs
}
