//! Staging directories for drag-out and external-edit files.
//!
//! Every invocation gets its own directory under the system temp root,
//! named with a recognisable prefix so the next startup can sweep leftovers
//! without touching anything else.

use log::debug;
use std::path::PathBuf;
use uuid::Uuid;

pub const STAGE_PREFIX: &str = "skiff-stage-";

/// Create a fresh, uniquely named staging directory.
pub fn create_stage_dir() -> std::io::Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("{}{}", STAGE_PREFIX, Uuid::new_v4()));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Best-effort removal of stale staging directories. Returns how many were
/// swept. Called once at engine startup.
pub fn sweep_stage_dirs() -> usize {
    let Ok(entries) = std::fs::read_dir(std::env::temp_dir()) else {
        return 0;
    };
    let mut swept = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(STAGE_PREFIX) && entry.path().is_dir() {
            if std::fs::remove_dir_all(entry.path()).is_ok() {
                debug!("staging: swept {}", name);
                swept += 1;
            }
        }
    }
    swept
}
