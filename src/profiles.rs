//! Connection-profile persistence.
//!
//! Profiles live in a JSON array on disk. The secret fields (`password`,
//! `passphrase`, `secretAccessKey`) are encrypted through the crypto store
//! when it is unlocked and pass through opaque otherwise — so a locked
//! startup can still enumerate profiles, and legacy plaintext records stay
//! loadable forever.

use crate::crypto::{CryptoError, CryptoStore};
use log::warn;
use skiff_core::types::Profile;
use std::path::PathBuf;
use std::sync::Arc;

pub struct ProfileStore {
    path: PathBuf,
}

pub type ProfileStoreState = Arc<ProfileStore>;

impl ProfileStore {
    pub fn new(path: PathBuf) -> Arc<Self> {
        Arc::new(Self { path })
    }

    pub fn default_path() -> PathBuf {
        crate::app_data_dir().join("profiles.json")
    }

    /// Load every profile, transparently decrypting secrets when unlocked.
    ///
    /// A secret that fails its tag check (wrong passphrase) is left in its
    /// encrypted form rather than surfacing garbage plaintext.
    pub fn load(&self) -> Vec<Profile> {
        let mut profiles = self.read_raw();
        if CryptoStore::is_unlocked() {
            for profile in &mut profiles {
                decrypt_field(&mut profile.password);
                decrypt_field(&mut profile.passphrase);
                decrypt_field(&mut profile.secret_access_key);
            }
        }
        profiles
    }

    /// Insert or update a profile (matched by id). Secrets are encrypted
    /// at rest when the crypto store is unlocked.
    pub fn save(&self, profile: Profile) -> Result<Profile, String> {
        profile.validate()?;

        let mut stored = profile.clone();
        if CryptoStore::is_unlocked() {
            encrypt_field(&mut stored.password)?;
            encrypt_field(&mut stored.passphrase)?;
            encrypt_field(&mut stored.secret_access_key)?;
        }

        let mut profiles = self.read_raw();
        match profiles.iter_mut().find(|p| p.id == stored.id) {
            Some(slot) => *slot = stored,
            None => profiles.push(stored),
        }
        self.write_raw(&profiles)?;
        Ok(profile)
    }

    pub fn delete(&self, id: &str) -> Result<(), String> {
        let mut profiles = self.read_raw();
        let before = profiles.len();
        profiles.retain(|p| p.id != id);
        if profiles.len() == before {
            return Err(format!("Profile '{}' not found", id));
        }
        self.write_raw(&profiles)
    }

    // ─── Raw disk I/O ────────────────────────────────────────────

    fn read_raw(&self) -> Vec<Profile> {
        match std::fs::read_to_string(&self.path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(profiles) => profiles,
                Err(e) => {
                    warn!("profiles: ignoring malformed {}: {}", self.path.display(), e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        }
    }

    fn write_raw(&self, profiles: &[Profile]) -> Result<(), String> {
        let json = serde_json::to_string_pretty(profiles).map_err(|e| e.to_string())?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|e| e.to_string())
    }
}

fn decrypt_field(field: &mut Option<String>) {
    if let Some(value) = field.as_deref() {
        match CryptoStore::decrypt(value) {
            Ok(plain) => *field = Some(plain),
            Err(CryptoError::AuthTagMismatch) => {
                warn!("profiles: secret failed tag check, leaving encrypted");
            }
            Err(CryptoError::Locked) => {}
        }
    }
}

fn encrypt_field(field: &mut Option<String>) -> Result<(), String> {
    if let Some(value) = field.as_deref() {
        // Re-saving an already-encrypted record must not double-wrap it.
        if !value.is_empty() && !CryptoStore::is_blob(value) {
            *field = Some(CryptoStore::encrypt(value).map_err(|e| e.to_string())?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use skiff_core::types::Protocol;

    fn store() -> (tempfile::TempDir, Arc<ProfileStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("profiles.json"));
        (dir, store)
    }

    fn sample() -> Profile {
        let mut p = Profile::new("prod box", Protocol::Sftp);
        p.host = "example.com".into();
        p.username = "deploy".into();
        p.password = Some("hunter2".into());
        p
    }

    #[test]
    #[serial(crypto)]
    fn save_and_load_locked_is_plaintext() {
        CryptoStore::clear();
        let (_dir, store) = store();
        store.save(sample()).unwrap();
        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].password.as_deref(), Some("hunter2"));
    }

    #[test]
    #[serial(crypto)]
    fn secrets_encrypted_at_rest_when_unlocked() {
        CryptoStore::set_blocking("master");
        let (_dir, store) = store();
        let saved = store.save(sample()).unwrap();
        // The returned profile keeps the plaintext for immediate use.
        assert_eq!(saved.password.as_deref(), Some("hunter2"));

        // On disk it is a blob.
        let raw: Vec<Profile> =
            serde_json::from_str(&std::fs::read_to_string(store.path.clone()).unwrap()).unwrap();
        let on_disk = raw[0].password.as_deref().unwrap();
        assert_ne!(on_disk, "hunter2");
        assert!(CryptoStore::is_blob(on_disk));

        // Loading decrypts transparently.
        assert_eq!(store.load()[0].password.as_deref(), Some("hunter2"));
        CryptoStore::clear();
    }

    #[test]
    #[serial(crypto)]
    fn wrong_passphrase_leaves_secret_encrypted() {
        CryptoStore::set_blocking("right");
        let (_dir, store) = store();
        store.save(sample()).unwrap();

        CryptoStore::set_blocking("wrong");
        let loaded = store.load();
        let secret = loaded[0].password.as_deref().unwrap();
        assert_ne!(secret, "hunter2");
        assert!(CryptoStore::is_blob(secret));
        CryptoStore::clear();
    }

    #[test]
    #[serial(crypto)]
    fn resave_does_not_double_encrypt() {
        CryptoStore::set_blocking("master");
        let (_dir, store) = store();
        let saved = store.save(sample()).unwrap();
        // Save again with the blob in place (e.g. edited while displayed).
        let reloaded_raw = {
            let raw: Vec<Profile> =
                serde_json::from_str(&std::fs::read_to_string(store.path.clone()).unwrap())
                    .unwrap();
            raw.into_iter().next().unwrap()
        };
        store.save(reloaded_raw).unwrap();
        assert_eq!(store.load()[0].password.as_deref(), Some("hunter2"));
        assert_eq!(saved.id, store.load()[0].id);
        CryptoStore::clear();
    }

    #[test]
    #[serial(crypto)]
    fn delete_by_id() {
        CryptoStore::clear();
        let (_dir, store) = store();
        let saved = store.save(sample()).unwrap();
        assert!(store.delete(&saved.id).is_ok());
        assert!(store.load().is_empty());
        assert!(store.delete(&saved.id).is_err());
    }
}
