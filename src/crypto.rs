//! Process-wide crypto store for secret profile fields.
//!
//! Lifecycle is locked → unlocked(key) → locked. The key is derived from
//! the master passphrase with PBKDF2-HMAC-SHA256 and never persisted;
//! locking simply drops it. Encrypted blobs use AES-256-GCM with a fresh
//! 16-byte IV per call, serialised as `hex(iv):hex(tag):hex(ciphertext)`.
//!
//! Anything that is not a three-part blob passes through `decrypt`
//! unchanged — that is the compatibility path for plaintext secrets
//! written before encryption existed.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Key, Nonce};
use lazy_static::lazy_static;
use log::info;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use std::sync::Mutex;

/// AES-256-GCM with the 16-byte IV the on-disk format mandates.
type SecretCipher = AesGcm<Aes256, U16>;

pub const KDF_ITERATIONS: u32 = 100_000;
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;

/// Fixed KDF salt. Kept byte-for-byte so existing vaults keep decrypting;
/// a per-install random salt would orphan them.
const KDF_SALT: &[u8] = b"macscp-static-salt";

lazy_static! {
    static ref KEY: Mutex<Option<[u8; KEY_LEN]>> = Mutex::new(None);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// A keyed operation was attempted while locked.
    Locked,
    /// Ciphertext failed authentication — wrong key or tampered data.
    AuthTagMismatch,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::Locked => write!(f, "Crypto store is locked"),
            CryptoError::AuthTagMismatch => {
                write!(f, "Decryption failed: authentication tag mismatch")
            }
        }
    }
}

impl std::error::Error for CryptoError {}

/// The process-wide keyholder. All methods are associated functions; the
/// unlocked key is global state shared by every store.
pub struct CryptoStore;

impl CryptoStore {
    /// Derive the key from `passphrase` and unlock. Key derivation is CPU
    /// bound, so it runs off the async scheduler.
    pub async fn set(passphrase: String) {
        let key = tokio::task::spawn_blocking(move || derive_key(&passphrase))
            .await
            .expect("key derivation task panicked");
        *KEY.lock().unwrap() = Some(key);
        info!("crypto: store unlocked");
    }

    /// Synchronous unlock for non-async callers.
    pub fn set_blocking(passphrase: &str) {
        *KEY.lock().unwrap() = Some(derive_key(passphrase));
    }

    /// Return to the locked state, dropping the key.
    pub fn clear() {
        *KEY.lock().unwrap() = None;
        info!("crypto: store locked");
    }

    pub fn is_unlocked() -> bool {
        KEY.lock().unwrap().is_some()
    }

    /// Encrypt `plaintext` into the three-part hex blob.
    pub fn encrypt(plaintext: &str) -> Result<String, CryptoError> {
        let key = KEY.lock().unwrap().ok_or(CryptoError::Locked)?;
        let cipher = SecretCipher::new(Key::<SecretCipher>::from_slice(&key));

        let mut iv = [0u8; IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut iv);

        let sealed = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| CryptoError::AuthTagMismatch)?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(ciphertext)
        ))
    }

    /// Decrypt a three-part blob; anything else is returned unchanged.
    pub fn decrypt(blob: &str) -> Result<String, CryptoError> {
        let Some((iv, tag, ciphertext)) = parse_blob(blob) else {
            return Ok(blob.to_string());
        };
        let key = KEY.lock().unwrap().ok_or(CryptoError::Locked)?;
        let cipher = SecretCipher::new(Key::<SecretCipher>::from_slice(&key));

        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
            .map_err(|_| CryptoError::AuthTagMismatch)?;
        Ok(String::from_utf8_lossy(&plaintext).into_owned())
    }

    /// True when `value` looks like an encrypted blob rather than plaintext.
    pub fn is_blob(value: &str) -> bool {
        parse_blob(value).is_some()
    }
}

fn derive_key(passphrase: &str) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), KDF_SALT, KDF_ITERATIONS, &mut key);
    key
}

/// Split and hex-decode `iv:tag:ciphertext`; `None` when the value is not
/// in that shape (legacy plaintext).
fn parse_blob(blob: &str) -> Option<(Vec<u8>, Vec<u8>, Vec<u8>)> {
    let mut parts = blob.split(':');
    let iv = hex::decode(parts.next()?).ok()?;
    let tag = hex::decode(parts.next()?).ok()?;
    let ciphertext = hex::decode(parts.next()?).ok()?;
    if parts.next().is_some() || iv.len() != IV_LEN || tag.len() != TAG_LEN {
        return None;
    }
    Some((iv, tag, ciphertext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    // The key is process-global; tests share it, so each one sets the
    // state it needs explicitly.

    #[test]
    #[serial(crypto)]
    fn round_trip() {
        CryptoStore::set_blocking("correct horse battery staple");
        let blob = CryptoStore::encrypt("s3cret-value").unwrap();
        assert!(CryptoStore::is_blob(&blob));
        assert_eq!(CryptoStore::decrypt(&blob).unwrap(), "s3cret-value");
    }

    #[test]
    #[serial(crypto)]
    fn fresh_iv_per_encryption() {
        CryptoStore::set_blocking("pass");
        let a = CryptoStore::encrypt("same").unwrap();
        let b = CryptoStore::encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    #[serial(crypto)]
    fn legacy_plaintext_passes_through() {
        CryptoStore::set_blocking("pass");
        assert_eq!(CryptoStore::decrypt("plain-password").unwrap(), "plain-password");
        assert_eq!(CryptoStore::decrypt("a:b").unwrap(), "a:b");
        assert_eq!(CryptoStore::decrypt("xx:yy:zz").unwrap(), "xx:yy:zz");
        assert!(!CryptoStore::is_blob("plain-password"));
    }

    #[test]
    #[serial(crypto)]
    fn wrong_key_fails_tag_check() {
        CryptoStore::set_blocking("first");
        let blob = CryptoStore::encrypt("secret").unwrap();
        CryptoStore::set_blocking("second");
        assert_eq!(CryptoStore::decrypt(&blob), Err(CryptoError::AuthTagMismatch));
    }

    #[test]
    #[serial(crypto)]
    fn tampered_ciphertext_fails() {
        CryptoStore::set_blocking("pass");
        let blob = CryptoStore::encrypt("secret").unwrap();
        let mut parts: Vec<String> = blob.split(':').map(String::from).collect();
        // Flip a nibble inside the ciphertext.
        let flipped = if parts[2].as_bytes()[0] == b'0' { "1" } else { "0" };
        parts[2].replace_range(0..1, flipped);
        let tampered = parts.join(":");
        assert_eq!(
            CryptoStore::decrypt(&tampered),
            Err(CryptoError::AuthTagMismatch)
        );
    }

    #[test]
    #[serial(crypto)]
    fn locked_operations_fail() {
        CryptoStore::set_blocking("pass");
        let blob = CryptoStore::encrypt("secret").unwrap();
        CryptoStore::clear();
        assert_eq!(CryptoStore::encrypt("x"), Err(CryptoError::Locked));
        assert_eq!(CryptoStore::decrypt(&blob), Err(CryptoError::Locked));
        // Plaintext still passes through while locked.
        assert_eq!(CryptoStore::decrypt("plain").unwrap(), "plain");
    }
}
