//! Keys and sealed payloads for encrypted folders.
//!
//! An encrypted folder's packed bytes are `nonce (12) | ciphertext | tag (16)`.
//! The key is Argon2id over the archive password, salted with the archive
//! UUID, so the same password yields a different key in every archive.

use aes_gcm::aead::{AeadCore, AeadInPlace, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use argon2::{Algorithm, Argon2, Params, Version};
use thiserror::Error;
use uuid::Uuid;

/// Key for every AES stage in one archive.
pub type FolderKey = [u8; KEY_LEN];

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
/// Bytes a sealed payload carries beyond its plaintext.
pub const SEAL_OVERHEAD: usize = NONCE_LEN + TAG_LEN;

// Argon2id cost: 64 MiB, 3 passes, one lane.
const KDF_MEMORY_KIB: u32 = 64 * 1024;
const KDF_PASSES: u32 = 3;
const KDF_LANES: u32 = 1;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Sealing folder payload failed")]
    SealFailed,
    #[error("Folder payload failed authentication, wrong password or corrupted data")]
    OpenFailed,
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("Sealed payload is {len} bytes, shorter than the {SEAL_OVERHEAD}-byte nonce and tag")]
    TooShort { len: usize },
    #[error("Folder is encrypted but no password was provided")]
    MissingKey,
}

/// Derive the folder key for `archive` from `password`.
pub fn derive_key(password: &str, archive: &Uuid) -> Result<FolderKey, CryptoError> {
    let params = Params::new(KDF_MEMORY_KIB, KDF_PASSES, KDF_LANES, Some(KEY_LEN))
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let mut key = [0u8; KEY_LEN];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(password.as_bytes(), archive.as_bytes(), &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

/// Plaintext length of a sealed payload, known before any decryption.
pub fn opened_len(sealed: &[u8]) -> Result<usize, CryptoError> {
    sealed
        .len()
        .checked_sub(SEAL_OVERHEAD)
        .ok_or(CryptoError::TooShort { len: sealed.len() })
}

/// Seal folder bytes under a fresh random nonce.  The reader never calls
/// this; archive builders and fixtures do.
pub fn seal(key: &FolderKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(key.into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut out = Vec::with_capacity(plaintext.len() + SEAL_OVERHEAD);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(plaintext);
    let tag = cipher
        .encrypt_in_place_detached(&nonce, b"", &mut out[NONCE_LEN..])
        .map_err(|_| CryptoError::SealFailed)?;
    out.extend_from_slice(&tag);
    Ok(out)
}

/// Authenticate and decrypt a payload produced by [`seal`].
pub fn open(key: &FolderKey, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let len = opened_len(sealed)?;
    let (nonce, body) = sealed.split_at(NONCE_LEN);
    let (ciphertext, tag) = body.split_at(len);

    let cipher = Aes256Gcm::new(key.into());
    let mut out = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(Nonce::from_slice(nonce), b"", &mut out, Tag::from_slice(tag))
        .map_err(|_| CryptoError::OpenFailed)?;
    Ok(out)
}
