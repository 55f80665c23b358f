//! Sealed values for storage at rest.
//!
//! Layout (then base64): `version || nonce(32) || ciphertext || mac(32)`.
//! Per-value ChaCha20 key, ChaCha20 nonce and HMAC key come from HKDF-expand of
//! the sealing key with the random nonce as info. The MAC also covers the
//! entry name so a value cannot be replayed under a different key.

use std::fmt;
use std::ops::Range;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::StorageError;
use crate::entropy::fill_random;

const VERSION: u8 = 1;
const NONCE_SIZE: usize = 32;
const MAC_SIZE: usize = 32;
const MESSAGE_KEYS_SIZE: usize = 76;
const CHACHA_KEY_RANGE: Range<usize> = 0..32;
const CHACHA_NONCE_RANGE: Range<usize> = 32..44;
const HMAC_KEY_RANGE: Range<usize> = 44..MESSAGE_KEYS_SIZE;
const SALT: &[u8] = b"soltix-storage-v1";

/// Root key for sealing stored values, derived from the device key.
#[derive(Clone)]
pub struct SealingKey([u8; 32]);

impl fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sealing key: <sensitive>")
    }
}

impl SealingKey {
    pub fn derive(device_key: &[u8; 32]) -> Self {
        let (prk, _) = Hkdf::<Sha256>::extract(Some(SALT), device_key);
        let mut key = [0u8; 32];
        key.copy_from_slice(&prk);
        Self(key)
    }

    /// Parse a 64-char hex device key.
    pub fn from_hex(device_key_hex: &str) -> Result<Self, StorageError> {
        let bytes = hex::decode(device_key_hex.trim())
            .map_err(|e| StorageError::InvalidKey(e.to_string()))?;
        let device_key: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| StorageError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(Self::derive(&device_key))
    }
}

struct MessageKeys {
    chacha_key: [u8; 32],
    chacha_nonce: [u8; 12],
    hmac_key: [u8; 32],
}

impl MessageKeys {
    fn derive(key: &SealingKey, nonce: &[u8; NONCE_SIZE]) -> Result<Self, StorageError> {
        let hk = Hkdf::<Sha256>::from_prk(&key.0)
            .map_err(|_| StorageError::InvalidKey("prk too short".to_string()))?;
        let mut okm = [0u8; MESSAGE_KEYS_SIZE];
        hk.expand(nonce, &mut okm)
            .map_err(|_| StorageError::InvalidKey("hkdf expand".to_string()))?;

        let mut keys = MessageKeys {
            chacha_key: [0u8; 32],
            chacha_nonce: [0u8; 12],
            hmac_key: [0u8; 32],
        };
        keys.chacha_key.copy_from_slice(&okm[CHACHA_KEY_RANGE]);
        keys.chacha_nonce.copy_from_slice(&okm[CHACHA_NONCE_RANGE]);
        keys.hmac_key.copy_from_slice(&okm[HMAC_KEY_RANGE]);
        Ok(keys)
    }

    fn mac(&self, entry: &str, nonce: &[u8], ciphertext: &[u8]) -> Result<Hmac<Sha256>, StorageError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.hmac_key)
            .map_err(|_| StorageError::InvalidKey("hmac key".to_string()))?;
        mac.update(entry.as_bytes());
        mac.update(nonce);
        mac.update(ciphertext);
        Ok(mac)
    }
}

pub fn seal(key: &SealingKey, entry: &str, plaintext: &[u8]) -> Result<String, StorageError> {
    let mut nonce = [0u8; NONCE_SIZE];
    fill_random(&mut nonce).map_err(StorageError::Unavailable)?;
    seal_with_nonce(key, entry, plaintext, &nonce)
}

fn seal_with_nonce(
    key: &SealingKey,
    entry: &str,
    plaintext: &[u8],
    nonce: &[u8; NONCE_SIZE],
) -> Result<String, StorageError> {
    let keys = MessageKeys::derive(key, nonce)?;

    let mut ciphertext = plaintext.to_vec();
    let mut cipher = ChaCha20::new(&keys.chacha_key.into(), &keys.chacha_nonce.into());
    cipher.apply_keystream(&mut ciphertext);

    let mac = keys.mac(entry, nonce, &ciphertext)?.finalize().into_bytes();

    let mut payload = Vec::with_capacity(1 + NONCE_SIZE + ciphertext.len() + MAC_SIZE);
    payload.push(VERSION);
    payload.extend_from_slice(nonce);
    payload.extend_from_slice(&ciphertext);
    payload.extend_from_slice(&mac);
    Ok(BASE64.encode(payload))
}

pub fn open(key: &SealingKey, entry: &str, sealed: &str) -> Result<Vec<u8>, StorageError> {
    let payload = BASE64
        .decode(sealed)
        .map_err(|e| StorageError::Encoding(e.to_string()))?;

    let len = payload.len();
    if len < 1 + NONCE_SIZE + MAC_SIZE {
        return Err(StorageError::Integrity(format!("{entry}: payload too short")));
    }
    if payload[0] != VERSION {
        return Err(StorageError::Integrity(format!(
            "{entry}: unknown version {}",
            payload[0]
        )));
    }

    let nonce: [u8; NONCE_SIZE] = payload[1..1 + NONCE_SIZE]
        .try_into()
        .map_err(|_| StorageError::Integrity(format!("{entry}: nonce")))?;
    let ciphertext = &payload[1 + NONCE_SIZE..len - MAC_SIZE];
    let tag = &payload[len - MAC_SIZE..];

    let keys = MessageKeys::derive(key, &nonce)?;
    keys.mac(entry, &nonce, ciphertext)?
        .verify_slice(tag)
        .map_err(|_| StorageError::Integrity(format!("{entry}: invalid mac")))?;

    let mut plaintext = ciphertext.to_vec();
    let mut cipher = ChaCha20::new(&keys.chacha_key.into(), &keys.chacha_nonce.into());
    cipher.apply_keystream(&mut plaintext);
    Ok(plaintext)
}
