use std::fmt;

use crypto_box::aead::{Aead, Nonce};
use crypto_box::{PublicKey, SalsaBox, SecretKey};

use crate::codec::{decode_base58_array, encode_base58, CodecError};
use crate::entropy::fill_random;

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("random source failed: {0}")]
    Random(String),

    #[error("key encoding: {0}")]
    Codec(#[from] CodecError),

    #[error("public key does not match secret key")]
    Mismatch,

    #[error("invalid nonce length: {0}")]
    NonceLength(usize),

    #[error("box encryption failed")]
    Seal,

    #[error("box authentication failed")]
    Open,
}

/// X25519 key pair used once per wallet session to negotiate the box secret.
#[derive(Clone)]
pub struct EphemeralKeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EphemeralKeyPair({}, <sensitive>)", self.public_key_base58())
    }
}

impl EphemeralKeyPair {
    pub fn generate() -> Result<Self, KeyError> {
        let mut bytes = [0u8; KEY_SIZE];
        fill_random(&mut bytes).map_err(KeyError::Random)?;
        Ok(Self::from_secret_bytes(bytes))
    }

    pub fn from_secret_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        let secret = SecretKey::from(bytes);
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Restore a persisted pair. Both halves must agree.
    pub fn from_base58_parts(public_b58: &str, secret_b58: &str) -> Result<Self, KeyError> {
        let public: [u8; KEY_SIZE] = decode_base58_array(public_b58)?;
        let secret: [u8; KEY_SIZE] = decode_base58_array(secret_b58)?;
        let pair = Self::from_secret_bytes(secret);
        if pair.public.as_bytes() != &public {
            return Err(KeyError::Mismatch);
        }
        Ok(pair)
    }

    pub fn public_key_bytes(&self) -> [u8; KEY_SIZE] {
        *self.public.as_bytes()
    }

    pub fn public_key_base58(&self) -> String {
        encode_base58(self.public.as_bytes())
    }

    pub fn secret_key_base58(&self) -> String {
        encode_base58(&self.secret.to_bytes())
    }

    /// Precompute the shared box secret with a peer's encryption key.
    pub fn channel_with(&self, peer_public: &[u8; KEY_SIZE]) -> SharedChannel {
        SharedChannel {
            inner: SalsaBox::new(&PublicKey::from(*peer_public), &self.secret),
        }
    }
}

pub fn random_nonce() -> Result<[u8; NONCE_SIZE], KeyError> {
    let mut nonce = [0u8; NONCE_SIZE];
    fill_random(&mut nonce).map_err(KeyError::Random)?;
    Ok(nonce)
}

/// NaCl box (X25519-XSalsa20-Poly1305) between this device and a wallet.
pub struct SharedChannel {
    inner: SalsaBox,
}

impl SharedChannel {
    /// Encrypt with a fresh random nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<([u8; NONCE_SIZE], Vec<u8>), KeyError> {
        let nonce = random_nonce()?;
        let ciphertext = self.seal_with_nonce(&nonce, plaintext)?;
        Ok((nonce, ciphertext))
    }

    pub fn seal_with_nonce(
        &self,
        nonce: &[u8; NONCE_SIZE],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, KeyError> {
        self.inner
            .encrypt(Nonce::<SalsaBox>::from_slice(nonce), plaintext)
            .map_err(|_| KeyError::Seal)
    }

    /// Decrypt and authenticate. Fails closed on any mismatch.
    pub fn open(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, KeyError> {
        if nonce.len() != NONCE_SIZE {
            return Err(KeyError::NonceLength(nonce.len()));
        }
        self.inner
            .decrypt(Nonce::<SalsaBox>::from_slice(nonce), ciphertext)
            .map_err(|_| KeyError::Open)
    }
}
