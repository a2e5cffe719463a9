//! Ed25519 device keypair and its on-disk text encoding.
//!
//! Text forms (standard base64, padded):
//! - private: `<base64(32-byte secret seed)>`
//! - public: `<base64(32-byte public key)> <comment>`
//!
//! Fingerprint = hex SHA-256 of the raw public key bytes.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{AdbError, AdbResult};

/// Length of both the secret seed and the public key.
pub const KEY_LEN: usize = 32;

/// An Ed25519 keypair used to answer the device's authentication challenge.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a fresh keypair from the OS random source.
    ///
    /// Fails with [`AdbError::CryptoUnavailable`] if the OS cannot supply
    /// randomness.
    pub fn generate() -> AdbResult<Self> {
        let mut seed = [0u8; KEY_LEN];
        OsRng
            .try_fill_bytes(&mut seed)
            .map_err(|e| AdbError::CryptoUnavailable(format!("os random source: {e}")))?;
        Ok(Self::from_seed(&seed))
    }

    fn from_seed(seed: &[u8; KEY_LEN]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Rebuild a keypair from raw 32-byte secret seed bytes.
    pub fn from_private_bytes(bytes: &[u8]) -> AdbResult<Self> {
        let seed: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            AdbError::Key(format!(
                "invalid private key length {} (expected {KEY_LEN} bytes)",
                bytes.len()
            ))
        })?;
        Ok(Self::from_seed(&seed))
    }

    /// Parse the two text forms and check that they belong together.
    pub fn from_encoded(private_text: &str, public_text: &str) -> AdbResult<Self> {
        let private_raw = STANDARD.decode(private_text.trim())?;
        let pair = Self::from_private_bytes(&private_raw)?;

        let public_b64 = public_text
            .split_whitespace()
            .next()
            .ok_or_else(|| AdbError::Key("empty public key".into()))?;
        let public_raw = STANDARD.decode(public_b64)?;

        if public_raw.as_slice() != pair.verifying_key.as_bytes() {
            return Err(AdbError::Key(
                "public key does not match private key".into(),
            ));
        }

        Ok(pair)
    }

    /// Private key text form (single line, no trailing newline).
    pub fn encode_private(&self) -> String {
        STANDARD.encode(self.signing_key.to_bytes())
    }

    /// Public key text form: `<base64> <comment>`.
    pub fn encode_public(&self, comment: &str) -> String {
        if comment.is_empty() {
            self.public_key_base64()
        } else {
            format!("{} {comment}", self.public_key_base64())
        }
    }

    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(self.verifying_key.as_bytes())
    }

    pub fn public_key_bytes(&self) -> [u8; KEY_LEN] {
        self.verifying_key.to_bytes()
    }

    pub fn private_key_bytes(&self) -> [u8; KEY_LEN] {
        self.signing_key.to_bytes()
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Sign a device challenge. Returns the 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    /// Check a signature produced by [`KeyPair::sign`].
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        match Signature::from_slice(signature) {
            Ok(sig) => self.verifying_key.verify(message, &sig).is_ok(),
            Err(_) => false,
        }
    }

    /// Full hex SHA-256 fingerprint of the public key.
    pub fn fingerprint(&self) -> String {
        fingerprint(self.verifying_key.as_bytes())
    }
}

impl PartialEq for KeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.verifying_key == other.verifying_key
            && self.signing_key.to_bytes() == other.signing_key.to_bytes()
    }
}

impl Eq for KeyPair {}

// Never print secret material.
impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

/// Compute the full hex-encoded SHA-256 fingerprint of a raw public key.
pub fn fingerprint(public_key: &[u8]) -> String {
    hex::encode(Sha256::digest(public_key))
}

/// Shorten a fingerprint for display to `len` characters (at least 4).
pub fn short_fingerprint(fp: &str, len: usize) -> &str {
    match fp.char_indices().nth(len.max(4)) {
        Some((end, _)) => &fp[..end],
        None => fp,
    }
}
