/*
 * Copyright 2024 lsm-store contributors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! The authenticated-encryption stage of the codec pipeline.
//!
//! Real AEAD (`chacha20poly1305`) gated behind a Cargo feature, with the
//! key wrapped in a `secrecy`-zeroized handle, falling back to a
//! degenerate stream cipher when the feature is off so the pipeline
//! keeps functioning with explicitly flagged, degraded confidentiality.

use base64::Engine as _;
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};

use crate::error::{Error, Result};

const NONCE_LEN: usize = 12;

/// An in-memory, zeroize-on-drop handle to a raw encryption key.
pub struct EncryptionKey(Secret<Vec<u8>>);

impl Clone for EncryptionKey {
    fn clone(&self) -> Self {
        EncryptionKey(Secret::new(self.0.expose_secret().clone()))
    }
}

impl EncryptionKey {
    /// Wrap raw key bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        EncryptionKey(Secret::new(bytes))
    }

    /// Generate a new random key of `len` bytes using the OS RNG.
    pub fn generate(len: usize) -> Self {
        let mut bytes = vec![0u8; len];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        EncryptionKey::new(bytes)
    }

    /// Encode the key as base64, for persistence as an encryption key
    /// record.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0.expose_secret())
    }

    /// Decode a key previously produced by [`EncryptionKey::to_base64`].
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| Error::CorruptData)?;
        Ok(EncryptionKey::new(bytes))
    }

    fn expose(&self) -> &[u8] {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey").finish_non_exhaustive()
    }
}

/// Authenticated encryption with associated data, as required by the
/// codec pipeline's encrypt/decrypt stage.
///
/// Implementations prepend a 12-byte random nonce to the ciphertext.
/// `open` fails with [`Error::CryptoFail`] on tag mismatch or corruption.
/// Base64 encoding of the sealed bytes happens downstream, at the
/// chunker stage, not here.
pub trait Aead: Send + Sync {
    /// The key length, in bytes, this implementation requires.
    fn key_size(&self) -> usize;

    /// Encrypt `data` under `key`, returning `nonce || ciphertext`.
    fn seal(&self, data: &[u8], key: &EncryptionKey) -> Result<Vec<u8>>;

    /// Reverse [`Aead::seal`].
    fn open(&self, sealed: &[u8], key: &EncryptionKey) -> Result<Vec<u8>>;
}

/// Real AEAD via `ChaCha20Poly1305`, used whenever the `encryption`
/// feature is enabled (the default).
#[cfg(feature = "encryption")]
#[derive(Debug, Default, Clone, Copy)]
pub struct ChaCha20Poly1305Aead;

#[cfg(feature = "encryption")]
impl Aead for ChaCha20Poly1305Aead {
    fn key_size(&self) -> usize {
        32
    }

    fn seal(&self, data: &[u8], key: &EncryptionKey) -> Result<Vec<u8>> {
        use chacha20poly1305::{aead::Aead as _, ChaCha20Poly1305, KeyInit, Nonce};

        let cipher = ChaCha20Poly1305::new_from_slice(key.expose())
            .map_err(|_| Error::CryptoFail)?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher.encrypt(nonce, data).map_err(|_| Error::CryptoFail)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open(&self, sealed: &[u8], key: &EncryptionKey) -> Result<Vec<u8>> {
        use chacha20poly1305::{aead::Aead as _, ChaCha20Poly1305, KeyInit, Nonce};

        if sealed.len() < NONCE_LEN {
            return Err(Error::CryptoFail);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let cipher = ChaCha20Poly1305::new_from_slice(key.expose())
            .map_err(|_| Error::CryptoFail)?;
        let nonce = Nonce::from_slice(nonce_bytes);
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| Error::CryptoFail)
    }
}

/// A degenerate stream cipher (XOR keystream derived from the key and
/// nonce) used only when real AEAD is unavailable at compile time (the
/// `encryption` feature is disabled). This provides no integrity
/// protection and no real confidentiality guarantee; callers are told via
/// [`crate::metrics::Metrics::record_degraded_confidentiality`] whenever
/// this implementation is selected.
#[derive(Debug, Default, Clone, Copy)]
pub struct DegenerateStreamCipher;

impl DegenerateStreamCipher {
    fn keystream(key: &[u8], nonce: &[u8], len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(len);
        let mut counter: u64 = 0;
        while out.len() < len {
            let mut block = Vec::with_capacity(key.len() + nonce.len() + 8);
            block.extend_from_slice(key);
            block.extend_from_slice(nonce);
            block.extend_from_slice(&counter.to_le_bytes());
            // A simple, non-cryptographic mixing function: this is
            // explicitly a degenerate fallback, not a real PRF.
            let mut acc: u8 = 0;
            for (i, byte) in block.iter().enumerate() {
                acc = acc.wrapping_add(byte.wrapping_mul(31u8.wrapping_add(i as u8)));
                out.push(acc);
                if out.len() == len {
                    break;
                }
            }
            counter += 1;
        }
        out
    }
}

impl Aead for DegenerateStreamCipher {
    fn key_size(&self) -> usize {
        32
    }

    fn seal(&self, data: &[u8], key: &EncryptionKey) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let keystream = Self::keystream(key.expose(), &nonce_bytes, data.len());
        let ciphertext: Vec<u8> = data
            .iter()
            .zip(keystream.iter())
            .map(|(a, b)| a ^ b)
            .collect();

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open(&self, sealed: &[u8], key: &EncryptionKey) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(Error::CryptoFail);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let keystream = Self::keystream(key.expose(), nonce_bytes, ciphertext.len());
        Ok(ciphertext
            .iter()
            .zip(keystream.iter())
            .map(|(a, b)| a ^ b)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "encryption")]
    #[test]
    fn chacha_round_trips() {
        let aead = ChaCha20Poly1305Aead;
        let key = EncryptionKey::generate(aead.key_size());
        let sealed = aead.seal(b"secret value", &key).unwrap();
        assert_eq!(aead.open(&sealed, &key).unwrap(), b"secret value");
    }

    #[cfg(feature = "encryption")]
    #[test]
    fn chacha_detects_tampering() {
        let aead = ChaCha20Poly1305Aead;
        let key = EncryptionKey::generate(aead.key_size());
        let mut sealed = aead.seal(b"secret value", &key).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(matches!(aead.open(&sealed, &key), Err(Error::CryptoFail)));
    }

    #[test]
    fn degenerate_cipher_round_trips() {
        let aead = DegenerateStreamCipher;
        let key = EncryptionKey::generate(aead.key_size());
        let sealed = aead.seal(b"secret value", &key).unwrap();
        assert_eq!(aead.open(&sealed, &key).unwrap(), b"secret value");
    }

    #[test]
    fn key_base64_round_trips() {
        let key = EncryptionKey::generate(32);
        let encoded = key.to_base64();
        let decoded = EncryptionKey::from_base64(&encoded).unwrap();
        assert_eq!(decoded.expose(), key.expose());
    }
}
