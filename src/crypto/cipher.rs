//! AES-GCM wrapper shared by both container formats.
//!
//! The variant is selected by the derived key length: 16, 24, or 32 bytes
//! for AES-128/192/256-GCM. Nonces are supplied by the caller because the
//! containers write them into their own framing; every call site draws a
//! fresh nonce from the OS CSPRNG. Decryption authenticates before any
//! plaintext is released, and a failed tag check surfaces as
//! [`Error::InvalidTag`] with no further detail.

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm, Nonce};

use crate::config::NONCE_LEN;
use crate::error::{Error, Result};

/// AES-192-GCM with a 96-bit nonce; the `aes-gcm` crate only aliases the
/// 128- and 256-bit variants.
type Aes192Gcm = AesGcm<Aes192, U12>;

/// An AEAD instance bound to one derived key.
pub enum Cipher {
    /// AES-128-GCM, from a 16-byte key.
    Aes128(Box<Aes128Gcm>),
    /// AES-192-GCM, from a 24-byte key.
    Aes192(Box<Aes192Gcm>),
    /// AES-256-GCM, from a 32-byte key.
    Aes256(Box<Aes256Gcm>),
}

impl Cipher {
    /// Builds the cipher matching the key length.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] if the key is not 16, 24, or 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self> {
        match key.len() {
            16 => Ok(Self::Aes128(Box::new(
                Aes128Gcm::new_from_slice(key).map_err(|_| Error::InvalidConfig("bad AES-128 key".to_owned()))?,
            ))),
            24 => Ok(Self::Aes192(Box::new(
                Aes192Gcm::new_from_slice(key).map_err(|_| Error::InvalidConfig("bad AES-192 key".to_owned()))?,
            ))),
            32 => Ok(Self::Aes256(Box::new(
                Aes256Gcm::new_from_slice(key).map_err(|_| Error::InvalidConfig("bad AES-256 key".to_owned()))?,
            ))),
            n => Err(Error::InvalidConfig(format!("unsupported key length: {n} bytes"))),
        }
    }

    /// Encrypts and authenticates `plaintext` under `nonce` and `aad`.
    ///
    /// The output is ciphertext with the 16-byte tag appended; the nonce is
    /// NOT included, the caller frames it.
    ///
    /// # Errors
    /// [`Error::Corrupt`] if the underlying AEAD rejects the input.
    pub fn seal(&self, nonce: &[u8; NONCE_LEN], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let payload = Payload { msg: plaintext, aad };
        let nonce = Nonce::from_slice(nonce);
        let sealed = match self {
            Self::Aes128(aead) => aead.encrypt(nonce, payload),
            Self::Aes192(aead) => aead.encrypt(nonce, payload),
            Self::Aes256(aead) => aead.encrypt(nonce, payload),
        };
        sealed.map_err(|_| Error::Corrupt("AEAD encryption failed".to_owned()))
    }

    /// Verifies the tag and decrypts. No plaintext is observable unless the
    /// tag, nonce, and AAD all check out.
    ///
    /// # Errors
    /// [`Error::InvalidTag`] on any authentication failure, regardless of
    /// cause (wrong password, wrong AAD, tampered bytes).
    pub fn open(&self, nonce: &[u8; NONCE_LEN], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let payload = Payload { msg: ciphertext, aad };
        let nonce = Nonce::from_slice(nonce);
        let opened = match self {
            Self::Aes128(aead) => aead.decrypt(nonce, payload),
            Self::Aes192(aead) => aead.decrypt(nonce, payload),
            Self::Aes256(aead) => aead.decrypt(nonce, payload),
        };
        opened.map_err(|_| Error::InvalidTag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TAG_LEN;
    use crate::crypto::derive::random_bytes;

    #[test]
    fn test_roundtrip_all_key_sizes() {
        for len in [16usize, 24, 32] {
            let key = vec![0x42u8; len];
            let cipher = Cipher::new(&key).unwrap();
            let nonce = random_bytes().unwrap();

            let sealed = cipher.seal(&nonce, b"Hello, World!", b"ctx").unwrap();
            assert_eq!(sealed.len(), 13 + TAG_LEN);

            let opened = cipher.open(&nonce, &sealed, b"ctx").unwrap();
            assert_eq!(opened, b"Hello, World!");
        }
    }

    #[test]
    fn test_rejects_bad_key_length() {
        assert!(matches!(Cipher::new(&[0u8; 20]), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_wrong_aad_fails_closed() {
        let cipher = Cipher::new(&[1u8; 32]).unwrap();
        let nonce = random_bytes().unwrap();
        let sealed = cipher.seal(&nonce, b"payload", b"ctx").unwrap();

        assert!(matches!(cipher.open(&nonce, &sealed, b"CTX"), Err(Error::InvalidTag)));
    }

    #[test]
    fn test_tampered_byte_fails_closed() {
        let cipher = Cipher::new(&[1u8; 32]).unwrap();
        let nonce = random_bytes().unwrap();
        let mut sealed = cipher.seal(&nonce, b"payload", b"").unwrap();

        for i in 0..sealed.len() {
            sealed[i] ^= 0x01;
            assert!(matches!(cipher.open(&nonce, &sealed, b""), Err(Error::InvalidTag)), "flip at {i} not caught");
            sealed[i] ^= 0x01;
        }
    }

    #[test]
    fn test_wrong_nonce_fails_closed() {
        let cipher = Cipher::new(&[1u8; 32]).unwrap();
        let mut nonce = [3u8; NONCE_LEN];
        let sealed = cipher.seal(&nonce, b"payload", b"").unwrap();

        nonce[0] ^= 0x01;
        assert!(matches!(cipher.open(&nonce, &sealed, b""), Err(Error::InvalidTag)));
    }

    #[test]
    fn test_empty_plaintext_is_legal() {
        // A zero-payload single-shot container still carries its header, but
        // the primitive itself must not choke on empty input either.
        let cipher = Cipher::new(&[1u8; 16]).unwrap();
        let nonce = random_bytes().unwrap();
        let sealed = cipher.seal(&nonce, b"", b"").unwrap();
        assert_eq!(sealed.len(), TAG_LEN);
        assert_eq!(cipher.open(&nonce, &sealed, b"").unwrap(), b"");
    }
}
