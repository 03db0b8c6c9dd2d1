//! Key derivation using Argon2id.
//!
//! Every container starts with 16 fresh random bytes of salt; the key
//! derived from (password, salt) lives exactly as long as the encrypt or
//! decrypt call that owns it and is zeroed on drop. Cost parameters come
//! from the configuration snapshot so the shell can tune them, but the
//! derivation fails closed on anything the AEAD layer cannot use.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::TryRngCore;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::config::{KEY_LENGTHS, KdfParams, SALT_LEN};
use crate::error::{Error, Result};
use crate::secret::Password;

/// Derives a symmetric key from a password and salt using Argon2id.
///
/// # Arguments
/// * `password` - The password, encoded as UTF-8 bytes without trimming
/// * `salt` - The 16-byte per-container salt
/// * `params` - Argon2id costs and output length
///
/// # Returns
/// A key of exactly `params.length` bytes, zeroed when dropped.
///
/// # Errors
/// [`Error::InvalidConfig`] if `params.length` is not 16, 24, or 32, or if
/// the cost parameters are out of Argon2's accepted ranges.
pub fn derive_key(password: &Password, salt: &[u8; SALT_LEN], params: &KdfParams) -> Result<Zeroizing<Vec<u8>>> {
    if !KEY_LENGTHS.contains(&params.length) {
        return Err(Error::InvalidConfig(format!(
            "derived key length must be one of {KEY_LENGTHS:?} bytes, got {}",
            params.length
        )));
    }

    let costs = Params::new(params.memory_cost, params.iterations, params.lanes, Some(params.length))
        .map_err(|e| Error::InvalidConfig(format!("invalid Argon2 parameters: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, costs);

    let mut key = Zeroizing::new(vec![0u8; params.length]);
    argon2
        .hash_password_into(password.expose_bytes(), salt, &mut key)
        .map_err(|e| Error::InvalidConfig(format!("key derivation failed: {e}")))?;

    Ok(key)
}

/// Generates N cryptographically secure random bytes from the OS CSPRNG.
///
/// # Errors
/// [`Error::Io`] if the OS random source fails.
pub fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    fill_random(&mut bytes)?;
    Ok(bytes)
}

/// Fills a buffer with bytes from the OS CSPRNG.
///
/// # Errors
/// [`Error::Io`] if the OS random source fails.
pub fn fill_random(buf: &mut [u8]) -> Result<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| Error::Io(std::io::Error::other(format!("OS random source failed: {e}"))))
}

/// Generates a fresh random salt for key derivation.
///
/// # Errors
/// [`Error::Io`] if the OS random source fails.
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    random_bytes()
}
