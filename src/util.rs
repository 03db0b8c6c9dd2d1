//! Password generation and file digests.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use rand::Rng;
use rand::TryRngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::config::IO_CHUNK;
use crate::error::{Error, Result};

const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()-_=+[]{};:,.<>?";

/// Generates a random password of `length` characters. Letters are always
/// included; digits and symbols widen the alphabet on request. Every
/// character is drawn uniformly and independently from the OS CSPRNG.
///
/// # Errors
/// [`Error::InvalidConfig`] when `length` is zero.
pub fn generate_password(length: usize, digits: bool, symbols: bool) -> Result<String> {
    if length == 0 {
        return Err(Error::InvalidConfig("password length must be at least 1".to_owned()));
    }

    let mut alphabet = LETTERS.to_vec();
    if digits {
        alphabet.extend_from_slice(DIGITS);
    }
    if symbols {
        alphabet.extend_from_slice(SYMBOLS);
    }

    let mut rng = OsRng.unwrap_err();
    let password = (0..length).map(|_| char::from(alphabet[rng.random_range(0..alphabet.len())])).collect();
    Ok(password)
}

/// Computes the SHA-256 digest of a whole file, returned as lowercase hex.
///
/// The file is read in bounded chunks, so arbitrarily large inputs are
/// fine.
///
/// # Errors
/// [`Error::NotFound`] for a missing input.
pub fn sha256_file(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(Error::NotFound { path: path.to_path_buf() });
    }

    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; IO_CHUNK];

    loop {
        let got = reader.read(&mut buf)?;
        if got == 0 {
            break;
        }
        hasher.update(&buf[..got]);
    }

    Ok(hex::encode(hasher.finalize()))
}
