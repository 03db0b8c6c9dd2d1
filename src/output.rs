//! Output-path allocation.
//!
//! Ciphertext outputs either get a random name drawn from a 64-symbol
//! alphabet, or a caller-supplied name that is never allowed to clobber an
//! existing file. In both cases the file is opened create-exclusive, so
//! two concurrent encryptions racing for the same name produce at most one
//! winner; the loser sees [`Error::Conflict`].

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rand::Rng;
use rand::TryRngCore;
use rand::rngs::OsRng;

use crate::config::{FilenameParams, NAME_ATTEMPTS};
use crate::error::{Error, Result};

/// The random-name alphabet: 64 symbols, so each character carries exactly
/// six bits.
const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Draws a random name: length uniform in `[min_len, max_len]`, each
/// character uniform over [`ALPHABET`].
///
/// # Errors
/// [`Error::InvalidConfig`] on inverted or zero bounds.
pub fn random_name(params: &FilenameParams) -> Result<String> {
    if params.min_len < 1 || params.max_len < params.min_len {
        return Err(Error::InvalidConfig(format!(
            "filename length bounds must satisfy 1 <= min <= max, got {}..={}",
            params.min_len, params.max_len
        )));
    }

    let mut rng = OsRng.unwrap_err();
    let length = rng.random_range(params.min_len..=params.max_len);
    let name = (0..length).map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())])).collect();
    Ok(name)
}

/// Resolves the directory an output lands in.
///
/// An explicit directory must already exist; otherwise the output goes
/// beside the input.
///
/// # Errors
/// [`Error::DirNotFound`] if `output_dir` is given but absent.
pub fn resolve_target_dir(output_dir: Option<&Path>, input: &Path) -> Result<PathBuf> {
    match output_dir {
        Some(dir) => {
            if dir.is_dir() {
                Ok(dir.to_path_buf())
            } else {
                Err(Error::DirNotFound { path: dir.to_path_buf() })
            }
        }
        None => {
            let parent = input.parent().unwrap_or_else(|| Path::new("."));
            if parent.as_os_str().is_empty() { Ok(PathBuf::from(".")) } else { Ok(parent.to_path_buf()) }
        }
    }
}

/// Allocates a randomly named output file in `dir`, retrying on collision.
///
/// # Errors
/// [`Error::Conflict`] if every attempt collided, [`Error::Io`] on other
/// filesystem failures.
pub fn create_random(dir: &Path, params: &FilenameParams, ext: &str) -> Result<(PathBuf, File)> {
    for _ in 0..NAME_ATTEMPTS {
        let path = dir.join(format!("{}{ext}", random_name(params)?));
        match open_exclusive(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }
    }

    // 64^min_len possibilities; exhausting the attempts means the bounds
    // are degenerate or the directory is adversarially full.
    Err(Error::Conflict { path: dir.to_path_buf() })
}

/// Allocates a caller-named output file in `dir`.
///
/// A trailing `ext` typed by the user is stripped first so the result never
/// doubles the extension. Existing files are never overwritten.
///
/// # Errors
/// [`Error::Conflict`] if the target already exists.
pub fn create_named(dir: &Path, custom_name: &str, ext: &str) -> Result<(PathBuf, File)> {
    let trimmed = custom_name.trim();
    let base = trimmed.strip_suffix(ext).unwrap_or(trimmed);
    let path = dir.join(format!("{base}{ext}"));

    match open_exclusive(&path) {
        Ok(file) => Ok((path, file)),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(Error::Conflict { path }),
        Err(e) => Err(e.into()),
    }
}

fn open_exclusive(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}
