//! Single-shot container: whole-file encrypt/decrypt in memory.
//!
//! On-disk layout, big-endian throughout:
//!
//! ```text
//! salt[16] ‖ nonce[12] ‖ AES-GCM( NL[2]‖name‖EL[1]‖ext‖payload, AAD ) ‖ tag[16]
//! ```
//!
//! The whole source file is read into memory, so callers pick the
//! streaming container for anything that does not comfortably fit in RAM.
//! That trade is deliberate: one AEAD call covers name, extension, and
//! payload in a single authenticated unit.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;
use zeroize::Zeroizing;

use crate::config::{Config, NONCE_LEN, SALT_LEN, TAG_LEN};
use crate::crypto::{Cipher, derive_key, generate_salt, random_bytes};
use crate::error::{Error, Result};
use crate::header::FileMeta;
use crate::output;
use crate::secret::Password;

/// Encrypts `input` into a single-shot container.
///
/// The output lands in `output_dir` (which must exist) or beside the
/// input. With `custom_name` the configured extension is appended (and
/// stripped first if the user already typed it) and an existing file is
/// refused; otherwise a fresh random name is drawn, retrying on collision.
///
/// Returns the absolute path of the written container.
///
/// # Errors
/// [`Error::NotFound`] for a missing input, [`Error::DirNotFound`] for a
/// missing explicit output directory, [`Error::Conflict`] when a custom
/// name already exists, [`Error::NameTooLong`] / [`Error::ExtTooLong`] on
/// metadata overflow, [`Error::InvalidConfig`] on a bad snapshot.
pub fn encrypt(
    input: &Path,
    password: &Password,
    config: &Config,
    output_dir: Option<&Path>,
    custom_name: Option<&str>,
) -> Result<PathBuf> {
    config.validate()?;

    if !input.is_file() {
        return Err(Error::NotFound { path: input.to_path_buf() });
    }

    let meta = FileMeta::from_path(input)?;
    let header = meta.encode()?;
    let payload = fs::read(input)?;

    let mut plaintext = Zeroizing::new(Vec::with_capacity(header.len() + payload.len()));
    plaintext.extend_from_slice(&header);
    plaintext.extend_from_slice(&payload);

    let salt = generate_salt()?;
    let key = derive_key(password, &salt, &config.kdf_params)?;
    let cipher = Cipher::new(&key)?;
    let nonce = random_bytes::<NONCE_LEN>()?;
    let ciphertext = cipher.seal(&nonce, &plaintext, config.aad_bytes())?;
    drop(plaintext);

    let target_dir = output::resolve_target_dir(output_dir, input)?;
    let ext = &config.general_params.extension;
    let (path, mut file) = match custom_name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => output::create_named(&target_dir, name, ext)?,
        None => output::create_random(&target_dir, &config.filename_params, ext)?,
    };

    let written = write_container(&mut file, &salt, &nonce, &ciphertext);
    drop(file);
    if let Err(e) = written {
        // Half-written containers are useless; do not leave them around.
        let _ = fs::remove_file(&path);
        return Err(e.into());
    }

    debug!(output = %path.display(), bytes = ciphertext.len(), "sealed single-shot container");
    Ok(std::path::absolute(path)?)
}

fn write_container(file: &mut fs::File, salt: &[u8], nonce: &[u8], ciphertext: &[u8]) -> std::io::Result<()> {
    file.write_all(salt)?;
    file.write_all(nonce)?;
    file.write_all(ciphertext)?;
    file.flush()
}

/// Decrypts a single-shot container, restoring the embedded file name.
///
/// The payload is written to `output_dir` (which must exist) or beside the
/// input, under the original `name + ext`. An existing file of that name
/// is **overwritten**: callers depend on this, and it is the documented
/// asymmetry with [`encrypt`], which never overwrites.
///
/// Returns the absolute path of the restored file.
///
/// # Errors
/// [`Error::InvalidTag`] on any authentication failure (wrong password,
/// KDF parameters, AAD, or tampering); no output is created in that case.
/// [`Error::Corrupt`] when the container is shorter than its fixed framing
/// or the embedded metadata is malformed.
pub fn decrypt(input: &Path, password: &Password, config: &Config, output_dir: Option<&Path>) -> Result<PathBuf> {
    config.validate()?;

    if !input.is_file() {
        return Err(Error::NotFound { path: input.to_path_buf() });
    }

    let container = fs::read(input)?;
    if container.len() < SALT_LEN + NONCE_LEN + TAG_LEN {
        return Err(Error::Corrupt("container shorter than salt, nonce, and tag".to_owned()));
    }

    let (salt, rest) = container.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
    let salt: [u8; SALT_LEN] = salt.try_into().expect("split is exact");
    let nonce: [u8; NONCE_LEN] = nonce.try_into().expect("split is exact");

    let key = derive_key(password, &salt, &config.kdf_params)?;
    let cipher = Cipher::new(&key)?;
    let plaintext = Zeroizing::new(cipher.open(&nonce, ciphertext, config.aad_bytes())?);

    let (meta, consumed) = FileMeta::decode(&plaintext)?;
    let target_dir = output::resolve_target_dir(output_dir, input)?;
    let path = target_dir.join(meta.full_name());

    fs::write(&path, &plaintext[consumed..])?;

    debug!(output = %path.display(), "restored single-shot container");
    Ok(std::path::absolute(path)?)
}
