//! Streaming container: chunked AEAD framing for files of any size.
//!
//! On-disk layout, big-endian throughout:
//!
//! ```text
//! salt[16]
//! repeat: nonce[12] ‖ real_len[4] ‖ AES-GCM( chunk[C], AAD ) ‖ tag[16]
//! ```
//!
//! Every chunk's plaintext is exactly `C = chunk_size` bytes on the wire;
//! `real_len` counts the meaningful prefix and the tail is filled with
//! fresh random bytes, so two files that round up to the same chunk count
//! produce ciphertexts of identical length. The embedded name triple
//! (`NL‖name‖EL‖ext`) occupies the start of the first chunk's plaintext,
//! not the container header.
//!
//! Decryption authenticates every chunk before a single byte of output
//! exists: the sink and its parent directories are created only after the
//! first chunk's tag verifies. A wrong password therefore touches nothing.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use zeroize::Zeroizing;

use crate::config::{CHUNK_OVERHEAD, Config, LEN_PREFIX_LEN, NONCE_LEN, SALT_LEN, TAG_LEN};
use crate::crypto::{Cipher, derive_key, generate_salt, random_bytes};
use crate::crypto::derive::fill_random;
use crate::error::{Error, Result};
use crate::header::FileMeta;
use crate::output;
use crate::secret::Password;

/// On-disk size of a streaming container for a payload of `payload_len`
/// bytes whose encoded name triple is `header_len` bytes.
///
/// `salt + ceil((payload + header) / C) · (C + nonce + len + tag)`; a
/// zero-byte payload still occupies one chunk because the triple is never
/// empty.
#[must_use]
pub fn encrypted_size(payload_len: u64, header_len: usize, chunk_size: u32) -> u64 {
    let c = u128::from(chunk_size);
    let total = u128::from(payload_len) + header_len as u128;
    let chunks = total.div_ceil(c).max(1);
    let size = SALT_LEN as u128 + chunks * (c + CHUNK_OVERHEAD as u128);
    u64::try_from(size).unwrap_or(u64::MAX)
}

/// Encrypts `input` into the vault under a fresh random name.
///
/// The vault directory is created if absent. Returns the stored basename,
/// which is what the manifest records.
///
/// # Errors
/// [`Error::NotFound`] for a missing input; [`Error::InvalidConfig`] when
/// the chunk size cannot fit the name triple.
pub fn encrypt_to_vault(input: &Path, vault_dir: &Path, password: &Password, config: &Config) -> Result<String> {
    config.validate()?;
    if !input.is_file() {
        return Err(Error::NotFound { path: input.to_path_buf() });
    }

    fs::create_dir_all(vault_dir)?;
    let (path, file) = output::create_random(vault_dir, &config.filename_params, &config.general_params.extension)?;

    match encrypt_into(input, file, password, config) {
        Ok(()) => {
            debug!(stored = %path.display(), "streamed file into vault");
            Ok(path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default())
        }
        Err(e) => {
            let _ = fs::remove_file(&path);
            Err(e)
        }
    }
}

/// Encrypts `input` into a streaming container with single-file output
/// resolution: explicit directory (must exist) or beside the input, custom
/// name (never overwrites) or a fresh random one.
///
/// Returns the absolute path of the written container.
///
/// # Errors
/// As [`encrypt_to_vault`], plus [`Error::DirNotFound`] and
/// [`Error::Conflict`] from name resolution.
pub fn encrypt_single(
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

    let target_dir = output::resolve_target_dir(output_dir, input)?;
    let ext = &config.general_params.extension;
    let (path, file) = match custom_name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => output::create_named(&target_dir, name, ext)?,
        None => output::create_random(&target_dir, &config.filename_params, ext)?,
    };

    match encrypt_into(input, file, password, config) {
        Ok(()) => Ok(std::path::absolute(path)?),
        Err(e) => {
            let _ = fs::remove_file(&path);
            Err(e)
        }
    }
}

/// Runs the chunk pipeline from `input` into an already-opened output
/// file, then fsyncs it so the caller may record its existence durably.
fn encrypt_into(input: &Path, file: File, password: &Password, config: &Config) -> Result<()> {
    let meta = FileMeta::from_path(input)?;
    let header = meta.encode()?;
    let chunk_size = chunk_size_for(config, header.len())?;

    let salt = generate_salt()?;
    let key = derive_key(password, &salt, &config.kdf_params)?;
    let cipher = Cipher::new(&key)?;
    let aad = config.aad_bytes();

    let mut reader = BufReader::new(File::open(input)?);
    let mut writer = BufWriter::new(file);
    writer.write_all(&salt)?;

    let mut chunk = Zeroizing::new(vec![0u8; chunk_size]);
    let mut first = true;
    loop {
        let offset = if first {
            chunk[..header.len()].copy_from_slice(&header);
            header.len()
        } else {
            0
        };

        let got = read_up_to(&mut reader, &mut chunk[offset..])?;
        let real_len = offset + got;
        if real_len == 0 {
            break;
        }
        if real_len < chunk_size {
            fill_random(&mut chunk[real_len..])?;
        }

        let nonce = random_bytes::<NONCE_LEN>()?;
        let sealed = cipher.seal(&nonce, &chunk, aad)?;
        writer.write_all(&nonce)?;
        writer.write_all(&u32::try_from(real_len).expect("real_len <= chunk_size <= u32::MAX").to_be_bytes())?;
        writer.write_all(&sealed)?;
        first = false;
    }

    writer.flush()?;
    writer.into_inner().map_err(|e| Error::Io(e.into_error()))?.sync_all()?;
    Ok(())
}

/// Decrypts a streaming container, writing the payload under the embedded
/// name into `output_dir` (must exist) or beside the input.
///
/// Like the single-shot decrypt, an existing file of the embedded name is
/// overwritten.
///
/// Returns the absolute path of the restored file.
///
/// # Errors
/// [`Error::InvalidTag`] on any chunk's authentication failure; no output
/// exists in that case. [`Error::Corrupt`] on truncated framing.
pub fn decrypt_single(input: &Path, password: &Password, config: &Config, output_dir: Option<&Path>) -> Result<PathBuf> {
    let input_owned = input.to_path_buf();
    let output_dir = output_dir.map(Path::to_path_buf);
    decrypt_stream(input, password, config, move |meta| {
        let dir = output::resolve_target_dir(output_dir.as_deref(), &input_owned)?;
        Ok(dir.join(meta.full_name()))
    })
}

/// Decrypts a streaming container to an explicit destination path,
/// creating parent directories only after the first chunk authenticates.
/// The embedded name triple is parsed and discarded; the manifest is the
/// authority on where a vault entry belongs.
///
/// # Errors
/// As [`decrypt_single`].
pub fn decrypt_to_path(input: &Path, password: &Password, config: &Config, dest: &Path) -> Result<()> {
    let dest = dest.to_path_buf();
    decrypt_stream(input, password, config, move |_meta| Ok(dest.clone())).map(|_| ())
}

fn decrypt_stream(
    input: &Path,
    password: &Password,
    config: &Config,
    resolve: impl FnOnce(&FileMeta) -> Result<PathBuf>,
) -> Result<PathBuf> {
    config.validate()?;
    if !input.is_file() {
        return Err(Error::NotFound { path: input.to_path_buf() });
    }

    let chunk_size = usize::try_from(config.streaming_params.chunk_size)
        .map_err(|_| Error::InvalidConfig("chunk size exceeds the address space".to_owned()))?;

    let mut reader = BufReader::new(File::open(input)?);
    let mut salt = [0u8; SALT_LEN];
    if read_up_to(&mut reader, &mut salt)? < SALT_LEN {
        return Err(Error::Corrupt("container shorter than its salt".to_owned()));
    }

    let key = derive_key(password, &salt, &config.kdf_params)?;
    let cipher = Cipher::new(&key)?;
    let aad = config.aad_bytes();

    let mut resolve = Some(resolve);
    let mut out: Option<(BufWriter<File>, PathBuf)> = None;
    let mut sealed = vec![0u8; chunk_size + TAG_LEN];

    let run = (|| -> Result<()> {
        loop {
            let mut nonce = [0u8; NONCE_LEN];
            let got = read_up_to(&mut reader, &mut nonce)?;
            if got == 0 {
                return Ok(());
            }
            if got < NONCE_LEN {
                return Err(Error::Corrupt("truncated chunk nonce".to_owned()));
            }

            let mut len_buf = [0u8; LEN_PREFIX_LEN];
            if read_up_to(&mut reader, &mut len_buf)? < LEN_PREFIX_LEN {
                // A container cut between frames decodes up to the cut.
                return Ok(());
            }
            let real_len = usize::try_from(u32::from_be_bytes(len_buf)).expect("u32 fits usize");

            if read_up_to(&mut reader, &mut sealed)? < sealed.len() {
                return Err(Error::Corrupt("truncated chunk ciphertext".to_owned()));
            }

            let chunk = Zeroizing::new(cipher.open(&nonce, &sealed, aad)?);
            if real_len > chunk_size {
                return Err(Error::Corrupt("chunk length prefix out of range".to_owned()));
            }
            let data = &chunk[..real_len];

            match &mut out {
                None => {
                    let (meta, consumed) = FileMeta::decode(data)?;
                    let path = resolve.take().expect("resolved once")(&meta)?;
                    if let Some(parent) = path.parent()
                        && !parent.as_os_str().is_empty()
                    {
                        fs::create_dir_all(parent)?;
                    }
                    let mut writer = BufWriter::new(File::create(&path)?);
                    writer.write_all(&data[consumed..])?;
                    out = Some((writer, path));
                }
                Some((writer, _)) => writer.write_all(data)?,
            }
        }
    })();

    match (run, out) {
        (Ok(()), Some((mut writer, path))) => {
            writer.flush()?;
            debug!(output = %path.display(), "streamed container decrypted");
            Ok(std::path::absolute(path)?)
        }
        (Ok(()), None) => Err(Error::Corrupt("container has no chunks".to_owned())),
        (Err(e), Some((writer, path))) => {
            // Never leave a half-restored file behind.
            drop(writer);
            let _ = fs::remove_file(&path);
            Err(e)
        }
        (Err(e), None) => Err(e),
    }
}

fn chunk_size_for(config: &Config, header_len: usize) -> Result<usize> {
    let chunk_size = usize::try_from(config.streaming_params.chunk_size)
        .map_err(|_| Error::InvalidConfig("chunk size exceeds the address space".to_owned()))?;
    if chunk_size <= header_len {
        return Err(Error::InvalidConfig(format!(
            "chunk size {chunk_size} cannot fit the {header_len}-byte name header"
        )));
    }
    Ok(chunk_size)
}

fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
