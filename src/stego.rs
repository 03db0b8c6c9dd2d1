//! Appended-data steganography.
//!
//! A secret file is hidden by concatenating it after a cover image and
//! appending a metadata trailer that is parsed backwards from the end of
//! the file:
//!
//! ```text
//! cover_bytes ‖ secret_bytes ‖ secret_name[L_s] ‖ L_s[4] ‖ cover_name[L_c] ‖ L_c[4] ‖ secret_len[8] ‖ "STG_V2.0"
//! ```
//!
//! No cryptography here: callers hide a ciphertext container if they want
//! secrecy. Viewers that stop at the image's own end-of-data marker simply
//! never look at the appended bytes.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Trailer signature, last eight bytes of a carrier file.
pub const SIGNATURE: &[u8; 8] = b"STG_V2.0";

/// Default carrier path for a cover image: the configured suffix goes
/// between the cover's stem and extension, in the cover's directory.
/// `photo.png` with suffix `_stego` becomes `photo_stego.png`.
#[must_use]
pub fn carrier_path(cover: &Path, suffix: &str) -> PathBuf {
    let stem = cover.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match cover.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };
    cover.with_file_name(name)
}

/// Hides `secret` inside a copy of `cover` written to `output`.
///
/// # Errors
/// [`Error::NotFound`] when either input is missing, [`Error::Conflict`]
/// when `output` already exists.
pub fn hide(cover: &Path, secret: &Path, output: &Path) -> Result<()> {
    for path in [cover, secret] {
        if !path.is_file() {
            return Err(Error::NotFound { path: path.to_path_buf() });
        }
    }

    let cover_name = base_name(cover);
    let secret_name = base_name(secret);
    let secret_len = fs::metadata(secret)?.len();

    let out_file = match OpenOptions::new().write(true).create_new(true).open(output) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(Error::Conflict { path: output.to_path_buf() });
        }
        Err(e) => return Err(e.into()),
    };
    let mut writer = BufWriter::new(out_file);

    let written = (|| -> Result<()> {
        io::copy(&mut BufReader::new(File::open(cover)?), &mut writer)?;
        io::copy(&mut BufReader::new(File::open(secret)?), &mut writer)?;

        writer.write_all(secret_name.as_bytes())?;
        writer.write_all(&u32::try_from(secret_name.len()).map_err(|_| Error::NameTooLong { len: secret_name.len() })?.to_be_bytes())?;
        writer.write_all(cover_name.as_bytes())?;
        writer.write_all(&u32::try_from(cover_name.len()).map_err(|_| Error::NameTooLong { len: cover_name.len() })?.to_be_bytes())?;
        writer.write_all(&secret_len.to_be_bytes())?;
        writer.write_all(SIGNATURE)?;
        writer.flush()?;
        Ok(())
    })();

    if let Err(e) = written {
        drop(writer);
        let _ = fs::remove_file(output);
        return Err(e);
    }

    debug!(output = %output.display(), "carrier written");
    Ok(())
}

/// Extracts the clean cover and the secret from a carrier file into
/// `output_dir`, under their recorded names.
///
/// Returns `(cover_name, secret_name)`.
///
/// # Errors
/// [`Error::NoSignature`] when the trailer signature is absent,
/// [`Error::Corrupt`] when the recorded sizes do not fit the file,
/// [`Error::Conflict`] when either output name already exists.
pub fn extract(carrier: &Path, output_dir: &Path) -> Result<(String, String)> {
    if !carrier.is_file() {
        return Err(Error::NotFound { path: carrier.to_path_buf() });
    }

    let mut file = File::open(carrier)?;
    let file_size = file.metadata()?.len();

    let sig_len = SIGNATURE.len() as u64;
    if file_size < sig_len {
        return Err(Error::NoSignature);
    }
    let mut sig = [0u8; 8];
    file.seek(SeekFrom::End(-(sig_len as i64)))?;
    file.read_exact(&mut sig)?;
    if sig != *SIGNATURE {
        return Err(Error::NoSignature);
    }

    let mut tail = TailReader { file: &mut file, offset: sig_len, file_size };
    let secret_len = tail.read_u64()?;
    let cover_name_len = u64::from(tail.read_u32()?);
    let cover_name = tail.read_name(cover_name_len)?;
    let secret_name_len = u64::from(tail.read_u32()?);
    let secret_name = tail.read_name(secret_name_len)?;

    let meta_size = sig_len + 8 + 4 + cover_name_len + 4 + secret_name_len;
    let secret_start = file_size
        .checked_sub(meta_size)
        .and_then(|n| n.checked_sub(secret_len))
        .ok_or_else(|| Error::Corrupt("carrier sizes are inconsistent".to_owned()))?;

    let cover_path = output_dir.join(&cover_name);
    let secret_path = output_dir.join(&secret_name);
    for path in [&cover_path, &secret_path] {
        if path.exists() {
            return Err(Error::Conflict { path: path.clone() });
        }
    }

    fs::create_dir_all(output_dir)?;

    file.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(file);
    copy_exact(&mut reader, &cover_path, secret_start)?;
    copy_exact(&mut reader, &secret_path, secret_len)?;

    debug!(cover = cover_name, secret = secret_name, "carrier unpacked");
    Ok((cover_name, secret_name))
}

fn base_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

fn copy_exact(reader: &mut impl Read, dest: &Path, len: u64) -> Result<()> {
    let mut writer = BufWriter::new(File::create(dest)?);
    let copied = io::copy(&mut reader.take(len), &mut writer)?;
    if copied != len {
        drop(writer);
        let _ = fs::remove_file(dest);
        return Err(Error::Corrupt("carrier shorter than its recorded sizes".to_owned()));
    }
    writer.flush()?;
    Ok(())
}

/// Reads trailer fields back-to-front, keeping a running offset from the
/// end of the file.
struct TailReader<'a> {
    file: &'a mut File,
    offset: u64,
    file_size: u64,
}

impl TailReader<'_> {
    fn read_at_end(&mut self, len: u64, buf: &mut [u8]) -> Result<()> {
        self.offset = self
            .offset
            .checked_add(len)
            .filter(|&total| total <= self.file_size)
            .ok_or_else(|| Error::Corrupt("carrier trailer truncated".to_owned()))?;
        self.file.seek(SeekFrom::Start(self.file_size - self.offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_at_end(4, &mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_at_end(8, &mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    fn read_name(&mut self, len: u64) -> Result<String> {
        let len_usize =
            usize::try_from(len).map_err(|_| Error::Corrupt("carrier name length out of range".to_owned()))?;
        let mut buf = vec![0u8; len_usize];
        self.read_at_end(len, &mut buf)?;
        String::from_utf8(buf).map_err(|_| Error::Corrupt("carrier name is not UTF-8".to_owned()))
    }
}
