//! Embedded filename metadata.
//!
//! Both container formats carry the original file name inside the
//! ciphertext as `NL[2] ‖ name[NL] ‖ EL[1] ‖ ext[EL]`, big-endian, UTF-8.
//! In the single-shot container the triple prefixes the whole plaintext;
//! in the streaming container it occupies the start of the first chunk.
//! The extension keeps its leading dot, so splitting and rejoining is
//! plain concatenation.

use std::path::Path;

use crate::config::{EXT_LEN_MAX, NAME_LEN_MAX};
use crate::error::{Error, Result};

/// The name/extension pair embedded in a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    /// File stem. May be empty for dot-files such as `.bashrc`.
    pub name: String,
    /// Extension including the leading dot, or empty if the file name has
    /// no dot.
    pub ext: String,
}

impl FileMeta {
    /// Splits a path's base name at its last dot.
    ///
    /// `note.txt` → (`note`, `.txt`); `archive.tar.gz` → (`archive.tar`,
    /// `.gz`); `README` → (`README`, ``); `.bashrc` → (``, `.bashrc`).
    ///
    /// # Errors
    /// [`Error::NotFound`] if the path has no base name at all.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .ok_or_else(|| Error::NotFound { path: path.to_path_buf() })?
            .to_string_lossy()
            .into_owned();

        match file_name.rfind('.') {
            Some(dot) => Ok(Self { name: file_name[..dot].to_owned(), ext: file_name[dot..].to_owned() }),
            None => Ok(Self { name: file_name, ext: String::new() }),
        }
    }

    /// The original file name, `name + ext`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}{}", self.name, self.ext)
    }

    /// Encoded length of the triple in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        2 + self.name.len() + 1 + self.ext.len()
    }

    /// Encodes the triple as `NL[2] ‖ name ‖ EL[1] ‖ ext`.
    ///
    /// # Errors
    /// [`Error::NameTooLong`] / [`Error::ExtTooLong`] when a length prefix
    /// would overflow.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let name = self.name.as_bytes();
        let ext = self.ext.as_bytes();

        if name.len() > NAME_LEN_MAX {
            return Err(Error::NameTooLong { len: name.len() });
        }
        if ext.len() > EXT_LEN_MAX {
            return Err(Error::ExtTooLong { len: ext.len() });
        }

        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&u16::try_from(name.len()).expect("checked above").to_be_bytes());
        buf.extend_from_slice(name);
        buf.push(u8::try_from(ext.len()).expect("checked above"));
        buf.extend_from_slice(ext);
        Ok(buf)
    }

    /// Decodes a triple from the front of `buf`, returning the metadata and
    /// the number of bytes consumed.
    ///
    /// # Errors
    /// [`Error::Corrupt`] on truncation or invalid UTF-8.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let name_len = buf
            .get(..2)
            .map(|b| usize::from(u16::from_be_bytes([b[0], b[1]])))
            .ok_or_else(|| Error::Corrupt("metadata header truncated".to_owned()))?;

        let name_end = 2 + name_len;
        let name = buf
            .get(2..name_end)
            .ok_or_else(|| Error::Corrupt("metadata name truncated".to_owned()))?;

        let ext_len = usize::from(
            *buf.get(name_end)
                .ok_or_else(|| Error::Corrupt("metadata header truncated".to_owned()))?,
        );
        let ext_end = name_end + 1 + ext_len;
        let ext = buf
            .get(name_end + 1..ext_end)
            .ok_or_else(|| Error::Corrupt("metadata extension truncated".to_owned()))?;

        let name = std::str::from_utf8(name)
            .map_err(|_| Error::Corrupt("metadata name is not UTF-8".to_owned()))?
            .to_owned();
        let ext = std::str::from_utf8(ext)
            .map_err(|_| Error::Corrupt("metadata extension is not UTF-8".to_owned()))?
            .to_owned();

        Ok((Self { name, ext }, ext_end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_at_last_dot() {
        let meta = FileMeta::from_path(Path::new("/tmp/archive.tar.gz")).unwrap();
        assert_eq!(meta.name, "archive.tar");
        assert_eq!(meta.ext, ".gz");
        assert_eq!(meta.full_name(), "archive.tar.gz");
    }

    #[test]
    fn test_no_dot_means_no_extension() {
        let meta = FileMeta::from_path(Path::new("README")).unwrap();
        assert_eq!(meta.name, "README");
        assert_eq!(meta.ext, "");
    }

    #[test]
    fn test_dotfile_has_empty_stem() {
        let meta = FileMeta::from_path(Path::new(".bashrc")).unwrap();
        assert_eq!(meta.name, "");
        assert_eq!(meta.ext, ".bashrc");
        assert_eq!(meta.full_name(), ".bashrc");
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let meta = FileMeta { name: "note".to_owned(), ext: ".txt".to_owned() };
        let encoded = meta.encode().unwrap();
        assert_eq!(encoded.len(), meta.encoded_len());
        assert_eq!(encoded.len(), 2 + 4 + 1 + 4);

        let (decoded, consumed) = FileMeta::decode(&encoded).unwrap();
        assert_eq!(decoded, meta);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn test_decode_ignores_trailing_payload() {
        let meta = FileMeta { name: "a".to_owned(), ext: ".b".to_owned() };
        let mut buf = meta.encode().unwrap();
        let consumed_expected = buf.len();
        buf.extend_from_slice(b"PAYLOAD");

        let (decoded, consumed) = FileMeta::decode(&buf).unwrap();
        assert_eq!(decoded, meta);
        assert_eq!(consumed, consumed_expected);
    }

    #[test]
    fn test_unicode_names_survive() {
        let meta = FileMeta { name: "отчёт".to_owned(), ext: ".txt".to_owned() };
        let encoded = meta.encode().unwrap();
        let (decoded, _) = FileMeta::decode(&encoded).unwrap();
        assert_eq!(decoded.full_name(), "отчёт.txt");
    }

    #[test]
    fn test_name_too_long() {
        let meta = FileMeta { name: "x".repeat(NAME_LEN_MAX + 1), ext: String::new() };
        assert!(matches!(meta.encode(), Err(Error::NameTooLong { .. })));
    }

    #[test]
    fn test_ext_too_long() {
        let meta = FileMeta { name: "x".to_owned(), ext: ".".repeat(EXT_LEN_MAX + 1) };
        assert!(matches!(meta.encode(), Err(Error::ExtTooLong { .. })));
    }

    #[test]
    fn test_decode_truncated() {
        assert!(matches!(FileMeta::decode(&[]), Err(Error::Corrupt(_))));
        assert!(matches!(FileMeta::decode(&[0, 5, b'a']), Err(Error::Corrupt(_))));
        // Name fits, extension length byte missing.
        assert!(matches!(FileMeta::decode(&[0, 1, b'a']), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_decode_rejects_bad_utf8() {
        let buf = [0, 2, 0xFF, 0xFE, 0];
        assert!(matches!(FileMeta::decode(&buf), Err(Error::Corrupt(_))));
    }
}
