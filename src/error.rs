//! Error taxonomy for the container, vault, and auxiliary operations.
//!
//! Every failure mode a caller may want to branch on is a distinct variant.
//! The GUI shell maps these onto user-facing dialogs, so the set is part of
//! the public contract: `InvalidTag` in particular must stay distinguishable
//! from generic corruption, since it is the only signal for a wrong password
//! or mismatched KDF/AAD settings.

use std::path::PathBuf;

use bytesize::ByteSize;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors surfaced by the core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An input path (file, vault entry, manifest) does not exist.
    #[error("path not found: {}", path.display())]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// A user-supplied output directory does not exist.
    #[error("output directory not found: {}", path.display())]
    DirNotFound {
        /// The missing directory.
        path: PathBuf,
    },

    /// The target output name already exists and will not be overwritten.
    #[error("target already exists: {}", path.display())]
    Conflict {
        /// The conflicting path.
        path: PathBuf,
    },

    /// The embedded file name exceeds the 2-byte length prefix.
    #[error("file name too long: {len} bytes (limit 65535)")]
    NameTooLong {
        /// Encoded name length in bytes.
        len: usize,
    },

    /// The embedded extension exceeds the 1-byte length prefix.
    #[error("file extension too long: {len} bytes (limit 255)")]
    ExtTooLong {
        /// Encoded extension length in bytes.
        len: usize,
    },

    /// A configuration invariant was violated.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// AEAD authentication failed: wrong password, wrong KDF parameters,
    /// wrong AAD, or a tampered container. The causes are deliberately
    /// indistinguishable.
    #[error("authentication failed (wrong password, KDF parameters, AAD, or corrupted data)")]
    InvalidTag,

    /// The container framing is damaged: short read, truncated chunk, or a
    /// malformed embedded header.
    #[error("corrupted container: {0}")]
    Corrupt(String),

    /// The manifest is unparseable or missing required fields.
    #[error("corrupted manifest: {0}")]
    CorruptManifest(String),

    /// The pre-flight free-space check failed.
    #[error("insufficient space: need {}, available {}", ByteSize::b(*needed), ByteSize::b(*available))]
    InsufficientSpace {
        /// Estimated vault size in bytes.
        needed: u64,
        /// Free space on the target filesystem in bytes.
        available: u64,
    },

    /// A manifest entry would resolve outside the restoration root.
    #[error("path escapes the restoration root: {}", path.display())]
    PathTraversal {
        /// The offending relative path as recorded in the manifest.
        path: PathBuf,
    },

    /// No steganographic trailer signature at the end of the file.
    #[error("no hidden payload found (missing trailer signature)")]
    NoSignature,

    /// Any other host or filesystem error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_tag_is_distinguishable() {
        let err = Error::InvalidTag;
        assert!(matches!(err, Error::InvalidTag));
        assert!(err.to_string().contains("authentication failed"));
    }

    #[test]
    fn test_insufficient_space_is_human_readable() {
        let err = Error::InsufficientSpace { needed: 64 * 1024 * 1024, available: 1024 };
        let msg = err.to_string();
        assert!(msg.contains("MiB"), "unexpected message: {msg}");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Error::from(io);
        assert!(matches!(err, Error::Io(_)));
    }
}
