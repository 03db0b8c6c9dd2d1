//! Operation configuration and container-format constants.
//!
//! The constants below are the single source of truth for the on-disk
//! container formats: salt, nonce, and tag sizes, framing widths, and the
//! metadata length limits. The [`Config`] record collects every option the
//! shell may tune; the core consumes an immutable snapshot per call and
//! validates it up front instead of sprinkling checks through the pipeline.
//!
//! All multi-byte integers in both container formats are big-endian, on
//! every platform.

use crate::error::{Error, Result};

/// Length of the per-container Argon2id salt in bytes.
///
/// The salt is the first 16 bytes of both container formats. A fresh salt
/// per encryption yields a fresh key, which in turn makes nonce reuse
/// across containers impossible.
pub const SALT_LEN: usize = 16;

/// Length of the AES-GCM nonce in bytes (96 bits, per NIST SP 800-38D).
pub const NONCE_LEN: usize = 12;

/// Length of the AES-GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Width of the per-chunk meaningful-length prefix in the streaming format.
pub const LEN_PREFIX_LEN: usize = 4;

/// On-disk overhead of one streaming chunk: nonce, length prefix, tag.
pub const CHUNK_OVERHEAD: usize = NONCE_LEN + LEN_PREFIX_LEN + TAG_LEN;

/// Maximum encoded file-name length (2-byte prefix).
pub const NAME_LEN_MAX: usize = 65_535;

/// Maximum encoded extension length (1-byte prefix).
pub const EXT_LEN_MAX: usize = 255;

/// Derived-key lengths accepted by the AEAD layer, in bytes.
///
/// 16/24/32 select AES-128/192/256-GCM respectively.
pub const KEY_LENGTHS: &[usize] = &[16, 24, 32];

/// Bounded attempts when resolving a random output name collision.
pub const NAME_ATTEMPTS: usize = 64;

/// I/O buffer size for streaming reads, digests, and shredder passes.
pub const IO_CHUNK: usize = 64 * 1024;

/// Random output-name length bounds in the vault or target directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilenameParams {
    /// Inclusive minimum name length.
    pub min_len: usize,
    /// Inclusive maximum name length.
    pub max_len: usize,
}

impl Default for FilenameParams {
    fn default() -> Self {
        Self { min_len: 16, max_len: 32 }
    }
}

/// Streaming-container tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamingParams {
    /// Plaintext bytes per chunk, not counting framing. Every chunk on the
    /// wire carries exactly this many plaintext bytes; short tails are
    /// padded with random bytes.
    pub chunk_size: u32,
}

impl Default for StreamingParams {
    fn default() -> Self {
        Self { chunk_size: 64 * 1024 }
    }
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Derived key length in bytes; must be one of [`KEY_LENGTHS`].
    pub length: usize,
    /// Time cost (number of passes).
    pub iterations: u32,
    /// Memory cost in KiB.
    pub memory_cost: u32,
    /// Parallelism lanes.
    pub lanes: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self { length: 32, iterations: 3, memory_cost: 64 * 1024, lanes: 1 }
    }
}

/// Options shared across operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralParams {
    /// Associated data bound into every authentication tag. `None` and the
    /// empty string are equivalent: empty AAD bytes.
    pub aad: Option<String>,
    /// Extension applied to ciphertext outputs.
    pub extension: String,
    /// Suffix applied to steganographic outputs.
    pub stego_suffix: String,
}

impl Default for GeneralParams {
    fn default() -> Self {
        Self { aad: None, extension: ".enc".to_owned(), stego_suffix: "_stego".to_owned() }
    }
}

/// Immutable configuration snapshot consumed by every core operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Random output-name bounds.
    pub filename_params: FilenameParams,
    /// Streaming-container tuning.
    pub streaming_params: StreamingParams,
    /// Argon2id costs.
    pub kdf_params: KdfParams,
    /// Shared options.
    pub general_params: GeneralParams,
}

impl Config {
    /// Checks every structural invariant of the configuration.
    ///
    /// Operations call this before touching the filesystem so a bad
    /// snapshot fails fast with [`Error::InvalidConfig`] instead of
    /// half-way through a write.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] naming the violated bound.
    pub fn validate(&self) -> Result<()> {
        let f = &self.filename_params;
        if f.min_len < 1 || f.min_len > f.max_len || f.max_len > 255 {
            return Err(Error::InvalidConfig(format!(
                "filename length bounds must satisfy 1 <= min <= max <= 255, got {}..={}",
                f.min_len, f.max_len
            )));
        }

        // The smallest legal chunk still fits the two length prefixes of an
        // empty name and extension plus one payload byte.
        if self.streaming_params.chunk_size < 4 {
            return Err(Error::InvalidConfig(format!(
                "chunk size must be at least 4 bytes, got {}",
                self.streaming_params.chunk_size
            )));
        }

        let k = &self.kdf_params;
        if !KEY_LENGTHS.contains(&k.length) {
            return Err(Error::InvalidConfig(format!(
                "derived key length must be one of {KEY_LENGTHS:?} bytes, got {}",
                k.length
            )));
        }
        if k.iterations < 1 {
            return Err(Error::InvalidConfig("KDF iterations must be at least 1".to_owned()));
        }
        if k.lanes < 1 {
            return Err(Error::InvalidConfig("KDF lanes must be at least 1".to_owned()));
        }
        if k.memory_cost < 8 * k.lanes {
            return Err(Error::InvalidConfig(format!(
                "KDF memory cost must be at least 8 KiB per lane, got {} KiB for {} lanes",
                k.memory_cost, k.lanes
            )));
        }

        if self.general_params.extension.is_empty() {
            return Err(Error::InvalidConfig("output extension must not be empty".to_owned()));
        }

        Ok(())
    }

    /// The associated-data bytes for AEAD calls.
    ///
    /// An absent or empty AAD string both encode as the empty byte string.
    #[must_use]
    pub fn aad_bytes(&self) -> &[u8] {
        self.general_params.aad.as_deref().unwrap_or("").as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.filename_params.min_len, 16);
        assert_eq!(config.filename_params.max_len, 32);
        assert_eq!(config.streaming_params.chunk_size, 65_536);
        assert_eq!(config.kdf_params.length, 32);
        assert_eq!(config.general_params.extension, ".enc");
        assert_eq!(config.general_params.stego_suffix, "_stego");
    }

    #[test]
    fn test_rejects_inverted_name_bounds() {
        let mut config = Config::default();
        config.filename_params.min_len = 33;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_tiny_chunk() {
        let mut config = Config::default();
        config.streaming_params.chunk_size = 3;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_unsupported_key_length() {
        let mut config = Config::default();
        config.kdf_params.length = 20;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_empty_extension() {
        let mut config = Config::default();
        config.general_params.extension = String::new();
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_aad_absent_and_empty_are_equivalent() {
        let mut config = Config::default();
        assert_eq!(config.aad_bytes(), b"");
        config.general_params.aad = Some(String::new());
        assert_eq!(config.aad_bytes(), b"");
        config.general_params.aad = Some("ctx".to_owned());
        assert_eq!(config.aad_bytes(), b"ctx");
    }
}
