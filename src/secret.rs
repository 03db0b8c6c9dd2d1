//! Password handling.
//!
//! Passwords never appear in `Debug` output and are zeroed on drop. The
//! core encodes them as UTF-8 bytes exactly as given: trimming and
//! normalization are the shell's business, not ours.

use secrecy::{ExposeSecret, SecretString};

/// A user password, held behind [`secrecy`] so it is redacted in logs and
/// wiped from memory when dropped.
pub struct Password {
    inner: SecretString,
}

impl Password {
    /// Wraps a borrowed password string.
    #[must_use]
    pub fn new(password: &str) -> Self {
        Self { inner: SecretString::from(password.to_owned()) }
    }

    /// Wraps an owned password string.
    #[must_use]
    pub fn from_string(password: String) -> Self {
        Self { inner: SecretString::from(password) }
    }

    /// The password as UTF-8 bytes, untrimmed and unnormalized.
    #[must_use]
    pub fn expose_bytes(&self) -> &[u8] {
        self.inner.expose_secret().as_bytes()
    }
}

impl From<&str> for Password {
    fn from(password: &str) -> Self {
        Self::new(password)
    }
}

impl From<String> for Password {
    fn from(password: String) -> Self {
        Self::from_string(password)
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}
