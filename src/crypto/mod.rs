//! Cryptographic primitives: Argon2id key derivation and the AES-GCM
//! wrapper shared by both container formats.

pub mod cipher;
pub mod derive;

pub use cipher::Cipher;
pub use derive::{derive_key, generate_salt, random_bytes};
