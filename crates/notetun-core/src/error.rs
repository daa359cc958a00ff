//! Shared error types for the notetun core crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("ciphertext too short to contain a nonce")]
    TooShort,

    #[error("AES-GCM encryption failed")]
    EncryptFailed,

    #[error("AES-GCM decryption failed (bad key or corrupted/tampered data)")]
    DecryptFailed,
}

#[derive(Debug, Error)]
pub enum TitleError {
    #[error("title does not match the expected grammar: {0:?}")]
    Malformed(String),

    #[error("request_id must be exactly 16 characters, got {0}")]
    BadRequestIdLength(usize),

    #[error("unknown unit type {0:?}")]
    UnknownUnitType(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    ParseFailed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {path}: {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] serde_json::Error),
}
