/// La-Vak Crypto: RSA/AES hybrid primitives.
///
/// Six operations:
///
/// - `get_key_pair` — lazily generated, process-lifetime RSA-4096 identity.
/// - `wrap_session_key` / `unwrap_session_key` — RSA-OAEP/SHA-256 key transport.
/// - `generate_session` — fresh (key, base IV) for one transfer connection.
/// - `seal_chunk` / `open_chunk` — AES-256-GCM per-chunk AEAD.
/// - `hash_file` — streaming SHA-256 file digest.
///
/// No persistent identity key: `get_key_pair` is a process-lifetime
/// singleton, not a file on disk. Tests that need isolation between key
/// pairs must run in a fresh process.
pub mod aead;
pub mod hash;
pub mod keys;

pub use aead::{chunk_iv, generate_session, open_chunk, seal_chunk, CHUNK_SIZE};
pub use hash::hash_file;
pub use keys::{get_key_pair, unwrap_session_key, wrap_session_key};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key material must be exactly {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("failed to parse key: {0}")]
    KeyParse(String),

    #[error("failed to wrap session key: {0}")]
    Wrap(String),

    #[error("failed to unwrap session key: {0}")]
    Unwrap(String),

    #[error("failed to seal chunk: {0}")]
    Seal(String),

    #[error("decryption failed — possible tampering")]
    AuthFailure,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
