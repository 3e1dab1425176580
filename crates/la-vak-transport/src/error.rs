use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("decryption failed — possible tampering")]
    AuthFailure,

    #[error("SHA-256 mismatch — file corrupted")]
    HashMismatch,

    #[error("rejected by peer")]
    RejectedByPeer,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error(transparent)]
    Crypto(#[from] la_vak_crypto::CryptoError),
}
