use std::sync::OnceLock;

use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::CryptoError;

/// RSA-4096 key size in bits.
const KEY_BITS: usize = 4096;

/// Process-lifetime RSA identity. Generated once, lazily, on first use —
/// the caller is expected to invoke `get_key_pair` during startup so the
/// (slow) generation happens before the connection-accept path is live.
static KEYPAIR: OnceLock<(RsaPrivateKey, RsaPublicKey)> = OnceLock::new();

fn keypair() -> &'static (RsaPrivateKey, RsaPublicKey) {
    KEYPAIR.get_or_init(|| {
        tracing::info!(bits = KEY_BITS, "generating RSA key pair");
        let private = RsaPrivateKey::new(&mut OsRng, KEY_BITS)
            .expect("RSA-4096 key generation failed");
        let public = RsaPublicKey::from(&private);
        (private, public)
    })
}

/// Returns `(public_key_pem, private_key_pem)`. First call generates the
/// pair; every subsequent call within the process returns the same PEMs.
pub fn get_key_pair() -> Result<(String, String), CryptoError> {
    let (private, public) = keypair();
    let public_pem = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| CryptoError::KeyParse(e.to_string()))?;
    let private_pem = rsa::pkcs8::EncodePrivateKey::to_pkcs8_pem(private, LineEnding::LF)
        .map_err(|e| CryptoError::KeyParse(e.to_string()))?
        .to_string();
    Ok((public_pem, private_pem))
}

/// Wrap a 32-byte session key with the peer's RSA-4096 public key using
/// RSA-OAEP/SHA-256. Fails if `key` is not exactly 32 bytes or the PEM
/// does not parse.
pub fn wrap_session_key(peer_public_key_pem: &str, key: &[u8; 32]) -> Result<Vec<u8>, CryptoError> {
    let peer_key = RsaPublicKey::from_public_key_pem(peer_public_key_pem)
        .map_err(|e| CryptoError::KeyParse(e.to_string()))?;
    peer_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), key)
        .map_err(|e| CryptoError::Wrap(e.to_string()))
}

/// Unwrap a session key previously wrapped with our public key, using the
/// process's private key.
pub fn unwrap_session_key(ciphertext: &[u8]) -> Result<[u8; 32], CryptoError> {
    let (private, _public) = keypair();
    let plaintext = private
        .decrypt(Oaep::new::<Sha256>(), ciphertext)
        .map_err(|e| CryptoError::Unwrap(e.to_string()))?;
    plaintext
        .try_into()
        .map_err(|v: Vec<u8>| CryptoError::InvalidKeyLength {
            expected: 32,
            actual: v.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aead::generate_session;

    #[test]
    fn key_pair_is_cached() {
        let (pub1, priv1) = get_key_pair().unwrap();
        let (pub2, priv2) = get_key_pair().unwrap();
        assert_eq!(pub1, pub2);
        assert_eq!(priv1, priv2);
    }

    #[test]
    fn wrap_unwrap_round_trip() {
        let (public_pem, _private_pem) = get_key_pair().unwrap();
        let (key, _iv) = generate_session();
        let wrapped = wrap_session_key(&public_pem, &key).unwrap();
        let unwrapped = unwrap_session_key(&wrapped).unwrap();
        assert_eq!(key, unwrapped);
    }

    #[test]
    fn wrap_rejects_garbage_pem() {
        let (key, _iv) = generate_session();
        let result = wrap_session_key("not a pem", &key);
        assert!(result.is_err());
    }
}
