use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::CryptoError;

/// Sender reads the source file in 64 KiB blocks.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Fresh symmetric key material for one transfer connection: a 32-byte
/// AES-256 key and a 12-byte base IV, both from a CSPRNG.
pub fn generate_session() -> ([u8; 32], [u8; 12]) {
    let mut key = [0u8; 32];
    let mut iv = [0u8; 12];
    OsRng.fill_bytes(&mut key);
    OsRng.fill_bytes(&mut iv);
    (key, iv)
}

/// Derive the IV for chunk `index`: copy `base_iv` and overwrite its last 4
/// bytes with `index` encoded big-endian. The first 8 bytes stay random
/// (uniqueness across sessions); the strictly-increasing index supplies
/// uniqueness within a session, so GCM nonces never repeat under one key
/// even if two sessions' base IVs happened to collide.
pub fn chunk_iv(base_iv: &[u8; 12], index: u32) -> [u8; 12] {
    let mut iv = *base_iv;
    iv[8..12].copy_from_slice(&index.to_be_bytes());
    iv
}

/// Seal `plaintext` with AES-256-GCM under `(key, iv)`. Returns
/// `(ciphertext, auth_tag)` with the 16-byte tag split out, as the
/// `data` message's header carries it separately from the payload.
pub fn seal_chunk(
    key: &[u8; 32],
    iv: &[u8; 12],
    plaintext: &[u8],
) -> Result<(Vec<u8>, [u8; 16]), CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(iv);
    let mut sealed = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Seal(e.to_string()))?;
    let tag_start = sealed.len() - 16;
    let tag_bytes = sealed.split_off(tag_start);
    let mut tag = [0u8; 16];
    tag.copy_from_slice(&tag_bytes);
    Ok((sealed, tag))
}

/// Inverse of `seal_chunk`. Fails with `AuthFailure` on any tampering of
/// `key`, `iv`, `ciphertext`, or `tag`.
pub fn open_chunk(
    key: &[u8; 32],
    iv: &[u8; 12],
    ciphertext: &[u8],
    tag: &[u8; 16],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(iv);
    let mut combined = Vec::with_capacity(ciphertext.len() + 16);
    combined.extend_from_slice(ciphertext);
    combined.extend_from_slice(tag);
    cipher
        .decrypt(nonce, combined.as_ref())
        .map_err(|_| CryptoError::AuthFailure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let (key, iv) = generate_session();
        let plaintext = b"La-Vak E2E Test".to_vec();
        let (ciphertext, tag) = seal_chunk(&key, &iv, &plaintext).unwrap();
        let opened = open_chunk(&key, &iv, &ciphertext, &tag).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn seal_open_round_trip_empty_and_large() {
        let (key, iv) = generate_session();
        for size in [0usize, 1, CHUNK_SIZE] {
            let plaintext = vec![0x42u8; size];
            let (ciphertext, tag) = seal_chunk(&key, &iv, &plaintext).unwrap();
            let opened = open_chunk(&key, &iv, &ciphertext, &tag).unwrap();
            assert_eq!(opened, plaintext);
        }
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let (key, iv) = generate_session();
        let (mut ciphertext, tag) = seal_chunk(&key, &iv, b"hello").unwrap();
        ciphertext[0] ^= 0x01;
        assert!(open_chunk(&key, &iv, &ciphertext, &tag).is_err());
    }

    #[test]
    fn tampered_tag_fails() {
        let (key, iv) = generate_session();
        let (ciphertext, mut tag) = seal_chunk(&key, &iv, b"hello").unwrap();
        tag[0] ^= 0x01;
        assert!(open_chunk(&key, &iv, &ciphertext, &tag).is_err());
    }

    #[test]
    fn tampered_iv_fails() {
        let (key, iv) = generate_session();
        let (ciphertext, tag) = seal_chunk(&key, &iv, b"hello").unwrap();
        let wrong_iv = chunk_iv(&iv, 1);
        assert!(open_chunk(&key, &wrong_iv, &ciphertext, &tag).is_err());
    }

    #[test]
    fn tampered_key_fails() {
        let (key, iv) = generate_session();
        let (ciphertext, tag) = seal_chunk(&key, &iv, b"hello").unwrap();
        let (other_key, _) = generate_session();
        assert!(open_chunk(&other_key, &iv, &ciphertext, &tag).is_err());
    }

    #[test]
    fn chunk_iv_strictly_increases_and_is_unique() {
        let base = [7u8; 12];
        let iv0 = chunk_iv(&base, 0);
        let iv1 = chunk_iv(&base, 1);
        let iv_max = chunk_iv(&base, u32::MAX);
        assert_ne!(iv0, iv1);
        assert_ne!(iv1, iv_max);
        assert_eq!(&iv0[0..8], &base[0..8]);
        assert_eq!(&iv0[8..12], &0u32.to_be_bytes());
        assert_eq!(&iv_max[8..12], &u32::MAX.to_be_bytes());
    }
}
