use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::aead::CHUNK_SIZE;
use crate::CryptoError;

/// Stream a file through SHA-256 in `CHUNK_SIZE` blocks and return the
/// lowercase hex digest. Runs on a blocking-pool thread via
/// `spawn_blocking` — the read+hash loop is CPU-bound once the page cache
/// is warm, and a large file would otherwise stall the runtime's worker
/// threads for the duration of the pass. Memory use is bounded regardless
/// of file size.
pub async fn hash_file(path: &Path) -> Result<String, CryptoError> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || hash_file_blocking(&path))
        .await
        .expect("hashing task panicked")
}

fn hash_file_blocking(path: &Path) -> Result<String, CryptoError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn hashes_match_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::File::create(&path).unwrap();
        let digest = hash_file(&path).await.unwrap();
        // SHA-256 of the empty string.
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
        );
    }

    #[tokio::test]
    async fn hash_is_stable_across_chunk_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multi_chunk.bin");
        let mut f = std::fs::File::create(&path).unwrap();
        let data = vec![0x5Au8; CHUNK_SIZE * 2 + 37];
        f.write_all(&data).unwrap();
        drop(f);

        let digest = hash_file(&path).await.unwrap();
        let mut expected_hasher = Sha256::new();
        expected_hasher.update(&data);
        assert_eq!(digest, hex::encode(expected_hasher.finalize()));
    }
}
