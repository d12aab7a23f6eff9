use crate::config::HashAlgorithm;
use std::hash::Hasher as _;
use std::io::{self, Read};
use twox_hash::XxHash64;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Stream `reader` to the end and return the content digest as lowercase hex.
///
/// XxHash64 gives 16 hex digits, BLAKE3 gives 64. Digests from different
/// algorithms never compare equal.
pub fn hash_reader<R: Read>(mut reader: R, algorithm: HashAlgorithm) -> io::Result<String> {
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    match algorithm {
        HashAlgorithm::Xxhash64 => {
            let mut hasher = XxHash64::with_seed(0);
            loop {
                let read = reader.read(&mut buffer)?;
                if read == 0 {
                    break;
                }
                hasher.write(&buffer[..read]);
            }
            Ok(format!("{:016x}", hasher.finish()))
        }
        HashAlgorithm::Blake3 => {
            let mut hasher = blake3::Hasher::new();
            loop {
                let read = reader.read(&mut buffer)?;
                if read == 0 {
                    break;
                }
                hasher.update(&buffer[..read]);
            }
            Ok(hasher.finalize().to_hex().to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One-shot digest to compare the streaming path against.
    fn hash_data(data: &[u8], algorithm: HashAlgorithm) -> String {
        match algorithm {
            HashAlgorithm::Xxhash64 => {
                let mut hasher = XxHash64::with_seed(0);
                hasher.write(data);
                format!("{:016x}", hasher.finish())
            }
            HashAlgorithm::Blake3 => blake3::hash(data).to_hex().to_string(),
        }
    }

    #[test]
    fn test_streamed_digest_matches_one_shot() {
        let data = vec![0x5Au8; READ_BUFFER_SIZE * 2 + 17];
        for algorithm in [HashAlgorithm::Xxhash64, HashAlgorithm::Blake3] {
            let streamed = hash_reader(&data[..], algorithm).unwrap();
            assert_eq!(streamed, hash_data(&data, algorithm));
        }
    }

    #[test]
    fn test_digest_lengths() {
        assert_eq!(hash_data(b"abc", HashAlgorithm::Xxhash64).len(), 16);
        assert_eq!(hash_data(b"abc", HashAlgorithm::Blake3).len(), 64);
    }

    #[test]
    fn test_different_content_different_digest() {
        assert_ne!(
            hash_data(b"shared content xyz", HashAlgorithm::Xxhash64),
            hash_data(b"shared content xyZ", HashAlgorithm::Xxhash64)
        );
    }
}
