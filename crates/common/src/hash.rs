//! Hashing utilities for fixity verification.

use crate::algorithm::DigestAlgorithm;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::io::Read;

/// Bytes read per chunk when streaming a file through hashers.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// A running digest for one algorithm.
#[derive(Clone)]
enum Hasher {
    Md4(md4::Md4),
    Md5(md5::Md5),
    Sha1(sha1::Sha1),
    Sha224(Sha224),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl Hasher {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md4 => Hasher::Md4(md4::Md4::new()),
            DigestAlgorithm::Md5 => Hasher::Md5(md5::Md5::new()),
            DigestAlgorithm::Sha1 => Hasher::Sha1(sha1::Sha1::new()),
            DigestAlgorithm::Sha224 => Hasher::Sha224(Sha224::new()),
            DigestAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            DigestAlgorithm::Sha384 => Hasher::Sha384(Sha384::new()),
            DigestAlgorithm::Sha512 => Hasher::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md4(h) => h.update(data),
            Hasher::Md5(h) => h.update(data),
            Hasher::Sha1(h) => h.update(data),
            Hasher::Sha224(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha384(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Hasher::Md4(h) => hex::encode(h.finalize()),
            Hasher::Md5(h) => hex::encode(h.finalize()),
            Hasher::Sha1(h) => hex::encode(h.finalize()),
            Hasher::Sha224(h) => hex::encode(h.finalize()),
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Sha384(h) => hex::encode(h.finalize()),
            Hasher::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

/// Computes several digests over a single pass of the input.
#[derive(Clone)]
pub struct MultiHasher {
    hashers: Vec<(DigestAlgorithm, Hasher)>,
}

impl MultiHasher {
    /// Create a hasher for each distinct algorithm, in the order given.
    pub fn new(algorithms: &[DigestAlgorithm]) -> Self {
        let mut hashers: Vec<(DigestAlgorithm, Hasher)> = Vec::with_capacity(algorithms.len());
        for &alg in algorithms {
            if !hashers.iter().any(|(a, _)| *a == alg) {
                hashers.push((alg, Hasher::new(alg)));
            }
        }
        Self { hashers }
    }

    pub fn update(&mut self, data: &[u8]) {
        for (_, hasher) in &mut self.hashers {
            hasher.update(data);
        }
    }

    /// Finish every digest, returning lowercase hex strings.
    pub fn finalize(self) -> Vec<(DigestAlgorithm, String)> {
        self.hashers
            .into_iter()
            .map(|(alg, h)| (alg, h.finalize_hex()))
            .collect()
    }

    /// Stream a reader through all hashers in `CHUNK_SIZE` chunks.
    pub fn consume<R: Read>(&mut self, mut reader: R) -> std::io::Result<u64> {
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut total = 0u64;
        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.update(&buffer[..n]);
            total += n as u64;
        }
        Ok(total)
    }
}

/// Compute the hex digest of bytes.
pub fn digest_bytes(data: &[u8], algorithm: DigestAlgorithm) -> String {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize_hex()
}

/// Compute the hex digest of a reader without buffering it whole.
pub fn digest_reader<R: Read>(reader: R, algorithm: DigestAlgorithm) -> std::io::Result<String> {
    let mut multi = MultiHasher::new(&[algorithm]);
    multi.consume(reader)?;
    Ok(multi
        .finalize()
        .pop()
        .map(|(_, hex)| hex)
        .unwrap_or_default())
}

/// True if `s` is non-empty and made only of hex digits.
pub fn is_hex_digest(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(
            digest_bytes(b"hello world", DigestAlgorithm::Sha256),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(
            digest_bytes(b"hello world", DigestAlgorithm::Md5),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
        assert_eq!(
            digest_bytes(b"hello world", DigestAlgorithm::Sha1),
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
        assert_eq!(
            digest_bytes(b"", DigestAlgorithm::Md4),
            "31d6cfe0d16ae931b73c59d7e0c089c0"
        );
        assert_eq!(
            digest_bytes(b"", DigestAlgorithm::Sha224),
            "d14a028c2a3a2bc9476102bb288234c415a2b01f828ea62ac5b3e42f"
        );
    }

    #[test]
    fn test_hex_lengths() {
        for alg in DigestAlgorithm::ALL {
            assert_eq!(digest_bytes(b"abc", alg).len(), alg.hex_len(), "{alg}");
        }
    }

    #[test]
    fn test_reader_matches_bytes_across_chunks() {
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let streamed = digest_reader(&data[..], DigestAlgorithm::Sha512).unwrap();
        assert_eq!(streamed, digest_bytes(&data, DigestAlgorithm::Sha512));
    }

    #[test]
    fn test_multi_hasher_single_pass() {
        let mut multi = MultiHasher::new(&[
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Md5,
            DigestAlgorithm::Sha256,
        ]);
        let read = multi.consume(&b"hello world"[..]).unwrap();
        assert_eq!(read, 11);
        let digests = multi.finalize();
        assert_eq!(digests.len(), 2);
        assert_eq!(digests[0].0, DigestAlgorithm::Sha256);
        assert_eq!(digests[1].1, "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_is_hex_digest() {
        assert!(is_hex_digest("deadBEEF0123"));
        assert!(!is_hex_digest(""));
        assert!(!is_hex_digest("xyz"));
    }
}
