//! Fixity computation and verification for files on disk.

use bagsmith_common::hash::{self, MultiHasher};
use bagsmith_common::{DigestAlgorithm, Error, Result};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::{debug, warn};

/// Outcome of checking one file against one recorded digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Match,
    Mismatch { actual: String },
    MissingFile,
    Unreadable { cause: String },
}

impl VerifyResult {
    pub fn is_match(&self) -> bool {
        matches!(self, VerifyResult::Match)
    }
}

/// Digests of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigests {
    pub size: u64,
    pub digests: Vec<(DigestAlgorithm, String)>,
}

impl FileDigests {
    pub fn get(&self, algorithm: DigestAlgorithm) -> Option<&str> {
        self.digests
            .iter()
            .find(|(a, _)| *a == algorithm)
            .map(|(_, d)| d.as_str())
    }
}

/// True for failures of the device or filesystem itself, as opposed to
/// problems with one file.
pub fn is_fatal_io(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        // EIO, ENXIO, ENODEV
        matches!(err.raw_os_error(), Some(5) | Some(6) | Some(19))
    }
    #[cfg(not(unix))]
    {
        let _ = err;
        false
    }
}

/// Stateless digest computation and verification.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksumEngine;

impl ChecksumEngine {
    /// Digest a stream in bounded chunks.
    pub fn digest<R: Read>(reader: R, algorithm: DigestAlgorithm) -> io::Result<String> {
        hash::digest_reader(reader, algorithm)
    }

    /// Digest a file with several algorithms in one read.
    pub fn digest_file(path: &Path, algorithms: &[DigestAlgorithm]) -> Result<FileDigests> {
        let file = File::open(path).map_err(|e| Error::io_at(path, e))?;
        let mut hasher = MultiHasher::new(algorithms);
        let size = hasher.consume(file).map_err(|e| Error::io_at(path, e))?;
        Ok(FileDigests {
            size,
            digests: hasher.finalize(),
        })
    }

    /// Check one file against one expected digest.
    pub fn verify(path: &Path, expected: &str, algorithm: DigestAlgorithm) -> Result<VerifyResult> {
        let mut results = Self::verify_many(path, &[(algorithm, expected.to_string())])?;
        Ok(results
            .pop()
            .map(|(_, r)| r)
            .unwrap_or(VerifyResult::MissingFile))
    }

    /// Check one file against several expected digests, reading it once.
    ///
    /// Per-file problems become `MissingFile` or `Unreadable`; only device
    /// failures are returned as errors.
    pub fn verify_many(
        path: &Path,
        expected: &[(DigestAlgorithm, String)],
    ) -> Result<Vec<(DigestAlgorithm, VerifyResult)>> {
        let all = |result: VerifyResult| -> Vec<(DigestAlgorithm, VerifyResult)> {
            expected.iter().map(|(a, _)| (*a, result.clone())).collect()
        };

        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Missing file {:?}", path);
                return Ok(all(VerifyResult::MissingFile));
            }
            Err(e) if is_fatal_io(&e) => return Err(Error::io_at(path, e)),
            Err(e) => {
                warn!("Cannot open {:?}: {}", path, e);
                return Ok(all(VerifyResult::Unreadable {
                    cause: e.to_string(),
                }));
            }
        };

        if file.metadata().map(|m| m.is_dir()).unwrap_or(false) {
            return Ok(all(VerifyResult::Unreadable {
                cause: "is a directory".to_string(),
            }));
        }

        let algorithms: Vec<DigestAlgorithm> = expected.iter().map(|(a, _)| *a).collect();
        let mut hasher = MultiHasher::new(&algorithms);
        if let Err(e) = hasher.consume(file) {
            if is_fatal_io(&e) {
                return Err(Error::io_at(path, e));
            }
            warn!("Cannot read {:?}: {}", path, e);
            return Ok(all(VerifyResult::Unreadable {
                cause: e.to_string(),
            }));
        }
        let actual = hasher.finalize();

        Ok(expected
            .iter()
            .map(|(alg, want)| {
                let got = actual
                    .iter()
                    .find(|(a, _)| a == alg)
                    .map(|(_, d)| d.as_str())
                    .unwrap_or_default();
                let result = if got.eq_ignore_ascii_case(want) {
                    VerifyResult::Match
                } else {
                    VerifyResult::Mismatch {
                        actual: got.to_string(),
                    }
                };
                (*alg, result)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
    const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

    #[test]
    fn test_digest_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, "hello world").unwrap();

        let first = ChecksumEngine::digest(File::open(&path).unwrap(), DigestAlgorithm::Sha256).unwrap();
        let second = ChecksumEngine::digest(File::open(&path).unwrap(), DigestAlgorithm::Sha256).unwrap();
        assert_eq!(first, HELLO_SHA256);
        assert_eq!(first, second);
    }

    #[test]
    fn test_digest_file_multiple_algorithms() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, "hello world").unwrap();

        let digests = ChecksumEngine::digest_file(
            &path,
            &[DigestAlgorithm::Sha256, DigestAlgorithm::Md5],
        )
        .unwrap();
        assert_eq!(digests.size, 11);
        assert_eq!(digests.get(DigestAlgorithm::Md5), Some(HELLO_MD5));
        assert_eq!(digests.get(DigestAlgorithm::Sha256), Some(HELLO_SHA256));
    }

    #[test]
    fn test_verify_outcomes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        let mut f = File::create(&path).unwrap();
        f.write_all(b"hello world").unwrap();
        drop(f);

        assert_eq!(
            ChecksumEngine::verify(&path, HELLO_SHA256, DigestAlgorithm::Sha256).unwrap(),
            VerifyResult::Match
        );
        assert_eq!(
            ChecksumEngine::verify(&path, &HELLO_SHA256.to_uppercase(), DigestAlgorithm::Sha256)
                .unwrap(),
            VerifyResult::Match
        );
        assert_eq!(
            ChecksumEngine::verify(&path, HELLO_SHA256, DigestAlgorithm::Md5).unwrap(),
            VerifyResult::Mismatch {
                actual: HELLO_MD5.to_string()
            }
        );
        assert_eq!(
            ChecksumEngine::verify(&dir.path().join("nope"), HELLO_MD5, DigestAlgorithm::Md5)
                .unwrap(),
            VerifyResult::MissingFile
        );
        assert!(matches!(
            ChecksumEngine::verify(dir.path(), HELLO_MD5, DigestAlgorithm::Md5).unwrap(),
            VerifyResult::Unreadable { .. }
        ));
    }

    #[test]
    fn test_verify_many_reads_once_per_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, "hello world").unwrap();

        let results = ChecksumEngine::verify_many(
            &path,
            &[
                (DigestAlgorithm::Sha256, HELLO_SHA256.to_string()),
                (DigestAlgorithm::Md5, "00".repeat(16)),
            ],
        )
        .unwrap();
        assert!(results[0].1.is_match());
        assert!(matches!(results[1].1, VerifyResult::Mismatch { .. }));
    }
}
