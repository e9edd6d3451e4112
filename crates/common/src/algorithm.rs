//! Digest algorithm definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hash algorithm used for fixity digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Md4,
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    /// All supported algorithms, weakest first.
    pub const ALL: [DigestAlgorithm; 7] = [
        DigestAlgorithm::Md4,
        DigestAlgorithm::Md5,
        DigestAlgorithm::Sha1,
        DigestAlgorithm::Sha224,
        DigestAlgorithm::Sha256,
        DigestAlgorithm::Sha384,
        DigestAlgorithm::Sha512,
    ];

    /// Lowercase name as it appears in manifest file names.
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md4 => "md4",
            DigestAlgorithm::Md5 => "md5",
            DigestAlgorithm::Sha1 => "sha1",
            DigestAlgorithm::Sha224 => "sha224",
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha384 => "sha384",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }

    /// Length of the hex digest this algorithm produces.
    pub fn hex_len(&self) -> usize {
        match self {
            DigestAlgorithm::Md4 | DigestAlgorithm::Md5 => 32,
            DigestAlgorithm::Sha1 => 40,
            DigestAlgorithm::Sha224 => 56,
            DigestAlgorithm::Sha256 => 64,
            DigestAlgorithm::Sha384 => 96,
            DigestAlgorithm::Sha512 => 128,
        }
    }

    /// File name of the payload manifest for this algorithm.
    pub fn payload_manifest_name(&self) -> String {
        format!("manifest-{}.txt", self.name())
    }

    /// File name of the tag manifest for this algorithm.
    pub fn tag_manifest_name(&self) -> String {
        format!("tagmanifest-{}.txt", self.name())
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "md4" => Ok(DigestAlgorithm::Md4),
            "md5" => Ok(DigestAlgorithm::Md5),
            "sha1" => Ok(DigestAlgorithm::Sha1),
            "sha224" => Ok(DigestAlgorithm::Sha224),
            "sha256" => Ok(DigestAlgorithm::Sha256),
            "sha384" => Ok(DigestAlgorithm::Sha384),
            "sha512" => Ok(DigestAlgorithm::Sha512),
            _ => Err(crate::Error::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_algorithm() {
        assert_eq!(
            DigestAlgorithm::from_str("sha256").unwrap(),
            DigestAlgorithm::Sha256
        );
        assert_eq!(
            DigestAlgorithm::from_str("SHA512").unwrap(),
            DigestAlgorithm::Sha512
        );
        assert_eq!(DigestAlgorithm::from_str("Md5").unwrap(), DigestAlgorithm::Md5);
        assert!(DigestAlgorithm::from_str("sha3").is_err());
        assert!(DigestAlgorithm::from_str("").is_err());
    }

    #[test]
    fn test_display_roundtrips() {
        for alg in DigestAlgorithm::ALL {
            assert_eq!(alg.to_string().parse::<DigestAlgorithm>().unwrap(), alg);
        }
    }

    #[test]
    fn test_manifest_names() {
        assert_eq!(
            DigestAlgorithm::Sha256.payload_manifest_name(),
            "manifest-sha256.txt"
        );
        assert_eq!(
            DigestAlgorithm::Md5.tag_manifest_name(),
            "tagmanifest-md5.txt"
        );
    }
}
