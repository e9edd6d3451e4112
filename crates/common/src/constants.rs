//! Manifest kinds, requirement types and other fixed vocabulary.

use crate::algorithm::DigestAlgorithm;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of the bag declaration file.
pub const BAGIT_TXT: &str = "bagit.txt";

/// Name of the fetch file.
pub const FETCH_TXT: &str = "fetch.txt";

/// Top-level payload directory.
pub const DATA_DIR: &str = "data";

/// BagIt version written when a profile does not restrict versions.
pub const DEFAULT_BAGIT_VERSION: &str = "1.0";

/// Encoding declared in `bagit.txt`.
pub const TAG_FILE_ENCODING: &str = "UTF-8";

/// Tags every `bagit.txt` carries, in the order they are written.
pub const DECLARATION_TAGS: [&str; 2] = ["BagIt-Version", "Tag-File-Character-Encoding"];

/// Valid requirement type names.
pub const REQUIREMENT_TYPES: [&str; 3] = ["required", "optional", "forbidden"];

/// True if the algorithm is among those we can compute, ignoring case.
pub fn is_supported_algorithm(name: &str) -> bool {
    DigestAlgorithm::from_str(name).is_ok()
}

/// True if `name` is a valid requirement type, ignoring case.
pub fn is_valid_requirement_type(name: &str) -> bool {
    let lower = name.to_lowercase();
    REQUIREMENT_TYPES.contains(&lower.as_str())
}

/// Payload manifest or tag manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestKind {
    Payload,
    Tag,
}

impl ManifestKind {
    /// File name prefix (`manifest` or `tagmanifest`).
    pub fn file_prefix(&self) -> &'static str {
        match self {
            ManifestKind::Payload => "manifest",
            ManifestKind::Tag => "tagmanifest",
        }
    }

    /// File name for this kind and algorithm.
    pub fn file_name(&self, algorithm: DigestAlgorithm) -> String {
        format!("{}-{}.txt", self.file_prefix(), algorithm)
    }
}

impl fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestKind::Payload => write!(f, "payload"),
            ManifestKind::Tag => write!(f, "tag"),
        }
    }
}

impl FromStr for ManifestKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "payload" => Ok(ManifestKind::Payload),
            "tag" => Ok(ManifestKind::Tag),
            _ => Err(crate::Error::InvalidManifestKind(s.to_string())),
        }
    }
}

/// Policy attached to a manifest kind, tag or serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequirementType {
    Required,
    #[default]
    Optional,
    Forbidden,
}

impl fmt::Display for RequirementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequirementType::Required => write!(f, "required"),
            RequirementType::Optional => write!(f, "optional"),
            RequirementType::Forbidden => write!(f, "forbidden"),
        }
    }
}

impl FromStr for RequirementType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "required" => Ok(RequirementType::Required),
            "optional" => Ok(RequirementType::Optional),
            "forbidden" => Ok(RequirementType::Forbidden),
            _ => Err(crate::Error::InvalidRequirement(s.to_string())),
        }
    }
}

/// How a bag is laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SerializationFormat {
    #[serde(rename = "directory")]
    Directory,
    #[serde(rename = "tar")]
    Tar,
    #[serde(rename = "tar.gz")]
    TarGz,
}

impl SerializationFormat {
    /// Guess the format from a path's file name.
    pub fn from_path(path: &std::path::Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            SerializationFormat::TarGz
        } else if name.ends_with(".tar") {
            SerializationFormat::Tar
        } else {
            SerializationFormat::Directory
        }
    }

    /// True for tar and tar.gz.
    pub fn is_serialized(&self) -> bool {
        !matches!(self, SerializationFormat::Directory)
    }
}

impl fmt::Display for SerializationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializationFormat::Directory => write!(f, "directory"),
            SerializationFormat::Tar => write!(f, "tar"),
            SerializationFormat::TarGz => write!(f, "tar.gz"),
        }
    }
}

impl FromStr for SerializationFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "directory" | "dir" => Ok(SerializationFormat::Directory),
            "tar" | "application/tar" | "application/x-tar" => Ok(SerializationFormat::Tar),
            "tar.gz" | "tgz" | "application/gzip" => Ok(SerializationFormat::TarGz),
            _ => Err(crate::Error::UnsupportedFormat(s.to_string())),
        }
    }
}
