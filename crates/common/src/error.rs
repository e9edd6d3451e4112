//! Common error types for bagsmith.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Common error type for bagsmith operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error on {path}: {source}")]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid profile: {0}")]
    Profile(ProfileErrors),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Tag error: {0}")]
    Tag(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid requirement type: {0}")]
    InvalidRequirement(String),

    #[error("Invalid manifest kind: {0}")]
    InvalidManifestKind(String),

    #[error("Unsupported serialization format: {0}")]
    UnsupportedFormat(String),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pack error: {0}")]
    Pack(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Result type alias using common Error.
pub type Result<T> = std::result::Result<T, Error>;

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}

impl From<ProfileErrors> for Error {
    fn from(e: ProfileErrors) -> Self {
        Error::Profile(e)
    }
}

impl Error {
    /// Attach the offending path to an IO error.
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::IoAt {
            path: path.into(),
            source,
        }
    }
}

/// A single problem found in a profile description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileError {
    /// Location inside the profile, e.g. `tagFilesRequired/bag-info.txt/Source-Organization`.
    pub location: String,
    pub message: String,
}

impl ProfileError {
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.location.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.location, self.message)
        }
    }
}

/// Every problem found while loading a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileErrors(pub Vec<ProfileError>);

impl ProfileErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ProfileError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ProfileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", joined.join("; "))
    }
}

/// Malformed manifest, tag file or bag declaration.
///
/// `line` is 1-based; 0 means the problem is with the file as a whole
/// (for example an unrecognised manifest file name).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{file} line {line}: {reason} ({content:?})")]
pub struct ParseError {
    pub file: String,
    pub line: usize,
    pub content: String,
    pub reason: String,
}

impl ParseError {
    pub fn new(
        file: impl Into<String>,
        line: usize,
        content: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            line,
            content: content.into(),
            reason: reason.into(),
        }
    }

    /// A parse error about the whole file rather than one line.
    pub fn whole_file(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(file, 0, String::new(), reason)
    }
}
