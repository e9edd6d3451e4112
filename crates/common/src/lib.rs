//! Common utilities and types shared across bagsmith crates.

pub mod algorithm;
pub mod constants;
pub mod error;
pub mod hash;
pub mod timestamp;

pub use algorithm::DigestAlgorithm;
pub use constants::{
    is_supported_algorithm, is_valid_requirement_type, ManifestKind, RequirementType,
    SerializationFormat,
};
pub use error::{Error, ParseError, ProfileError, ProfileErrors, Result};
pub use timestamp::Timestamp;
