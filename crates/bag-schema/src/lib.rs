//! BagIt schema definitions for bagsmith.
//!
//! This crate defines profiles, tags, manifests, tag files and the
//! validation report, plus the profile repository interface.

pub mod manifest;
pub mod profile;
pub mod report;
pub mod schema;
pub mod store;
pub mod tag;
pub mod tagfile;

pub use manifest::{Manifest, ManifestEntry};
pub use profile::{Profile, TagFileRequirements};
pub use report::{Finding, FindingKind, Severity, ValidationReport};
pub use store::{DirProfileStore, InMemoryProfileStore, ProfileId, ProfileRecord, ProfileRepository};
pub use tag::{ParsedTag, Tag, TagRequirement};
pub use tagfile::TagFile;
