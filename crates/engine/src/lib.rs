//! Bag validation and construction engine.
//!
//! [`validator`] checks a [`Bag`] against a profile, [`builder`] produces
//! bags that satisfy one, and [`package`] handles serialized bags.

pub mod bag;
pub mod builder;
pub mod checksum;
pub mod package;
pub mod pool;
pub mod validator;
pub mod walk;

pub use bag::{Bag, ManifestFile};
pub use builder::{build, BuildOptions, Builder, BuiltBag, PayloadFile, SourceFile, TagValues};
pub use checksum::{ChecksumEngine, FileDigests, VerifyResult};
pub use package::{serialize, unpack, Unpacked};
pub use pool::{default_workers, CancelToken, PoolOutcome, WorkerPool};
pub use validator::{validate, validate_path, ValidationOptions, Validator};
