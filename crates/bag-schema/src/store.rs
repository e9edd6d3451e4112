//! Profile persistence.
//!
//! Callers that orchestrate validation receive a [`ProfileRepository`]
//! explicitly. A stored record holds the profile JSON; it is parsed with
//! [`ProfileRecord::parse`] before the resulting [`Profile`] is shared.

use crate::profile::Profile;
use bagsmith_common::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Identifier of a stored profile.
pub type ProfileId = String;

/// A stored profile description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    pub id: ProfileId,
    pub name: String,
    pub description: String,
    pub json: String,
}

impl ProfileRecord {
    /// Parse the stored JSON into a profile.
    pub fn parse(&self) -> Result<Profile> {
        Profile::load(self.json.as_bytes())
    }
}

/// Load and save profiles.
pub trait ProfileRepository: Send + Sync {
    fn load_profile(&self, id: &str) -> Result<Profile>;

    /// Store a profile under a fresh id.
    fn save_profile(&self, profile: &Profile) -> Result<ProfileId>;

    fn list_profiles(&self) -> Result<Vec<ProfileRecord>>;
}

fn new_record(profile: &Profile) -> Result<ProfileRecord> {
    Ok(ProfileRecord {
        id: uuid::Uuid::new_v4().to_string(),
        name: profile.name.clone(),
        description: profile.description.clone(),
        json: profile.to_json_pretty()?,
    })
}

/// Profiles kept in memory; useful for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    records: Mutex<BTreeMap<ProfileId, ProfileRecord>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileRepository for InMemoryProfileStore {
    fn load_profile(&self, id: &str) -> Result<Profile> {
        let records = self
            .records
            .lock()
            .map_err(|_| Error::Other("profile store lock poisoned".to_string()))?;
        let record = records
            .get(id)
            .ok_or_else(|| Error::ProfileNotFound(id.to_string()))?;
        record.parse()
    }

    fn save_profile(&self, profile: &Profile) -> Result<ProfileId> {
        let record = new_record(profile)?;
        let id = record.id.clone();
        self.records
            .lock()
            .map_err(|_| Error::Other("profile store lock poisoned".to_string()))?
            .insert(id.clone(), record);
        Ok(id)
    }

    fn list_profiles(&self) -> Result<Vec<ProfileRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| Error::Other("profile store lock poisoned".to_string()))?;
        Ok(records.values().cloned().collect())
    }
}

/// Profiles stored as `<id>.json` files in one directory.
#[derive(Debug, Clone)]
pub struct DirProfileStore {
    root: PathBuf,
}

impl DirProfileStore {
    /// Open a store, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| Error::io_at(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(Error::ProfileNotFound(id.to_string()));
        }
        Ok(self.root.join(format!("{id}.json")))
    }
}

impl ProfileRepository for DirProfileStore {
    fn load_profile(&self, id: &str) -> Result<Profile> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Err(Error::ProfileNotFound(id.to_string()));
        }
        let bytes = std::fs::read(&path).map_err(|e| Error::io_at(&path, e))?;
        debug!("Loaded profile {} from {:?}", id, path);
        Profile::load(&bytes)
    }

    fn save_profile(&self, profile: &Profile) -> Result<ProfileId> {
        let record = new_record(profile)?;
        let path = self.path_for(&record.id)?;
        std::fs::write(&path, &record.json).map_err(|e| Error::io_at(&path, e))?;
        debug!("Saved profile {:?} as {}", profile.name, record.id);
        Ok(record.id)
    }

    fn list_profiles(&self) -> Result<Vec<ProfileRecord>> {
        let mut records = Vec::new();
        let entries = std::fs::read_dir(&self.root).map_err(|e| Error::io_at(&self.root, e))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let json = std::fs::read_to_string(&path).map_err(|e| Error::io_at(&path, e))?;
            let profile = Profile::load(json.as_bytes())?;
            records.push(ProfileRecord {
                id: id.to_string(),
                name: profile.name,
                description: profile.description,
                json,
            });
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }
}
