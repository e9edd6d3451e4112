//! Building bags that satisfy a profile.

use crate::checksum::{ChecksumEngine, FileDigests};
use crate::pool::{default_workers, CancelToken, WorkerPool};
use crate::walk::{walk, EntryKind};
use bagsmith_common::constants::{
    BAGIT_TXT, DATA_DIR, DECLARATION_TAGS, DEFAULT_BAGIT_VERSION, TAG_FILE_ENCODING,
};
use bagsmith_common::hash::digest_bytes;
use bagsmith_common::{DigestAlgorithm, Error, ManifestKind, ProfileErrors, Result, Timestamp};
use bagsmith_schema::manifest::normalize_path;
use bagsmith_schema::tagfile::label_problem;
use bagsmith_schema::{Manifest, Profile, TagFile, TagFileRequirements, TagRequirement};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Tag values supplied by the caller: tag file path, then label, then value.
pub type TagValues = BTreeMap<String, BTreeMap<String, String>>;

/// A file to copy into the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub source: PathBuf,
    /// Path below `data/`, with forward slashes.
    pub bag_path: String,
}

impl SourceFile {
    pub fn new(source: impl Into<PathBuf>, bag_path: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            bag_path: bag_path.into(),
        }
    }

    /// Every file below `dir`, keeping its path relative to `dir`.
    ///
    /// Links to files are kept; links to directories and dangling links
    /// are skipped.
    pub fn collect_dir(dir: &Path) -> Result<Vec<SourceFile>> {
        let mut files = Vec::new();
        for entry in walk(dir)? {
            match entry.kind {
                EntryKind::Dir => {}
                EntryKind::Symlink if !entry.is_file_like() => {
                    warn!("Skipping link {:?}: it does not point to a file", entry.path);
                }
                _ => files.push(SourceFile::new(entry.path, entry.rel)),
            }
        }
        files.sort_by(|a, b| a.bag_path.cmp(&b.bag_path));
        Ok(files)
    }
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub workers: usize,
    pub cancel: CancelToken,
    /// Value for `Bagging-Software` when the profile declares it.
    pub bagging_software: String,
    /// Date used for `Bagging-Date`. Defaults to now.
    pub now: Option<Timestamp>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            cancel: CancelToken::new(),
            bagging_software: format!("bagsmith {}", env!("CARGO_PKG_VERSION")),
            now: None,
        }
    }
}

/// A payload file with its place in the bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadFile {
    pub source: PathBuf,
    /// Bag-relative path, starting with `data/`.
    pub path: String,
    pub size: u64,
}

/// Everything needed to write a bag, computed up front.
#[derive(Debug, Clone)]
pub struct BuiltBag {
    pub declaration: TagFile,
    pub payload: Vec<PayloadFile>,
    pub tag_files: Vec<TagFile>,
    pub manifests: Vec<Manifest>,
    pub tag_manifests: Vec<Manifest>,
}

impl BuiltBag {
    /// `Payload-Oxum` for this payload.
    pub fn payload_oxum(&self) -> String {
        payload_oxum(&self.payload)
    }

    /// Write the bag into `dir`, which must be missing or empty.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        if dir.exists() {
            let mut entries = fs::read_dir(dir).map_err(|e| Error::io_at(dir, e))?;
            if entries.next().is_some() {
                return Err(Error::Config(format!(
                    "output directory {} is not empty",
                    dir.display()
                )));
            }
        }
        fs::create_dir_all(dir.join(DATA_DIR)).map_err(|e| Error::io_at(dir, e))?;

        for file in &self.payload {
            let target = dir.join(&file.path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::io_at(parent, e))?;
            }
            fs::copy(&file.source, &target).map_err(|e| Error::io_at(&file.source, e))?;
        }

        write_file(dir, BAGIT_TXT, &self.declaration.render())?;
        for tag_file in &self.tag_files {
            write_file(dir, &tag_file.path, &tag_file.render())?;
        }
        for manifest in self.manifests.iter().chain(&self.tag_manifests) {
            write_file(dir, &manifest.file_name(), &manifest.render())?;
        }

        info!(
            "Wrote bag to {:?}: {} payload file(s), {} tag file(s)",
            dir,
            self.payload.len(),
            self.tag_files.len()
        );
        Ok(())
    }
}

fn write_file(dir: &Path, rel: &str, content: &str) -> Result<()> {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io_at(parent, e))?;
    }
    fs::write(&path, content).map_err(|e| Error::io_at(&path, e))
}

fn payload_oxum(payload: &[PayloadFile]) -> String {
    let bytes: u64 = payload.iter().map(|f| f.size).sum();
    format!("{}.{}", bytes, payload.len())
}

/// Human-readable size for `Bag-Size`, e.g. `1.5 MB`.
fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

/// Builds bags for one profile.
pub struct Builder<'a> {
    profile: &'a Profile,
    options: BuildOptions,
}

impl<'a> Builder<'a> {
    pub fn new(profile: &'a Profile, options: BuildOptions) -> Self {
        Self { profile, options }
    }

    /// Digest the payload and assemble tag files and manifests.
    ///
    /// Fails with `Error::Tag` when a tag value cannot satisfy the profile.
    pub fn build(&self, sources: &[SourceFile], tag_values: &TagValues) -> Result<BuiltBag> {
        let errors = self.profile.validate();
        if !errors.is_empty() {
            return Err(Error::Profile(ProfileErrors(errors)));
        }

        let payload_paths = payload_paths(sources)?;
        let algorithms = self.profile.manifest_algorithms.clone();
        let pool = WorkerPool::new(self.options.workers, self.options.cancel.clone());
        info!(
            "Building bag for profile {:?}: {} payload file(s)",
            self.profile.name,
            sources.len()
        );

        let jobs: Vec<&SourceFile> = sources.iter().collect();
        let outcome = pool.run(jobs, |source| {
            ChecksumEngine::digest_file(&source.source, &algorithms)
        })?;
        if outcome.cancelled {
            return Err(Error::Cancelled);
        }
        let digests: Vec<FileDigests> = outcome.results;

        let payload: Vec<PayloadFile> = sources
            .iter()
            .zip(&payload_paths)
            .zip(&digests)
            .map(|((source, path), d)| PayloadFile {
                source: source.source.clone(),
                path: path.clone(),
                size: d.size,
            })
            .collect();

        let mut manifests = Vec::new();
        if !self.profile.forbids_manifest(ManifestKind::Payload) {
            for &algorithm in &algorithms {
                let mut manifest = Manifest::new(ManifestKind::Payload, algorithm);
                for (path, d) in payload_paths.iter().zip(&digests) {
                    let digest = d.get(algorithm).unwrap_or_default();
                    manifest.insert(path, digest).map_err(Error::Other)?;
                }
                manifests.push(manifest);
            }
        }

        let declaration = self.declaration(&payload, tag_values)?;
        let tag_files = self.tag_files(&payload, tag_values)?;
        let tag_manifests = if self.profile.requires_manifest(ManifestKind::Tag) {
            tag_manifests(&algorithms, &declaration, &tag_files, &manifests)?
        } else {
            Vec::new()
        };

        debug!(
            "Built bag: {} manifest(s), {} tag manifest(s), Payload-Oxum {}",
            manifests.len(),
            tag_manifests.len(),
            payload_oxum(&payload)
        );
        Ok(BuiltBag {
            declaration,
            payload,
            tag_files,
            manifests,
            tag_manifests,
        })
    }

    /// Version written to `bagit.txt` unless the caller or profile says otherwise.
    fn bagit_version(&self) -> &str {
        let accepted = &self.profile.accept_bagit_version;
        if accepted.is_empty() || accepted.iter().any(|v| v == DEFAULT_BAGIT_VERSION) {
            DEFAULT_BAGIT_VERSION
        } else {
            accepted[0].as_str()
        }
    }

    /// Render `bagit.txt`, merging any tags the profile declares for it.
    fn declaration(&self, payload: &[PayloadFile], tag_values: &TagValues) -> Result<TagFile> {
        let empty = BTreeMap::new();
        let given = tag_values.get(BAGIT_TXT).unwrap_or(&empty);
        let requirements = self.profile.tag_file(BAGIT_TXT);
        let mut file = TagFile::new(BAGIT_TXT);

        for label in DECLARATION_TAGS {
            let value = match requirements.and_then(|r| r.tag(label)) {
                Some(req) => self.resolve(BAGIT_TXT, req, lookup(given, label), payload)?,
                None => lookup(given, label)
                    .map(str::to_string)
                    .or_else(|| self.system_value(label, payload)),
            };
            let Some(value) = value else {
                return Err(Error::Tag(format!("{BAGIT_TXT} must carry {label}")));
            };
            file.push(label, value);
        }

        if let Some(version) = file.first(DECLARATION_TAGS[0]) {
            if !self.profile.accepts_version(version) {
                return Err(Error::Tag(format!(
                    "BagIt-Version {version} is not accepted by the profile"
                )));
            }
        }
        if let Some(encoding) = file.first(DECLARATION_TAGS[1]) {
            if !encoding.eq_ignore_ascii_case(TAG_FILE_ENCODING) {
                return Err(Error::Tag(format!(
                    "tag files are written as {TAG_FILE_ENCODING}, not {encoding}"
                )));
            }
        }

        let extra = requirements
            .map(|r| r.tags.as_slice())
            .unwrap_or_default()
            .iter()
            .filter(|req| !is_declaration_tag(&req.label));
        for req in extra {
            if let Some(value) = self.resolve(BAGIT_TXT, req, lookup(given, &req.label), payload)? {
                file.push(req.label.clone(), value);
            }
        }
        for (label, value) in given {
            let declared = requirements.is_some_and(|r| r.tag(label).is_some());
            if !declared && !is_declaration_tag(label) {
                check_label(BAGIT_TXT, label)?;
                file.push(label.clone(), value.clone());
            }
        }
        Ok(file)
    }

    fn system_value(&self, label: &str, payload: &[PayloadFile]) -> Option<String> {
        match label.to_ascii_lowercase().as_str() {
            "bagging-date" => Some(
                self.options
                    .now
                    .unwrap_or_else(Timestamp::now)
                    .to_bagging_date(),
            ),
            "bagging-software" => Some(self.options.bagging_software.clone()),
            "payload-oxum" => Some(payload_oxum(payload)),
            "bagit-version" => Some(self.bagit_version().to_string()),
            "tag-file-character-encoding" => Some(TAG_FILE_ENCODING.to_string()),
            "bag-size" => Some(human_size(payload.iter().map(|f| f.size).sum())),
            _ => None,
        }
    }

    fn resolve(
        &self,
        file: &str,
        req: &TagRequirement,
        given: Option<&str>,
        payload: &[PayloadFile],
    ) -> Result<Option<String>> {
        if req.is_forbidden() {
            if given.is_some() {
                return Err(Error::Tag(format!(
                    "Tag {} is forbidden in {file}",
                    req.label
                )));
            }
            return Ok(None);
        }

        let value = given
            .map(str::to_string)
            .or_else(|| req.default_value.clone())
            .or_else(|| self.system_value(&req.label, payload));
        match value {
            Some(value) => match req.check_value(&value) {
                Some(message) => Err(Error::Tag(format!("{message} in {file}"))),
                None => Ok(Some(value)),
            },
            None if req.is_required() => Err(Error::Tag(format!(
                "Required tag {} in {file} has no value",
                req.label
            ))),
            None => Ok(None),
        }
    }

    fn tag_files(&self, payload: &[PayloadFile], tag_values: &TagValues) -> Result<Vec<TagFile>> {
        let empty = BTreeMap::new();
        let mut files = Vec::new();

        for requirements in &self.profile.tag_files {
            let path = requirements.path.as_str();
            if path == BAGIT_TXT {
                continue;
            }
            let given = tag_values.get(path).unwrap_or(&empty);
            let file = self.tag_file(requirements, given, payload)?;
            if file.is_empty() && self.profile.is_tag_file_optional(path) {
                continue;
            }
            files.push(file);
        }

        for (path, tags) in tag_values {
            if path == BAGIT_TXT || self.profile.tag_file(path).is_some() {
                continue;
            }
            let path = normalize_path(path).map_err(|reason| {
                Error::Tag(format!("invalid tag file path {path:?}: {reason}"))
            })?;
            if path == BAGIT_TXT || path.starts_with("data/") {
                return Err(Error::Tag(format!("{path} cannot be used as a tag file")));
            }
            let mut file = TagFile::new(path);
            for (label, value) in tags {
                check_label(&file.path, label)?;
                file.push(label.clone(), value.clone());
            }
            files.push(file);
        }
        Ok(files)
    }

    fn tag_file(
        &self,
        requirements: &TagFileRequirements,
        given: &BTreeMap<String, String>,
        payload: &[PayloadFile],
    ) -> Result<TagFile> {
        let path = requirements.path.as_str();
        let mut file = TagFile::new(path);
        for req in &requirements.tags {
            if let Some(value) = self.resolve(path, req, lookup(given, &req.label), payload)? {
                file.push(req.label.clone(), value);
            }
        }
        for (label, value) in given {
            if requirements.tag(label).is_none() {
                check_label(path, label)?;
                file.push(label.clone(), value.clone());
            }
        }
        Ok(file)
    }
}

/// Caller value for `label`, ignoring label case.
fn lookup<'v>(given: &'v BTreeMap<String, String>, label: &str) -> Option<&'v str> {
    given
        .iter()
        .find(|(l, _)| l.eq_ignore_ascii_case(label))
        .map(|(_, v)| v.as_str())
}

fn is_declaration_tag(label: &str) -> bool {
    DECLARATION_TAGS.iter().any(|t| t.eq_ignore_ascii_case(label))
}

fn check_label(path: &str, label: &str) -> Result<()> {
    match label_problem(label) {
        Some(problem) => Err(Error::Tag(format!("{problem} ({label:?} in {path})"))),
        None => Ok(()),
    }
}

/// Bag paths (`data/...`) for each source, rejecting duplicates.
fn payload_paths(sources: &[SourceFile]) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut paths = Vec::with_capacity(sources.len());
    for source in sources {
        let rel = normalize_path(&source.bag_path).map_err(|reason| {
            Error::Other(format!("invalid payload path {:?}: {reason}", source.bag_path))
        })?;
        let path = format!("{DATA_DIR}/{rel}");
        if !seen.insert(path.clone()) {
            return Err(Error::Other(format!("duplicate payload path {path}")));
        }
        paths.push(path);
    }
    Ok(paths)
}

/// Tag manifests over the rendered bytes of every other tag-area file.
fn tag_manifests(
    algorithms: &[DigestAlgorithm],
    declaration: &TagFile,
    tag_files: &[TagFile],
    manifests: &[Manifest],
) -> Result<Vec<Manifest>> {
    let mut rendered: Vec<(String, String)> = vec![(BAGIT_TXT.to_string(), declaration.render())];
    rendered.extend(tag_files.iter().map(|f| (f.path.clone(), f.render())));
    rendered.extend(manifests.iter().map(|m| (m.file_name(), m.render())));
    rendered.sort();

    let mut out = Vec::new();
    for &algorithm in algorithms {
        let mut manifest = Manifest::new(ManifestKind::Tag, algorithm);
        for (path, content) in &rendered {
            manifest
                .insert(path, &digest_bytes(content.as_bytes(), algorithm))
                .map_err(Error::Other)?;
        }
        out.push(manifest);
    }
    Ok(out)
}

/// Build a bag for `profile`.
pub fn build(
    profile: &Profile,
    sources: &[SourceFile],
    tag_values: &TagValues,
    options: BuildOptions,
) -> Result<BuiltBag> {
    Builder::new(profile, options).build(sources, tag_values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn profile() -> Profile {
        Profile::load(
            br#"{
                "name": "Builder test",
                "manifestsRequired": ["payload", "tag"],
                "manifestAlgorithms": ["sha256", "md5"],
                "tagFilesRequired": {
                    "bag-info.txt": {
                        "Source-Organization": { "required": true },
                        "Bagging-Date": { "required": true },
                        "Payload-Oxum": { "required": true },
                        "Access": { "values": ["Open", "Closed"], "default": "Open" },
                        "Internal-Sender-Identifier": { "requirement": "forbidden" }
                    }
                }
            }"#,
        )
        .unwrap()
    }

    fn options() -> BuildOptions {
        BuildOptions {
            workers: 2,
            now: Some(Timestamp::from_datetime(
                chrono::Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            )),
            ..BuildOptions::default()
        }
    }

    fn tags(pairs: &[(&str, &str)]) -> TagValues {
        let mut values = TagValues::new();
        let file = values.entry("bag-info.txt".to_string()).or_default();
        for (label, value) in pairs {
            file.insert(label.to_string(), value.to_string());
        }
        values
    }

    fn sources(dir: &Path) -> Vec<SourceFile> {
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("hello.txt"), "hello world").unwrap();
        fs::write(dir.join("sub/b.bin"), [0u8, 1, 2]).unwrap();
        SourceFile::collect_dir(dir).unwrap()
    }

    #[test]
    fn test_build_resolves_tag_values() {
        let dir = tempdir().unwrap();
        let sources = sources(dir.path());
        assert_eq!(sources[0].bag_path, "hello.txt");
        assert_eq!(sources[1].bag_path, "sub/b.bin");

        let profile = profile();
        let built = build(
            &profile,
            &sources,
            &tags(&[("Source-Organization", "Example Org"), ("Contact-Name", "Archivist")]),
            options(),
        )
        .unwrap();

        let bag_info = &built.tag_files[0];
        assert_eq!(
            bag_info.render(),
            "Source-Organization: Example Org\n\
             Bagging-Date: 2024-03-01\n\
             Payload-Oxum: 14.2\n\
             Access: Open\n\
             Contact-Name: Archivist\n"
        );
        assert_eq!(built.payload_oxum(), "14.2");
        assert_eq!(built.manifests.len(), 2);
        assert_eq!(built.tag_manifests.len(), 2);
        assert_eq!(
            built.manifests[0].get("data/hello.txt"),
            Some("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9")
        );
        assert!(built.tag_manifests[0].contains("manifest-md5.txt"));
        assert!(built.tag_manifests[0].contains("bagit.txt"));
    }

    #[test]
    fn test_missing_required_tag() {
        let dir = tempdir().unwrap();
        let err = build(&profile(), &sources(dir.path()), &TagValues::new(), options()).unwrap_err();
        match err {
            Error::Tag(message) => assert!(message.contains("Source-Organization")),
            other => panic!("expected tag error, got {other:?}"),
        }
    }

    #[test]
    fn test_forbidden_and_disallowed_values() {
        let dir = tempdir().unwrap();
        let sources = sources(dir.path());
        let err = build(
            &profile(),
            &sources,
            &tags(&[("Source-Organization", "x"), ("Internal-Sender-Identifier", "42")]),
            options(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Tag(_)));

        let err = build(
            &profile(),
            &sources,
            &tags(&[("Source-Organization", "x"), ("access", "Secret")]),
            options(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Tag(_)));
    }

    #[test]
    fn test_duplicate_payload_path() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a"), "a").unwrap();
        let sources = vec![
            SourceFile::new(dir.path().join("a"), "x/a"),
            SourceFile::new(dir.path().join("a"), "./x/a"),
        ];
        assert!(build(&Profile::default(), &sources, &TagValues::new(), options()).is_err());
    }

    #[test]
    fn test_cancelled_build() {
        let dir = tempdir().unwrap();
        let sources = sources(dir.path());
        let opts = options();
        opts.cancel.cancel();
        let err = build(&Profile::default(), &sources, &TagValues::new(), opts).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_write_to_refuses_non_empty_dir() {
        let dir = tempdir().unwrap();
        let sources = sources(dir.path());
        let built = build(&Profile::default(), &sources, &TagValues::new(), options()).unwrap();
        assert!(matches!(built.write_to(dir.path()), Err(Error::Config(_))));

        let out = dir.path().join("bag");
        built.write_to(&out).unwrap();
        assert!(out.join("data/sub/b.bin").is_file());
        assert!(out.join("manifest-sha256.txt").is_file());
        assert_eq!(
            fs::read_to_string(out.join("bagit.txt")).unwrap(),
            "BagIt-Version: 1.0\nTag-File-Character-Encoding: UTF-8\n"
        );
    }

    #[test]
    fn test_declared_bagit_txt_keeps_system_tags() {
        let dir = tempdir().unwrap();
        let profile = Profile::load(
            br#"{
                "acceptBagItVersion": ["0.97", "1.0"],
                "tagFilesRequired": {
                    "bagit.txt": { "BagIt-Version": { "required": true, "values": ["1.0"] } }
                }
            }"#,
        )
        .unwrap();
        let built = build(&profile, &sources(dir.path()), &TagValues::new(), options()).unwrap();
        assert_eq!(
            built.declaration.render(),
            "BagIt-Version: 1.0\nTag-File-Character-Encoding: UTF-8\n"
        );
        assert!(built.tag_files.iter().all(|f| f.path != "bagit.txt"));

        let mut values = TagValues::new();
        values
            .entry("bagit.txt".to_string())
            .or_default()
            .insert("BagIt-Version".to_string(), "0.97".to_string());
        let err = build(&profile, &sources(dir.path()), &values, options()).unwrap_err();
        assert!(matches!(err, Error::Tag(_)));
    }

    #[test]
    fn test_required_tag_with_allowed_values_needs_a_value() {
        let dir = tempdir().unwrap();
        let profile = Profile::load(
            br#"{"tagFilesRequired": {"bag-info.txt": {
                "Access": { "required": true, "values": ["Open", "Closed"] }
            }}}"#,
        )
        .unwrap();
        let sources = sources(dir.path());
        let err = build(&profile, &sources, &TagValues::new(), options()).unwrap_err();
        assert!(matches!(err, Error::Tag(_)));

        let built = build(&profile, &sources, &tags(&[("Access", "Closed")]), options()).unwrap();
        assert_eq!(built.tag_files[0].first("Access"), Some("Closed"));
    }

    #[test]
    fn test_unreadable_caller_label_is_rejected() {
        let dir = tempdir().unwrap();
        let sources = sources(dir.path());
        let err = build(
            &Profile::default(),
            &sources,
            &tags(&[("DC:Title", "A title")]),
            options(),
        )
        .unwrap_err();
        match err {
            Error::Tag(message) => assert!(message.contains("DC:Title")),
            other => panic!("expected tag error, got {other:?}"),
        }
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(human_size(3 * 1024 * 1024), "3.0 MB");
    }
}
