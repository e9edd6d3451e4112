//! Reading a bag from disk.
//!
//! [`Bag::open`] scans a bag directory, or unpacks a serialized bag into a
//! temporary directory first, and parses every manifest and tag file it
//! finds. Manifest and tag-file parse failures are kept on the bag so the
//! validator can report them; a malformed `bagit.txt` aborts the open.

use crate::checksum::is_fatal_io;
use crate::package::{self, Unpacked};
use crate::walk::{walk, EntryKind};
use bagsmith_common::constants::{BAGIT_TXT, DATA_DIR, FETCH_TXT};
use bagsmith_common::{DigestAlgorithm, Error, ManifestKind, ParseError, Result, SerializationFormat};
use bagsmith_schema::manifest::classify_file_name;
use bagsmith_schema::{Manifest, TagFile};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A manifest file found in the bag, whether or not it parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFile {
    pub path: String,
    pub kind: ManifestKind,
    /// `None` when the file name names an unsupported algorithm.
    pub algorithm: Option<DigestAlgorithm>,
}

/// A bag as found on disk. Never modified after opening.
#[derive(Debug)]
pub struct Bag {
    root: PathBuf,
    format: SerializationFormat,
    declaration: Option<TagFile>,
    manifest_files: Vec<ManifestFile>,
    manifests: Vec<Manifest>,
    parse_failures: Vec<ParseError>,
    tag_files: BTreeMap<String, TagFile>,
    payload: BTreeMap<String, u64>,
    top_level_files: Vec<String>,
    top_level_dirs: Vec<String>,
    _unpacked: Option<Unpacked>,
}

impl Bag {
    /// Open a bag directory or a `.tar` / `.tar.gz` serialized bag.
    pub fn open(path: &Path) -> Result<Bag> {
        let meta = fs::metadata(path).map_err(|e| Error::io_at(path, e))?;
        if meta.is_dir() {
            return Bag::from_dir(path);
        }

        let format = SerializationFormat::from_path(path);
        if !format.is_serialized() {
            return Err(Error::UnsupportedFormat(path.display().to_string()));
        }
        let unpacked = package::unpack(path, format)?;
        let mut bag = Bag::scan(unpacked.root())?;
        bag.format = format;
        bag._unpacked = Some(unpacked);
        Ok(bag)
    }

    /// Scan an unserialized bag directory.
    pub fn from_dir(root: &Path) -> Result<Bag> {
        if !root.is_dir() {
            return Err(Error::io_at(
                root,
                io::Error::new(io::ErrorKind::NotFound, "bag directory not found"),
            ));
        }
        Bag::scan(root)
    }

    fn scan(root: &Path) -> Result<Bag> {
        info!("Scanning bag at {:?}", root);
        let mut bag = Bag {
            root: root.to_path_buf(),
            format: SerializationFormat::Directory,
            declaration: None,
            manifest_files: Vec::new(),
            manifests: Vec::new(),
            parse_failures: Vec::new(),
            tag_files: BTreeMap::new(),
            payload: BTreeMap::new(),
            top_level_files: Vec::new(),
            top_level_dirs: Vec::new(),
            _unpacked: None,
        };

        let mut files = Vec::new();
        for entry in walk(root)? {
            if entry.is_top_level() {
                if entry.kind == EntryKind::Dir {
                    bag.top_level_dirs.push(entry.rel.clone());
                } else {
                    bag.top_level_files.push(entry.rel.clone());
                }
            }
            if entry.kind != EntryKind::Dir {
                files.push((entry.rel, entry.size));
            }
        }

        for (rel, size) in files {
            if rel.starts_with("data/") {
                bag.payload.insert(rel, size);
                continue;
            }
            if rel == BAGIT_TXT {
                let content = read_text(root, &rel)?;
                let declaration = TagFile::parse(&rel, &content)?;
                bag.declaration = Some(declaration);
                continue;
            }
            if rel == FETCH_TXT {
                continue;
            }
            if !rel.contains('/') {
                if let Some((kind, alg_name)) = classify_file_name(&rel) {
                    bag.read_manifest(&rel, kind, &alg_name)?;
                    continue;
                }
            }
            if rel.ends_with(".txt") {
                bag.read_tag_file(&rel)?;
            }
        }

        debug!(
            "Bag at {:?}: {} payload file(s), {} manifest(s), {} tag file(s), {} parse failure(s)",
            bag.root,
            bag.payload.len(),
            bag.manifests.len(),
            bag.tag_files.len(),
            bag.parse_failures.len()
        );
        Ok(bag)
    }

    fn read_manifest(&mut self, rel: &str, kind: ManifestKind, alg_name: &str) -> Result<()> {
        self.manifest_files.push(ManifestFile {
            path: rel.to_string(),
            kind,
            algorithm: alg_name.parse().ok(),
        });
        let parsed = read_text(&self.root, rel)
            .and_then(|content| Manifest::parse(rel, &content).map_err(Error::from));
        match parsed {
            Ok(manifest) => self.manifests.push(manifest),
            Err(Error::Parse(e)) => self.parse_failures.push(e),
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn read_tag_file(&mut self, rel: &str) -> Result<()> {
        let parsed = read_text(&self.root, rel)
            .and_then(|content| TagFile::parse(rel, &content).map_err(Error::from));
        match parsed {
            Ok(tag_file) => {
                self.tag_files.insert(rel.to_string(), tag_file);
            }
            Err(Error::Parse(e)) => self.parse_failures.push(e),
            Err(e) => return Err(e),
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn format(&self) -> SerializationFormat {
        self.format
    }

    /// Parsed `bagit.txt`, if present.
    pub fn declaration(&self) -> Option<&TagFile> {
        self.declaration.as_ref()
    }

    pub fn bagit_version(&self) -> Option<&str> {
        self.declaration.as_ref()?.first("BagIt-Version")
    }

    /// Every manifest file present, including ones that failed to parse.
    pub fn manifest_files(&self) -> &[ManifestFile] {
        &self.manifest_files
    }

    /// Manifests that parsed.
    pub fn manifests(&self) -> &[Manifest] {
        &self.manifests
    }

    pub fn payload_manifests(&self) -> impl Iterator<Item = &Manifest> {
        self.manifests
            .iter()
            .filter(|m| m.kind == ManifestKind::Payload)
    }

    pub fn parse_failures(&self) -> &[ParseError] {
        &self.parse_failures
    }

    /// True if `path` could not be parsed.
    pub fn failed_to_parse(&self, path: &str) -> bool {
        self.parse_failures.iter().any(|e| e.file == path)
    }

    /// Parsed tag file at `path`. `bagit.txt` resolves to the declaration.
    pub fn tag_file(&self, path: &str) -> Option<&TagFile> {
        if path == BAGIT_TXT {
            return self.declaration.as_ref();
        }
        self.tag_files.get(path)
    }

    pub fn tag_files(&self) -> impl Iterator<Item = &TagFile> {
        self.tag_files.values()
    }

    /// Payload files on disk with their sizes, keyed by `data/...` path.
    pub fn payload(&self) -> &BTreeMap<String, u64> {
        &self.payload
    }

    /// Total payload bytes and file count, as in `Payload-Oxum`.
    pub fn payload_oxum(&self) -> (u64, usize) {
        (self.payload.values().sum(), self.payload.len())
    }

    pub fn has_fetch_txt(&self) -> bool {
        self.top_level_files.iter().any(|f| f == FETCH_TXT)
    }

    pub fn has_payload_dir(&self) -> bool {
        self.top_level_dirs.iter().any(|d| d == DATA_DIR)
    }

    pub fn top_level_files(&self) -> &[String] {
        &self.top_level_files
    }

    pub fn top_level_dirs(&self) -> &[String] {
        &self.top_level_dirs
    }
}

/// Read a tag or manifest file as UTF-8.
///
/// Unreadable or non-UTF-8 files become whole-file parse errors; device
/// failures are returned as IO errors.
fn read_text(root: &Path, rel: &str) -> Result<String> {
    let path = root.join(rel);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if is_fatal_io(&e) => return Err(Error::io_at(&path, e)),
        Err(e) => {
            return Err(ParseError::whole_file(rel, format!("cannot read file: {e}")).into());
        }
    };
    String::from_utf8(bytes)
        .map_err(|_| ParseError::whole_file(rel, "file is not valid UTF-8").into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn sample_bag(root: &Path) {
        write(root, "bagit.txt", "BagIt-Version: 1.0\nTag-File-Character-Encoding: UTF-8\n");
        write(root, "bag-info.txt", "Source-Organization: Example\n");
        write(root, "data/hello.txt", "hello world");
        write(
            root,
            "manifest-sha256.txt",
            &format!("{HELLO_SHA256}  data/hello.txt\n"),
        );
    }

    #[test]
    fn test_scan_directory_bag() {
        let dir = tempdir().unwrap();
        sample_bag(dir.path());
        write(dir.path(), "custom/extra-info.txt", "Note: nested\n");

        let bag = Bag::open(dir.path()).unwrap();
        assert_eq!(bag.format(), SerializationFormat::Directory);
        assert_eq!(bag.bagit_version(), Some("1.0"));
        assert_eq!(bag.manifests().len(), 1);
        assert_eq!(bag.payload_manifests().count(), 1);
        assert_eq!(bag.payload_oxum(), (11, 1));
        assert!(bag.tag_file("bag-info.txt").is_some());
        assert!(bag.tag_file("custom/extra-info.txt").is_some());
        assert_eq!(
            bag.tag_file("bagit.txt").and_then(|f| f.first("Tag-File-Character-Encoding")),
            Some("UTF-8")
        );
        assert!(bag.has_payload_dir());
        assert!(!bag.has_fetch_txt());
        assert_eq!(bag.top_level_dirs(), &["custom".to_string(), "data".to_string()]);
    }

    #[test]
    fn test_manifest_parse_failure_is_kept() {
        let dir = tempdir().unwrap();
        sample_bag(dir.path());
        write(dir.path(), "manifest-md5.txt", "not-a-digest\n");
        write(dir.path(), "manifest-crc32.txt", "");

        let bag = Bag::open(dir.path()).unwrap();
        assert_eq!(bag.manifests().len(), 1);
        assert_eq!(bag.manifest_files().len(), 3);
        assert!(bag.failed_to_parse("manifest-md5.txt"));
        assert!(bag.failed_to_parse("manifest-crc32.txt"));
        let crc = bag
            .manifest_files()
            .iter()
            .find(|m| m.path == "manifest-crc32.txt")
            .unwrap();
        assert_eq!(crc.algorithm, None);
    }

    #[test]
    fn test_malformed_declaration_is_fatal() {
        let dir = tempdir().unwrap();
        sample_bag(dir.path());
        write(dir.path(), "bagit.txt", "  continuation first\n");
        assert!(matches!(Bag::open(dir.path()), Err(Error::Parse(_))));
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempdir().unwrap();
        assert!(Bag::from_dir(&dir.path().join("nope")).is_err());
    }
}
