//! Payload and tag manifests.

use bagsmith_common::hash::is_hex_digest;
use bagsmith_common::{DigestAlgorithm, ManifestKind, ParseError};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// `manifest-<alg>.txt` or `tagmanifest-<alg>.txt`.
static MANIFEST_FILE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(tagmanifest|manifest)-([A-Za-z0-9]+)\.txt$").unwrap());

/// Whitespace between the digest and the path.
static ENTRY_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());

/// One line of a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Bag-relative, forward-slash path.
    pub path: String,
    /// Lowercase hex digest.
    pub digest: String,
}

/// A parsed manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub algorithm: DigestAlgorithm,
    pub kind: ManifestKind,
    entries: Vec<ManifestEntry>,
    index: HashMap<String, usize>,
}

/// Recognise a manifest file name, returning its kind and algorithm name.
///
/// The algorithm name is returned as written; it may be unsupported.
pub fn classify_file_name(name: &str) -> Option<(ManifestKind, String)> {
    let base = name.rsplit('/').next().unwrap_or(name);
    let caps = MANIFEST_FILE_NAME.captures(base)?;
    let kind = match &caps[1] {
        "tagmanifest" => ManifestKind::Tag,
        _ => ManifestKind::Payload,
    };
    Some((kind, caps[2].to_string()))
}

/// Normalise a manifest path to bag-relative forward-slash form.
pub fn normalize_path(raw: &str) -> Result<String, String> {
    let mut path = raw.replace('\\', "/");
    while let Some(rest) = path.strip_prefix("./") {
        path = rest.to_string();
    }
    if path.is_empty() {
        return Err("empty path".to_string());
    }
    if path.starts_with('/') || has_drive_prefix(&path) {
        return Err("path must be relative".to_string());
    }
    if path.split('/').any(|c| c == "..") {
        return Err("path must not contain '..'".to_string());
    }
    Ok(path)
}

/// `C:/...` style prefix. Backslashes are already forward slashes here.
fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/'
}

fn decode_path(raw: &str) -> String {
    raw.replace("%0D", "\r")
        .replace("%0d", "\r")
        .replace("%0A", "\n")
        .replace("%0a", "\n")
        .replace("%25", "%")
}

fn encode_path(path: &str) -> String {
    path.replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

impl Manifest {
    pub fn new(kind: ManifestKind, algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            kind,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Parse manifest text. Kind and algorithm come from `filename`.
    pub fn parse(filename: &str, content: &str) -> Result<Manifest, ParseError> {
        let (kind, alg_name) = classify_file_name(filename).ok_or_else(|| {
            ParseError::whole_file(filename, "not a manifest-<algorithm>.txt file name")
        })?;
        let algorithm: DigestAlgorithm = alg_name.parse().map_err(|_| {
            ParseError::whole_file(filename, format!("unsupported algorithm {alg_name:?}"))
        })?;

        let mut manifest = Manifest::new(kind, algorithm);
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        for (i, line) in content.lines().enumerate() {
            let line_no = i + 1;
            let trimmed = line.trim_end_matches('\r');
            if trimmed.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = ENTRY_SEPARATOR.splitn(trimmed.trim_start(), 2).collect();
            if fields.len() != 2 || fields[1].trim().is_empty() {
                return Err(ParseError::new(
                    filename,
                    line_no,
                    line,
                    "expected a digest and a path",
                ));
            }
            let digest = fields[0];
            if !is_hex_digest(digest) {
                return Err(ParseError::new(
                    filename,
                    line_no,
                    line,
                    "digest is not hexadecimal",
                ));
            }
            let path = normalize_path(&decode_path(fields[1]))
                .map_err(|reason| ParseError::new(filename, line_no, line, reason))?;
            manifest
                .insert(&path, digest)
                .map_err(|reason| ParseError::new(filename, line_no, line, reason))?;
        }
        Ok(manifest)
    }

    /// Add an entry. Paths must be unique.
    pub fn insert(&mut self, path: &str, digest: &str) -> Result<(), String> {
        if self.index.contains_key(path) {
            return Err(format!("duplicate path {path}"));
        }
        self.index.insert(path.to_string(), self.entries.len());
        self.entries.push(ManifestEntry {
            path: path.to_string(),
            digest: digest.to_lowercase(),
        });
        Ok(())
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Digest recorded for `path`, if any.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.index
            .get(path)
            .map(|&i| self.entries[i].digest.as_str())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn file_name(&self) -> String {
        self.kind.file_name(self.algorithm)
    }

    /// Render as `<digest>  <path>` lines.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.digest);
            out.push_str("  ");
            out.push_str(&encode_path(&entry.path));
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SHA_A: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
    const SHA_B: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_classify_file_name() {
        assert_eq!(
            classify_file_name("manifest-sha256.txt"),
            Some((ManifestKind::Payload, "sha256".to_string()))
        );
        assert_eq!(
            classify_file_name("tagmanifest-MD5.txt"),
            Some((ManifestKind::Tag, "MD5".to_string()))
        );
        assert_eq!(classify_file_name("bag-info.txt"), None);
        assert_eq!(classify_file_name("manifest-sha256.txt.bak"), None);
    }

    #[test]
    fn test_parse_manifest() {
        let content = format!("{SHA_A}  data/hello.txt\n{}  data/sub dir/empty file.bin\n", SHA_B.to_uppercase());
        let manifest = Manifest::parse("manifest-sha256.txt", &content).unwrap();
        assert_eq!(manifest.kind, ManifestKind::Payload);
        assert_eq!(manifest.algorithm, DigestAlgorithm::Sha256);
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.get("data/hello.txt"), Some(SHA_A));
        assert_eq!(manifest.get("data/sub dir/empty file.bin"), Some(SHA_B));
        assert_eq!(manifest.entries()[0].path, "data/hello.txt");
    }

    #[test]
    fn test_parse_normalizes_paths() {
        let content = format!("{SHA_A} ./data\\win.txt\r\n{SHA_B}\tdata/line%0Abreak\n");
        let manifest = Manifest::parse("tagmanifest-sha256.txt", &content).unwrap();
        assert!(manifest.contains("data/win.txt"));
        assert!(manifest.contains("data/line\nbreak"));
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let content = format!("{SHA_A}  data/a.txt\nabcd\n");
        let err = Manifest::parse("manifest-sha256.txt", &content).unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.content, "abcd");
        assert_eq!(err.file, "manifest-sha256.txt");
    }

    #[test]
    fn test_non_hex_digest() {
        let err = Manifest::parse("manifest-md5.txt", "zz11  data/a.txt\n").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.reason.contains("hexadecimal"));
    }

    #[test]
    fn test_duplicate_path() {
        let content = format!("{SHA_A}  data/a.txt\n{SHA_B}  data/a.txt\n");
        let err = Manifest::parse("manifest-sha256.txt", &content).unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.reason.contains("duplicate"));
    }

    #[test]
    fn test_rejects_escaping_paths() {
        for path in ["/etc/passwd", "data/../../x", "C:/x", "d:\\x"] {
            let content = format!("{SHA_A}  {path}\n");
            assert!(Manifest::parse("manifest-sha256.txt", &content).is_err(), "{path}");
        }
    }

    #[test]
    fn test_colon_in_relative_name() {
        assert_eq!(normalize_path("a:b.txt").unwrap(), "a:b.txt");
        assert_eq!(normalize_path("data/c:d").unwrap(), "data/c:d");
        assert_eq!(normalize_path("1:/x").unwrap(), "1:/x");
    }

    #[test]
    fn test_bad_file_names() {
        let err = Manifest::parse("manifest-crc32.txt", "").unwrap_err();
        assert_eq!(err.line, 0);
        assert!(Manifest::parse("checksums.txt", "").is_err());
    }

    #[test]
    fn test_render() {
        let mut manifest = Manifest::new(ManifestKind::Payload, DigestAlgorithm::Sha256);
        manifest.insert("data/b.txt", SHA_B).unwrap();
        manifest.insert("data/100%.txt", &SHA_A.to_uppercase()).unwrap();
        assert!(manifest.insert("data/b.txt", SHA_A).is_err());
        assert_eq!(
            manifest.render(),
            format!("{SHA_B}  data/b.txt\n{SHA_A}  data/100%25.txt\n")
        );
        let reparsed = Manifest::parse(&manifest.file_name(), &manifest.render()).unwrap();
        assert_eq!(reparsed, manifest);
    }
}
