//! Profile-driven bag validation.
//!
//! Validation runs in three passes. The structural pass checks the bag
//! layout and which manifests are present. The tag pass checks tag files
//! against the profile's tag requirements, and the checksum pass
//! recomputes every digest listed in a manifest. The tag and checksum
//! passes run concurrently. Every finding is collected into one
//! [`ValidationReport`]; only profile errors, a malformed `bagit.txt` and
//! device-level IO failures abort the run.

use crate::bag::Bag;
use crate::checksum::{ChecksumEngine, VerifyResult};
use crate::pool::{default_workers, CancelToken, WorkerPool};
use bagsmith_common::constants::{BAGIT_TXT, DATA_DIR, DECLARATION_TAGS, FETCH_TXT};
use bagsmith_common::timestamp::is_bagging_date;
use bagsmith_common::{DigestAlgorithm, Error, ManifestKind, ProfileErrors, Result};
use bagsmith_schema::manifest::classify_file_name;
use bagsmith_schema::{Finding, FindingKind, Profile, TagFile, TagFileRequirements, ValidationReport};
use std::collections::BTreeMap;
use std::path::Path;
use std::thread;
use tracing::{debug, info, warn};

/// Tag file every bag may carry whether or not the profile names it.
const BAG_INFO_TXT: &str = "bag-info.txt";

/// Options for one validation run.
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    /// Report undeclared tags and treat untracked payload files as errors.
    pub strict: bool,
    /// Number of checksum workers.
    pub workers: usize,
    pub cancel: CancelToken,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            strict: false,
            workers: default_workers(),
            cancel: CancelToken::new(),
        }
    }
}

/// Validates bags against one profile.
pub struct Validator<'a> {
    profile: &'a Profile,
    options: ValidationOptions,
}

impl<'a> Validator<'a> {
    pub fn new(profile: &'a Profile, options: ValidationOptions) -> Self {
        Self { profile, options }
    }

    /// Open the bag at `path` and validate it.
    pub fn validate_path(&self, path: &Path) -> Result<ValidationReport> {
        self.check_profile()?;
        let bag = Bag::open(path)?;
        self.validate(&bag)
    }

    /// Validate an opened bag.
    pub fn validate(&self, bag: &Bag) -> Result<ValidationReport> {
        self.check_profile()?;
        info!(
            "Validating bag {:?} against profile {:?}",
            bag.root(),
            self.profile.name
        );

        let mut findings = self.parse_findings(bag);
        findings.extend(self.structural_findings(bag));

        let (tag_findings, checksum_result) = thread::scope(|s| {
            let tags = s.spawn(|| self.tag_findings(bag));
            let checksums = self.checksum_findings(bag);
            (tags.join(), checksums)
        });
        let tag_findings =
            tag_findings.map_err(|_| Error::Other("tag validation panicked".to_string()))?;
        let (checksum_findings, cancelled) = checksum_result?;

        findings.extend(tag_findings);
        findings.extend(checksum_findings);

        let report = ValidationReport::new(findings, cancelled);
        info!(
            "Validation finished: {} error(s), {} warning(s){}",
            report.error_count(),
            report.warning_count(),
            if cancelled { ", cancelled" } else { "" }
        );
        Ok(report)
    }

    fn check_profile(&self) -> Result<()> {
        let errors = self.profile.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Profile(ProfileErrors(errors)))
        }
    }

    fn parse_findings(&self, bag: &Bag) -> Vec<Finding> {
        bag.parse_failures()
            .iter()
            .map(|e| {
                let message = if e.line == 0 {
                    e.reason.clone()
                } else {
                    format!("line {}: {} ({:?})", e.line, e.reason, e.content)
                };
                Finding::error(FindingKind::Parse, e.file.clone(), message)
            })
            .collect()
    }

    fn structural_findings(&self, bag: &Bag) -> Vec<Finding> {
        let profile = self.profile;
        let mut findings = Vec::new();
        let structural = |path: &str, message: String| {
            Finding::error(FindingKind::Structural, path, message)
        };

        match bag.declaration() {
            None => findings.push(structural(BAGIT_TXT, "bag declaration is missing".to_string())),
            Some(declaration) => match declaration.first("BagIt-Version") {
                None => findings.push(
                    structural(BAGIT_TXT, "BagIt-Version is missing".to_string())
                        .with_subject("BagIt-Version"),
                ),
                Some(version) if !profile.accepts_version(version) => findings.push(
                    structural(
                        BAGIT_TXT,
                        format!(
                            "BagIt-Version {version} is not accepted (accepted: {})",
                            profile.accept_bagit_version.join(", ")
                        ),
                    )
                    .with_subject("BagIt-Version"),
                ),
                Some(_) => {}
            },
        }

        if !bag.has_payload_dir() {
            findings.push(structural(
                DATA_DIR,
                "payload directory is missing".to_string(),
            ));
        }

        for kind in &profile.manifests_required {
            let present = bag
                .manifest_files()
                .iter()
                .any(|m| m.kind == *kind && m.algorithm.is_some());
            if !present {
                findings.push(structural(
                    "",
                    format!("a {kind} manifest with a supported algorithm is required"),
                ));
            }
        }
        for file in bag.manifest_files() {
            if profile.forbids_manifest(file.kind) {
                findings.push(structural(
                    file.path.as_str(),
                    format!("{} manifests are forbidden by the profile", file.kind),
                ));
            }
        }

        if let Err(message) = profile.accepts_format(bag.format()) {
            findings.push(structural("", message));
        }

        if bag.has_fetch_txt() && !profile.allow_fetch_txt {
            findings.push(structural(
                FETCH_TXT,
                "fetch.txt is not allowed by the profile".to_string(),
            ));
        }

        if !profile.allow_misc_top_level_files {
            let known = profile.tag_file_names();
            for name in bag.top_level_files() {
                let standard = name == BAGIT_TXT
                    || name == FETCH_TXT
                    || name == BAG_INFO_TXT
                    || classify_file_name(name).is_some()
                    || known.contains(&name.as_str());
                if !standard {
                    findings.push(structural(
                        name.as_str(),
                        "miscellaneous top-level files are not allowed".to_string(),
                    ));
                }
            }
        }

        if !profile.allow_misc_directories {
            let tag_dirs: Vec<&str> = profile
                .tag_file_names()
                .into_iter()
                .filter_map(|p| p.split_once('/').map(|(dir, _)| dir))
                .collect();
            for dir in bag.top_level_dirs() {
                if dir != DATA_DIR && !tag_dirs.contains(&dir.as_str()) {
                    findings.push(structural(
                        dir.as_str(),
                        "miscellaneous directories are not allowed".to_string(),
                    ));
                }
            }
        }

        debug!("Structural pass: {} finding(s)", findings.len());
        findings
    }

    fn tag_findings(&self, bag: &Bag) -> Vec<Finding> {
        let mut findings = Vec::new();

        for file in &self.profile.tag_files {
            if bag.failed_to_parse(&file.path) {
                continue;
            }
            match bag.tag_file(&file.path) {
                Some(tag_file) => findings.extend(self.check_tag_file(file, tag_file)),
                None if self.profile.is_tag_file_optional(&file.path) => {}
                None => findings.push(Finding::error(
                    FindingKind::Tag,
                    file.path.clone(),
                    "required tag file is missing",
                )),
            }
        }

        if let Some(bag_info) = bag.tag_file(BAG_INFO_TXT) {
            findings.extend(self.check_payload_oxum(bag, bag_info));
            if let Some(date) = bag_info.first("Bagging-Date") {
                if !is_bagging_date(date) {
                    findings.push(
                        Finding::warning(
                            FindingKind::Tag,
                            BAG_INFO_TXT,
                            format!("Bagging-Date {date:?} is not in YYYY-MM-DD form"),
                        )
                        .with_subject("Bagging-Date"),
                    );
                }
            }
        }

        debug!("Tag pass: {} finding(s)", findings.len());
        findings
    }

    fn check_tag_file(&self, requirements: &TagFileRequirements, tag_file: &TagFile) -> Vec<Finding> {
        let path = requirements.path.as_str();
        let mut findings = Vec::new();
        let tag_error = |label: &str, message: String| {
            Finding::error(FindingKind::Tag, path, message).with_subject(label)
        };

        for req in &requirements.tags {
            let values = tag_file.values(&req.label);
            if req.is_forbidden() {
                if !values.is_empty() {
                    findings.push(tag_error(
                        req.label.as_str(),
                        format!("Tag {} is forbidden", req.label),
                    ));
                }
                continue;
            }
            if values.is_empty() {
                if req.is_required() {
                    findings.push(tag_error(
                        req.label.as_str(),
                        format!("Required tag {} is missing", req.label),
                    ));
                }
                continue;
            }
            for value in values {
                if let Some(message) = req.check_value(value) {
                    findings.push(tag_error(req.label.as_str(), message));
                }
            }
        }

        if self.options.strict {
            for label in tag_file.labels() {
                let standard = path == BAGIT_TXT
                    && DECLARATION_TAGS.iter().any(|t| t.eq_ignore_ascii_case(label));
                if requirements.tag(label).is_none() && !standard {
                    findings.push(
                        Finding::warning(
                            FindingKind::Tag,
                            path,
                            format!("Tag {label} is not declared by the profile"),
                        )
                        .with_subject(label),
                    );
                }
            }
        }
        findings
    }

    /// Compare `Payload-Oxum` with the payload on disk.
    ///
    /// A mismatch is reported with the same severity as untracked files.
    fn check_payload_oxum(&self, bag: &Bag, bag_info: &TagFile) -> Option<Finding> {
        let declared = bag_info.first("Payload-Oxum")?;
        let (bytes, count) = bag.payload_oxum();
        let finding = |message: String| {
            let finding = if self.options.strict {
                Finding::error(FindingKind::Tag, BAG_INFO_TXT, message)
            } else {
                Finding::warning(FindingKind::Tag, BAG_INFO_TXT, message)
            };
            finding.with_subject("Payload-Oxum")
        };

        let parsed = declared
            .split_once('.')
            .and_then(|(b, c)| Some((b.trim().parse::<u64>().ok()?, c.trim().parse::<usize>().ok()?)));
        match parsed {
            None => Some(finding(format!(
                "Payload-Oxum {declared:?} is not in <bytes>.<count> form"
            ))),
            Some((b, c)) if (b, c) != (bytes, count) => Some(finding(format!(
                "Payload-Oxum is {declared} but the payload is {bytes}.{count}"
            ))),
            Some(_) => None,
        }
    }

    /// Recompute every manifest digest and look for untracked payload files.
    ///
    /// Returns the findings and whether the run was cancelled.
    fn checksum_findings(&self, bag: &Bag) -> Result<(Vec<Finding>, bool)> {
        let mut expected: BTreeMap<&str, Vec<(DigestAlgorithm, String)>> = BTreeMap::new();
        for manifest in bag.manifests() {
            for entry in manifest.entries() {
                expected
                    .entry(entry.path.as_str())
                    .or_default()
                    .push((manifest.algorithm, entry.digest.clone()));
            }
        }

        let pool = WorkerPool::new(self.options.workers, self.options.cancel.clone());
        let root = bag.root();
        let jobs: Vec<(&str, Vec<(DigestAlgorithm, String)>)> = expected.into_iter().collect();
        debug!("Checksum pass: {} file(s) to verify", jobs.len());

        let outcome = pool.run(jobs, |(path, digests)| {
            let results = ChecksumEngine::verify_many(&root.join(path), &digests)?;
            Ok((path, results))
        })?;
        if outcome.cancelled {
            warn!("Checksum verification cancelled");
        }

        let mut findings: Vec<Finding> = outcome
            .results
            .into_iter()
            .filter_map(|(path, results)| checksum_finding(path, &results))
            .collect();

        if bag.payload_manifests().next().is_some() {
            for path in bag.payload().keys() {
                let tracked = bag.payload_manifests().any(|m| m.contains(path));
                if tracked {
                    continue;
                }
                let message = "file is not listed in any payload manifest";
                findings.push(if self.options.strict {
                    Finding::error(FindingKind::Untracked, path.clone(), message)
                } else {
                    Finding::warning(FindingKind::Untracked, path.clone(), message)
                });
            }
        }

        Ok((findings, outcome.cancelled))
    }
}

/// Collapse the per-algorithm results for one path into at most one finding.
fn checksum_finding(path: &str, results: &[(DigestAlgorithm, VerifyResult)]) -> Option<Finding> {
    let algorithms = |pred: fn(&VerifyResult) -> bool| -> Vec<String> {
        results
            .iter()
            .filter(|(_, r)| pred(r))
            .map(|(a, _)| a.to_string())
            .collect()
    };

    if let Some((_, VerifyResult::Unreadable { cause })) = results
        .iter()
        .find(|(_, r)| matches!(r, VerifyResult::Unreadable { .. }))
    {
        return Some(Finding::error(
            FindingKind::Checksum,
            path,
            format!("file cannot be read: {cause}"),
        ));
    }

    let missing = algorithms(|r| matches!(r, VerifyResult::MissingFile));
    if !missing.is_empty() {
        let kind = if path.starts_with("data/") {
            ManifestKind::Payload
        } else {
            ManifestKind::Tag
        };
        return Some(
            Finding::error(
                FindingKind::Checksum,
                path,
                format!("file listed in {kind} manifest is missing"),
            )
            .with_subject(missing.join(",")),
        );
    }

    let mismatched = algorithms(|r| matches!(r, VerifyResult::Mismatch { .. }));
    if !mismatched.is_empty() {
        return Some(
            Finding::error(
                FindingKind::Checksum,
                path,
                format!("digest mismatch ({})", mismatched.join(", ")),
            )
            .with_subject(mismatched.join(",")),
        );
    }
    None
}

/// Validate an opened bag against `profile`.
pub fn validate(bag: &Bag, profile: &Profile, options: ValidationOptions) -> Result<ValidationReport> {
    Validator::new(profile, options).validate(bag)
}

/// Open and validate the bag at `path` against `profile`.
pub fn validate_path(
    path: &Path,
    profile: &Profile,
    options: ValidationOptions,
) -> Result<ValidationReport> {
    Validator::new(profile, options).validate_path(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_finding_per_path() {
        let results = vec![
            (
                DigestAlgorithm::Sha256,
                VerifyResult::Mismatch {
                    actual: "00".into(),
                },
            ),
            (DigestAlgorithm::Md5, VerifyResult::Match),
            (
                DigestAlgorithm::Sha1,
                VerifyResult::Mismatch {
                    actual: "11".into(),
                },
            ),
        ];
        let finding = checksum_finding("data/a.txt", &results).unwrap();
        assert_eq!(finding.kind, FindingKind::Checksum);
        assert_eq!(finding.subject.as_deref(), Some("sha256,sha1"));
    }

    #[test]
    fn test_missing_file_finding() {
        let results = vec![
            (DigestAlgorithm::Sha256, VerifyResult::MissingFile),
            (DigestAlgorithm::Md5, VerifyResult::MissingFile),
        ];
        let finding = checksum_finding("data/gone.txt", &results).unwrap();
        assert!(finding.message.contains("payload manifest is missing"));
        assert_eq!(finding.subject.as_deref(), Some("sha256,md5"));
    }

    #[test]
    fn test_all_match_has_no_finding() {
        let results = vec![(DigestAlgorithm::Sha256, VerifyResult::Match)];
        assert!(checksum_finding("data/a.txt", &results).is_none());
    }

    #[test]
    fn test_inconsistent_profile_is_rejected() {
        let mut profile = Profile::default();
        profile.manifests_forbidden.push(ManifestKind::Payload);
        let dir = tempfile::tempdir().unwrap();
        let err = validate_path(dir.path(), &profile, ValidationOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Profile(_)));
    }
}
