//! Validation report types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How serious a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// What sort of problem a finding describes.
///
/// Declaration order is the report's secondary sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingKind {
    /// Malformed manifest or tag file.
    Parse,
    /// Missing or forbidden manifest, bad bag layout.
    Structural,
    /// Missing, forbidden or invalid tag.
    Tag,
    /// Digest mismatch, missing or unreadable file.
    Checksum,
    /// Payload file listed in no payload manifest.
    Untracked,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FindingKind::Parse => "ParseError",
            FindingKind::Structural => "StructuralError",
            FindingKind::Tag => "TagError",
            FindingKind::Checksum => "ChecksumError",
            FindingKind::Untracked => "UntrackedFile",
        };
        write!(f, "{s}")
    }
}

/// One problem found in a bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub kind: FindingKind,
    /// Bag-relative path the finding is about. Empty for bag-wide findings.
    pub path: String,
    /// Tag label or algorithm list, when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub message: String,
}

impl Finding {
    pub fn error(kind: FindingKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            path: path.into(),
            subject: None,
            message: message.into(),
        }
    }

    pub fn warning(kind: FindingKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            path: path.into(),
            subject: None,
            message: message.into(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        if self.path.is_empty() {
            write!(f, "[{severity}] {}: {}", self.kind, self.message)
        } else {
            write!(f, "[{severity}] {} {}: {}", self.kind, self.path, self.message)
        }
    }
}

/// Result of validating one bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Findings sorted by path, then kind.
    pub findings: Vec<Finding>,
    /// True when no finding has error severity.
    pub passed: bool,
    /// True when the run stopped early on request.
    pub cancelled: bool,
}

impl ValidationReport {
    /// Build a report, sorting findings into their canonical order.
    pub fn new(mut findings: Vec<Finding>, cancelled: bool) -> Self {
        findings.sort_by(|a, b| {
            (&a.path, a.kind, &a.subject, &a.message, a.severity).cmp(&(
                &b.path,
                b.kind,
                &b.subject,
                &b.message,
                b.severity,
            ))
        });
        let passed = !findings.iter().any(Finding::is_error);
        Self {
            findings,
            passed,
            cancelled,
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Warning)
    }

    /// Findings of one kind.
    pub fn of_kind(&self, kind: FindingKind) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.kind == kind)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }
}
