//! Tag types: values observed in a bag and requirements declared by a profile.

use bagsmith_common::RequirementType;
use serde::{Deserialize, Serialize};

/// A `Label: value` pair read from a tag file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParsedTag {
    pub label: String,
    pub value: String,
}

impl ParsedTag {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }

    /// Tag labels compare without regard to case.
    pub fn has_label(&self, label: &str) -> bool {
        self.label.eq_ignore_ascii_case(label)
    }
}

/// What a profile demands of one tag in one tag file.
///
/// A requirement carries policy only; it has no observed value. The
/// optional `default_value` is what a builder writes when the caller
/// supplies nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRequirement {
    pub label: String,
    pub requirement: RequirementType,
    /// Allowed values. Empty means any value is accepted.
    pub values: Vec<String>,
    pub default_value: Option<String>,
    /// Whether a blank value satisfies a required tag.
    pub empty_ok: bool,
}

impl TagRequirement {
    /// Create a requirement: `required` maps to required/optional.
    pub fn new(label: impl Into<String>, required: bool, values: Vec<String>) -> Self {
        let requirement = if required {
            RequirementType::Required
        } else {
            RequirementType::Optional
        };
        Self::with_requirement(label, requirement, values)
    }

    pub fn with_requirement(
        label: impl Into<String>,
        requirement: RequirementType,
        values: Vec<String>,
    ) -> Self {
        Self {
            label: label.into(),
            requirement,
            values,
            default_value: None,
            empty_ok: false,
        }
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_empty_ok(mut self, empty_ok: bool) -> Self {
        self.empty_ok = empty_ok;
        self
    }

    pub fn is_required(&self) -> bool {
        self.requirement == RequirementType::Required
    }

    pub fn is_forbidden(&self) -> bool {
        self.requirement == RequirementType::Forbidden
    }

    /// True if `value` is in the allowed set (or the set is empty).
    pub fn allows(&self, value: &str) -> bool {
        self.values.is_empty() || self.values.iter().any(|v| v == value)
    }

    /// Explain why `value` is unacceptable, or `None` if it is fine.
    pub fn check_value(&self, value: &str) -> Option<String> {
        if value.trim().is_empty() {
            if self.is_required() && !self.empty_ok {
                return Some(format!("Tag {} must not be empty", self.label));
            }
            if self.values.is_empty() || self.empty_ok {
                return None;
            }
        }
        if !self.allows(value) {
            return Some(format!(
                "Tag {} has value {:?}, which is not one of the allowed values [{}]",
                self.label,
                value,
                self.values.join(", ")
            ));
        }
        None
    }
}

/// Either an observed tag or a declared requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum Tag {
    Parsed(ParsedTag),
    Requirement(TagRequirement),
}

impl Tag {
    pub fn label(&self) -> &str {
        match self {
            Tag::Parsed(t) => &t.label,
            Tag::Requirement(r) => &r.label,
        }
    }

    pub fn as_parsed(&self) -> Option<&ParsedTag> {
        match self {
            Tag::Parsed(t) => Some(t),
            Tag::Requirement(_) => None,
        }
    }

    pub fn as_requirement(&self) -> Option<&TagRequirement> {
        match self {
            Tag::Parsed(_) => None,
            Tag::Requirement(r) => Some(r),
        }
    }
}

impl From<ParsedTag> for Tag {
    fn from(tag: ParsedTag) -> Self {
        Tag::Parsed(tag)
    }
}

impl From<TagRequirement> for Tag {
    fn from(req: TagRequirement) -> Self {
        Tag::Requirement(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsed_tag_equality_is_label_and_value() {
        let a = ParsedTag::new("Source-Organization", "APTrust");
        assert_eq!(a, ParsedTag::new("Source-Organization", "APTrust"));
        assert_ne!(a, ParsedTag::new("Source-Organization", "Other"));
        assert!(a.has_label("source-organization"));
    }

    #[test]
    fn test_requirement_from_bool() {
        let req = TagRequirement::new("Access", true, vec![]);
        assert!(req.is_required());
        let opt = TagRequirement::new("Access", false, vec![]);
        assert_eq!(opt.requirement, RequirementType::Optional);
    }

    #[test]
    fn test_check_value_against_allowed_set() {
        let req = TagRequirement::new(
            "Access",
            true,
            vec!["Consortia".into(), "Institution".into(), "Restricted".into()],
        );
        assert!(req.check_value("Institution").is_none());
        assert!(req.check_value("Public").is_some());
        assert!(req.check_value("").is_some());
    }

    #[test]
    fn test_check_value_empty_ok() {
        let req = TagRequirement::new("Internal-Sender-Description", true, vec![]).with_empty_ok(true);
        assert!(req.check_value("").is_none());

        let optional = TagRequirement::new("Contact-Name", false, vec![]);
        assert!(optional.check_value("  ").is_none());
    }

    #[test]
    fn test_tag_variants_are_distinct() {
        let parsed: Tag = ParsedTag::new("Bag-Count", "1 of 1").into();
        let req: Tag = TagRequirement::new("Bag-Count", false, vec![]).into();
        assert_eq!(parsed.label(), req.label());
        assert!(parsed.as_requirement().is_none());
        assert!(req.as_parsed().is_none());
        assert_ne!(parsed, req);
    }
}
