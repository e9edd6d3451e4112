//! Tag files (`bagit.txt`, `bag-info.txt` and friends).

use crate::tag::{ParsedTag, Tag};
use bagsmith_common::ParseError;

/// Why `label` would not read back as the same label, if it would not.
pub fn label_problem(label: &str) -> Option<&'static str> {
    if label.is_empty() {
        Some("tag label is empty")
    } else if label.contains(':') {
        Some("tag label must not contain ':'")
    } else if label.contains(['\r', '\n']) {
        Some("tag label must not contain a line break")
    } else if label.trim() != label {
        Some("tag label must not start or end with whitespace")
    } else {
        None
    }
}

/// The parsed contents of one tag file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagFile {
    /// Bag-relative path of the file.
    pub path: String,
    tags: Vec<ParsedTag>,
}

impl TagFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            tags: Vec::new(),
        }
    }

    /// Parse `Label: value` lines.
    ///
    /// Lines that start with a space or tab continue the previous value.
    pub fn parse(path: &str, content: &str) -> Result<TagFile, ParseError> {
        let mut file = TagFile::new(path);
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);

        for (i, line) in content.lines().enumerate() {
            let line_no = i + 1;
            if line.trim().is_empty() {
                continue;
            }
            if line.starts_with(' ') || line.starts_with('\t') {
                let Some(last) = file.tags.last_mut() else {
                    return Err(ParseError::new(
                        path,
                        line_no,
                        line,
                        "continuation line before any tag",
                    ));
                };
                let more = line.trim();
                if last.value.is_empty() {
                    last.value = more.to_string();
                } else {
                    last.value.push(' ');
                    last.value.push_str(more);
                }
                continue;
            }
            let Some((label, value)) = line.split_once(':') else {
                return Err(ParseError::new(path, line_no, line, "expected 'Label: value'"));
            };
            let label = label.trim();
            if label.is_empty() {
                return Err(ParseError::new(path, line_no, line, "empty tag label"));
            }
            file.tags.push(ParsedTag::new(label, value.trim()));
        }
        Ok(file)
    }

    pub fn push(&mut self, label: impl Into<String>, value: impl Into<String>) {
        self.tags.push(ParsedTag::new(label, value));
    }

    /// Every tag, in file order.
    pub fn parsed(&self) -> &[ParsedTag] {
        &self.tags
    }

    /// Every tag wrapped as [`Tag::Parsed`].
    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.tags.iter().cloned().map(Tag::Parsed)
    }

    /// All values for `label`, ignoring label case.
    pub fn values(&self, label: &str) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|t| t.has_label(label))
            .map(|t| t.value.as_str())
            .collect()
    }

    /// First value for `label`.
    pub fn first(&self, label: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.has_label(label))
            .map(|t| t.value.as_str())
    }

    pub fn contains(&self, label: &str) -> bool {
        self.tags.iter().any(|t| t.has_label(label))
    }

    /// Distinct labels in first-seen order.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = Vec::new();
        for tag in &self.tags {
            if !labels.iter().any(|l| l.eq_ignore_ascii_case(&tag.label)) {
                labels.push(&tag.label);
            }
        }
        labels
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Render as `Label: value` lines.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for tag in &self.tags {
            out.push_str(&tag.label);
            out.push_str(": ");
            out.push_str(&tag.value.replace(['\r', '\n'], " "));
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_bag_info() {
        let content = "Source-Organization: Test University\n\
                       Bag-Count: 1 of 1\n\
                       Internal-Sender-Description: A long\n  description that\n\tcontinues\n\
                       Keyword: one\n\
                       Keyword: two\n";
        let file = TagFile::parse("bag-info.txt", content).unwrap();
        assert_eq!(file.len(), 5);
        assert_eq!(file.first("source-organization"), Some("Test University"));
        assert_eq!(
            file.first("Internal-Sender-Description"),
            Some("A long description that continues")
        );
        assert_eq!(file.values("Keyword"), vec!["one", "two"]);
        assert_eq!(
            file.labels(),
            vec![
                "Source-Organization",
                "Bag-Count",
                "Internal-Sender-Description",
                "Keyword"
            ]
        );
    }

    #[test]
    fn test_value_may_contain_colons() {
        let file = TagFile::parse("bag-info.txt", "External-Identifier: urn:x:1\n").unwrap();
        assert_eq!(file.first("External-Identifier"), Some("urn:x:1"));
    }

    #[test]
    fn test_empty_value_then_continuation() {
        let file = TagFile::parse("bag-info.txt", "Title:\n  Folded title\n").unwrap();
        assert_eq!(file.first("Title"), Some("Folded title"));
    }

    #[test]
    fn test_malformed_lines() {
        let err = TagFile::parse("bag-info.txt", "Title: ok\nno colon here\n").unwrap_err();
        assert_eq!(err.line, 2);

        let err = TagFile::parse("bag-info.txt", "  dangling\n").unwrap_err();
        assert_eq!(err.line, 1);

        let err = TagFile::parse("bag-info.txt", ": nothing\n").unwrap_err();
        assert!(err.reason.contains("empty tag label"));
    }

    #[test]
    fn test_label_problem() {
        assert_eq!(label_problem("DC-Title"), None);
        assert_eq!(label_problem("Source Organization"), None);
        for label in ["", "DC:Title", " Title", "Title\t", "Two\nLines"] {
            let problem = label_problem(label);
            assert!(problem.is_some(), "{label:?}");

            let mut file = TagFile::new("bag-info.txt");
            file.push(label, "value");
            let reparsed = TagFile::parse("bag-info.txt", &file.render());
            assert!(reparsed.map_or(true, |f| !f.contains(label)), "{label:?}");
        }
    }

    #[test]
    fn test_render_and_reparse() {
        let mut file = TagFile::new("bagit.txt");
        file.push("BagIt-Version", "1.0");
        file.push("Tag-File-Character-Encoding", "UTF-8");
        let text = file.render();
        assert_eq!(text, "BagIt-Version: 1.0\nTag-File-Character-Encoding: UTF-8\n");
        assert_eq!(TagFile::parse("bagit.txt", &text).unwrap(), file);
        assert_eq!(file.tags().count(), 2);
    }
}
