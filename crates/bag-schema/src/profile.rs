//! BagIt profile model.
//!
//! A profile is loaded once with [`Profile::load`] and then shared
//! read-only across any number of validation runs.

use crate::schema;
use crate::tag::{Tag, TagRequirement};
use crate::tagfile::label_problem;
use bagsmith_common::{
    DigestAlgorithm, Error, ManifestKind, ProfileError, ProfileErrors, RequirementType, Result,
    SerializationFormat,
};
use jsonschema::JSONSchema;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use tracing::debug;

/// Algorithm used when a profile names none.
pub const DEFAULT_ALGORITHM: DigestAlgorithm = DigestAlgorithm::Sha256;

/// Requirements for the tags of one tag file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFileRequirements {
    /// Bag-relative path, e.g. `bag-info.txt`.
    pub path: String,
    /// Declared tags, in profile order.
    pub tags: Vec<TagRequirement>,
}

impl TagFileRequirements {
    /// Find the requirement for `label`, ignoring case.
    pub fn tag(&self, label: &str) -> Option<&TagRequirement> {
        self.tags
            .iter()
            .find(|t| t.label.eq_ignore_ascii_case(label))
    }
}

/// A parsed BagIt profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub description: String,
    /// Accepted `BagIt-Version` values. Empty accepts any version.
    pub accept_bagit_version: Vec<String>,
    pub manifests_required: Vec<ManifestKind>,
    pub manifests_forbidden: Vec<ManifestKind>,
    /// Algorithms a builder must produce manifests for.
    pub manifest_algorithms: Vec<DigestAlgorithm>,
    pub serialization: RequirementType,
    /// Accepted serialized formats. Empty accepts any.
    pub serialization_formats: Vec<SerializationFormat>,
    pub allow_fetch_txt: bool,
    pub allow_misc_top_level_files: bool,
    pub allow_misc_directories: bool,
    /// Tag files whose absence is not an error.
    pub tag_files_optional: Vec<String>,
    pub tag_files: Vec<TagFileRequirements>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            accept_bagit_version: Vec::new(),
            manifests_required: vec![ManifestKind::Payload],
            manifests_forbidden: Vec::new(),
            manifest_algorithms: vec![DEFAULT_ALGORITHM],
            serialization: RequirementType::Optional,
            serialization_formats: Vec::new(),
            allow_fetch_txt: false,
            allow_misc_top_level_files: true,
            allow_misc_directories: true,
            tag_files_optional: Vec::new(),
            tag_files: Vec::new(),
        }
    }
}

impl Profile {
    /// Parse a JSON profile description.
    ///
    /// Every problem found is returned at once in `Error::Profile`.
    pub fn load(bytes: &[u8]) -> Result<Profile> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| {
            ProfileErrors(vec![ProfileError::new("", format!("not valid JSON: {e}"))])
        })?;

        let shape_errors = check_shape(&value);
        if !shape_errors.is_empty() {
            return Err(Error::Profile(ProfileErrors(shape_errors)));
        }

        // Parse the raw bytes again so duplicate tag keys survive.
        let raw: RawProfile = serde_json::from_slice(bytes).map_err(|e| {
            ProfileErrors(vec![ProfileError::new("", format!("malformed profile: {e}"))])
        })?;

        let mut errors = Vec::new();
        let profile = raw.into_profile(&mut errors);
        errors.extend(profile.validate());
        if !errors.is_empty() {
            return Err(Error::Profile(ProfileErrors(errors)));
        }

        debug!(
            "Loaded profile {:?}: {} tag file(s), algorithms {:?}",
            profile.name,
            profile.tag_files.len(),
            profile.manifest_algorithms
        );
        Ok(profile)
    }

    /// Check internal consistency without looking at any bag.
    pub fn validate(&self) -> Vec<ProfileError> {
        let mut errors = Vec::new();

        for kind in &self.manifests_required {
            if self.manifests_forbidden.contains(kind) {
                errors.push(ProfileError::new(
                    "manifestsRequired",
                    format!("{kind} manifests are both required and forbidden"),
                ));
            }
        }

        if self.manifest_algorithms.is_empty() && !self.manifests_required.is_empty() {
            errors.push(ProfileError::new(
                "manifestAlgorithms",
                "manifests are required but no algorithm is named",
            ));
        }

        let mut algorithms = HashSet::new();
        for algorithm in &self.manifest_algorithms {
            if !algorithms.insert(algorithm) {
                errors.push(ProfileError::new(
                    "manifestAlgorithms",
                    format!("algorithm {algorithm} is listed twice"),
                ));
            }
        }

        if self.serialization == RequirementType::Forbidden
            && !self.serialization_formats.is_empty()
        {
            errors.push(ProfileError::new(
                "serializationFormats",
                "serialization is forbidden but formats are listed",
            ));
        }

        for file in &self.tag_files {
            let mut seen: HashMap<String, &TagRequirement> = HashMap::new();
            for tag in &file.tags {
                let location = format!("tagFilesRequired/{}/{}", file.path, tag.label);
                if let Some(problem) = label_problem(&tag.label) {
                    errors.push(ProfileError::new(location, problem));
                    continue;
                }
                if let Some(previous) = seen.get(&tag.label.to_lowercase()) {
                    let clash = [previous.requirement, tag.requirement];
                    if clash.contains(&RequirementType::Required)
                        && clash.contains(&RequirementType::Forbidden)
                    {
                        errors.push(ProfileError::new(
                            location,
                            "tag is declared both required and forbidden",
                        ));
                    } else {
                        errors.push(ProfileError::new(location, "tag is declared twice"));
                    }
                    continue;
                }
                seen.insert(tag.label.to_lowercase(), tag);

                if let Some(default) = &tag.default_value {
                    if tag.is_forbidden() {
                        errors.push(ProfileError::new(
                            location,
                            "forbidden tag must not have a default value",
                        ));
                    } else if !tag.allows(default) {
                        errors.push(ProfileError::new(
                            location,
                            "the default value must be one of the allowed values",
                        ));
                    }
                }
            }
        }

        errors
    }

    pub fn requires_manifest(&self, kind: ManifestKind) -> bool {
        self.manifests_required.contains(&kind)
    }

    pub fn forbids_manifest(&self, kind: ManifestKind) -> bool {
        self.manifests_forbidden.contains(&kind)
    }

    pub fn tag_file(&self, path: &str) -> Option<&TagFileRequirements> {
        self.tag_files.iter().find(|f| f.path == path)
    }

    pub fn is_tag_file_optional(&self, path: &str) -> bool {
        self.tag_files_optional.iter().any(|p| p == path)
    }

    /// Paths of every tag file the profile mentions.
    pub fn tag_file_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tag_files.iter().map(|f| f.path.as_str()).collect();
        for path in &self.tag_files_optional {
            if !names.contains(&path.as_str()) {
                names.push(path);
            }
        }
        names
    }

    pub fn accepts_version(&self, version: &str) -> bool {
        self.accept_bagit_version.is_empty()
            || self.accept_bagit_version.iter().any(|v| v == version)
    }

    /// Whether a bag laid out as `format` satisfies the serialization rules.
    pub fn accepts_format(&self, format: SerializationFormat) -> std::result::Result<(), String> {
        match (self.serialization, format.is_serialized()) {
            (RequirementType::Required, false) => {
                Err("profile requires a serialized bag".to_string())
            }
            (RequirementType::Forbidden, true) => {
                Err(format!("profile forbids serialized bags, found {format}"))
            }
            (_, true)
                if !self.serialization_formats.is_empty()
                    && !self.serialization_formats.contains(&format) =>
            {
                Err(format!("serialization format {format} is not accepted"))
            }
            _ => Ok(()),
        }
    }

    /// Every declared tag requirement, with the tag file it belongs to.
    pub fn tags(&self) -> impl Iterator<Item = (&str, Tag)> + '_ {
        self.tag_files.iter().flat_map(|file| {
            file.tags
                .iter()
                .map(move |t| (file.path.as_str(), Tag::Requirement(t.clone())))
        })
    }

    /// Serialize back to the JSON description format.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&RawProfile::from_profile(self))?)
    }
}

fn check_shape(value: &Value) -> Vec<ProfileError> {
    let schema_value = schema::profile_schema();
    let compiled = match JSONSchema::compile(&schema_value) {
        Ok(compiled) => compiled,
        Err(e) => return vec![ProfileError::new("", format!("schema error: {e}"))],
    };

    let mut errors = Vec::new();
    if let Err(violations) = compiled.validate(value) {
        for violation in violations {
            errors.push(ProfileError::new(
                violation.instance_path.to_string(),
                violation.to_string(),
            ));
        }
    }
    errors
}

/// Map entries kept in document order, duplicates included.
#[derive(Debug, Clone, Default)]
struct OrderedPairs<V>(Vec<(String, V)>);

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedPairs<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct PairsVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for PairsVisitor<V> {
            type Value = OrderedPairs<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut pairs = Vec::new();
                while let Some((key, value)) = map.next_entry::<String, V>()? {
                    pairs.push((key, value));
                }
                Ok(OrderedPairs(pairs))
            }
        }

        deserializer.deserialize_map(PairsVisitor(PhantomData))
    }
}

impl<V: Serialize> Serialize for OrderedPairs<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct RawProfile {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default, rename = "acceptBagItVersion")]
    accept_bagit_version: Vec<String>,
    #[serde(default)]
    manifests_required: Vec<String>,
    #[serde(default)]
    manifests_forbidden: Vec<String>,
    #[serde(default)]
    manifest_algorithms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    serialization: Option<String>,
    #[serde(default)]
    serialization_formats: Vec<String>,
    #[serde(default)]
    allow_fetch_txt: bool,
    #[serde(default = "default_true")]
    allow_misc_top_level_files: bool,
    #[serde(default = "default_true")]
    allow_misc_directories: bool,
    #[serde(default)]
    tag_files_optional: Vec<String>,
    #[serde(default)]
    tag_files_required: OrderedPairs<OrderedPairs<RawTagRequirement>>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct RawTagRequirement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    requirement: Option<String>,
    #[serde(default)]
    values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    empty_ok: Option<bool>,
}

/// Parse each name, recording the ones `T::from_str` rejects.
fn parse_all<T: FromStr>(
    names: &[String],
    location: &str,
    what: &str,
    errors: &mut Vec<ProfileError>,
) -> Vec<T> {
    let mut parsed = Vec::new();
    for name in names {
        match name.parse::<T>() {
            Ok(v) => parsed.push(v),
            Err(_) => errors.push(ProfileError::new(
                location,
                format!("{what} {name:?} is not valid"),
            )),
        }
    }
    parsed
}

impl RawProfile {
    fn into_profile(self, errors: &mut Vec<ProfileError>) -> Profile {
        let manifests_required =
            parse_all(&self.manifests_required, "manifestsRequired", "manifest kind", errors);
        let manifests_forbidden = parse_all(
            &self.manifests_forbidden,
            "manifestsForbidden",
            "manifest kind",
            errors,
        );
        let mut manifest_algorithms = parse_all(
            &self.manifest_algorithms,
            "manifestAlgorithms",
            "algorithm",
            errors,
        );
        if self.manifest_algorithms.is_empty() {
            manifest_algorithms.push(DEFAULT_ALGORITHM);
        }
        let mut seen = HashSet::new();
        manifest_algorithms.retain(|a| seen.insert(*a));

        let serialization = match &self.serialization {
            None => RequirementType::Optional,
            Some(s) => s.parse().unwrap_or_else(|_| {
                errors.push(ProfileError::new(
                    "serialization",
                    format!("requirement type {s:?} is not valid"),
                ));
                RequirementType::Optional
            }),
        };
        let serialization_formats = parse_all(
            &self.serialization_formats,
            "serializationFormats",
            "serialization format",
            errors,
        );

        let mut tag_files: Vec<TagFileRequirements> = Vec::new();
        for (path, tags) in self.tag_files_required.0 {
            if tag_files.iter().any(|f| f.path == path) {
                errors.push(ProfileError::new(
                    format!("tagFilesRequired/{path}"),
                    "tag file is declared twice",
                ));
                continue;
            }
            let mut file = TagFileRequirements {
                path: path.clone(),
                tags: Vec::new(),
            };
            for (label, raw) in tags.0 {
                let location = format!("tagFilesRequired/{path}/{label}");
                if file.tags.iter().any(|t| t.label == label) {
                    errors.push(ProfileError::new(location, "tag is declared twice"));
                    continue;
                }
                if let Some(req) = raw.into_requirement(&label, &location, errors) {
                    file.tags.push(req);
                }
            }
            tag_files.push(file);
        }

        Profile {
            name: self.name,
            description: self.description,
            accept_bagit_version: self.accept_bagit_version,
            manifests_required,
            manifests_forbidden,
            manifest_algorithms,
            serialization,
            serialization_formats,
            allow_fetch_txt: self.allow_fetch_txt,
            allow_misc_top_level_files: self.allow_misc_top_level_files,
            allow_misc_directories: self.allow_misc_directories,
            tag_files_optional: self.tag_files_optional,
            tag_files,
        }
    }

    fn from_profile(profile: &Profile) -> Self {
        let tag_files_required = profile
            .tag_files
            .iter()
            .map(|file| {
                let tags = file
                    .tags
                    .iter()
                    .map(|t| {
                        let raw = RawTagRequirement {
                            required: None,
                            requirement: Some(t.requirement.to_string()),
                            values: t.values.clone(),
                            default: t.default_value.clone(),
                            empty_ok: t.empty_ok.then_some(true),
                        };
                        (t.label.clone(), raw)
                    })
                    .collect();
                (file.path.clone(), OrderedPairs(tags))
            })
            .collect();

        Self {
            name: profile.name.clone(),
            description: profile.description.clone(),
            accept_bagit_version: profile.accept_bagit_version.clone(),
            manifests_required: profile
                .manifests_required
                .iter()
                .map(|k| k.to_string())
                .collect(),
            manifests_forbidden: profile
                .manifests_forbidden
                .iter()
                .map(|k| k.to_string())
                .collect(),
            manifest_algorithms: profile
                .manifest_algorithms
                .iter()
                .map(|a| a.to_string())
                .collect(),
            serialization: Some(profile.serialization.to_string()),
            serialization_formats: profile
                .serialization_formats
                .iter()
                .map(|f| f.to_string())
                .collect(),
            allow_fetch_txt: profile.allow_fetch_txt,
            allow_misc_top_level_files: profile.allow_misc_top_level_files,
            allow_misc_directories: profile.allow_misc_directories,
            tag_files_optional: profile.tag_files_optional.clone(),
            tag_files_required: OrderedPairs(tag_files_required),
        }
    }
}

impl RawTagRequirement {
    fn into_requirement(
        self,
        label: &str,
        location: &str,
        errors: &mut Vec<ProfileError>,
    ) -> Option<TagRequirement> {
        let requirement = match (&self.requirement, self.required) {
            (Some(name), required) => {
                let parsed: RequirementType = match name.parse() {
                    Ok(r) => r,
                    Err(_) => {
                        errors.push(ProfileError::new(
                            location,
                            format!("requirement type {name:?} is not valid"),
                        ));
                        return None;
                    }
                };
                match (parsed, required) {
                    (RequirementType::Forbidden, Some(true)) => {
                        errors.push(ProfileError::new(
                            location,
                            "tag is declared both required and forbidden",
                        ));
                        return None;
                    }
                    (RequirementType::Required, Some(false)) => {
                        errors.push(ProfileError::new(
                            location,
                            "tag is declared required with required: false",
                        ));
                        return None;
                    }
                    _ => parsed,
                }
            }
            (None, Some(true)) => RequirementType::Required,
            (None, _) => RequirementType::Optional,
        };

        Some(TagRequirement {
            label: label.to_string(),
            requirement,
            values: self.values,
            default_value: self.default,
            empty_ok: self.empty_ok.unwrap_or(false),
        })
    }
}
