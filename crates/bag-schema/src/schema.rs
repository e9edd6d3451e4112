//! JSON schema for BagIt profile descriptions.
//!
//! The schema checks shape only. Algorithm names, requirement types and
//! manifest kinds are matched case-insensitively in `profile.rs`, so they
//! are plain strings here.

/// JSON Schema for a profile description.
pub const PROFILE_SCHEMA: &str = r#"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "$id": "https://bagsmith.dev/schemas/profile.json",
  "title": "Bagsmith BagIt Profile",
  "type": "object",
  "properties": {
    "name": { "type": "string" },
    "description": { "type": "string" },
    "acceptBagItVersion": {
      "type": "array",
      "items": { "type": "string", "pattern": "^\\d+\\.\\d+$" }
    },
    "manifestsRequired": { "type": "array", "items": { "type": "string" } },
    "manifestsForbidden": { "type": "array", "items": { "type": "string" } },
    "manifestAlgorithms": { "type": "array", "items": { "type": "string" } },
    "serialization": { "type": "string" },
    "serializationFormats": { "type": "array", "items": { "type": "string" } },
    "allowFetchTxt": { "type": "boolean" },
    "allowMiscTopLevelFiles": { "type": "boolean" },
    "allowMiscDirectories": { "type": "boolean" },
    "tagFilesOptional": { "type": "array", "items": { "type": "string" } },
    "tagFilesRequired": {
      "type": "object",
      "additionalProperties": {
        "type": "object",
        "additionalProperties": {
          "type": "object",
          "properties": {
            "required": { "type": "boolean" },
            "requirement": { "type": "string" },
            "values": { "type": "array", "items": { "type": "string" } },
            "default": { "type": "string" },
            "emptyOk": { "type": "boolean" }
          },
          "additionalProperties": false
        }
      }
    }
  }
}"#;

/// Get the profile schema as a parsed JSON value.
pub fn profile_schema() -> serde_json::Value {
    serde_json::from_str(PROFILE_SCHEMA).expect("Invalid profile schema")
}
