//! Inline-or-external representation of the large article fields.
//!
//! In the row a large field holds either its literal value or the marker
//! `[STORED_IN_STORAGE:<path>]`. The marker is decoded into [`Stored`] once,
//! when a row is deserialized, and encoded back only when columns are built
//! for a write.

use chrono::{SecondsFormat, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

const PLACEHOLDER_PREFIX: &str = "[STORED_IN_STORAGE:";
const PLACEHOLDER_SUFFIX: &str = "]";

/// The four article fields that may live outside the row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LargeField {
    Content,
    Sections,
    MediaItems,
    Sources,
}

impl LargeField {
    /// Processing order on the write path
    pub const ALL: [LargeField; 4] = [
        LargeField::Content,
        LargeField::Sections,
        LargeField::MediaItems,
        LargeField::Sources,
    ];

    /// Column name, also the key inside the blob envelope
    pub fn name(self) -> &'static str {
        match self {
            LargeField::Content => "content",
            LargeField::Sections => "sections",
            LargeField::MediaItems => "media_items",
            LargeField::Sources => "sources",
        }
    }

    pub fn storage_path_column(self) -> &'static str {
        match self {
            LargeField::Content => "content_storage_path",
            LargeField::Sections => "sections_storage_path",
            LargeField::MediaItems => "media_items_storage_path",
            LargeField::Sources => "sources_storage_path",
        }
    }

    /// `articles/<id>/<field>.json`
    pub fn blob_path(self, article_id: Uuid) -> String {
        format!("articles/{}/{}.json", article_id, self.name())
    }
}

impl std::fmt::Display for LargeField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub fn placeholder(path: &str) -> String {
    format!("{}{}{}", PLACEHOLDER_PREFIX, path, PLACEHOLDER_SUFFIX)
}

/// Extract the storage path from an exact placeholder string
pub fn parse_placeholder(value: &str) -> Option<&str> {
    let path = value
        .strip_prefix(PLACEHOLDER_PREFIX)?
        .strip_suffix(PLACEHOLDER_SUFFIX)?;
    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}

/// A large field value as persisted in the row
#[derive(Debug, Clone, PartialEq)]
pub enum Stored<T> {
    Inline(T),
    /// Complete value lives in one blob at this path
    External(String),
}

impl<T> Stored<T> {
    pub fn storage_path(&self) -> Option<&str> {
        match self {
            Stored::Inline(_) => None,
            Stored::External(path) => Some(path),
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Stored::External(_))
    }
}

impl<T: Serialize> Serialize for Stored<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Stored::Inline(value) => value.serialize(serializer),
            Stored::External(path) => serializer.serialize_str(&placeholder(path)),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Stored<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if let Value::String(s) = &value {
            if let Some(path) = parse_placeholder(s) {
                return Ok(Stored::External(path.to_string()));
            }
        }
        serde_json::from_value(value)
            .map(Stored::Inline)
            .map_err(D::Error::custom)
    }
}

/// Errors decoding a blob envelope
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("Blob is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Blob has no '{0}' key")]
    MissingField(&'static str),
}

/// `{"<field>": <value>, "timestamp": "<ISO 8601>"}`
pub fn encode_envelope<T: Serialize>(field: LargeField, value: &T) -> serde_json::Result<Vec<u8>> {
    let mut envelope = Map::new();
    envelope.insert(field.name().to_string(), serde_json::to_value(value)?);
    envelope.insert(
        "timestamp".to_string(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    serde_json::to_vec(&envelope)
}

pub fn decode_envelope<T: DeserializeOwned>(
    field: LargeField,
    bytes: &[u8],
) -> Result<T, EnvelopeError> {
    let mut envelope: Map<String, Value> = serde_json::from_slice(bytes)?;
    let value = envelope
        .remove(field.name())
        .ok_or(EnvelopeError::MissingField(field.name()))?;
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn placeholder_is_exact() {
        assert_eq!(
            placeholder("articles/1/content.json"),
            "[STORED_IN_STORAGE:articles/1/content.json]"
        );
        assert_eq!(
            parse_placeholder("[STORED_IN_STORAGE:articles/1/content.json]"),
            Some("articles/1/content.json")
        );
        assert_eq!(parse_placeholder(" [STORED_IN_STORAGE:a]"), None);
        assert_eq!(parse_placeholder("[STORED_IN_STORAGE:a] "), None);
        assert_eq!(parse_placeholder("[STORED_IN_STORAGE:]"), None);
        assert_eq!(parse_placeholder("plain text"), None);
    }

    #[test]
    fn blob_paths_follow_field_names() {
        let id = Uuid::nil();
        assert_eq!(
            LargeField::MediaItems.blob_path(id),
            "articles/00000000-0000-0000-0000-000000000000/media_items.json"
        );
        assert_eq!(LargeField::Sources.storage_path_column(), "sources_storage_path");
    }

    #[test]
    fn decodes_marker_into_external() {
        let content: Stored<String> =
            serde_json::from_value(json!("[STORED_IN_STORAGE:articles/x/content.json]")).unwrap();
        assert_eq!(content, Stored::External("articles/x/content.json".to_string()));

        let sections: Stored<Vec<Value>> =
            serde_json::from_value(json!("[STORED_IN_STORAGE:articles/x/sections.json]")).unwrap();
        assert!(sections.is_external());
    }

    #[test]
    fn decodes_literal_values_inline() {
        let content: Stored<String> = serde_json::from_value(json!("hello")).unwrap();
        assert_eq!(content, Stored::Inline("hello".to_string()));

        let media: Stored<Vec<Value>> = serde_json::from_value(json!([{"url": "u"}])).unwrap();
        assert_eq!(media, Stored::Inline(vec![json!({"url": "u"})]));

        // A non-marker string is not a list
        assert!(serde_json::from_value::<Stored<Vec<Value>>>(json!("oops")).is_err());
    }

    #[test]
    fn encodes_external_as_marker() {
        let v = serde_json::to_value(Stored::<Vec<Value>>::External("p".to_string())).unwrap();
        assert_eq!(v, json!("[STORED_IN_STORAGE:p]"));
    }

    #[test]
    fn envelope_carries_value_and_timestamp() {
        let bytes = encode_envelope(LargeField::Sources, &vec![json!({"title": "t"})]).unwrap();
        let raw: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(raw["timestamp"].as_str().unwrap().ends_with('Z'));

        let sources: Vec<Value> = decode_envelope(LargeField::Sources, &bytes).unwrap();
        assert_eq!(sources, vec![json!({"title": "t"})]);

        assert!(matches!(
            decode_envelope::<String>(LargeField::Content, &bytes),
            Err(EnvelopeError::MissingField("content"))
        ));
    }
}
