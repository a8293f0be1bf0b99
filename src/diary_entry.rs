use crate::backend::{Document, DocumentId, Fields, Identity, UserId};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire name of the owner field; queries filter on it.
pub const OWNER_FIELD: &str = "userId";
/// Wire name of the timestamp field; the feed orders by it.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// A single diary record owned by one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiaryEntry {
    pub id: DocumentId,
    pub content: String,
    pub tags: Vec<String>,
    /// Reset on every update, so after an edit this is the modification time.
    pub created_at: DateTime<Utc>,
    pub owner_id: UserId,
}

impl DiaryEntry {
    /// Tags rejoined the way the edit form shows them.
    pub fn joined_tags(&self) -> String {
        self.tags.join(", ")
    }
}

#[derive(Debug, Error)]
pub enum EntryDecodeError {
    #[error("document {id} has an invalid shape: {source}")]
    Shape {
        id: DocumentId,
        #[source]
        source: serde_json::Error,
    },

    #[error("document {id} has an invalid createdAt {value:?}: {source}")]
    Timestamp {
        id: DocumentId,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
    content: String,
    tags: Vec<String>,
    created_at: String,
    user_id: String,
}

impl TryFrom<Document> for DiaryEntry {
    type Error = EntryDecodeError;

    fn try_from(document: Document) -> Result<Self, Self::Error> {
        let Document { id, fields } = document;
        let stored: StoredEntry = match serde_json::from_value(serde_json::Value::Object(fields)) {
            Ok(stored) => stored,
            Err(source) => return Err(EntryDecodeError::Shape { id, source }),
        };
        let created_at = match DateTime::parse_from_rfc3339(&stored.created_at) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(source) => {
                return Err(EntryDecodeError::Timestamp {
                    id,
                    value: stored.created_at,
                    source,
                })
            }
        };

        Ok(DiaryEntry {
            id,
            content: stored.content,
            tags: stored.tags,
            created_at,
            owner_id: UserId::new(stored.user_id),
        })
    }
}

/// Fields of a new entry document.
pub fn new_entry_fields(
    owner: &Identity,
    content: &str,
    tags: &str,
    now: DateTime<Utc>,
) -> Fields {
    let stored = StoredEntry {
        content: content.to_string(),
        tags: parse_tags(tags),
        created_at: format_timestamp(now),
        user_id: owner.id.as_str().to_string(),
    };
    to_fields(&stored)
}

/// Fields overwritten by an update. The owner is never part of a patch.
pub fn entry_patch_fields(content: &str, tags: &str, now: DateTime<Utc>) -> Fields {
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct EntryPatch<'a> {
        content: &'a str,
        tags: Vec<String>,
        created_at: String,
    }

    to_fields(&EntryPatch {
        content,
        tags: parse_tags(tags),
        created_at: format_timestamp(now),
    })
}

fn to_fields<T: Serialize>(value: &T) -> Fields {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(map)) => map,
        // Plain structs of strings always serialize to an object.
        _ => Fields::new(),
    }
}

/// Splits comma-separated tag input and trims each piece. Empty input gives no tags.
pub fn parse_tags(input: &str) -> Vec<String> {
    if input.is_empty() {
        return Vec::new();
    }
    input.split(',').map(|s| s.trim().to_string()).collect()
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn doc(fields: serde_json::Value) -> Document {
        let serde_json::Value::Object(fields) = fields else {
            panic!("fields must be an object");
        };
        Document {
            id: DocumentId::new("doc-1"),
            fields,
        }
    }

    #[test]
    fn test_parse_tags_trims_pieces() {
        assert_eq!(parse_tags("a, b ,  c"), vec!["a", "b", "c"]);
        assert_eq!(parse_tags(" health "), vec!["health"]);
    }

    #[test]
    fn test_parse_tags_empty_input() {
        assert!(parse_tags("").is_empty());
        // Only the empty string is "no tags"; whitespace still yields one tag.
        assert_eq!(parse_tags("   "), vec![""]);
    }

    #[test]
    fn test_parse_tags_keeps_empty_pieces_from_stray_commas() {
        assert_eq!(parse_tags("a,"), vec!["a", ""]);
        assert_eq!(parse_tags(",a"), vec!["", "a"]);
    }

    #[test]
    fn test_format_timestamp_matches_iso_millis() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(format_timestamp(ts), "2024-05-01T10:00:00.000Z");
    }

    #[test]
    fn test_decode_valid_document() {
        let entry = DiaryEntry::try_from(doc(json!({
            "content": "went for a run",
            "tags": ["health"],
            "createdAt": "2024-05-01T10:00:00.000Z",
            "userId": "u1",
        })))
        .unwrap();

        assert_eq!(entry.id.as_str(), "doc-1");
        assert_eq!(entry.content, "went for a run");
        assert_eq!(entry.tags, vec!["health"]);
        assert_eq!(entry.owner_id.as_str(), "u1");
        assert_eq!(
            entry.created_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(entry.joined_tags(), "health");
    }

    #[test]
    fn test_decode_rejects_missing_owner() {
        let err = DiaryEntry::try_from(doc(json!({
            "content": "x",
            "tags": [],
            "createdAt": "2024-05-01T10:00:00.000Z",
        })))
        .unwrap_err();
        assert!(matches!(err, EntryDecodeError::Shape { .. }));
    }

    #[test]
    fn test_decode_rejects_bad_timestamp() {
        let err = DiaryEntry::try_from(doc(json!({
            "content": "x",
            "tags": [],
            "createdAt": "yesterday",
            "userId": "u1",
        })))
        .unwrap_err();
        assert!(matches!(err, EntryDecodeError::Timestamp { .. }));
    }

    #[test]
    fn test_new_entry_fields_shape() {
        let owner = Identity {
            id: UserId::new("u1"),
            email: "u1@example.com".to_string(),
        };
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let fields = new_entry_fields(&owner, "hello", "a, b", ts);

        assert_eq!(
            serde_json::Value::Object(fields),
            json!({
                "content": "hello",
                "tags": ["a", "b"],
                "createdAt": "2024-05-01T10:00:00.000Z",
                "userId": "u1",
            })
        );
    }

    #[test]
    fn test_patch_fields_leave_owner_out() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let fields = entry_patch_fields("edited", "", ts);

        assert!(!fields.contains_key(OWNER_FIELD));
        assert_eq!(fields["tags"], json!([]));
        assert_eq!(fields[CREATED_AT_FIELD], json!("2024-05-01T10:00:00.000Z"));
    }
}
