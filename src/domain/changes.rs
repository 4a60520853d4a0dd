//! Change-feed batches
//!
//! The `_changes` endpoint returns an envelope of `{results, last_seq}`. The
//! sequence is a number on CouchDB and a string on Sync Gateway, so it is
//! always coerced to a string cursor here.

use serde::{Deserialize, Deserializer};

/// Raw `_changes` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangesEnvelope {
    #[serde(default)]
    pub results: Vec<ChangeRow>,
    #[serde(default, deserialize_with = "deserialize_sequence")]
    pub last_seq: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeRow {
    #[serde(default, deserialize_with = "deserialize_sequence")]
    pub seq: Option<String>,
    pub id: String,
    #[serde(default)]
    pub changes: Vec<RevisionRef>,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RevisionRef {
    pub rev: String,
}

pub(crate) fn deserialize_sequence<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Ok(Some(other.to_string())),
    }
}

/// A document reported as changed, with its latest revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEntry {
    pub document_id: String,
    pub revision: String,
}

/// One batch read from the change feed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeNotification {
    /// Cursor the batch was read from
    pub since: String,
    /// Sequence marker reported by the server, if any
    pub last_sequence: Option<String>,
    pub entries: Vec<ChangeEntry>,
}

impl ChangeNotification {
    pub fn from_envelope(since: impl Into<String>, envelope: ChangesEnvelope) -> Self {
        let entries = envelope
            .results
            .into_iter()
            .filter_map(|row| {
                let revision = row.changes.into_iter().next()?.rev;
                Some(ChangeEntry {
                    document_id: row.id,
                    revision,
                })
            })
            .collect();

        Self {
            since: since.into(),
            last_sequence: envelope.last_seq,
            entries,
        }
    }

    /// Cursor to read the next batch from.
    ///
    /// Heartbeat batches omit `last_seq` or send an empty one; the previous
    /// cursor is kept in that case.
    pub fn next_cursor(&self) -> String {
        match self.last_sequence.as_deref().map(str::trim) {
            Some(seq) if !seq.is_empty() => seq.to_string(),
            _ => self.since.clone(),
        }
    }

    /// Latest revision reported for a document in this batch
    pub fn latest_revision_of(&self, document_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.document_id == document_id)
            .map(|e| e.revision.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold a later batch into this one, keeping the earlier `since`
    pub fn merge(&mut self, newer: ChangeNotification) {
        let cursor = newer.next_cursor();
        self.entries.extend(newer.entries);
        if !cursor.trim().is_empty() {
            self.last_sequence = Some(cursor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_and_string_sequences() {
        let couch = r#"{"results":[{"seq":5,"id":"game:checkers","changes":[{"rev":"3-a"}]}],"last_seq":5}"#;
        let envelope: ChangesEnvelope = serde_json::from_str(couch).unwrap();
        assert_eq!(envelope.last_seq.as_deref(), Some("5"));
        assert_eq!(envelope.results[0].seq.as_deref(), Some("5"));

        let gateway = r#"{"results":[{"seq":"2:17","id":"vote:1","changes":[{"rev":"1-b"}]}],"last_seq":"2:17"}"#;
        let envelope: ChangesEnvelope = serde_json::from_str(gateway).unwrap();
        assert_eq!(envelope.last_seq.as_deref(), Some("2:17"));
    }

    #[test]
    fn test_heartbeat_keeps_cursor() {
        let envelope: ChangesEnvelope = serde_json::from_str(r#"{"results":[]}"#).unwrap();
        let batch = ChangeNotification::from_envelope("42", envelope);
        assert!(batch.is_empty());
        assert_eq!(batch.next_cursor(), "42");

        let envelope: ChangesEnvelope =
            serde_json::from_str(r#"{"results":[],"last_seq":""}"#).unwrap();
        let batch = ChangeNotification::from_envelope("42", envelope);
        assert_eq!(batch.next_cursor(), "42");

        let envelope: ChangesEnvelope =
            serde_json::from_str(r#"{"results":[],"last_seq":43}"#).unwrap();
        let batch = ChangeNotification::from_envelope("42", envelope);
        assert_eq!(batch.next_cursor(), "43");
    }

    #[test]
    fn test_latest_revision_prefers_last_entry() {
        let json = r#"{"results":[
            {"seq":1,"id":"game:checkers","changes":[{"rev":"1-a"}]},
            {"seq":2,"id":"user:9","changes":[{"rev":"1-u"}]},
            {"seq":3,"id":"game:checkers","changes":[{"rev":"2-b"}]},
            {"seq":4,"id":"vote:9","changes":[]}
        ],"last_seq":4}"#;
        let envelope: ChangesEnvelope = serde_json::from_str(json).unwrap();
        let batch = ChangeNotification::from_envelope("0", envelope);

        // rows without a revision are dropped
        assert_eq!(batch.entries.len(), 3);
        assert_eq!(batch.latest_revision_of("game:checkers"), Some("2-b"));
        assert_eq!(batch.latest_revision_of("vote:9"), None);
    }

    #[test]
    fn test_merge_keeps_newest_cursor() {
        let mut first = ChangeNotification {
            since: "0".into(),
            last_sequence: Some("3".into()),
            entries: vec![ChangeEntry {
                document_id: "game:checkers".into(),
                revision: "1-a".into(),
            }],
        };
        let second = ChangeNotification {
            since: "3".into(),
            last_sequence: Some("5".into()),
            entries: vec![ChangeEntry {
                document_id: "game:checkers".into(),
                revision: "2-b".into(),
            }],
        };

        first.merge(second);
        assert_eq!(first.since, "0");
        assert_eq!(first.next_cursor(), "5");
        assert_eq!(first.latest_revision_of("game:checkers"), Some("2-b"));
    }
}
