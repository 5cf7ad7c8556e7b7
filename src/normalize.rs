//! Flattens the feed's JSON into one ordered list of relationship records.
//!
//! The upstream service has shipped three shapes for the same data:
//!
//! - a single wrapper object carrying a `relationships` array,
//! - an array of such wrappers,
//! - an array of bare relationship objects.
//!
//! The payload is parsed into a [`serde_json::Value`] first and the root kind
//! decides which shape handler runs. Unknown fields are ignored everywhere.

use serde_json::Value;

use crate::domain::RelationshipRecord;
use crate::error::IngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Copy `goldenBdrId` and `label` from the first entry of `reasons`.
    pub enrich_reasons: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            enrich_reasons: true,
        }
    }
}

/// Shape of a single element at the top level of the payload.
enum Node<'a> {
    Wrapper(&'a Value),
    Raw(&'a Value),
}

pub fn normalize(text: &str) -> Result<Vec<RelationshipRecord>, IngestError> {
    normalize_with(text, NormalizeOptions::default())
}

pub fn normalize_with(
    text: &str,
    options: NormalizeOptions,
) -> Result<Vec<RelationshipRecord>, IngestError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let root: Value =
        serde_json::from_str(text).map_err(|err| IngestError::MalformedPayload(err.to_string()))?;
    normalize_value(&root, options)
}

pub fn normalize_value(
    root: &Value,
    options: NormalizeOptions,
) -> Result<Vec<RelationshipRecord>, IngestError> {
    let nodes = match root {
        Value::Array(items) => items.iter().map(classify).collect::<Vec<_>>(),
        Value::Object(_) => vec![Node::Wrapper(root)],
        other => {
            return Err(IngestError::MalformedPayload(format!(
                "expected an object or array at the top level, found {}",
                kind_name(other)
            )));
        }
    };

    let mut records = Vec::new();
    for node in nodes {
        match node {
            Node::Wrapper(wrapper) => {
                let Some(relationships) = wrapper.get("relationships").and_then(|v| v.as_array())
                else {
                    continue;
                };
                for raw in relationships {
                    if let Some(record) = extract_record(raw, options) {
                        records.push(record);
                    }
                }
            }
            Node::Raw(raw) => {
                if let Some(record) = extract_record(raw, options) {
                    records.push(record);
                }
            }
        }
    }
    Ok(records)
}

fn classify(item: &Value) -> Node<'_> {
    if item.get("relationships").is_some() {
        Node::Wrapper(item)
    } else {
        Node::Raw(item)
    }
}

pub fn extract_record(raw: &Value, options: NormalizeOptions) -> Option<RelationshipRecord> {
    if !raw.is_object() {
        tracing::warn!(
            "skipping relationship entry that is a {}, not an object",
            kind_name(raw)
        );
        return None;
    }

    let record = RelationshipRecord::new(
        string_field(raw, "bdrId"),
        string_field(raw, "businessEntity"),
        string_field(raw, "nature"),
        string_field(raw, "status"),
    );
    if !options.enrich_reasons {
        return Some(record);
    }

    let first_reason = raw
        .get("reasons")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first());
    let golden_bdr_id = first_reason.and_then(|reason| optional_string(reason, "goldenBdrId"));
    let label = first_reason.and_then(|reason| optional_string(reason, "label"));
    Some(record.with_reason(golden_bdr_id, label))
}

fn string_field(raw: &Value, key: &str) -> String {
    optional_string(raw, key).unwrap_or_default()
}

// Identifiers sometimes arrive as numbers; keep their textual form.
fn optional_string(raw: &Value, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(value) => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        Value::Bool(value) => Some(value.to_string()),
        _ => None,
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn numeric_ids_keep_their_text() {
        let records = normalize(r#"[{"bdrId": 1042, "nature": "parent"}]"#).unwrap();
        assert_eq!(records[0].bdr_id, "1042");
        assert_eq!(records[0].business_entity, "");
    }

    #[test]
    fn scalar_root_is_malformed() {
        let err = normalize("42").unwrap_err();
        assert_matches!(err, IngestError::MalformedPayload(_));
    }

    #[test]
    fn blank_text_is_an_empty_page() {
        assert!(normalize("  \n").unwrap().is_empty());
    }

    #[test]
    fn non_object_entries_are_skipped() {
        let records =
            normalize(r#"{"relationships": [null, "x", {"bdrId": "A1"}]}"#).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].bdr_id, "A1");
    }

    #[test]
    fn enrichment_can_be_disabled() {
        let text = r#"{"relationships": [{"bdrId": "A1",
            "reasons": [{"goldenBdrId": "G1", "label": "merge"}]}]}"#;
        let records = normalize_with(
            text,
            NormalizeOptions {
                enrich_reasons: false,
            },
        )
        .unwrap();
        assert_eq!(records[0].golden_bdr_id, None);
        assert_eq!(records[0].label, None);
    }
}
