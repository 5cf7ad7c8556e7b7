use assert_matches::assert_matches;

use internal_ratings_ingest::domain::RelationshipRecord;
use internal_ratings_ingest::error::IngestError;
use internal_ratings_ingest::normalize::normalize;

const A1: &str = r#"{"bdrId": "A1", "businessEntity": "BE-1", "nature": "parent",
    "status": "active", "reasons": [{"goldenBdrId": "G1", "label": "merge"},
    {"goldenBdrId": "G9", "label": "ignored"}]}"#;
const A2: &str = r#"{"bdrId": "A2", "businessEntity": "BE-2", "nature": "child",
    "status": "inactive", "reasons": []}"#;
const A3: &str = r#"{"bdrId": "A3", "businessEntity": "BE-3", "nature": "sister",
    "status": "active"}"#;

fn expected() -> Vec<RelationshipRecord> {
    vec![
        RelationshipRecord::new("A1", "BE-1", "parent", "active")
            .with_reason(Some("G1".to_string()), Some("merge".to_string())),
        RelationshipRecord::new("A2", "BE-2", "child", "inactive"),
        RelationshipRecord::new("A3", "BE-3", "sister", "active"),
    ]
}

#[test]
fn single_wrapper() {
    let text = format!(r#"{{"snapshotDate": "2024-09-11", "relationships": [{A1}, {A2}, {A3}]}}"#);
    assert_eq!(normalize(&text).unwrap(), expected());
}

#[test]
fn array_of_wrappers() {
    let text = format!(
        r#"[{{"relationships": [{A1}]}}, {{"relationships": [{A2}, {A3}], "page": 2}}]"#
    );
    assert_eq!(normalize(&text).unwrap(), expected());
}

#[test]
fn array_of_raw_records() {
    let text = format!("[{A1}, {A2}, {A3}]");
    assert_eq!(normalize(&text).unwrap(), expected());
}

#[test]
fn wrappers_keep_wrapper_then_array_order() {
    let text = r#"[{"relationships":[{"bdrId":"A1","businessEntity":"X","nature":"n","status":"s"}]},
                   {"relationships":[{"bdrId":"A2","businessEntity":"Y","nature":"n","status":"s"}]}]"#;
    let ids = normalize(text)
        .unwrap()
        .into_iter()
        .map(|record| record.bdr_id)
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["A1", "A2"]);
}

#[test]
fn empty_reasons_leave_optional_fields_unset() {
    let records = normalize(&format!(r#"{{"relationships": [{A2}]}}"#)).unwrap();
    assert_eq!(records[0].golden_bdr_id, None);
    assert_eq!(records[0].label, None);
}

#[test]
fn reason_without_label_sets_only_golden_id() {
    let text = r#"{"relationships": [{"bdrId": "A1", "reasons": [{"goldenBdrId": "G1"}]}]}"#;
    let records = normalize(text).unwrap();
    assert_eq!(records[0].golden_bdr_id.as_deref(), Some("G1"));
    assert_eq!(records[0].label, None);
}

#[test]
fn wrappers_without_relationships_contribute_nothing() {
    let text = format!(
        r#"[{{"relationships": []}}, {{"relationships": null}}, {{"relationships": [{A3}]}}]"#
    );
    let records = normalize(&text).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].bdr_id, "A3");

    assert!(normalize(r#"{"meta": {"count": 0}}"#).unwrap().is_empty());
    assert!(normalize("[]").unwrap().is_empty());
}

#[test]
fn unknown_fields_are_ignored() {
    let text = r#"{"relationships": [{"bdrId": "A1", "businessEntity": "BE",
        "nature": "n", "status": "s", "riskScore": 7, "extra": {"nested": true},
        "reasons": [{"goldenBdrId": "G1", "label": "l", "confidence": 0.9}]}],
        "generatedBy": "feed-v2"}"#;
    let records = normalize(text).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].label.as_deref(), Some("l"));
}

#[test]
fn invalid_json_is_malformed() {
    let err = normalize(r#"{"relationships": [ {"bdrId": "A1" "#).unwrap_err();
    assert_matches!(err, IngestError::MalformedPayload(_));

    let err = normalize(r#""just a string""#).unwrap_err();
    assert_matches!(err, IngestError::MalformedPayload(_));
}
