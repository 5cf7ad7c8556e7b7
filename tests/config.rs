use std::time::Duration;

use assert_matches::assert_matches;

use internal_ratings_ingest::config::{Config, ConfigLoader};
use internal_ratings_ingest::error::IngestError;

fn parse(json: &str) -> Config {
    serde_json::from_str(json).unwrap()
}

#[test]
fn parse_full_config() {
    let config = parse(
        r#"{
            "endpoint": " https://ratings.example.com/v1/relationships ",
            "snapshot_date": "2024-09-11",
            "token": "secret",
            "timeout_secs": 60,
            "max_attempts": 5,
            "paginate": true,
            "page_size": 500,
            "batch_size": 2000,
            "workers": 8,
            "log_interval": 10000,
            "enrich_reasons": false,
            "database": "data/ratings.db",
            "table": "rating_events",
            "alert_webhook": "https://hooks.example.com/ingest"
        }"#,
    );

    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(
        resolved.feed.endpoint,
        "https://ratings.example.com/v1/relationships"
    );
    assert_eq!(
        resolved.feed.snapshot_date.unwrap().to_string(),
        "2024-09-11"
    );
    assert_eq!(resolved.feed.timeout, Duration::from_secs(60));
    assert_eq!(resolved.feed.retry.max_attempts, 5);
    assert!(resolved.feed.paginate);
    assert_eq!(resolved.feed.pagination.page_size, 500);
    assert_eq!(resolved.persist.batch_size, 2000);
    assert_eq!(resolved.persist.workers, 8);
    assert!(!resolved.normalize.enrich_reasons);
    assert_eq!(resolved.database.as_str(), "data/ratings.db");
    assert_eq!(resolved.table, "rating_events");
    assert_eq!(
        resolved.require_network().unwrap(),
        ("https://ratings.example.com/v1/relationships", "secret")
    );
}

#[test]
fn unknown_config_keys_are_ignored() {
    let resolved = ConfigLoader::resolve_config(parse(r#"{"legacy": 1}"#)).unwrap();
    assert_eq!(resolved.persist.batch_size, 10_000);
}

#[test]
fn zero_batch_size_is_rejected() {
    let err = ConfigLoader::resolve_config(parse(r#"{"batch_size": 0}"#)).unwrap_err();
    assert_matches!(err, IngestError::InvalidConfig(_));
}

#[test]
fn bad_table_and_date_are_rejected() {
    let err = ConfigLoader::resolve_config(parse(r#"{"table": "x; drop"}"#)).unwrap_err();
    assert_matches!(err, IngestError::InvalidConfig(_));

    let err =
        ConfigLoader::resolve_config(parse(r#"{"snapshot_date": "yesterday"}"#)).unwrap_err();
    assert_matches!(err, IngestError::InvalidConfig(_));
}

#[test]
fn network_settings_required_for_feed_runs() {
    let resolved = ConfigLoader::resolve_config(parse(
        r#"{"token_env": "RATINGS_INGEST_TEST_UNSET_TOKEN"}"#,
    ))
    .unwrap();
    assert_matches!(
        resolved.require_network(),
        Err(IngestError::InvalidConfig(_))
    );
}

#[test]
fn explicit_missing_file_is_a_read_error() {
    let err = ConfigLoader::resolve(Some("/nonexistent/ratings-ingest.json"), true).unwrap_err();
    assert_matches!(err, IngestError::ConfigRead(_));
}
