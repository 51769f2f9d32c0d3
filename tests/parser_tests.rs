//! Parser tests for delta ingestion and snapshot payloads

use depthbook::error::{MalformedDeltaError, SnapshotFetchError, StreamError};
use depthbook::ingest::{self, DeltaIngestor};
use depthbook::snapshot::parse_snapshot_value;
use rust_decimal_macros::dec;
use serde_json::json;

// Delta messages

#[test]
fn test_parse_delta_with_both_sides() {
    let batch = ingest::parse_message(r#"{"b":[["100.5","2"]],"a":[["101","1.25"]]}"#).unwrap();

    assert_eq!(batch.bids, vec![(dec!(100.5), dec!(2))]);
    assert_eq!(batch.asks, vec![(dec!(101), dec!(1.25))]);
}

#[test]
fn test_parse_delta_accepts_json_numbers() {
    let batch = ingest::parse_message(r#"{"b":[[100.5,2]],"a":[[101,1.25]]}"#).unwrap();

    assert_eq!(batch.bids, vec![(dec!(100.5), dec!(2))]);
    assert_eq!(batch.asks, vec![(dec!(101), dec!(1.25))]);
}

#[test]
fn test_parse_delta_single_side() {
    let batch = ingest::parse_message(r#"{"b":[["100","2"],["99","0"]]}"#).unwrap();

    assert_eq!(
        batch.bids,
        vec![(dec!(100), dec!(2)), (dec!(99), dec!(0))]
    );
    assert!(batch.asks.is_empty());
}

#[test]
fn test_parse_delta_preserves_arrival_order() {
    let batch =
        ingest::parse_message(r#"{"b":[["101","1"],["99","2"],["100","3"]]}"#).unwrap();

    let prices: Vec<_> = batch.bids.iter().map(|(price, _)| *price).collect();
    assert_eq!(prices, vec![dec!(101), dec!(99), dec!(100)]);
}

#[test]
fn test_parse_delta_zero_size_is_kept_as_remove_intent() {
    let batch = ingest::parse_message(r#"{"a":[["101","0"]]}"#).unwrap();

    assert_eq!(batch.asks, vec![(dec!(101), dec!(0))]);
}

#[test]
fn test_parse_delta_without_sides_is_malformed() {
    assert!(matches!(
        ingest::parse_message(r#"{"event":"heartbeat"}"#),
        Err(MalformedDeltaError::MissingSides)
    ));

    assert!(matches!(
        ingest::parse_message(r#"[1,2,3]"#),
        Err(MalformedDeltaError::MissingSides)
    ));
}

#[test]
fn test_parse_delta_invalid_json() {
    assert!(matches!(
        ingest::parse_message("not json at all"),
        Err(MalformedDeltaError::InvalidJson(_))
    ));
}

#[test]
fn test_malformed_tuples_are_dropped_not_fatal() {
    let batch = ingest::parse_message(
        r#"{"b":[["abc","1"],["100","2"],["99"],["98","-1"],[true,"1"]]}"#,
    )
    .unwrap();

    // Only the well-formed tuple survives
    assert_eq!(batch.bids, vec![(dec!(100), dec!(2))]);
}

#[test]
fn test_side_that_is_not_an_array_is_ignored() {
    let batch = ingest::parse_message(r#"{"b":"oops","a":[["101","1"]]}"#).unwrap();

    assert!(batch.bids.is_empty());
    assert_eq!(batch.asks, vec![(dec!(101), dec!(1))]);
}

// Ingestor stream-health tracking

#[test]
fn test_ingestor_tolerates_malformed_below_threshold() {
    let mut ingestor = DeltaIngestor::new(3);

    // Dropped, but the stream survives
    assert!(ingestor.ingest("garbage").unwrap().is_empty());
    assert!(ingestor.ingest("garbage").unwrap().is_empty());

    // Third consecutive failure crosses the threshold
    let result = ingestor.ingest("garbage");
    assert!(matches!(
        result,
        Err(StreamError::MalformedThreshold { count: 3 })
    ));
}

#[test]
fn test_ingestor_parsed_message_resets_counter() {
    let mut ingestor = DeltaIngestor::new(2);

    assert!(ingestor.ingest("garbage").unwrap().is_empty());
    assert!(!ingestor.ingest(r#"{"b":[["100","1"]]}"#).unwrap().is_empty());

    // Counter restarted: one more failure is still below the threshold
    assert!(ingestor.ingest("garbage").unwrap().is_empty());
    assert!(matches!(
        ingestor.ingest("garbage"),
        Err(StreamError::MalformedThreshold { .. })
    ));
}

// Snapshot payloads

#[test]
fn test_parse_snapshot_payload() {
    let payload = json!({
        "bids": [["100.5", "2"], [99, 3]],
        "asks": [["101", "1"]],
    });

    let snapshot = parse_snapshot_value(&payload).unwrap();

    assert_eq!(
        snapshot.bids,
        vec![(dec!(100.5), dec!(2)), (dec!(99), dec!(3))]
    );
    assert_eq!(snapshot.asks, vec![(dec!(101), dec!(1))]);
}

#[test]
fn test_parse_snapshot_requires_both_arrays() {
    let payload = json!({ "bids": [["100", "2"]] });

    assert!(matches!(
        parse_snapshot_value(&payload),
        Err(SnapshotFetchError::Malformed(_))
    ));
}

#[test]
fn test_parse_snapshot_is_strict_about_levels() {
    // Unlike delta ingestion, one bad level fails the whole snapshot: a
    // partial snapshot cannot seed a consistent book.
    let payload = json!({
        "bids": [["100", "2"], ["abc", "1"]],
        "asks": [],
    });

    assert!(matches!(
        parse_snapshot_value(&payload),
        Err(SnapshotFetchError::Malformed(_))
    ));
}

#[test]
fn test_parse_snapshot_rejects_non_object() {
    let payload = json!([["100", "2"]]);

    assert!(matches!(
        parse_snapshot_value(&payload),
        Err(SnapshotFetchError::Malformed(_))
    ));
}
