use hive_core::errors::*;

#[test]
fn checksum_mismatch_carries_delta_id() {
    let err = IntegrityError::ChecksumMismatch {
        delta_id: "delta-9".into(),
        expected: "aa".into(),
        actual: "bb".into(),
    };
    let msg = err.to_string();
    assert!(msg.contains("delta-9"));
    assert!(msg.contains("aa"));
    assert!(msg.contains("bb"));
}

#[test]
fn incompatible_merge_names_both_kinds() {
    let err = ConflictError::IncompatibleMerge {
        key: "k".into(),
        existing: "counter".into(),
        incoming: "set".into(),
    };
    let msg = err.to_string();
    assert!(msg.contains("counter"));
    assert!(msg.contains("set"));
}

#[test]
fn invalid_quorum_threshold_reports_value() {
    let err = HiveError::InvalidQuorumThreshold { threshold: 1.5 };
    assert!(err.to_string().contains("1.5"));
}

// --- From impls ---

#[test]
fn integrity_error_converts_to_hive_error() {
    let err: HiveError = IntegrityError::UnknownAlgorithm("lz9".into()).into();
    assert!(matches!(err, HiveError::IntegrityError(_)));
}

#[test]
fn transport_error_converts_to_hive_error() {
    let err: HiveError = TransportError::Closed.into();
    assert!(matches!(err, HiveError::TransportError(_)));
}

#[test]
fn topology_error_converts_to_hive_error() {
    let err: HiveError = TopologyError::DuplicateAgent("a".into()).into();
    assert!(matches!(err, HiveError::TopologyError(_)));
}

#[test]
fn serde_error_converts_to_hive_error() {
    let serde_err = serde_json::from_str::<u32>("not json").unwrap_err();
    let err: HiveError = serde_err.into();
    assert!(matches!(err, HiveError::SerializationError(_)));
}
