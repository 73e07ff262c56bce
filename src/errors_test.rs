use crate::Error;
use crate::SessionError;
use crate::SessionState;
use crate::StoreError;

#[test]
fn config_update_keeps_path_and_source() {
    let err: Error = StoreError::VersionMismatch {
        path: "/config/a".to_string(),
        expected: 1,
        actual: 2,
    }
    .into();

    let wrapped = err.into_config_update("/config/a");

    assert_eq!(
        wrapped.to_string(),
        "Config update error at /config/a: Version mismatch at /config/a: expected 1, actual 2"
    );
    assert!(wrapped.is_version_mismatch());
    assert!(!wrapped.is_no_node());
    assert!(std::error::Error::source(&wrapped).is_some());
}

#[test]
fn structural_errors_are_classified() {
    let structural: Vec<Error> = vec![
        StoreError::NoNode("/a".into()).into(),
        StoreError::NodeExists("/a".into()).into(),
        StoreError::NoParent("/a/b".into()).into(),
        StoreError::HasChildren("/a".into()).into(),
    ];
    for err in &structural {
        assert!(err.is_structural(), "{err} should be structural");
    }

    let version: Error = StoreError::VersionMismatch {
        path: "/a".into(),
        expected: 0,
        actual: 1,
    }
    .into();
    assert!(!version.is_structural());
}

#[test]
fn not_connected_is_detected_through_wrapping() {
    let err: Error = SessionError::NotConnected {
        state: SessionState::Expired,
    }
    .into();

    assert!(err.is_not_connected());
    assert!(err.into_config_update("/x").is_not_connected());
}
