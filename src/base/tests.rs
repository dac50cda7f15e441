use crate::base::cterror::CtError;

#[test]
fn test_catalog_errors_are_user_visible() {
    assert!(CtError::SignatureInvalid.is_user_visible());
    assert!(CtError::LogIdMismatch {
        declared: "a".into(),
        computed: "b".into()
    }
    .is_user_visible());
    assert!(CtError::InvalidLogKey { log_id: "a".into() }.is_user_visible());
}

#[test]
fn test_verification_errors_degrade_silently() {
    assert!(!CtError::NoLogsLoaded.is_user_visible());
    assert!(!CtError::MissingIssuer.is_user_visible());
    assert!(!CtError::malformed("truncated").is_user_visible());
    assert!(!CtError::Timeout { seq: 7 }.is_user_visible());
}

#[test]
fn test_coordination_failures() {
    assert!(CtError::Timeout { seq: 1 }.is_coordination_failure());
    assert!(CtError::WorkerUnavailable.is_coordination_failure());
    assert!(!CtError::MissingLeaf.is_coordination_failure());
}

#[test]
fn test_error_messages() {
    let err = CtError::LogIdMismatch {
        declared: "AAAA".into(),
        computed: "BBBB".into(),
    };
    assert_eq!(
        err.to_string(),
        "Invalid CT log list: log_id AAAA does not match key hash BBBB"
    );
    assert_eq!(
        CtError::Timeout { seq: 42 }.to_string(),
        "Verification call 42 timed out"
    );
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err = CtError::from(io);
    assert!(matches!(err, CtError::Io { .. }));
}
