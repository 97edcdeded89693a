//! Unit tests for the credential container and its redaction guarantees.

use credpipe::CredentialSet;

#[test]
fn insert_and_get_round_trip() {
    let mut set = CredentialSet::new();
    set.insert("API_KEY", "abc123").expect("valid name");

    assert_eq!(set.get("API_KEY"), Some("abc123"));
    assert_eq!(set.len(), 1);
    assert!(!set.is_empty());
}

#[test]
fn duplicate_name_keeps_last_value() {
    let mut set = CredentialSet::new();
    set.insert("TOKEN", "first").expect("valid name");
    set.insert("TOKEN", "second").expect("valid name");

    assert_eq!(set.get("TOKEN"), Some("second"));
    assert_eq!(set.len(), 1);
}

#[test]
fn take_removes_the_entry() {
    let mut set = CredentialSet::new();
    set.insert("TOKEN", "secret").expect("valid name");

    assert_eq!(set.take("TOKEN"), Some("secret".to_owned()));
    assert_eq!(set.get("TOKEN"), None);
    assert!(set.is_empty());
}

#[test]
fn rejects_invalid_names() {
    let mut set = CredentialSet::new();
    for name in ["", "A=B", "BAD\nNAME", "BAD\tNAME", "+LOOKS_LIKE_CONTROL"] {
        assert!(set.insert(name, "v").is_err(), "{name:?} should be rejected");
    }
    assert!(set.is_empty());
}

#[test]
fn accepts_unusual_but_legal_names() {
    let mut set = CredentialSet::new();
    for name in ["lowercase", "WITH SPACE", "dotted.name"] {
        set.insert(name, "v").expect("legal name");
    }
    assert_eq!(set.len(), 3);
}

#[test]
fn debug_redacts_values() {
    let mut set = CredentialSet::new();
    set.insert("PASSWORD", "hunter2").expect("valid name");

    let debug = format!("{set:?}");
    assert!(
        !debug.contains("hunter2"),
        "debug output must not leak the value: {debug}"
    );
    assert!(
        debug.contains("PASSWORD"),
        "debug output should keep the name: {debug}"
    );
    assert!(
        debug.contains("<redacted:7 bytes>"),
        "debug output should show the redaction marker: {debug}"
    );
}

#[test]
fn iteration_is_name_ordered() {
    let mut set = CredentialSet::new();
    set.insert("B", "2").expect("valid name");
    set.insert("A", "1").expect("valid name");
    set.insert("C", "3").expect("valid name");

    let names: Vec<&str> = set.names().collect();
    assert_eq!(names, ["A", "B", "C"]);

    let pairs: Vec<(String, String)> = set.into_iter().collect();
    assert_eq!(pairs.first().map(|(name, _)| name.as_str()), Some("A"));
}
